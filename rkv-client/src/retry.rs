//! # Retry Policy
//!
//! Purpose: Decide, per failed attempt, whether a call retries, follows a
//! redirect or fails, and how long it waits first.
//!
//! ## Design Principles
//! 1. **Explicit States**: Each call walks `State` from `Resolving` to `Done`
//!    or `Failed`; `Retrying` always returns to `Resolving`.
//! 2. **Bounded Work**: Attempts and redirects have separate caps, and every
//!    backoff delay lies between the previous delay and `max_delay`.
//! 3. **No Blind Replays**: A command that may already have executed is only
//!    replayed when the caller says that is safe.

use std::time::Duration;

use tracing::debug;

use crate::error::ClientError;

/// Steps of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Resolving,
    Acquiring,
    Sending,
    Waiting,
    Decoding,
    Retrying,
    Done,
    Failed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Failed)
    }

    /// True once the request frame may have reached the server.
    pub fn may_have_sent(self) -> bool {
        matches!(self, State::Sending | State::Waiting | State::Decoding)
    }
}

/// Capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay before retry number `retry` (1-based): `min(base * 2^(retry-1), max)`.
    pub fn delay(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// What the engine does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Wait, optionally refresh the topology, then resolve again.
    Retry { delay: Duration, refresh: bool },
    /// Resolve again immediately against the redirect target.
    Redirect,
    Fail,
}

/// Per-call counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attempts {
    pub failures: u32,
    pub redirects: u32,
    pool_retries: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    pub max_attempts: u32,
    pub max_redirects: u32,
    pub cluster_mode: bool,
}

impl RetryPolicy {
    /// Classifies `err`. `replay_safe` is false when the command may have
    /// executed and is neither read-only nor explicitly marked retryable.
    pub fn decide(&self, err: &ClientError, attempts: &mut Attempts, replay_safe: bool) -> Decision {
        if let ClientError::Redirect(redirect) = err {
            if attempts.redirects >= self.max_redirects {
                debug!(%redirect, "redirect limit reached");
                return Decision::Fail;
            }
            attempts.redirects += 1;
            return Decision::Redirect;
        }

        let (transient, refresh) = match err {
            ClientError::Connect { .. } => (true, self.cluster_mode),
            ClientError::Io(_) | ClientError::Protocol(_) => (replay_safe, self.cluster_mode),
            ClientError::PoolExhausted(_) => {
                let first = attempts.pool_retries == 0;
                attempts.pool_retries += 1;
                (first, false)
            }
            ClientError::NoSlot(_) => (self.cluster_mode, true),
            ClientError::Server(reply) if self.cluster_mode && reply.is_cluster_transient() => {
                (true, reply.code == "CLUSTERDOWN")
            }
            _ => (false, false),
        };

        attempts.failures += 1;
        if !transient || attempts.failures >= self.max_attempts {
            return Decision::Fail;
        }
        Decision::Retry {
            delay: self.backoff.delay(attempts.failures),
            refresh,
        }
    }
}
