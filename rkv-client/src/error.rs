//! # Error Taxonomy
//!
//! Every failure the engine can surface, plus the coarse `ErrorKind` the
//! binding layer maps onto its own exception types.

use std::io;

use thiserror::Error;

use rkv_common::{Endpoint, ParseError};

use crate::resp::{ErrorReply, Redirect};

/// Result type for the client engine.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport connect to an endpoint failed or timed out.
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
    /// The AUTH/SELECT/CLIENT SETNAME handshake was rejected.
    #[error("handshake with {endpoint} failed: {reply}")]
    Auth { endpoint: Endpoint, reply: ErrorReply },
    /// Network failure on an established connection.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The peer sent bytes that are not a valid reply frame.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// No connection became available within the checkout bound.
    #[error("connection pool for {0} exhausted")]
    PoolExhausted(Endpoint),
    /// The server rejected the command.
    #[error("{0}")]
    Server(ErrorReply),
    /// The server redirected the command to another node.
    #[error("redirected: {0}")]
    Redirect(Redirect),
    /// The reply shape did not match the requested encoding.
    #[error("decode error: {0}")]
    Decode(String),
    /// A cluster command touched keys in more than one hash slot.
    #[error("keys in request don't hash to the same slot")]
    CrossSlot,
    /// The current slot map has no owner for the slot.
    #[error("no node serves slot {0}")]
    NoSlot(u16),
    /// Cluster topology could not be discovered.
    #[error("cluster topology error: {0}")]
    Topology(String),
    /// The command is empty or otherwise unusable.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// The call was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
    /// The call exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
    /// The client was closed.
    #[error("client is closed")]
    Closed,
    /// Caller-supplied text could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Coarse classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connect,
    PoolExhausted,
    Redirect,
    Server,
    Decode,
    CrossSlot,
    Cancelled,
    Timeout,
    Closed,
    InvalidArgument,
}

impl ClientError {
    /// Maps the error onto the public taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Connect { .. }
            | ClientError::Auth { .. }
            | ClientError::Io(_)
            | ClientError::Protocol(_)
            | ClientError::Topology(_)
            | ClientError::NoSlot(_) => ErrorKind::Connect,
            ClientError::PoolExhausted(_) => ErrorKind::PoolExhausted,
            ClientError::Server(_) => ErrorKind::Server,
            ClientError::Redirect(_) => ErrorKind::Redirect,
            ClientError::Decode(_) => ErrorKind::Decode,
            ClientError::CrossSlot => ErrorKind::CrossSlot,
            ClientError::Cancelled => ErrorKind::Cancelled,
            ClientError::Timeout => ErrorKind::Timeout,
            ClientError::Closed => ErrorKind::Closed,
            ClientError::InvalidCommand(_) | ClientError::Parse(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Returns the server-provided message, when there is one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Server(reply) | ClientError::Auth { reply, .. } => Some(&reply.message),
            _ => None,
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        ClientError::Decode(message.into())
    }
}
