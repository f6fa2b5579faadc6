//! # Command Classification
//!
//! Finds the key arguments of a command (for slot routing) and tags it as
//! blocking, read-only or fan-out. Only the command name and argument layout
//! are inspected; what a command means on the server is not modelled here.

use rkv_common::{Arg, Command};

use crate::error::{ClientError, ClientResult};
use crate::slots::key_hash_slot;

/// Routing-relevant facts about one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandInfo {
    /// Key arguments in wire order.
    pub keys: Vec<Vec<u8>>,
    /// The server may legitimately hold the reply back (e.g. `BLPOP`).
    pub blocking: bool,
    /// Re-sending the command cannot change server state.
    pub read_only: bool,
    /// In cluster mode the command is sent to every master.
    pub fan_out: bool,
}

impl CommandInfo {
    pub fn of(command: &Command) -> Self {
        let args: Vec<Vec<u8>> = command
            .args()
            .iter()
            .map(|arg: &Arg| arg.to_bytes().into_owned())
            .collect();
        let Some(name) = args.first() else {
            return CommandInfo::default();
        };
        let name = name.to_ascii_uppercase();
        let rest = &args[1..];

        CommandInfo {
            keys: extract_keys(&name, rest),
            blocking: is_blocking(&name, rest),
            read_only: is_read_only(&name),
            fan_out: name == b"INFO",
        }
    }

    /// Hash slot shared by all keys; `None` for keyless commands.
    ///
    /// Fails with `CrossSlot` when the keys hash to different slots.
    pub fn slot(&self) -> ClientResult<Option<u16>> {
        let mut slots = self.keys.iter().map(|key| key_hash_slot(key));
        let Some(first) = slots.next() else {
            return Ok(None);
        };
        if slots.any(|slot| slot != first) {
            return Err(ClientError::CrossSlot);
        }
        Ok(Some(first))
    }
}

fn extract_keys(name: &[u8], rest: &[Vec<u8>]) -> Vec<Vec<u8>> {
    match name {
        b"INFO" | b"CLIENT" | b"KEYS" | b"PING" | b"DBSIZE" | b"CONFIG" | b"TIME" | b"SCRIPT"
        | b"FLUSHDB" | b"FLUSHALL" | b"COMMAND" | b"SELECT" | b"AUTH" | b"HELLO" | b"ECHO"
        | b"ASKING" | b"READONLY" | b"SCAN" | b"RANDOMKEY" | b"WAIT" => Vec::new(),
        b"CLUSTER" => match rest.first() {
            Some(sub) if sub.eq_ignore_ascii_case(b"KEYSLOT") => take(rest, 1, 1),
            _ => Vec::new(),
        },
        b"XGROUP" | b"XINFO" => take(rest, 1, 1),
        b"EVAL" | b"EVALSHA" | b"EVAL_RO" | b"EVALSHA_RO" | b"FCALL" | b"FCALL_RO" => {
            numkeys_at(rest, 1)
        }
        b"ZMPOP" | b"LMPOP" | b"ZDIFF" | b"ZINTER" | b"ZINTERCARD" | b"ZUNION" | b"SINTERCARD" => {
            numkeys_at(rest, 0)
        }
        b"ZDIFFSTORE" | b"ZUNIONSTORE" | b"ZINTERSTORE" => {
            let mut keys = take(rest, 0, 1);
            keys.extend(numkeys_at(rest, 1));
            keys
        }
        b"BZMPOP" | b"BLMPOP" => numkeys_at(rest, 1),
        b"XREAD" | b"XREADGROUP" => {
            match rest.iter().position(|arg| arg.eq_ignore_ascii_case(b"STREAMS")) {
                Some(idx) => {
                    let streams = &rest[idx + 1..];
                    streams[..streams.len() / 2].to_vec()
                }
                None => Vec::new(),
            }
        }
        b"MIGRATE" => match rest.iter().position(|arg| arg.eq_ignore_ascii_case(b"KEYS")) {
            Some(idx) => rest[idx + 1..].to_vec(),
            None => take(rest, 2, 1),
        },
        b"MGET" | b"DEL" | b"EXISTS" | b"UNLINK" | b"TOUCH" | b"WATCH" | b"SUNION" | b"SINTER"
        | b"SDIFF" | b"PFCOUNT" => rest.to_vec(),
        b"MSET" | b"MSETNX" => rest.iter().step_by(2).cloned().collect(),
        b"BLPOP" | b"BRPOP" | b"BZPOPMIN" | b"BZPOPMAX" => {
            rest[..rest.len().saturating_sub(1)].to_vec()
        }
        _ => take(rest, 0, 1),
    }
}

fn take(rest: &[Vec<u8>], start: usize, count: usize) -> Vec<Vec<u8>> {
    rest.iter().skip(start).take(count).cloned().collect()
}

/// Keys following a `numkeys` argument at `rest[idx]`.
fn numkeys_at(rest: &[Vec<u8>], idx: usize) -> Vec<Vec<u8>> {
    let count = rest
        .get(idx)
        .and_then(|raw| std::str::from_utf8(raw).ok())
        .and_then(|text| text.parse::<usize>().ok())
        .unwrap_or(0);
    take(rest, idx + 1, count)
}

fn is_blocking(name: &[u8], rest: &[Vec<u8>]) -> bool {
    match name {
        b"BLPOP" | b"BRPOP" | b"BLMOVE" | b"BRPOPLPUSH" | b"BZPOPMIN" | b"BZPOPMAX" | b"BZMPOP"
        | b"BLMPOP" | b"WAIT" | b"EVAL" | b"EVALSHA" => true,
        b"XREAD" | b"XREADGROUP" => rest.iter().any(|arg| arg.eq_ignore_ascii_case(b"BLOCK")),
        _ => false,
    }
}

fn is_read_only(name: &[u8]) -> bool {
    matches!(
        name,
        b"GET"
            | b"MGET"
            | b"STRLEN"
            | b"GETRANGE"
            | b"EXISTS"
            | b"TTL"
            | b"PTTL"
            | b"TYPE"
            | b"HGET"
            | b"HMGET"
            | b"HGETALL"
            | b"HKEYS"
            | b"HVALS"
            | b"HLEN"
            | b"HEXISTS"
            | b"LRANGE"
            | b"LLEN"
            | b"LINDEX"
            | b"SMEMBERS"
            | b"SCARD"
            | b"SISMEMBER"
            | b"ZRANGE"
            | b"ZRANGEBYSCORE"
            | b"ZREVRANGE"
            | b"ZCARD"
            | b"ZSCORE"
            | b"ZRANK"
            | b"ZCOUNT"
            | b"XRANGE"
            | b"XREVRANGE"
            | b"XLEN"
            | b"XREAD"
            | b"PFCOUNT"
            | b"INFO"
            | b"PING"
            | b"ECHO"
            | b"DBSIZE"
            | b"KEYS"
            | b"SCAN"
            | b"TIME"
            | b"CLUSTER"
    )
}
