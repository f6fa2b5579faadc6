//! # RKV Client Engine
//!
//! Purpose: Execute arbitrary RESP commands against a single server or a
//! sharded cluster, with pooling, slot routing, bounded retries and
//! caller-selected reply decoding.
//!
//! ## Design Principles
//! 1. **Single Primitive**: Everything goes through `Client::execute`; typed
//!    helpers belong to the binding layer.
//! 2. **Object Pool Pattern**: Authenticated connections are reused per
//!    endpoint and owned by exactly one call at a time.
//! 3. **Snapshot Topology**: Cluster routing reads an immutable slot map that
//!    is replaced whole on refresh.
//! 4. **Typed Failures**: Every error maps to one `ErrorKind`.

pub mod client;
pub mod command;
pub mod connection;
pub mod decode;
pub mod error;
pub mod pool;
pub mod resp;
pub mod retry;
pub mod router;
pub mod slots;

pub use client::{Client, ClientConfig, ClientStatus, ExecOptions};
pub use decode::{decode, Value};
pub use error::{ClientError, ClientResult, ErrorKind};
pub use pool::PoolStatus;
pub use resp::{ErrorReply, Redirect, RespValue};
pub use rkv_common::{Arg, Command, Encoding, Endpoint};
