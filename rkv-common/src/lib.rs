// rkv-common - Shared vocabulary types for the RelayKV client engine
//
// This crate defines commands, endpoints and decode directives shared by the
// engine and the binding layer that calls into it.

pub mod encoding;
pub mod error;
pub mod types;

// Re-export for convenience
pub use encoding::*;
pub use error::*;
pub use types::*;
