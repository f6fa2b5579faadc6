//! # Decode Directives
//!
//! An `Encoding` tells the response decoder how to interpret a reply. It is
//! purely a decode-time instruction and never changes what goes on the wire.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ParseError;

/// How a reply should be turned into a caller-facing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Encoding {
    /// Bytes at the leaves, structure preserved.
    #[default]
    Raw,
    /// UTF-8 text.
    Text,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// `key:value` lines parsed into a mapping (server INFO output).
    Info,
    /// Nested JSON document.
    Json,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Raw => "bytes",
            Encoding::Text => "utf-8",
            Encoding::Int => "int",
            Encoding::Float => "float",
            Encoding::Info => "info",
            Encoding::Json => "json",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bytes" | "raw" => Ok(Encoding::Raw),
            "utf-8" | "utf8" | "str" | "text" => Ok(Encoding::Text),
            "int" | "integer" => Ok(Encoding::Int),
            "float" => Ok(Encoding::Float),
            "info" => Ok(Encoding::Info),
            "json" => Ok(Encoding::Json),
            _ => Err(ParseError::Encoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
