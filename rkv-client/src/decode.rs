//! # Response Decoding
//!
//! Purpose: Turn a wire-level `RespValue` into the caller-facing `Value`
//! requested by an `Encoding` directive.
//!
//! ## Design Principles
//! 1. **Total Over Directives**: Every `Encoding` variant has one decode path;
//!    adding a variant without a path fails to compile.
//! 2. **Typed Failures**: A reply that cannot be read as the requested type is
//!    a `ClientError::Decode`, never a panic or a silently coerced value.
//! 3. **Structure First**: Arrays and maps decode element-wise with the same
//!    directive, so `int` over an array yields an array of integers.

use rkv_common::Encoding;
use serde::Serialize;

use crate::error::{ClientError, ClientResult};
use crate::resp::RespValue;

/// Decoded reply value handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Absence marker (nil reply, JSON null).
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Ordered key/value pairs.
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(data) => Some(data),
            Value::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Looks up a text key in a `Map` value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Decodes `reply` according to `encoding`.
///
/// Error replies are surfaced as `ClientError::Server`; the engine normally
/// handles them before decoding.
pub fn decode(reply: RespValue, encoding: Encoding) -> ClientResult<Value> {
    match encoding {
        Encoding::Raw => decode_raw(reply),
        Encoding::Text => decode_scalar(reply, text_leaf),
        Encoding::Int => decode_scalar(reply, int_leaf),
        Encoding::Float => decode_scalar(reply, float_leaf),
        Encoding::Info => decode_info(reply),
        Encoding::Json => decode_json(reply),
    }
}

fn decode_raw(reply: RespValue) -> ClientResult<Value> {
    Ok(match reply {
        RespValue::Bulk(data) => Value::Bytes(data),
        RespValue::Simple(status) => Value::Text(status),
        RespValue::Integer(value) => Value::Int(value),
        RespValue::Nil => Value::Nil,
        RespValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(decode_raw)
                .collect::<ClientResult<_>>()?,
        ),
        RespValue::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| Ok((decode_raw(k)?, decode_raw(v)?)))
                .collect::<ClientResult<_>>()?,
        ),
        RespValue::Error(reply) => return Err(ClientError::Server(reply)),
    })
}

/// Decodes aggregates element-wise and applies `leaf` to every scalar.
fn decode_scalar(reply: RespValue, leaf: fn(RespValue) -> ClientResult<Value>) -> ClientResult<Value> {
    match reply {
        RespValue::Nil => Ok(Value::Nil),
        RespValue::Error(reply) => Err(ClientError::Server(reply)),
        RespValue::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(|item| decode_scalar(item, leaf))
                .collect::<ClientResult<_>>()?,
        )),
        RespValue::Map(entries) => Ok(Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| Ok((text_leaf(k)?, decode_scalar(v, leaf)?)))
                .collect::<ClientResult<_>>()?,
        )),
        scalar => leaf(scalar),
    }
}

fn text_leaf(reply: RespValue) -> ClientResult<Value> {
    match reply {
        RespValue::Bulk(data) => String::from_utf8(data)
            .map(Value::Text)
            .map_err(|err| ClientError::decode(format!("invalid utf-8: {}", err))),
        RespValue::Simple(status) => Ok(Value::Text(status)),
        RespValue::Integer(value) => Ok(Value::Text(value.to_string())),
        RespValue::Nil => Ok(Value::Nil),
        other => Err(mismatch("text", &other)),
    }
}

fn int_leaf(reply: RespValue) -> ClientResult<Value> {
    match reply {
        RespValue::Integer(value) => Ok(Value::Int(value)),
        RespValue::Bulk(data) => parse_text::<i64>(&data, "integer").map(Value::Int),
        RespValue::Simple(status) => parse_text::<i64>(status.as_bytes(), "integer").map(Value::Int),
        other => Err(mismatch("integer", &other)),
    }
}

fn float_leaf(reply: RespValue) -> ClientResult<Value> {
    match reply {
        RespValue::Integer(value) => Ok(Value::Float(value as f64)),
        RespValue::Bulk(data) => parse_text::<f64>(&data, "float").map(Value::Float),
        RespValue::Simple(status) => parse_text::<f64>(status.as_bytes(), "float").map(Value::Float),
        other => Err(mismatch("float", &other)),
    }
}

fn parse_text<T: std::str::FromStr>(data: &[u8], what: &str) -> ClientResult<T> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .ok_or_else(|| {
            ClientError::decode(format!(
                "{:?} is not a valid {}",
                String::from_utf8_lossy(data),
                what
            ))
        })
}

fn mismatch(expected: &str, reply: &RespValue) -> ClientError {
    ClientError::decode(format!("cannot decode {} reply as {}", reply.type_name(), expected))
}

/// Decodes server INFO text.
///
/// A single blob becomes a map of fields. A map of `node -> blob` (cluster
/// fan-out) or an array of blobs becomes a map of node identifier to fields.
fn decode_info(reply: RespValue) -> ClientResult<Value> {
    match reply {
        RespValue::Bulk(data) => {
            let text = String::from_utf8(data)
                .map_err(|err| ClientError::decode(format!("invalid utf-8 in info: {}", err)))?;
            Ok(parse_info(&text))
        }
        RespValue::Simple(text) => Ok(parse_info(&text)),
        RespValue::Nil => Ok(Value::Nil),
        RespValue::Map(entries) => Ok(Value::Map(
            entries
                .into_iter()
                .map(|(node, blob)| Ok((text_leaf(node)?, decode_info(blob)?)))
                .collect::<ClientResult<_>>()?,
        )),
        RespValue::Array(items) => Ok(Value::Map(
            items
                .into_iter()
                .enumerate()
                .map(|(idx, blob)| Ok((Value::Text(idx.to_string()), decode_info(blob)?)))
                .collect::<ClientResult<_>>()?,
        )),
        RespValue::Error(reply) => Err(ClientError::Server(reply)),
        other => Err(mismatch("info", &other)),
    }
}

fn parse_info(text: &str) -> Value {
    let entries = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (Value::Text(key.to_string()), Value::Text(value.to_string())))
        .collect();
    Value::Map(entries)
}

fn decode_json(reply: RespValue) -> ClientResult<Value> {
    match reply {
        RespValue::Bulk(data) => serde_json::from_slice::<serde_json::Value>(&data)
            .map(from_json)
            .map_err(|err| ClientError::decode(format!("invalid json: {}", err))),
        RespValue::Simple(text) => serde_json::from_str::<serde_json::Value>(&text)
            .map(from_json)
            .map_err(|err| ClientError::decode(format!("invalid json: {}", err))),
        RespValue::Nil => Ok(Value::Nil),
        RespValue::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(decode_json)
                .collect::<ClientResult<_>>()?,
        )),
        RespValue::Error(reply) => Err(ClientError::Server(reply)),
        other => Err(mismatch("json", &other)),
    }
}

fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(flag) => Value::Bool(flag),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(int) => Value::Int(int),
            None => Value::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(text) => Value::Text(text),
        serde_json::Value::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(fields) => Value::Map(
            fields
                .into_iter()
                .map(|(k, v)| (Value::Text(k), from_json(v)))
                .collect(),
        ),
    }
}
