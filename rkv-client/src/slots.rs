//! # Hash Slots
//!
//! Purpose: Map keys to cluster hash slots and slots to owning endpoints.
//!
//! ## Design Principles
//! 1. **Immutable Snapshots**: A `SlotMap` is built once from a topology reply
//!    and never mutated; refresh builds a new one.
//! 2. **Sorted Ranges**: Ranges are kept sorted by start slot so lookup is a
//!    binary search.

use rkv_common::Endpoint;

use crate::error::{ClientError, ClientResult};
use crate::resp::RespValue;

/// Number of hash slots in a cluster.
pub const SLOT_COUNT: u16 = 16384;

/// CRC16-CCITT (XMODEM): polynomial 0x1021, initial value 0.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Hash slot for a key, honouring the first non-empty `{tag}`.
pub fn key_hash_slot(key: &[u8]) -> u16 {
    let hashed = hash_tag(key).unwrap_or(key);
    crc16(hashed) % SLOT_COUNT
}

fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|&b| b == b'{')?;
    let close = key[open + 1..].iter().position(|&b| b == b'}')?;
    if close == 0 {
        return None;
    }
    Some(&key[open + 1..open + 1 + close])
}

/// An inclusive slot range and the nodes serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub master: Endpoint,
    pub replicas: Vec<Endpoint>,
}

/// Slot ownership snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotMap {
    ranges: Vec<SlotRange>,
}

impl SlotMap {
    pub fn new(mut ranges: Vec<SlotRange>) -> Self {
        ranges.sort_by_key(|range| range.start);
        SlotMap { ranges }
    }

    /// Builds a map from a `CLUSTER SLOTS` reply.
    ///
    /// Nodes reported with an empty host are taken to be `queried`.
    pub fn from_cluster_slots(reply: &RespValue, queried: &Endpoint) -> ClientResult<Self> {
        let RespValue::Array(entries) = reply else {
            return Err(topology(format!(
                "CLUSTER SLOTS returned {}",
                reply.type_name()
            )));
        };

        let mut ranges = Vec::with_capacity(entries.len());
        for entry in entries {
            let RespValue::Array(fields) = entry else {
                return Err(topology("slot entry is not an array"));
            };
            if fields.len() < 3 {
                return Err(topology("slot entry is missing its master"));
            }
            let start = slot_number(&fields[0])?;
            let end = slot_number(&fields[1])?;
            if start > end {
                return Err(topology(format!("inverted slot range {start}-{end}")));
            }
            let master = node_endpoint(&fields[2], queried)?;
            let replicas = fields[3..]
                .iter()
                .map(|node| node_endpoint(node, queried))
                .collect::<ClientResult<Vec<_>>>()?;
            ranges.push(SlotRange {
                start,
                end,
                master,
                replicas,
            });
        }

        if ranges.is_empty() {
            return Err(topology("cluster reports no slots"));
        }
        Ok(SlotMap::new(ranges))
    }

    /// Master owning `slot`, if any range covers it.
    pub fn owner(&self, slot: u16) -> Option<&Endpoint> {
        let idx = self.ranges.partition_point(|range| range.start <= slot);
        let range = self.ranges.get(idx.checked_sub(1)?)?;
        (slot <= range.end).then_some(&range.master)
    }

    /// Distinct masters in slot order.
    pub fn masters(&self) -> Vec<Endpoint> {
        let mut masters: Vec<Endpoint> = Vec::new();
        for range in &self.ranges {
            if !masters.contains(&range.master) {
                masters.push(range.master.clone());
            }
        }
        masters
    }

    pub fn ranges(&self) -> &[SlotRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

fn topology(message: impl Into<String>) -> ClientError {
    ClientError::Topology(message.into())
}

fn slot_number(value: &RespValue) -> ClientResult<u16> {
    match value {
        RespValue::Integer(n) if (0..SLOT_COUNT as i64).contains(n) => Ok(*n as u16),
        other => Err(topology(format!("invalid slot number {other:?}"))),
    }
}

fn node_endpoint(value: &RespValue, queried: &Endpoint) -> ClientResult<Endpoint> {
    let RespValue::Array(fields) = value else {
        return Err(topology("node entry is not an array"));
    };
    let host = match fields.first() {
        Some(RespValue::Bulk(raw)) => String::from_utf8_lossy(raw).into_owned(),
        Some(RespValue::Simple(text)) => text.clone(),
        _ => return Err(topology("node entry has no host")),
    };
    let port = match fields.get(1) {
        Some(RespValue::Integer(port)) => u16::try_from(*port).ok(),
        _ => None,
    }
    .ok_or_else(|| topology("node entry has no valid port"))?;

    if host.is_empty() || host == "?" {
        return Ok(Endpoint::new(queried.host.clone(), port));
    }
    Ok(Endpoint::new(host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str, port: i64) -> RespValue {
        RespValue::Array(vec![
            RespValue::Bulk(host.as_bytes().to_vec()),
            RespValue::Integer(port),
            RespValue::Bulk(b"nodeid".to_vec()),
        ])
    }

    fn entry(start: i64, end: i64, nodes: Vec<RespValue>) -> RespValue {
        let mut fields = vec![RespValue::Integer(start), RespValue::Integer(end)];
        fields.extend(nodes);
        RespValue::Array(fields)
    }

    #[test]
    fn test_crc16_vector() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
        assert_eq!(crc16(b""), 0);
    }

    #[test]
    fn test_key_hash_slot() {
        assert_eq!(key_hash_slot(b"foo"), 12182);
        assert_eq!(key_hash_slot(b"bar"), 5061);
        assert_eq!(key_hash_slot(b"{user1000}.following"), key_hash_slot(b"user1000"));
        assert_eq!(
            key_hash_slot(b"{user1000}.following"),
            key_hash_slot(b"{user1000}.followers")
        );
    }

    #[test]
    fn test_empty_hash_tag_hashes_whole_key() {
        assert_eq!(key_hash_slot(b"foo{}{bar}"), crc16(b"foo{}{bar}") % SLOT_COUNT);
        assert_eq!(key_hash_slot(b"foo{bar"), crc16(b"foo{bar") % SLOT_COUNT);
        assert_eq!(key_hash_slot(b"{a}{b}"), key_hash_slot(b"a"));
    }

    #[test]
    fn test_from_cluster_slots() {
        let seed = Endpoint::new("10.0.0.1", 7000);
        let reply = RespValue::Array(vec![
            entry(8192, 16383, vec![node("10.0.0.2", 7001)]),
            entry(0, 8191, vec![node("", 7000), node("10.0.0.3", 7002)]),
        ]);
        let map = SlotMap::from_cluster_slots(&reply, &seed).unwrap();

        assert_eq!(map.owner(0), Some(&Endpoint::new("10.0.0.1", 7000)));
        assert_eq!(map.owner(8191), Some(&Endpoint::new("10.0.0.1", 7000)));
        assert_eq!(map.owner(8192), Some(&Endpoint::new("10.0.0.2", 7001)));
        assert_eq!(map.owner(16383), Some(&Endpoint::new("10.0.0.2", 7001)));
        assert_eq!(map.ranges()[0].replicas, vec![Endpoint::new("10.0.0.3", 7002)]);
        assert_eq!(
            map.masters(),
            vec![Endpoint::new("10.0.0.1", 7000), Endpoint::new("10.0.0.2", 7001)]
        );
    }

    #[test]
    fn test_owner_gaps() {
        let map = SlotMap::new(vec![SlotRange {
            start: 100,
            end: 200,
            master: Endpoint::default(),
            replicas: Vec::new(),
        }]);
        assert_eq!(map.owner(99), None);
        assert!(map.owner(150).is_some());
        assert_eq!(map.owner(201), None);
    }

    #[test]
    fn test_malformed_topology() {
        let seed = Endpoint::default();
        assert!(SlotMap::from_cluster_slots(&RespValue::Nil, &seed).is_err());
        assert!(SlotMap::from_cluster_slots(&RespValue::Array(vec![]), &seed).is_err());
        let inverted = RespValue::Array(vec![entry(10, 5, vec![node("h", 1)])]);
        assert!(SlotMap::from_cluster_slots(&inverted, &seed).is_err());
        let no_master = RespValue::Array(vec![entry(0, 5, vec![])]);
        assert!(SlotMap::from_cluster_slots(&no_master, &seed).is_err());
    }
}
