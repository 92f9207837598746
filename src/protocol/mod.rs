//! Wire message schemas for the msgpack RPC protocol.
//!
//! Field names match the server's msgpack maps exactly. Optional request fields
//! are skipped when unset: the server treats an absent field differently from
//! an explicit zero or `false`.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::ByteBuf;

pub mod binary;

/// Suffix the server uses to describe the structure of a destination key.
pub const KEY_CATEGORY_SUFFIX: &str = "Symbol/Timeframe/AttributeGroup";

pub mod methods {
    pub const QUERY: &str = "DataService.Query";
    pub const WRITE: &str = "DataService.Write";
    pub const CREATE: &str = "DataService.Create";
    pub const LIST_SYMBOLS: &str = "DataService.ListSymbols";
    pub const DESTROY: &str = "DataService.Destroy";
}

/// Order-preserving map from wire destination key to a row offset or count.
///
/// Wire order is significant: it decides which timeframe a result index
/// observes first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyOffsets {
    entries: Vec<(String, u64)>,
    positions: HashMap<String, usize>,
}

impl KeyOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts or replaces `key`, keeping its original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: u64) {
        let key = key.into();
        match self.positions.get(&key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.positions.get(key).map(|&pos| self.entries[pos].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for KeyOffsets {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut offsets = KeyOffsets::new();
        for (k, v) in iter {
            offsets.insert(k, v);
        }
        offsets
    }
}

impl Serialize for KeyOffsets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for KeyOffsets {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OffsetsVisitor;

        impl<'de> Visitor<'de> for OffsetsVisitor {
            type Value = KeyOffsets;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of destination key to integer")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<KeyOffsets, A::Error> {
                let mut offsets = KeyOffsets::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, u64>()? {
                    offsets.insert(key, value);
                }
                Ok(offsets)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<KeyOffsets, E> {
                Ok(KeyOffsets::new())
            }
        }

        deserializer.deserialize_any(OffsetsVisitor)
    }
}

/// Reads an explicit nil the same as an absent field.
fn nil_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Flat columnar payload: parallel arrays of names, type tags and buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireColumnSet {
    pub names: Vec<String>,
    pub types: Vec<String>,
    pub data: Vec<ByteBuf>,
    pub length: u64,
}

/// Column set plus per-destination-key row windows into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDataset {
    pub names: Vec<String>,
    pub types: Vec<String>,
    pub data: Vec<ByteBuf>,
    pub length: u64,
    #[serde(default)]
    pub startindex: KeyOffsets,
    #[serde(default)]
    pub lengths: KeyOffsets,
}

impl WireDataset {
    pub fn new(columns: WireColumnSet, startindex: KeyOffsets, lengths: KeyOffsets) -> Self {
        Self {
            names: columns.names,
            types: columns.types,
            data: columns.data,
            length: columns.length,
            startindex,
            lengths,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_start_nanos: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_end: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_end_nanos: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_record_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_from_start: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiQueryRequest {
    pub requests: Vec<QueryRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub result: WireDataset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiQueryResponse {
    #[serde(default, deserialize_with = "nil_as_default")]
    pub responses: Vec<QueryResponse>,
    pub timezone: String,
    #[serde(default, deserialize_with = "nil_as_default")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub dataset: WireDataset,
    pub is_variable_length: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiWriteRequest {
    pub requests: Vec<WriteRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub key: String,
    pub column_names: Vec<String>,
    pub column_types: Vec<String>,
    pub row_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiCreateRequest {
    pub requests: Vec<CreateRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiKeyRequest {
    pub requests: Vec<KeyRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSymbolsRequest {
    pub format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSymbolsResponse {
    #[serde(rename = "Results", default)]
    pub results: Option<Vec<String>>,
}

/// Per-request acknowledgment; no `error` means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "nil_as_default")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiServerResponse {
    #[serde(default, deserialize_with = "nil_as_default")]
    pub responses: Vec<ServerResponse>,
}

/// JSON-RPC 2.0 request envelope, msgpack-encoded on the wire.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'a str,
    pub params: &'a P,
}

#[derive(Debug, Deserialize)]
pub struct RpcReply<R> {
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_offsets_keep_wire_order() {
        let offsets: KeyOffsets = [("B", 5_u64), ("A", 0)].into_iter().collect();
        let bytes = rmp_serde::to_vec_named(&offsets).unwrap();
        let decoded: KeyOffsets = rmp_serde::from_slice(&bytes).unwrap();
        let keys: Vec<&str> = decoded.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["B", "A"]);
        assert_eq!(decoded.get("A"), Some(0));
    }

    #[test]
    fn test_query_request_omits_unset_fields() {
        let req = QueryRequest {
            destination: "TSLA/1Min/OHLCV".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&req).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("destination"));
    }

    #[test]
    fn test_key_offsets_replace_keeps_position() {
        let mut offsets = KeyOffsets::new();
        offsets.insert("B", 5);
        offsets.insert("A", 0);
        offsets.insert("B", 7);
        let entries: Vec<(&str, u64)> = offsets.iter().collect();
        assert_eq!(entries, vec![("B", 7), ("A", 0)]);
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets.get("C"), None);
    }

    #[test]
    fn test_server_response_nil_fields() {
        #[derive(Serialize)]
        struct Ack {
            responses: Option<Vec<ServerResponse>>,
        }
        let bytes = rmp_serde::to_vec_named(&Ack { responses: None }).unwrap();
        let ack: MultiServerResponse = rmp_serde::from_slice(&bytes).unwrap();
        assert!(ack.responses.is_empty());

        #[derive(Serialize)]
        struct Entry {
            error: Option<String>,
            version: Option<String>,
        }
        let bytes = rmp_serde::to_vec_named(&Entry {
            error: None,
            version: None,
        })
        .unwrap();
        let entry: ServerResponse = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(entry, ServerResponse::default());
    }

    #[test]
    fn test_query_response_nil_responses() {
        #[derive(Serialize)]
        struct Reply {
            responses: Option<Vec<QueryResponse>>,
            timezone: &'static str,
            version: Option<String>,
        }
        let bytes = rmp_serde::to_vec_named(&Reply {
            responses: None,
            timezone: "UTC",
            version: None,
        })
        .unwrap();
        let reply: MultiQueryResponse = rmp_serde::from_slice(&bytes).unwrap();
        assert!(reply.responses.is_empty());
        assert_eq!(reply.timezone, "UTC");
        assert_eq!(reply.version, "");
    }

    #[test]
    fn test_list_symbols_response_null_results() {
        let resp: ListSymbolsResponse = serde_json::from_str(r#"{"Results": null}"#).unwrap();
        assert_eq!(resp.results, None);
    }
}
