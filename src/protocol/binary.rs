//! Message shapes of the binary RPC protocol.
//!
//! These mirror the generated stub types. Query requests and key requests are
//! shared with the msgpack protocol; datasets, create requests and the
//! list-symbols format differ and convert to and from the msgpack shapes here.

use std::collections::BTreeMap;

use serde_bytes::ByteBuf;

use crate::error::{Error, Result};
use crate::protocol::{
    KeyOffsets, MultiCreateRequest, MultiWriteRequest, QueryResponse, WireDataset,
};

pub use crate::protocol::{
    KeyRequest, MultiKeyRequest, MultiQueryRequest, MultiServerResponse, QueryRequest,
};

/// Send and receive limit the stub channel must be configured with.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    pub max_send_message_length: usize,
    pub max_receive_message_length: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            max_send_message_length: MAX_MESSAGE_SIZE,
            max_receive_message_length: MAX_MESSAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumpyDataset {
    pub column_types: Vec<String>,
    pub column_names: Vec<String>,
    pub column_data: Vec<Vec<u8>>,
    pub length: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumpyMultiDataset {
    pub data: NumpyDataset,
    pub start_index: BTreeMap<String, i32>,
    pub lengths: BTreeMap<String, i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryQueryResponse {
    pub result: NumpyMultiDataset,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryMultiQueryResponse {
    pub responses: Vec<BinaryQueryResponse>,
    pub version: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryWriteRequest {
    pub data: NumpyMultiDataset,
    pub is_variable_length: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryMultiWriteRequest {
    pub requests: Vec<BinaryWriteRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataShape {
    pub name: String,
    pub r#type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryCreateRequest {
    pub key: String,
    pub data_shapes: Vec<DataShape>,
    pub row_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMultiCreateRequest {
    pub requests: Vec<BinaryCreateRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSymbolsFormat {
    Symbol = 0,
    TimeBucketKey = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryListSymbolsRequest {
    pub format: ListSymbolsFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryListSymbolsResponse {
    pub results: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerVersionRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerVersionResponse {
    pub version: String,
}

fn to_i32(value: u64, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::Payload(format!("{what} {value} exceeds i32")))
}

fn to_u64(value: i32, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Protocol(format!("negative {what}: {value}")))
}

fn offsets_to_map(offsets: &KeyOffsets, what: &str) -> Result<BTreeMap<String, i32>> {
    offsets
        .iter()
        .map(|(k, v)| Ok((k.to_string(), to_i32(v, what)?)))
        .collect()
}

fn map_to_offsets(map: BTreeMap<String, i32>, what: &str) -> Result<KeyOffsets> {
    let mut offsets = KeyOffsets::new();
    for (k, v) in map {
        offsets.insert(k, to_u64(v, what)?);
    }
    Ok(offsets)
}

impl NumpyMultiDataset {
    pub fn from_wire(dataset: &WireDataset) -> Result<Self> {
        Ok(Self {
            data: NumpyDataset {
                column_types: dataset.types.clone(),
                column_names: dataset.names.clone(),
                column_data: dataset.data.iter().map(|b| b.to_vec()).collect(),
                length: to_i32(dataset.length, "length")?,
            },
            start_index: offsets_to_map(&dataset.startindex, "start index")?,
            lengths: offsets_to_map(&dataset.lengths, "length")?,
        })
    }

    pub fn into_wire(self) -> Result<WireDataset> {
        Ok(WireDataset {
            names: self.data.column_names,
            types: self.data.column_types,
            data: self.data.column_data.into_iter().map(ByteBuf::from).collect(),
            length: to_u64(self.data.length, "length")?,
            startindex: map_to_offsets(self.start_index, "start index")?,
            lengths: map_to_offsets(self.lengths, "length")?,
        })
    }
}

impl BinaryMultiQueryResponse {
    pub fn into_wire(self) -> Result<crate::protocol::MultiQueryResponse> {
        let responses = self
            .responses
            .into_iter()
            .map(|r| {
                Ok(QueryResponse {
                    result: r.result.into_wire()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(crate::protocol::MultiQueryResponse {
            responses,
            timezone: self.timezone,
            version: self.version,
        })
    }
}

impl BinaryMultiWriteRequest {
    pub fn from_wire(req: &MultiWriteRequest) -> Result<Self> {
        let requests = req
            .requests
            .iter()
            .map(|r| {
                Ok(BinaryWriteRequest {
                    data: NumpyMultiDataset::from_wire(&r.dataset)?,
                    is_variable_length: r.is_variable_length,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { requests })
    }
}

impl From<&MultiCreateRequest> for BinaryMultiCreateRequest {
    fn from(req: &MultiCreateRequest) -> Self {
        let requests = req
            .requests
            .iter()
            .map(|r| BinaryCreateRequest {
                key: r.key.clone(),
                data_shapes: r
                    .column_names
                    .iter()
                    .zip(&r.column_types)
                    .map(|(name, ty)| DataShape {
                        name: name.clone(),
                        r#type: ty.clone(),
                    })
                    .collect(),
                row_type: r.row_type.clone(),
            })
            .collect();
        Self { requests }
    }
}
