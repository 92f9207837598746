//! Response decoder: multiplexed wire datasets to per-key tables.
//!
//! One wire dataset carries a single flat column set shared by every
//! destination key in it; `startindex`/`lengths` cut it into row windows.

use std::collections::HashMap;

use log::warn;

use crate::codec;
use crate::column::Table;
use crate::error::{Error, Result};
use crate::key::strip_category;
use crate::protocol::{MultiQueryResponse, WireDataset};

/// Splits one dataset into `(plain key, table)` pairs in wire order.
pub fn decode_dataset(dataset: &WireDataset) -> Result<Vec<(String, Table)>> {
    let table = codec::decode(&dataset.names, &dataset.types, &dataset.data, dataset.length)?;
    let mut out = Vec::with_capacity(dataset.startindex.len());
    for (wire_key, start) in dataset.startindex.iter() {
        let len = dataset
            .lengths
            .get(wire_key)
            .ok_or_else(|| Error::Protocol(format!("no length for key {wire_key}")))?;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= dataset.length)
            .ok_or_else(|| {
                Error::Protocol(format!(
                    "key {wire_key} window {start}+{len} exceeds {} rows",
                    dataset.length
                ))
            })?;
        // `end <= dataset.length`, which already fit in usize during decode.
        let slice = table
            .slice(start as usize..end as usize)
            .map_err(|err| Error::Protocol(err.to_string()))?;
        out.push((strip_category(wire_key).to_string(), slice));
    }
    Ok(out)
}

/// Decodes every entry of a query response. A key repeated across entries
/// keeps the last table seen.
pub fn decode_responses(response: &MultiQueryResponse) -> Result<Vec<(String, Table)>> {
    let mut out: Vec<(String, Table)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for entry in &response.responses {
        for (key, table) in decode_dataset(&entry.result)? {
            match positions.get(&key) {
                Some(&pos) => {
                    warn!("duplicate key {key} in query response, keeping the later result");
                    out[pos].1 = table;
                }
                None => {
                    positions.insert(key.clone(), out.len());
                    out.push((key, table));
                }
            }
        }
    }
    Ok(out)
}
