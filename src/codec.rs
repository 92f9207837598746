//! Column codec: [`Table`] <-> flat wire buffers.
//!
//! Buffers are packed little-endian on both ends, so the wire tags never carry
//! a byte-order marker.

use serde_bytes::ByteBuf;

use crate::column::{Column, ColumnData, DataType, Table};
use crate::error::{Error, Result};
use crate::protocol::WireColumnSet;

pub fn encode(table: &Table) -> Result<WireColumnSet> {
    if table.columns().is_empty() {
        return Err(Error::Schema("column set declares no columns".to_string()));
    }
    let mut names = Vec::with_capacity(table.columns().len());
    let mut types = Vec::with_capacity(table.columns().len());
    let mut data = Vec::with_capacity(table.columns().len());
    for column in table.columns() {
        names.push(column.name.clone());
        types.push(column.data_type().tag().to_string());
        data.push(ByteBuf::from(column.data.to_le_bytes()));
    }
    Ok(WireColumnSet {
        names,
        types,
        data,
        length: table.len() as u64,
    })
}

/// Reinterprets each buffer as `element_count` values of its declared type.
pub fn decode<B: AsRef<[u8]>>(
    names: &[String],
    types: &[String],
    buffers: &[B],
    element_count: u64,
) -> Result<Table> {
    if names.len() != types.len() || names.len() != buffers.len() {
        return Err(Error::Schema(format!(
            "{} names, {} types, {} buffers",
            names.len(),
            types.len(),
            buffers.len()
        )));
    }
    let count = usize::try_from(element_count)
        .map_err(|_| Error::Schema(format!("element count {element_count} too large")))?;
    let mut columns = Vec::with_capacity(names.len());
    for ((name, tag), buffer) in names.iter().zip(types).zip(buffers) {
        let data_type = DataType::from_tag(tag)?;
        let data = ColumnData::from_le_bytes(data_type, buffer.as_ref(), count)
            .map_err(|err| Error::Schema(format!("column {name}: {err}")))?;
        columns.push(Column {
            name: name.clone(),
            data,
        });
    }
    Table::new(columns)
}

pub fn decode_set(set: &WireColumnSet) -> Result<Table> {
    decode(&set.names, &set.types, &set.data, set.length)
}
