//! Request builder: query specs and write payloads to wire requests.

use time::OffsetDateTime;

use crate::codec;
use crate::column::{Column, ColumnData, DataType, Table, Value, EPOCH_COLUMN};
use crate::error::{Error, Result};
use crate::key::DestinationKey;
use crate::params::{ListSymbolsFormat, QuerySpec};
use crate::protocol::{
    CreateRequest, KeyOffsets, KeyRequest, ListSymbolsRequest, MultiCreateRequest,
    MultiKeyRequest, MultiQueryRequest, MultiWriteRequest, QueryRequest, WireDataset,
    WriteRequest,
};

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Splits a timestamp into floor seconds and a non-negative nanosecond remainder.
fn split_nanos(at: OffsetDateTime) -> (i64, i64) {
    let nanos = at.unix_timestamp_nanos();
    let secs = nanos.div_euclid(NANOS_PER_SEC) as i64;
    let rem = nanos.rem_euclid(NANOS_PER_SEC) as i64;
    (secs, rem)
}

impl QuerySpec {
    /// Wire form of this spec. Unset fields are left out entirely and the
    /// nanosecond remainder is only sent when non-zero.
    pub fn to_wire(&self) -> QueryRequest {
        let mut req = QueryRequest {
            destination: self.destination().to_string(),
            key_category: self.key_category.clone(),
            limit_record_count: self.limit,
            limit_from_start: self.limit_from_start,
            functions: self.functions.clone(),
            ..Default::default()
        };
        if let Some(start) = self.start {
            let (secs, nanos) = split_nanos(start);
            req.epoch_start = Some(secs);
            req.epoch_start_nanos = (nanos != 0).then_some(nanos);
        }
        if let Some(end) = self.end {
            let (secs, nanos) = split_nanos(end);
            req.epoch_end = Some(secs);
            req.epoch_end_nanos = (nanos != 0).then_some(nanos);
        }
        req
    }
}

/// Builds one query batch; a single spec becomes a one-element batch.
pub fn build_query(specs: impl Into<Vec<QuerySpec>>) -> MultiQueryRequest {
    MultiQueryRequest {
        requests: specs.into().iter().map(QuerySpec::to_wire).collect(),
    }
}

/// Tabular data accepted by a write.
///
/// Every shape is normalized to a column set whose first column is `Epoch`
/// (i64 seconds). Sub-second precision of the time index is truncated.
#[derive(Debug, Clone, PartialEq)]
pub enum WritePayload {
    /// Structure-of-arrays table that already carries its `Epoch` column.
    Records(Table),
    /// One named column indexed by time.
    Series {
        name: String,
        index: Vec<OffsetDateTime>,
        values: ColumnData,
    },
    /// A single row: one timestamp and named scalar fields.
    Row {
        timestamp: OffsetDateTime,
        fields: Vec<(String, Value)>,
    },
    /// Row-major table indexed by time.
    Frame {
        index: Vec<OffsetDateTime>,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
}

fn epoch_column(index: &[OffsetDateTime]) -> Column {
    Column::new(
        EPOCH_COLUMN,
        index.iter().map(|at| at.unix_timestamp()).collect::<Vec<i64>>(),
    )
}

impl WritePayload {
    pub fn series(
        name: impl Into<String>,
        index: Vec<OffsetDateTime>,
        values: impl Into<ColumnData>,
    ) -> Self {
        WritePayload::Series {
            name: name.into(),
            index,
            values: values.into(),
        }
    }

    pub fn row<I, S, V>(timestamp: OffsetDateTime, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        WritePayload::Row {
            timestamp,
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }

    /// Normalizes the payload into a column set led by `Epoch`.
    pub fn to_table(&self) -> Result<Table> {
        match self {
            WritePayload::Records(table) => records_to_table(table),
            WritePayload::Series {
                name,
                index,
                values,
            } => {
                if index.len() != values.len() {
                    return Err(Error::Payload(format!(
                        "series {name} has {} index entries for {} values",
                        index.len(),
                        values.len()
                    )));
                }
                Table::new(vec![
                    epoch_column(index),
                    Column {
                        name: name.clone(),
                        data: values.clone(),
                    },
                ])
            }
            WritePayload::Row { timestamp, fields } => {
                let mut columns = Vec::with_capacity(fields.len() + 1);
                columns.push(epoch_column(std::slice::from_ref(timestamp)));
                for (name, value) in fields {
                    let mut data = ColumnData::empty(value.data_type());
                    data.push(*value)?;
                    columns.push(Column {
                        name: name.clone(),
                        data,
                    });
                }
                Table::new(columns)
            }
            WritePayload::Frame {
                index,
                columns,
                rows,
            } => frame_to_table(index, columns, rows),
        }
    }
}

/// Moves the i64 `Epoch` column to the front; records without one are rejected.
fn records_to_table(table: &Table) -> Result<Table> {
    if table.columns().is_empty() {
        return Err(Error::Schema("records declare no columns".to_string()));
    }
    let epoch = table
        .column(EPOCH_COLUMN)
        .ok_or_else(|| Error::Payload(format!("records have no {EPOCH_COLUMN} column")))?;
    if epoch.data_type() != DataType::Int64 {
        return Err(Error::Payload(format!(
            "{EPOCH_COLUMN} column is {}, expected i8",
            epoch.data_type()
        )));
    }
    let mut columns = Vec::with_capacity(table.columns().len());
    columns.push(epoch.clone());
    columns.extend(
        table
            .columns()
            .iter()
            .filter(|column| column.name != EPOCH_COLUMN)
            .cloned(),
    );
    Table::new(columns)
}

fn frame_to_table(index: &[OffsetDateTime], names: &[String], rows: &[Vec<Value>]) -> Result<Table> {
    if index.len() != rows.len() {
        return Err(Error::Payload(format!(
            "frame has {} index entries for {} rows",
            index.len(),
            rows.len()
        )));
    }
    let types: Vec<DataType> = match rows.first() {
        Some(first) => first.iter().map(Value::data_type).collect(),
        None => {
            return Err(Error::Payload(
                "frame has no rows to infer column types from".to_string(),
            ))
        }
    };
    if types.len() != names.len() {
        return Err(Error::Payload(format!(
            "frame declares {} columns but rows hold {} values",
            names.len(),
            types.len()
        )));
    }
    let mut data: Vec<ColumnData> = types.iter().map(|t| ColumnData::empty(*t)).collect();
    for (i, row) in rows.iter().enumerate() {
        if row.len() != names.len() {
            return Err(Error::Payload(format!(
                "frame row {i} holds {} values, expected {}",
                row.len(),
                names.len()
            )));
        }
        for ((value, column), name) in row.iter().zip(data.iter_mut()).zip(names) {
            column.push(*value).map_err(|_| {
                Error::Payload(format!(
                    "frame row {i} column {name}: {} value in {} column",
                    value.data_type(),
                    column.data_type()
                ))
            })?;
        }
    }
    let mut columns = Vec::with_capacity(names.len() + 1);
    columns.push(epoch_column(index));
    columns.extend(names.iter().zip(data).map(|(name, data)| Column {
        name: name.clone(),
        data,
    }));
    Table::new(columns)
}

/// Builds a single-destination write: the whole column set goes to `key`
/// starting at row 0.
pub fn build_write(
    payload: &WritePayload,
    key: &str,
    is_variable_length: bool,
) -> Result<MultiWriteRequest> {
    let table = payload.to_table()?;
    let columns = codec::encode(&table)?;
    let rows = columns.length;
    let startindex: KeyOffsets = [(key, 0_u64)].into_iter().collect();
    let lengths: KeyOffsets = [(key, rows)].into_iter().collect();
    Ok(MultiWriteRequest {
        requests: vec![WriteRequest {
            dataset: WireDataset::new(columns, startindex, lengths),
            is_variable_length,
        }],
    })
}

/// Builds a bucket creation request from `(name, type tag)` shapes.
pub fn build_create(
    key: &DestinationKey,
    shapes: &[(&str, &str)],
    is_variable_length: bool,
) -> Result<MultiCreateRequest> {
    if shapes.is_empty() {
        return Err(Error::Schema("bucket declares no columns".to_string()));
    }
    let mut column_names = Vec::with_capacity(shapes.len());
    let mut column_types = Vec::with_capacity(shapes.len());
    for (name, tag) in shapes {
        column_names.push(name.to_string());
        column_types.push(DataType::from_tag(tag)?.tag().to_string());
    }
    Ok(MultiCreateRequest {
        requests: vec![CreateRequest {
            key: key.with_category(),
            column_names,
            column_types,
            row_type: if is_variable_length { "variable" } else { "fixed" }.to_string(),
        }],
    })
}

pub fn build_destroy(key: &str) -> MultiKeyRequest {
    MultiKeyRequest {
        requests: vec![KeyRequest {
            key: key.to_string(),
        }],
    }
}

pub fn build_list_symbols(format: ListSymbolsFormat) -> ListSymbolsRequest {
    ListSymbolsRequest {
        format: format.as_str().to_string(),
    }
}
