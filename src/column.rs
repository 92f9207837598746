//! In-memory columnar tables.
//!
//! A [`Table`] is a structure-of-arrays: an ordered list of named columns that
//! all hold the same number of elements. The first column is conventionally
//! the `Epoch` time index (64-bit integer seconds since the unix epoch), but the
//! table itself only preserves column order.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

use crate::error::{Error, Result};

/// Name of the time index column.
pub const EPOCH_COLUMN: &str = "Epoch";

/// Primitive element types carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// Byte-order-neutral wire tag.
    pub const fn tag(self) -> &'static str {
        match self {
            DataType::Int32 => "i4",
            DataType::Int64 => "i8",
            DataType::Float32 => "f4",
            DataType::Float64 => "f8",
        }
    }

    pub const fn size(self) -> usize {
        match self {
            DataType::Int32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Float64 => 8,
        }
    }

    /// Parses a type tag, dropping little-endian / not-applicable byte-order
    /// markers. Big-endian tags are rejected since buffers are always native
    /// little-endian on both ends.
    pub fn from_tag(tag: &str) -> Result<Self> {
        let trimmed = tag.trim_start_matches(['<', '|', '=']);
        match trimmed {
            "i4" | "int32" => Ok(DataType::Int32),
            "i8" | "int64" => Ok(DataType::Int64),
            "f4" | "float32" => Ok(DataType::Float32),
            "f8" | "float64" => Ok(DataType::Float64),
            _ => Err(Error::UnsupportedType(tag.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single scalar cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub const fn data_type(&self) -> DataType {
        match self {
            Value::I32(_) => DataType::Int32,
            Value::I64(_) => DataType::Int64,
            Value::F32(_) => DataType::Float32,
            Value::F64(_) => DataType::Float64,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

/// Values of one column, packed contiguously.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! dispatch {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::I32($v) => $body,
            ColumnData::I64($v) => $body,
            ColumnData::F32($v) => $body,
            ColumnData::F64($v) => $body,
        }
    };
}

macro_rules! map_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::I32($v) => ColumnData::I32($body),
            ColumnData::I64($v) => ColumnData::I64($body),
            ColumnData::F32($v) => ColumnData::F32($body),
            ColumnData::F64($v) => ColumnData::F64($body),
        }
    };
}

impl ColumnData {
    pub fn empty(data_type: DataType) -> Self {
        match data_type {
            DataType::Int32 => ColumnData::I32(Vec::new()),
            DataType::Int64 => ColumnData::I64(Vec::new()),
            DataType::Float32 => ColumnData::F32(Vec::new()),
            DataType::Float64 => ColumnData::F64(Vec::new()),
        }
    }

    pub const fn data_type(&self) -> DataType {
        match self {
            ColumnData::I32(_) => DataType::Int32,
            ColumnData::I64(_) => DataType::Int64,
            ColumnData::F32(_) => DataType::Float32,
            ColumnData::F64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            ColumnData::I32(v) => v.get(index).copied().map(Value::I32),
            ColumnData::I64(v) => v.get(index).copied().map(Value::I64),
            ColumnData::F32(v) => v.get(index).copied().map(Value::F32),
            ColumnData::F64(v) => v.get(index).copied().map(Value::F64),
        }
    }

    /// Appends a scalar of the same type.
    pub fn push(&mut self, value: Value) -> Result<()> {
        match (self, value) {
            (ColumnData::I32(v), Value::I32(x)) => v.push(x),
            (ColumnData::I64(v), Value::I64(x)) => v.push(x),
            (ColumnData::F32(v), Value::F32(x)) => v.push(x),
            (ColumnData::F64(v), Value::F64(x)) => v.push(x),
            (data, value) => {
                return Err(Error::Schema(format!(
                    "cannot append {} value to {} column",
                    value.data_type(),
                    data.data_type()
                )))
            }
        }
        Ok(())
    }

    pub(crate) fn slice(&self, range: Range<usize>) -> ColumnData {
        map_variant!(self, v => v[range].to_vec())
    }

    pub(crate) fn extend_from(&mut self, other: &ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::I32(a), ColumnData::I32(b)) => a.extend_from_slice(b),
            (ColumnData::I64(a), ColumnData::I64(b)) => a.extend_from_slice(b),
            (ColumnData::F32(a), ColumnData::F32(b)) => a.extend_from_slice(b),
            (ColumnData::F64(a), ColumnData::F64(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(Error::Schema(format!(
                    "column type mismatch: {} vs {}",
                    a.data_type(),
                    b.data_type()
                )))
            }
        }
        Ok(())
    }

    /// Packs the values into a little-endian byte buffer.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len() * self.data_type().size());
        dispatch!(self, v => {
            for x in v {
                buf.extend_from_slice(&x.to_le_bytes());
            }
        });
        buf
    }

    /// Reinterprets a little-endian buffer as `count` values of `data_type`.
    pub fn from_le_bytes(data_type: DataType, bytes: &[u8], count: usize) -> Result<Self> {
        let expected = count
            .checked_mul(data_type.size())
            .ok_or_else(|| Error::Schema(format!("element count {count} overflows")))?;
        if bytes.len() != expected {
            return Err(Error::Schema(format!(
                "buffer holds {} bytes, expected {} for {} x {}",
                bytes.len(),
                expected,
                count,
                data_type
            )));
        }
        let data = match data_type {
            DataType::Int32 => ColumnData::I32(
                bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes(c.try_into().expect("chunk length")))
                    .collect(),
            ),
            DataType::Int64 => ColumnData::I64(
                bytes
                    .chunks_exact(8)
                    .map(|c| i64::from_le_bytes(c.try_into().expect("chunk length")))
                    .collect(),
            ),
            DataType::Float32 => ColumnData::F32(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes(c.try_into().expect("chunk length")))
                    .collect(),
            ),
            DataType::Float64 => ColumnData::F64(
                bytes
                    .chunks_exact(8)
                    .map(|c| f64::from_le_bytes(c.try_into().expect("chunk length")))
                    .collect(),
            ),
        };
        Ok(data)
    }
}

impl From<Vec<i32>> for ColumnData {
    fn from(values: Vec<i32>) -> Self {
        ColumnData::I32(values)
    }
}

impl From<Vec<i64>> for ColumnData {
    fn from(values: Vec<i64>) -> Self {
        ColumnData::I64(values)
    }
}

impl From<Vec<f32>> for ColumnData {
    fn from(values: Vec<f32>) -> Self {
        ColumnData::F32(values)
    }
}

impl From<Vec<f64>> for ColumnData {
    fn from(values: Vec<f64>) -> Self {
        ColumnData::F64(values)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: impl Into<ColumnData>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }
}

/// Ordered, equal-length named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    len: usize,
}

impl Table {
    /// Builds a table, checking that names are unique and non-empty and that
    /// every column holds the same number of elements. A table without columns
    /// is allowed in memory but cannot be encoded.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let len = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if column.name.is_empty() {
                return Err(Error::Schema("column name is empty".to_string()));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(Error::Schema(format!("duplicate column {}", column.name)));
            }
            if column.len() != len {
                return Err(Error::Schema(format!(
                    "column {} has {} elements, expected {}",
                    column.name,
                    column.len(),
                    len
                )));
            }
        }
        Ok(Self { columns, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The `Epoch` column as seconds, when present with the conventional type.
    pub fn epochs(&self) -> Option<&[i64]> {
        match self.column(EPOCH_COLUMN).map(|c| &c.data) {
            Some(ColumnData::I64(values)) => Some(values),
            _ => None,
        }
    }

    /// Cells of row `index` in column order.
    pub fn row(&self, index: usize) -> Option<Vec<Value>> {
        if index >= self.len {
            return None;
        }
        self.columns.iter().map(|c| c.data.get(index)).collect()
    }

    /// Copies rows `range` into a new table.
    pub fn slice(&self, range: Range<usize>) -> Result<Table> {
        if range.start > range.end || range.end > self.len {
            return Err(Error::Schema(format!(
                "row range {}..{} out of bounds for {} rows",
                range.start, range.end, self.len
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                data: c.data.slice(range.clone()),
            })
            .collect();
        Ok(Table {
            columns,
            len: range.end - range.start,
        })
    }

    /// One-row table holding the last row, or `None` when empty.
    pub fn last_row(&self) -> Option<Table> {
        if self.is_empty() {
            return None;
        }
        self.slice(self.len - 1..self.len).ok()
    }

    /// Keeps only the named columns, in the given order.
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<Table> {
        let mut columns = Vec::new();
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| Error::Schema(format!("missing column {name}")))?;
            columns.push(column.clone());
        }
        Table::new(columns)
    }

    /// Appends the rows of `other`, matching columns by name.
    pub fn append(&mut self, other: &Table) -> Result<()> {
        if other.columns.len() != self.columns.len() {
            return Err(Error::Schema(format!(
                "cannot append {} columns to {}",
                other.columns.len(),
                self.columns.len()
            )));
        }
        for column in &mut self.columns {
            let source = other
                .column(&column.name)
                .ok_or_else(|| Error::Schema(format!("missing column {}", column.name)))?;
            column.data.extend_from(&source.data)?;
        }
        self.len += other.len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(vec![
            Column::new(EPOCH_COLUMN, vec![10_i64, 20, 30]),
            Column::new("Close", vec![1.5_f64, 2.5, 3.5]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_tag_strips_byte_order() {
        assert_eq!(DataType::from_tag("<f8").unwrap(), DataType::Float64);
        assert_eq!(DataType::from_tag("|i4").unwrap(), DataType::Int32);
        assert_eq!(DataType::from_tag("i8").unwrap(), DataType::Int64);
        assert_eq!(DataType::from_tag("float32").unwrap(), DataType::Float32);
    }

    #[test]
    fn test_from_tag_rejects_unsupported() {
        for tag in [">f8", "u2", "U8", "O", ""] {
            assert!(matches!(
                DataType::from_tag(tag),
                Err(Error::UnsupportedType(_))
            ));
        }
    }

    #[test]
    fn test_table_rejects_ragged_columns() {
        let err = Table::new(vec![
            Column::new("a", vec![1_i32, 2]),
            Column::new("b", vec![1_i32]),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_table_rejects_duplicate_names() {
        let err = Table::new(vec![
            Column::new("a", vec![1_i32]),
            Column::new("a", vec![2_i32]),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_slice_and_last_row() {
        let table = sample();
        let tail = table.slice(1..3).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.epochs().unwrap(), &[20, 30]);

        let last = table.last_row().unwrap();
        assert_eq!(last.row(0).unwrap(), vec![Value::I64(30), Value::F64(3.5)]);
        assert!(table.slice(2..4).is_err());
    }

    #[test]
    fn test_append_matches_by_name() {
        let mut table = sample();
        let other = Table::new(vec![
            Column::new("Close", vec![4.5_f64]),
            Column::new(EPOCH_COLUMN, vec![40_i64]),
        ])
        .unwrap();
        table.append(&other).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.epochs().unwrap(), &[10, 20, 30, 40]);
    }

    #[test]
    fn test_le_bytes_length_checked() {
        let err = ColumnData::from_le_bytes(DataType::Int64, &[0u8; 12], 2).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }
}
