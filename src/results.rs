//! Query result index.
//!
//! A [`QueryReply`] is built once from a decoded response and never mutated.
//! Datasets are reachable by full key, by symbol and by timeframe.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use time::{OffsetDateTime, UtcOffset};

use crate::column::Table;
use crate::error::{Error, Result};
use crate::key::key_segments;
use crate::params::QuerySpec;
use crate::protocol::MultiQueryResponse;
use crate::response::decode_responses;

/// One decoded table and the plain key it was returned under.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    key: String,
    table: Table,
    timezone: String,
}

impl DataSet {
    pub fn new(key: impl Into<String>, table: Table, timezone: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            table,
            timezone: timezone.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    /// Server timezone name as reported in the reply. It is a label only:
    /// [`DataSet::timestamps`] stays in UTC and callers that need local time
    /// resolve the name to an offset themselves.
    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn symbol(&self) -> &str {
        key_segments(&self.key).0
    }

    pub fn timeframe(&self) -> &str {
        key_segments(&self.key).1
    }

    pub fn attribute_group(&self) -> &str {
        key_segments(&self.key).2
    }

    /// The `Epoch` column as UTC timestamps. The server timezone is not
    /// applied; see [`DataSet::timestamps_at`].
    pub fn timestamps(&self) -> Result<Vec<OffsetDateTime>> {
        let epochs = self
            .table
            .epochs()
            .ok_or_else(|| Error::Schema(format!("{} has no i8 Epoch column", self.key)))?;
        epochs
            .iter()
            .map(|secs| {
                OffsetDateTime::from_unix_timestamp(*secs)
                    .map_err(|err| Error::Timestamp(format!("{secs}: {err}")))
            })
            .collect()
    }

    /// The `Epoch` column shifted to `offset`.
    pub fn timestamps_at(&self, offset: UtcOffset) -> Result<Vec<OffsetDateTime>> {
        Ok(self
            .timestamps()?
            .into_iter()
            .map(|at| at.to_offset(offset))
            .collect())
    }
}

impl fmt::Display for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataSet(key={}, rows={}, columns=[{}])",
            self.key,
            self.table.len(),
            self.table.names().collect::<Vec<_>>().join(", ")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Group {
    entries: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

/// Two-level index: outer name to (inner name, dataset position), both in
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
struct Grouped {
    names: Vec<String>,
    groups: HashMap<String, Group>,
}

impl Grouped {
    /// Adds `inner` under `outer`. When `inner` is already there the earlier
    /// position is returned and the index is left unchanged.
    fn insert(&mut self, outer: &str, inner: &str, position: usize) -> Option<usize> {
        let group = match self.groups.entry(outer.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.names.push(outer.to_string());
                entry.insert(Group::default())
            }
        };
        if let Some(&slot) = group.index.get(inner) {
            return Some(group.entries[slot].1);
        }
        group.index.insert(inner.to_string(), group.entries.len());
        group.entries.push((inner.to_string(), position));
        None
    }

    fn get(&self, outer: &str) -> Option<&[(String, usize)]> {
        self.groups.get(outer).map(|group| group.entries.as_slice())
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    fn entry_count(&self) -> usize {
        self.groups.values().map(|group| group.entries.len()).sum()
    }
}

/// Result of [`QueryReply::get`], in lookup priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a> {
    /// Exact full key.
    Key(&'a DataSet),
    /// A symbol: its datasets keyed by timeframe.
    Symbol(Vec<(&'a str, &'a DataSet)>),
    /// A timeframe: its datasets keyed by symbol.
    Timeframe(Vec<(&'a str, &'a DataSet)>),
}

/// Last row of every symbol under one timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestRows {
    /// Row labels, one per row of `table`.
    pub symbols: Vec<String>,
    pub table: Table,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryReply {
    datasets: Vec<DataSet>,
    by_key: HashMap<String, usize>,
    by_symbol: Grouped,
    by_timeframe: Grouped,
    default_timeframe: Option<String>,
    timezone: String,
    version: String,
}

impl QueryReply {
    /// Decodes a query response envelope and indexes it.
    pub fn from_response(response: &MultiQueryResponse) -> Result<Self> {
        let tables = decode_responses(response)?;
        Self::new(
            tables,
            response.timezone.clone(),
            response.version.clone(),
        )
    }

    /// Indexes already-decoded `(plain key, table)` pairs. A repeated key
    /// replaces the earlier table.
    ///
    /// Fails with [`Error::Protocol`] when one symbol and timeframe come back
    /// under two attribute groups: the symbol and timeframe maps could not
    /// reach both tables.
    pub fn new(
        tables: Vec<(String, Table)>,
        timezone: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let timezone = timezone.into();
        let mut datasets: Vec<DataSet> = Vec::with_capacity(tables.len());
        let mut by_key = HashMap::with_capacity(tables.len());
        for (key, table) in tables {
            match by_key.get(&key) {
                Some(&pos) => datasets[pos] = DataSet::new(key, table, timezone.clone()),
                None => {
                    by_key.insert(key.clone(), datasets.len());
                    datasets.push(DataSet::new(key, table, timezone.clone()));
                }
            }
        }

        let mut by_symbol = Grouped::default();
        let mut by_timeframe = Grouped::default();
        let mut default_timeframe = None;
        for (pos, dataset) in datasets.iter().enumerate() {
            let (symbol, timeframe, _) = key_segments(&dataset.key);
            if let Some(earlier) = by_symbol.insert(symbol, timeframe, pos) {
                return Err(Error::Protocol(format!(
                    "{symbol}/{timeframe} returned under both {} and {}",
                    datasets[earlier].key, dataset.key
                )));
            }
            by_timeframe.insert(timeframe, symbol, pos);
            if default_timeframe.is_none() {
                default_timeframe = Some(timeframe.to_string());
            }
        }

        Ok(Self {
            datasets,
            by_key,
            by_symbol,
            by_timeframe,
            default_timeframe,
            timezone,
            version: version.into(),
        })
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// First timeframe observed in the response.
    pub fn default_timeframe(&self) -> Option<&str> {
        self.default_timeframe.as_deref()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|d| d.key.as_str())
    }

    pub fn first(&self) -> Option<&DataSet> {
        self.datasets.first()
    }

    pub fn all(&self) -> &[DataSet] {
        &self.datasets
    }

    pub fn into_datasets(self) -> Vec<DataSet> {
        self.datasets
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.by_symbol.names()
    }

    pub fn timeframes(&self) -> impl Iterator<Item = &str> {
        self.by_timeframe.names()
    }

    pub fn dataset(&self, key: &str) -> Option<&DataSet> {
        self.by_key.get(key).map(|&pos| &self.datasets[pos])
    }

    fn resolve<'a>(&'a self, group: &'a [(String, usize)]) -> Vec<(&'a str, &'a DataSet)> {
        group
            .iter()
            .map(|(name, pos)| (name.as_str(), &self.datasets[*pos]))
            .collect()
    }

    /// Datasets of one symbol keyed by timeframe.
    pub fn by_symbol(&self, symbol: &str) -> Option<Vec<(&str, &DataSet)>> {
        self.by_symbol.get(symbol).map(|group| self.resolve(group))
    }

    /// Datasets of one timeframe keyed by symbol.
    pub fn by_timeframe(&self, timeframe: &str) -> Option<Vec<(&str, &DataSet)>> {
        self.by_timeframe.get(timeframe).map(|group| self.resolve(group))
    }

    /// Looks `name` up as a full key, then a symbol, then a timeframe.
    pub fn get(&self, name: &str) -> Result<Lookup<'_>> {
        if let Some(dataset) = self.dataset(name) {
            return Ok(Lookup::Key(dataset));
        }
        if let Some(group) = self.by_symbol(name) {
            return Ok(Lookup::Symbol(group));
        }
        if let Some(group) = self.by_timeframe(name) {
            return Ok(Lookup::Timeframe(group));
        }
        Err(Error::Key(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_key.contains_key(name)
            || self.by_symbol.get(name).is_some()
            || self.by_timeframe.get(name).is_some()
    }

    /// Projects the last row of each symbol's table under `timeframe`, or the
    /// default timeframe when `None`.
    ///
    /// Rows are taken as the server returned them; tables are assumed to be
    /// in ascending time order. The output columns are those of the first
    /// non-empty table.
    pub fn latest_row(&self, timeframe: Option<&str>) -> Result<LatestRows> {
        let timeframe = match timeframe.or(self.default_timeframe.as_deref()) {
            Some(tf) => tf,
            None => return Err(Error::Key("no timeframe in reply".to_string())),
        };
        let group = self
            .by_timeframe
            .get(timeframe)
            .ok_or_else(|| Error::Key(timeframe.to_string()))?;

        let mut symbols = Vec::with_capacity(group.len());
        let mut latest: Option<Table> = None;
        for (symbol, pos) in group {
            let Some(last) = self.datasets[*pos].table.last_row() else {
                continue;
            };
            latest = Some(match latest.take() {
                None => last,
                Some(mut acc) => {
                    let names: Vec<String> = acc.names().map(str::to_string).collect();
                    let row = last.select(names.iter().map(String::as_str))?;
                    acc.append(&row)?;
                    acc
                }
            });
            symbols.push(symbol.clone());
        }
        let table = latest.ok_or_else(|| Error::Key(timeframe.to_string()))?;
        Ok(LatestRows { symbols, table })
    }

    /// Fails with [`Error::Symbols`] naming every requested symbol the reply
    /// holds no data for.
    pub fn ensure_symbols(&self, specs: &[QuerySpec]) -> Result<()> {
        let mut missing: Vec<String> = Vec::new();
        for symbol in specs.iter().flat_map(QuerySpec::symbols) {
            if self.by_symbol.get(symbol).is_none() && !missing.contains(symbol) {
                missing.push(symbol.clone());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Symbols(missing))
        }
    }

    /// Entry counts of the primary map and of both derived maps.
    pub fn index_sizes(&self) -> (usize, usize, usize) {
        (
            self.by_key.len(),
            self.by_symbol.entry_count(),
            self.by_timeframe.entry_count(),
        )
    }
}

impl fmt::Display for QueryReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QueryReply(timezone={})", self.timezone)?;
        for dataset in &self.datasets {
            writeln!(f, "  {dataset}")?;
        }
        Ok(())
    }
}
