//! Query specifications.

use std::fmt;
use std::str::FromStr;

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::error::{Error, Result};
use crate::key::{DestinationKey, Timeframe};

/// One or more symbols; converts from a bare symbol or a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbols(pub Vec<String>);

impl From<&str> for Symbols {
    fn from(symbol: &str) -> Self {
        Symbols(vec![symbol.to_string()])
    }
}

impl From<String> for Symbols {
    fn from(symbol: String) -> Self {
        Symbols(vec![symbol])
    }
}

impl From<Vec<String>> for Symbols {
    fn from(symbols: Vec<String>) -> Self {
        Symbols(symbols)
    }
}

impl From<Vec<&str>> for Symbols {
    fn from(symbols: Vec<&str>) -> Self {
        Symbols(symbols.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Symbols {
    fn from(symbols: &[&str]) -> Self {
        Symbols(symbols.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Symbols {
    fn from(symbols: [&str; N]) -> Self {
        Symbols(symbols.iter().map(|s| s.to_string()).collect())
    }
}

/// A point in time as supplied by the caller.
///
/// Integers are whole seconds since the unix epoch; text is parsed as a
/// calendar timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeArg {
    Epoch(i64),
    Text(String),
    At(OffsetDateTime),
}

impl From<i64> for TimeArg {
    fn from(secs: i64) -> Self {
        TimeArg::Epoch(secs)
    }
}

impl From<&str> for TimeArg {
    fn from(text: &str) -> Self {
        TimeArg::Text(text.to_string())
    }
}

impl From<String> for TimeArg {
    fn from(text: String) -> Self {
        TimeArg::Text(text)
    }
}

impl From<OffsetDateTime> for TimeArg {
    fn from(at: OffsetDateTime) -> Self {
        TimeArg::At(at)
    }
}

impl TimeArg {
    pub fn resolve(&self) -> Result<OffsetDateTime> {
        match self {
            TimeArg::Epoch(secs) => OffsetDateTime::from_unix_timestamp(*secs)
                .map_err(|err| Error::Timestamp(format!("{secs}: {err}"))),
            TimeArg::Text(text) => parse_calendar(text),
            TimeArg::At(at) => Ok(*at),
        }
    }
}

/// Parses RFC 3339, a naive `YYYY-MM-DD[ T]HH:MM:SS[.fraction]` (UTC), or a
/// bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_calendar(text: &str) -> Result<OffsetDateTime> {
    let text = text.trim();
    if let Ok(at) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(at);
    }
    let naive_formats = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
    ];
    for format in naive_formats {
        if let Ok(naive) = PrimitiveDateTime::parse(text, format) {
            return Ok(naive.assume_utc());
        }
    }
    if let Ok(date) = Date::parse(text, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }
    Err(Error::Timestamp(text.to_string()))
}

/// Format of a symbol listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListSymbolsFormat {
    /// Symbol names only, e.g. `AAPL`.
    #[default]
    Symbol,
    /// Full keys, e.g. `AAPL/1Min/TICK`.
    Tbk,
}

impl ListSymbolsFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            ListSymbolsFormat::Symbol => "symbol",
            ListSymbolsFormat::Tbk => "tbk",
        }
    }
}

impl FromStr for ListSymbolsFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "symbol" => Ok(ListSymbolsFormat::Symbol),
            "tbk" => Ok(ListSymbolsFormat::Tbk),
            _ => Err(Error::InvalidParam {
                field: "format",
                expected: "symbol or tbk",
            }),
        }
    }
}

/// Fields of a [`QuerySpec`] that can be assigned by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamField {
    Symbols,
    Timeframe,
    AttrGroup,
    Start,
    End,
    Limit,
    LimitFromStart,
    Functions,
    KeyCategory,
    Columns,
}

impl ParamField {
    pub const fn name(self) -> &'static str {
        match self {
            ParamField::Symbols => "symbols",
            ParamField::Timeframe => "timeframe",
            ParamField::AttrGroup => "attrgroup",
            ParamField::Start => "start",
            ParamField::End => "end",
            ParamField::Limit => "limit",
            ParamField::LimitFromStart => "limit_from_start",
            ParamField::Functions => "functions",
            ParamField::KeyCategory => "key_category",
            ParamField::Columns => "columns",
        }
    }
}

impl FromStr for ParamField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let field = match s {
            "symbols" => ParamField::Symbols,
            "timeframe" => ParamField::Timeframe,
            "attrgroup" => ParamField::AttrGroup,
            "start" => ParamField::Start,
            "end" => ParamField::End,
            "limit" => ParamField::Limit,
            "limit_from_start" => ParamField::LimitFromStart,
            "functions" => ParamField::Functions,
            "key_category" => ParamField::KeyCategory,
            "columns" => ParamField::Columns,
            other => return Err(Error::UnknownField(other.to_string())),
        };
        Ok(field)
    }
}

/// Untyped value for [`QuerySpec::set`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Int(i64),
    Bool(bool),
    Text(String),
    List(Vec<String>),
    Time(OffsetDateTime),
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        ParamValue::List(values.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        ParamValue::List(values)
    }
}

impl From<OffsetDateTime> for ParamValue {
    fn from(value: OffsetDateTime) -> Self {
        ParamValue::Time(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

fn optional_time(value: ParamValue, field: &'static str) -> Result<Option<OffsetDateTime>> {
    let arg = match value {
        ParamValue::Null => return Ok(None),
        ParamValue::Int(secs) => TimeArg::Epoch(secs),
        ParamValue::Text(text) => TimeArg::Text(text),
        ParamValue::Time(at) => TimeArg::At(at),
        _ => {
            return Err(Error::InvalidParam {
                field,
                expected: "epoch seconds, calendar text or timestamp",
            })
        }
    };
    arg.resolve().map(Some)
}

/// What to query: one destination key, an optional time range, an optional
/// row limit and optional server-side functions.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    key: DestinationKey,
    pub key_category: Option<String>,
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
    pub limit: Option<i32>,
    pub limit_from_start: Option<bool>,
    pub functions: Option<Vec<String>>,
    /// Column names the caller is interested in. Carried for callers and
    /// never put on the wire; the server returns every column.
    pub columns: Option<Vec<String>>,
}

impl QuerySpec {
    pub fn new(
        symbols: impl Into<Symbols>,
        timeframe: &str,
        attribute_group: &str,
    ) -> Result<Self> {
        let key = DestinationKey::new(
            symbols.into().0,
            Timeframe::new(timeframe)?,
            attribute_group,
        )?;
        Ok(Self {
            key,
            key_category: None,
            start: None,
            end: None,
            limit: None,
            limit_from_start: None,
            functions: None,
            columns: None,
        })
    }

    pub fn with_start(mut self, start: impl Into<TimeArg>) -> Result<Self> {
        self.start = Some(start.into().resolve()?);
        Ok(self)
    }

    pub fn with_end(mut self, end: impl Into<TimeArg>) -> Result<Self> {
        self.end = Some(end.into().resolve()?);
        Ok(self)
    }

    pub fn with_range(self, start: impl Into<TimeArg>, end: impl Into<TimeArg>) -> Result<Self> {
        self.with_start(start)?.with_end(end)
    }

    pub fn with_limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_limit_from_start(mut self, from_start: bool) -> Self {
        self.limit_from_start = Some(from_start);
        self
    }

    pub fn with_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.functions = Some(functions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn destination(&self) -> &DestinationKey {
        &self.key
    }

    pub fn symbols(&self) -> &[String] {
        self.key.symbols()
    }

    /// Assigns a field by name. Unknown names and mismatched value kinds are
    /// rejected; `start`/`end` follow the [`TimeArg`] coercion rule.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<&mut Self> {
        let field: ParamField = name.parse()?;
        self.set_field(field, value.into())?;
        Ok(self)
    }

    pub fn set_field(&mut self, field: ParamField, value: ParamValue) -> Result<()> {
        let name = field.name();
        match field {
            ParamField::Symbols => {
                let symbols = match value {
                    ParamValue::Text(symbol) => vec![symbol],
                    ParamValue::List(symbols) => symbols,
                    _ => {
                        return Err(Error::InvalidParam {
                            field: name,
                            expected: "symbol or list of symbols",
                        })
                    }
                };
                self.key = DestinationKey::new(
                    symbols,
                    self.key.timeframe().clone(),
                    self.key.attribute_group(),
                )?;
            }
            ParamField::Timeframe => {
                let ParamValue::Text(timeframe) = value else {
                    return Err(Error::InvalidParam {
                        field: name,
                        expected: "timeframe text",
                    });
                };
                self.key = DestinationKey::new(
                    self.key.symbols().to_vec(),
                    Timeframe::new(timeframe)?,
                    self.key.attribute_group(),
                )?;
            }
            ParamField::AttrGroup => {
                let ParamValue::Text(group) = value else {
                    return Err(Error::InvalidParam {
                        field: name,
                        expected: "attribute group text",
                    });
                };
                self.key = DestinationKey::new(
                    self.key.symbols().to_vec(),
                    self.key.timeframe().clone(),
                    group,
                )?;
            }
            ParamField::Start => self.start = optional_time(value, name)?,
            ParamField::End => self.end = optional_time(value, name)?,
            ParamField::Limit => {
                self.limit = match value {
                    ParamValue::Null => None,
                    ParamValue::Int(limit) => Some(i32::try_from(limit).map_err(|_| {
                        Error::InvalidParam {
                            field: name,
                            expected: "32-bit row count",
                        }
                    })?),
                    _ => {
                        return Err(Error::InvalidParam {
                            field: name,
                            expected: "integer",
                        })
                    }
                };
            }
            ParamField::LimitFromStart => {
                self.limit_from_start = match value {
                    ParamValue::Null => None,
                    ParamValue::Bool(flag) => Some(flag),
                    _ => {
                        return Err(Error::InvalidParam {
                            field: name,
                            expected: "bool",
                        })
                    }
                };
            }
            ParamField::Functions => {
                self.functions = match value {
                    ParamValue::Null => None,
                    ParamValue::Text(function) => Some(vec![function]),
                    ParamValue::List(functions) => Some(functions),
                    _ => {
                        return Err(Error::InvalidParam {
                            field: name,
                            expected: "list of function names",
                        })
                    }
                };
            }
            ParamField::Columns => {
                self.columns = match value {
                    ParamValue::Null => None,
                    ParamValue::Text(column) => Some(vec![column]),
                    ParamValue::List(columns) => Some(columns),
                    _ => {
                        return Err(Error::InvalidParam {
                            field: name,
                            expected: "list of column names",
                        })
                    }
                };
            }
            ParamField::KeyCategory => {
                self.key_category = match value {
                    ParamValue::Null => None,
                    ParamValue::Text(category) => Some(category),
                    _ => {
                        return Err(Error::InvalidParam {
                            field: name,
                            expected: "text",
                        })
                    }
                };
            }
        }
        Ok(())
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QuerySpec(tbk={}, start={:?}, end={:?}, limit={:?}, limit_from_start={:?}, columns={:?})",
            self.key, self.start, self.end, self.limit, self.limit_from_start, self.columns
        )
    }
}

impl From<QuerySpec> for Vec<QuerySpec> {
    fn from(spec: QuerySpec) -> Self {
        vec![spec]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_destination() {
        let spec = QuerySpec::new("TSLA", "1Min", "OHLCV").unwrap();
        assert_eq!(spec.destination().to_string(), "TSLA/1Min/OHLCV");

        let spec = QuerySpec::new(vec!["FORD", "TSLA"], "5Min", "OHLCV").unwrap();
        assert_eq!(spec.destination().to_string(), "FORD,TSLA/5Min/OHLCV");
    }

    #[test]
    fn test_new_rejects_bad_timeframe() {
        assert!(matches!(
            QuerySpec::new("TSLA", "5Minutes", "OHLCV"),
            Err(Error::Timeframe(_))
        ));
        for tf in ["5Min", "1H", "3D"] {
            assert!(QuerySpec::new("TSLA", tf, "OHLCV").is_ok());
        }
    }

    #[test]
    fn test_epoch_and_calendar_coercion() {
        let epoch = TimeArg::Epoch(1_500_000_000).resolve().unwrap();
        assert_eq!(epoch.unix_timestamp(), 1_500_000_000);

        let text = TimeArg::from("2017-07-14T02:40:00Z").resolve().unwrap();
        assert_eq!(text, epoch);

        let naive = TimeArg::from("2017-07-14 02:40:00").resolve().unwrap();
        assert_eq!(naive, epoch);

        let fractional = TimeArg::from("2017-07-14 02:40:00.000000123").resolve().unwrap();
        assert_eq!(fractional.unix_timestamp_nanos(), 1_500_000_000_000_000_123);

        let date = TimeArg::from("2017-07-14").resolve().unwrap();
        assert_eq!(date.unix_timestamp(), 1_499_990_400);

        assert!(matches!(
            TimeArg::from("yesterday").resolve(),
            Err(Error::Timestamp(_))
        ));
    }

    #[test]
    fn test_set_by_name() {
        let mut spec = QuerySpec::new("TSLA", "1Min", "OHLCV").unwrap();
        spec.set("limit", 200).unwrap();
        spec.set("limit_from_start", false).unwrap();
        spec.set("start", 1_000_000_000_i64).unwrap();
        spec.set("end", "2019-01-01T00:00:00Z").unwrap();
        spec.set("functions", vec!["Gap('1Min')"]).unwrap();

        assert_eq!(spec.limit, Some(200));
        assert_eq!(spec.limit_from_start, Some(false));
        assert_eq!(spec.start.unwrap().unix_timestamp(), 1_000_000_000);
        assert_eq!(spec.end.unwrap().unix_timestamp(), 1_546_300_800);
        assert_eq!(spec.functions, Some(vec!["Gap('1Min')".to_string()]));

        spec.set("limit", ParamValue::Null).unwrap();
        assert_eq!(spec.limit, None);
    }

    #[test]
    fn test_set_columns() {
        let mut spec = QuerySpec::new("TSLA", "1Min", "OHLCV").unwrap();
        spec.set("columns", vec!["Open", "Close"]).unwrap();
        assert_eq!(
            spec.columns,
            Some(vec!["Open".to_string(), "Close".to_string()])
        );
        assert!(matches!(
            spec.set("columns", 3),
            Err(Error::InvalidParam { field: "columns", .. })
        ));
        spec.set("columns", ParamValue::Null).unwrap();
        assert_eq!(spec.columns, None);

        let built = QuerySpec::new("TSLA", "1Min", "OHLCV")
            .unwrap()
            .with_columns(["Close"]);
        assert_eq!(built.columns, Some(vec!["Close".to_string()]));
    }

    #[test]
    fn test_set_rejects_unknown_field() {
        let mut spec = QuerySpec::new("TSLA", "1Min", "OHLCV").unwrap();
        assert!(matches!(
            spec.set("tbk", "X/1Min/OHLCV"),
            Err(Error::UnknownField(name)) if name == "tbk"
        ));
    }

    #[test]
    fn test_set_rejects_wrong_kind() {
        let mut spec = QuerySpec::new("TSLA", "1Min", "OHLCV").unwrap();
        assert!(matches!(
            spec.set("limit", "ten"),
            Err(Error::InvalidParam { field: "limit", .. })
        ));
        assert!(matches!(
            spec.set("limit_from_start", 1),
            Err(Error::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_set_timeframe_revalidates() {
        let mut spec = QuerySpec::new("TSLA", "1Min", "OHLCV").unwrap();
        spec.set("timeframe", "1D").unwrap();
        assert_eq!(spec.destination().to_string(), "TSLA/1D/OHLCV");
        assert!(matches!(
            spec.set("timeframe", "daily"),
            Err(Error::Timeframe(_))
        ));
        assert_eq!(spec.destination().to_string(), "TSLA/1D/OHLCV");

        spec.set("symbols", vec!["AAPL", "AMZN"]).unwrap();
        assert_eq!(spec.destination().to_string(), "AAPL,AMZN/1D/OHLCV");
    }
}
