//! Destination keys: `symbol[,symbol...]/timeframe/attribute-group`.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::protocol::KEY_CATEGORY_SUFFIX;

fn timeframe_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+(Sec|Min|H|D|W|M|Y)$").expect("timeframe regex"))
}

/// A validated timeframe such as `1Min`, `5Sec` or `1D`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timeframe(String);

impl Timeframe {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if !timeframe_pattern().is_match(&value) {
            return Err(Error::Timeframe(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Timeframe::new(s)
    }
}

/// Composite identifier of a bucket on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    symbols: Vec<String>,
    timeframe: Timeframe,
    attribute_group: String,
}

impl DestinationKey {
    pub fn new(
        symbols: Vec<String>,
        timeframe: Timeframe,
        attribute_group: impl Into<String>,
    ) -> Result<Self> {
        let attribute_group = attribute_group.into();
        if symbols.is_empty() || symbols.iter().any(|s| s.is_empty() || s.contains(['/', ','])) {
            return Err(Error::Schema(format!("invalid symbols {symbols:?}")));
        }
        if attribute_group.is_empty() || attribute_group.contains('/') {
            return Err(Error::Schema(format!(
                "invalid attribute group {attribute_group:?}"
            )));
        }
        Ok(Self {
            symbols,
            timeframe,
            attribute_group,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    pub fn attribute_group(&self) -> &str {
        &self.attribute_group
    }

    /// Wire form carrying the key category suffix.
    pub fn with_category(&self) -> String {
        format!("{self}:{KEY_CATEGORY_SUFFIX}")
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.symbols.join(","),
            self.timeframe,
            self.attribute_group
        )
    }
}

impl FromStr for DestinationKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let plain = strip_category(s);
        let mut parts = plain.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(symbols), Some(timeframe), Some(group), None) => DestinationKey::new(
                symbols.split(',').map(str::to_string).collect(),
                Timeframe::new(timeframe)?,
                group,
            ),
            _ => Err(Error::Schema(format!("malformed destination key {s:?}"))),
        }
    }
}

/// Drops the `:category` suffix from a wire key.
pub fn strip_category(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

/// Splits a plain key into (symbol, timeframe, attribute group) segments
/// without validating them.
pub fn key_segments(key: &str) -> (&str, &str, &str) {
    let mut parts = key.splitn(3, '/');
    let symbol = parts.next().unwrap_or("");
    let timeframe = parts.next().unwrap_or("");
    let group = parts.next().unwrap_or("");
    (symbol, timeframe, group)
}
