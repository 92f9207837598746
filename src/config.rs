//! Client configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial file is
//! accepted.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::{Endpoint, DEFAULT_ENDPOINT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Msgpack RPC URL, or a `host:port` target when `binary` is set.
    /// Default: `http://localhost:5993/rpc`
    pub endpoint: String,

    /// Use the binary RPC protocol instead of msgpack RPC.
    /// Default: false
    pub binary: bool,

    /// Per-request timeout in seconds; `None` waits indefinitely.
    /// Default: None
    pub timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            binary: false,
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::select(&self.endpoint, self.binary)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
