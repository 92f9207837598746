//! Transports and endpoint selection.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::params::ListSymbolsFormat;
use crate::protocol::{
    MultiCreateRequest, MultiKeyRequest, MultiQueryRequest, MultiQueryResponse,
    MultiServerResponse, MultiWriteRequest,
};

pub mod binary;
#[cfg(feature = "rpc")]
pub mod rpc;

/// Default msgpack RPC endpoint of a local server.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5993/rpc";
/// Port the binary RPC service listens on next to the msgpack one.
pub const BINARY_RPC_PORT: u16 = 5995;

/// One request, one response; no retries.
pub trait Transport: Send + Sync {
    fn query(&self, request: &MultiQueryRequest) -> Result<MultiQueryResponse>;

    fn write(&self, request: &MultiWriteRequest) -> Result<MultiServerResponse>;

    fn create(&self, request: &MultiCreateRequest) -> Result<MultiServerResponse>;

    /// Symbol names or full keys known to the server; empty when it has none.
    fn list_symbols(&self, format: ListSymbolsFormat) -> Result<Vec<String>>;

    fn destroy(&self, request: &MultiKeyRequest) -> Result<MultiServerResponse>;

    fn server_version(&self) -> Result<String>;
}

fn rpc_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://(.*):\d+/rpc").expect("rpc url regex"))
}

/// Where and how to reach the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// URL of the msgpack RPC service.
    MsgpackRpc(String),
    /// `host:port` target of the binary RPC service.
    BinaryRpc(String),
}

impl Endpoint {
    /// Picks the endpoint for `conn`.
    ///
    /// For binary RPC an `http(s)://host:port/rpc` string is mapped to
    /// `host:5995` (an empty host means `localhost`); any other string is
    /// used verbatim.
    pub fn select(conn: &str, binary: bool) -> Self {
        if !binary {
            return Endpoint::MsgpackRpc(conn.to_string());
        }
        match rpc_url_pattern().captures(conn) {
            Some(caps) => {
                let host = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let host = if host.is_empty() { "localhost" } else { host };
                Endpoint::BinaryRpc(format!("{host}:{BINARY_RPC_PORT}"))
            }
            None => Endpoint::BinaryRpc(conn.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Endpoint::MsgpackRpc(url) | Endpoint::BinaryRpc(url) => url,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Endpoint::BinaryRpc(_))
    }

    /// Websocket URL of the subscription service, derived from the RPC URL:
    /// a trailing `/rpc` becomes `/ws` and the `http` scheme prefix becomes `ws`.
    pub fn stream_url(&self) -> String {
        let url = self.as_str();
        let url = match url.strip_suffix("/rpc") {
            Some(base) => format!("{base}/ws"),
            None => url.to_string(),
        };
        match url.strip_prefix("http") {
            Some(rest) => format!("ws{rest}"),
            None => url,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::MsgpackRpc(DEFAULT_ENDPOINT.to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_msgpack_keeps_url() {
        assert_eq!(
            Endpoint::select("http://db.internal:5993/rpc", false),
            Endpoint::MsgpackRpc("http://db.internal:5993/rpc".to_string())
        );
    }

    #[test]
    fn test_select_binary_rewrites_rpc_url() {
        assert_eq!(
            Endpoint::select("http://db.internal:5993/rpc", true),
            Endpoint::BinaryRpc("db.internal:5995".to_string())
        );
        assert_eq!(
            Endpoint::select("https://:5993/rpc", true),
            Endpoint::BinaryRpc("localhost:5995".to_string())
        );
        assert_eq!(
            Endpoint::select("db.internal:7000", true),
            Endpoint::BinaryRpc("db.internal:7000".to_string())
        );
    }

    #[test]
    fn test_stream_url() {
        assert_eq!(Endpoint::default().stream_url(), "ws://localhost:5993/ws");
        assert_eq!(
            Endpoint::MsgpackRpc("https://db.internal/rpc".to_string()).stream_url(),
            "wss://db.internal/ws"
        );
    }
}
