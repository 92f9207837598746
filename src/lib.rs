//! Client for a columnar time-series database server.
//!
//! Queries and writes travel as typed column sets over msgpack RPC or binary
//! RPC. Replies are decoded into [`Table`]s and indexed by key, symbol and
//! timeframe in a [`QueryReply`].

pub mod client;
pub mod codec;
pub mod column;
pub mod config;
pub mod error;
pub mod key;
pub mod params;
pub mod protocol;
pub mod request;
pub mod response;
pub mod results;
#[cfg(feature = "stream")]
pub mod stream;
pub mod transport;

pub use client::Client;
pub use column::{Column, ColumnData, DataType, Table, Value, EPOCH_COLUMN};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use key::{DestinationKey, Timeframe};
pub use params::{ListSymbolsFormat, QuerySpec, TimeArg};
pub use request::WritePayload;
pub use results::{DataSet, LatestRows, Lookup, QueryReply};
pub use transport::{Endpoint, Transport};
