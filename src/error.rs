use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Column set shape is internally inconsistent.
    #[error("schema error: {0}")]
    Schema(String),
    #[error("unsupported column type: {0}")]
    UnsupportedType(String),
    /// Wire response violates the envelope invariants.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("key not found: {0}")]
    Key(String),
    /// Write payload shape could not be normalized into a column set.
    #[error("invalid payload: {0}")]
    Payload(String),
    #[error("invalid timeframe: {0}")]
    Timeframe(String),
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
    #[error("unknown parameter: {0}")]
    UnknownField(String),
    #[error("invalid value for {field}: expected {expected}")]
    InvalidParam {
        field: &'static str,
        expected: &'static str,
    },
    #[error("server error: {message}: {data}")]
    Rpc { message: String, data: String },
    #[error("no data returned for query")]
    NoData,
    #[error("no data for symbols: {}", .0.join(","))]
    Symbols(Vec<String>),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
