//! Client facade over a [`Transport`].

use log::info;

#[cfg(feature = "rpc")]
use crate::config::ClientConfig;
#[cfg(feature = "rpc")]
use crate::error::Error;
use crate::error::Result;
use crate::key::DestinationKey;
use crate::params::{ListSymbolsFormat, QuerySpec};
use crate::protocol::{MultiQueryRequest, MultiServerResponse};
use crate::request::{build_create, build_destroy, build_query, build_write, WritePayload};
use crate::results::QueryReply;
use crate::transport::binary::{BinaryRpc, BinaryRpcStub};
use crate::transport::{Endpoint, Transport};

pub struct Client {
    endpoint: Endpoint,
    transport: Box<dyn Transport>,
}

impl Client {
    /// Msgpack RPC client for `url`.
    #[cfg(feature = "rpc")]
    pub fn connect(url: &str) -> Result<Self> {
        Self::from_config(&ClientConfig {
            endpoint: url.to_string(),
            ..ClientConfig::default()
        })
    }

    /// Builds a msgpack RPC client from `config`. Binary RPC needs a stub and
    /// goes through [`Client::binary`].
    #[cfg(feature = "rpc")]
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        match &endpoint {
            Endpoint::MsgpackRpc(url) => {
                let rpc = crate::transport::rpc::MsgpackRpc::with_timeout(
                    url.as_str(),
                    config.timeout(),
                )?;
                info!("msgpack rpc client for {url}");
                Ok(Self::with_transport(endpoint.clone(), rpc))
            }
            Endpoint::BinaryRpc(target) => Err(Error::Config(format!(
                "binary rpc target {target} needs a service stub"
            ))),
        }
    }

    /// Binary RPC client; `conn` goes through endpoint selection.
    pub fn binary<S: BinaryRpcStub + 'static>(conn: &str, stub: S) -> Self {
        let endpoint = Endpoint::select(conn, true);
        let rpc = BinaryRpc::new(endpoint.as_str(), stub);
        info!("binary rpc client for {endpoint}");
        Self::with_transport(endpoint, rpc)
    }

    pub fn with_transport(endpoint: Endpoint, transport: impl Transport + 'static) -> Self {
        Self {
            endpoint,
            transport: Box::new(transport),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn build_query(&self, specs: impl Into<Vec<QuerySpec>>) -> MultiQueryRequest {
        build_query(specs)
    }

    /// Runs one query batch and indexes the reply.
    pub fn query(&self, specs: impl Into<Vec<QuerySpec>>) -> Result<QueryReply> {
        let request = build_query(specs);
        let response = self.transport.query(&request)?;
        QueryReply::from_response(&response)
    }

    /// Like [`Client::query`], but fails with [`crate::Error::Symbols`] when any
    /// requested symbol came back without data.
    pub fn query_all(&self, specs: impl Into<Vec<QuerySpec>>) -> Result<QueryReply> {
        let specs = specs.into();
        let request = build_query(specs.clone());
        let reply = QueryReply::from_response(&self.transport.query(&request)?)?;
        reply.ensure_symbols(&specs)?;
        Ok(reply)
    }

    pub fn write(
        &self,
        payload: &WritePayload,
        key: &str,
        is_variable_length: bool,
    ) -> Result<MultiServerResponse> {
        let request = build_write(payload, key, is_variable_length)?;
        self.transport.write(&request)
    }

    /// Creates a bucket from `(column name, type tag)` shapes, e.g.
    /// `[("Epoch", "i8"), ("Bid", "f4")]`.
    pub fn create(
        &self,
        key: &str,
        shapes: &[(&str, &str)],
        is_variable_length: bool,
    ) -> Result<MultiServerResponse> {
        let key: DestinationKey = key.parse()?;
        let request = build_create(&key, shapes, is_variable_length)?;
        self.transport.create(&request)
    }

    pub fn list_symbols(&self, format: ListSymbolsFormat) -> Result<Vec<String>> {
        self.transport.list_symbols(format)
    }

    pub fn destroy(&self, key: &str) -> Result<MultiServerResponse> {
        self.transport.destroy(&build_destroy(key))
    }

    pub fn server_version(&self) -> Result<String> {
        self.transport.server_version()
    }

    /// Subscription connection for this endpoint's websocket service.
    #[cfg(feature = "stream")]
    pub fn stream(&self) -> crate::stream::StreamConn {
        crate::stream::StreamConn::new(self.endpoint.stream_url())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
