//! Binary RPC transport over a generated service stub.
//!
//! The stub itself (channel, framing, generated message types) lives outside
//! this crate; [`BinaryRpcStub`] is the seam it plugs into. The stub's channel
//! must be configured with [`ChannelOptions::default`].

use log::debug;

use crate::error::Result;
use crate::params::ListSymbolsFormat;
use crate::protocol::binary::{
    self as wire, BinaryListSymbolsRequest, BinaryListSymbolsResponse, BinaryMultiCreateRequest,
    BinaryMultiQueryResponse, BinaryMultiWriteRequest, ChannelOptions, ServerVersionRequest,
    ServerVersionResponse,
};
use crate::protocol::{
    MultiCreateRequest, MultiKeyRequest, MultiQueryRequest, MultiQueryResponse,
    MultiServerResponse, MultiWriteRequest,
};
use crate::transport::Transport;

/// Typed surface of the binary RPC service.
pub trait BinaryRpcStub: Send + Sync {
    fn query(&self, request: MultiQueryRequest) -> Result<BinaryMultiQueryResponse>;
    fn write(&self, request: BinaryMultiWriteRequest) -> Result<MultiServerResponse>;
    fn create(&self, request: BinaryMultiCreateRequest) -> Result<MultiServerResponse>;
    fn list_symbols(&self, request: BinaryListSymbolsRequest) -> Result<BinaryListSymbolsResponse>;
    fn destroy(&self, request: MultiKeyRequest) -> Result<MultiServerResponse>;
    fn server_version(&self, request: ServerVersionRequest) -> Result<ServerVersionResponse>;
}

/// Adapts a [`BinaryRpcStub`] to [`Transport`].
pub struct BinaryRpc<S> {
    target: String,
    stub: S,
}

impl<S: BinaryRpcStub> BinaryRpc<S> {
    pub fn new(target: impl Into<String>, stub: S) -> Self {
        Self {
            target: target.into(),
            stub,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Limits the stub's channel has to be opened with.
    pub fn channel_options() -> ChannelOptions {
        ChannelOptions::default()
    }
}

impl From<ListSymbolsFormat> for wire::ListSymbolsFormat {
    fn from(format: ListSymbolsFormat) -> Self {
        match format {
            ListSymbolsFormat::Symbol => wire::ListSymbolsFormat::Symbol,
            ListSymbolsFormat::Tbk => wire::ListSymbolsFormat::TimeBucketKey,
        }
    }
}

impl<S: BinaryRpcStub> Transport for BinaryRpc<S> {
    fn query(&self, request: &MultiQueryRequest) -> Result<MultiQueryResponse> {
        debug!("binary rpc Query to {} ({} requests)", self.target, request.requests.len());
        self.stub.query(request.clone())?.into_wire()
    }

    fn write(&self, request: &MultiWriteRequest) -> Result<MultiServerResponse> {
        debug!("binary rpc Write to {}", self.target);
        self.stub.write(BinaryMultiWriteRequest::from_wire(request)?)
    }

    fn create(&self, request: &MultiCreateRequest) -> Result<MultiServerResponse> {
        debug!("binary rpc Create to {}", self.target);
        self.stub.create(BinaryMultiCreateRequest::from(request))
    }

    fn list_symbols(&self, format: ListSymbolsFormat) -> Result<Vec<String>> {
        let reply = self.stub.list_symbols(BinaryListSymbolsRequest {
            format: format.into(),
        })?;
        Ok(reply.results)
    }

    fn destroy(&self, request: &MultiKeyRequest) -> Result<MultiServerResponse> {
        debug!("binary rpc Destroy to {}", self.target);
        self.stub.destroy(request.clone())
    }

    fn server_version(&self) -> Result<String> {
        Ok(self.stub.server_version(ServerVersionRequest)?.version)
    }
}
