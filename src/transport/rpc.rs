//! MessagePack RPC over HTTP POST.
//!
//! The blocking HTTP client lives on its own worker thread. It is built,
//! used and dropped there, so calls are safe from inside an async runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::params::ListSymbolsFormat;
use crate::protocol::{
    methods, ListSymbolsResponse, MultiCreateRequest, MultiKeyRequest, MultiQueryRequest,
    MultiQueryResponse, MultiServerResponse, MultiWriteRequest, RpcReply, RpcRequest,
};
use crate::request::build_list_symbols;
use crate::transport::Transport;

const MSGPACK_MIME: &str = "application/x-msgpack";
const VERSION_HEADER: &str = "Marketstore-Version";
/// Server error text for a query that matched no buckets.
const NO_DATA_MESSAGE: &str = "No files returned from query parse";
const PENDING_CALLS: usize = 16;

type Job = Box<dyn FnOnce(&HttpClient) + Send>;

// Owns the HTTP client; exits once every job sender is gone.
struct HttpWorker {
    job_tx: mpsc::SyncSender<Job>,
}

impl HttpWorker {
    fn spawn(timeout: Option<Duration>) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(PENDING_CALLS);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        thread::Builder::new()
            .name("mkts-rpc".to_string())
            .spawn(move || {
                let mut builder = HttpClient::builder();
                if let Some(timeout) = timeout {
                    builder = builder.timeout(timeout);
                }
                let http = match builder.build() {
                    Ok(http) => {
                        let _ = ready_tx.send(Ok(()));
                        http
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(Error::transport(err)));
                        return;
                    }
                };
                while let Ok(job) = job_rx.recv() {
                    job(&http);
                }
            })?;

        ready_rx.recv().map_err(Error::transport)??;
        Ok(Self { job_tx })
    }

    /// Runs `f` on the worker and waits for its result.
    fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&HttpClient) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |http| {
            let _ = reply_tx.send(f(http));
        });
        self.job_tx.send(job).map_err(|_| worker_gone())?;
        reply_rx.recv().map_err(|_| worker_gone())?
    }
}

fn worker_gone() -> Error {
    Error::transport(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "rpc worker thread exited",
    ))
}

pub struct MsgpackRpc {
    url: String,
    worker: HttpWorker,
    next_id: AtomicU64,
}

impl MsgpackRpc {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, None)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url).map_err(|err| Error::Config(format!("endpoint {url}: {err}")))?;
        Ok(Self {
            url,
            worker: HttpWorker::spawn(timeout)?,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one request envelope and unwraps the reply.
    pub fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = encode_request(id, method, params)?;
        debug!("rpc {method} id={id} request {} bytes", body.len());

        let url = self.url.clone();
        let bytes = self.worker.run(move |http| {
            let resp = http
                .post(url)
                .header(CONTENT_TYPE, MSGPACK_MIME)
                .body(body)
                .send()
                .map_err(Error::transport)?
                .error_for_status()
                .map_err(Error::transport)?;
            resp.bytes().map_err(Error::transport)
        })?;
        debug!("rpc {method} id={id} reply {} bytes", bytes.len());
        decode_reply(&bytes)
    }
}

pub(crate) fn encode_request<P: Serialize>(id: u64, method: &str, params: &P) -> Result<Vec<u8>> {
    let envelope = RpcRequest {
        jsonrpc: "2.0",
        id: id.to_string(),
        method,
        params,
    };
    rmp_serde::to_vec_named(&envelope)
        .map_err(|err| Error::Protocol(format!("encode {method}: {err}")))
}

/// Unwraps `{result}` or maps `{error}`; a reply with neither is malformed.
pub(crate) fn decode_reply<R: DeserializeOwned>(bytes: &[u8]) -> Result<R> {
    let reply: RpcReply<R> = rmp_serde::from_slice(bytes)
        .map_err(|err| Error::Protocol(format!("decode reply: {err}")))?;
    if let Some(error) = reply.error {
        if error.message == NO_DATA_MESSAGE {
            return Err(Error::NoData);
        }
        return Err(Error::Rpc {
            message: error.message,
            data: error.data.unwrap_or_default(),
        });
    }
    reply
        .result
        .ok_or_else(|| Error::Protocol("reply has neither result nor error".to_string()))
}

impl Transport for MsgpackRpc {
    fn query(&self, request: &MultiQueryRequest) -> Result<MultiQueryResponse> {
        self.call(methods::QUERY, request)
    }

    fn write(&self, request: &MultiWriteRequest) -> Result<MultiServerResponse> {
        self.call(methods::WRITE, request)
    }

    fn create(&self, request: &MultiCreateRequest) -> Result<MultiServerResponse> {
        self.call(methods::CREATE, request)
    }

    fn list_symbols(&self, format: ListSymbolsFormat) -> Result<Vec<String>> {
        let reply: ListSymbolsResponse =
            self.call(methods::LIST_SYMBOLS, &build_list_symbols(format))?;
        Ok(reply.results.unwrap_or_default())
    }

    fn destroy(&self, request: &MultiKeyRequest) -> Result<MultiServerResponse> {
        self.call(methods::DESTROY, request)
    }

    fn server_version(&self) -> Result<String> {
        let url = self.url.clone();
        self.worker.run(move |http| {
            let resp = http.head(url).send().map_err(Error::transport)?;
            let version = resp
                .headers()
                .get(VERSION_HEADER)
                .ok_or_else(|| Error::Protocol(format!("missing {VERSION_HEADER} header")))?;
            version
                .to_str()
                .map(str::to_string)
                .map_err(|err| Error::Protocol(format!("{VERSION_HEADER} header: {err}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize)]
    struct Reply<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<ListSymbolsResponse>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody<'a>>,
    }

    #[derive(Serialize)]
    struct ErrorBody<'a> {
        message: &'a str,
        data: &'a str,
    }

    fn pack(reply: &Reply<'_>) -> Vec<u8> {
        rmp_serde::to_vec_named(reply).unwrap()
    }

    #[test]
    fn test_request_envelope_fields() {
        #[derive(Deserialize)]
        struct Envelope {
            jsonrpc: String,
            id: String,
            method: String,
            params: crate::protocol::ListSymbolsRequest,
        }
        let bytes =
            encode_request(7, methods::LIST_SYMBOLS, &build_list_symbols(ListSymbolsFormat::Tbk))
                .unwrap();
        let envelope: Envelope = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(envelope.jsonrpc, "2.0");
        assert_eq!(envelope.id, "7");
        assert_eq!(envelope.method, "DataService.ListSymbols");
        assert_eq!(envelope.params.format, "tbk");
    }

    #[test]
    fn test_reply_result_unwrapped() {
        let bytes = pack(&Reply {
            result: Some(ListSymbolsResponse {
                results: Some(vec!["AAPL".to_string()]),
            }),
            error: None,
        });
        let reply: ListSymbolsResponse = decode_reply(&bytes).unwrap();
        assert_eq!(reply.results, Some(vec!["AAPL".to_string()]));
    }

    #[test]
    fn test_reply_error_mapping() {
        let bytes = pack(&Reply {
            result: None,
            error: Some(ErrorBody {
                message: NO_DATA_MESSAGE,
                data: "",
            }),
        });
        assert!(matches!(
            decode_reply::<ListSymbolsResponse>(&bytes),
            Err(Error::NoData)
        ));

        let bytes = pack(&Reply {
            result: None,
            error: Some(ErrorBody {
                message: "bucket exists",
                data: "TSLA/1Min/OHLCV",
            }),
        });
        match decode_reply::<ListSymbolsResponse>(&bytes) {
            Err(Error::Rpc { message, data }) => {
                assert_eq!(message, "bucket exists");
                assert_eq!(data, "TSLA/1Min/OHLCV");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reply_without_result_or_error() {
        let bytes = pack(&Reply {
            result: None,
            error: None,
        });
        assert!(matches!(
            decode_reply::<ListSymbolsResponse>(&bytes),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_reply_absent_result_generic() {
        #[derive(Serialize)]
        struct Ack {
            result: crate::protocol::MultiServerResponse,
        }
        let bytes = rmp_serde::to_vec_named(&Ack {
            result: MultiServerResponse::default(),
        })
        .unwrap();
        let ack: MultiServerResponse = decode_reply(&bytes).unwrap();
        assert!(ack.responses.is_empty());

        let bytes = pack(&Reply {
            result: None,
            error: None,
        });
        assert!(matches!(
            decode_reply::<MultiServerResponse>(&bytes),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_reply_nil_responses() {
        #[derive(Serialize)]
        struct Inner {
            responses: Option<Vec<crate::protocol::ServerResponse>>,
        }
        #[derive(Serialize)]
        struct Ack {
            result: Inner,
        }
        let bytes = rmp_serde::to_vec_named(&Ack {
            result: Inner { responses: None },
        })
        .unwrap();
        let ack: MultiServerResponse = decode_reply(&bytes).unwrap();
        assert!(ack.responses.is_empty());
    }

    #[test]
    fn test_calls_from_worker_thread() {
        // Nothing listens on the discard port; the call fails instead of panicking.
        let rpc = MsgpackRpc::new("http://127.0.0.1:9/rpc").unwrap();
        assert!(matches!(rpc.server_version(), Err(Error::Transport(_))));
        assert!(matches!(
            rpc.list_symbols(ListSymbolsFormat::Symbol),
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn test_new_rejects_bad_url() {
        assert!(matches!(MsgpackRpc::new("not a url"), Err(Error::Config(_))));
    }
}
