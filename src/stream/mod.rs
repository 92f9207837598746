//! Websocket subscription to server-pushed updates.
//!
//! Handlers are registered against key patterns; a pattern matches a message
//! when it matches at the start of the message key.

use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::codec;
use crate::column::Table;
use crate::error::{Error, Result};
use crate::protocol::WireDataset;

/// One pushed update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub data: Option<WireDataset>,
}

impl StreamMessage {
    pub fn table(&self) -> Result<Table> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| Error::Protocol("stream message carries no data".to_string()))?;
        codec::decode(&data.names, &data.types, &data.data, data.length)
    }
}

#[derive(Serialize)]
struct Subscribe<'a> {
    streams: &'a [String],
}

pub type Handler = Box<dyn FnMut(&StreamMessage) -> Result<()> + Send>;

pub struct StreamConn {
    url: String,
    handlers: Vec<(Regex, Handler)>,
}

impl StreamConn {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handlers: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Registers `handler` for keys matching `pattern`, replacing any handler
    /// already registered under the same pattern.
    pub fn register<F>(&mut self, pattern: &str, handler: F) -> Result<()>
    where
        F: FnMut(&StreamMessage) -> Result<()> + Send + 'static,
    {
        let regex = Regex::new(pattern)
            .map_err(|err| Error::Config(format!("stream pattern {pattern:?}: {err}")))?;
        self.deregister(pattern);
        self.handlers.push((regex, Box::new(handler)));
        Ok(())
    }

    /// Returns whether a handler was registered under `pattern`.
    pub fn deregister(&mut self, pattern: &str) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(regex, _)| regex.as_str() != pattern);
        self.handlers.len() != before
    }

    /// Calls every matching handler and returns how many ran. Handler errors
    /// are logged.
    pub fn dispatch(&mut self, message: &StreamMessage) -> usize {
        let Some(key) = message.key.as_deref() else {
            return 0;
        };
        let mut called = 0;
        for (pattern, handler) in &mut self.handlers {
            if !pattern.find(key).is_some_and(|m| m.start() == 0) {
                continue;
            }
            called += 1;
            if let Err(err) = handler(message) {
                error!("stream handler {} failed for {key}: {err}", pattern.as_str());
            }
        }
        called
    }

    fn handle_frame(&mut self, bytes: &[u8]) -> usize {
        match rmp_serde::from_slice::<StreamMessage>(bytes) {
            Ok(message) => self.dispatch(&message),
            Err(err) => {
                warn!("undecodable stream frame ({} bytes): {err}", bytes.len());
                0
            }
        }
    }

    /// Subscribes to `streams` and dispatches updates until the server closes
    /// the connection.
    pub async fn run(&mut self, streams: &[String]) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|err| Error::Config(format!("stream url {}: {err}", self.url)))?;
        info!("connecting to {url}");
        let (mut ws, _) = connect_async(url).await.map_err(Error::transport)?;

        let subscribe = rmp_serde::to_vec_named(&Subscribe { streams })
            .map_err(|err| Error::Protocol(format!("encode subscription: {err}")))?;
        ws.send(Message::Binary(subscribe))
            .await
            .map_err(Error::transport)?;
        info!("subscribed to {} streams", streams.len());

        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Binary(bytes)) => {
                    self.handle_frame(&bytes);
                }
                Ok(Message::Ping(ping)) => {
                    let _ = ws.send(Message::Pong(ping)).await;
                }
                Ok(Message::Close(_)) => {
                    info!("stream closed by server");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    error!("stream error: {err}");
                    return Err(Error::transport(err));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for StreamConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConn")
            .field("url", &self.url)
            .field(
                "patterns",
                &self.handlers.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
