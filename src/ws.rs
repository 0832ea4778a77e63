//! JSON websockets for the SSI API.
//!
//! The base URL is rewritten to the matching websocket scheme and the call
//! path is mounted under `/ws/`. Frames are UTF-8 text carrying one JSON
//! document each; there is no reconnect, heartbeat or backpressure logic.

use futures::{SinkExt, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::client::stringify;
use crate::error::{Error, Result};

/// Characters escaped in hand-built query strings. Everything outside the
/// unreserved set is percent-encoded.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Options for [`crate::client::ApiClient::ws`].
#[derive(Clone, Debug, Default)]
pub struct WsOptions {
    /// Timeout for the connection handshake.
    pub timeout: Option<Duration>,
    /// Caller-supplied headers. Configuration headers override these on
    /// key collision.
    pub headers: HeaderMap,
}

impl WsOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Builds the websocket URL for a call path.
///
/// Rewrites `https://` to `wss://` and `http://` to `ws://`, appends
/// `/ws/{path}` and the percent-encoded query string. The trailing `&` of
/// the query string is part of the wire contract and is kept.
pub(crate) fn ws_url(base: &str, path: &str, params: &Map<String, Value>) -> String {
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    let mut url = format!("{}/ws/{}", base, path);
    if !params.is_empty() {
        url.push('?');
        for (key, value) in params {
            let value = stringify(value);
            url.push_str(&utf8_percent_encode(key, QUERY).to_string());
            url.push('=');
            url.push_str(&utf8_percent_encode(&value, QUERY).to_string());
            url.push('&');
        }
    }
    url
}

/// A websocket that sends and receives JSON documents.
pub struct JsonWebSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl JsonWebSocket {
    /// Opens the connection, optionally bounded by a handshake timeout.
    pub(crate) async fn connect(request: Request, timeout: Option<Duration>) -> Result<Self> {
        let handshake = connect_async(request);
        let (inner, _response) = match timeout {
            Some(duration) => tokio::time::timeout(duration, handshake)
                .await
                .map_err(|_| Error::ConnectTimeout)??,
            None => handshake.await?,
        };
        Ok(Self { inner })
    }

    /// Serializes `value` and sends it as one text frame.
    pub async fn send_json(&mut self, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.inner.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Receives one frame and deserializes it.
    ///
    /// Fails if the socket is closed, the frame is not text, or the text is
    /// not valid JSON.
    pub async fn recv_json(&mut self) -> Result<Value> {
        match self.inner.next().await {
            Some(Ok(Message::Text(text))) => Ok(serde_json::from_str(&text)?),
            Some(Ok(other)) => Err(Error::Message(format!(
                "expected a text frame, got {:?}",
                other
            ))),
            Some(Err(err)) => Err(err.into()),
            None => Err(Error::Message("websocket closed".into())),
        }
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<()> {
        self.inner.close(None).await?;
        Ok(())
    }
}
