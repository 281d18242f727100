/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! WebSocket text-frame client using `tokio-tungstenite`.
//!
//! # Example
//!
//! ```no_run
//! use meshmeet_transport::WebSocketClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (client, mut inbound_rx) =
//!     WebSocketClient::connect("ws://localhost:8000/ws/meetings/abc?token=t").await?;
//!
//! client.send_text(r#"{"type":"mute","data":{}}"#.to_string()).await?;
//!
//! while let Some(text) = inbound_rx.recv().await {
//!     println!("received {text}");
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Result};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const INBOUND_QUEUE: usize = 256;

/// Error type for WebSocket connection attempts.
///
/// Keeps the HTTP status when the relay rejects the upgrade (401 for a bad
/// token, 404 for an unknown meeting, ...).
#[derive(Debug, thiserror::Error)]
pub enum WebSocketConnectError {
    /// The server rejected the upgrade with an HTTP error status.
    #[error("HTTP {status}: WebSocket upgrade rejected")]
    HttpError {
        /// The HTTP status code returned by the server.
        status: u16,
    },
    /// A transport-level or protocol-level error occurred.
    #[error("WebSocket connection failed: {0}")]
    Other(String),
}

impl WebSocketConnectError {
    /// Returns the HTTP status code if this was an HTTP rejection, else `None`.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpError { status } => Some(*status),
            Self::Other(_) => None,
        }
    }
}

/// A WebSocket client carrying UTF-8 text frames.
///
/// Inbound text frames are forwarded on the receiver returned by
/// [`connect`](Self::connect). The receiver yields `None` once the socket
/// is closed by either side, which is how consumers observe closure.
#[derive(Clone)]
pub struct WebSocketClient {
    writer: Arc<Mutex<SplitSink<WsStream, Message>>>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl WebSocketClient {
    /// Connect to a WebSocket server.
    ///
    /// Returns the client and a receiver of inbound text frames.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<String>)> {
        Self::try_connect(url).await.map_err(|e| anyhow!("{e}"))
    }

    /// Connect to a WebSocket server, returning a typed error on failure.
    pub async fn try_connect(
        url: &str,
    ) -> std::result::Result<(Self, mpsc::Receiver<String>), WebSocketConnectError> {
        info!("WebSocket connecting to {url}");

        let (ws_stream, response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| match e {
                    tokio_tungstenite::tungstenite::Error::Http(resp) => {
                        WebSocketConnectError::HttpError {
                            status: resp.status().as_u16(),
                        }
                    }
                    other => WebSocketConnectError::Other(format!(
                        "WebSocket connection to '{url}' failed: {other}"
                    )),
                })?;

        info!("WebSocket connected to {url} (HTTP {})", response.status());

        Ok(Self::setup_streams(ws_stream))
    }

    fn setup_streams(ws_stream: WsStream) -> (Self, mpsc::Receiver<String>) {
        let (writer, mut reader) = ws_stream.split();

        let closed = Arc::new(AtomicBool::new(false));
        let client = Self {
            writer: Arc::new(Mutex::new(writer)),
            closed: closed.clone(),
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let closed_reader = closed.clone();

        tokio::spawn(async move {
            while let Some(msg_result) = reader.next().await {
                if closed_reader.load(Ordering::Relaxed) {
                    break;
                }
                let text = match msg_result {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => {
                            debug!("WebSocket non-UTF-8 binary frame ignored");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!("WebSocket received close frame");
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                        continue;
                    }
                    Err(e) => {
                        if !closed_reader.load(Ordering::Relaxed) {
                            error!("WebSocket read error: {e}");
                        }
                        break;
                    }
                };
                if inbound_tx.send(text).await.is_err() {
                    debug!("Inbound receiver dropped");
                    break;
                }
            }
            closed_reader.store(true, Ordering::Relaxed);
            debug!("WebSocket inbound reader loop ended");
        });

        (client, inbound_rx)
    }

    /// Send one text frame.
    pub async fn send_text(&self, text: String) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(anyhow!("WebSocket is closed"));
        }
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(text))
            .await
            .map_err(|e| anyhow!("WebSocket send error: {e}"))
    }

    /// Whether the WebSocket connection is still open.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }

    /// Close the connection gracefully. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.send(Message::Close(None)).await {
                warn!("Error sending WebSocket close frame: {e}");
            }
        }
        Ok(())
    }
}
