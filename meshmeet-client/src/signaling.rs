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

//! Signaling channel adapter.
//!
//! Wraps a text-frame duplex (normally a WebSocket to the relay) into typed
//! [`SignalEnvelope`] traffic. Sending is synchronous and never blocks: frames
//! are queued to a writer. Receiving goes through [`ChannelEvents`], which
//! yields `Opened` first, then every well-formed inbound message, then one
//! `Closed` when the connection ends. Malformed frames are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use meshmeet_api_client::ChannelUrlBuilder;
use meshmeet_transport::WebSocketClient;
use meshmeet_types::SignalEnvelope;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling channel is not open")]
    NotOpen,
    #[error("failed to encode signaling message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to connect signaling channel: {0}")]
    Connect(String),
}

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Opened,
    Message(SignalEnvelope),
    Closed(String),
}

/// The sending half of an open signaling connection.
#[derive(Debug)]
pub struct SignalingChannel {
    outbound: Option<mpsc::UnboundedSender<String>>,
    open: Arc<AtomicBool>,
}

impl SignalingChannel {
    /// Wire a channel over raw text pipes: encoded frames are written to
    /// `outbound`, raw inbound frames are read from `inbound`.
    pub fn from_pipes(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::Receiver<String>,
    ) -> (Self, ChannelEvents) {
        let open = Arc::new(AtomicBool::new(true));
        let channel = Self {
            outbound: Some(outbound),
            open: open.clone(),
        };
        let events = ChannelEvents {
            inbound,
            open,
            announced: false,
            finished: false,
        };
        (channel, events)
    }

    pub fn is_open(&self) -> bool {
        self.outbound.is_some() && self.open.load(Ordering::Acquire)
    }

    /// Queue one message for the relay.
    pub fn send(&self, envelope: &SignalEnvelope) -> Result<(), SignalingError> {
        let outbound = match &self.outbound {
            Some(tx) if self.open.load(Ordering::Acquire) => tx,
            _ => return Err(SignalingError::NotOpen),
        };
        let text = envelope.encode()?;
        outbound.send(text).map_err(|_| {
            self.open.store(false, Ordering::Release);
            SignalingError::NotOpen
        })
    }

    /// Close the connection. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.outbound.take().is_some() {
            self.open.store(false, Ordering::Release);
            info!("Signaling channel closed");
        }
    }
}

/// The receiving half of a signaling connection.
#[derive(Debug)]
pub struct ChannelEvents {
    inbound: mpsc::Receiver<String>,
    open: Arc<AtomicBool>,
    announced: bool,
    finished: bool,
}

impl ChannelEvents {
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if let Some(event) = self.announce() {
            return Some(event);
        }
        loop {
            match self.inbound.recv().await {
                Some(text) => {
                    if let Some(envelope) = parse_frame(&text) {
                        return Some(ChannelEvent::Message(envelope));
                    }
                }
                None => return self.finish(),
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        if let Some(event) = self.announce() {
            return Some(event);
        }
        loop {
            match self.inbound.try_recv() {
                Ok(text) => {
                    if let Some(envelope) = parse_frame(&text) {
                        return Some(ChannelEvent::Message(envelope));
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return self.finish(),
            }
        }
    }

    /// `Closed` has been delivered; nothing more will arrive.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn announce(&mut self) -> Option<ChannelEvent> {
        if self.announced {
            return None;
        }
        self.announced = true;
        Some(ChannelEvent::Opened)
    }

    fn finish(&mut self) -> Option<ChannelEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;
        self.open.store(false, Ordering::Release);
        Some(ChannelEvent::Closed("connection closed".to_string()))
    }
}

fn parse_frame(text: &str) -> Option<SignalEnvelope> {
    match SignalEnvelope::decode(text) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            debug!("Dropping malformed signaling frame: {e}");
            None
        }
    }
}

/// Opens the signaling channel for a meeting.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn connect(
        &self,
        meeting_code: &str,
    ) -> Result<(SignalingChannel, ChannelEvents), SignalingError>;
}

/// Connects to the relay over a native WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    urls: ChannelUrlBuilder,
}

impl WebSocketConnector {
    pub fn new(urls: ChannelUrlBuilder) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl SignalingConnector for WebSocketConnector {
    async fn connect(
        &self,
        meeting_code: &str,
    ) -> Result<(SignalingChannel, ChannelEvents), SignalingError> {
        let url = self
            .urls
            .build(meeting_code)
            .map_err(|e| SignalingError::Connect(e.to_string()))?;
        let (client, inbound) = WebSocketClient::try_connect(&url)
            .await
            .map_err(|e| SignalingError::Connect(e.to_string()))?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            if let Err(e) = pump_outbound(&client, outbound_rx).await {
                warn!("Signaling writer stopped: {e:#}");
            }
            let _ = client.close().await;
        });
        Ok(SignalingChannel::from_pipes(outbound_tx, inbound))
    }
}

async fn pump_outbound(
    client: &WebSocketClient,
    mut outbound: mpsc::UnboundedReceiver<String>,
) -> anyhow::Result<()> {
    while let Some(text) = outbound.recv().await {
        client
            .send_text(text)
            .await
            .context("failed to send signaling frame")?;
    }
    debug!("Signaling writer drained");
    Ok(())
}
