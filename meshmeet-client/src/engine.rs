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

//! The peer-connection substrate.
//!
//! A [`MediaEngine`] creates one [`PeerConnection`] per remote participant.
//! Connections report asynchronous happenings (gathered ICE candidates,
//! arriving remote tracks) through the [`PeerEvents`] handle they are given
//! at creation, which tags every event with the session that produced it.

use std::sync::Arc;

use async_trait::async_trait;
use meshmeet_types::responses::{IceServer, IceServersResponse};
use meshmeet_types::signaling::{IceCandidateInit, SessionDescription};
use meshmeet_types::ParticipantId;
use tokio::sync::mpsc;

use crate::media::{MediaError, MediaStream, TrackKind, TrackRef};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
}

impl From<IceServersResponse> for RtcConfiguration {
    fn from(response: IceServersResponse) -> Self {
        Self {
            ice_servers: response.ice_servers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferOptions {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            offer_to_receive_audio: true,
            offer_to_receive_video: true,
        }
    }
}

/// Encoder hint for the outgoing video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentHint {
    /// Favor frame rate (camera).
    Motion,
    /// Favor sharpness (slides, code, documents).
    Detail,
}

impl ContentHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentHint::Motion => "motion",
            ContentHint::Detail => "detail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoEncoding {
    pub max_bitrate_bps: u32,
    pub content_hint: ContentHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone)]
pub enum PeerEventKind {
    LocalCandidate(IceCandidateInit),
    TrackAdded(TrackRef),
    TrackMuted { track_id: String, kind: TrackKind },
    TrackUnmuted { track_id: String, kind: TrackKind },
    TrackEnded { track_id: String, kind: TrackKind },
    StateChanged(PeerConnectionState),
}

#[derive(Debug, Clone)]
pub struct PeerEvent {
    pub remote_id: ParticipantId,
    pub generation: u64,
    pub kind: PeerEventKind,
}

/// Per-connection event sink handed to [`MediaEngine::create_peer_connection`].
#[derive(Debug, Clone)]
pub struct PeerEvents {
    remote_id: ParticipantId,
    generation: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEvents {
    pub fn new(
        remote_id: ParticipantId,
        generation: u64,
        tx: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            remote_id,
            generation,
            tx,
        }
    }

    pub fn remote_id(&self) -> ParticipantId {
        self.remote_id
    }

    pub fn emit(&self, kind: PeerEventKind) {
        // The receiver only goes away when the session is gone.
        let _ = self.tx.send(PeerEvent {
            remote_id: self.remote_id,
            generation: self.generation,
            kind,
        });
    }

    pub fn local_candidate(&self, candidate: IceCandidateInit) {
        self.emit(PeerEventKind::LocalCandidate(candidate));
    }

    pub fn track_added(&self, track: TrackRef) {
        self.emit(PeerEventKind::TrackAdded(track));
    }

    pub fn track_muted(&self, track_id: &str, kind: TrackKind) {
        self.emit(PeerEventKind::TrackMuted {
            track_id: track_id.to_string(),
            kind,
        });
    }

    pub fn track_unmuted(&self, track_id: &str, kind: TrackKind) {
        self.emit(PeerEventKind::TrackUnmuted {
            track_id: track_id.to_string(),
            kind,
        });
    }

    pub fn track_ended(&self, track_id: &str, kind: TrackKind) {
        self.emit(PeerEventKind::TrackEnded {
            track_id: track_id.to_string(),
            kind,
        });
    }

    pub fn state_changed(&self, state: PeerConnectionState) {
        self.emit(PeerEventKind::StateChanged(state));
    }
}

/// One negotiated connection to a remote participant.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, MediaError>;
    async fn create_answer(&self) -> Result<SessionDescription, MediaError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MediaError>;
    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), MediaError>;

    /// Attach a local track for sending. Called before the first offer or
    /// answer is created.
    fn add_track(&self, track: TrackRef, stream: &MediaStream) -> Result<(), MediaError>;

    /// Swap the track carried by the outgoing video sender without
    /// renegotiating. Returns `false` when there is no video sender.
    async fn replace_video_track(&self, track: TrackRef) -> Result<bool, MediaError>;

    async fn set_video_encoding(&self, encoding: VideoEncoding) -> Result<(), MediaError>;

    fn close(&self);
    fn is_closed(&self) -> bool;
}

pub trait MediaEngine: Send + Sync {
    fn create_peer_connection(
        &self,
        remote_id: ParticipantId,
        config: &RtcConfiguration,
        events: PeerEvents,
    ) -> Result<Arc<dyn PeerConnection>, MediaError>;
}
