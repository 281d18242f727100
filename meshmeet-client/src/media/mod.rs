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

//! Media primitives shared by local capture and remote peers.
//!
//! The capture devices and the tracks they produce are platform objects, so
//! they sit behind [`MediaDevices`] and [`MediaTrack`]. A [`MediaStream`] is a
//! cheap-to-clone, shared list of tracks; clones observe the same tracks.

pub mod local;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::CaptureConstraints;

pub use local::{LocalMediaController, OutgoingMedia};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// A single audio or video track.
///
/// `set_enabled(false)` keeps the track alive but sends silence or black;
/// `stop` releases the device for good.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
    fn is_live(&self) -> bool;
}

pub type TrackRef = Arc<dyn MediaTrack>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("peer connection is closed")]
    Closed,
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error("{0}")]
    Other(String),
}

/// A shared collection of tracks.
///
/// Equality is identity: two values are equal when they are clones of the
/// same stream.
#[derive(Clone)]
pub struct MediaStream {
    id: Arc<str>,
    tracks: Arc<Mutex<Vec<TrackRef>>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_tracks(id, Vec::new())
    }

    pub fn with_tracks(id: impl Into<String>, tracks: Vec<TrackRef>) -> Self {
        Self {
            id: Arc::from(id.into()),
            tracks: Arc::new(Mutex::new(tracks)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TrackRef>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `track` unless a track with the same id is already present.
    /// Returns whether the stream changed.
    pub fn add_track(&self, track: TrackRef) -> bool {
        let mut tracks = self.lock();
        if tracks.iter().any(|t| t.id() == track.id()) {
            return false;
        }
        tracks.push(track);
        true
    }

    pub fn remove_track(&self, track_id: &str) -> Option<TrackRef> {
        let mut tracks = self.lock();
        let index = tracks.iter().position(|t| t.id() == track_id)?;
        Some(tracks.remove(index))
    }

    pub fn tracks(&self) -> Vec<TrackRef> {
        self.lock().clone()
    }

    pub fn audio_tracks(&self) -> Vec<TrackRef> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<TrackRef> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<TrackRef> {
        self.lock()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn first_video(&self) -> Option<TrackRef> {
        self.lock()
            .iter()
            .find(|t| t.kind() == TrackKind::Video)
            .cloned()
    }

    pub fn has_track(&self, track_id: &str) -> bool {
        self.lock().iter().any(|t| t.id() == track_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.lock().iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
        }
    }

    pub fn stop_all(&self) {
        for track in self.lock().iter() {
            track.stop();
        }
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tracks, &other.tracks)
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.len())
            .finish()
    }
}

/// Reports that a captured track ended outside the session's control, for
/// instance when the user stops a screen share from the browser chrome.
#[derive(Debug, Clone)]
pub struct TrackEndedNotifier {
    tx: mpsc::UnboundedSender<String>,
}

impl TrackEndedNotifier {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    pub fn notify(&self, track_id: &str) {
        let _ = self.tx.send(track_id.to_string());
    }
}

/// Access to the local capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open the camera and microphone.
    async fn get_user_media(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<MediaStream, MediaError>;

    /// Ask the user for a screen or window to share. `on_ended` must be
    /// notified with the track id when the capture ends on its own.
    async fn get_display_media(
        &self,
        on_ended: TrackEndedNotifier,
    ) -> Result<MediaStream, MediaError>;
}
