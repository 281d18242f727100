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

//! Local capture: camera, microphone and screen share.
//!
//! The controller owns every local track. Enabling and disabling keep the
//! tracks alive; only [`LocalMediaController::stop_all`] and ending a screen
//! share stop them. At most one outgoing video source is active: the screen
//! track while sharing, the camera track otherwise.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info, warn};
use meshmeet_types::SignalMessage;

use super::{
    MediaDevices, MediaError, MediaStream, TrackEndedNotifier, TrackKind, TrackRef,
};
use crate::config::CaptureConstraints;

/// The tracks a new peer session should send, and the stream they belong to.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMedia {
    pub stream: Option<MediaStream>,
    pub tracks: Vec<TrackRef>,
}

pub struct LocalMediaController {
    devices: Arc<dyn MediaDevices>,
    constraints: CaptureConstraints,
    camera: Option<MediaStream>,
    screen: Option<MediaStream>,
    mic_enabled: bool,
    camera_enabled: bool,
    // Set from the moment a display capture is requested until the share ends.
    screen_requested: bool,
    screen_ended: TrackEndedNotifier,
}

impl std::fmt::Debug for LocalMediaController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaController")
            .field("camera", &self.camera)
            .field("screen", &self.screen)
            .field("mic_enabled", &self.mic_enabled)
            .field("camera_enabled", &self.camera_enabled)
            .finish()
    }
}

impl LocalMediaController {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        constraints: CaptureConstraints,
        screen_ended: TrackEndedNotifier,
    ) -> Self {
        Self {
            devices,
            constraints,
            camera: None,
            screen: None,
            mic_enabled: false,
            camera_enabled: false,
            screen_requested: false,
            screen_ended,
        }
    }

    /// Open camera and microphone.
    ///
    /// On failure the controller stays usable with both flags off, so the
    /// session can continue receive-only.
    pub async fn acquire(&mut self) -> Result<(), MediaError> {
        match self.devices.get_user_media(&self.constraints).await {
            Ok(stream) => {
                self.mic_enabled = !stream.audio_tracks().is_empty();
                self.camera_enabled = stream.first_video().is_some();
                info!(
                    "Local media acquired: {} audio, {} video track(s)",
                    stream.audio_tracks().len(),
                    stream.video_tracks().len()
                );
                self.camera = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.mic_enabled = false;
                self.camera_enabled = false;
                Err(e)
            }
        }
    }

    pub fn mic_enabled(&self) -> bool {
        self.mic_enabled
    }

    pub fn camera_enabled(&self) -> bool {
        self.camera_enabled
    }

    pub fn camera_stream(&self) -> Option<MediaStream> {
        self.camera.clone()
    }

    pub fn camera_video_track(&self) -> Option<TrackRef> {
        self.camera.as_ref().and_then(MediaStream::first_video)
    }

    fn has_audio(&self) -> bool {
        self.camera
            .as_ref()
            .is_some_and(|s| !s.audio_tracks().is_empty())
    }

    /// Enable or disable the microphone. Returns the signal to broadcast, or
    /// `None` when nothing changed.
    pub fn set_mic_enabled(&mut self, enabled: bool) -> Option<SignalMessage> {
        if enabled == self.mic_enabled {
            return None;
        }
        if enabled && !self.has_audio() {
            debug!("No microphone track, ignoring unmute");
            return None;
        }
        if let Some(stream) = &self.camera {
            stream.set_enabled(TrackKind::Audio, enabled);
        }
        self.mic_enabled = enabled;
        Some(if enabled {
            SignalMessage::Unmute
        } else {
            SignalMessage::Mute
        })
    }

    pub fn set_camera_enabled(&mut self, enabled: bool) -> Option<SignalMessage> {
        if enabled == self.camera_enabled {
            return None;
        }
        if enabled && self.camera_video_track().is_none() {
            debug!("No camera track, ignoring camera-on");
            return None;
        }
        if let Some(stream) = &self.camera {
            stream.set_enabled(TrackKind::Video, enabled);
        }
        self.camera_enabled = enabled;
        Some(if enabled {
            SignalMessage::CameraOn
        } else {
            SignalMessage::CameraOff
        })
    }

    pub fn is_sharing(&self) -> bool {
        self.screen.is_some()
    }

    pub fn screen_requested(&self) -> bool {
        self.screen_requested
    }

    pub fn screen_track(&self) -> Option<TrackRef> {
        self.screen.as_ref().and_then(MediaStream::first_video)
    }

    /// Start a display capture. Returns `None` while a share is already
    /// active or being requested.
    pub fn begin_screen_share(
        &mut self,
    ) -> Option<BoxFuture<'static, Result<MediaStream, MediaError>>> {
        if self.screen_requested {
            return None;
        }
        self.screen_requested = true;
        let devices = self.devices.clone();
        let notifier = self.screen_ended.clone();
        Some(async move { devices.get_display_media(notifier).await }.boxed())
    }

    /// Take ownership of a finished display capture. Returns the screen video
    /// track, or `None` (and stops the capture) if the share was cancelled in
    /// the meantime or the capture holds no video.
    pub fn install_screen(&mut self, stream: MediaStream) -> Option<TrackRef> {
        if !self.screen_requested || self.screen.is_some() {
            debug!("Discarding display capture that is no longer wanted");
            stream.stop_all();
            return None;
        }
        let Some(track) = stream.first_video() else {
            warn!("Display capture has no video track");
            stream.stop_all();
            self.screen_requested = false;
            return None;
        };
        self.screen = Some(stream);
        Some(track)
    }

    /// A display capture failed or was declined.
    pub fn abort_screen_share(&mut self) {
        if self.screen.is_none() {
            self.screen_requested = false;
        }
    }

    /// Stop sharing and release the display capture. Returns whether a share
    /// was active. A pending request is cancelled as well.
    pub fn end_screen_share(&mut self) -> bool {
        self.screen_requested = false;
        match self.screen.take() {
            Some(stream) => {
                stream.stop_all();
                true
            }
            None => false,
        }
    }

    pub fn is_screen_track(&self, track_id: &str) -> bool {
        self.screen.as_ref().is_some_and(|s| s.has_track(track_id))
    }

    /// The active outgoing video source.
    pub fn outgoing_video(&self) -> Option<TrackRef> {
        self.screen_track().or_else(|| self.camera_video_track())
    }

    pub fn outgoing(&self) -> OutgoingMedia {
        let mut tracks = self
            .camera
            .as_ref()
            .map(MediaStream::audio_tracks)
            .unwrap_or_default();
        tracks.extend(self.outgoing_video());
        OutgoingMedia {
            stream: self.camera.clone().or_else(|| self.screen.clone()),
            tracks,
        }
    }

    /// What the local tile shows: the shared screen with the microphone while
    /// presenting, the camera stream otherwise.
    pub fn preview_stream(&self) -> Option<MediaStream> {
        match &self.screen {
            Some(screen) => {
                let preview = MediaStream::with_tracks("local-preview", screen.video_tracks());
                if let Some(camera) = &self.camera {
                    for track in camera.audio_tracks() {
                        preview.add_track(track);
                    }
                }
                Some(preview)
            }
            None => self.camera.clone(),
        }
    }

    /// Stop every local track. Safe to call more than once.
    pub fn stop_all(&mut self) {
        self.end_screen_share();
        if let Some(camera) = self.camera.take() {
            camera.stop_all();
        }
        self.mic_enabled = false;
        self.camera_enabled = false;
    }

    pub fn live_track_count(&self) -> usize {
        [&self.camera, &self.screen]
            .into_iter()
            .flatten()
            .flat_map(MediaStream::tracks)
            .filter(|t| t.is_live())
            .count()
    }
}
