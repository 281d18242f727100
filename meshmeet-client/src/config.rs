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

//! Session configuration.
//!
//! [`SessionOptions`] can be built in code with [`SessionOptions::new`] or
//! deserialized from JSON; every field except the meeting code and the local
//! user has a default.

use std::time::Duration;

use meshmeet_types::ParticipantId;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CAMERA_MAX_BITRATE_BPS, DEFAULT_DISPLAY_NAME, EVENT_BUS_CAPACITY, PRESENTER_MAX_BITRATE_BPS,
    SNAPSHOT_DIAL_DELAY_MS, UNREAD_CAP, VIDEO_HEIGHT, VIDEO_WIDTH,
};

/// The authenticated user taking part in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: ParticipantId,
    pub name: String,
}

impl Default for LocalUser {
    fn default() -> Self {
        Self {
            id: 0,
            name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

/// What to request from the capture devices when joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    pub audio: bool,
    pub video: Option<VideoConstraints>,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints {
                width: VIDEO_WIDTH,
                height: VIDEO_HEIGHT,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub meeting_code: String,
    pub user: LocalUser,
    pub presenter_max_bitrate_bps: u32,
    pub camera_max_bitrate_bps: u32,
    pub snapshot_dial_delay_ms: u64,
    pub capture: CaptureConstraints,
    pub unread_cap: u32,
    pub event_bus_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            meeting_code: String::new(),
            user: LocalUser::default(),
            presenter_max_bitrate_bps: PRESENTER_MAX_BITRATE_BPS,
            camera_max_bitrate_bps: CAMERA_MAX_BITRATE_BPS,
            snapshot_dial_delay_ms: SNAPSHOT_DIAL_DELAY_MS,
            capture: CaptureConstraints::default(),
            unread_cap: UNREAD_CAP,
            event_bus_capacity: EVENT_BUS_CAPACITY,
        }
    }
}

impl SessionOptions {
    pub fn new(meeting_code: impl Into<String>, user: LocalUser) -> Self {
        Self {
            meeting_code: meeting_code.into(),
            user,
            ..Self::default()
        }
    }

    pub fn snapshot_dial_delay(&self) -> Duration {
        Duration::from_millis(self.snapshot_dial_delay_ms)
    }
}
