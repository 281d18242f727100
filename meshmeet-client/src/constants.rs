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

// Outgoing video ceilings, in bits per second.
pub const PRESENTER_MAX_BITRATE_BPS: u32 = 1_800_000;
pub const CAMERA_MAX_BITRATE_BPS: u32 = 650_000;

// Delay between a room snapshot and dialing the peers it lists, so the
// remote side has a chance to register its own session first.
pub const SNAPSHOT_DIAL_DELAY_MS: u64 = 100;

pub const VIDEO_HEIGHT: u32 = 720;
pub const VIDEO_WIDTH: u32 = 1280;

// Unread chat badge saturates here ("99+").
pub const UNREAD_CAP: u32 = 99;

pub const EVENT_BUS_CAPACITY: usize = 256;

// Display name used when the profile carries none.
pub const DEFAULT_DISPLAY_NAME: &str = "Me";
