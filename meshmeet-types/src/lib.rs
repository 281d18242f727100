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
 */

//! Wire types shared by the meshmeet relay, meeting API and clients.
//!
//! This crate defines two contracts:
//!
//! * [`signaling`]: the JSON envelopes exchanged over the meeting's
//!   signaling channel (`{ type, sender?, data? }`).
//! * [`responses`] / [`error`]: the REST payloads returned by the meeting
//!   API (join, chat history, ICE servers, profile).
//!
//! No HTTP client and no runtime here.

pub mod error;
pub mod responses;
pub mod signaling;

pub use error::APIError;
pub use signaling::{EventKind, SignalEnvelope, SignalMessage};

/// Server-assigned numeric participant identifier.
pub type ParticipantId = u64;
