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

//! Framework-agnostic event types for a meeting session.
//!
//! These events are emitted on the session's [`EventBus`](crate::EventBus)
//! and can be consumed by any frontend.

use meshmeet_types::ParticipantId;

use crate::chat::ChatMessage;
use crate::negotiation::NegotiationState;
use crate::roster::Participant;
use crate::session::SessionPhase;

/// Events emitted by a [`MeetingSession`](crate::MeetingSession).
#[derive(Clone, Debug)]
pub enum MeetingEvent {
    // === Lifecycle Events ===
    /// The session moved to a new phase
    PhaseChanged(SessionPhase),

    /// The signaling channel is open and the session is live
    Connected,

    /// The signaling channel closed unexpectedly. No reconnect is attempted.
    ConnectionLost(String),

    /// The meeting was ended by the host
    MeetingEnded,

    /// The local user left
    Left,

    // === Roster Events ===
    /// The ordered roster changed (self first, then ascending id)
    RosterUpdated(Vec<Participant>),

    /// The presenter changed
    PresenterChanged(Option<ParticipantId>),

    /// A peer session changed negotiation state
    PeerStateChanged {
        peer_id: ParticipantId,
        state: NegotiationState,
    },

    // === Chat Events ===
    /// A chat message was appended to the transcript
    ChatReceived(ChatMessage),

    /// The unread counter changed
    UnreadChanged(u32),

    // === Media Events ===
    /// Local screen share started or stopped
    ScreenShareStateChange(bool),

    /// Camera or microphone could not be opened; the session continues
    /// receive-only
    LocalMediaDegraded(String),

    /// Remote media may need a user gesture before it can play; retry
    /// playback now
    PlaybackResumeRequested,
}
