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

//! Client-side core of a meshmeet meeting.
//!
//! Every participant holds one peer connection to every other participant
//! (a full mesh). This crate owns the session lifecycle around that mesh:
//! joining through the meeting API, capturing local media, exchanging
//! offers, answers and ICE candidates over the signaling relay, and keeping
//! the roster, presenter and chat state a UI renders.
//!
//! It makes no assumption about the UI or the media stack. Capture devices
//! and peer connections are reached through the [`MediaDevices`] and
//! [`MediaEngine`] traits, the REST backend through [`MeetingApi`], and the
//! relay through [`SignalingConnector`] ([`WebSocketConnector`] for the real
//! thing).
//!
//! # Outline of usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use meshmeet_client::*;
//! # async fn demo(deps: SessionDeps) -> Result<(), SessionError> {
//! let options = SessionOptions::new("abc-defg-hij", LocalUser { id: 7, name: "Ada".into() });
//! let session = MeetingSession::join(options, deps).await?;
//! let handle = session.spawn();
//!
//! let mut events = handle.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//!
//! handle.toggle_mic()?;
//! handle.send_chat("hello").await?;
//! handle.leave()?;
//! handle.ended().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod chat;
pub mod config;
pub mod constants;
pub mod engine;
pub mod event_bus;
pub mod events;
pub mod media;
pub mod negotiation;
pub mod peers;
pub mod roster;
pub mod session;
pub mod signaling;

pub use api::MeetingApi;
pub use chat::{ChatLog, ChatMessage};
pub use config::{CaptureConstraints, LocalUser, SessionOptions, VideoConstraints};
pub use engine::{
    ContentHint, MediaEngine, PeerConnection, PeerConnectionState, PeerEvent, PeerEventKind,
    PeerEvents, RtcConfiguration, VideoEncoding,
};
pub use event_bus::EventBus;
pub use events::MeetingEvent;
pub use media::{
    LocalMediaController, MediaDevices, MediaError, MediaStream, MediaTrack, TrackEndedNotifier,
    TrackKind, TrackRef,
};
pub use negotiation::{should_initiate, NegotiationState};
pub use peers::{PeerRegistry, PeerSession};
pub use roster::{Participant, PresenterState, Roster};
pub use session::{
    EndScope, MeetingSession, SessionCommand, SessionDeps, SessionError, SessionHandle,
    SessionPhase,
};
pub use signaling::{
    ChannelEvent, ChannelEvents, SignalingChannel, SignalingConnector, SignalingError,
    WebSocketConnector,
};
