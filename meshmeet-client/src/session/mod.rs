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

//! Meeting session lifecycle.
//!
//! A [`MeetingSession`] owns everything a participant holds while in a
//! meeting: the signaling channel, one peer session per remote participant,
//! the local capture, the roster, the presenter and the chat transcript.
//! All of it is mutated from a single place. Slow work (offer/answer
//! creation, display capture, the end-meeting request) runs as owned futures
//! whose results are fed back in and checked against the current state
//! before they take effect.
//!
//! The session can be driven directly (handy in tests, see
//! [`MeetingSession::settle`]) or moved onto a task with
//! [`MeetingSession::spawn`] and controlled through a [`SessionHandle`].

pub mod handle;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use log::{debug, error, info, warn};
use meshmeet_api_client::ApiError;
use meshmeet_types::responses::ChatTimestamp;
use meshmeet_types::signaling::{
    CandidatePayload, ChatPayload, IceCandidateInit, SdpPayload, Sender, SessionDescription,
};
use meshmeet_types::{ParticipantId, SignalEnvelope, SignalMessage};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::api::MeetingApi;
use crate::chat::{now_millis, ChatLog, ChatMessage};
use crate::config::SessionOptions;
use crate::engine::{
    ContentHint, MediaEngine, PeerEvent, PeerEventKind, RtcConfiguration, VideoEncoding,
};
use crate::event_bus::EventBus;
use crate::events::MeetingEvent;
use crate::media::{
    LocalMediaController, MediaDevices, MediaError, MediaStream, MediaTrack, TrackEndedNotifier,
    TrackKind, TrackRef,
};
use crate::negotiation::{
    answer_task, apply_answer_task, candidate_task, encoding_task, offer_task,
    replace_video_task, should_initiate, NegotiationInput, NegotiationOutcome, NegotiationState,
    NegotiationStep, NegotiationTask, TaskKind,
};
use crate::peers::PeerRegistry;
use crate::roster::{Participant, PresenterState, Roster};
use crate::signaling::{ChannelEvent, ChannelEvents, SignalingChannel, SignalingConnector, SignalingError};

pub use handle::{SessionCommand, SessionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Joining,
    MediaAcquiring,
    SignalingConnecting,
    Active,
    Leaving,
    Ended,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndScope {
    /// Leave; everyone else stays.
    ForMe,
    /// Host only: end the meeting for all participants.
    ForEveryone,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("join rejected: {0}")]
    JoinRejected(#[source] ApiError),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error("{0}")]
    EndMeeting(String),
    #[error("only the host can end the meeting for everyone")]
    NotHost,
    #[error("session is not active")]
    NotActive,
    #[error("chat message is empty")]
    EmptyChatMessage,
    #[error("session task has stopped")]
    Stopped,
}

/// The collaborators a session is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub api: Arc<dyn MeetingApi>,
    pub devices: Arc<dyn MediaDevices>,
    pub engine: Arc<dyn MediaEngine>,
    pub connector: Arc<dyn SignalingConnector>,
}

enum TaskOutcome {
    Negotiation(NegotiationOutcome),
    ScreenCaptured(Result<MediaStream, MediaError>),
    EndMeeting {
        result: Result<(), ApiError>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

type SessionTask = BoxFuture<'static, TaskOutcome>;

/// Latest-value cells for state a UI renders continuously.
struct LatestCells {
    phase: watch::Sender<SessionPhase>,
    roster: watch::Sender<Vec<Participant>>,
    presenter: watch::Sender<Option<ParticipantId>>,
    chat_open: watch::Sender<bool>,
    unread: watch::Sender<u32>,
}

impl LatestCells {
    fn new() -> Self {
        Self {
            phase: watch::channel(SessionPhase::Joining).0,
            roster: watch::channel(Vec::new()).0,
            presenter: watch::channel(None).0,
            chat_open: watch::channel(false).0,
            unread: watch::channel(0).0,
        }
    }

    fn announce(&self, bus: &EventBus, phase: SessionPhase) {
        self.phase.send_replace(phase);
        bus.emit(MeetingEvent::PhaseChanged(phase));
    }
}

pub struct MeetingSession {
    options: SessionOptions,
    api: Arc<dyn MeetingApi>,
    phase: SessionPhase,
    channel: SignalingChannel,
    channel_events: ChannelEvents,
    peers: PeerRegistry,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    media: LocalMediaController,
    screen_ended: mpsc::UnboundedReceiver<String>,
    roster: Roster,
    presenter: PresenterState,
    chat: ChatLog,
    pending: FuturesUnordered<SessionTask>,
    // Dial peers from the last snapshot once this passes.
    dial_at: Option<Instant>,
    bus: EventBus,
    cells: LatestCells,
}

impl fmt::Debug for MeetingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeetingSession")
            .field("meeting_code", &self.options.meeting_code)
            .field("self_id", &self.options.user.id)
            .field("phase", &self.phase)
            .field("peers", &self.peers.sorted_ids())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Drop for MeetingSession {
    fn drop(&mut self) {
        self.leave();
    }
}

impl MeetingSession {
    /// Join a meeting: REST join, local capture, ICE servers, signaling.
    ///
    /// A rejected join fails before any device is touched. Missing chat
    /// history, ICE servers or capture devices degrade the session instead
    /// of failing it.
    pub async fn join(options: SessionOptions, deps: SessionDeps) -> Result<Self, SessionError> {
        let bus = EventBus::new(options.event_bus_capacity);
        Self::join_with_bus(options, deps, bus).await
    }

    /// Like [`join`](Self::join), emitting on a bus the caller may already be
    /// subscribed to.
    pub async fn join_with_bus(
        options: SessionOptions,
        deps: SessionDeps,
        bus: EventBus,
    ) -> Result<Self, SessionError> {
        let cells = LatestCells::new();
        let code = options.meeting_code.clone();
        cells.announce(&bus, SessionPhase::Joining);

        let joined = match deps.api.join_meeting(&code).await {
            Ok(joined) => joined,
            Err(e) => {
                warn!("Join of meeting {code} rejected: {e}");
                cells.announce(&bus, SessionPhase::Ended);
                return Err(SessionError::JoinRejected(e));
            }
        };
        info!(
            "Joined meeting {code} as {} ({} participant(s), host {:?})",
            options.user.id,
            joined.participants.len(),
            joined.host_id
        );

        let mut roster = Roster::new(options.user.id, options.user.name.clone());
        roster.seed(&joined.participants, joined.host_id);

        let mut chat = ChatLog::new(options.unread_cap);
        match deps.api.chat_history(&code).await {
            Ok(history) => chat.load_history(history),
            Err(e) => warn!("Chat history for {code} unavailable: {e}"),
        }

        cells.announce(&bus, SessionPhase::MediaAcquiring);
        let (screen_tx, screen_ended) = mpsc::unbounded_channel();
        let mut media = LocalMediaController::new(
            deps.devices.clone(),
            options.capture.clone(),
            TrackEndedNotifier::new(screen_tx),
        );
        if let Err(e) = media.acquire().await {
            warn!("Continuing without local media: {e}");
            bus.emit(MeetingEvent::LocalMediaDegraded(e.to_string()));
        }
        roster.set_local_media(media.camera_stream(), media.mic_enabled(), media.camera_enabled());

        let rtc = match deps.api.ice_servers().await {
            Ok(response) => RtcConfiguration::from(response),
            Err(e) => {
                warn!("ICE servers unavailable, using defaults: {e}");
                RtcConfiguration::default()
            }
        };

        cells.announce(&bus, SessionPhase::SignalingConnecting);
        let (channel, channel_events) = match deps.connector.connect(&code).await {
            Ok(pair) => pair,
            Err(e) => {
                error!("Signaling for meeting {code} failed: {e}");
                media.stop_all();
                cells.announce(&bus, SessionPhase::Ended);
                return Err(e.into());
            }
        };

        let (peer_tx, peer_events) = mpsc::unbounded_channel();
        let session = Self {
            api: deps.api,
            phase: SessionPhase::SignalingConnecting,
            channel,
            channel_events,
            peers: PeerRegistry::new(deps.engine, rtc, peer_tx),
            peer_events,
            media,
            screen_ended,
            roster,
            presenter: PresenterState::default(),
            chat,
            pending: FuturesUnordered::new(),
            dial_at: None,
            bus,
            cells,
            options,
        };
        session.publish_roster();
        session.cells.unread.send_replace(session.chat.unread());
        Ok(session)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn self_id(&self) -> ParticipantId {
        self.options.user.id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.roster.participants()
    }

    pub fn presenter(&self) -> Option<ParticipantId> {
        self.presenter.current()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn local_media(&self) -> &LocalMediaController {
        &self.media
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> async_broadcast::Receiver<MeetingEvent> {
        self.bus.subscribe()
    }

    fn is_live(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::SignalingConnecting | SessionPhase::Active
        )
    }

    // ── Publishing ────────────────────────────────────────────────────────────

    fn set_phase(&mut self, phase: SessionPhase) {
        debug!("Session phase {} -> {phase}", self.phase);
        self.phase = phase;
        self.cells.announce(&self.bus, phase);
    }

    fn publish_roster(&self) {
        let list = self.roster.participants();
        self.cells.roster.send_replace(list.clone());
        self.bus.emit(MeetingEvent::RosterUpdated(list));
    }

    fn publish_presenter(&self) {
        let current = self.presenter.current();
        self.cells.presenter.send_replace(current);
        self.bus.emit(MeetingEvent::PresenterChanged(current));
    }

    fn publish_unread(&self) {
        let unread = self.chat.unread();
        self.cells.unread.send_replace(unread);
        self.bus.emit(MeetingEvent::UnreadChanged(unread));
    }

    fn emit_peer_state(&self, peer_id: ParticipantId) {
        if let Some(session) = self.peers.get(peer_id) {
            self.bus.emit(MeetingEvent::PeerStateChanged {
                peer_id,
                state: session.state,
            });
        }
    }

    /// Best-effort send: a closed channel is logged, not fatal.
    fn send(&self, message: SignalMessage) -> bool {
        let kind = message.kind();
        match self.channel.send(&SignalEnvelope::new(message)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping outbound {kind}: {e}");
                false
            }
        }
    }

    fn push_negotiation(&mut self, task: NegotiationTask) {
        self.pending.push(task.map(TaskOutcome::Negotiation).boxed());
    }

    // ── Inbound: signaling ────────────────────────────────────────────────────

    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                if self.phase != SessionPhase::SignalingConnecting {
                    return;
                }
                self.set_phase(SessionPhase::Active);
                self.bus.emit(MeetingEvent::Connected);
                self.dial_larger_ids();
            }
            ChannelEvent::Message(envelope) => self.handle_signal(envelope),
            ChannelEvent::Closed(reason) => {
                if self.is_live() {
                    warn!("Signaling channel lost: {reason}");
                    self.bus.emit(MeetingEvent::ConnectionLost(reason));
                }
            }
        }
    }

    pub fn handle_signal(&mut self, envelope: SignalEnvelope) {
        if self.phase != SessionPhase::Active {
            debug!("Ignoring {} in phase {}", envelope.kind(), self.phase);
            return;
        }
        let self_id = self.self_id();
        if let Some(to) = envelope.message.recipient() {
            if to != self_id {
                return;
            }
        }
        let SignalEnvelope { sender, message } = envelope;
        let from = sender.as_ref().map(|s| s.id);

        match message {
            SignalMessage::UserJoined(user) => {
                if self.roster.add(user.id, &user.name) {
                    info!("{} ({}) joined", user.name, user.id);
                    self.publish_roster();
                }
                self.call_peer(user.id);
            }
            SignalMessage::UserLeft(user) => self.participant_left(user.id),
            SignalMessage::RoomState(snapshot) => {
                self.roster.apply_snapshot(&snapshot);
                self.publish_roster();
                if self.presenter.apply_snapshot(snapshot.presenter_id) {
                    self.publish_presenter();
                    self.retune();
                }
                self.dial_at = Some(Instant::now() + self.options.snapshot_dial_delay());
            }
            SignalMessage::ScreenShareStart => {
                if let Some(id) = from {
                    if self.presenter.start(id) {
                        self.publish_presenter();
                        self.retune();
                    }
                }
            }
            SignalMessage::ScreenShareStop => {
                if let Some(id) = from {
                    if self.presenter.stop(id) {
                        self.publish_presenter();
                        self.retune();
                    }
                }
            }
            SignalMessage::Mute => self.remote_mic(from, false),
            SignalMessage::Unmute => self.remote_mic(from, true),
            SignalMessage::CameraOn => self.remote_camera(from, true),
            SignalMessage::CameraOff => self.remote_camera(from, false),
            SignalMessage::Media(flags) => {
                if let Some(id) = from {
                    if self.roster.apply_media(id, &flags) {
                        self.publish_roster();
                    }
                }
            }
            SignalMessage::Chat(payload) => self.handle_chat(sender.as_ref(), payload),
            SignalMessage::Offer(payload) => match sender {
                Some(sender) => self.handle_offer(&sender, payload.sdp),
                None => debug!("Dropping offer without sender"),
            },
            SignalMessage::Answer(payload) => match from {
                Some(id) => self.handle_answer(id, payload.sdp),
                None => debug!("Dropping answer without sender"),
            },
            SignalMessage::IceCandidate(payload) => match from {
                Some(id) => self.handle_candidate(id, payload.candidate),
                None => debug!("Dropping ICE candidate without sender"),
            },
            SignalMessage::MeetingEnded => {
                info!("Meeting {} ended by host", self.options.meeting_code);
                self.teardown(MeetingEvent::MeetingEnded);
            }
        }
    }

    fn remote_mic(&mut self, from: Option<ParticipantId>, on: bool) {
        if let Some(id) = from {
            if self.roster.set_muted(id, !on) {
                self.publish_roster();
            }
        }
    }

    fn remote_camera(&mut self, from: Option<ParticipantId>, on: bool) {
        if let Some(id) = from {
            if self.roster.set_camera_on(id, on) {
                self.publish_roster();
            }
        }
    }

    fn participant_left(&mut self, id: ParticipantId) {
        if id == self.self_id() {
            return;
        }
        if self.roster.remove(id).is_some() {
            info!("Participant {id} left");
            self.publish_roster();
        }
        self.peers.delete_session(id);
        if self.presenter.participant_left(id) {
            self.publish_presenter();
            self.retune();
        }
    }

    fn handle_chat(&mut self, sender: Option<&Sender>, payload: ChatPayload) {
        if sender.is_some_and(|s| s.id == self.self_id()) {
            // Our own message relayed back; already shown.
            return;
        }
        let (message, bumped) = self.chat.push_remote(sender, payload);
        self.bus.emit(MeetingEvent::ChatReceived(message));
        if bumped {
            self.publish_unread();
        }
    }

    fn handle_offer(&mut self, sender: &Sender, offer: SessionDescription) {
        let from = sender.id;
        if from == self.self_id() {
            return;
        }
        if self.roster.add(from, &sender.name) {
            self.publish_roster();
        }
        let outgoing = self.media.outgoing();
        let session = match self.peers.ensure_session(from, &outgoing) {
            Ok(session) => session,
            Err(e) => {
                warn!("Cannot answer peer {from}: {e}");
                return;
            }
        };
        if !session.transition(NegotiationInput::RemoteOffer) {
            return;
        }
        let task = answer_task(session.connection.clone(), from, session.generation, offer);
        self.push_negotiation(task);
        self.emit_peer_state(from);
    }

    fn handle_answer(&mut self, from: ParticipantId, answer: SessionDescription) {
        let Some(session) = self.peers.get_mut(from) else {
            debug!("Dropping answer from {from}: no peer session");
            return;
        };
        if !session.transition(NegotiationInput::RemoteAnswer) {
            return;
        }
        let task = apply_answer_task(session.connection.clone(), from, session.generation, answer);
        self.push_negotiation(task);
        self.emit_peer_state(from);
    }

    fn handle_candidate(&mut self, from: ParticipantId, candidate: IceCandidateInit) {
        let Some(session) = self.peers.get(from) else {
            debug!("Dropping ICE candidate from {from}: no peer session");
            return;
        };
        let task = candidate_task(session.connection.clone(), from, session.generation, candidate);
        self.push_negotiation(task);
    }

    // ── Inbound: peer connections ─────────────────────────────────────────────

    pub fn handle_peer_event(&mut self, event: PeerEvent) {
        let PeerEvent {
            remote_id,
            generation,
            kind,
        } = event;
        if self.phase != SessionPhase::Active || !self.peers.is_current(remote_id, generation) {
            debug!("Ignoring event from stale peer session {remote_id}/{generation}");
            return;
        }
        match kind {
            PeerEventKind::LocalCandidate(candidate) => {
                self.send(SignalMessage::IceCandidate(CandidatePayload {
                    to: remote_id,
                    candidate,
                }));
            }
            PeerEventKind::TrackAdded(track) => self.remote_track_added(remote_id, track),
            PeerEventKind::TrackMuted { kind, .. } | PeerEventKind::TrackEnded { kind, .. } => {
                if kind == TrackKind::Video && self.roster.set_camera_on(remote_id, false) {
                    self.publish_roster();
                }
            }
            PeerEventKind::TrackUnmuted { kind, .. } => {
                if kind == TrackKind::Video && self.roster.set_camera_on(remote_id, true) {
                    self.publish_roster();
                }
            }
            PeerEventKind::StateChanged(state) => {
                debug!("Peer {remote_id} connection state {state:?}");
            }
        }
    }

    fn remote_track_added(&mut self, remote_id: ParticipantId, track: TrackRef) {
        let is_video = track.kind() == TrackKind::Video;
        let mut changed = match self.peers.merge_remote_track(remote_id, track) {
            Ok(Some(stream)) => self.roster.attach_stream(remote_id, stream),
            Ok(None) => false,
            Err(e) => {
                debug!("Dropping remote track: {e}");
                return;
            }
        };
        if is_video {
            changed |= self.roster.set_camera_on(remote_id, true);
        }
        if changed {
            self.publish_roster();
        }
        self.bus.emit(MeetingEvent::PlaybackResumeRequested);
    }

    // ── Negotiation ───────────────────────────────────────────────────────────

    /// Start an offer to `remote_id` if this side is the initiator and the
    /// session has not negotiated yet. Returns whether an offer was started.
    pub fn call_peer(&mut self, remote_id: ParticipantId) -> bool {
        if self.phase != SessionPhase::Active || !should_initiate(self.self_id(), remote_id) {
            return false;
        }
        let outgoing = self.media.outgoing();
        let session = match self.peers.ensure_session(remote_id, &outgoing) {
            Ok(session) => session,
            Err(e) => {
                warn!("Cannot create peer session for {remote_id}: {e}");
                return false;
            }
        };
        if session.state != NegotiationState::Idle {
            return false;
        }
        session.transition(NegotiationInput::StartOffer);
        let task = offer_task(session.connection.clone(), remote_id, session.generation);
        info!("Calling peer {remote_id}");
        self.push_negotiation(task);
        self.emit_peer_state(remote_id);
        true
    }

    fn dial_larger_ids(&mut self) {
        for id in self.roster.ids_above_self() {
            self.call_peer(id);
        }
    }

    fn dial_due(&mut self) {
        self.dial_at = None;
        self.dial_larger_ids();
    }

    fn apply_outcome(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Negotiation(outcome) => self.apply_negotiation(outcome),
            TaskOutcome::ScreenCaptured(result) => self.apply_screen_capture(result),
            TaskOutcome::EndMeeting { result, reply } => {
                let _ = reply.send(self.finish_end_meeting(result));
            }
        }
    }

    fn apply_negotiation(&mut self, outcome: NegotiationOutcome) {
        let NegotiationOutcome {
            remote_id,
            generation,
            kind,
            result,
        } = outcome;
        if self.phase != SessionPhase::Active || !self.peers.is_current(remote_id, generation) {
            debug!("Discarding {kind:?} result for closed peer session {remote_id}");
            return;
        }
        let step = match result {
            Ok(step) => step,
            Err(e) if kind.is_negotiation() => {
                warn!("{kind:?} with peer {remote_id} failed: {e}");
                if let Some(session) = self.peers.get_mut(remote_id) {
                    session.transition(NegotiationInput::Fail);
                }
                self.emit_peer_state(remote_id);
                return;
            }
            Err(e) if kind == TaskKind::Candidate => {
                debug!("Ignoring ICE candidate from {remote_id}: {e}");
                return;
            }
            Err(e) => {
                warn!("{kind:?} for peer {remote_id} failed: {e}");
                return;
            }
        };
        match step {
            NegotiationStep::OfferReady(offer) => {
                let advanced = self
                    .peers
                    .get_mut(remote_id)
                    .is_some_and(|s| s.transition(NegotiationInput::LocalOfferSet));
                if advanced {
                    self.send(SignalMessage::Offer(SdpPayload {
                        to: remote_id,
                        sdp: offer,
                    }));
                    self.emit_peer_state(remote_id);
                }
            }
            NegotiationStep::AnswerReady(answer) => {
                let advanced = self
                    .peers
                    .get_mut(remote_id)
                    .is_some_and(|s| s.transition(NegotiationInput::LocalAnswerSent));
                if advanced {
                    self.send(SignalMessage::Answer(SdpPayload {
                        to: remote_id,
                        sdp: answer,
                    }));
                    info!("Answered peer {remote_id}");
                    self.emit_peer_state(remote_id);
                    self.tune_peer(remote_id);
                }
            }
            NegotiationStep::RemoteAnswerApplied => {
                info!("Peer {remote_id} accepted our offer");
                self.tune_peer(remote_id);
            }
            NegotiationStep::CandidateApplied
            | NegotiationStep::EncodingApplied
            | NegotiationStep::VideoTrackReplaced => {}
        }
    }

    // ── Outgoing bitrate ──────────────────────────────────────────────────────

    fn outgoing_encoding(&self) -> Option<VideoEncoding> {
        let sharing = self.media.is_sharing();
        if sharing && self.presenter.is_presenting(self.self_id()) {
            Some(VideoEncoding {
                max_bitrate_bps: self.options.presenter_max_bitrate_bps,
                content_hint: ContentHint::Detail,
            })
        } else if sharing || self.media.camera_enabled() {
            Some(VideoEncoding {
                max_bitrate_bps: self.options.camera_max_bitrate_bps,
                content_hint: ContentHint::Motion,
            })
        } else {
            None
        }
    }

    fn tune_peer(&mut self, remote_id: ParticipantId) {
        let Some(encoding) = self.outgoing_encoding() else {
            return;
        };
        if let Some(session) = self.peers.get(remote_id) {
            let task = encoding_task(session.connection.clone(), remote_id, session.generation, encoding);
            self.push_negotiation(task);
        }
    }

    fn retune(&mut self) {
        let Some(encoding) = self.outgoing_encoding() else {
            return;
        };
        debug!(
            "Tuning outgoing video to {} bps ({})",
            encoding.max_bitrate_bps,
            encoding.content_hint.as_str()
        );
        let tasks: Vec<NegotiationTask> = self
            .peers
            .iter()
            .map(|s| encoding_task(s.connection.clone(), s.remote_id, s.generation, encoding))
            .collect();
        for task in tasks {
            self.push_negotiation(task);
        }
    }

    fn replace_outgoing_video(&mut self, track: TrackRef) {
        let tasks: Vec<NegotiationTask> = self
            .peers
            .iter()
            .map(|s| replace_video_task(s.connection.clone(), s.remote_id, s.generation, track.clone()))
            .collect();
        for task in tasks {
            self.push_negotiation(task);
        }
    }

    // ── Local media ───────────────────────────────────────────────────────────

    pub fn set_mic_enabled(&mut self, enabled: bool) {
        if !self.is_live() {
            return;
        }
        if let Some(signal) = self.media.set_mic_enabled(enabled) {
            self.sync_local_flags();
            self.send(signal);
        }
    }

    fn sync_local_flags(&mut self) {
        let (mic, camera) = (self.media.mic_enabled(), self.media.camera_enabled());
        if self.roster.set_local_flags(mic, camera) {
            self.publish_roster();
        }
    }

    pub fn toggle_mic(&mut self) {
        self.set_mic_enabled(!self.media.mic_enabled());
    }

    pub fn set_camera_enabled(&mut self, enabled: bool) {
        if !self.is_live() {
            return;
        }
        if let Some(signal) = self.media.set_camera_enabled(enabled) {
            self.sync_local_flags();
            self.send(signal);
            self.retune();
        }
    }

    pub fn toggle_camera(&mut self) {
        self.set_camera_enabled(!self.media.camera_enabled());
    }

    /// Start or stop sharing the screen. Starting asks the user for a
    /// capture; the share takes effect once the capture is granted.
    pub fn set_screen_share(&mut self, on: bool) {
        if !self.is_live() {
            return;
        }
        if on {
            if let Some(capture) = self.media.begin_screen_share() {
                info!("Requesting display capture");
                self.pending
                    .push(capture.map(TaskOutcome::ScreenCaptured).boxed());
            }
        } else {
            self.stop_screen_share();
        }
    }

    fn apply_screen_capture(&mut self, result: Result<MediaStream, MediaError>) {
        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Display capture failed: {e}");
                self.media.abort_screen_share();
                self.bus.emit(MeetingEvent::ScreenShareStateChange(false));
                return;
            }
        };
        if !self.is_live() {
            stream.stop_all();
            return;
        }
        let Some(track) = self.media.install_screen(stream) else {
            return;
        };
        info!("Screen share started");
        self.replace_outgoing_video(track);
        self.roster.set_local_stream(self.media.preview_stream());
        self.publish_roster();
        let self_id = self.self_id();
        if self.presenter.start(self_id) {
            self.publish_presenter();
        }
        self.send(SignalMessage::ScreenShareStart);
        self.retune();
        self.bus.emit(MeetingEvent::ScreenShareStateChange(true));
    }

    fn stop_screen_share(&mut self) {
        if !self.media.end_screen_share() {
            return;
        }
        info!("Screen share stopped");
        if let Some(camera) = self.media.camera_video_track() {
            self.replace_outgoing_video(camera);
        }
        self.roster.set_local_stream(self.media.preview_stream());
        self.publish_roster();
        let self_id = self.self_id();
        if self.presenter.stop(self_id) {
            self.publish_presenter();
        }
        self.send(SignalMessage::ScreenShareStop);
        self.retune();
        self.bus.emit(MeetingEvent::ScreenShareStateChange(false));
    }

    pub fn handle_screen_track_ended(&mut self, track_id: &str) {
        if self.media.is_screen_track(track_id) {
            debug!("Display capture {track_id} ended by the user agent");
            self.stop_screen_share();
        }
    }

    /// A user gesture happened; remote media blocked by autoplay policy may
    /// be resumed now.
    pub fn user_gesture(&mut self) {
        self.bus.emit(MeetingEvent::PlaybackResumeRequested);
    }

    // ── Chat ──────────────────────────────────────────────────────────────────

    pub fn send_chat(&mut self, text: &str) -> Result<ChatMessage, SessionError> {
        if !self.is_live() {
            return Err(SessionError::NotActive);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyChatMessage);
        }
        self.channel
            .send(&SignalEnvelope::new(SignalMessage::Chat(ChatPayload {
                text: text.to_string(),
                timestamp: Some(ChatTimestamp::Millis(now_millis())),
            })))?;
        let self_id = self.self_id();
        let message = self.chat.push_local(self_id, &self.options.user.name, text);
        self.bus.emit(MeetingEvent::ChatReceived(message.clone()));
        Ok(message)
    }

    pub fn set_chat_open(&mut self, open: bool) {
        self.cells.chat_open.send_replace(open);
        if self.chat.set_panel_open(open) {
            self.publish_unread();
        }
    }

    // ── Leaving ───────────────────────────────────────────────────────────────

    /// Queue an end-of-meeting request; the result is delivered on `reply`.
    pub fn request_end_meeting(
        &mut self,
        scope: EndScope,
        reply: oneshot::Sender<Result<(), SessionError>>,
    ) {
        match scope {
            EndScope::ForMe => {
                self.leave();
                let _ = reply.send(Ok(()));
            }
            EndScope::ForEveryone => {
                if !self.is_live() {
                    let _ = reply.send(Err(SessionError::NotActive));
                    return;
                }
                if !self.roster.is_self_host() {
                    let _ = reply.send(Err(SessionError::NotHost));
                    return;
                }
                let api = self.api.clone();
                let code = self.options.meeting_code.clone();
                info!("Ending meeting {code} for everyone");
                self.pending.push(
                    async move {
                        let result = api.end_meeting(&code).await;
                        TaskOutcome::EndMeeting { result, reply }
                    }
                    .boxed(),
                );
            }
        }
    }

    /// End the meeting and wait for the outcome. On failure the session
    /// stays active and the server's message is returned.
    pub async fn end_meeting(&mut self, scope: EndScope) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request_end_meeting(scope, tx);
        self.settle().await;
        rx.await.unwrap_or(Err(SessionError::Stopped))
    }

    fn finish_end_meeting(&mut self, result: Result<(), ApiError>) -> Result<(), SessionError> {
        match result {
            Ok(()) => {
                self.teardown(MeetingEvent::MeetingEnded);
                Ok(())
            }
            Err(e) => {
                warn!("Ending meeting {} failed: {e}", self.options.meeting_code);
                Err(SessionError::EndMeeting(e.to_string()))
            }
        }
    }

    /// Leave the meeting. Synchronous and idempotent, so it is safe to call
    /// from an unload path.
    pub fn leave(&mut self) {
        self.teardown(MeetingEvent::Left);
    }

    fn teardown(&mut self, farewell: MeetingEvent) {
        if matches!(self.phase, SessionPhase::Leaving | SessionPhase::Ended) {
            return;
        }
        self.set_phase(SessionPhase::Leaving);
        let closed = self.peers.close_all();
        self.media.stop_all();
        self.channel.close();
        self.roster.reset();
        self.presenter.clear();
        self.chat.reset();
        self.dial_at = None;
        self.publish_roster();
        self.publish_presenter();
        self.cells.chat_open.send_replace(false);
        self.cells.unread.send_replace(0);
        info!(
            "Left meeting {} ({closed} peer session(s) closed)",
            self.options.meeting_code
        );
        self.set_phase(SessionPhase::Ended);
        self.bus.emit(farewell);
    }

    // ── Driving ───────────────────────────────────────────────────────────────

    /// Process everything that is ready: queued channel and peer events,
    /// in-flight tasks, and a pending snapshot dial. Returns once nothing is
    /// left to do.
    pub async fn settle(&mut self) {
        loop {
            let mut progressed = false;
            while let Some(event) = self.channel_events.try_recv() {
                self.handle_channel_event(event);
                progressed = true;
            }
            while let Ok(event) = self.peer_events.try_recv() {
                self.handle_peer_event(event);
                progressed = true;
            }
            while let Ok(track_id) = self.screen_ended.try_recv() {
                self.handle_screen_track_ended(&track_id);
                progressed = true;
            }
            if !self.pending.is_empty() {
                if let Some(outcome) = self.pending.next().await {
                    self.apply_outcome(outcome);
                }
                continue;
            }
            if progressed {
                continue;
            }
            match self.dial_at {
                Some(deadline) => {
                    tokio::time::sleep_until(deadline).await;
                    self.dial_due();
                }
                None => break,
            }
        }
    }
}
