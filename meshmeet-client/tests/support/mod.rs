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

//! In-memory stand-ins for the devices, peer connections, meeting API and
//! relay a session talks to.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meshmeet_api_client::ApiError;
use meshmeet_client::engine::OfferOptions;
use meshmeet_client::{
    CaptureConstraints, ChannelEvents, EventBus, LocalUser, MediaDevices, MediaEngine, MediaError,
    MediaStream, MediaTrack, MeetingApi, MeetingEvent, MeetingSession, PeerConnection, PeerEvents,
    RtcConfiguration, SessionDeps, SessionError, SessionOptions, SignalingChannel,
    SignalingConnector, SignalingError, TrackEndedNotifier, TrackKind, TrackRef, VideoEncoding,
};
use meshmeet_types::responses::{
    ChatHistoryEntry, IceServersResponse, JoinMeetingResponse, ParticipantSummary,
};
use meshmeet_types::signaling::{IceCandidateInit, SessionDescription};
use meshmeet_types::{ParticipantId, SignalEnvelope, SignalMessage};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Tracks and devices
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MockTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    live: AtomicBool,
}

impl MockTrack {
    pub fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            enabled: AtomicBool::new(true),
            live: AtomicBool::new(true),
        })
    }
}

impl MediaTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }
    fn kind(&self) -> TrackKind {
        self.kind
    }
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

pub fn remote_track(id: &str, kind: TrackKind) -> TrackRef {
    MockTrack::new(id, kind)
}

#[derive(Default)]
pub struct MockDevices {
    pub fail_user_media: AtomicBool,
    pub fail_display: AtomicBool,
    created: Mutex<Vec<Arc<MockTrack>>>,
    notifier: Mutex<Option<TrackEndedNotifier>>,
    display_requests: AtomicUsize,
    user_media_requests: AtomicUsize,
}

impl MockDevices {
    fn make(&self, id: String, kind: TrackKind) -> TrackRef {
        let track = MockTrack::new(&id, kind);
        self.created.lock().unwrap().push(track.clone());
        track
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn live_tracks(&self) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.is_live())
            .count()
    }

    pub fn track(&self, id: &str) -> Option<Arc<MockTrack>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn user_media_requests(&self) -> usize {
        self.user_media_requests.load(Ordering::SeqCst)
    }

    pub fn display_requests(&self) -> usize {
        self.display_requests.load(Ordering::SeqCst)
    }

    /// Simulate the user pressing "stop sharing" in the browser.
    pub fn end_display_capture(&self, track_id: &str) {
        if let Some(track) = self.track(track_id) {
            track.stop();
        }
        if let Some(notifier) = self.notifier.lock().unwrap().as_ref() {
            notifier.notify(track_id);
        }
    }
}

#[async_trait]
impl MediaDevices for MockDevices {
    async fn get_user_media(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<MediaStream, MediaError> {
        self.user_media_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_user_media.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("camera blocked".to_string()));
        }
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(self.make("mic".to_string(), TrackKind::Audio));
        }
        if constraints.video.is_some() {
            tracks.push(self.make("cam".to_string(), TrackKind::Video));
        }
        Ok(MediaStream::with_tracks("local", tracks))
    }

    async fn get_display_media(
        &self,
        on_ended: TrackEndedNotifier,
    ) -> Result<MediaStream, MediaError> {
        let n = self.display_requests.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("share declined".to_string()));
        }
        *self.notifier.lock().unwrap() = Some(on_ended);
        let track = self.make(format!("screen-{n}"), TrackKind::Video);
        Ok(MediaStream::with_tracks(format!("display-{n}"), vec![track]))
    }
}

// ---------------------------------------------------------------------------
// Peer connections
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct PcLog {
    pub offers_created: usize,
    pub answers_created: usize,
    pub local_descriptions: Vec<SessionDescription>,
    pub remote_descriptions: Vec<SessionDescription>,
    pub candidates: Vec<IceCandidateInit>,
    pub tracks: Vec<String>,
    pub video_sender: Option<String>,
    pub encodings: Vec<VideoEncoding>,
}

pub struct MockPeerConnection {
    pub remote_id: ParticipantId,
    pub config: RtcConfiguration,
    events: PeerEvents,
    log: Mutex<PcLog>,
    closed: AtomicBool,
    fail_candidates: bool,
    fail_offers: bool,
}

impl MockPeerConnection {
    pub fn log(&self) -> PcLog {
        self.log.lock().unwrap().clone()
    }

    pub fn events(&self) -> &PeerEvents {
        &self.events
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn create_offer(&self, _options: OfferOptions) -> Result<SessionDescription, MediaError> {
        if self.fail_offers {
            return Err(MediaError::Negotiation("offer failed".to_string()));
        }
        let mut log = self.log.lock().unwrap();
        log.offers_created += 1;
        Ok(SessionDescription::offer(format!(
            "offer-{}-{}",
            self.remote_id, log.offers_created
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, MediaError> {
        let mut log = self.log.lock().unwrap();
        log.answers_created += 1;
        Ok(SessionDescription::answer(format!(
            "answer-{}-{}",
            self.remote_id, log.answers_created
        )))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaError> {
        self.log.lock().unwrap().local_descriptions.push(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MediaError> {
        self.log.lock().unwrap().remote_descriptions.push(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), MediaError> {
        if self.fail_candidates {
            return Err(MediaError::Negotiation("bad candidate".to_string()));
        }
        self.log.lock().unwrap().candidates.push(candidate);
        Ok(())
    }

    fn add_track(&self, track: TrackRef, _stream: &MediaStream) -> Result<(), MediaError> {
        let mut log = self.log.lock().unwrap();
        if track.kind() == TrackKind::Video {
            log.video_sender = Some(track.id().to_string());
        }
        log.tracks.push(track.id().to_string());
        Ok(())
    }

    async fn replace_video_track(&self, track: TrackRef) -> Result<bool, MediaError> {
        let mut log = self.log.lock().unwrap();
        match log.video_sender.as_mut() {
            Some(sender) => {
                *sender = track.id().to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_video_encoding(&self, encoding: VideoEncoding) -> Result<(), MediaError> {
        self.log.lock().unwrap().encodings.push(encoding);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockEngine {
    pub fail_candidates: AtomicBool,
    pub fail_offers: AtomicBool,
    connections: Mutex<Vec<Arc<MockPeerConnection>>>,
}

impl MockEngine {
    /// The most recent connection created for `remote_id`.
    pub fn latest(&self, remote_id: ParticipantId) -> Option<Arc<MockPeerConnection>> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|pc| pc.remote_id == remote_id)
            .cloned()
    }

    pub fn created_for(&self, remote_id: ParticipantId) -> usize {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|pc| pc.remote_id == remote_id)
            .count()
    }

    pub fn total(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

impl MediaEngine for MockEngine {
    fn create_peer_connection(
        &self,
        remote_id: ParticipantId,
        config: &RtcConfiguration,
        events: PeerEvents,
    ) -> Result<Arc<dyn PeerConnection>, MediaError> {
        let pc = Arc::new(MockPeerConnection {
            remote_id,
            config: config.clone(),
            events,
            log: Mutex::new(PcLog::default()),
            closed: AtomicBool::new(false),
            fail_candidates: self.fail_candidates.load(Ordering::SeqCst),
            fail_offers: self.fail_offers.load(Ordering::SeqCst),
        });
        self.connections.lock().unwrap().push(pc.clone());
        Ok(pc)
    }
}

// ---------------------------------------------------------------------------
// Meeting API
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockApi {
    pub participants: Vec<ParticipantSummary>,
    pub host_id: Option<ParticipantId>,
    pub history: Vec<ChatHistoryEntry>,
    pub ice: IceServersResponse,
    pub reject_join: bool,
    pub fail_history: bool,
    pub fail_end: bool,
    pub end_calls: AtomicUsize,
    pub join_calls: AtomicUsize,
}

impl MockApi {
    pub fn with_participants(ids: &[ParticipantId]) -> Self {
        Self {
            participants: ids
                .iter()
                .map(|id| ParticipantSummary {
                    id: *id,
                    name: format!("user-{id}"),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn hosted_by(mut self, host: ParticipantId) -> Self {
        self.host_id = Some(host);
        self
    }
}

#[async_trait]
impl MeetingApi for MockApi {
    async fn join_meeting(&self, _code: &str) -> Result<JoinMeetingResponse, ApiError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_join {
            return Err(ApiError::Forbidden("meeting is locked".to_string()));
        }
        Ok(JoinMeetingResponse {
            participants: self.participants.clone(),
            host_id: self.host_id,
        })
    }

    async fn chat_history(&self, code: &str) -> Result<Vec<ChatHistoryEntry>, ApiError> {
        if self.fail_history {
            return Err(ApiError::NotFound(code.to_string()));
        }
        Ok(self.history.clone())
    }

    async fn ice_servers(&self) -> Result<IceServersResponse, ApiError> {
        Ok(self.ice.clone())
    }

    async fn end_meeting(&self, _code: &str) -> Result<(), ApiError> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_end {
            return Err(ApiError::ServerError {
                status: 500,
                message: "database unavailable".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// The relay's end of a signaling connection.
pub struct Relay {
    inbound: Option<mpsc::Sender<String>>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl Relay {
    /// Deliver `message` to the client as if `from` had sent it.
    pub fn push(&self, from: ParticipantId, message: SignalMessage) {
        let envelope = SignalEnvelope::new(message).with_sender(from, format!("user-{from}"));
        self.push_raw(&envelope.encode().unwrap());
    }

    /// Deliver a server-originated message with no sender.
    pub fn announce(&self, message: SignalMessage) {
        self.push_raw(&SignalEnvelope::new(message).encode().unwrap());
    }

    pub fn push_raw(&self, frame: &str) {
        if let Some(tx) = &self.inbound {
            tx.try_send(frame.to_string()).unwrap();
        }
    }

    /// Everything the client sent since the last call.
    pub fn sent(&mut self) -> Vec<SignalMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            out.push(SignalEnvelope::decode(&frame).unwrap().message);
        }
        out
    }

    /// Drop the connection from the relay side.
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }
}

#[derive(Default)]
pub struct MockConnector {
    pub fail: bool,
    pub relay: Mutex<Option<Relay>>,
}

impl MockConnector {
    pub fn take_relay(&self) -> Relay {
        self.relay
            .lock()
            .unwrap()
            .take()
            .expect("connect was not called")
    }
}

#[async_trait]
impl SignalingConnector for MockConnector {
    async fn connect(
        &self,
        _meeting_code: &str,
    ) -> Result<(SignalingChannel, ChannelEvents), SignalingError> {
        if self.fail {
            return Err(SignalingError::Connect("relay unreachable".to_string()));
        }
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(256);
        *self.relay.lock().unwrap() = Some(Relay {
            inbound: Some(in_tx),
            outbound: out_rx,
        });
        Ok(SignalingChannel::from_pipes(out_tx, in_rx))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Mocks {
    pub api: Arc<MockApi>,
    pub devices: Arc<MockDevices>,
    pub engine: Arc<MockEngine>,
    pub connector: Arc<MockConnector>,
}

impl Mocks {
    pub fn new(api: MockApi) -> Self {
        Self {
            api: Arc::new(api),
            devices: Arc::new(MockDevices::default()),
            engine: Arc::new(MockEngine::default()),
            connector: Arc::new(MockConnector::default()),
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            api: self.api.clone(),
            devices: self.devices.clone(),
            engine: self.engine.clone(),
            connector: self.connector.clone(),
        }
    }
}

pub struct Harness {
    pub session: MeetingSession,
    pub relay: Relay,
    pub events: async_broadcast::Receiver<MeetingEvent>,
    pub api: Arc<MockApi>,
    pub devices: Arc<MockDevices>,
    pub engine: Arc<MockEngine>,
}

pub fn options(self_id: ParticipantId) -> SessionOptions {
    SessionOptions::new(
        "abc-defg-hij",
        LocalUser {
            id: self_id,
            name: format!("user-{self_id}"),
        },
    )
}

pub async fn try_join(
    self_id: ParticipantId,
    mocks: &Mocks,
) -> (
    Result<MeetingSession, SessionError>,
    async_broadcast::Receiver<MeetingEvent>,
) {
    let bus = EventBus::new(1024);
    let events = bus.subscribe();
    let result = MeetingSession::join_with_bus(options(self_id), mocks.deps(), bus).await;
    (result, events)
}

/// Join as `self_id` and process the channel opening.
pub async fn join(self_id: ParticipantId, mocks: Mocks) -> Harness {
    let (result, events) = try_join(self_id, &mocks).await;
    let mut session = result.unwrap();
    let relay = mocks.connector.take_relay();
    session.settle().await;
    Harness {
        session,
        relay,
        events,
        api: mocks.api,
        devices: mocks.devices,
        engine: mocks.engine,
    }
}

impl Harness {
    pub async fn push(&mut self, from: ParticipantId, message: SignalMessage) {
        self.relay.push(from, message);
        self.session.settle().await;
    }

    pub async fn announce(&mut self, message: SignalMessage) {
        self.relay.announce(message);
        self.session.settle().await;
    }

    pub fn drain_events(&mut self) -> Vec<MeetingEvent> {
        drain(&mut self.events)
    }
}

pub fn drain(rx: &mut async_broadcast::Receiver<MeetingEvent>) -> Vec<MeetingEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(async_broadcast::TryRecvError::Overflowed(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

pub fn candidate(n: u16) -> IceCandidateInit {
    IceCandidateInit {
        candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000{n} typ host"),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
        username_fragment: None,
    }
}
