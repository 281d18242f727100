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

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use log::{debug, info, warn};
use meshmeet_types::ParticipantId;
use tokio::sync::mpsc;

use crate::engine::{MediaEngine, PeerConnection, PeerEvent, PeerEvents, RtcConfiguration};
use crate::media::{MediaError, MediaStream, OutgoingMedia, TrackRef};
use crate::negotiation::{NegotiationInput, NegotiationState};

#[derive(Debug)]
pub enum PeerError {
    NoSuchPeer(ParticipantId),
    Media(MediaError),
}

impl Display for PeerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerError::NoSuchPeer(id) => write!(f, "no peer session for participant {id}"),
            PeerError::Media(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PeerError {}

impl From<MediaError> for PeerError {
    fn from(e: MediaError) -> Self {
        PeerError::Media(e)
    }
}

/// Negotiation state and media for one remote participant.
pub struct PeerSession {
    pub remote_id: ParticipantId,
    pub connection: Arc<dyn PeerConnection>,
    /// Distinguishes this session from an earlier one with the same peer.
    pub generation: u64,
    pub state: NegotiationState,
    /// Remote tracks merged into a single stream.
    pub remote_stream: MediaStream,
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("remote_id", &self.remote_id)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("remote_stream", &self.remote_stream)
            .finish()
    }
}

impl PeerSession {
    /// Apply a transition. Illegal inputs leave the state untouched.
    pub fn transition(&mut self, input: NegotiationInput) -> bool {
        match self.state.on(input) {
            Ok(next) => {
                debug!(
                    "Peer {} negotiation {} -> {} ({input:?})",
                    self.remote_id, self.state, next
                );
                self.state = next;
                true
            }
            Err(e) => {
                warn!("Peer {}: {e}", self.remote_id);
                false
            }
        }
    }
}

/// At most one session per remote participant, keyed in id order.
pub struct PeerRegistry {
    sessions: BTreeMap<ParticipantId, PeerSession>,
    engine: Arc<dyn MediaEngine>,
    config: RtcConfiguration,
    events: mpsc::UnboundedSender<PeerEvent>,
    next_generation: u64,
}

impl PeerRegistry {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        config: RtcConfiguration,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            sessions: BTreeMap::new(),
            engine,
            config,
            events,
            next_generation: 1,
        }
    }

    pub fn rtc_configuration(&self) -> &RtcConfiguration {
        &self.config
    }

    pub fn get(&self, remote_id: ParticipantId) -> Option<&PeerSession> {
        self.sessions.get(&remote_id)
    }

    pub fn get_mut(&mut self, remote_id: ParticipantId) -> Option<&mut PeerSession> {
        self.sessions.get_mut(&remote_id)
    }

    pub fn contains(&self, remote_id: ParticipantId) -> bool {
        self.sessions.contains_key(&remote_id)
    }

    pub fn sorted_ids(&self) -> Vec<ParticipantId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerSession> {
        self.sessions.values()
    }

    /// Whether `generation` still names the live session for `remote_id`.
    pub fn is_current(&self, remote_id: ParticipantId, generation: u64) -> bool {
        self.sessions.get(&remote_id).is_some_and(|s| {
            s.generation == generation && !s.state.is_closed() && !s.connection.is_closed()
        })
    }

    /// Return the session for `remote_id`, creating it with `outgoing`
    /// attached if none exists.
    pub fn ensure_session(
        &mut self,
        remote_id: ParticipantId,
        outgoing: &OutgoingMedia,
    ) -> Result<&mut PeerSession, PeerError> {
        match self.sessions.entry(remote_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let generation = self.next_generation;
                self.next_generation += 1;
                let connection = self.engine.create_peer_connection(
                    remote_id,
                    &self.config,
                    PeerEvents::new(remote_id, generation, self.events.clone()),
                )?;
                if let Some(stream) = &outgoing.stream {
                    for track in &outgoing.tracks {
                        if let Err(e) = connection.add_track(track.clone(), stream) {
                            warn!("Failed to attach {} track to peer {remote_id}: {e}", track.kind());
                        }
                    }
                }
                debug!(
                    "Adding peer session {remote_id} (generation {generation}, {} local track(s))",
                    outgoing.tracks.len()
                );
                let session = entry.insert(PeerSession {
                    remote_id,
                    connection,
                    generation,
                    state: NegotiationState::Idle,
                    remote_stream: MediaStream::new(format!("remote-{remote_id}")),
                });
                Ok(session)
            }
        }
    }

    /// Merge a remote track into the peer's stream. Returns the stream when
    /// it changed.
    pub fn merge_remote_track(
        &mut self,
        remote_id: ParticipantId,
        track: TrackRef,
    ) -> Result<Option<MediaStream>, PeerError> {
        let session = self
            .sessions
            .get_mut(&remote_id)
            .ok_or(PeerError::NoSuchPeer(remote_id))?;
        if session.remote_stream.add_track(track) {
            Ok(Some(session.remote_stream.clone()))
        } else {
            Ok(None)
        }
    }

    /// Close and forget the session for `remote_id`.
    pub fn delete_session(&mut self, remote_id: ParticipantId) -> bool {
        match self.sessions.remove(&remote_id) {
            Some(mut session) => {
                session.transition(NegotiationInput::Close);
                session.connection.close();
                info!("Closed peer session {remote_id}");
                true
            }
            None => false,
        }
    }

    pub fn close_all(&mut self) -> usize {
        let ids = self.sorted_ids();
        ids.into_iter()
            .filter(|id| self.delete_session(*id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{OfferOptions, VideoEncoding};
    use crate::media::test_tracks::FakeTrack;
    use crate::media::TrackKind;
    use async_trait::async_trait;
    use meshmeet_types::signaling::{IceCandidateInit, SessionDescription};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Conn {
        tracks: AtomicUsize,
        closed: AtomicBool,
    }

    #[async_trait]
    impl PeerConnection for Conn {
        async fn create_offer(&self, _: OfferOptions) -> Result<SessionDescription, MediaError> {
            Ok(SessionDescription::offer("o"))
        }
        async fn create_answer(&self) -> Result<SessionDescription, MediaError> {
            Ok(SessionDescription::answer("a"))
        }
        async fn set_local_description(&self, _: SessionDescription) -> Result<(), MediaError> {
            Ok(())
        }
        async fn set_remote_description(&self, _: SessionDescription) -> Result<(), MediaError> {
            Ok(())
        }
        async fn add_ice_candidate(&self, _: IceCandidateInit) -> Result<(), MediaError> {
            Ok(())
        }
        fn add_track(&self, _: TrackRef, _: &MediaStream) -> Result<(), MediaError> {
            self.tracks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn replace_video_track(&self, _: TrackRef) -> Result<bool, MediaError> {
            Ok(true)
        }
        async fn set_video_encoding(&self, _: VideoEncoding) -> Result<(), MediaError> {
            Ok(())
        }
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct Engine;

    impl MediaEngine for Engine {
        fn create_peer_connection(
            &self,
            _: ParticipantId,
            _: &RtcConfiguration,
            _: PeerEvents,
        ) -> Result<Arc<dyn PeerConnection>, MediaError> {
            Ok(Arc::new(Conn::default()))
        }
    }

    fn registry() -> PeerRegistry {
        let (tx, _rx) = mpsc::unbounded_channel();
        PeerRegistry::new(Arc::new(Engine), RtcConfiguration::default(), tx)
    }

    fn outgoing() -> OutgoingMedia {
        let audio = FakeTrack::new("mic", TrackKind::Audio);
        let video = FakeTrack::new("cam", TrackKind::Video);
        let stream = MediaStream::with_tracks("local", vec![audio.clone(), video.clone()]);
        OutgoingMedia {
            stream: Some(stream),
            tracks: vec![audio, video],
        }
    }

    #[test]
    fn one_session_per_peer() {
        let mut peers = registry();
        let generation = peers.ensure_session(4, &outgoing()).unwrap().generation;
        let again = peers.ensure_session(4, &outgoing()).unwrap().generation;
        assert_eq!(generation, again);
        assert_eq!(peers.len(), 1);
        assert!(peers.is_current(4, generation));
    }

    #[test]
    fn recreated_session_gets_new_generation() {
        let mut peers = registry();
        let first = peers.ensure_session(4, &outgoing()).unwrap().generation;
        assert!(peers.delete_session(4));
        assert!(!peers.delete_session(4));
        assert!(!peers.is_current(4, first));
        let second = peers.ensure_session(4, &outgoing()).unwrap().generation;
        assert_ne!(first, second);
        assert!(peers.is_current(4, second));
    }

    #[test]
    fn remote_tracks_merge_into_one_stream() {
        let mut peers = registry();
        peers.ensure_session(9, &OutgoingMedia::default()).unwrap();
        let audio = FakeTrack::new("ra", TrackKind::Audio);
        let video = FakeTrack::new("rv", TrackKind::Video);
        let s1 = peers.merge_remote_track(9, audio.clone()).unwrap().unwrap();
        let s2 = peers.merge_remote_track(9, video).unwrap().unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s2.len(), 2);
        assert!(peers.merge_remote_track(9, audio).unwrap().is_none());
        assert!(matches!(
            peers.merge_remote_track(1, FakeTrack::new("x", TrackKind::Audio)),
            Err(PeerError::NoSuchPeer(1))
        ));
    }

    #[test]
    fn close_all_empties_registry() {
        let mut peers = registry();
        peers.ensure_session(2, &outgoing()).unwrap();
        peers.ensure_session(3, &outgoing()).unwrap();
        assert_eq!(peers.sorted_ids(), vec![2, 3]);
        assert_eq!(peers.close_all(), 2);
        assert!(peers.is_empty());
        assert_eq!(peers.close_all(), 0);
    }
}
