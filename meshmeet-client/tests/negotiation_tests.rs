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

//! Offer/answer/candidate exchange across the mesh.

mod support;

use std::sync::atomic::Ordering;

use meshmeet_client::{ContentHint, MeetingEvent, NegotiationState, SessionPhase, VideoEncoding};
use meshmeet_types::signaling::{
    CandidatePayload, RoomParticipant, RoomState, SdpPayload, SessionDescription, UserRef,
};
use meshmeet_types::{SignalEnvelope, SignalMessage};
use support::*;

fn offer(to: u64, sdp: &str) -> SignalMessage {
    SignalMessage::Offer(SdpPayload {
        to,
        sdp: SessionDescription::offer(sdp),
    })
}

fn answer(to: u64, sdp: &str) -> SignalMessage {
    SignalMessage::Answer(SdpPayload {
        to,
        sdp: SessionDescription::answer(sdp),
    })
}

fn ice(to: u64, n: u16) -> SignalMessage {
    SignalMessage::IceCandidate(CandidatePayload {
        to,
        candidate: candidate(n),
    })
}

fn room(ids: &[u64]) -> SignalMessage {
    SignalMessage::RoomState(RoomState {
        participants: ids
            .iter()
            .map(|id| RoomParticipant {
                id: *id,
                name: None,
                mic: None,
                cam: None,
            })
            .collect(),
        host_id: None,
        presenter_id: None,
    })
}

fn user(id: u64) -> UserRef {
    UserRef {
        id,
        name: format!("user-{id}"),
    }
}

fn offers_sent(sent: &[SignalMessage]) -> Vec<u64> {
    sent.iter()
        .filter_map(|m| match m {
            SignalMessage::Offer(p) => Some(p.to),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn larger_id_waits_for_the_offer_and_answers() {
    let mut h = join(7, Mocks::new(MockApi::with_participants(&[3, 7]))).await;
    assert!(h.relay.sent().is_empty());
    assert_eq!(h.engine.total(), 0);

    h.push(3, offer(7, "offer-from-3")).await;

    assert_eq!(
        h.relay.sent(),
        vec![SignalMessage::Answer(SdpPayload {
            to: 3,
            sdp: SessionDescription::answer("answer-3-1"),
        })]
    );
    let pc = h.engine.latest(3).unwrap();
    let log = pc.log();
    assert_eq!(
        log.remote_descriptions,
        vec![SessionDescription::offer("offer-from-3")]
    );
    assert_eq!(log.offers_created, 0);
    assert_eq!(log.tracks, vec!["mic", "cam"]);
    assert_eq!(
        h.session.peers().get(3).unwrap().state,
        NegotiationState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn snapshot_dials_larger_ids_after_a_delay() {
    let mut h = join(2, Mocks::new(MockApi::with_participants(&[2]))).await;
    assert!(h.relay.sent().is_empty());

    h.session.handle_signal(SignalEnvelope::new(room(&[2, 5])));
    assert_eq!(h.engine.total(), 0);
    assert!(h.relay.sent().is_empty());

    h.session.settle().await;
    assert_eq!(offers_sent(&h.relay.sent()), vec![5]);

    // A repeated snapshot does not produce a second offer.
    h.announce(room(&[2, 5])).await;
    assert!(offers_sent(&h.relay.sent()).is_empty());
    assert_eq!(h.engine.created_for(5), 1);
}

#[tokio::test(start_paused = true)]
async fn snapshot_never_dials_smaller_ids() {
    let mut h = join(5, Mocks::new(MockApi::with_participants(&[5]))).await;

    h.announce(room(&[2, 5])).await;

    assert!(h.relay.sent().is_empty());
    assert_eq!(h.engine.total(), 0);
    assert_eq!(h.session.roster().len(), 2);
}

#[tokio::test]
async fn user_joined_dials_only_larger_ids() {
    let mut h = join(5, Mocks::new(MockApi::with_participants(&[5]))).await;

    h.announce(SignalMessage::UserJoined(user(9))).await;
    h.announce(SignalMessage::UserJoined(user(2))).await;
    assert_eq!(offers_sent(&h.relay.sent()), vec![9]);

    h.announce(SignalMessage::UserJoined(user(9))).await;
    assert!(h.relay.sent().is_empty());
    assert_eq!(h.engine.created_for(9), 1);
    assert_eq!(h.session.roster().len(), 3);
}

#[tokio::test]
async fn second_offer_while_answering_is_ignored() {
    let mut h = join(8, Mocks::new(MockApi::with_participants(&[3, 8]))).await;

    h.relay.push(3, offer(8, "first"));
    h.relay.push(3, offer(8, "second"));
    h.session.settle().await;

    let sent = h.relay.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], SignalMessage::Answer(p) if p.to == 3));
    let log = h.engine.latest(3).unwrap().log();
    assert_eq!(log.answers_created, 1);
    assert_eq!(log.remote_descriptions, vec![SessionDescription::offer("first")]);
}

#[tokio::test]
async fn answer_completes_the_offer() {
    let mut h = join(2, Mocks::new(MockApi::with_participants(&[2, 6]))).await;
    h.relay.sent();

    h.push(6, answer(2, "answer-from-6")).await;

    assert_eq!(
        h.session.peers().get(6).unwrap().state,
        NegotiationState::Connected
    );
    let log = h.engine.latest(6).unwrap().log();
    assert_eq!(
        log.remote_descriptions,
        vec![SessionDescription::answer("answer-from-6")]
    );
    assert_eq!(
        log.encodings,
        vec![VideoEncoding {
            max_bitrate_bps: 650_000,
            content_hint: ContentHint::Motion,
        }]
    );

    // A repeated answer is not applied again.
    h.push(6, answer(2, "answer-from-6")).await;
    assert_eq!(h.engine.latest(6).unwrap().log().remote_descriptions.len(), 1);
}

#[tokio::test]
async fn answers_and_candidates_without_a_session_are_dropped() {
    let mut h = join(5, Mocks::new(MockApi::with_participants(&[5]))).await;

    h.push(3, answer(5, "stray")).await;
    h.push(3, ice(5, 1)).await;

    assert_eq!(h.engine.total(), 0);
    assert_eq!(h.session.phase(), SessionPhase::Active);
}

#[tokio::test]
async fn candidates_are_applied_to_the_matching_session() {
    let mut h = join(2, Mocks::new(MockApi::with_participants(&[2, 6]))).await;

    h.push(6, ice(2, 1)).await;
    h.push(6, ice(2, 2)).await;

    let log = h.engine.latest(6).unwrap().log();
    assert_eq!(log.candidates, vec![candidate(1), candidate(2)]);
}

#[tokio::test]
async fn candidate_failures_are_swallowed() {
    let mocks = Mocks::new(MockApi::with_participants(&[2, 6]));
    mocks.engine.fail_candidates.store(true, Ordering::SeqCst);
    let mut h = join(2, mocks).await;

    h.push(6, ice(2, 1)).await;

    assert_eq!(h.session.phase(), SessionPhase::Active);
    assert_eq!(
        h.session.peers().get(6).unwrap().state,
        NegotiationState::HasLocalOffer
    );
    assert!(h.engine.latest(6).unwrap().log().candidates.is_empty());
}

#[tokio::test]
async fn messages_addressed_to_others_are_ignored() {
    let mut h = join(5, Mocks::new(MockApi::with_participants(&[3, 5]))).await;

    h.push(3, offer(9, "for-nine")).await;
    h.push(3, ice(9, 1)).await;

    assert_eq!(h.engine.total(), 0);
    assert!(h.relay.sent().is_empty());
}

#[tokio::test]
async fn local_candidates_are_forwarded_to_the_peer() {
    let mut h = join(2, Mocks::new(MockApi::with_participants(&[2, 6]))).await;
    h.relay.sent();

    h.engine.latest(6).unwrap().events().local_candidate(candidate(4));
    h.session.settle().await;

    assert_eq!(h.relay.sent(), vec![ice(6, 4)]);
}

#[tokio::test]
async fn user_left_closes_the_session() {
    let mut h = join(2, Mocks::new(MockApi::with_participants(&[2, 6]))).await;
    let first = h.engine.latest(6).unwrap();
    h.relay.sent();

    h.announce(SignalMessage::UserLeft(user(6))).await;

    assert!(first.closed());
    assert!(h.session.peers().get(6).is_none());
    assert!(h.session.roster().get(6).is_none());

    // Late traffic for the closed session is a no-op.
    h.push(6, answer(2, "late")).await;
    first.events().local_candidate(candidate(1));
    h.session.settle().await;
    assert!(first.log().remote_descriptions.is_empty());
    assert!(h.relay.sent().is_empty());

    // Leaving twice is harmless; rejoining gets a fresh session.
    h.announce(SignalMessage::UserLeft(user(6))).await;
    h.announce(SignalMessage::UserJoined(user(6))).await;
    assert_eq!(h.engine.created_for(6), 2);
    assert_eq!(offers_sent(&h.relay.sent()), vec![6]);
    assert!(!h.engine.latest(6).unwrap().closed());
}

#[tokio::test]
async fn results_for_a_closed_session_are_discarded() {
    let mut h = join(8, Mocks::new(MockApi::with_participants(&[3, 8]))).await;

    h.relay.push(3, offer(8, "offer"));
    h.relay.announce(SignalMessage::UserLeft(user(3)));
    h.session.settle().await;

    assert!(h.relay.sent().is_empty());
    assert!(h.session.peers().is_empty());
    assert!(h.engine.latest(3).unwrap().closed());
}

#[tokio::test]
async fn failed_offer_reverts_to_idle() {
    let mocks = Mocks::new(MockApi::with_participants(&[2, 6]));
    mocks.engine.fail_offers.store(true, Ordering::SeqCst);
    let mut h = join(2, mocks).await;

    assert!(h.relay.sent().is_empty());
    assert_eq!(
        h.session.peers().get(6).unwrap().state,
        NegotiationState::Idle
    );
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        MeetingEvent::PeerStateChanged {
            peer_id: 6,
            state: NegotiationState::Idle
        }
    )));

    // The session can be dialed again.
    assert!(h.session.call_peer(6));
}
