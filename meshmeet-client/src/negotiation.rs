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

//! Offer/answer negotiation for one peer session.
//!
//! Every pair of participants negotiates exactly once: the participant with
//! the smaller id sends the offer ([`should_initiate`]). The per-session
//! state machine below rejects anything that would break that, such as a
//! second offer while one is in flight or an answer nobody asked for.
//!
//! The asynchronous steps themselves run as owned futures built by the
//! `*_task` functions. Each future resolves to a [`NegotiationOutcome`]
//! tagged with the session generation it was started for, so a result that
//! lands after its session was closed can be recognized and dropped.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use meshmeet_types::signaling::{IceCandidateInit, SessionDescription};
use meshmeet_types::ParticipantId;
use thiserror::Error;

use crate::engine::{OfferOptions, PeerConnection, VideoEncoding};
use crate::media::{MediaError, TrackRef};

/// The lower id offers, the higher id answers.
pub fn should_initiate(local: ParticipantId, remote: ParticipantId) -> bool {
    local < remote
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Session exists, nothing exchanged yet.
    Idle,
    /// Creating the local offer.
    Offering,
    /// Offer sent, waiting for the answer.
    HasLocalOffer,
    /// Remote offer received, creating the answer.
    Answering,
    /// Descriptions exchanged on both sides.
    Connected,
    /// Torn down. Terminal.
    Closed,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::Idle => "idle",
            NegotiationState::Offering => "offering",
            NegotiationState::HasLocalOffer => "have-local-offer",
            NegotiationState::Answering => "answering",
            NegotiationState::Connected => "connected",
            NegotiationState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationInput {
    StartOffer,
    LocalOfferSet,
    RemoteOffer,
    LocalAnswerSent,
    RemoteAnswer,
    /// An asynchronous step failed.
    Fail,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal negotiation transition: {input:?} in state {from}")]
pub struct IllegalTransition {
    pub from: NegotiationState,
    pub input: NegotiationInput,
}

impl NegotiationState {
    pub fn on(self, input: NegotiationInput) -> Result<NegotiationState, IllegalTransition> {
        use NegotiationInput as I;
        use NegotiationState as S;
        let next = match (self, input) {
            (_, I::Close) => S::Closed,
            (S::Idle, I::StartOffer) => S::Offering,
            (S::Offering, I::LocalOfferSet) => S::HasLocalOffer,
            (S::HasLocalOffer, I::RemoteAnswer) => S::Connected,
            (S::Idle | S::Connected, I::RemoteOffer) => S::Answering,
            (S::Answering, I::LocalAnswerSent) => S::Connected,
            (S::Offering | S::HasLocalOffer | S::Answering | S::Connected, I::Fail) => S::Idle,
            (from, input) => return Err(IllegalTransition { from, input }),
        };
        Ok(next)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, NegotiationState::Closed)
    }

    /// An offer or answer is being produced or awaited.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            NegotiationState::Offering | NegotiationState::HasLocalOffer | NegotiationState::Answering
        )
    }
}

/// What a finished negotiation step produced.
#[derive(Debug, Clone)]
pub enum NegotiationStep {
    /// Local offer created and applied; ready to be sent.
    OfferReady(SessionDescription),
    /// Remote offer applied and local answer created; ready to be sent.
    AnswerReady(SessionDescription),
    RemoteAnswerApplied,
    CandidateApplied,
    EncodingApplied,
    VideoTrackReplaced,
}

/// Which asynchronous step a task ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Offer,
    Answer,
    ApplyAnswer,
    Candidate,
    Encoding,
    ReplaceTrack,
}

impl TaskKind {
    /// Failure of this step leaves the session without a usable description.
    pub fn is_negotiation(&self) -> bool {
        matches!(self, TaskKind::Offer | TaskKind::Answer | TaskKind::ApplyAnswer)
    }
}

#[derive(Debug)]
pub struct NegotiationOutcome {
    pub remote_id: ParticipantId,
    pub generation: u64,
    pub kind: TaskKind,
    pub result: Result<NegotiationStep, MediaError>,
}

pub type NegotiationTask = BoxFuture<'static, NegotiationOutcome>;

fn ensure_open(pc: &dyn PeerConnection) -> Result<(), MediaError> {
    if pc.is_closed() {
        Err(MediaError::Closed)
    } else {
        Ok(())
    }
}

fn task<F>(remote_id: ParticipantId, generation: u64, kind: TaskKind, step: F) -> NegotiationTask
where
    F: std::future::Future<Output = Result<NegotiationStep, MediaError>> + Send + 'static,
{
    async move {
        NegotiationOutcome {
            remote_id,
            generation,
            kind,
            result: step.await,
        }
    }
    .boxed()
}

/// Create the local offer and apply it as the local description.
pub fn offer_task(
    pc: Arc<dyn PeerConnection>,
    remote_id: ParticipantId,
    generation: u64,
) -> NegotiationTask {
    task(remote_id, generation, TaskKind::Offer, async move {
        let offer = pc.create_offer(OfferOptions::default()).await?;
        ensure_open(pc.as_ref())?;
        pc.set_local_description(offer.clone()).await?;
        Ok(NegotiationStep::OfferReady(offer))
    })
}

/// Apply a remote offer, then create and apply the answer.
pub fn answer_task(
    pc: Arc<dyn PeerConnection>,
    remote_id: ParticipantId,
    generation: u64,
    offer: SessionDescription,
) -> NegotiationTask {
    task(remote_id, generation, TaskKind::Answer, async move {
        pc.set_remote_description(offer).await?;
        ensure_open(pc.as_ref())?;
        let answer = pc.create_answer().await?;
        ensure_open(pc.as_ref())?;
        pc.set_local_description(answer.clone()).await?;
        Ok(NegotiationStep::AnswerReady(answer))
    })
}

pub fn apply_answer_task(
    pc: Arc<dyn PeerConnection>,
    remote_id: ParticipantId,
    generation: u64,
    answer: SessionDescription,
) -> NegotiationTask {
    task(remote_id, generation, TaskKind::ApplyAnswer, async move {
        pc.set_remote_description(answer).await?;
        Ok(NegotiationStep::RemoteAnswerApplied)
    })
}

pub fn candidate_task(
    pc: Arc<dyn PeerConnection>,
    remote_id: ParticipantId,
    generation: u64,
    candidate: IceCandidateInit,
) -> NegotiationTask {
    task(remote_id, generation, TaskKind::Candidate, async move {
        ensure_open(pc.as_ref())?;
        pc.add_ice_candidate(candidate).await?;
        Ok(NegotiationStep::CandidateApplied)
    })
}

pub fn encoding_task(
    pc: Arc<dyn PeerConnection>,
    remote_id: ParticipantId,
    generation: u64,
    encoding: VideoEncoding,
) -> NegotiationTask {
    task(remote_id, generation, TaskKind::Encoding, async move {
        ensure_open(pc.as_ref())?;
        pc.set_video_encoding(encoding).await?;
        Ok(NegotiationStep::EncodingApplied)
    })
}

pub fn replace_video_task(
    pc: Arc<dyn PeerConnection>,
    remote_id: ParticipantId,
    generation: u64,
    track: TrackRef,
) -> NegotiationTask {
    task(remote_id, generation, TaskKind::ReplaceTrack, async move {
        ensure_open(pc.as_ref())?;
        if !pc.replace_video_track(track).await? {
            return Err(MediaError::Other("no outgoing video sender".to_string()));
        }
        Ok(NegotiationStep::VideoTrackReplaced)
    })
}
