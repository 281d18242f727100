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

//! Signaling envelopes exchanged over the meeting channel.
//!
//! Every frame is a JSON object of the shape
//!
//! ```json
//! { "type": "offer", "sender": { "id": 2, "name": "Ana" }, "data": { "to": 5, "sdp": { ... } } }
//! ```
//!
//! The relay is a broadcast medium: addressed messages (`offer`, `answer`,
//! `ice-candidate`) reach every participant and the receiver filters on
//! [`SignalMessage::recipient`].
//!
//! Decoding is lenient. Payload fields are looked up in `data` first and then
//! at the top level of the frame, ids may be numbers or numeric strings, and
//! unknown fields are ignored. Anything that still does not fit is reported
//! as a [`DecodeError`] so the caller can drop the frame.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::responses::ChatTimestamp;
use crate::ParticipantId;

/// The `type` field of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    UserJoined,
    UserLeft,
    RoomState,
    ScreenShareStart,
    ScreenShareStop,
    Mute,
    Unmute,
    CameraOn,
    CameraOff,
    Media,
    Chat,
    Offer,
    Answer,
    IceCandidate,
    MeetingEnded,
}

impl EventKind {
    /// Look up a wire name such as `ice-candidate`.
    pub fn parse(value: &str) -> Option<Self> {
        serde_json::from_value(Value::String(value.to_owned())).ok()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_value(self) {
            Ok(Value::String(name)) => f.write_str(&name),
            _ => Err(std::fmt::Error),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// The participant a relayed message originates from.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Sender {
    #[serde(deserialize_with = "de_participant_id")]
    pub id: ParticipantId,
    #[serde(default)]
    pub name: String,
}

/// `{ id, name }` carried by `user-joined` / `user-left`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserRef {
    #[serde(deserialize_with = "de_participant_id")]
    pub id: ParticipantId,
    #[serde(default)]
    pub name: String,
}

/// One participant inside a `room-state` snapshot. Absent fields mean "unknown".
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoomParticipant {
    #[serde(deserialize_with = "de_participant_id")]
    pub id: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cam: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RoomState {
    #[serde(default)]
    pub participants: Vec<RoomParticipant>,
    #[serde(
        default,
        deserialize_with = "de_opt_participant_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub host_id: Option<ParticipantId>,
    #[serde(
        default,
        deserialize_with = "de_opt_participant_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub presenter_id: Option<ParticipantId>,
}

/// Mic / camera flags of a `media` event.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cam: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatPayload {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<ChatTimestamp>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Mirrors `RTCSessionDescriptionInit`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Mirrors `RTCIceCandidateInit`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Body of `offer` / `answer`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SdpPayload {
    #[serde(deserialize_with = "de_participant_id")]
    pub to: ParticipantId,
    pub sdp: SessionDescription,
}

/// Body of `ice-candidate`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CandidatePayload {
    #[serde(deserialize_with = "de_participant_id")]
    pub to: ParticipantId,
    pub candidate: IceCandidateInit,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserPayload {
    user: UserRef,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A decoded signaling message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMessage {
    UserJoined(UserRef),
    UserLeft(UserRef),
    RoomState(RoomState),
    ScreenShareStart,
    ScreenShareStop,
    Mute,
    Unmute,
    CameraOn,
    CameraOff,
    Media(MediaFlags),
    Chat(ChatPayload),
    Offer(SdpPayload),
    Answer(SdpPayload),
    IceCandidate(CandidatePayload),
    MeetingEnded,
}

impl SignalMessage {
    pub fn kind(&self) -> EventKind {
        match self {
            SignalMessage::UserJoined(_) => EventKind::UserJoined,
            SignalMessage::UserLeft(_) => EventKind::UserLeft,
            SignalMessage::RoomState(_) => EventKind::RoomState,
            SignalMessage::ScreenShareStart => EventKind::ScreenShareStart,
            SignalMessage::ScreenShareStop => EventKind::ScreenShareStop,
            SignalMessage::Mute => EventKind::Mute,
            SignalMessage::Unmute => EventKind::Unmute,
            SignalMessage::CameraOn => EventKind::CameraOn,
            SignalMessage::CameraOff => EventKind::CameraOff,
            SignalMessage::Media(_) => EventKind::Media,
            SignalMessage::Chat(_) => EventKind::Chat,
            SignalMessage::Offer(_) => EventKind::Offer,
            SignalMessage::Answer(_) => EventKind::Answer,
            SignalMessage::IceCandidate(_) => EventKind::IceCandidate,
            SignalMessage::MeetingEnded => EventKind::MeetingEnded,
        }
    }

    /// The `to` field of addressed messages.
    pub fn recipient(&self) -> Option<ParticipantId> {
        match self {
            SignalMessage::Offer(p) | SignalMessage::Answer(p) => Some(p.to),
            SignalMessage::IceCandidate(p) => Some(p.to),
            _ => None,
        }
    }

    fn data(&self) -> Result<Value, serde_json::Error> {
        Ok(match self {
            SignalMessage::UserJoined(user) | SignalMessage::UserLeft(user) => {
                json!({ "user": user })
            }
            SignalMessage::RoomState(state) => serde_json::to_value(state)?,
            SignalMessage::Media(flags) => serde_json::to_value(flags)?,
            SignalMessage::Chat(chat) => serde_json::to_value(chat)?,
            SignalMessage::Offer(p) | SignalMessage::Answer(p) => serde_json::to_value(p)?,
            SignalMessage::IceCandidate(p) => serde_json::to_value(p)?,
            SignalMessage::ScreenShareStart
            | SignalMessage::ScreenShareStop
            | SignalMessage::Mute
            | SignalMessage::Unmute
            | SignalMessage::CameraOn
            | SignalMessage::CameraOff
            | SignalMessage::MeetingEnded => json!({}),
        })
    }
}

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown message type '{0}'")]
    UnknownKind(String),

    #[error("invalid '{kind}' payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize)]
struct WireOut<'a> {
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender: Option<&'a Sender>,
    data: Value,
}

#[derive(Deserialize)]
struct WireIn {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sender: Option<Sender>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// A typed signaling envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEnvelope {
    pub sender: Option<Sender>,
    pub message: SignalMessage,
}

impl SignalEnvelope {
    /// An outbound envelope. The relay stamps the sender itself.
    pub fn new(message: SignalMessage) -> Self {
        Self {
            sender: None,
            message,
        }
    }

    pub fn with_sender(mut self, id: ParticipantId, name: impl Into<String>) -> Self {
        self.sender = Some(Sender {
            id,
            name: name.into(),
        });
        self
    }

    pub fn kind(&self) -> EventKind {
        self.message.kind()
    }

    pub fn sender_id(&self) -> Option<ParticipantId> {
        self.sender.as_ref().map(|s| s.id)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireOut {
            kind: self.kind(),
            sender: self.sender.as_ref(),
            data: self.message.data()?,
        })
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let wire: WireIn = serde_json::from_str(text)?;
        let kind =
            EventKind::parse(&wire.kind).ok_or_else(|| DecodeError::UnknownKind(wire.kind.clone()))?;

        // Top-level fields first, `data` wins on conflicts.
        let mut body = wire.rest;
        if let Some(Value::Object(data)) = wire.data {
            body.extend(data);
        }
        let body = Value::Object(body);

        let message = match kind {
            EventKind::UserJoined => {
                SignalMessage::UserJoined(parse::<UserPayload>(kind, body)?.user)
            }
            EventKind::UserLeft => {
                SignalMessage::UserLeft(parse::<UserPayload>(kind, body)?.user)
            }
            EventKind::RoomState => SignalMessage::RoomState(parse(kind, body)?),
            EventKind::ScreenShareStart => SignalMessage::ScreenShareStart,
            EventKind::ScreenShareStop => SignalMessage::ScreenShareStop,
            EventKind::Mute => SignalMessage::Mute,
            EventKind::Unmute => SignalMessage::Unmute,
            EventKind::CameraOn => SignalMessage::CameraOn,
            EventKind::CameraOff => SignalMessage::CameraOff,
            EventKind::Media => SignalMessage::Media(parse(kind, body)?),
            EventKind::Chat => SignalMessage::Chat(parse(kind, body)?),
            EventKind::Offer => SignalMessage::Offer(parse(kind, body)?),
            EventKind::Answer => SignalMessage::Answer(parse(kind, body)?),
            EventKind::IceCandidate => SignalMessage::IceCandidate(parse(kind, body)?),
            EventKind::MeetingEnded => SignalMessage::MeetingEnded,
        };

        Ok(Self {
            sender: wire.sender,
            message,
        })
    }
}

fn parse<T: serde::de::DeserializeOwned>(kind: EventKind, body: Value) -> Result<T, DecodeError> {
    serde_json::from_value(body).map_err(|source| DecodeError::Payload { kind, source })
}

// ---------------------------------------------------------------------------
// Lenient id decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u64),
    Text(String),
}

impl RawId {
    fn into_id<E: serde::de::Error>(self) -> Result<ParticipantId, E> {
        match self {
            RawId::Num(id) => Ok(id),
            RawId::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid participant id '{text}'"))),
        }
    }
}

pub(crate) fn de_participant_id<'de, D>(deserializer: D) -> Result<ParticipantId, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer)?.into_id()
}

pub(crate) fn de_opt_participant_id<'de, D>(
    deserializer: D,
) -> Result<Option<ParticipantId>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer)?
        .map(RawId::into_id::<D::Error>)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_room_state_from_data_or_top_level() {
        let nested = SignalEnvelope::decode(
            r#"{"type":"room-state","data":{"participants":[{"id":2,"name":"A"},{"id":"5","name":"B","mic":false}],"host_id":2}}"#,
        )
        .unwrap();
        let flat = SignalEnvelope::decode(
            r#"{"type":"room-state","participants":[{"id":2,"name":"A"},{"id":5,"name":"B","mic":false}],"host_id":2}"#,
        )
        .unwrap();
        assert_eq!(nested, flat);
        match nested.message {
            SignalMessage::RoomState(state) => {
                assert_eq!(state.participants.len(), 2);
                assert_eq!(state.participants[1].mic, Some(false));
                assert_eq!(state.participants[1].cam, None);
                assert_eq!(state.host_id, Some(2));
                assert_eq!(state.presenter_id, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_user_joined_with_top_level_user() {
        let env =
            SignalEnvelope::decode(r#"{"type":"user-joined","user":{"id":7,"name":"Zed"}}"#)
                .unwrap();
        assert_eq!(
            env.message,
            SignalMessage::UserJoined(UserRef {
                id: 7,
                name: "Zed".into()
            })
        );
    }

    #[test]
    fn addressed_messages_expose_recipient() {
        let env = SignalEnvelope::decode(
            r#"{"type":"ice-candidate","sender":{"id":3,"name":"A"},"data":{"to":7,"candidate":{"candidate":"candidate:1 1 udp 1 10.0.0.1 9 typ host","sdpMid":"0","sdpMLineIndex":0}}}"#,
        )
        .unwrap();
        assert_eq!(env.sender_id(), Some(3));
        assert_eq!(env.message.recipient(), Some(7));
        match env.message {
            SignalMessage::IceCandidate(p) => {
                assert_eq!(p.candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(p.candidate.sdp_m_line_index, Some(0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn encodes_offer_in_wire_shape() {
        let env = SignalEnvelope::new(SignalMessage::Offer(SdpPayload {
            to: 5,
            sdp: SessionDescription::offer("v=0"),
        }));
        let value: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "offer");
        assert_eq!(value["data"]["to"], 5);
        assert_eq!(value["data"]["sdp"]["type"], "offer");
        assert_eq!(value["data"]["sdp"]["sdp"], "v=0");
        assert!(value.get("sender").is_none());
    }

    #[test]
    fn unit_messages_carry_empty_data() {
        let text = SignalEnvelope::new(SignalMessage::CameraOff).encode().unwrap();
        assert_eq!(text, r#"{"type":"camera-off","data":{}}"#);
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(
            SignalEnvelope::decode("not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            SignalEnvelope::decode(r#"{"type":"wave"}"#),
            Err(DecodeError::UnknownKind(k)) if k == "wave"
        ));
        assert!(matches!(
            SignalEnvelope::decode(r#"{"type":"offer","data":{"to":"x","sdp":{}}}"#),
            Err(DecodeError::Payload { kind: EventKind::Offer, .. })
        ));
        assert!(matches!(
            SignalEnvelope::decode(r#"{"type":"user-left","data":{}}"#),
            Err(DecodeError::Payload { kind: EventKind::UserLeft, .. })
        ));
    }

    #[test]
    fn event_kinds_use_kebab_case_names() {
        assert_eq!(EventKind::parse("ice-candidate"), Some(EventKind::IceCandidate));
        assert_eq!(EventKind::parse("meeting-ended"), Some(EventKind::MeetingEnded));
        assert_eq!(EventKind::parse("IceCandidate"), None);
        assert_eq!(EventKind::parse("wave"), None);
        assert_eq!(EventKind::ScreenShareStart.to_string(), "screen-share-start");

        let frame = SignalEnvelope::new(SignalMessage::CameraOff).encode().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "camera-off");
    }
}
