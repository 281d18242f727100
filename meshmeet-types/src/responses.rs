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

//! Response types for the meeting REST API.

use serde::{Deserialize, Serialize};

use crate::signaling::{de_participant_id, de_opt_participant_id};
use crate::ParticipantId;

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Response payload for `GET /auth/me`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProfileResponse {
    #[serde(deserialize_with = "de_participant_id")]
    pub id: ParticipantId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Meetings
// ---------------------------------------------------------------------------

/// A participant listed by the join and participants endpoints.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ParticipantSummary {
    #[serde(deserialize_with = "de_participant_id")]
    pub id: ParticipantId,
    #[serde(default)]
    pub name: String,
}

/// Response payload for `POST /meetings/{code}/join`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct JoinMeetingResponse {
    #[serde(default)]
    pub participants: Vec<ParticipantSummary>,
    #[serde(
        default,
        deserialize_with = "de_opt_participant_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub host_id: Option<ParticipantId>,
}

/// Chat timestamps arrive either as epoch milliseconds or as an ISO-8601 string.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ChatTimestamp {
    Millis(i64),
    Text(String),
}

/// Single entry of `GET /meetings/{code}/chat`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatHistoryEntry {
    #[serde(deserialize_with = "de_participant_id")]
    pub id: u64,
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<ChatTimestamp>,
}

// ---------------------------------------------------------------------------
// ICE
// ---------------------------------------------------------------------------

/// `urls` may be a single string or a list, as in `RTCIceServer`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum IceUrls {
    One(String),
    Many(Vec<String>),
}

impl IceUrls {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            IceUrls::One(url) => vec![url.clone()],
            IceUrls::Many(urls) => urls.clone(),
        }
    }
}

/// One STUN/TURN server entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: IceUrls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Response payload for `GET /turn`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct IceServersResponse {
    #[serde(rename = "iceServers", default)]
    pub ice_servers: Vec<IceServer>,
}
