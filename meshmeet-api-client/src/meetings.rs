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

//! Meeting membership endpoints: join, participants, chat history, end.

use meshmeet_types::responses::{ChatHistoryEntry, JoinMeetingResponse};

use crate::error::ApiError;
use crate::{parse_api_response, parse_status_only, MeetingApiClient};

impl MeetingApiClient {
    /// Join a meeting by code.
    ///
    /// Calls `POST /meetings/{code}/join`. A rejection (unknown code, ended
    /// meeting, not allowed) comes back as an error and the caller must not
    /// proceed to media capture.
    pub async fn join_meeting(&self, code: &str) -> Result<JoinMeetingResponse, ApiError> {
        let path = format!("/meetings/{code}/join");
        let response = self.post(&path).send().await?;
        parse_api_response(response).await
    }

    /// Fetch the persisted chat history of a meeting.
    ///
    /// Calls `GET /meetings/{code}/chat`.
    pub async fn get_chat_history(&self, code: &str) -> Result<Vec<ChatHistoryEntry>, ApiError> {
        let path = format!("/meetings/{code}/chat");
        let response = self.get(&path).send().await?;
        parse_api_response(response).await
    }

    /// End a meeting for every participant. Host only.
    ///
    /// Calls `POST /meetings/{code}/end`. The relay then broadcasts
    /// `meeting-ended` to everyone still connected.
    pub async fn end_meeting(&self, code: &str) -> Result<(), ApiError> {
        let path = format!("/meetings/{code}/end");
        let response = self.post(&path).send().await?;
        parse_status_only(response).await
    }
}
