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

//! The REST calls a session needs, as a trait so the session can be driven
//! against any backend.

use async_trait::async_trait;
use meshmeet_api_client::{ApiError, MeetingApiClient};
use meshmeet_types::responses::{ChatHistoryEntry, IceServersResponse, JoinMeetingResponse};

#[async_trait]
pub trait MeetingApi: Send + Sync {
    async fn join_meeting(&self, code: &str) -> Result<JoinMeetingResponse, ApiError>;
    async fn chat_history(&self, code: &str) -> Result<Vec<ChatHistoryEntry>, ApiError>;
    async fn ice_servers(&self) -> Result<IceServersResponse, ApiError>;
    async fn end_meeting(&self, code: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl MeetingApi for MeetingApiClient {
    async fn join_meeting(&self, code: &str) -> Result<JoinMeetingResponse, ApiError> {
        MeetingApiClient::join_meeting(self, code).await
    }

    async fn chat_history(&self, code: &str) -> Result<Vec<ChatHistoryEntry>, ApiError> {
        self.get_chat_history(code).await
    }

    async fn ice_servers(&self) -> Result<IceServersResponse, ApiError> {
        self.get_ice_servers().await
    }

    async fn end_meeting(&self, code: &str) -> Result<(), ApiError> {
        MeetingApiClient::end_meeting(self, code).await
    }
}
