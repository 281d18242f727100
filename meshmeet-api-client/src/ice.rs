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

//! STUN/TURN credentials.

use meshmeet_types::responses::IceServersResponse;

use crate::error::ApiError;
use crate::{parse_api_response, MeetingApiClient};

impl MeetingApiClient {
    /// Fetch the ICE server list (with short-lived TURN credentials).
    ///
    /// Calls `GET /turn`.
    pub async fn get_ice_servers(&self) -> Result<IceServersResponse, ApiError> {
        let response = self.get("/turn").send().await?;
        parse_api_response(response).await
    }
}
