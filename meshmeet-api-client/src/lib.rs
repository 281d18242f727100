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

//! REST client for the meshmeet meeting API.
//!
//! # Example
//!
//! ```no_run
//! use meshmeet_api_client::{AuthMode, MeetingApiClient};
//!
//! # async fn example() -> Result<(), meshmeet_api_client::ApiError> {
//! let client = MeetingApiClient::new(
//!     "http://localhost:8000",
//!     AuthMode::Bearer("eyJ...".to_string()),
//! );
//!
//! let joined = client.join_meeting("abc-defg-hij").await?;
//! println!("{} participants, host {:?}", joined.participants.len(), joined.host_id);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod channel;
pub mod error;
pub mod ice;
pub mod meetings;

pub use auth::AuthSession;
pub use channel::ChannelUrlBuilder;
pub use error::ApiError;
pub use meshmeet_types;

use meshmeet_types::APIError;
use reqwest::Client;

/// How the client authenticates with the meeting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// No credentials attached. Only useful for public endpoints.
    Anonymous,
    /// Attach `Authorization: Bearer <token>` to every request.
    Bearer(String),
}

/// A typed REST client for the meeting API.
///
/// All methods return strongly-typed responses from
/// [`meshmeet_types::responses`] and map HTTP errors to [`ApiError`].
#[derive(Debug, Clone)]
pub struct MeetingApiClient {
    base_url: String,
    auth: AuthMode,
    http: Client,
}

impl MeetingApiClient {
    /// Create a new client pointing at the given API base URL,
    /// e.g. `"http://localhost:8000"`.
    pub fn new(base_url: &str, auth: AuthMode) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http: Client::new(),
        }
    }

    /// Build a client authenticated with the token held by `session`.
    pub fn from_session(base_url: &str, session: &AuthSession) -> Self {
        let auth = match session.token() {
            Some(token) => AuthMode::Bearer(token),
            None => AuthMode::Anonymous,
        };
        Self::new(base_url, auth)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.apply_auth(self.http.get(self.url(path)))
    }

    pub(crate) fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.apply_auth(self.http.post(self.url(path)))
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            AuthMode::Anonymous => builder,
            AuthMode::Bearer(token) => {
                builder.header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"))
            }
        }
    }
}

/// Parse a JSON body into `T` on success, or map the status to [`ApiError`].
pub(crate) async fn parse_api_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response.json().await?);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

/// Parse a response where only the status code matters.
pub(crate) async fn parse_status_only(response: reqwest::Response) -> Result<(), ApiError> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

pub(crate) fn status_error(status: u16, body: &str) -> ApiError {
    let message = error_message(body);
    match status {
        401 => ApiError::NotAuthenticated,
        403 => ApiError::Forbidden(message),
        404 => ApiError::NotFound(message),
        _ => ApiError::ServerError { status, message },
    }
}

/// Pull the human-readable text out of an error body, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<APIError>(body)
        .ok()
        .and_then(|err| err.description().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
