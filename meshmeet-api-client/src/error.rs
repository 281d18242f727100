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

//! Error types for the meeting API client.

use thiserror::Error;

/// Errors returned by [`MeetingApiClient`](crate::MeetingApiClient) methods.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No token, or the token is expired or invalid (HTTP 401).
    #[error("Not authenticated. Please log in.")]
    NotAuthenticated,

    /// The server denied access (HTTP 403), e.g. a non-host ending the meeting.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// The meeting or resource was not found (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A server error with status code and the best message found in the body.
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// A network or transport error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A configuration error (e.g. an unparsable base URL).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether the failure means the stored credentials are no longer usable.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated)
    }
}
