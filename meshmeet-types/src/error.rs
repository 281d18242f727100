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

//! API error body.
//!
//! Failed meeting API calls carry a JSON body describing the failure. The
//! backend is not consistent about the key it uses for the human-readable
//! text, so every known spelling is accepted.

use serde::{Deserialize, Serialize};

/// Structured error body of a failed meeting API response.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct APIError {
    /// Machine-readable error code (e.g. `"NOT_HOST"`), when the server sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// FastAPI-style `detail` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl APIError {
    /// Best human-readable description of the failure, if any was sent.
    pub fn description(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.detail.as_deref())
            .or(self.error.as_deref())
            .or(self.code.as_deref())
    }

    pub fn not_host() -> Self {
        Self {
            code: Some("NOT_HOST".to_string()),
            message: Some("Only the meeting host can perform this action".to_string()),
            ..Default::default()
        }
    }
}

impl std::fmt::Display for APIError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, self.description()) {
            (Some(code), Some(text)) if text != code => write!(f, "[{code}] {text}"),
            (_, Some(text)) => write!(f, "{text}"),
            (_, None) => write!(f, "unknown error"),
        }
    }
}

impl std::error::Error for APIError {}
