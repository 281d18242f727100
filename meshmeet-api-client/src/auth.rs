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

//! Authentication: the profile endpoint and the local credential store.

use std::sync::{Arc, RwLock};

use log::{info, warn};
use meshmeet_types::responses::ProfileResponse;

use crate::error::ApiError;
use crate::{parse_api_response, MeetingApiClient};

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    user: Option<ProfileResponse>,
}

/// Shared, cloneable store for the access token and the cached user profile.
///
/// Clones share the same state, so a logout performed through one handle is
/// observed by every holder.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    state: Arc<RwLock<AuthState>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.set_token(token.into());
        session
    }

    pub fn token(&self) -> Option<String> {
        self.state.read().ok().and_then(|s| s.token.clone())
    }

    pub fn set_token(&self, token: String) {
        if let Ok(mut state) = self.state.write() {
            state.token = Some(token);
        }
    }

    pub fn user(&self) -> Option<ProfileResponse> {
        self.state.read().ok().and_then(|s| s.user.clone())
    }

    pub fn set_user(&self, user: ProfileResponse) {
        if let Ok(mut state) = self.state.write() {
            state.user = Some(user);
        }
    }

    /// Forget both the token and the cached profile.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = AuthState::default();
        }
    }
}

impl MeetingApiClient {
    /// Get the authenticated user's profile.
    ///
    /// Calls `GET /auth/me`.
    pub async fn get_profile(&self) -> Result<ProfileResponse, ApiError> {
        let response = self.get("/auth/me").send().await?;
        parse_api_response(response).await
    }

    /// Guard for pages that require a logged-in user.
    ///
    /// Fails fast with [`ApiError::NotAuthenticated`] when no token is stored.
    /// Otherwise fetches the profile and caches it in `session`; any failure
    /// clears the stored credentials so the caller can send the user to login.
    pub async fn verify_session(&self, session: &AuthSession) -> Result<ProfileResponse, ApiError> {
        if session.token().is_none() {
            return Err(ApiError::NotAuthenticated);
        }
        match self.get_profile().await {
            Ok(profile) => {
                info!("Authenticated as {} (id {})", profile.name, profile.id);
                session.set_user(profile.clone());
                Ok(profile)
            }
            Err(e) => {
                warn!("Session verification failed, clearing credentials: {e}");
                session.clear();
                Err(e)
            }
        }
    }
}
