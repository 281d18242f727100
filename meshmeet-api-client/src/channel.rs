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

//! Signaling channel URL construction.

use url::Url;

use crate::error::ApiError;

/// Builds `ws(s)://{host}/ws/meetings/{code}?token=...` from the API base URL.
///
/// `http` maps to `ws` and `https` to `wss`; a base that already uses a
/// WebSocket scheme is kept as is.
#[derive(Debug, Clone)]
pub struct ChannelUrlBuilder {
    base: Url,
    token: Option<String>,
}

impl ChannelUrlBuilder {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| ApiError::Config(format!("invalid base url '{base_url}': {e}")))?;
        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ApiError::Config(format!(
                    "unsupported scheme '{other}' for signaling channel"
                )))
            }
        };
        base.set_scheme(scheme)
            .map_err(|_| ApiError::Config(format!("cannot use scheme '{scheme}'")))?;
        Ok(Self { base, token: None })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn build(&self, code: &str) -> Result<String, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Config(format!("'{}' cannot be a base url", self.base)))?
            .pop_if_empty()
            .extend(["ws", "meetings", code]);
        url.set_query(None);
        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url.into())
    }
}
