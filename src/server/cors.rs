// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cross-origin response decoration.
//!
//! The graph editor is a static page served from some other local port, so
//! every API response it reads needs CORS headers. Graphkeep applies one
//! fixed policy to all decorated routes: echo the caller's origin back, and
//! always advertise the same allowed headers and methods.

use crate::config::CorsSettings;

use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
        },
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

/// Fixed CORS decoration policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorsPolicy {
    allowed_origins: HashSet<String>,
    strict: bool,
}

impl CorsPolicy {
    /// Construct new CORS policy.
    ///
    /// A non-strict policy still echoes origins outside of the allow-list,
    /// which is what a local development setup usually wants.
    pub fn new(allowed_origins: impl IntoIterator<Item = impl Into<String>>, strict: bool) -> Self {
        Self {
            allowed_origins: allowed_origins.into_iter().map(Into::into).collect(),
            strict,
        }
    }

    /// Construct CORS policy from configuration.
    pub fn from_settings(settings: &CorsSettings) -> Self {
        Self::new(settings.allowed_origins.iter().cloned(), settings.strict)
    }

    /// Origin is on the allow-list.
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.contains(origin)
    }

    /// Determine `Access-Control-Allow-Origin` value for request origin.
    ///
    /// Returns [`None`] if the header should be left off entirely.
    pub fn allow_origin(&self, origin: Option<&HeaderValue>) -> Option<HeaderValue> {
        let Some(origin) = origin.filter(|origin| !origin.is_empty()) else {
            return Some(HeaderValue::from_static("*"));
        };

        let allowed = origin
            .to_str()
            .map(|origin| self.is_allowed(origin))
            .unwrap_or(false);
        if allowed || !self.strict {
            return Some(origin.clone());
        }

        debug!("refuse to echo origin {origin:?}");
        None
    }

    /// Decorate response headers for request origin.
    pub fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        if let Some(allow_origin) = self.allow_origin(origin) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        }
        headers.insert(VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET,POST,OPTIONS"),
        );
    }
}

/// Middleware applying [`CorsPolicy`] to every response passing through.
pub async fn decorate(State(policy): State<Arc<CorsPolicy>>, request: Request, next: Next) -> Response {
    let origin = request.headers().get(ORIGIN).cloned();
    let mut response = next.run(request).await;
    policy.apply(origin.as_ref(), response.headers_mut());
    response
}
