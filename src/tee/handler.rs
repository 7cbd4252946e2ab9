//! Per-request tee orchestration.
//!
//! ```text
//! Received → Duplicated → PrimaryDispatched → Responded
//!                                   └──→ ShadowDispatched (detached)
//!                                              → CacheUpdated | Discarded
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response};

use crate::config::TeeConfig;
use crate::http::request::{duplicate, DuplicatedRequest};
use crate::net::dispatch::{dispatch, Target};
use crate::observability::metrics;
use crate::session::cookie::{find_request_cookie, find_response_cookie, replace_request_cookie, shadow_cookie};
use crate::session::SessionCache;
use crate::tee::shadow::{self, ShadowContext};
use crate::tee::TeeError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Duplicates each inbound request to a primary and a shadow backend.
///
/// Cloning is cheap; all clones share one session cache.
#[derive(Debug, Clone)]
pub struct TeeHandler {
    primary: Target,
    shadow: ShadowContext,
    max_body_bytes: usize,
}

impl TeeHandler {
    pub fn new(config: &TeeConfig, sessions: SessionCache) -> Self {
        Self {
            primary: Target::from(&config.primary),
            shadow: ShadowContext {
                target: Target::from(&config.shadow),
                sessions,
                cookie_name: config.session.cookie_name.clone(),
                debug: config.observability.debug,
                in_flight: Arc::new(AtomicUsize::new(0)),
            },
            max_body_bytes: config.listener.max_body_bytes,
        }
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.shadow.sessions
    }

    /// Shadow dispatches started but not yet finished.
    pub fn shadow_in_flight(&self) -> usize {
        self.shadow.in_flight.load(Ordering::SeqCst)
    }

    /// Serve one inbound request.
    ///
    /// Returns the primary backend's response. Any error means the client
    /// gets no response at all and no shadow dispatch happens.
    pub async fn handle<B>(&self, request: Request<B>) -> Result<Response<Full<Bytes>>, TeeError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let start = Instant::now();

        let (primary_request, mut shadow_request) = duplicate(request, self.max_body_bytes)
            .await
            .map_err(|e| {
                metrics::record_primary_failure("duplication");
                tracing::warn!(error = %e, "Request duplication failed");
                TeeError::Duplication(e)
            })?;

        self.apply_session_affinity(&primary_request, &mut shadow_request);

        let method = primary_request.method.clone();
        let uri = primary_request.uri.clone();

        let response = dispatch(&self.primary, primary_request).await.map_err(|e| {
            metrics::record_primary_failure(e.kind());
            tracing::warn!(method = %method, uri = %uri, error = %e, "Primary dispatch failed");
            TeeError::Primary(e)
        })?;

        let reference_token = find_response_cookie(&response.headers, &self.shadow.cookie_name)
            .map(|cookie| cookie.value().to_owned());

        shadow::spawn(self.shadow.clone(), shadow_request, reference_token);

        metrics::record_request(response.status.as_u16(), start);
        tracing::debug!(
            method = %method,
            uri = %uri,
            status = response.status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Primary response relayed"
        );
        Ok(response.into_client_response())
    }

    /// Point the shadow copy at the shadow session correlated with the
    /// client's primary session, if one is known. The primary copy is only read.
    fn apply_session_affinity(&self, primary: &DuplicatedRequest, shadow: &mut DuplicatedRequest) {
        let Some(cookie) = find_request_cookie(&primary.headers, &self.shadow.cookie_name) else {
            return;
        };

        match self.shadow.sessions.get(cookie.value()) {
            Some(shadow_token) => {
                metrics::record_session_lookup(true);
                tracing::debug!(primary = %cookie.value(), shadow = %shadow_token, "Session lookup hit");
                let replacement = shadow_cookie(&cookie, &shadow_token);
                if !replace_request_cookie(&mut shadow.headers, &replacement) {
                    tracing::debug!(shadow = %shadow_token, "Shadow session token is not a valid header value");
                }
            }
            None => {
                metrics::record_session_lookup(false);
                tracing::debug!(primary = %cookie.value(), "Session lookup miss");
            }
        }
    }
}
