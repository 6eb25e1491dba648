//! Per-request gate.
//!
//! Precedence is fixed: rate limiting first (and it short-circuits), then the
//! protected-route check, then the auth-route check. Whatever the outcome,
//! the limiter metadata computed in the first step travels with it.

use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use tracing::{debug, instrument, trace};

use super::auth::{AuthProbe, Identity};
use super::client_ip::ClientIpResolver;
use super::decision::{Decision, RateLimitInfo, Verdict};
use super::routes::RouteTable;
use crate::clock::Clock;
use crate::ratelimit::{RateLimitKey, SlidingWindowStore};

/// The parts of an inbound request the gate looks at.
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
}

/// Turns one request into one [`Verdict`].
pub struct RequestGate {
    store: Arc<SlidingWindowStore>,
    auth: Arc<dyn AuthProbe>,
    resolver: ClientIpResolver,
    routes: RouteTable,
    clock: Arc<dyn Clock>,
}

impl RequestGate {
    pub fn new(
        store: Arc<SlidingWindowStore>,
        auth: Arc<dyn AuthProbe>,
        resolver: ClientIpResolver,
        routes: RouteTable,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            auth,
            resolver,
            routes,
            clock,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn store(&self) -> &Arc<SlidingWindowStore> {
        &self.store
    }

    /// Decide what happens to a request.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn evaluate(&self, request: &GateRequest<'_>) -> Verdict {
        let class = self.routes.classify(request.method, request.path);
        let identity = self.identify(request.headers).await;
        let client_ip = self.resolver.resolve_headers(request.headers);

        let mut rate_limit = None;
        if class.api_or_mutating {
            let key = RateLimitKey::for_request(
                identity.as_ref().map(Identity::subject),
                &client_ip,
                request.path,
            );
            let now = self.clock.now_secs();
            let status = self.store.check_and_update(&key, now);
            let info = RateLimitInfo::from_status(&status, now);

            if !status.allowed {
                debug!(key = %key, reset_after = status.reset_after, "Rejecting request");
                return Verdict::new(Decision::RejectTooManyRequests, Some(info));
            }
            rate_limit = Some(info);
        }

        let decision = if class.protected && identity.is_none() {
            Decision::RedirectToSignIn {
                location: format!(
                    "{}?callbackUrl={}",
                    self.routes.sign_in_path(),
                    urlencoding::encode(request.path)
                ),
            }
        } else if class.auth_only && identity.is_some() {
            Decision::RedirectToApp {
                location: self.routes.landing_path().to_string(),
            }
        } else {
            Decision::Allow
        };

        trace!(
            client_ip = %client_ip,
            authenticated = identity.is_some(),
            decision = ?decision,
            "Gate decision made"
        );

        Verdict::new(decision, rate_limit)
    }

    /// Run the auth probe, folding failures into "anonymous".
    async fn identify(&self, headers: &HeaderMap) -> Option<Identity> {
        match self.auth.probe(headers).await {
            Ok(identity) => identity,
            Err(e) => {
                debug!(error = %e, "Auth probe failed; treating request as anonymous");
                None
            }
        }
    }
}
