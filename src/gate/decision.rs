//! Gate outcomes.

use crate::ratelimit::RateLimitStatus;

/// Header carrying the configured capacity.
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
/// Header carrying the requests left in the window.
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Header carrying the unix time at which a slot frees up.
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// The single terminal outcome for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Hand the request to the next handler
    Allow,
    /// Answer with 429
    RejectTooManyRequests,
    /// Send an anonymous user to sign in; `location` carries the callback
    RedirectToSignIn { location: String },
    /// Send an authenticated user away from sign-in pages
    RedirectToApp { location: String },
}

/// Rate limit metadata rendered as response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: u64,
    /// Unix seconds at which the oldest counted request ages out
    pub reset_at: u64,
}

impl RateLimitInfo {
    /// Metadata for a limiter result observed at `now`.
    pub fn from_status(status: &RateLimitStatus, now: u64) -> Self {
        Self {
            limit: status.limit,
            remaining: status.remaining,
            reset_after: status.reset_after,
            reset_at: now.saturating_add(status.reset_after),
        }
    }

    /// Header name/value pairs, in a stable order.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset_at.to_string()),
        ]
    }
}

/// A decision plus whatever rate limit metadata was computed on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub rate_limit: Option<RateLimitInfo>,
}

impl Verdict {
    pub fn new(decision: Decision, rate_limit: Option<RateLimitInfo>) -> Self {
        Self {
            decision,
            rate_limit,
        }
    }
}
