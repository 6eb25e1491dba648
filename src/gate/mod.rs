//! Per-request gating: client address, identity, rate limit and redirects.

pub mod auth;
pub mod client_ip;
mod decision;
mod evaluator;
pub mod routes;

pub use auth::{AuthError, AuthProbe, BearerTokenProbe, Identity, NoAuthProbe};
pub use client_ip::{ClientIpResolver, TrustedProxies, UNKNOWN_CLIENT};
pub use decision::{Decision, RateLimitInfo, Verdict};
pub use evaluator::{GateRequest, RequestGate};
pub use routes::{RouteClass, RouteConfig, RouteTable};
