//! Gatehouse - request gating layer
//!
//! Runs once per inbound HTTP request before routing: resolves the client
//! address behind trusted proxies, asks an auth probe who the caller is,
//! charges the request against an in-memory sliding window limiter keyed by
//! subject or address, and decides whether to continue, reject with 429 or
//! redirect.

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod ratelimit;
