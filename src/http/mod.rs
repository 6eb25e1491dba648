//! HTTP surface: the gate as axum middleware and the server hosting it.

mod middleware;
mod server;

pub use middleware::{apply_rate_limit_headers, gate_middleware, TOO_MANY_REQUESTS_BODY};
pub use server::{gated, HttpServer};
