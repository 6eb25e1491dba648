//! Rate limiting logic and state management.

mod cleanup;
mod key;
mod window;

pub use cleanup::CleanupScheduler;
pub use key::{KeyScope, RateLimitKey};
pub use window::{LimiterConfig, RateLimitStatus, SlidingWindowStore, TimestampWindow};
