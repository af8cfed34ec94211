//! Rate limiting and retry for every remote call.

pub mod limiter;
pub mod retry;
pub mod service;

pub use limiter::{LimiterConfig, RateLimiter};
pub use retry::RetryPolicy;
pub use service::ThrottledService;
