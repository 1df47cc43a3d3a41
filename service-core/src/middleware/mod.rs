pub mod metrics;
pub mod rate_limit;
pub mod tracing;

pub use self::rate_limit::{SharedRateLimiter, WindowRateLimiter, window_rate_limit_middleware};
pub use self::tracing::{REQUEST_ID_HEADER, request_id_middleware};
