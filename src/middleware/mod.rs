pub mod rate_limit;

pub use rate_limit::{throttle, Limiters, RateLimiter};
