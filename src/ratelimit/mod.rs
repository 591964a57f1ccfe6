//! Rate limiting logic and state management.

mod limiter;
mod memory;
mod store;
mod strategy;
mod window;

pub use limiter::{
    default_hourly_limit, default_minute_limit, Permit, RateLimiter, WaitMode, WindowUsage,
    DEFAULT_NAMESPACE, HOUR_WINDOW, MINUTE_WINDOW,
};
pub use memory::MemoryStore;
pub use store::{QuotaHit, QuotaStatus, QuotaStore, StoreError};
pub use strategy::{Strategy, SLIDING_SLOTS};
pub use window::{RateWindowSpec, TimeUnit};
