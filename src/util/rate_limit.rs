//! Rate limiting for the public bot endpoints

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Bot join requests per second, across all callers
pub const JOIN_RATE_LIMIT: u32 = 5;

/// Controller address updates per second (password checks)
pub const SET_URL_RATE_LIMIT: u32 = 10;

/// Limiters guarding the unauthenticated bot endpoints
#[derive(Clone)]
pub struct BotEndpointLimiter {
    join_limiter: Arc<Limiter>,
    set_url_limiter: Arc<Limiter>,
}

impl BotEndpointLimiter {
    pub fn new() -> Self {
        Self {
            join_limiter: create_limiter(JOIN_RATE_LIMIT),
            set_url_limiter: create_limiter(SET_URL_RATE_LIMIT),
        }
    }

    /// Check if a join request is allowed (returns true if allowed)
    pub fn check_join(&self) -> bool {
        self.join_limiter.check().is_ok()
    }

    /// Check if a set-url request is allowed (returns true if allowed)
    pub fn check_set_url(&self) -> bool {
        self.set_url_limiter.check().is_ok()
    }
}

impl Default for BotEndpointLimiter {
    fn default() -> Self {
        Self::new()
    }
}
