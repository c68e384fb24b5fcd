//! Dependencies injected into every booking reducer

use std::sync::Arc;
use tripflow_api::TravelApi;
use tripflow_core::environment::{Clock, IdGenerator, SystemClock, UuidIdGenerator};
use tripflow_runtime::RetryPolicy;

/// Environment of the booking workflow
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Travel backend
    pub api: Arc<dyn TravelApi>,
    /// Source of "today" for age derivation
    pub clock: Arc<dyn Clock>,
    /// Booking id source
    pub ids: Arc<dyn IdGenerator>,
    /// Manual retry policy for price checks and failed allocations
    pub retry: RetryPolicy,
}

impl BookingEnvironment {
    /// Production environment around the given backend
    #[must_use]
    pub fn new(api: Arc<dyn TravelApi>) -> Self {
        Self {
            api,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGenerator),
            retry: RetryPolicy::manual_only(),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the id generator
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Replace the retry policy
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl std::fmt::Debug for BookingEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingEnvironment")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
