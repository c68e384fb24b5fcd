//! # Tripflow Booking
//!
//! The booking workflow of a multi-city trip, as reducers over explicit state:
//!
//! 1. [`initiator`]: validate rooms and travelers, create the pending booking
//! 2. [`allocator`]: allocate the travelers to every flight and hotel, one at
//!    a time, with retry and replacement of failed items
//! 3. [`reconciler`]: recheck flight and hotel prices and build the summary the
//!    user confirms
//! 4. [`commit`] and [`confirmation`]: submit the final booking, then book every
//!    resource and report its status
//!
//! [`workflow::BookingFlowReducer`] ties the stages together and enforces the
//! gates between them. Run it in a [`tripflow_runtime::Store`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tripflow_api::HttpTravelApi;
//! use tripflow_booking::{BookingEnvironment, BookingFlowReducer, BookingFlowState, config};
//! use tripflow_runtime::Store;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = config::load()?;
//! let api = HttpTravelApi::new(config.client_settings())?;
//! let env = BookingEnvironment::new(Arc::new(api)).with_retry_policy(config.retry_policy());
//! let store = Store::new(BookingFlowState::default(), BookingFlowReducer, env);
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod commit;
pub mod config;
pub mod confirmation;
pub mod environment;
pub mod initiator;
pub mod pricing;
pub mod reconciler;
pub mod transform;
pub mod travelers;
pub mod types;
pub mod validation;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use allocator::{
    AllocationAction, AllocationKey, AllocationState, AllocationStatus, AllocationTarget,
    AllocatorReducer, FailedAllocation, FailureReason, Remediation, ReplacementOption,
    ReplacementStatus,
};
pub use commit::{CommitAction, CommitReducer, CommitState, CommitStatus};
pub use config::{AppConfig, ConfigError};
pub use confirmation::{ConfirmationAction, ConfirmationReducer, ConfirmationState, ConfirmationStatus};
pub use environment::BookingEnvironment;
pub use initiator::{InitiatorAction, InitiatorReducer, InitiatorState, InitiatorStatus};
pub use pricing::{PriceChange, PriceSummary, SegmentTotals};
pub use reconciler::{CheckStatus, PriceCheckAction, PriceCheckItem, PriceCheckReducer, PriceCheckState};
pub use types::{ApiFailure, Tokens};
pub use validation::{RequiredField, ValidationError, Violation};
pub use workflow::{BookingFlowReducer, BookingFlowState, FlowAction, FlowError, Stage};
