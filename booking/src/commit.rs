//! Final booking commit: one create-booking call carrying every sub-booking

use serde::{Deserialize, Serialize};
use tripflow_api::{BookingId, BookingRecord, CreateBookingRequest, Itinerary, Room};
use tripflow_core::{SmallVec, async_effect, effect::Effect, reducer::Reducer, smallvec};

use crate::environment::BookingEnvironment;
use crate::transform::resource_bookings;
use crate::types::{ApiFailure, Tokens, new_booking_id};

/// Where the commit stands
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitStatus {
    /// Not submitted
    #[default]
    Idle,
    /// Final create-booking call in flight
    Submitting,
    /// The backend stored the final booking
    Committed(BookingRecord),
    /// The call failed; the commit can be submitted again
    Failed(ApiFailure),
}

/// State of the commit stage
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitState {
    /// Where the commit stands
    pub status: CommitStatus,
    /// Final booking id of the last submission
    pub booking_id: Option<BookingId>,
    /// Number of sub-bookings sent
    pub items: usize,
}

impl CommitState {
    /// Final booking id, once committed
    #[must_use]
    pub fn committed_booking_id(&self) -> Option<&BookingId> {
        match self.status {
            CommitStatus::Committed(_) => self.booking_id.as_ref(),
            _ => None,
        }
    }
}

/// Inputs of the commit stage
#[derive(Clone, Debug, PartialEq)]
pub enum CommitAction {
    /// Submit the final booking
    Submit {
        /// Session tokens
        tokens: Tokens,
        /// Itinerary snapshot
        itinerary: Itinerary,
        /// Rooms and travelers
        rooms: Vec<Room>,
        /// Free-text requests
        special_requirements: Option<String>,
    },
    /// The backend stored the final booking
    Committed {
        /// Final id sent with the request
        booking_id: BookingId,
        /// Backend's record
        record: BookingRecord,
    },
    /// The call failed
    Failed {
        /// Final id sent with the request
        booking_id: BookingId,
        /// What went wrong
        error: ApiFailure,
    },
}

/// Reducer of the commit stage
#[derive(Clone, Copy, Debug, Default)]
pub struct CommitReducer;

impl Reducer for CommitReducer {
    type State = CommitState;
    type Action = CommitAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut CommitState,
        action: CommitAction,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<CommitAction>; 4]> {
        match action {
            CommitAction::Submit {
                tokens,
                itinerary,
                rooms,
                special_requirements,
            } => {
                if matches!(state.status, CommitStatus::Submitting | CommitStatus::Committed(_)) {
                    tracing::debug!(status = ?state.status, "Ignoring duplicate commit");
                    return smallvec![Effect::None];
                }

                let booking_id = new_booking_id(env.ids.as_ref());
                let items = resource_bookings(&itinerary, &rooms);
                tracing::info!(
                    booking_id = %booking_id,
                    items = items.len(),
                    "Submitting final booking"
                );

                state.booking_id = Some(booking_id.clone());
                state.items = items.len();
                state.status = CommitStatus::Submitting;

                let request = CreateBookingRequest {
                    booking_id: booking_id.clone(),
                    itinerary_token: tokens.itinerary,
                    inquiry_token: tokens.inquiry,
                    rooms,
                    special_requirements,
                    items,
                };
                let api = env.api.clone();
                smallvec![async_effect! {
                    Some(match api.create_booking(request).await {
                        Ok(record) => CommitAction::Committed { booking_id, record },
                        Err(error) => CommitAction::Failed { booking_id, error: error.into() },
                    })
                }]
            },

            CommitAction::Committed { booking_id, record } => {
                if state.status != CommitStatus::Submitting || state.booking_id.as_ref() != Some(&booking_id) {
                    return smallvec![Effect::None];
                }
                metrics::counter!("booking.committed").increment(1);
                tracing::info!(booking_id = %booking_id, "Final booking committed");
                state.status = CommitStatus::Committed(record);
                smallvec![Effect::None]
            },

            CommitAction::Failed { booking_id, error } => {
                if state.status != CommitStatus::Submitting || state.booking_id.as_ref() != Some(&booking_id) {
                    return smallvec![Effect::None];
                }
                metrics::counter!("booking.commit_failed").increment(1);
                tracing::error!(booking_id = %booking_id, %error, "Final booking failed");
                state.status = CommitStatus::Failed(error);
                smallvec![Effect::None]
            },
        }
    }
}
