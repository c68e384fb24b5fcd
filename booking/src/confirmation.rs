//! Confirmation loop: book every resource of the committed booking
//!
//! The itinerary is fetched again, then each flight, hotel, activity and
//! transfer is booked in travel order. Every outcome is reported back to the
//! itinerary through a booking-status update.

use serde::{Deserialize, Serialize};
use tripflow_api::{
    BookingId, BookingStatus, BookingStatusUpdate, Itinerary, ResourceBooking, Room,
};
use tripflow_core::{
    SmallVec, async_effect, dispatch,
    effect::Effect,
    progress::{ProgressEvent, SequentialQueue},
    reducer::Reducer,
    smallvec,
};

use crate::environment::BookingEnvironment;
use crate::transform::resource_bookings;
use crate::types::{ApiFailure, Tokens};

/// One resource of the confirmation loop
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationItem {
    /// Payload sent to the booking endpoint
    pub booking: ResourceBooking,
    /// Current booking status
    pub status: BookingStatus,
    /// Booking error, if the call failed
    pub error: Option<ApiFailure>,
}

/// Where the confirmation loop stands
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    /// Not started
    #[default]
    Idle,
    /// Fetching the itinerary
    LoadingItinerary,
    /// Booking resources
    Booking,
    /// Every resource has a final status
    Done,
    /// The itinerary could not be fetched
    Failed(ApiFailure),
}

/// State of the confirmation loop
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfirmationState {
    /// Where the loop stands
    pub status: ConfirmationStatus,
    /// Final booking id
    pub booking_id: Option<BookingId>,
    /// Session tokens
    pub tokens: Tokens,
    /// Rooms and travelers
    pub rooms: Vec<Room>,
    /// Itinerary as fetched for the loop
    pub itinerary: Option<Itinerary>,
    /// Resources not yet booked
    pub queue: SequentialQueue<usize>,
    /// Every resource with its status, in travel order
    pub items: Vec<ConfirmationItem>,
}

impl ConfirmationState {
    /// Number of resources with the given status
    #[must_use]
    pub fn count(&self, status: BookingStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

/// Inputs of the confirmation loop
#[derive(Clone, Debug, PartialEq)]
pub enum ConfirmationAction {
    /// Book every resource of the committed booking
    Start {
        /// Final booking id
        booking_id: BookingId,
        /// Session tokens
        tokens: Tokens,
        /// Rooms and travelers
        rooms: Vec<Room>,
    },
    /// Itinerary fetched
    ItineraryLoaded(Itinerary),
    /// Itinerary fetch failed
    ItineraryLoadFailed(ApiFailure),
    /// Take the next resource off the queue
    BookNext,
    /// A resource is about to be booked
    ItemStarted(ProgressEvent<ResourceBooking>),
    /// A resource booking call returned
    ItemFinished {
        /// The resource and its position
        progress: ProgressEvent<ResourceBooking>,
        /// Booking error, if the call failed
        error: Option<ApiFailure>,
    },
    /// Every resource has a final status
    Finished {
        /// Confirmed resources
        confirmed: usize,
        /// Failed resources
        failed: usize,
    },
}

/// Reducer of the confirmation loop
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfirmationReducer;

impl ConfirmationReducer {
    fn book(
        state: &ConfirmationState,
        env: &BookingEnvironment,
        progress: ProgressEvent<ResourceBooking>,
    ) -> Effect<ConfirmationAction> {
        let api = env.api.clone();
        let booking_id = state.booking_id.clone().unwrap_or_default();
        let token = state.tokens.itinerary.clone();

        async_effect! {
            let booking = progress.item.clone();
            let result = api.book_resource(booking_id.clone(), booking.clone()).await;
            let error = result.err().map(ApiFailure::from);

            let update = BookingStatusUpdate {
                booking_id,
                city_name: booking.city_name().to_string(),
                date: booking.date(),
                booking_type: booking.kind(),
                booking_status: if error.is_some() { BookingStatus::Failed } else { BookingStatus::Confirmed },
                reference: booking.reference().to_string(),
            };
            if let Err(status_error) = api.update_booking_status(token, update).await {
                tracing::warn!(
                    reference = booking.reference(),
                    error = %status_error,
                    "Booking status update failed"
                );
            }

            Some(ConfirmationAction::ItemFinished { progress, error })
        }
    }
}

impl Reducer for ConfirmationReducer {
    type State = ConfirmationState;
    type Action = ConfirmationAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut ConfirmationState,
        action: ConfirmationAction,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<ConfirmationAction>; 4]> {
        match action {
            ConfirmationAction::Start {
                booking_id,
                tokens,
                rooms,
            } => {
                if matches!(state.status, ConfirmationStatus::LoadingItinerary | ConfirmationStatus::Booking) {
                    tracing::debug!("Ignoring confirmation start while running");
                    return smallvec![Effect::None];
                }

                tracing::info!(booking_id = %booking_id, "Starting resource confirmation");
                *state = ConfirmationState {
                    status: ConfirmationStatus::LoadingItinerary,
                    booking_id: Some(booking_id),
                    tokens,
                    rooms,
                    ..ConfirmationState::default()
                };

                let api = env.api.clone();
                let token = state.tokens.itinerary.clone();
                smallvec![async_effect! {
                    Some(match api.get_itinerary(token).await {
                        Ok(itinerary) => ConfirmationAction::ItineraryLoaded(itinerary),
                        Err(error) => ConfirmationAction::ItineraryLoadFailed(error.into()),
                    })
                }]
            },

            ConfirmationAction::ItineraryLoaded(itinerary) => {
                if state.status != ConfirmationStatus::LoadingItinerary {
                    return smallvec![Effect::None];
                }

                state.items = resource_bookings(&itinerary, &state.rooms)
                    .into_iter()
                    .map(|booking| ConfirmationItem {
                        booking,
                        status: BookingStatus::Pending,
                        error: None,
                    })
                    .collect();
                state.queue = SequentialQueue::new(0..state.items.len());
                state.itinerary = Some(itinerary);
                state.status = ConfirmationStatus::Booking;
                smallvec![dispatch!(ConfirmationAction::BookNext)]
            },

            ConfirmationAction::ItineraryLoadFailed(error) => {
                tracing::error!(%error, "Could not load itinerary for confirmation");
                state.status = ConfirmationStatus::Failed(error);
                smallvec![Effect::None]
            },

            ConfirmationAction::BookNext => {
                if state.status != ConfirmationStatus::Booking {
                    return smallvec![Effect::None];
                }
                if let Some(progress) = state.queue.advance() {
                    let Some(item) = state.items.get(progress.item) else {
                        return smallvec![Effect::None];
                    };
                    let booking = item.booking.clone();
                    return smallvec![dispatch!(ConfirmationAction::ItemStarted(progress.map(|_| booking)))];
                }
                if state.queue.in_flight() {
                    return smallvec![Effect::None];
                }

                state.status = ConfirmationStatus::Done;
                let confirmed = state.count(BookingStatus::Confirmed);
                let failed = state.count(BookingStatus::Failed);
                tracing::info!(confirmed, failed, "Resource confirmation finished");
                smallvec![dispatch!(ConfirmationAction::Finished { confirmed, failed })]
            },

            ConfirmationAction::ItemStarted(progress) => {
                tracing::info!(
                    kind = %progress.item.kind(),
                    reference = progress.item.reference(),
                    current = progress.current,
                    total = progress.total,
                    "Booking resource"
                );
                if let Some(item) = state.items.get_mut(progress.current - 1) {
                    item.status = BookingStatus::Loading;
                }
                smallvec![Self::book(state, env, progress)]
            },

            ConfirmationAction::ItemFinished { progress, error } => {
                if !state.queue.complete_current() {
                    return smallvec![Effect::None];
                }
                if let Some(item) = state.items.get_mut(progress.current - 1) {
                    item.status = if error.is_some() {
                        BookingStatus::Failed
                    } else {
                        BookingStatus::Confirmed
                    };
                    if let Some(error) = &error {
                        tracing::warn!(reference = item.booking.reference(), %error, "Resource booking failed");
                        metrics::counter!("booking.resource_failed").increment(1);
                    } else {
                        metrics::counter!("booking.resource_confirmed").increment(1);
                    }
                    item.error = error;
                }
                smallvec![dispatch!(ConfirmationAction::BookNext)]
            },

            ConfirmationAction::Finished { .. } => smallvec![Effect::None],
        }
    }
}
