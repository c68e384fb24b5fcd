//! Booking initiation: validate the form, then create the pending booking

use serde::{Deserialize, Serialize};
use tripflow_api::{BookingId, BookingRecord, CreateBookingRequest, Room};
use tripflow_core::{SmallVec, async_effect, effect::Effect, reducer::Reducer, smallvec};

use crate::environment::BookingEnvironment;
use crate::travelers::refresh_rooms;
use crate::types::{ApiFailure, Tokens, new_booking_id};
use crate::validation::{ValidationError, validate_rooms};

/// Where the initiation stands
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum InitiatorStatus {
    /// Nothing submitted yet
    #[default]
    Idle,
    /// The form has missing fields; nothing was sent
    Invalid(ValidationError),
    /// Create-booking call in flight
    Submitting,
    /// The pending booking exists
    Created(BookingRecord),
    /// The backend refused the booking; the form can be submitted again
    Rejected(ApiFailure),
}

/// State of the initiation stage
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InitiatorState {
    /// Where the initiation stands
    pub status: InitiatorStatus,
    /// Provisional booking id of the last valid submission
    pub booking_id: Option<BookingId>,
    /// Session tokens
    pub tokens: Tokens,
    /// Rooms as submitted, with derived traveler fields refreshed
    pub rooms: Vec<Room>,
    /// Free-text requests
    pub special_requirements: Option<String>,
}

impl InitiatorState {
    /// Whether a create-booking call is in flight
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.status == InitiatorStatus::Submitting
    }

    /// Provisional booking id, once the backend accepted it
    #[must_use]
    pub fn created_booking_id(&self) -> Option<&BookingId> {
        match self.status {
            InitiatorStatus::Created(_) => self.booking_id.as_ref(),
            _ => None,
        }
    }
}

/// Inputs of the initiation stage
#[derive(Clone, Debug, PartialEq)]
pub enum InitiatorAction {
    /// User submits the booking form
    Submit {
        /// Session tokens
        tokens: Tokens,
        /// Rooms and travelers
        rooms: Vec<Room>,
        /// Free-text requests
        special_requirements: Option<String>,
    },
    /// The backend stored the pending booking
    BookingCreated {
        /// Provisional id sent with the request
        booking_id: BookingId,
        /// Backend's record
        record: BookingRecord,
    },
    /// The backend refused the booking or could not be reached
    BookingRejected {
        /// Provisional id sent with the request
        booking_id: BookingId,
        /// What went wrong
        error: ApiFailure,
    },
}

/// Reducer of the initiation stage
#[derive(Clone, Copy, Debug, Default)]
pub struct InitiatorReducer;

impl Reducer for InitiatorReducer {
    type State = InitiatorState;
    type Action = InitiatorAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut InitiatorState,
        action: InitiatorAction,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<InitiatorAction>; 4]> {
        match action {
            InitiatorAction::Submit {
                tokens,
                mut rooms,
                special_requirements,
            } => {
                if state.is_submitting() {
                    tracing::debug!("Ignoring submit while a booking is being created");
                    return smallvec![Effect::None];
                }

                refresh_rooms(&mut rooms, env.clock.today());
                state.tokens = tokens;
                state.special_requirements = special_requirements;

                if let Err(error) = validate_rooms(&rooms) {
                    tracing::info!(violations = error.violations.len(), "Booking form is incomplete");
                    state.rooms = rooms;
                    state.status = InitiatorStatus::Invalid(error);
                    return smallvec![Effect::None];
                }

                let booking_id = new_booking_id(env.ids.as_ref());
                tracing::info!(
                    booking_id = %booking_id,
                    itinerary = %state.tokens.itinerary,
                    rooms = rooms.len(),
                    "Creating pending booking"
                );

                let request = CreateBookingRequest {
                    booking_id: booking_id.clone(),
                    itinerary_token: state.tokens.itinerary.clone(),
                    inquiry_token: state.tokens.inquiry.clone(),
                    rooms: rooms.clone(),
                    special_requirements: state.special_requirements.clone(),
                    items: Vec::new(),
                };
                state.rooms = rooms;
                state.booking_id = Some(booking_id.clone());
                state.status = InitiatorStatus::Submitting;

                let api = env.api.clone();
                smallvec![async_effect! {
                    Some(match api.create_booking(request).await {
                        Ok(record) => InitiatorAction::BookingCreated { booking_id, record },
                        Err(error) => InitiatorAction::BookingRejected { booking_id, error: error.into() },
                    })
                }]
            },

            InitiatorAction::BookingCreated { booking_id, record } => {
                if !state.is_submitting() || state.booking_id.as_ref() != Some(&booking_id) {
                    return smallvec![Effect::None];
                }
                metrics::counter!("booking.initiated").increment(1);
                tracing::info!(booking_id = %booking_id, status = ?record.status, "Pending booking created");
                state.status = InitiatorStatus::Created(record);
                smallvec![Effect::None]
            },

            InitiatorAction::BookingRejected { booking_id, error } => {
                if !state.is_submitting() || state.booking_id.as_ref() != Some(&booking_id) {
                    return smallvec![Effect::None];
                }
                metrics::counter!("booking.initiation_failed").increment(1);
                tracing::warn!(booking_id = %booking_id, %error, "Pending booking rejected");
                state.status = InitiatorStatus::Rejected(error);
                smallvec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::environment;
    use crate::validation::fixtures::{complete_traveler, room};
    use std::sync::Arc;
    use tripflow_api::TravelerType;
    use tripflow_testing::{ReducerTest, ScriptedTravelApi, SequentialIdGenerator, assertions, date};

    fn submit(rooms: Vec<Room>) -> InitiatorAction {
        InitiatorAction::Submit {
            tokens: Tokens::new("itn-1", "inq-1"),
            rooms,
            special_requirements: Some("Window seats".into()),
        }
    }

    #[test]
    fn test_incomplete_form_makes_no_call() {
        let mut no_pan = complete_traveler("Asha");
        no_pan.pan_number.clear();

        ReducerTest::new(InitiatorReducer)
            .with_env(environment(Arc::new(ScriptedTravelApi::new())))
            .given_state(InitiatorState::default())
            .when_action(submit(vec![room(1, vec![no_pan]), room(2, vec![])]))
            .then_state(|state| {
                let InitiatorStatus::Invalid(error) = &state.status else {
                    unreachable!("expected invalid status, got {:?}", state.status);
                };
                assert_eq!(error.violations.len(), 2);
                assert!(state.booking_id.is_none());
            })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[tokio::test]
    async fn test_valid_form_creates_booking_with_derived_fields() {
        let api = Arc::new(ScriptedTravelApi::new());
        let env = environment(api.clone());
        let mut state = InitiatorState::default();

        let mut child = complete_traveler("Kiran");
        child.date_of_birth = Some(date(2018, 6, 1));
        let effects = InitiatorReducer.reduce(
            &mut state,
            submit(vec![room(1, vec![complete_traveler("Asha"), child])]),
            &env,
        );
        assert!(state.is_submitting());

        for action in assertions::resolve(effects).await {
            let _ = InitiatorReducer.reduce(&mut state, action, &env);
        }

        let expected_id = BookingId::new(SequentialIdGenerator::nth(1).to_string());
        assert_eq!(state.created_booking_id(), Some(&expected_id));

        let requests = api.created_bookings();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].booking_id, expected_id);
        assert!(requests[0].items.is_empty());
        assert_eq!(requests[0].rooms[0].travelers[1].traveler_type, TravelerType::Child);
        assert_eq!(requests[0].rooms[0].travelers[1].age, Some(6));
    }

    #[test]
    fn test_second_submit_while_in_flight_is_ignored() {
        let env = environment(Arc::new(ScriptedTravelApi::new()));
        let mut state = InitiatorState::default();

        let first = InitiatorReducer.reduce(&mut state, submit(vec![room(1, vec![complete_traveler("Asha")])]), &env);
        let first_id = state.booking_id.clone();
        let second = InitiatorReducer.reduce(&mut state, submit(vec![room(1, vec![complete_traveler("Asha")])]), &env);

        assertions::assert_has_future_effect(&first);
        assertions::assert_no_effects(&second);
        assert_eq!(state.booking_id, first_id);
    }

    #[tokio::test]
    async fn test_rejection_surfaces_message_and_allows_resubmission() {
        let api = Arc::new(ScriptedTravelApi::new().reject_bookings("Inquiry expired", Some("41")));
        let env = environment(api.clone());
        let mut state = InitiatorState::default();

        let effects =
            InitiatorReducer.reduce(&mut state, submit(vec![room(1, vec![complete_traveler("Asha")])]), &env);
        for action in assertions::resolve(effects).await {
            let _ = InitiatorReducer.reduce(&mut state, action, &env);
        }

        assert_eq!(
            state.status,
            InitiatorStatus::Rejected(ApiFailure::message("Inquiry expired").with_code("41"))
        );

        let retry =
            InitiatorReducer.reduce(&mut state, submit(vec![room(1, vec![complete_traveler("Asha")])]), &env);
        assertions::assert_has_future_effect(&retry);
        assert!(state.is_submitting());
    }
}
