//! The booking flow: one slice per stage and the gates between them
//!
//! [`BookingFlowReducer`] routes slice actions to the slice reducers, lifts
//! their effects back into [`FlowAction`] and moves the flow forward:
//!
//! ```text
//! Start → initiator ─created→ allocation ─clean→ ProceedToPriceCheck → prices
//!       ─confirmed→ ProceedToCommit → commit ─committed→ confirmation
//! ```
//!
//! A request that a gate refuses is recorded as a [`FlowError`] in state.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tripflow_api::{Itinerary, Room};
use tripflow_core::{SmallVec, async_effect, effect::Effect, reducer::Reducer, smallvec};

use crate::allocator::{AllocationAction, AllocationState, AllocationStatus, AllocatorReducer};
use crate::commit::{CommitAction, CommitReducer, CommitState, CommitStatus};
use crate::confirmation::{ConfirmationAction, ConfirmationReducer, ConfirmationState};
use crate::environment::BookingEnvironment;
use crate::initiator::{InitiatorAction, InitiatorReducer, InitiatorState, InitiatorStatus};
use crate::reconciler::{PriceCheckAction, PriceCheckReducer, PriceCheckState};
use crate::types::{ApiFailure, Tokens};

/// Stage of the booking flow
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Filling in the booking form
    #[default]
    Form,
    /// Pending booking being created
    Initiating,
    /// Guests being allocated
    Allocating,
    /// Allocation finished with failures to retry or replace
    Remediation,
    /// Every item allocated; the price check can start
    Allocated,
    /// Prices being rechecked
    PriceCheck,
    /// Price summary waiting for the user
    AwaitingConfirmation,
    /// Final booking being submitted
    Committing,
    /// Resources being booked
    Confirming,
    /// Every resource has a final status
    Complete,
}

/// A flow request refused by a gate
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FlowError {
    /// No itinerary in state
    #[error("No itinerary loaded")]
    NoItinerary,

    /// Allocation has not run to the end
    #[error("Guest allocation has not finished")]
    AllocationIncomplete,

    /// Allocation left failed items
    #[error("{0} allocation(s) failed; retry or replace them before continuing")]
    AllocationFailures(usize),

    /// A replacement changed the itinerary
    #[error("The itinerary changed; refresh it before continuing")]
    ItineraryRefreshRequired,

    /// The price summary is not confirmed
    #[error("Confirm the price summary before booking")]
    PricesNotConfirmed,

    /// The final booking is being submitted or already exists
    #[error("The booking has already been submitted")]
    AlreadyCommitted,

    /// The itinerary could not be fetched again
    #[error("Could not refresh the itinerary: {0}")]
    RefreshFailed(ApiFailure),
}

/// Application state of the booking flow
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookingFlowState {
    /// Current stage
    pub stage: Stage,
    /// Session tokens
    pub tokens: Tokens,
    /// Itinerary snapshot; replaced only by a refresh
    pub itinerary: Option<Itinerary>,
    /// Rooms with derived traveler fields
    pub rooms: Vec<Room>,
    /// Free-text requests
    pub special_requirements: Option<String>,
    /// Booking initiation
    pub initiator: InitiatorState,
    /// Guest allocation
    pub allocation: AllocationState,
    /// Price check
    pub prices: PriceCheckState,
    /// Final commit
    pub commit: CommitState,
    /// Resource confirmation
    pub confirmation: ConfirmationState,
    /// Last gate rejection
    pub error: Option<FlowError>,
}

/// Inputs of the booking flow
#[derive(Clone, Debug, PartialEq)]
pub enum FlowAction {
    /// Submit the booking form for an itinerary
    Start {
        /// Session tokens
        tokens: Tokens,
        /// Itinerary snapshot
        itinerary: Itinerary,
        /// Rooms and travelers
        rooms: Vec<Room>,
        /// Free-text requests
        special_requirements: Option<String>,
    },
    /// Initiation stage
    Initiator(InitiatorAction),
    /// Allocation stage
    Allocation(AllocationAction),
    /// Price check stage
    Prices(PriceCheckAction),
    /// Commit stage
    Commit(CommitAction),
    /// Confirmation loop
    Confirmation(ConfirmationAction),
    /// Start the price check once every item is allocated
    ProceedToPriceCheck,
    /// Submit the final booking once prices are confirmed
    ProceedToCommit,
    /// Fetch the itinerary again after a replacement
    RefreshItinerary,
    /// Fresh itinerary fetched
    ItineraryRefreshed(Itinerary),
    /// Itinerary fetch failed
    ItineraryRefreshFailed(ApiFailure),
}

type FlowEffects = SmallVec<[Effect<FlowAction>; 4]>;

fn lift<A: Send + 'static>(
    effects: SmallVec<[Effect<A>; 4]>,
    into: fn(A) -> FlowAction,
) -> FlowEffects {
    effects
        .into_iter()
        .filter(|effect| !effect.is_none())
        .map(|effect| effect.map(into))
        .collect()
}

/// Reducer of the whole booking flow
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingFlowReducer;

impl BookingFlowReducer {
    fn initiator(state: &mut BookingFlowState, action: InitiatorAction, env: &BookingEnvironment) -> FlowEffects {
        let mut effects = lift(
            InitiatorReducer.reduce(&mut state.initiator, action, env),
            FlowAction::Initiator,
        );

        let status = state.initiator.status.clone();
        match status {
            InitiatorStatus::Submitting => state.stage = Stage::Initiating,
            InitiatorStatus::Invalid(_) | InitiatorStatus::Rejected(_) => state.stage = Stage::Form,
            InitiatorStatus::Created(_) if state.stage == Stage::Initiating => {
                let (Some(booking_id), Some(itinerary)) =
                    (state.initiator.booking_id.clone(), state.itinerary.clone())
                else {
                    state.error = Some(FlowError::NoItinerary);
                    return effects;
                };
                state.rooms = state.initiator.rooms.clone();
                state.stage = Stage::Allocating;
                tracing::info!(provisional_booking_id = %booking_id, "Booking initiated, allocating guests");

                let start = AllocationAction::Start {
                    booking_id,
                    tokens: state.tokens.clone(),
                    itinerary,
                    rooms: state.rooms.clone(),
                };
                effects.extend(Self::allocation(state, start, env));
            },
            InitiatorStatus::Idle | InitiatorStatus::Created(_) => {},
        }
        effects
    }

    fn allocation(state: &mut BookingFlowState, action: AllocationAction, env: &BookingEnvironment) -> FlowEffects {
        let effects = lift(
            AllocatorReducer.reduce(&mut state.allocation, action, env),
            FlowAction::Allocation,
        );

        if matches!(state.stage, Stage::Allocating | Stage::Remediation | Stage::Allocated) {
            state.stage = match state.allocation.status {
                AllocationStatus::Running => Stage::Allocating,
                _ if state.allocation.is_clean() => Stage::Allocated,
                _ => Stage::Remediation,
            };
        }
        effects
    }

    fn prices(state: &mut BookingFlowState, action: PriceCheckAction, env: &BookingEnvironment) -> FlowEffects {
        let effects = lift(
            PriceCheckReducer.reduce(&mut state.prices, action, env),
            FlowAction::Prices,
        );

        if matches!(state.stage, Stage::PriceCheck | Stage::AwaitingConfirmation) {
            state.stage = if state.prices.is_ready() {
                Stage::AwaitingConfirmation
            } else {
                Stage::PriceCheck
            };
        }
        effects
    }

    fn commit(state: &mut BookingFlowState, action: CommitAction, env: &BookingEnvironment) -> FlowEffects {
        let was_submitting = state.commit.status == CommitStatus::Submitting;
        let mut effects = lift(
            CommitReducer.reduce(&mut state.commit, action, env),
            FlowAction::Commit,
        );

        // Confirmation starts once, when the submitted commit resolves
        if state.stage != Stage::Committing || !was_submitting {
            return effects;
        }
        match state.commit.committed_booking_id().cloned() {
            Some(final_id) => {
                tracing::info!(
                    provisional_booking_id = ?state.initiator.booking_id,
                    final_booking_id = %final_id,
                    "Final booking committed, confirming resources"
                );
                state.stage = Stage::Confirming;
                let start = ConfirmationAction::Start {
                    booking_id: final_id,
                    tokens: state.tokens.clone(),
                    rooms: state.rooms.clone(),
                };
                effects.extend(Self::confirmation(state, start, env));
            },
            None if matches!(state.commit.status, CommitStatus::Failed(_)) => {
                state.stage = Stage::AwaitingConfirmation;
            },
            None => {},
        }
        effects
    }

    fn confirmation(
        state: &mut BookingFlowState,
        action: ConfirmationAction,
        env: &BookingEnvironment,
    ) -> FlowEffects {
        let finished = matches!(action, ConfirmationAction::Finished { .. });
        let effects = lift(
            ConfirmationReducer.reduce(&mut state.confirmation, action, env),
            FlowAction::Confirmation,
        );
        if finished {
            state.stage = Stage::Complete;
        }
        effects
    }

    fn reject(state: &mut BookingFlowState, error: FlowError) -> FlowEffects {
        tracing::warn!(%error, stage = ?state.stage, "Flow request refused");
        state.error = Some(error);
        smallvec![Effect::None]
    }

    fn price_check_gate(state: &BookingFlowState) -> Result<Itinerary, FlowError> {
        let allocation = &state.allocation;
        if allocation.status != AllocationStatus::Completed {
            return Err(FlowError::AllocationIncomplete);
        }
        if !allocation.failed.is_empty() {
            return Err(FlowError::AllocationFailures(allocation.failed.len()));
        }
        if allocation.needs_itinerary_refresh {
            return Err(FlowError::ItineraryRefreshRequired);
        }
        state.itinerary.clone().ok_or(FlowError::NoItinerary)
    }
}

impl Reducer for BookingFlowReducer {
    type State = BookingFlowState;
    type Action = FlowAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut BookingFlowState,
        action: FlowAction,
        env: &BookingEnvironment,
    ) -> FlowEffects {
        match action {
            FlowAction::Start {
                tokens,
                itinerary,
                rooms,
                special_requirements,
            } => {
                if state.stage != Stage::Form {
                    tracing::debug!(stage = ?state.stage, "Ignoring start outside the form stage");
                    return smallvec![Effect::None];
                }
                state.tokens = tokens.clone();
                state.itinerary = Some(itinerary);
                state.special_requirements = special_requirements.clone();
                state.error = None;
                Self::initiator(
                    state,
                    InitiatorAction::Submit {
                        tokens,
                        rooms,
                        special_requirements,
                    },
                    env,
                )
            },

            FlowAction::Initiator(action) => Self::initiator(state, action, env),
            FlowAction::Allocation(action) => Self::allocation(state, action, env),
            FlowAction::Prices(action) => Self::prices(state, action, env),
            FlowAction::Commit(action) => Self::commit(state, action, env),
            FlowAction::Confirmation(action) => Self::confirmation(state, action, env),

            FlowAction::ProceedToPriceCheck => {
                let itinerary = match Self::price_check_gate(state) {
                    Ok(itinerary) => itinerary,
                    Err(error) => return Self::reject(state, error),
                };
                state.error = None;
                state.stage = Stage::PriceCheck;
                let start = PriceCheckAction::Start {
                    tokens: state.tokens.clone(),
                    itinerary,
                };
                Self::prices(state, start, env)
            },

            FlowAction::ProceedToCommit => {
                if matches!(state.commit.status, CommitStatus::Submitting | CommitStatus::Committed(_)) {
                    return Self::reject(state, FlowError::AlreadyCommitted);
                }
                if let Err(error) = Self::price_check_gate(state) {
                    return Self::reject(state, error);
                }
                if !state.prices.confirmed || state.stage != Stage::AwaitingConfirmation {
                    return Self::reject(state, FlowError::PricesNotConfirmed);
                }
                let Some(itinerary) = state.itinerary.clone() else {
                    return Self::reject(state, FlowError::NoItinerary);
                };

                state.error = None;
                state.stage = Stage::Committing;
                let submit = CommitAction::Submit {
                    tokens: state.tokens.clone(),
                    itinerary,
                    rooms: state.rooms.clone(),
                    special_requirements: state.special_requirements.clone(),
                };
                Self::commit(state, submit, env)
            },

            FlowAction::RefreshItinerary => {
                let api = env.api.clone();
                let token = state.tokens.itinerary.clone();
                tracing::info!(itinerary = %token, "Refreshing itinerary");
                smallvec![async_effect! {
                    Some(match api.get_itinerary(token).await {
                        Ok(itinerary) => FlowAction::ItineraryRefreshed(itinerary),
                        Err(error) => FlowAction::ItineraryRefreshFailed(error.into()),
                    })
                }]
            },

            FlowAction::ItineraryRefreshed(itinerary) => {
                state.itinerary = Some(itinerary.clone());
                if state.error == Some(FlowError::ItineraryRefreshRequired) {
                    state.error = None;
                }
                if !state.allocation.needs_itinerary_refresh {
                    return smallvec![Effect::None];
                }
                Self::allocation(state, AllocationAction::AllocatePending(itinerary), env)
            },

            FlowAction::ItineraryRefreshFailed(error) => Self::reject(state, FlowError::RefreshFailed(error)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::allocator::AllocationKey;
    use crate::test_support::{environment, two_flight_itinerary};
    use crate::validation::fixtures::{complete_traveler, room};
    use std::sync::Arc;
    use tripflow_testing::{ApiCall, ReducerTest, ScriptedTravelApi, assertions};

    fn start() -> FlowAction {
        FlowAction::Start {
            tokens: Tokens::new("itn-1", "inq-1"),
            itinerary: two_flight_itinerary(),
            rooms: vec![room(1, vec![complete_traveler("Asha")])],
            special_requirements: None,
        }
    }

    async fn drive(state: &mut BookingFlowState, env: &BookingEnvironment, action: FlowAction) {
        let mut pending = vec![action];
        while let Some(action) = pending.pop() {
            let effects = BookingFlowReducer.reduce(state, action, env);
            pending.extend(assertions::resolve(effects).await);
        }
    }

    #[tokio::test]
    async fn test_initiation_success_starts_allocation() {
        let api = Arc::new(ScriptedTravelApi::new());
        let env = environment(api.clone());
        let mut state = BookingFlowState::default();

        drive(&mut state, &env, start()).await;

        assert_eq!(state.stage, Stage::Allocated);
        assert_eq!(api.allocation_calls(), 3);
        assert_eq!(state.allocation.booking_id, state.initiator.booking_id);
    }

    #[test]
    fn test_price_check_refused_before_allocation() {
        ReducerTest::new(BookingFlowReducer)
            .with_env(environment(Arc::new(ScriptedTravelApi::new())))
            .given_state(BookingFlowState::default())
            .when_action(FlowAction::ProceedToPriceCheck)
            .then_state(|state| {
                assert_eq!(state.error, Some(FlowError::AllocationIncomplete));
                assert_eq!(state.stage, Stage::Form);
            })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[tokio::test]
    async fn test_price_check_refused_with_failures() {
        let api = Arc::new(ScriptedTravelApi::new().fail_hotel_allocation("H1", "Sold out", None));
        let env = environment(api.clone());
        let mut state = BookingFlowState::default();
        drive(&mut state, &env, start()).await;
        assert_eq!(state.stage, Stage::Remediation);

        drive(&mut state, &env, FlowAction::ProceedToPriceCheck).await;

        assert_eq!(state.error, Some(FlowError::AllocationFailures(1)));
        assert_eq!(api.recheck_calls(), 0);
    }

    #[tokio::test]
    async fn test_commit_refused_without_confirmation() {
        let api = Arc::new(ScriptedTravelApi::new().with_itinerary(two_flight_itinerary()));
        let env = environment(api.clone());
        let mut state = BookingFlowState::default();
        drive(&mut state, &env, start()).await;
        drive(&mut state, &env, FlowAction::ProceedToPriceCheck).await;
        assert_eq!(state.stage, Stage::AwaitingConfirmation);

        drive(&mut state, &env, FlowAction::ProceedToCommit).await;

        assert_eq!(state.error, Some(FlowError::PricesNotConfirmed));
        assert_eq!(api.created_bookings().len(), 1);
    }

    #[tokio::test]
    async fn test_second_commit_after_completion_books_nothing() {
        let api = Arc::new(ScriptedTravelApi::new().with_itinerary(two_flight_itinerary()));
        let env = environment(api.clone());
        let mut state = BookingFlowState::default();
        drive(&mut state, &env, start()).await;
        drive(&mut state, &env, FlowAction::ProceedToPriceCheck).await;
        drive(&mut state, &env, FlowAction::Prices(PriceCheckAction::Confirm)).await;
        drive(&mut state, &env, FlowAction::ProceedToCommit).await;
        assert_eq!(state.stage, Stage::Complete);

        let resource_bookings = || api.count(|call| matches!(call, ApiCall::BookResource { .. }));
        let booked = resource_bookings();
        let created = api.created_bookings().len();
        assert!(booked > 0);

        drive(&mut state, &env, FlowAction::ProceedToCommit).await;

        assert_eq!(state.error, Some(FlowError::AlreadyCommitted));
        assert_eq!(state.stage, Stage::Complete);
        assert_eq!(resource_bookings(), booked);
        assert_eq!(api.created_bookings().len(), created);
    }

    #[tokio::test]
    async fn test_replayed_commit_result_does_not_restart_confirmation() {
        let api = Arc::new(ScriptedTravelApi::new().with_itinerary(two_flight_itinerary()));
        let env = environment(api.clone());
        let mut state = BookingFlowState::default();
        drive(&mut state, &env, start()).await;
        drive(&mut state, &env, FlowAction::ProceedToPriceCheck).await;
        drive(&mut state, &env, FlowAction::Prices(PriceCheckAction::Confirm)).await;
        drive(&mut state, &env, FlowAction::ProceedToCommit).await;
        let booked = api.count(|call| matches!(call, ApiCall::BookResource { .. }));

        state.stage = Stage::Committing;
        let effects = BookingFlowReducer.reduce(
            &mut state,
            FlowAction::Commit(CommitAction::Submit {
                tokens: Tokens::new("itn-1", "inq-1"),
                itinerary: two_flight_itinerary(),
                rooms: Vec::new(),
                special_requirements: None,
            }),
            &env,
        );

        assertions::assert_no_effects(&effects);
        assert_eq!(state.stage, Stage::Committing);
        assert_eq!(api.count(|call| matches!(call, ApiCall::BookResource { .. })), booked);
    }

    #[tokio::test]
    async fn test_replacement_requires_refresh_then_allocates_new_item() {
        let mut refreshed = two_flight_itinerary();
        refreshed.cities[1].days[0].flights[0].flight_code = "FB2".into();
        let api = Arc::new(
            ScriptedTravelApi::new()
                .with_itinerary(refreshed)
                .fail_flight_allocation("FB", "Fare gone", Some("6"))
                .with_flight_options(vec![tripflow_api::Flight {
                    flight_code: "FB2".into(),
                    ..tripflow_api::Flight::default()
                }]),
        );
        let env = environment(api.clone());
        let mut state = BookingFlowState::default();
        drive(&mut state, &env, start()).await;

        let key = AllocationKey::flight("FB", "Rome", tripflow_testing::date(2025, 3, 6));
        drive(&mut state, &env, FlowAction::Allocation(AllocationAction::RequestReplacement(key))).await;
        drive(&mut state, &env, FlowAction::Allocation(AllocationAction::ChooseReplacement { index: 0 })).await;
        assert!(state.allocation.failed.is_empty());

        drive(&mut state, &env, FlowAction::ProceedToPriceCheck).await;
        assert_eq!(state.error, Some(FlowError::ItineraryRefreshRequired));

        drive(&mut state, &env, FlowAction::RefreshItinerary).await;
        assert_eq!(state.stage, Stage::Allocated);
        assert_eq!(api.allocation_calls(), 4);

        drive(&mut state, &env, FlowAction::ProceedToPriceCheck).await;
        assert_eq!(state.stage, Stage::AwaitingConfirmation);
        assert_eq!(state.error, None);
    }
}
