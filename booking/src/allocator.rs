//! Guest allocation: assign the travelers to every flight and hotel
//!
//! Items are allocated strictly one at a time in travel order (city by city,
//! day by day, flights before hotels). A failed item is recorded and the loop
//! moves on. Once every item has been attempted the stage is complete; any
//! failure blocks the price check until it is retried or replaced.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tripflow_api::{
    ApiError, BookingId, Flight, FlightLeg, FlightSearchRequest, Hotel, HotelSearchRequest,
    Itinerary, Receipt, ReplaceFlightRequest, ReplaceHotelRequest, ResourceKind, Room, StayDates,
};
use tripflow_core::{
    SmallVec, async_effect, dispatch,
    effect::Effect,
    progress::{ProgressEvent, SequentialQueue},
    reducer::Reducer,
    smallvec,
};
use tripflow_runtime::RetryLedger;

use crate::environment::BookingEnvironment;
use crate::transform::{flight_allocation, hotel_allocation};
use crate::travelers::{occupancy, total_occupancy};
use crate::types::{ApiFailure, Tokens};

/// Provider code of a flight whose fare is no longer available
pub const FLIGHT_EXPIRED_CODE: &str = "6";

/// One flight or hotel to allocate, with the day it belongs to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AllocationTarget {
    /// A flight
    Flight {
        /// City whose day holds the flight
        city: String,
        /// Day of the flight
        date: NaiveDate,
        /// Leg of the trip
        leg: FlightLeg,
        /// The flight
        flight: Flight,
    },
    /// A hotel
    Hotel {
        /// City of the stay
        city: String,
        /// Country of the stay
        country: String,
        /// Day of the check-in
        date: NaiveDate,
        /// The hotel
        hotel: Hotel,
    },
}

impl AllocationTarget {
    /// Flight or hotel
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Flight { .. } => ResourceKind::Flight,
            Self::Hotel { .. } => ResourceKind::Hotel,
        }
    }

    /// Flight code or hotel static-content id
    #[must_use]
    pub fn reference(&self) -> &str {
        match self {
            Self::Flight { flight, .. } => &flight.flight_code,
            Self::Hotel { hotel, .. } => &hotel.hotel_id,
        }
    }

    /// Identity of this target in the failure list
    #[must_use]
    pub fn key(&self) -> AllocationKey {
        AllocationKey {
            kind: self.kind(),
            reference: self.reference().to_string(),
            city: self.city().to_string(),
            date: self.date(),
        }
    }

    /// City whose day holds the target
    #[must_use]
    pub fn city(&self) -> &str {
        match self {
            Self::Flight { city, .. } | Self::Hotel { city, .. } => city,
        }
    }

    /// Day the target belongs to
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        match self {
            Self::Flight { date, .. } | Self::Hotel { date, .. } => *date,
        }
    }
}

impl fmt::Display for AllocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flight { flight, date, .. } => write!(
                f,
                "Flight {} {} → {} on {date}",
                flight.flight_code, flight.origin, flight.destination
            ),
            Self::Hotel { hotel, city, date, .. } => {
                write!(f, "Hotel {} in {city} from {date}", hotel.name)
            },
        }
    }
}

/// Identity of an allocation target: provider reference on one day of a city
///
/// The same flight code or hotel id may appear on several days; each
/// occurrence is a separate item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationKey {
    /// Flight or hotel
    pub kind: ResourceKind,
    /// Flight code or hotel static-content id
    pub reference: String,
    /// City whose day holds the item
    pub city: String,
    /// Day the item belongs to
    pub date: NaiveDate,
}

impl AllocationKey {
    /// Key of a flight on a day of `city`
    #[must_use]
    pub fn flight(code: impl Into<String>, city: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            kind: ResourceKind::Flight,
            reference: code.into(),
            city: city.into(),
            date,
        }
    }

    /// Key of a hotel on a day of `city`
    #[must_use]
    pub fn hotel(id: impl Into<String>, city: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            kind: ResourceKind::Hotel,
            reference: id.into(),
            city: city.into(),
            date,
        }
    }
}

impl fmt::Display for AllocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({}, {})", self.kind, self.reference, self.city, self.date)
    }
}

/// Every flight and hotel of the itinerary in allocation order
#[must_use]
pub fn allocation_targets(itinerary: &Itinerary) -> Vec<AllocationTarget> {
    let flight_count = itinerary.flights().count();
    let mut flight_index = 0;
    let mut targets = Vec::new();

    for (city, day) in itinerary.days() {
        for flight in &day.flights {
            let leg = if flight_index == 0 {
                FlightLeg::Departure
            } else if flight_index + 1 == flight_count {
                FlightLeg::Return
            } else {
                FlightLeg::Intercity
            };
            flight_index += 1;

            targets.push(AllocationTarget::Flight {
                city: city.city.clone(),
                date: day.date,
                leg,
                flight: flight.clone(),
            });
        }
        for hotel in &day.hotels {
            targets.push(AllocationTarget::Hotel {
                city: city.city.clone(),
                country: city.country.clone(),
                date: day.date,
                hotel: hotel.clone(),
            });
        }
    }

    targets
}

/// Why an allocation failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The flight fare is gone (provider code "6")
    FlightExpired,
    /// Any other provider or transport error
    Provider,
}

/// What the user can do about a failed allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Remediation {
    /// Only a replacement helps
    Replace,
    /// Retrying may help; replacing is also possible
    RetryOrReplace,
}

/// A failed allocation kept for remediation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedAllocation {
    /// What was being allocated
    pub target: AllocationTarget,
    /// What the backend said
    pub error: ApiFailure,
    /// Classification of the error
    pub reason: FailureReason,
}

impl FailedAllocation {
    /// Record a failure and classify it
    #[must_use]
    pub fn new(target: AllocationTarget, error: ApiFailure) -> Self {
        let expired = target.kind() == ResourceKind::Flight
            && error.code.as_deref() == Some(FLIGHT_EXPIRED_CODE);
        Self {
            target,
            error,
            reason: if expired {
                FailureReason::FlightExpired
            } else {
                FailureReason::Provider
            },
        }
    }

    /// Identity of the failed target
    #[must_use]
    pub fn key(&self) -> AllocationKey {
        self.target.key()
    }

    /// Flight or hotel
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.target.kind()
    }

    /// Offered remediation
    #[must_use]
    pub const fn remediation(&self) -> Remediation {
        match self.reason {
            FailureReason::FlightExpired => Remediation::Replace,
            FailureReason::Provider => Remediation::RetryOrReplace,
        }
    }

    /// Message to show next to the failed item
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.reason {
            FailureReason::FlightExpired => {
                "This flight is no longer available. Please replace it with another flight."
                    .to_string()
            },
            FailureReason::Provider => self.error.message.clone(),
        }
    }
}

/// A successfully allocated item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocatedItem {
    /// What was allocated
    pub target: AllocationTarget,
    /// Backend acknowledgement
    pub receipt: Receipt,
}

/// Successful allocations by kind
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessfulAllocations {
    /// Allocated flights
    pub flights: Vec<AllocatedItem>,
    /// Allocated hotels
    pub hotels: Vec<AllocatedItem>,
}

impl SuccessfulAllocations {
    /// Number of allocated items
    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.len() + self.hotels.len()
    }

    /// Whether nothing was allocated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the item with `key` is allocated
    #[must_use]
    pub fn contains(&self, key: &AllocationKey) -> bool {
        self.flights
            .iter()
            .chain(&self.hotels)
            .any(|item| &item.target.key() == key)
    }

    fn push(&mut self, item: AllocatedItem) {
        match item.target.kind() {
            ResourceKind::Hotel => self.hotels.push(item),
            _ => self.flights.push(item),
        }
    }
}

/// Progress of the allocation loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStatus {
    /// Not started
    #[default]
    Idle,
    /// Items are being allocated
    Running,
    /// Every item has been attempted
    Completed,
}

/// A substitute offered for a failed item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReplacementOption {
    /// Substitute flight
    Flight(Flight),
    /// Substitute hotel
    Hotel(Hotel),
}

/// Step of the replacement sub-flow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReplacementStatus {
    /// Searching for substitutes
    Searching,
    /// Waiting for the user to pick a substitute
    Choosing,
    /// Writing the chosen substitute into the itinerary
    Applying,
    /// Search or replace failed; the user may try again or cancel
    Failed(ApiFailure),
}

/// Replacement of one failed item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplacementState {
    /// The failure being remediated
    pub failed: FailedAllocation,
    /// Current step
    pub status: ReplacementStatus,
    /// Substitutes found by the search
    pub options: Vec<ReplacementOption>,
}

/// State of the allocation stage
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllocationState {
    /// Provisional booking the travelers are allocated to
    pub booking_id: Option<BookingId>,
    /// Session tokens
    pub tokens: Tokens,
    /// Rooms and travelers
    pub rooms: Vec<Room>,
    /// Items not yet attempted
    pub queue: SequentialQueue<AllocationTarget>,
    /// Item being allocated
    pub current: Option<ProgressEvent<AllocationTarget>>,
    /// Loop progress
    pub status: AllocationStatus,
    /// Allocated items
    pub successful: SuccessfulAllocations,
    /// Failed items, in the order they failed
    pub failed: Vec<FailedAllocation>,
    /// Allocation requests issued so far
    pub attempted: usize,
    /// Manual retries per item
    pub retries: RetryLedger<AllocationKey>,
    /// Replacement in progress
    pub replacement: Option<ReplacementState>,
    /// An item was replaced server-side; the itinerary snapshot is stale
    pub needs_itinerary_refresh: bool,
    /// Last message for the user about a rejected request
    pub notice: Option<String>,
}

impl AllocationState {
    /// Every item attempted and none failed
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.status == AllocationStatus::Completed && self.failed.is_empty()
    }

    /// Failure recorded for `key`
    #[must_use]
    pub fn failure(&self, key: &AllocationKey) -> Option<&FailedAllocation> {
        self.failed.iter().find(|f| &f.key() == key)
    }

    fn remove_failure(&mut self, key: &AllocationKey) -> Option<FailedAllocation> {
        let index = self.failed.iter().position(|f| &f.key() == key)?;
        Some(self.failed.remove(index))
    }

    fn refuse(&mut self, notice: impl Into<String>) -> SmallVec<[Effect<AllocationAction>; 4]> {
        let notice = notice.into();
        tracing::warn!(%notice, "Allocation request refused");
        self.notice = Some(notice);
        smallvec![Effect::None]
    }
}

/// Inputs of the allocation stage
#[derive(Clone, Debug, PartialEq)]
pub enum AllocationAction {
    /// Allocate every flight and hotel of the itinerary
    Start {
        /// Provisional booking id
        booking_id: BookingId,
        /// Session tokens
        tokens: Tokens,
        /// Itinerary snapshot
        itinerary: Itinerary,
        /// Rooms and travelers
        rooms: Vec<Room>,
    },
    /// Allocate items of a refreshed itinerary that were never allocated
    ///
    /// Replaced items come back from the backend under a new reference; every
    /// item already allocated or still failed is skipped.
    AllocatePending(Itinerary),
    /// Take the next item off the queue
    AllocateNext,
    /// An item is about to be allocated
    ItemStarted(ProgressEvent<AllocationTarget>),
    /// The backend accepted an allocation
    ItemAllocated {
        /// The item and its position
        progress: ProgressEvent<AllocationTarget>,
        /// Backend acknowledgement
        receipt: Receipt,
    },
    /// The backend refused an allocation or could not be reached
    ItemFailed {
        /// The item and its position
        progress: ProgressEvent<AllocationTarget>,
        /// What went wrong
        error: ApiFailure,
    },
    /// Every queued item has been attempted
    Finished {
        /// Allocated items so far
        succeeded: usize,
        /// Items still failed
        failed: usize,
    },
    /// User asks to allocate a failed item again
    RetryFailed(AllocationKey),
    /// User asks for substitutes of a failed item
    RequestReplacement(AllocationKey),
    /// Substitutes found
    ReplacementOptionsLoaded {
        /// Failed item being replaced
        key: AllocationKey,
        /// Substitutes
        options: Vec<ReplacementOption>,
    },
    /// User picks a substitute
    ChooseReplacement {
        /// Position in the options list
        index: usize,
    },
    /// Substitute written into the itinerary
    ReplacementApplied(AllocationKey),
    /// Search or replace call failed
    ReplacementFailed {
        /// Failed item being replaced
        key: AllocationKey,
        /// What went wrong
        error: ApiFailure,
    },
    /// User abandons the replacement
    CancelReplacement,
}

fn allocation_outcome(
    progress: ProgressEvent<AllocationTarget>,
    result: Result<Receipt, ApiError>,
) -> AllocationAction {
    match result {
        Ok(receipt) => AllocationAction::ItemAllocated { progress, receipt },
        Err(error) => AllocationAction::ItemFailed {
            progress,
            error: error.into(),
        },
    }
}

/// Reducer of the allocation stage
#[derive(Clone, Copy, Debug, Default)]
pub struct AllocatorReducer;

impl AllocatorReducer {
    fn allocate(
        state: &AllocationState,
        env: &BookingEnvironment,
        progress: ProgressEvent<AllocationTarget>,
    ) -> Effect<AllocationAction> {
        let api = env.api.clone();
        let booking_id = state.booking_id.clone().unwrap_or_default();

        match &progress.item {
            AllocationTarget::Flight { flight, .. } => {
                let request = flight_allocation(flight, &state.rooms);
                async_effect! {
                    let result = api.allocate_flight(booking_id, request).await;
                    Some(allocation_outcome(progress, result))
                }
            },
            AllocationTarget::Hotel { hotel, .. } => {
                let request = hotel_allocation(hotel, &state.rooms);
                async_effect! {
                    let result = api.allocate_hotel(booking_id, request).await;
                    Some(allocation_outcome(progress, result))
                }
            },
        }
    }

    fn search(
        state: &AllocationState,
        env: &BookingEnvironment,
        failed: &FailedAllocation,
    ) -> Effect<AllocationAction> {
        let api = env.api.clone();
        let key = failed.key();

        match &failed.target {
            AllocationTarget::Flight { city, date, flight, .. } => {
                let or_city = |value: &str| {
                    if value.is_empty() { city.clone() } else { value.to_string() }
                };
                let request = FlightSearchRequest {
                    departure_city: or_city(&flight.origin),
                    cities: vec![or_city(&flight.destination)],
                    travelers: total_occupancy(&state.rooms),
                    departure_dates: vec![flight.departure_date.unwrap_or(*date)],
                };
                async_effect! {
                    Some(match api.search_flights(request).await {
                        Ok(flights) => AllocationAction::ReplacementOptionsLoaded {
                            key,
                            options: flights.into_iter().map(ReplacementOption::Flight).collect(),
                        },
                        Err(error) => AllocationAction::ReplacementFailed { key, error: error.into() },
                    })
                }
            },
            AllocationTarget::Hotel { city, country, date, hotel } => {
                let check_in = hotel.check_in.unwrap_or(*date);
                let check_out = hotel
                    .check_out
                    .unwrap_or_else(|| check_in.succ_opt().unwrap_or(check_in));
                let request = HotelSearchRequest {
                    city: if hotel.city.is_empty() { city.clone() } else { hotel.city.clone() },
                    country: if hotel.country.is_empty() { country.clone() } else { hotel.country.clone() },
                    dates: StayDates { check_in, check_out },
                    travelers_details: state.rooms.iter().map(occupancy).collect(),
                };
                async_effect! {
                    Some(match api.search_hotels(request).await {
                        Ok(hotels) => AllocationAction::ReplacementOptionsLoaded {
                            key,
                            options: hotels.into_iter().map(ReplacementOption::Hotel).collect(),
                        },
                        Err(error) => AllocationAction::ReplacementFailed { key, error: error.into() },
                    })
                }
            },
        }
    }

    fn replace(
        state: &AllocationState,
        env: &BookingEnvironment,
        failed: &FailedAllocation,
        option: ReplacementOption,
    ) -> Option<Effect<AllocationAction>> {
        let api = env.api.clone();
        let token = state.tokens.itinerary.clone();
        let key = failed.key();

        let effect = match (&failed.target, option) {
            (AllocationTarget::Flight { city, date, leg, .. }, ReplacementOption::Flight(flight)) => {
                let request = ReplaceFlightRequest {
                    city_name: city.clone(),
                    date: *date,
                    new_flight_details: flight,
                    leg: *leg,
                };
                async_effect! {
                    Some(match api.replace_flight(token, request).await {
                        Ok(_) => AllocationAction::ReplacementApplied(key),
                        Err(error) => AllocationAction::ReplacementFailed { key, error: error.into() },
                    })
                }
            },
            (AllocationTarget::Hotel { city, date, .. }, ReplacementOption::Hotel(hotel)) => {
                let request = ReplaceHotelRequest {
                    city_name: city.clone(),
                    date: *date,
                    new_hotel_details: hotel,
                };
                async_effect! {
                    Some(match api.replace_hotel(token, request).await {
                        Ok(_) => AllocationAction::ReplacementApplied(key),
                        Err(error) => AllocationAction::ReplacementFailed { key, error: error.into() },
                    })
                }
            },
            _ => return None,
        };
        Some(effect)
    }
}

impl Reducer for AllocatorReducer {
    type State = AllocationState;
    type Action = AllocationAction;
    type Environment = BookingEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut AllocationState,
        action: AllocationAction,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<AllocationAction>; 4]> {
        match action {
            AllocationAction::Start {
                booking_id,
                tokens,
                itinerary,
                rooms,
            } => {
                if state.status == AllocationStatus::Running {
                    return state.refuse("Allocation is already running");
                }

                let targets = allocation_targets(&itinerary);
                tracing::info!(
                    booking_id = %booking_id,
                    total = targets.len(),
                    "Starting guest allocation"
                );

                *state = AllocationState {
                    booking_id: Some(booking_id),
                    tokens,
                    rooms,
                    queue: SequentialQueue::new(targets),
                    status: AllocationStatus::Running,
                    retries: RetryLedger::new(env.retry),
                    ..AllocationState::default()
                };
                smallvec![dispatch!(AllocationAction::AllocateNext)]
            },

            AllocationAction::AllocatePending(itinerary) => {
                if state.status == AllocationStatus::Running {
                    return state.refuse("Allocation is already running");
                }

                let pending: Vec<AllocationTarget> = allocation_targets(&itinerary)
                    .into_iter()
                    .filter(|target| {
                        let key = target.key();
                        !state.successful.contains(&key) && state.failure(&key).is_none()
                    })
                    .collect();
                state.needs_itinerary_refresh = false;
                if pending.is_empty() {
                    tracing::debug!("Refreshed itinerary has nothing left to allocate");
                    return smallvec![Effect::None];
                }

                tracing::info!(total = pending.len(), "Allocating replaced items");
                state.queue = SequentialQueue::new(pending);
                state.status = AllocationStatus::Running;
                state.notice = None;
                smallvec![dispatch!(AllocationAction::AllocateNext)]
            },

            AllocationAction::AllocateNext => {
                if state.status != AllocationStatus::Running {
                    return smallvec![Effect::None];
                }
                if let Some(progress) = state.queue.advance() {
                    return smallvec![dispatch!(AllocationAction::ItemStarted(progress))];
                }
                if state.queue.in_flight() {
                    return smallvec![Effect::None];
                }

                state.status = AllocationStatus::Completed;
                state.current = None;
                tracing::info!(
                    succeeded = state.successful.len(),
                    failed = state.failed.len(),
                    "Guest allocation finished"
                );
                smallvec![dispatch!(AllocationAction::Finished {
                    succeeded: state.successful.len(),
                    failed: state.failed.len(),
                })]
            },

            AllocationAction::ItemStarted(progress) => {
                tracing::info!(
                    kind = %progress.item.kind(),
                    reference = progress.item.reference(),
                    current = progress.current,
                    total = progress.total,
                    "Allocating guests"
                );
                state.current = Some(progress.clone());
                state.attempted += 1;
                smallvec![Self::allocate(state, env, progress)]
            },

            AllocationAction::ItemAllocated { progress, receipt } => {
                if !state.queue.complete_current() {
                    tracing::warn!(reference = progress.item.reference(), "Ignoring stale allocation result");
                    return smallvec![Effect::None];
                }
                metrics::counter!("booking.allocation.succeeded").increment(1);

                let key = progress.item.key();
                if state.remove_failure(&key).is_some() {
                    tracing::info!(%key, "Failed allocation succeeded on retry");
                }
                state.successful.push(AllocatedItem {
                    target: progress.item,
                    receipt,
                });
                state.current = None;
                smallvec![dispatch!(AllocationAction::AllocateNext)]
            },

            AllocationAction::ItemFailed { progress, error } => {
                if !state.queue.complete_current() {
                    tracing::warn!(reference = progress.item.reference(), "Ignoring stale allocation failure");
                    return smallvec![Effect::None];
                }
                metrics::counter!("booking.allocation.failed").increment(1);

                let failure = FailedAllocation::new(progress.item, error);
                tracing::warn!(
                    key = %failure.key(),
                    reason = ?failure.reason,
                    error = %failure.error,
                    "Allocation failed"
                );

                let key = failure.key();
                match state.failed.iter_mut().find(|f| f.key() == key) {
                    Some(existing) => *existing = failure,
                    None => state.failed.push(failure),
                }
                state.current = None;
                smallvec![dispatch!(AllocationAction::AllocateNext)]
            },

            AllocationAction::Finished { .. } => smallvec![Effect::None],

            AllocationAction::RetryFailed(key) => {
                if state.status != AllocationStatus::Completed {
                    return state.refuse("Wait for the allocation to finish before retrying");
                }
                let Some(failed) = state.failure(&key).cloned() else {
                    return state.refuse(format!("No failed allocation for {key}"));
                };
                if failed.remediation() == Remediation::Replace {
                    return state.refuse(format!("{key} has expired and must be replaced"));
                }
                if let Err(rejected) = state.retries.record_manual_retry(key) {
                    return state.refuse(rejected.to_string());
                }

                state.notice = None;
                state.queue = SequentialQueue::new([failed.target]);
                state.status = AllocationStatus::Running;
                smallvec![dispatch!(AllocationAction::AllocateNext)]
            },

            AllocationAction::RequestReplacement(key) => {
                if state.status == AllocationStatus::Running {
                    return state.refuse("Wait for the allocation to finish before replacing");
                }
                if matches!(
                    state.replacement.as_ref().map(|r| &r.status),
                    Some(ReplacementStatus::Searching | ReplacementStatus::Applying)
                ) {
                    return state.refuse("A replacement is already in progress");
                }
                let Some(failed) = state.failure(&key).cloned() else {
                    return state.refuse(format!("No failed allocation for {key}"));
                };

                tracing::info!(%key, "Searching replacement");
                state.notice = None;
                let effect = Self::search(state, env, &failed);
                state.replacement = Some(ReplacementState {
                    failed,
                    status: ReplacementStatus::Searching,
                    options: Vec::new(),
                });
                smallvec![effect]
            },

            AllocationAction::ReplacementOptionsLoaded { key, options } => {
                let Some(replacement) = state.replacement.as_mut() else {
                    return smallvec![Effect::None];
                };
                if replacement.failed.key() != key
                    || replacement.status != ReplacementStatus::Searching
                {
                    return smallvec![Effect::None];
                }

                tracing::info!(%key, options = options.len(), "Replacement options loaded");
                replacement.status = if options.is_empty() {
                    ReplacementStatus::Failed(ApiFailure::message("No replacement options found"))
                } else {
                    ReplacementStatus::Choosing
                };
                replacement.options = options;
                smallvec![Effect::None]
            },

            AllocationAction::ChooseReplacement { index } => {
                let Some(replacement) = state.replacement.clone() else {
                    return state.refuse("No replacement in progress");
                };
                if replacement.status != ReplacementStatus::Choosing {
                    return state.refuse("No replacement options to choose from");
                }
                let Some(option) = replacement.options.get(index).cloned() else {
                    return state.refuse(format!("No replacement option #{}", index + 1));
                };
                let Some(effect) = Self::replace(state, env, &replacement.failed, option) else {
                    return state.refuse("Replacement option does not match the failed item");
                };

                tracing::info!(key = %replacement.failed.key(), index, "Applying replacement");
                if let Some(replacement) = state.replacement.as_mut() {
                    replacement.status = ReplacementStatus::Applying;
                }
                smallvec![effect]
            },

            AllocationAction::ReplacementApplied(key) => {
                if state.replacement.as_ref().map(|r| r.failed.key()) != Some(key.clone()) {
                    return smallvec![Effect::None];
                }

                state.remove_failure(&key);
                state.replacement = None;
                state.needs_itinerary_refresh = true;
                metrics::counter!("booking.allocation.replaced").increment(1);
                tracing::info!(%key, remaining_failures = state.failed.len(), "Replacement applied");
                smallvec![Effect::None]
            },

            AllocationAction::ReplacementFailed { key, error } => {
                if let Some(replacement) = state
                    .replacement
                    .as_mut()
                    .filter(|r| r.failed.key() == key)
                {
                    tracing::warn!(%key, %error, "Replacement failed");
                    replacement.status = ReplacementStatus::Failed(error);
                }
                smallvec![Effect::None]
            },

            AllocationAction::CancelReplacement => {
                if matches!(
                    state.replacement.as_ref().map(|r| &r.status),
                    Some(ReplacementStatus::Applying)
                ) {
                    return state.refuse("The replacement is being applied");
                }
                state.replacement = None;
                smallvec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{environment, two_flight_itinerary};
    use crate::validation::fixtures::{complete_traveler, room};
    use std::sync::Arc;
    use tripflow_testing::{ReducerTest, ScriptedTravelApi, assertions, date};

    fn fa() -> AllocationKey {
        AllocationKey::flight("FA", "Paris", date(2025, 3, 1))
    }

    fn fb() -> AllocationKey {
        AllocationKey::flight("FB", "Rome", date(2025, 3, 6))
    }

    fn h1() -> AllocationKey {
        AllocationKey::hotel("H1", "Paris", date(2025, 3, 1))
    }

    fn started(api: &Arc<ScriptedTravelApi>) -> AllocationState {
        let mut state = AllocationState::default();
        let _ = AllocatorReducer.reduce(
            &mut state,
            AllocationAction::Start {
                booking_id: "b-1".into(),
                tokens: Tokens::new("itn-1", "inq-1"),
                itinerary: two_flight_itinerary(),
                rooms: vec![room(1, vec![complete_traveler("Asha")])],
            },
            &environment(api.clone()),
        );
        state
    }

    /// Drive the loop to completion without a Store
    async fn run_to_completion(state: &mut AllocationState, env: &BookingEnvironment) {
        let mut pending = vec![AllocationAction::AllocateNext];
        while let Some(action) = pending.pop() {
            let effects = AllocatorReducer.reduce(state, action, env);
            pending.extend(assertions::resolve(effects).await);
        }
    }

    #[test]
    fn test_targets_are_in_travel_order_flights_first() {
        let targets = allocation_targets(&two_flight_itinerary());
        let keys: Vec<AllocationKey> = targets.iter().map(AllocationTarget::key).collect();
        assert_eq!(keys, vec![fa(), h1(), fb()]);
        assert!(matches!(targets[0], AllocationTarget::Flight { leg: FlightLeg::Departure, .. }));
        assert!(matches!(targets[2], AllocationTarget::Flight { leg: FlightLeg::Return, .. }));
    }

    #[test]
    fn test_start_queues_every_item_and_dispatches() {
        let api = Arc::new(ScriptedTravelApi::new());
        ReducerTest::new(AllocatorReducer)
            .with_env(environment(api))
            .given_state(AllocationState::default())
            .when_action(AllocationAction::Start {
                booking_id: "b-1".into(),
                tokens: Tokens::new("itn-1", "inq-1"),
                itinerary: two_flight_itinerary(),
                rooms: vec![room(1, vec![complete_traveler("Asha")])],
            })
            .then_state(|state| {
                assert_eq!(state.status, AllocationStatus::Running);
                assert_eq!(state.queue.total(), 3);
            })
            .then_effects(|effects| assertions::assert_has_future_effect(effects))
            .run();
    }

    #[test]
    fn test_only_one_item_in_flight() {
        let api = Arc::new(ScriptedTravelApi::new());
        let mut state = started(&api);
        let env = environment(api);

        let _ = AllocatorReducer.reduce(&mut state, AllocationAction::AllocateNext, &env);
        let second = AllocatorReducer.reduce(&mut state, AllocationAction::AllocateNext, &env);

        assertions::assert_no_effects(&second);
        assert_eq!(state.queue.started(), 1);
    }

    #[tokio::test]
    async fn test_every_item_attempted_once_despite_failures() {
        let api = Arc::new(
            ScriptedTravelApi::new()
                .fail_flight_allocation("FA", "Seat map unavailable", None)
                .fail_hotel_allocation("H1", "Room sold out", Some("12")),
        );
        let env = environment(api.clone());
        let mut state = started(&api);

        run_to_completion(&mut state, &env).await;

        assert_eq!(state.status, AllocationStatus::Completed);
        assert_eq!(api.allocation_calls(), 3);
        assert_eq!(state.attempted, 3);
        assert_eq!(state.successful.len() + state.failed.len(), 3);
        assert_eq!(state.successful.flights[0].target.reference(), "FB");
        assert!(!state.is_clean());
    }

    #[tokio::test]
    async fn test_same_hotel_on_two_days_fails_separately() {
        let mut itinerary = two_flight_itinerary();
        let mut second_stay = itinerary.cities[0].days[0].clone();
        second_stay.date = date(2025, 3, 4);
        second_stay.flights.clear();
        itinerary.cities[1].days.insert(0, second_stay);

        let api = Arc::new(ScriptedTravelApi::new().fail_hotel_allocation("H1", "Room sold out", None));
        let env = environment(api.clone());
        let mut state = AllocationState::default();
        let _ = AllocatorReducer.reduce(
            &mut state,
            AllocationAction::Start {
                booking_id: "b-1".into(),
                tokens: Tokens::new("itn-1", "inq-1"),
                itinerary: itinerary.clone(),
                rooms: vec![room(1, vec![complete_traveler("Asha")])],
            },
            &env,
        );
        run_to_completion(&mut state, &env).await;

        assert_eq!(api.allocation_calls(), 4);
        assert_eq!(state.successful.len() + state.failed.len(), 4);
        let failed: Vec<AllocationKey> = state.failed.iter().map(FailedAllocation::key).collect();
        assert_eq!(failed, vec![h1(), AllocationKey::hotel("H1", "Rome", date(2025, 3, 4))]);

        let effects = AllocatorReducer.reduce(&mut state, AllocationAction::AllocatePending(itinerary), &env);
        assertions::assert_no_effects(&effects);
        assert_eq!(api.allocation_calls(), 4);
    }

    #[tokio::test]
    async fn test_expired_flight_is_classified_for_replacement() {
        let api = Arc::new(ScriptedTravelApi::new().fail_flight_allocation(
            "FB",
            "Fare not available",
            Some(FLIGHT_EXPIRED_CODE),
        ));
        let env = environment(api.clone());
        let mut state = started(&api);

        run_to_completion(&mut state, &env).await;

        assert_eq!(state.failed.len(), 1);
        let failure = &state.failed[0];
        assert_eq!(failure.key(), fb());
        assert_eq!(failure.reason, FailureReason::FlightExpired);
        assert_eq!(failure.remediation(), Remediation::Replace);
        assert!(failure.user_message().contains("no longer available"));
    }

    #[test]
    fn test_hotel_code_six_is_not_expiry() {
        let failure = FailedAllocation::new(
            allocation_targets(&two_flight_itinerary()).remove(1),
            ApiFailure::message("nope").with_code("6"),
        );
        assert_eq!(failure.reason, FailureReason::Provider);
        assert_eq!(failure.remediation(), Remediation::RetryOrReplace);
    }

    #[tokio::test]
    async fn test_manual_retry_reallocates_only_that_item() {
        let api = Arc::new(ScriptedTravelApi::new().fail_hotel_allocation("H1", "Timeout", None));
        let env = environment(api.clone());
        let mut state = started(&api);
        run_to_completion(&mut state, &env).await;
        assert_eq!(state.failed.len(), 1);

        api.clear_allocation_failures();
        let effects =
            AllocatorReducer.reduce(&mut state, AllocationAction::RetryFailed(h1()), &env);
        let mut pending = assertions::resolve(effects).await;
        while let Some(action) = pending.pop() {
            let effects = AllocatorReducer.reduce(&mut state, action, &env);
            pending.extend(assertions::resolve(effects).await);
        }

        assert!(state.is_clean());
        assert_eq!(api.allocation_calls(), 4);
        assert_eq!(state.successful.hotels.len(), 1);
        assert_eq!(state.retries.attempts(&h1()), 1);
    }

    #[tokio::test]
    async fn test_retry_refused_for_expired_flight() {
        let api = Arc::new(ScriptedTravelApi::new().fail_flight_allocation("FA", "gone", Some("6")));
        let env = environment(api.clone());
        let mut state = started(&api);
        run_to_completion(&mut state, &env).await;

        let effects =
            AllocatorReducer.reduce(&mut state, AllocationAction::RetryFailed(fa()), &env);

        assertions::assert_no_effects(&effects);
        assert!(state.notice.as_deref().unwrap().contains("must be replaced"));
        assert_eq!(state.status, AllocationStatus::Completed);
    }

    #[tokio::test]
    async fn test_replacement_removes_exactly_one_failure() {
        let api = Arc::new(
            ScriptedTravelApi::new()
                .fail_flight_allocation("FA", "gone", Some("6"))
                .fail_flight_allocation("FB", "gone", Some("6"))
                .with_flight_options(vec![Flight {
                    flight_code: "FB2".into(),
                    price: 5200.0,
                    ..Flight::default()
                }]),
        );
        let env = environment(api.clone());
        let mut state = started(&api);
        run_to_completion(&mut state, &env).await;
        assert_eq!(state.failed.len(), 2);
        let successes_before = state.successful.clone();

        let effects = AllocatorReducer.reduce(
            &mut state,
            AllocationAction::RequestReplacement(fb()),
            &env,
        );
        for action in assertions::resolve(effects).await {
            let _ = AllocatorReducer.reduce(&mut state, action, &env);
        }
        assert_eq!(
            state.replacement.as_ref().map(|r| r.status.clone()),
            Some(ReplacementStatus::Choosing)
        );

        let effects =
            AllocatorReducer.reduce(&mut state, AllocationAction::ChooseReplacement { index: 0 }, &env);
        for action in assertions::resolve(effects).await {
            let _ = AllocatorReducer.reduce(&mut state, action, &env);
        }

        assert_eq!(state.failed.len(), 1);
        assert_eq!(state.failed[0].key(), fa());
        assert_eq!(state.successful, successes_before);
        assert!(state.replacement.is_none());
        assert!(state.needs_itinerary_refresh);
        assert_eq!(api.replaced_flights(), vec!["FB2".to_string()]);
    }

    #[tokio::test]
    async fn test_refreshed_itinerary_allocates_only_the_replacement() {
        let api = Arc::new(ScriptedTravelApi::new().fail_flight_allocation("FB", "gone", Some("6")));
        let env = environment(api.clone());
        let mut state = started(&api);
        run_to_completion(&mut state, &env).await;
        state.remove_failure(&fb());
        state.needs_itinerary_refresh = true;

        let mut refreshed = two_flight_itinerary();
        refreshed.cities[1].days[0].flights[0].flight_code = "FB2".into();
        let effects = AllocatorReducer.reduce(&mut state, AllocationAction::AllocatePending(refreshed), &env);
        let mut pending = assertions::resolve(effects).await;
        while let Some(action) = pending.pop() {
            let effects = AllocatorReducer.reduce(&mut state, action, &env);
            pending.extend(assertions::resolve(effects).await);
        }

        assert!(state.is_clean());
        assert!(!state.needs_itinerary_refresh);
        assert_eq!(api.allocation_calls(), 4);
        assert!(state.successful.contains(&AllocationKey::flight("FB2", "Rome", date(2025, 3, 6))));
    }

    #[tokio::test]
    async fn test_failed_search_keeps_failure_and_allows_cancel() {
        let api = Arc::new(
            ScriptedTravelApi::new()
                .fail_hotel_allocation("H1", "sold out", None)
                .fail_searches("search backend down"),
        );
        let env = environment(api.clone());
        let mut state = started(&api);
        run_to_completion(&mut state, &env).await;

        let effects = AllocatorReducer.reduce(
            &mut state,
            AllocationAction::RequestReplacement(h1()),
            &env,
        );
        for action in assertions::resolve(effects).await {
            let _ = AllocatorReducer.reduce(&mut state, action, &env);
        }

        assert!(matches!(
            state.replacement.as_ref().map(|r| &r.status),
            Some(ReplacementStatus::Failed(_))
        ));
        assert_eq!(state.failed.len(), 1);

        let _ = AllocatorReducer.reduce(&mut state, AllocationAction::CancelReplacement, &env);
        assert!(state.replacement.is_none());
    }
}
