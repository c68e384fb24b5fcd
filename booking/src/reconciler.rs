//! Price reconciliation: recheck every flight and hotel before the commit
//!
//! Flights and hotels are checked concurrently, each type one item at a time.
//! A failed recheck keeps the original price and the loop moves on. When both
//! types are done the [`PriceSummary`] is built and waits for the user's
//! confirmation.

use serde::{Deserialize, Serialize};
use tripflow_api::{
    ApiError, Itinerary, PriceQuery, PriceQuote, RecheckFlightsRequest, RecheckHotelsRequest,
    ResourceKind,
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
use crate::pricing::{PriceChange, PriceSummary};
use crate::types::{ApiFailure, Tokens};

/// One flight or hotel whose price is rechecked
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceCheckItem {
    /// Flight or hotel
    pub kind: ResourceKind,
    /// Flight code or hotel id
    pub reference: String,
    /// Item code inside the itinerary
    pub itinerary_code: String,
    /// Provider search trace
    pub trace_id: String,
    /// Name shown in progress output
    pub label: String,
    /// Price captured from the itinerary
    pub original_price: f64,
}

impl PriceCheckItem {
    fn query(&self) -> PriceQuery {
        PriceQuery {
            itinerary_code: self.itinerary_code.clone(),
            trace_id: self.trace_id.clone(),
        }
    }
}

/// Items of one type in travel order
#[must_use]
pub fn price_check_items(itinerary: &Itinerary, kind: ResourceKind) -> Vec<PriceCheckItem> {
    match kind {
        ResourceKind::Flight => itinerary
            .flights()
            .map(|flight| PriceCheckItem {
                kind,
                reference: flight.flight_code.clone(),
                itinerary_code: flight.itinerary_code.clone(),
                trace_id: flight.trace_id.clone(),
                label: format!("{} {} → {}", flight.flight_code, flight.origin, flight.destination),
                original_price: flight.price,
            })
            .collect(),
        ResourceKind::Hotel => itinerary
            .hotels()
            .map(|hotel| PriceCheckItem {
                kind,
                reference: hotel.hotel_id.clone(),
                itinerary_code: hotel.itinerary_code.clone(),
                trace_id: hotel.trace_id.clone(),
                label: hotel.name.clone(),
                original_price: hotel.price,
            })
            .collect(),
        ResourceKind::Activity | ResourceKind::Transfer => Vec::new(),
    }
}

/// Quote for `item` among the answers
///
/// A quote with the item's itinerary code wins. A lone quote answers the
/// single-item query it was sent for; among several unmatched quotes none
/// belongs to the item.
fn matching_quote<'a>(item: &PriceCheckItem, quotes: &'a [PriceQuote]) -> Option<&'a PriceQuote> {
    match quotes {
        [only] => Some(only),
        _ => quotes
            .iter()
            .find(|quote| quote.itinerary_code == item.itinerary_code),
    }
}

/// Outcome of rechecking one item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemPriceResult {
    /// The item
    pub item: PriceCheckItem,
    /// Original and new price
    pub change: PriceChange,
    /// Recheck error; the new price then equals the original
    pub error: Option<ApiFailure>,
}

/// Progress of one type's loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    /// Not started
    #[default]
    Idle,
    /// Items are being rechecked
    Running,
    /// Every item has a result
    Done,
}

/// Recheck loop of one resource type
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeCheck {
    /// Items not yet rechecked
    pub queue: SequentialQueue<PriceCheckItem>,
    /// Item being rechecked
    pub current: Option<ProgressEvent<PriceCheckItem>>,
    /// Results so far, in order
    pub results: Vec<ItemPriceResult>,
    /// Loop progress
    pub status: CheckStatus,
}

impl TypeCheck {
    fn start(items: Vec<PriceCheckItem>) -> Self {
        Self {
            queue: SequentialQueue::new(items),
            status: CheckStatus::Running,
            ..Self::default()
        }
    }

    /// Whether the loop is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == CheckStatus::Running
    }

    /// Items whose recheck failed
    pub fn failures(&self) -> impl Iterator<Item = &ItemPriceResult> {
        self.results.iter().filter(|result| result.error.is_some())
    }
}

/// State of the price check stage
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceCheckState {
    /// Session tokens
    pub tokens: Tokens,
    /// Itinerary snapshot being checked
    pub itinerary: Option<Itinerary>,
    /// Flight loop
    pub flights: TypeCheck,
    /// Hotel loop
    pub hotels: TypeCheck,
    /// Summary, once both loops are done
    pub summary: Option<PriceSummary>,
    /// User accepted the summary
    pub confirmed: bool,
    /// Manual retries per type
    pub retries: RetryLedger<ResourceKind>,
    /// Last message for the user about a rejected request
    pub notice: Option<String>,
}

impl PriceCheckState {
    /// Loop of `kind`; activities and transfers share the hotel slot and are never started
    #[must_use]
    pub const fn check(&self, kind: ResourceKind) -> &TypeCheck {
        match kind {
            ResourceKind::Flight => &self.flights,
            _ => &self.hotels,
        }
    }

    fn check_mut(&mut self, kind: ResourceKind) -> &mut TypeCheck {
        match kind {
            ResourceKind::Flight => &mut self.flights,
            _ => &mut self.hotels,
        }
    }

    /// Whether the summary has been built
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.summary.is_some()
    }

    fn refuse(&mut self, notice: impl Into<String>) -> SmallVec<[Effect<PriceCheckAction>; 4]> {
        let notice = notice.into();
        tracing::warn!(%notice, "Price check request refused");
        self.notice = Some(notice);
        smallvec![Effect::None]
    }
}

/// Inputs of the price check stage
#[derive(Clone, Debug, PartialEq)]
pub enum PriceCheckAction {
    /// Recheck every flight and hotel of the itinerary
    Start {
        /// Session tokens
        tokens: Tokens,
        /// Itinerary snapshot
        itinerary: Itinerary,
    },
    /// Take the next item of one type off its queue
    CheckNext(ResourceKind),
    /// An item is about to be rechecked
    ItemStarted(ProgressEvent<PriceCheckItem>),
    /// The backend quoted a price
    ItemPriced {
        /// The item and its position
        progress: ProgressEvent<PriceCheckItem>,
        /// Quoted price
        new_price: f64,
    },
    /// The recheck failed
    ItemFailed {
        /// The item and its position
        progress: ProgressEvent<PriceCheckItem>,
        /// What went wrong
        error: ApiFailure,
    },
    /// Both types are done
    SummaryReady(PriceSummary),
    /// User asks to recheck one type again
    Retry(ResourceKind),
    /// User accepts the summary
    Confirm,
}

fn price_outcome(
    progress: ProgressEvent<PriceCheckItem>,
    result: Result<Vec<PriceQuote>, ApiError>,
) -> PriceCheckAction {
    match result {
        Ok(quotes) => match matching_quote(&progress.item, &quotes) {
            Some(quote) => PriceCheckAction::ItemPriced {
                new_price: quote.new_price,
                progress,
            },
            None => PriceCheckAction::ItemFailed {
                error: ApiFailure::message(format!("No price for {}", progress.item.itinerary_code)),
                progress,
            },
        },
        Err(error) => PriceCheckAction::ItemFailed {
            progress,
            error: error.into(),
        },
    }
}

/// Reducer of the price check stage
#[derive(Clone, Copy, Debug, Default)]
pub struct PriceCheckReducer;

impl PriceCheckReducer {
    fn recheck(
        state: &PriceCheckState,
        env: &BookingEnvironment,
        progress: ProgressEvent<PriceCheckItem>,
    ) -> Effect<PriceCheckAction> {
        let api = env.api.clone();
        let token = state.tokens.itinerary.clone();
        let query = progress.item.query();

        if progress.item.kind == ResourceKind::Flight {
            let request = RecheckFlightsRequest {
                flight_queries: vec![query],
            };
            async_effect! {
                let result = api.recheck_flights(token, request).await;
                Some(price_outcome(progress, result))
            }
        } else {
            let request = RecheckHotelsRequest {
                hotel_queries: vec![query],
            };
            async_effect! {
                let result = api.recheck_hotels(token, request).await;
                Some(price_outcome(progress, result))
            }
        }
    }

    fn record(
        state: &mut PriceCheckState,
        progress: ProgressEvent<PriceCheckItem>,
        change: PriceChange,
        error: Option<ApiFailure>,
    ) -> SmallVec<[Effect<PriceCheckAction>; 4]> {
        let kind = progress.item.kind;
        let check = state.check_mut(kind);
        if !check.queue.complete_current() {
            tracing::warn!(reference = %progress.item.reference, "Ignoring stale price result");
            return smallvec![Effect::None];
        }

        check.current = None;
        check.results.push(ItemPriceResult {
            item: progress.item,
            change,
            error,
        });
        smallvec![dispatch!(PriceCheckAction::CheckNext(kind))]
    }
}

impl Reducer for PriceCheckReducer {
    type State = PriceCheckState;
    type Action = PriceCheckAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut PriceCheckState,
        action: PriceCheckAction,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<PriceCheckAction>; 4]> {
        match action {
            PriceCheckAction::Start { tokens, itinerary } => {
                if state.flights.is_running() || state.hotels.is_running() {
                    return state.refuse("Price check is already running");
                }

                let flights = price_check_items(&itinerary, ResourceKind::Flight);
                let hotels = price_check_items(&itinerary, ResourceKind::Hotel);
                tracing::info!(
                    itinerary = %tokens.itinerary,
                    flights = flights.len(),
                    hotels = hotels.len(),
                    "Starting price check"
                );

                *state = PriceCheckState {
                    tokens,
                    itinerary: Some(itinerary),
                    flights: TypeCheck::start(flights),
                    hotels: TypeCheck::start(hotels),
                    retries: RetryLedger::new(env.retry),
                    ..PriceCheckState::default()
                };
                smallvec![Effect::Parallel(vec![
                    dispatch!(PriceCheckAction::CheckNext(ResourceKind::Flight)),
                    dispatch!(PriceCheckAction::CheckNext(ResourceKind::Hotel)),
                ])]
            },

            PriceCheckAction::CheckNext(kind) => {
                let check = state.check_mut(kind);
                if !check.is_running() {
                    return smallvec![Effect::None];
                }
                if let Some(progress) = check.queue.advance() {
                    return smallvec![dispatch!(PriceCheckAction::ItemStarted(progress))];
                }
                if check.queue.in_flight() {
                    return smallvec![Effect::None];
                }

                check.status = CheckStatus::Done;
                tracing::info!(%kind, failures = check.failures().count(), "Price check of type finished");

                if state.flights.status != CheckStatus::Done || state.hotels.status != CheckStatus::Done {
                    return smallvec![Effect::None];
                }
                let Some(itinerary) = &state.itinerary else {
                    return smallvec![Effect::None];
                };

                let summary = PriceSummary::build(
                    itinerary,
                    state.flights.results.iter().map(|r| &r.change),
                    state.hotels.results.iter().map(|r| &r.change),
                );
                tracing::info!(
                    original = summary.original_totals.total,
                    new = summary.new_totals.total,
                    difference = summary.difference,
                    changed = summary.has_price_changed,
                    "Price summary ready"
                );
                state.summary = Some(summary);
                smallvec![dispatch!(PriceCheckAction::SummaryReady(summary))]
            },

            PriceCheckAction::ItemStarted(progress) => {
                tracing::info!(
                    kind = %progress.item.kind,
                    reference = %progress.item.reference,
                    current = progress.current,
                    total = progress.total,
                    "Rechecking price"
                );
                state.check_mut(progress.item.kind).current = Some(progress.clone());
                smallvec![Self::recheck(state, env, progress)]
            },

            PriceCheckAction::ItemPriced { progress, new_price } => {
                let change = PriceChange::compute(progress.item.original_price, new_price);
                if change.has_changed() {
                    metrics::counter!("booking.price_changes").increment(1);
                }
                Self::record(state, progress, change, None)
            },

            PriceCheckAction::ItemFailed { progress, error } => {
                tracing::warn!(reference = %progress.item.reference, %error, "Price recheck failed");
                metrics::counter!("booking.price_check_failures").increment(1);
                let original = progress.item.original_price;
                Self::record(state, progress, PriceChange::compute(original, original), Some(error))
            },

            PriceCheckAction::SummaryReady(_) => smallvec![Effect::None],

            PriceCheckAction::Retry(kind) => {
                let status = state.check(kind).status;
                if status == CheckStatus::Running {
                    return state.refuse(format!("The {kind} price check is still running"));
                }
                if status == CheckStatus::Idle {
                    return state.refuse(format!("The {kind} price check has not run yet"));
                }
                if let Err(rejected) = state.retries.record_manual_retry(kind) {
                    return state.refuse(rejected.to_string());
                }

                let items = state
                    .itinerary
                    .as_ref()
                    .map(|itinerary| price_check_items(itinerary, kind))
                    .unwrap_or_default();
                tracing::info!(%kind, items = items.len(), "Retrying price check");

                *state.check_mut(kind) = TypeCheck::start(items);
                state.summary = None;
                state.confirmed = false;
                state.notice = None;
                smallvec![dispatch!(PriceCheckAction::CheckNext(kind))]
            },

            PriceCheckAction::Confirm => {
                let Some(summary) = state.summary else {
                    return state.refuse("Wait for the price check to finish before confirming");
                };
                tracing::info!(
                    changed = summary.has_price_changed,
                    difference = summary.difference,
                    "Prices confirmed"
                );
                state.confirmed = true;
                smallvec![Effect::None]
            },
        }
    }
}
