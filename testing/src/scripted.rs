//! In-memory travel backend with scripted answers
//!
//! Every call is recorded. By default every call succeeds: allocations and
//! bookings return an empty receipt and rechecks quote the itinerary's own
//! prices. Builders script failures, price moves and search results.

use std::collections::HashMap;
use std::future::ready;
use std::sync::{Mutex, PoisonError};
use tripflow_api::{
    ApiError, ApiFuture, BookingId, BookingRecord, BookingStatusUpdate, CreateBookingRequest,
    Flight, FlightAllocationRequest, FlightSearchRequest, Hotel, HotelAllocationRequest,
    HotelSearchRequest, Itinerary, ItineraryToken, PriceQuery, PriceQuote, Receipt,
    RecheckFlightsRequest, RecheckHotelsRequest, ReplaceFlightRequest, ReplaceHotelRequest,
    ResourceBooking, ResourceKind, TravelApi,
};

/// A call received by [`ScriptedTravelApi`]
#[derive(Clone, Debug, PartialEq)]
pub enum ApiCall {
    /// `get_itinerary`
    GetItinerary(ItineraryToken),
    /// `create_booking`
    CreateBooking(CreateBookingRequest),
    /// `allocate_flight`
    AllocateFlight {
        /// Booking the guests are allocated to
        booking_id: BookingId,
        /// Flight code
        flight_code: String,
    },
    /// `allocate_hotel`
    AllocateHotel {
        /// Booking the guests are allocated to
        booking_id: BookingId,
        /// Hotel id
        hotel_id: String,
    },
    /// `recheck_flights`
    RecheckFlights(Vec<PriceQuery>),
    /// `recheck_hotels`
    RecheckHotels(Vec<PriceQuery>),
    /// `search_flights`
    SearchFlights(FlightSearchRequest),
    /// `search_hotels`
    SearchHotels(HotelSearchRequest),
    /// `replace_flight`
    ReplaceFlight(ReplaceFlightRequest),
    /// `replace_hotel`
    ReplaceHotel(ReplaceHotelRequest),
    /// `book_resource`
    BookResource {
        /// Final booking id
        booking_id: BookingId,
        /// Resource payload
        booking: ResourceBooking,
    },
    /// `update_booking_status`
    UpdateBookingStatus(BookingStatusUpdate),
}

impl ApiCall {
    /// Whether this call is a guest allocation
    #[must_use]
    pub const fn is_allocation(&self) -> bool {
        matches!(self, Self::AllocateFlight { .. } | Self::AllocateHotel { .. })
    }

    /// Whether this call is a price recheck
    #[must_use]
    pub const fn is_recheck(&self) -> bool {
        matches!(self, Self::RecheckFlights(_) | Self::RecheckHotels(_))
    }
}

#[derive(Clone, Debug)]
struct ScriptedFailure {
    message: String,
    code: Option<String>,
}

impl ScriptedFailure {
    fn new(message: &str, code: Option<&str>) -> Self {
        Self {
            message: message.to_string(),
            code: code.map(str::to_string),
        }
    }

    fn to_error(&self) -> ApiError {
        ApiError::Rejected {
            message: self.message.clone(),
            code: self.code.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    itinerary: Option<Itinerary>,
    flight_allocation_failures: HashMap<String, ScriptedFailure>,
    hotel_allocation_failures: HashMap<String, ScriptedFailure>,
    prices: HashMap<String, f64>,
    recheck_failures: HashMap<ResourceKind, ScriptedFailure>,
    flight_options: Vec<Flight>,
    hotel_options: Vec<Hotel>,
    search_failure: Option<ScriptedFailure>,
    replace_failure: Option<ScriptedFailure>,
    booking_rejection: Option<ScriptedFailure>,
    resource_failures: HashMap<String, ScriptedFailure>,
}

impl Script {
    fn original_price(&self, itinerary_code: &str) -> f64 {
        let Some(itinerary) = &self.itinerary else {
            return 0.0;
        };
        itinerary
            .flights()
            .find(|f| f.itinerary_code == itinerary_code)
            .map(|f| f.price)
            .or_else(|| {
                itinerary
                    .hotels()
                    .find(|h| h.itinerary_code == itinerary_code)
                    .map(|h| h.price)
            })
            .unwrap_or(0.0)
    }

    fn quotes(&self, kind: ResourceKind, queries: &[PriceQuery]) -> Result<Vec<PriceQuote>, ApiError> {
        if let Some(failure) = self.recheck_failures.get(&kind) {
            return Err(failure.to_error());
        }
        Ok(queries
            .iter()
            .map(|query| {
                let original = self.original_price(&query.itinerary_code);
                PriceQuote {
                    itinerary_code: query.itinerary_code.clone(),
                    new_price: self
                        .prices
                        .get(&query.itinerary_code)
                        .copied()
                        .unwrap_or(original),
                    original_price: Some(original),
                }
            })
            .collect())
    }
}

/// Scripted [`TravelApi`] for workflow tests
#[derive(Debug, Default)]
pub struct ScriptedTravelApi {
    script: Mutex<Script>,
    calls: Mutex<Vec<ApiCall>>,
}

impl ScriptedTravelApi {
    /// Backend where every call succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn scripted(mut self, edit: impl FnOnce(&mut Script)) -> Self {
        edit(self.script.get_mut().unwrap_or_else(PoisonError::into_inner));
        self
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ApiCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Itinerary returned by `get_itinerary`; also the source of default recheck prices
    #[must_use]
    pub fn with_itinerary(self, itinerary: Itinerary) -> Self {
        self.scripted(|s| s.itinerary = Some(itinerary))
    }

    /// Allocation of the flight with `flight_code` fails
    #[must_use]
    pub fn fail_flight_allocation(self, flight_code: &str, message: &str, code: Option<&str>) -> Self {
        self.scripted(|s| {
            s.flight_allocation_failures
                .insert(flight_code.to_string(), ScriptedFailure::new(message, code));
        })
    }

    /// Allocation of the hotel with `hotel_id` fails
    #[must_use]
    pub fn fail_hotel_allocation(self, hotel_id: &str, message: &str, code: Option<&str>) -> Self {
        self.scripted(|s| {
            s.hotel_allocation_failures
                .insert(hotel_id.to_string(), ScriptedFailure::new(message, code));
        })
    }

    /// Recheck quotes `new_price` for `itinerary_code`
    #[must_use]
    pub fn with_price(self, itinerary_code: &str, new_price: f64) -> Self {
        self.scripted(|s| {
            s.prices.insert(itinerary_code.to_string(), new_price);
        })
    }

    /// Recheck of one resource kind fails
    #[must_use]
    pub fn fail_recheck(self, kind: ResourceKind, message: &str) -> Self {
        self.scripted(|s| {
            s.recheck_failures.insert(kind, ScriptedFailure::new(message, None));
        })
    }

    /// Flights returned by `search_flights`
    #[must_use]
    pub fn with_flight_options(self, flights: Vec<Flight>) -> Self {
        self.scripted(|s| s.flight_options = flights)
    }

    /// Hotels returned by `search_hotels`
    #[must_use]
    pub fn with_hotel_options(self, hotels: Vec<Hotel>) -> Self {
        self.scripted(|s| s.hotel_options = hotels)
    }

    /// Both searches fail
    #[must_use]
    pub fn fail_searches(self, message: &str) -> Self {
        self.scripted(|s| s.search_failure = Some(ScriptedFailure::new(message, None)))
    }

    /// Both replace calls fail
    #[must_use]
    pub fn fail_replacements(self, message: &str) -> Self {
        self.scripted(|s| s.replace_failure = Some(ScriptedFailure::new(message, None)))
    }

    /// `create_booking` answers `success: false`
    #[must_use]
    pub fn reject_bookings(self, message: &str, code: Option<&str>) -> Self {
        self.scripted(|s| s.booking_rejection = Some(ScriptedFailure::new(message, code)))
    }

    /// `book_resource` fails for the resource with this reference
    #[must_use]
    pub fn fail_resource_booking(self, reference: &str, message: &str) -> Self {
        self.scripted(|s| {
            s.resource_failures
                .insert(reference.to_string(), ScriptedFailure::new(message, None));
        })
    }

    /// Let every later allocation succeed
    pub fn clear_allocation_failures(&self) {
        let mut script = self.script();
        script.flight_allocation_failures.clear();
        script.hotel_allocation_failures.clear();
    }

    /// Let every later recheck succeed
    pub fn clear_recheck_failures(&self) {
        self.script().recheck_failures.clear();
    }

    /// Every call received so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls matching `predicate`
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    /// Number of allocation calls
    #[must_use]
    pub fn allocation_calls(&self) -> usize {
        self.count(ApiCall::is_allocation)
    }

    /// Number of recheck calls
    #[must_use]
    pub fn recheck_calls(&self) -> usize {
        self.count(ApiCall::is_recheck)
    }

    /// Every `create_booking` request, in order
    #[must_use]
    pub fn created_bookings(&self) -> Vec<CreateBookingRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::CreateBooking(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Flight codes written by `replace_flight`
    #[must_use]
    pub fn replaced_flights(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::ReplaceFlight(request) => Some(request.new_flight_details.flight_code),
                _ => None,
            })
            .collect()
    }

    /// Status updates sent, in order
    #[must_use]
    pub fn status_updates(&self) -> Vec<BookingStatusUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::UpdateBookingStatus(update) => Some(update),
                _ => None,
            })
            .collect()
    }
}

fn settle<T: Send + 'static>(result: Result<T, ApiError>) -> ApiFuture<'static, T> {
    Box::pin(ready(result))
}

impl TravelApi for ScriptedTravelApi {
    fn get_itinerary(&self, token: ItineraryToken) -> ApiFuture<'_, Itinerary> {
        self.record(ApiCall::GetItinerary(token));
        settle(self.script().itinerary.clone().ok_or(ApiError::MissingData {
            context: "get itinerary",
        }))
    }

    fn create_booking(&self, request: CreateBookingRequest) -> ApiFuture<'_, BookingRecord> {
        let booking_id = request.booking_id.clone();
        self.record(ApiCall::CreateBooking(request));
        settle(match &self.script().booking_rejection {
            Some(failure) => Err(failure.to_error()),
            None => Ok(BookingRecord {
                booking_id: Some(booking_id),
                status: Some("pending".to_string()),
            }),
        })
    }

    fn allocate_flight(
        &self,
        booking_id: BookingId,
        request: FlightAllocationRequest,
    ) -> ApiFuture<'_, Receipt> {
        let failure = self
            .script()
            .flight_allocation_failures
            .get(&request.flight_code)
            .map(ScriptedFailure::to_error);
        self.record(ApiCall::AllocateFlight {
            booking_id,
            flight_code: request.flight_code,
        });
        settle(failure.map_or(Ok(Receipt::Null), Err))
    }

    fn allocate_hotel(
        &self,
        booking_id: BookingId,
        request: HotelAllocationRequest,
    ) -> ApiFuture<'_, Receipt> {
        let failure = self
            .script()
            .hotel_allocation_failures
            .get(&request.hotel_id)
            .map(ScriptedFailure::to_error);
        self.record(ApiCall::AllocateHotel {
            booking_id,
            hotel_id: request.hotel_id,
        });
        settle(failure.map_or(Ok(Receipt::Null), Err))
    }

    fn recheck_flights(
        &self,
        _token: ItineraryToken,
        request: RecheckFlightsRequest,
    ) -> ApiFuture<'_, Vec<PriceQuote>> {
        let result = self.script().quotes(ResourceKind::Flight, &request.flight_queries);
        self.record(ApiCall::RecheckFlights(request.flight_queries));
        settle(result)
    }

    fn recheck_hotels(
        &self,
        _token: ItineraryToken,
        request: RecheckHotelsRequest,
    ) -> ApiFuture<'_, Vec<PriceQuote>> {
        let result = self.script().quotes(ResourceKind::Hotel, &request.hotel_queries);
        self.record(ApiCall::RecheckHotels(request.hotel_queries));
        settle(result)
    }

    fn search_flights(&self, request: FlightSearchRequest) -> ApiFuture<'_, Vec<Flight>> {
        self.record(ApiCall::SearchFlights(request));
        let script = self.script();
        settle(match &script.search_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(script.flight_options.clone()),
        })
    }

    fn search_hotels(&self, request: HotelSearchRequest) -> ApiFuture<'_, Vec<Hotel>> {
        self.record(ApiCall::SearchHotels(request));
        let script = self.script();
        settle(match &script.search_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(script.hotel_options.clone()),
        })
    }

    fn replace_flight(
        &self,
        _token: ItineraryToken,
        request: ReplaceFlightRequest,
    ) -> ApiFuture<'_, Receipt> {
        self.record(ApiCall::ReplaceFlight(request));
        settle(self.script().replace_failure.as_ref().map_or(Ok(Receipt::Null), |f| Err(f.to_error())))
    }

    fn replace_hotel(
        &self,
        _token: ItineraryToken,
        request: ReplaceHotelRequest,
    ) -> ApiFuture<'_, Receipt> {
        self.record(ApiCall::ReplaceHotel(request));
        settle(self.script().replace_failure.as_ref().map_or(Ok(Receipt::Null), |f| Err(f.to_error())))
    }

    fn book_resource(
        &self,
        booking_id: BookingId,
        booking: ResourceBooking,
    ) -> ApiFuture<'_, Receipt> {
        let failure = self
            .script()
            .resource_failures
            .get(booking.reference())
            .map(ScriptedFailure::to_error);
        self.record(ApiCall::BookResource { booking_id, booking });
        settle(failure.map_or(Ok(Receipt::Null), Err))
    }

    fn update_booking_status(
        &self,
        _token: ItineraryToken,
        update: BookingStatusUpdate,
    ) -> ApiFuture<'_, Receipt> {
        self.record(ApiCall::UpdateBookingStatus(update));
        settle(Ok(Receipt::Null))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tripflow_api::{CityPlan, DayPlan};

    fn itinerary() -> Itinerary {
        Itinerary {
            cities: vec![CityPlan {
                days: vec![DayPlan {
                    flights: vec![Flight {
                        flight_code: "AF1".into(),
                        itinerary_code: "IC-F".into(),
                        price: 5000.0,
                        ..Flight::default()
                    }],
                    ..DayPlan::default()
                }],
                ..CityPlan::default()
            }],
            ..Itinerary::default()
        }
    }

    #[tokio::test]
    async fn test_recheck_defaults_to_itinerary_price() {
        let api = ScriptedTravelApi::new().with_itinerary(itinerary());
        let quotes = api
            .recheck_flights(
                "itn".into(),
                RecheckFlightsRequest {
                    flight_queries: vec![PriceQuery {
                        itinerary_code: "IC-F".into(),
                        trace_id: String::new(),
                    }],
                },
            )
            .await
            .unwrap();

        assert_eq!(quotes[0].new_price, 5000.0);
        assert_eq!(api.recheck_calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_allocation_failure_carries_code() {
        let api = ScriptedTravelApi::new().fail_flight_allocation("AF1", "Fare gone", Some("6"));
        let request = FlightAllocationRequest {
            flight_code: "AF1".into(),
            ..FlightAllocationRequest::default()
        };

        let error = api.allocate_flight("b-1".into(), request).await.unwrap_err();
        assert_eq!(error.code(), Some("6"));

        api.clear_allocation_failures();
        let request = FlightAllocationRequest {
            flight_code: "AF1".into(),
            ..FlightAllocationRequest::default()
        };
        assert!(api.allocate_flight("b-1".into(), request).await.is_ok());
        assert_eq!(api.allocation_calls(), 2);
    }
}
