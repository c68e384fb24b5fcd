//! # Tripflow API
//!
//! Client for the travel backend the booking workflow runs against.
//!
//! Every endpoint answers with the envelope `{success, data?, message?, code?}`.
//! The client turns `success: false` and non-2xx answers into [`ApiError`]s
//! carrying the backend's message and provider error code.
//!
//! ## Example
//!
//! ```no_run
//! use tripflow_api::{ClientSettings, HttpTravelApi, TravelApi};
//!
//! # async fn example() -> Result<(), tripflow_api::ApiError> {
//! let api = HttpTravelApi::new(ClientSettings::new("token"))?;
//! let itinerary = api.get_itinerary("itn-123".into()).await?;
//!
//! for flight in itinerary.flights() {
//!     println!("{} {}", flight.flight_code, flight.price);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod model;
pub mod payloads;

// Re-export main types for convenience
pub use client::{ApiFuture, ClientSettings, HttpTravelApi, TravelApi};
pub use error::ApiError;
pub use model::{
    Activity, BookingId, BookingStatus, CityPlan, DayPlan, Envelope, Flight, GstDetails, Hotel,
    InquiryToken, Itinerary, ItineraryToken, ResourceKind, Room, Transfer, Traveler, TravelerType,
};
pub use payloads::{
    ActivityBooking, BookingRecord, BookingStatusUpdate, CreateBookingRequest, FlightAllocationData,
    FlightAllocationRequest, FlightBooking, FlightLeg, FlightPassenger, FlightSearchRequest,
    HotelAllocationData, HotelAllocationRequest, HotelBooking, HotelGuest, HotelRoomGuests,
    HotelSearchRequest, LeadContact, PriceQuery, PriceQuote, Receipt, RecheckFlightsRequest,
    RecheckHotelsRequest, ReplaceFlightRequest, ReplaceHotelRequest, ResourceBooking, StayDates,
    TransferBooking, TravelerCounts,
};
