//! Request and response bodies of the booking endpoints

use crate::model::{BookingId, BookingStatus, Flight, Hotel, InquiryToken, ItineraryToken, ResourceKind, Room};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque acknowledgement data returned by mutation endpoints
pub type Receipt = serde_json::Value;

/// `POST /bookings`: pending booking, or the final commit when `items` is set
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    /// Client-generated booking id
    pub booking_id: BookingId,
    /// Itinerary being booked
    pub itinerary_token: ItineraryToken,
    /// Inquiry of the itinerary
    pub inquiry_token: InquiryToken,
    /// Rooms and their travelers
    pub rooms: Vec<Room>,
    /// Free-text requests for the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_requirements: Option<String>,
    /// Per-resource sub-bookings, final commit only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ResourceBooking>,
}

/// Booking record returned by `POST /bookings`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingRecord {
    /// Id the backend stored the booking under
    pub booking_id: Option<BookingId>,
    /// Backend status label
    pub status: Option<String>,
}

/// Passenger entry of a flight allocation or booking
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightPassenger {
    /// Title
    pub title: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// 1 for adult, 2 for child
    pub pax_type: u8,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Gender as entered
    pub gender: String,
    /// Passport number
    pub passport_no: String,
    /// Passport issue date
    pub passport_issue_date: Option<NaiveDate>,
    /// Passport expiry date
    pub passport_expiry: Option<NaiveDate>,
    /// Nationality
    pub nationality: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub contact_no: String,
    /// Address line 1
    pub address_line1: String,
    /// City of residence
    pub city: String,
    /// Room the passenger is assigned to
    pub room_number: u32,
    /// Whether this is the lead passenger of the booking
    pub is_lead_pax: bool,
    /// GST company name, adults only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gst_company_name: Option<String>,
    /// GST number, adults only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gst_number: Option<String>,
}

/// Traveler list shaped for the flight allocation endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightAllocationData {
    /// Every passenger across all rooms
    pub passengers: Vec<FlightPassenger>,
}

/// `POST /guest-allocation/:bookingId/allocate-flight`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightAllocationRequest {
    /// Passengers to allocate
    pub flight_data: FlightAllocationData,
    /// Flight being allocated
    pub flight_code: String,
    /// Provider result index
    pub result_index: String,
    /// Item code inside the itinerary
    pub itinerary_code: String,
}

/// Guest entry of a hotel allocation or booking
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelGuest {
    /// Title
    pub title: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// 1 for adult, 2 for child
    pub pax_type: u8,
    /// Age in whole years
    pub age: Option<u32>,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: String,
    /// PAN (tax id)
    pub pan: String,
    /// Passport number
    pub passport_no: String,
    /// Whether this guest leads the room
    pub lead_passenger: bool,
}

/// One room of a hotel allocation or booking
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelRoomGuests {
    /// 1-based room number
    pub room_number: u32,
    /// Adults in the room
    pub adults: u32,
    /// Children in the room
    pub children: u32,
    /// Ages of the children
    pub child_ages: Vec<u32>,
    /// Guests, lead first
    pub guests: Vec<HotelGuest>,
}

/// Rooms shaped for the hotel allocation endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelAllocationData {
    /// Rooms in order
    pub rooms: Vec<HotelRoomGuests>,
}

/// `POST /guest-allocation/:bookingId/allocate-hotel`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelAllocationRequest {
    /// Rooms to allocate
    pub hotel_data: HotelAllocationData,
    /// Static-content id of the hotel
    pub hotel_id: String,
    /// Item code inside the itinerary
    pub itinerary_code: String,
    /// Provider search trace
    pub trace_id: String,
}

/// One item of a price recheck
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuery {
    /// Item code inside the itinerary
    pub itinerary_code: String,
    /// Provider search trace
    pub trace_id: String,
}

/// `POST /itinerary/:token/recheck-flights`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecheckFlightsRequest {
    /// Flights to recheck
    pub flight_queries: Vec<PriceQuery>,
}

/// `POST /itinerary/:token/recheck-hotels`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecheckHotelsRequest {
    /// Hotels to recheck
    pub hotel_queries: Vec<PriceQuery>,
}

/// Current price of one rechecked item
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// Item code inside the itinerary
    #[serde(default)]
    pub itinerary_code: String,
    /// Price now offered by the provider
    pub new_price: f64,
    /// Price the backend has on record, if it reports one
    #[serde(default)]
    pub original_price: Option<f64>,
}

/// Adult and child counts of a search
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelerCounts {
    /// Adults
    pub adults: u32,
    /// Children
    pub children: u32,
    /// Ages of the children
    pub child_ages: Vec<u32>,
}

/// `POST /flights/search`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightSearchRequest {
    /// Origin of the trip
    pub departure_city: String,
    /// Destinations in order
    pub cities: Vec<String>,
    /// Who travels
    pub travelers: TravelerCounts,
    /// One departure date per destination
    pub departure_dates: Vec<NaiveDate>,
}

/// Which leg of the trip a flight covers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightLeg {
    /// From home to the first city
    Departure,
    /// Between two cities of the trip
    Intercity,
    /// From the last city back home
    Return,
}

/// `POST /itinerary/:token/replace-flight`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceFlightRequest {
    /// City whose day holds the flight
    pub city_name: String,
    /// Day of the flight
    pub date: NaiveDate,
    /// The chosen replacement
    pub new_flight_details: Flight,
    /// Leg the flight covers
    #[serde(rename = "type")]
    pub leg: FlightLeg,
}

/// Check-in and check-out of a hotel search
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StayDates {
    /// Check-in date
    pub check_in: NaiveDate,
    /// Check-out date
    pub check_out: NaiveDate,
}

/// `POST /hotels/search`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelSearchRequest {
    /// City to search in
    pub city: String,
    /// Country of the city
    pub country: String,
    /// Stay dates
    pub dates: StayDates,
    /// Occupancy per room
    pub travelers_details: Vec<TravelerCounts>,
}

/// `PUT /itinerary/:token/hotel`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceHotelRequest {
    /// City whose day holds the hotel
    pub city_name: String,
    /// Day of the check-in
    pub date: NaiveDate,
    /// The chosen replacement
    pub new_hotel_details: Hotel,
}

/// Lead contact of an activity or transfer booking
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadContact {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: String,
}

/// Booking payload of one flight
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightBooking {
    /// City whose day holds the flight
    pub city_name: String,
    /// Day of the flight
    pub date: NaiveDate,
    /// Flight code
    pub flight_code: String,
    /// Provider result index
    pub result_index: String,
    /// Provider search trace
    pub trace_id: String,
    /// Item code inside the itinerary
    pub itinerary_code: String,
    /// Passengers
    pub passengers: Vec<FlightPassenger>,
}

/// Booking payload of one hotel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelBooking {
    /// City whose day holds the hotel
    pub city_name: String,
    /// Day of the check-in
    pub date: NaiveDate,
    /// Static-content id
    pub hotel_id: String,
    /// Provider search trace
    pub trace_id: String,
    /// Item code inside the itinerary
    pub itinerary_code: String,
    /// Rooms and their guests
    pub rooms: Vec<HotelRoomGuests>,
}

/// Booking payload of one activity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBooking {
    /// City whose day holds the activity
    pub city_name: String,
    /// Day of the activity
    pub date: NaiveDate,
    /// Provider activity code
    pub activity_code: String,
    /// Lead traveler
    pub lead_traveler: LeadContact,
    /// Adults taking part
    pub adults: u32,
    /// Children taking part
    pub children: u32,
}

/// Booking payload of one transfer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBooking {
    /// City whose day holds the transfer
    pub city_name: String,
    /// Day of the transfer
    pub date: NaiveDate,
    /// Provider quotation
    pub quotation_id: String,
    /// Lead traveler
    pub lead_traveler: LeadContact,
    /// Number of passengers
    pub passengers: u32,
}

/// A sub-booking, discriminated by `type`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResourceBooking {
    /// Flight sub-booking
    Flight(FlightBooking),
    /// Hotel sub-booking
    Hotel(HotelBooking),
    /// Activity sub-booking
    Activity(ActivityBooking),
    /// Transfer sub-booking
    Transfer(TransferBooking),
}

impl ResourceBooking {
    /// Kind of the booked resource
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Flight(_) => ResourceKind::Flight,
            Self::Hotel(_) => ResourceKind::Hotel,
            Self::Activity(_) => ResourceKind::Activity,
            Self::Transfer(_) => ResourceKind::Transfer,
        }
    }

    /// City whose day holds the resource
    #[must_use]
    pub fn city_name(&self) -> &str {
        match self {
            Self::Flight(b) => &b.city_name,
            Self::Hotel(b) => &b.city_name,
            Self::Activity(b) => &b.city_name,
            Self::Transfer(b) => &b.city_name,
        }
    }

    /// Day of the resource
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        match self {
            Self::Flight(b) => b.date,
            Self::Hotel(b) => b.date,
            Self::Activity(b) => b.date,
            Self::Transfer(b) => b.date,
        }
    }

    /// Provider reference of the resource
    #[must_use]
    pub fn reference(&self) -> &str {
        match self {
            Self::Flight(b) => &b.flight_code,
            Self::Hotel(b) => &b.hotel_id,
            Self::Activity(b) => &b.activity_code,
            Self::Transfer(b) => &b.quotation_id,
        }
    }
}

/// `PUT /itinerary/:token/booking-status`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingStatusUpdate {
    /// Final booking id
    pub booking_id: BookingId,
    /// City whose day holds the resource
    pub city_name: String,
    /// Day of the resource
    pub date: NaiveDate,
    /// Kind of the resource
    pub booking_type: ResourceKind,
    /// Outcome of the booking call
    pub booking_status: BookingStatus,
    /// Provider reference of the resource
    pub reference: String,
}
