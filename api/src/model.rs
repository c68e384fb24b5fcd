//! Wire model of the travel backend
//!
//! Field names follow the backend's camelCase JSON. Most fields default when
//! absent: the backend omits empty collections and optional details freely.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The raw identifier
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a booking record
    BookingId
);
string_id!(
    /// Opaque token of a server-side itinerary
    ItineraryToken
);
string_id!(
    /// Opaque token of the inquiry an itinerary belongs to
    InquiryToken
);

/// Response envelope shared by every endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Whether the call succeeded
    pub success: bool,
    /// Payload, present on most successful calls
    pub data: Option<T>,
    /// Human-readable message, set on failure
    #[serde(default)]
    pub message: Option<String>,
    /// Provider error code; the backend sends strings or numbers
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: Option<String>,
}

fn code_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCode {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(
        Option::<RawCode>::deserialize(deserializer)?.map(|raw| match raw {
            RawCode::Text(text) => text,
            RawCode::Integer(n) => n.to_string(),
            RawCode::Float(n) => n.to_string(),
        }),
    )
}

/// Kind of bookable resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Flight segment
    Flight,
    /// Hotel stay
    Hotel,
    /// Activity or tour
    Activity,
    /// Ground transfer
    Transfer,
}

impl ResourceKind {
    /// Path segment and wire name of this kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flight => "flight",
            Self::Hotel => "hotel",
            Self::Activity => "activity",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booking status of one itinerary resource
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Not booked yet
    #[default]
    Pending,
    /// Booking call in flight
    Loading,
    /// Provider confirmed the booking
    Confirmed,
    /// Booking call failed
    Failed,
}

/// An itinerary snapshot: cities, then days, then resources
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    /// Token of this itinerary
    #[serde(default)]
    pub itinerary_token: ItineraryToken,
    /// Inquiry the itinerary was built for
    #[serde(default)]
    pub inquiry_token: InquiryToken,
    /// Cities in travel order
    #[serde(default)]
    pub cities: Vec<CityPlan>,
}

impl Itinerary {
    /// Every day in travel order, paired with its city
    pub fn days(&self) -> impl Iterator<Item = (&CityPlan, &DayPlan)> {
        self.cities
            .iter()
            .flat_map(|city| city.days.iter().map(move |day| (city, day)))
    }

    /// Every flight in travel order
    pub fn flights(&self) -> impl Iterator<Item = &Flight> {
        self.days().flat_map(|(_, day)| day.flights.iter())
    }

    /// Every hotel in travel order
    pub fn hotels(&self) -> impl Iterator<Item = &Hotel> {
        self.days().flat_map(|(_, day)| day.hotels.iter())
    }

    /// Number of flights, hotels, activities and transfers
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.days()
            .map(|(_, day)| {
                day.flights.len() + day.hotels.len() + day.activities.len() + day.transfers.len()
            })
            .sum()
    }
}

/// One city of an itinerary
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityPlan {
    /// City name
    pub city: String,
    /// Country name
    #[serde(default)]
    pub country: String,
    /// First day in the city
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Last day in the city
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Days in order
    #[serde(default)]
    pub days: Vec<DayPlan>,
}

/// One day of a city stay and what is booked on it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlan {
    /// Calendar date
    pub date: NaiveDate,
    /// Flights departing this day
    #[serde(default)]
    pub flights: Vec<Flight>,
    /// Hotels checked into this day
    #[serde(default)]
    pub hotels: Vec<Hotel>,
    /// Transfers this day
    #[serde(default)]
    pub transfers: Vec<Transfer>,
    /// Activities this day
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// A flight offer held in an itinerary
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    /// Flight code, the key of allocation failures
    pub flight_code: String,
    /// Provider result index of the fare
    #[serde(default)]
    pub result_index: String,
    /// Provider search trace
    #[serde(default)]
    pub trace_id: String,
    /// Item code inside the itinerary
    #[serde(default)]
    pub itinerary_code: String,
    /// Departure city
    #[serde(default)]
    pub origin: String,
    /// Arrival city
    #[serde(default)]
    pub destination: String,
    /// Departure date
    #[serde(default)]
    pub departure_date: Option<NaiveDate>,
    /// Operating airline
    #[serde(default)]
    pub airline: Option<String>,
    /// Quoted price
    #[serde(default)]
    pub price: f64,
    /// Booking status of this flight
    #[serde(default)]
    pub booking_status: BookingStatus,
}

/// A hotel offer held in an itinerary
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    /// Static-content id, the key of allocation failures
    pub hotel_id: String,
    /// Hotel name
    #[serde(default)]
    pub name: String,
    /// City of the hotel
    #[serde(default)]
    pub city: String,
    /// Country of the hotel
    #[serde(default)]
    pub country: String,
    /// Check-in date
    #[serde(default)]
    pub check_in: Option<NaiveDate>,
    /// Check-out date
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
    /// Provider search trace
    #[serde(default)]
    pub trace_id: String,
    /// Item code inside the itinerary
    #[serde(default)]
    pub itinerary_code: String,
    /// Quoted price
    #[serde(default)]
    pub price: f64,
    /// Booking status of this hotel
    #[serde(default)]
    pub booking_status: BookingStatus,
}

/// A ground transfer held in an itinerary
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    /// Provider quotation
    pub quotation_id: String,
    /// Short description (for example "Airport to hotel")
    #[serde(default)]
    pub description: String,
    /// Quoted price
    #[serde(default)]
    pub price: f64,
    /// Booking status of this transfer
    #[serde(default)]
    pub booking_status: BookingStatus,
}

/// An activity held in an itinerary
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Provider activity code
    pub activity_code: String,
    /// Activity name
    #[serde(default)]
    pub name: String,
    /// Quoted price
    #[serde(default)]
    pub price: f64,
    /// Booking status of this activity
    #[serde(default)]
    pub booking_status: BookingStatus,
}

/// Adult or child, derived from age
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelerType {
    /// Aged 12 or over
    #[default]
    Adult,
    /// Under 12
    Child,
}

impl TravelerType {
    /// Age from which a traveler counts as an adult
    pub const ADULT_AGE: u32 = 12;

    /// Classify an age in whole years
    #[must_use]
    pub const fn from_age(age: u32) -> Self {
        if age >= Self::ADULT_AGE {
            Self::Adult
        } else {
            Self::Child
        }
    }
}

/// GST billing details, carried by adults only
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GstDetails {
    /// Registered company name
    pub company_name: String,
    /// GST registration number
    pub gst_number: String,
    /// Company address
    #[serde(default)]
    pub company_address: String,
    /// Company email
    #[serde(default)]
    pub company_email: String,
    /// Company phone
    #[serde(default)]
    pub company_phone: String,
}

/// A traveler as entered in the booking form
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Traveler {
    /// Title (Mr, Ms, Mstr, Miss)
    pub title: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: String,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Gender as entered
    pub gender: String,
    /// Passport number
    pub passport_number: String,
    /// Passport issue date
    pub passport_issue_date: Option<NaiveDate>,
    /// Passport expiry date
    pub passport_expiry_date: Option<NaiveDate>,
    /// Nationality
    pub nationality: String,
    /// Weight in kilograms
    pub weight: Option<f64>,
    /// Height in centimetres
    pub height: Option<f64>,
    /// Preferred language
    pub preferred_language: String,
    /// Food preference
    pub food_preference: String,
    /// Address line 1
    pub address_line1: String,
    /// Address line 2
    pub address_line2: String,
    /// City of residence
    pub city: String,
    /// Country of residence
    pub country: String,
    /// PAN (tax id)
    pub pan_number: String,
    /// Age in whole years, derived from the date of birth
    pub age: Option<u32>,
    /// Adult or child, derived from the age
    #[serde(rename = "type")]
    pub traveler_type: TravelerType,
    /// GST billing details
    pub gst: Option<GstDetails>,
}

impl Traveler {
    /// "First Last"
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// A room and the travelers sharing it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// 1-based room number
    pub room_number: u32,
    /// Travelers in the room, lead traveler first
    #[serde(default)]
    pub travelers: Vec<Traveler>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_accepts_numeric_code() {
        let envelope: Envelope<serde_json::Value> = serde_json::from_value(serde_json::json!({
            "success": false,
            "message": "Flight no longer available",
            "code": 6
        }))
        .unwrap();

        assert!(!envelope.success);
        assert_eq!(envelope.code.as_deref(), Some("6"));
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_envelope_accepts_string_code() {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"success":false,"code":"6"}"#).unwrap();
        assert_eq!(envelope.code.as_deref(), Some("6"));
    }

    #[test]
    fn test_itinerary_walks_days_in_order() {
        let itinerary: Itinerary = serde_json::from_value(serde_json::json!({
            "itineraryToken": "itn-1",
            "cities": [
                { "city": "Paris", "days": [
                    { "date": "2025-03-01", "flights": [{ "flightCode": "AF1", "price": 5000.0 }] },
                    { "date": "2025-03-02", "hotels": [{ "hotelId": "H1", "price": 8000.0 }] }
                ]},
                { "city": "Rome", "days": [
                    { "date": "2025-03-03", "flights": [{ "flightCode": "AZ2" }],
                      "activities": [{ "activityCode": "COLOSSEUM" }] }
                ]}
            ]
        }))
        .unwrap();

        let codes: Vec<&str> = itinerary.flights().map(|f| f.flight_code.as_str()).collect();
        assert_eq!(codes, vec!["AF1", "AZ2"]);
        assert_eq!(itinerary.hotels().count(), 1);
        assert_eq!(itinerary.resource_count(), 4);
        assert_eq!(itinerary.itinerary_token.as_str(), "itn-1");
    }

    #[test]
    fn test_traveler_type_boundary() {
        assert_eq!(TravelerType::from_age(11), TravelerType::Child);
        assert_eq!(TravelerType::from_age(12), TravelerType::Adult);
    }

    #[test]
    fn test_traveler_type_serializes_as_type_field() {
        let traveler = Traveler {
            first_name: "Ada".into(),
            traveler_type: TravelerType::Child,
            ..Traveler::default()
        };
        let json = serde_json::to_value(&traveler).unwrap();
        assert_eq!(json["type"], "child");
        assert_eq!(json["firstName"], "Ada");
    }
}
