//! Shared fixtures of the slice tests

use std::sync::Arc;
use tripflow_api::{Activity, CityPlan, DayPlan, Flight, Hotel, Itinerary, Transfer, TravelApi};
use tripflow_testing::{SequentialIdGenerator, date, test_clock};

use crate::environment::BookingEnvironment;

/// Environment with a fixed clock and sequential ids
pub fn environment(api: Arc<dyn TravelApi>) -> BookingEnvironment {
    BookingEnvironment::new(api)
        .with_clock(Arc::new(test_clock()))
        .with_ids(Arc::new(SequentialIdGenerator::new()))
}

/// Mumbai → Paris (FA, hotel H1, a tour) then Rome → Mumbai (FB, a transfer)
pub fn two_flight_itinerary() -> Itinerary {
    Itinerary {
        itinerary_token: "itn-1".into(),
        inquiry_token: "inq-1".into(),
        cities: vec![
            CityPlan {
                city: "Paris".into(),
                country: "France".into(),
                start_date: Some(date(2025, 3, 1)),
                end_date: Some(date(2025, 3, 3)),
                days: vec![DayPlan {
                    date: date(2025, 3, 1),
                    flights: vec![Flight {
                        flight_code: "FA".into(),
                        result_index: "R-FA".into(),
                        trace_id: "T-FA".into(),
                        itinerary_code: "IC-FA".into(),
                        origin: "Mumbai".into(),
                        destination: "Paris".into(),
                        departure_date: Some(date(2025, 3, 1)),
                        price: 5000.0,
                        ..Flight::default()
                    }],
                    hotels: vec![Hotel {
                        hotel_id: "H1".into(),
                        name: "Hotel Lumiere".into(),
                        city: "Paris".into(),
                        country: "France".into(),
                        check_in: Some(date(2025, 3, 1)),
                        check_out: Some(date(2025, 3, 4)),
                        trace_id: "T-H1".into(),
                        itinerary_code: "IC-H1".into(),
                        price: 8000.0,
                        ..Hotel::default()
                    }],
                    activities: vec![Activity {
                        activity_code: "LOUVRE".into(),
                        name: "Louvre tour".into(),
                        price: 1200.0,
                        ..Activity::default()
                    }],
                    ..DayPlan::default()
                }],
            },
            CityPlan {
                city: "Rome".into(),
                country: "Italy".into(),
                start_date: Some(date(2025, 3, 4)),
                end_date: Some(date(2025, 3, 6)),
                days: vec![DayPlan {
                    date: date(2025, 3, 6),
                    flights: vec![Flight {
                        flight_code: "FB".into(),
                        result_index: "R-FB".into(),
                        trace_id: "T-FB".into(),
                        itinerary_code: "IC-FB".into(),
                        origin: "Rome".into(),
                        destination: "Mumbai".into(),
                        departure_date: Some(date(2025, 3, 6)),
                        price: 4000.0,
                        ..Flight::default()
                    }],
                    transfers: vec![Transfer {
                        quotation_id: "Q-AIRPORT".into(),
                        description: "Hotel to airport".into(),
                        price: 600.0,
                        ..Transfer::default()
                    }],
                    ..DayPlan::default()
                }],
            },
        ],
    }
}
