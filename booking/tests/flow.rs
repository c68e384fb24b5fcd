//! End-to-end runs of the booking flow through a Store and a scripted backend

#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use tripflow_api::{
    BookingStatus, CityPlan, DayPlan, Flight, Hotel, Itinerary, Room, Traveler,
};
use tripflow_booking::{
    AllocationAction, AllocationKey, BookingEnvironment, BookingFlowReducer, BookingFlowState,
    FlowAction, FlowError, FailureReason, InitiatorStatus, PriceCheckAction, Stage, Tokens,
};
use tripflow_runtime::Store;
use tripflow_testing::{ApiCall, ScriptedTravelApi, SequentialIdGenerator, date, test_clock};

type FlowStore = Store<BookingFlowState, FlowAction, BookingEnvironment, BookingFlowReducer>;

const SETTLE: Duration = Duration::from_secs(5);

fn traveler(first_name: &str) -> Traveler {
    Traveler {
        title: "Ms".into(),
        first_name: first_name.into(),
        last_name: "Rao".into(),
        email: "traveler@example.com".into(),
        phone: "+919876543210".into(),
        date_of_birth: Some(date(1988, 8, 8)),
        gender: "female".into(),
        passport_number: "Z7654321".into(),
        passport_issue_date: Some(date(2019, 3, 3)),
        passport_expiry_date: Some(date(2029, 3, 2)),
        nationality: "Indian".into(),
        weight: Some(60.0),
        height: Some(165.0),
        preferred_language: "Hindi".into(),
        food_preference: "Jain".into(),
        address_line1: "22 Marine Drive".into(),
        city: "Mumbai".into(),
        country: "India".into(),
        pan_number: "PQRSX9876L".into(),
        ..Traveler::default()
    }
}

fn rooms() -> Vec<Room> {
    vec![Room {
        room_number: 1,
        travelers: vec![traveler("Priya"), traveler("Dev")],
    }]
}

fn flight(code: &str, price: f64, day: u32) -> Flight {
    Flight {
        flight_code: code.into(),
        result_index: format!("R-{code}"),
        trace_id: format!("T-{code}"),
        itinerary_code: format!("IC-{code}"),
        origin: "Delhi".into(),
        destination: "Dubai".into(),
        departure_date: Some(date(2025, 5, day)),
        price,
        ..Flight::default()
    }
}

fn hotel(id: &str, price: f64) -> Hotel {
    Hotel {
        hotel_id: id.into(),
        name: format!("Hotel {id}"),
        city: "Dubai".into(),
        country: "UAE".into(),
        check_in: Some(date(2025, 5, 1)),
        check_out: Some(date(2025, 5, 4)),
        trace_id: format!("T-{id}"),
        itinerary_code: format!("IC-{id}"),
        price,
        ..Hotel::default()
    }
}

fn itinerary(flights: Vec<Flight>, hotels: Vec<Hotel>) -> Itinerary {
    Itinerary {
        itinerary_token: "itn-e2e".into(),
        inquiry_token: "inq-e2e".into(),
        cities: vec![CityPlan {
            city: "Dubai".into(),
            country: "UAE".into(),
            days: vec![DayPlan {
                date: date(2025, 5, 1),
                flights,
                hotels,
                ..DayPlan::default()
            }],
            ..CityPlan::default()
        }],
    }
}

fn store(api: &Arc<ScriptedTravelApi>) -> FlowStore {
    let env = BookingEnvironment::new(api.clone())
        .with_clock(Arc::new(test_clock()))
        .with_ids(Arc::new(SequentialIdGenerator::new()));
    Store::new(BookingFlowState::default(), BookingFlowReducer, env)
}

async fn send(store: &FlowStore, action: FlowAction) -> BookingFlowState {
    store.send(action).await.expect("store accepts actions");
    store.settled(SETTLE).await.expect("flow settles");
    store.state(Clone::clone).await
}

fn start(itinerary: Itinerary) -> FlowAction {
    FlowAction::Start {
        tokens: Tokens::new("itn-e2e", "inq-e2e"),
        itinerary,
        rooms: rooms(),
        special_requirements: Some("Late check-in".into()),
    }
}

#[tokio::test]
async fn test_end_to_end_success_with_price_increase() {
    let trip = itinerary(vec![flight("AI1", 5000.0, 1)], vec![hotel("H-DXB", 8000.0)]);
    let api = Arc::new(
        ScriptedTravelApi::new()
            .with_itinerary(trip.clone())
            .with_price("IC-H-DXB", 8500.0),
    );
    let store = store(&api);

    let state = send(&store, start(trip)).await;
    assert_eq!(state.stage, Stage::Allocated);
    assert_eq!(state.allocation.successful.len(), 2);

    let state = send(&store, FlowAction::ProceedToPriceCheck).await;
    assert_eq!(state.stage, Stage::AwaitingConfirmation);
    let summary = state.prices.summary.expect("summary is built");
    assert!(summary.has_price_changed);
    assert!((summary.original_totals.total - 13_000.0).abs() < 1e-9);
    assert!((summary.new_totals.total - 13_500.0).abs() < 1e-9);
    assert!((summary.difference - 500.0).abs() < 1e-9);
    assert!((summary.percentage_change - 3.846).abs() < 1e-3);

    send(&store, FlowAction::Prices(PriceCheckAction::Confirm)).await;
    let state = send(&store, FlowAction::ProceedToCommit).await;

    assert_eq!(state.stage, Stage::Complete);
    assert_eq!(state.confirmation.count(BookingStatus::Confirmed), 2);

    let bookings = api.created_bookings();
    assert_eq!(bookings.len(), 2);
    assert!(bookings[0].items.is_empty());
    assert_eq!(bookings[1].items.len(), 2);
    assert_ne!(bookings[0].booking_id, bookings[1].booking_id);
    assert_eq!(state.initiator.booking_id.as_ref(), Some(&bookings[0].booking_id));
    assert_eq!(state.commit.booking_id.as_ref(), Some(&bookings[1].booking_id));
    assert!(api.status_updates().iter().all(|u| u.booking_id == bookings[1].booking_id));
}

#[tokio::test]
async fn test_end_to_end_expired_flight_is_isolated() {
    let trip = itinerary(
        vec![flight("FA", 3000.0, 1), flight("FB", 3500.0, 4)],
        vec![hotel("H-DXB", 8000.0)],
    );
    let api = Arc::new(
        ScriptedTravelApi::new()
            .fail_flight_allocation("FB", "Fare is no longer available", Some("6"))
            .with_flight_options(vec![flight("FB-NEW", 3600.0, 4)]),
    );
    let store = store(&api);

    let state = send(&store, start(trip)).await;
    assert_eq!(state.stage, Stage::Remediation);
    assert_eq!(state.allocation.failed.len(), 1);
    let fb = AllocationKey::flight("FB", "Dubai", date(2025, 5, 1));
    assert_eq!(state.allocation.failed[0].key(), fb);
    assert_eq!(state.allocation.failed[0].reason, FailureReason::FlightExpired);
    assert_eq!(state.allocation.successful.flights[0].target.reference(), "FA");

    let state = send(&store, FlowAction::ProceedToPriceCheck).await;
    assert_eq!(state.error, Some(FlowError::AllocationFailures(1)));

    let successes = state.allocation.successful.clone();
    send(
        &store,
        FlowAction::Allocation(AllocationAction::RequestReplacement(fb)),
    )
    .await;
    let state = send(
        &store,
        FlowAction::Allocation(AllocationAction::ChooseReplacement { index: 0 }),
    )
    .await;

    assert!(state.allocation.failed.is_empty());
    assert_eq!(state.allocation.successful, successes);
    assert!(state.allocation.needs_itinerary_refresh);
    assert_eq!(api.replaced_flights(), vec!["FB-NEW".to_string()]);
}

#[tokio::test]
async fn test_every_item_attempted_once() {
    let flights: Vec<Flight> = (1..=4).map(|i| flight(&format!("F{i}"), 1000.0, i)).collect();
    let hotels: Vec<Hotel> = (1..=3).map(|i| hotel(&format!("H{i}"), 2000.0)).collect();
    let api = Arc::new(
        ScriptedTravelApi::new()
            .fail_flight_allocation("F2", "Seat map error", None)
            .fail_hotel_allocation("H3", "Sold out", None),
    );
    let store = store(&api);

    let state = send(&store, start(itinerary(flights, hotels))).await;

    assert_eq!(api.allocation_calls(), 7);
    assert_eq!(state.allocation.successful.len() + state.allocation.failed.len(), 7);
    assert_eq!(state.allocation.failed.len(), 2);
}

#[tokio::test]
async fn test_allocation_progress_is_sequential() {
    let trip = itinerary(
        vec![flight("FA", 3000.0, 1), flight("FB", 3500.0, 4)],
        vec![hotel("H-DXB", 8000.0)],
    );
    let api = Arc::new(ScriptedTravelApi::new());
    let store = store(&api);
    let mut actions = store.subscribe_actions();

    send(&store, start(trip)).await;

    let mut progress = Vec::new();
    while let Ok(action) = actions.try_recv() {
        if let FlowAction::Allocation(AllocationAction::ItemStarted(event)) = action {
            progress.push((event.current, event.total, event.item.reference().to_string()));
        }
    }
    assert_eq!(
        progress,
        vec![
            (1, 3, "FA".to_string()),
            (2, 3, "FB".to_string()),
            (3, 3, "H-DXB".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_incomplete_form_makes_no_network_call() {
    let trip = itinerary(vec![flight("FA", 3000.0, 1)], vec![]);
    let api = Arc::new(ScriptedTravelApi::new());
    let store = store(&api);

    let mut incomplete = rooms();
    incomplete[0].travelers[1].passport_number.clear();
    incomplete.push(Room {
        room_number: 2,
        travelers: vec![],
    });
    let state = send(
        &store,
        FlowAction::Start {
            tokens: Tokens::new("itn-e2e", "inq-e2e"),
            itinerary: trip,
            rooms: incomplete,
            special_requirements: None,
        },
    )
    .await;

    let InitiatorStatus::Invalid(error) = &state.initiator.status else {
        panic!("expected validation failure, got {:?}", state.initiator.status);
    };
    assert_eq!(error.violations.len(), 2);
    assert!(error.to_string().contains("Room 1, Traveler 2: Passport Number"));
    assert_eq!(state.stage, Stage::Form);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_commit_requires_confirmation() {
    let trip = itinerary(vec![flight("AI1", 5000.0, 1)], vec![hotel("H-DXB", 8000.0)]);
    let api = Arc::new(ScriptedTravelApi::new().with_itinerary(trip.clone()));
    let store = store(&api);

    send(&store, start(trip)).await;
    send(&store, FlowAction::ProceedToPriceCheck).await;
    let state = send(&store, FlowAction::ProceedToCommit).await;

    assert_eq!(state.error, Some(FlowError::PricesNotConfirmed));
    assert_eq!(state.stage, Stage::AwaitingConfirmation);
    assert_eq!(
        api.count(|call| matches!(call, ApiCall::CreateBooking(request) if !request.items.is_empty())),
        0
    );
}
