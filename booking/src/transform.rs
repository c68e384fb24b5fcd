//! Reshaping travelers and itinerary resources into endpoint payloads
//!
//! Allocation has one transform for flights and one for hotels. The final
//! booking has one transform per [`ItineraryResource`] variant.

use chrono::NaiveDate;
use tripflow_api::{
    Activity, ActivityBooking, CityPlan, DayPlan, Flight, FlightAllocationData,
    FlightAllocationRequest, FlightBooking, FlightPassenger, Hotel, HotelAllocationData,
    HotelAllocationRequest, HotelBooking, HotelGuest, HotelRoomGuests, Itinerary, LeadContact,
    ResourceBooking, ResourceKind, Room, Transfer, TransferBooking, Traveler, TravelerType,
};

use crate::travelers::{lead_traveler, occupancy, pax_type, total_occupancy};

fn flight_passenger(traveler: &Traveler, room_number: u32, is_lead_pax: bool) -> FlightPassenger {
    let gst = traveler
        .gst
        .as_ref()
        .filter(|_| traveler.traveler_type == TravelerType::Adult);

    FlightPassenger {
        title: traveler.title.clone(),
        first_name: traveler.first_name.clone(),
        last_name: traveler.last_name.clone(),
        pax_type: pax_type(traveler.traveler_type),
        date_of_birth: traveler.date_of_birth,
        gender: traveler.gender.clone(),
        passport_no: traveler.passport_number.clone(),
        passport_issue_date: traveler.passport_issue_date,
        passport_expiry: traveler.passport_expiry_date,
        nationality: traveler.nationality.clone(),
        email: traveler.email.clone(),
        contact_no: traveler.phone.clone(),
        address_line1: traveler.address_line1.clone(),
        city: traveler.city.clone(),
        room_number,
        is_lead_pax,
        gst_company_name: gst.map(|g| g.company_name.clone()),
        gst_number: gst.map(|g| g.gst_number.clone()),
    }
}

/// Every traveler as a flight passenger; the first traveler of the first room leads
#[must_use]
pub fn flight_passengers(rooms: &[Room]) -> Vec<FlightPassenger> {
    rooms
        .iter()
        .flat_map(|room| room.travelers.iter().map(move |t| (room.room_number, t)))
        .enumerate()
        .map(|(i, (room_number, traveler))| flight_passenger(traveler, room_number, i == 0))
        .collect()
}

/// Rooms as hotel guest lists; the first traveler of each room leads it
#[must_use]
pub fn hotel_rooms(rooms: &[Room]) -> Vec<HotelRoomGuests> {
    rooms
        .iter()
        .map(|room| {
            let counts = occupancy(room);
            HotelRoomGuests {
                room_number: room.room_number,
                adults: counts.adults,
                children: counts.children,
                child_ages: counts.child_ages,
                guests: room
                    .travelers
                    .iter()
                    .enumerate()
                    .map(|(i, traveler)| HotelGuest {
                        title: traveler.title.clone(),
                        first_name: traveler.first_name.clone(),
                        last_name: traveler.last_name.clone(),
                        pax_type: pax_type(traveler.traveler_type),
                        age: traveler.age,
                        email: traveler.email.clone(),
                        phone: traveler.phone.clone(),
                        pan: traveler.pan_number.clone(),
                        passport_no: traveler.passport_number.clone(),
                        lead_passenger: i == 0,
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Allocation request of one flight
#[must_use]
pub fn flight_allocation(flight: &Flight, rooms: &[Room]) -> FlightAllocationRequest {
    FlightAllocationRequest {
        flight_data: FlightAllocationData {
            passengers: flight_passengers(rooms),
        },
        flight_code: flight.flight_code.clone(),
        result_index: flight.result_index.clone(),
        itinerary_code: flight.itinerary_code.clone(),
    }
}

/// Allocation request of one hotel
#[must_use]
pub fn hotel_allocation(hotel: &Hotel, rooms: &[Room]) -> HotelAllocationRequest {
    HotelAllocationRequest {
        hotel_data: HotelAllocationData {
            rooms: hotel_rooms(rooms),
        },
        hotel_id: hotel.hotel_id.clone(),
        itinerary_code: hotel.itinerary_code.clone(),
        trace_id: hotel.trace_id.clone(),
    }
}

fn lead_contact(rooms: &[Room]) -> LeadContact {
    lead_traveler(rooms)
        .map(|lead| LeadContact {
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
        })
        .unwrap_or_default()
}

/// A bookable item of an itinerary, borrowed from its day
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ItineraryResource<'a> {
    /// Flight
    Flight(&'a Flight),
    /// Hotel
    Hotel(&'a Hotel),
    /// Activity
    Activity(&'a Activity),
    /// Transfer
    Transfer(&'a Transfer),
}

impl ItineraryResource<'_> {
    /// Kind of this resource
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Flight(_) => ResourceKind::Flight,
            Self::Hotel(_) => ResourceKind::Hotel,
            Self::Activity(_) => ResourceKind::Activity,
            Self::Transfer(_) => ResourceKind::Transfer,
        }
    }

    /// Quoted price
    #[must_use]
    pub const fn price(&self) -> f64 {
        match self {
            Self::Flight(f) => f.price,
            Self::Hotel(h) => h.price,
            Self::Activity(a) => a.price,
            Self::Transfer(t) => t.price,
        }
    }

    /// Final booking payload of this resource
    #[must_use]
    pub fn to_booking(&self, city: &CityPlan, date: NaiveDate, rooms: &[Room]) -> ResourceBooking {
        let city_name = city.city.clone();
        match self {
            Self::Flight(flight) => ResourceBooking::Flight(FlightBooking {
                city_name,
                date,
                flight_code: flight.flight_code.clone(),
                result_index: flight.result_index.clone(),
                trace_id: flight.trace_id.clone(),
                itinerary_code: flight.itinerary_code.clone(),
                passengers: flight_passengers(rooms),
            }),
            Self::Hotel(hotel) => ResourceBooking::Hotel(HotelBooking {
                city_name,
                date,
                hotel_id: hotel.hotel_id.clone(),
                trace_id: hotel.trace_id.clone(),
                itinerary_code: hotel.itinerary_code.clone(),
                rooms: hotel_rooms(rooms),
            }),
            Self::Activity(activity) => {
                let counts = total_occupancy(rooms);
                ResourceBooking::Activity(ActivityBooking {
                    city_name,
                    date,
                    activity_code: activity.activity_code.clone(),
                    lead_traveler: lead_contact(rooms),
                    adults: counts.adults,
                    children: counts.children,
                })
            },
            Self::Transfer(transfer) => {
                let counts = total_occupancy(rooms);
                ResourceBooking::Transfer(TransferBooking {
                    city_name,
                    date,
                    quotation_id: transfer.quotation_id.clone(),
                    lead_traveler: lead_contact(rooms),
                    passengers: counts.adults + counts.children,
                })
            },
        }
    }
}

/// Resources of one day: flights, hotels, activities, then transfers
pub fn day_resources(day: &DayPlan) -> impl Iterator<Item = ItineraryResource<'_>> {
    day.flights
        .iter()
        .map(ItineraryResource::Flight)
        .chain(day.hotels.iter().map(ItineraryResource::Hotel))
        .chain(day.activities.iter().map(ItineraryResource::Activity))
        .chain(day.transfers.iter().map(ItineraryResource::Transfer))
}

/// Final booking payloads of every resource, in travel order
#[must_use]
pub fn resource_bookings(itinerary: &Itinerary, rooms: &[Room]) -> Vec<ResourceBooking> {
    itinerary
        .days()
        .flat_map(|(city, day)| {
            day_resources(day).map(move |resource| resource.to_booking(city, day.date, rooms))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::travelers::set_date_of_birth;
    use crate::validation::fixtures::{complete_traveler, room};
    use tripflow_api::GstDetails;
    use tripflow_testing::date;

    fn rooms() -> Vec<Room> {
        let mut adult = complete_traveler("Asha");
        adult.gst = Some(GstDetails {
            company_name: "Acme".into(),
            gst_number: "GST-1".into(),
            ..GstDetails::default()
        });
        set_date_of_birth(&mut adult, date(1990, 1, 1), date(2025, 1, 1));

        let mut child = complete_traveler("Kiran");
        set_date_of_birth(&mut child, date(2018, 1, 1), date(2025, 1, 1));

        vec![
            room(1, vec![adult, child]),
            room(2, vec![complete_traveler("Ravi")]),
        ]
    }

    #[test]
    fn test_flight_passengers_cover_all_rooms_with_one_lead() {
        let passengers = flight_passengers(&rooms());

        assert_eq!(passengers.len(), 3);
        assert_eq!(passengers.iter().filter(|p| p.is_lead_pax).count(), 1);
        assert!(passengers[0].is_lead_pax);
        assert_eq!(passengers[1].pax_type, 2);
        assert_eq!(passengers[2].room_number, 2);
        assert_eq!(passengers[0].gst_number.as_deref(), Some("GST-1"));
        assert_eq!(passengers[1].gst_number, None);
    }

    #[test]
    fn test_hotel_rooms_keep_room_split() {
        let hotel_rooms = hotel_rooms(&rooms());

        assert_eq!(hotel_rooms.len(), 2);
        assert_eq!(hotel_rooms[0].adults, 1);
        assert_eq!(hotel_rooms[0].children, 1);
        assert_eq!(hotel_rooms[0].child_ages, vec![7]);
        assert!(hotel_rooms[1].guests[0].lead_passenger);
    }

    #[test]
    fn test_resource_bookings_follow_travel_order() {
        let itinerary = Itinerary {
            cities: vec![CityPlan {
                city: "Goa".into(),
                days: vec![DayPlan {
                    date: date(2025, 4, 1),
                    flights: vec![Flight {
                        flight_code: "6E1".into(),
                        ..Flight::default()
                    }],
                    hotels: vec![Hotel {
                        hotel_id: "H9".into(),
                        ..Hotel::default()
                    }],
                    transfers: vec![Transfer {
                        quotation_id: "Q1".into(),
                        ..Transfer::default()
                    }],
                    activities: vec![Activity {
                        activity_code: "DIVE".into(),
                        ..Activity::default()
                    }],
                }],
                ..CityPlan::default()
            }],
            ..Itinerary::default()
        };

        let bookings = resource_bookings(&itinerary, &rooms());
        let kinds: Vec<ResourceKind> = bookings.iter().map(ResourceBooking::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Flight,
                ResourceKind::Hotel,
                ResourceKind::Activity,
                ResourceKind::Transfer
            ]
        );
        assert!(bookings.iter().all(|b| b.city_name() == "Goa"));

        match &bookings[3] {
            ResourceBooking::Transfer(transfer) => {
                assert_eq!(transfer.passengers, 3);
                assert_eq!(transfer.lead_traveler.first_name, "Asha");
            },
            other => unreachable!("expected transfer, got {other:?}"),
        }
    }
}
