//! Derived traveler fields: age, adult/child type, GST eligibility

use chrono::{Datelike, NaiveDate};
use tripflow_api::{Room, Traveler, TravelerCounts, TravelerType};

/// Age in whole years on `today`; zero for birth dates in the future
#[must_use]
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

/// Recompute age and type from the date of birth
///
/// A traveler who turns out to be a child loses any GST details.
pub fn refresh_derived(traveler: &mut Traveler, today: NaiveDate) {
    let Some(dob) = traveler.date_of_birth else {
        traveler.age = None;
        return;
    };

    let age = age_on(dob, today);
    traveler.age = Some(age);
    traveler.traveler_type = TravelerType::from_age(age);

    if traveler.traveler_type == TravelerType::Child && traveler.gst.take().is_some() {
        tracing::debug!(traveler = %traveler.full_name(), "Cleared GST details of child traveler");
    }
}

/// Change the date of birth and recompute what depends on it
pub fn set_date_of_birth(traveler: &mut Traveler, date_of_birth: NaiveDate, today: NaiveDate) {
    traveler.date_of_birth = Some(date_of_birth);
    refresh_derived(traveler, today);
}

/// Recompute derived fields of every traveler
pub fn refresh_rooms(rooms: &mut [Room], today: NaiveDate) {
    for traveler in rooms.iter_mut().flat_map(|room| room.travelers.iter_mut()) {
        refresh_derived(traveler, today);
    }
}

/// Adult/child counts of one room
#[must_use]
pub fn occupancy(room: &Room) -> TravelerCounts {
    let mut counts = TravelerCounts::default();
    for traveler in &room.travelers {
        match traveler.traveler_type {
            TravelerType::Adult => counts.adults += 1,
            TravelerType::Child => {
                counts.children += 1;
                counts.child_ages.push(traveler.age.unwrap_or(0));
            },
        }
    }
    counts
}

/// Adult/child counts across all rooms
#[must_use]
pub fn total_occupancy(rooms: &[Room]) -> TravelerCounts {
    rooms.iter().map(occupancy).fold(TravelerCounts::default(), |mut acc, room| {
        acc.adults += room.adults;
        acc.children += room.children;
        acc.child_ages.extend(room.child_ages);
        acc
    })
}

/// First traveler of the first room
#[must_use]
pub fn lead_traveler(rooms: &[Room]) -> Option<&Traveler> {
    rooms.iter().find_map(|room| room.travelers.first())
}

/// Provider passenger type code: 1 adult, 2 child
#[must_use]
pub const fn pax_type(traveler_type: TravelerType) -> u8 {
    match traveler_type {
        TravelerType::Adult => 1,
        TravelerType::Child => 2,
    }
}
