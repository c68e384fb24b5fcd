//! Required-field validation of rooms and travelers
//!
//! Validation never stops at the first problem: the report names every room
//! and traveler with a violation and every field each one is missing.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tripflow_api::{Room, Traveler};

/// A traveler field that must be filled before booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequiredField {
    /// Given name
    FirstName,
    /// Family name
    LastName,
    /// Contact email
    Email,
    /// Contact phone
    Phone,
    /// Date of birth
    DateOfBirth,
    /// Passport number
    PassportNumber,
    /// Passport issue date
    PassportIssueDate,
    /// Passport expiry date
    PassportExpiryDate,
    /// Nationality
    Nationality,
    /// Weight
    Weight,
    /// Height
    Height,
    /// Preferred language
    Language,
    /// Food preference
    FoodPreference,
    /// Gender
    Gender,
    /// Address line 1
    AddressLine1,
    /// City of residence
    City,
    /// PAN
    Pan,
}

impl RequiredField {
    /// Every required field, in form order
    pub const ALL: [Self; 17] = [
        Self::FirstName,
        Self::LastName,
        Self::Email,
        Self::Phone,
        Self::DateOfBirth,
        Self::PassportNumber,
        Self::PassportIssueDate,
        Self::PassportExpiryDate,
        Self::Nationality,
        Self::Weight,
        Self::Height,
        Self::Language,
        Self::FoodPreference,
        Self::Gender,
        Self::AddressLine1,
        Self::City,
        Self::Pan,
    ];

    /// Label shown to the user
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FirstName => "First Name",
            Self::LastName => "Last Name",
            Self::Email => "Email",
            Self::Phone => "Phone",
            Self::DateOfBirth => "Date of Birth",
            Self::PassportNumber => "Passport Number",
            Self::PassportIssueDate => "Passport Issue Date",
            Self::PassportExpiryDate => "Passport Expiry Date",
            Self::Nationality => "Nationality",
            Self::Weight => "Weight",
            Self::Height => "Height",
            Self::Language => "Preferred Language",
            Self::FoodPreference => "Food Preference",
            Self::Gender => "Gender",
            Self::AddressLine1 => "Address Line 1",
            Self::City => "City",
            Self::Pan => "PAN Number",
        }
    }

    /// Whether `traveler` leaves this field empty
    #[must_use]
    pub fn is_missing(self, traveler: &Traveler) -> bool {
        let blank = |value: &str| value.trim().is_empty();
        match self {
            Self::FirstName => blank(&traveler.first_name),
            Self::LastName => blank(&traveler.last_name),
            Self::Email => blank(&traveler.email),
            Self::Phone => blank(&traveler.phone),
            Self::DateOfBirth => traveler.date_of_birth.is_none(),
            Self::PassportNumber => blank(&traveler.passport_number),
            Self::PassportIssueDate => traveler.passport_issue_date.is_none(),
            Self::PassportExpiryDate => traveler.passport_expiry_date.is_none(),
            Self::Nationality => blank(&traveler.nationality),
            Self::Weight => !traveler.weight.is_some_and(|w| w > 0.0),
            Self::Height => !traveler.height.is_some_and(|h| h > 0.0),
            Self::Language => blank(&traveler.preferred_language),
            Self::FoodPreference => blank(&traveler.food_preference),
            Self::Gender => blank(&traveler.gender),
            Self::AddressLine1 => blank(&traveler.address_line1),
            Self::City => blank(&traveler.city),
            Self::Pan => blank(&traveler.pan_number),
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One problem found in the booking form
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Violation {
    /// The form has no rooms at all
    #[error("At least one room is required")]
    NoRooms,
    /// A room without travelers
    #[error("Room {room_number}: at least one traveler is required")]
    EmptyRoom {
        /// Room number
        room_number: u32,
    },
    /// A traveler with empty required fields
    #[error("Room {room_number}, Traveler {}: {}", .traveler_index + 1, labels(.missing))]
    MissingFields {
        /// Room number
        room_number: u32,
        /// 0-based position of the traveler in the room
        traveler_index: usize,
        /// Every missing field, in form order
        missing: Vec<RequiredField>,
    },
}

fn labels(fields: &[RequiredField]) -> String {
    fields.iter().map(|field| field.label()).collect::<Vec<_>>().join(", ")
}

/// Every violation found in the booking form
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Please fill in all required fields:\n{}", bullets(.violations))]
pub struct ValidationError {
    /// Violations in room and traveler order
    pub violations: Vec<Violation>,
}

fn bullets(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| format!("- {violation}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Required fields `traveler` leaves empty
#[must_use]
pub fn missing_fields(traveler: &Traveler) -> Vec<RequiredField> {
    RequiredField::ALL
        .into_iter()
        .filter(|field| field.is_missing(traveler))
        .collect()
}

/// Check every room and traveler
///
/// # Errors
///
/// Returns a [`ValidationError`] listing every violation.
pub fn validate_rooms(rooms: &[Room]) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    if rooms.is_empty() {
        violations.push(Violation::NoRooms);
    }

    for room in rooms {
        if room.travelers.is_empty() {
            violations.push(Violation::EmptyRoom {
                room_number: room.room_number,
            });
            continue;
        }

        for (traveler_index, traveler) in room.travelers.iter().enumerate() {
            let missing = missing_fields(traveler);
            if !missing.is_empty() {
                violations.push(Violation::MissingFields {
                    room_number: room.room_number,
                    traveler_index,
                    missing,
                });
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}
