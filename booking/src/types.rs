//! Identifiers and failure values shared by the workflow slices

use serde::{Deserialize, Serialize};
use std::fmt;
use tripflow_api::{ApiError, BookingId, InquiryToken, ItineraryToken};
use tripflow_core::environment::IdGenerator;

/// Itinerary and inquiry tokens of one booking session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Server-side itinerary
    pub itinerary: ItineraryToken,
    /// Inquiry the itinerary belongs to
    pub inquiry: InquiryToken,
}

impl Tokens {
    /// Pair an itinerary token with its inquiry token
    #[must_use]
    pub fn new(itinerary: impl Into<ItineraryToken>, inquiry: impl Into<InquiryToken>) -> Self {
        Self {
            itinerary: itinerary.into(),
            inquiry: inquiry.into(),
        }
    }
}

/// Generate a collision-resistant booking id
#[must_use]
pub fn new_booking_id(ids: &dyn IdGenerator) -> BookingId {
    BookingId::new(ids.next_id().to_string())
}

/// A failed backend call, as kept in state
///
/// [`ApiError`] owns transport errors and cannot be cloned; state and actions
/// keep this summary instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    /// Message to show the user
    pub message: String,
    /// Provider error code, if any
    pub code: Option<String>,
}

impl ApiFailure {
    /// Failure with a message and no code
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attach a provider error code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl From<ApiError> for ApiFailure {
    fn from(error: ApiError) -> Self {
        Self {
            message: error.user_message(),
            code: error.code().map(str::to_string),
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripflow_testing::SequentialIdGenerator;

    #[test]
    fn test_booking_ids_come_from_generator() {
        let ids = SequentialIdGenerator::new();
        let first = new_booking_id(&ids);
        let second = new_booking_id(&ids);
        assert_ne!(first, second);
        assert_eq!(first.as_str(), "00000000-0000-0000-0000-000000000001");
    }

    #[test]
    fn test_failure_keeps_provider_code() {
        let failure = ApiFailure::from(ApiError::Rejected {
            message: "Fare expired".into(),
            code: Some("6".into()),
        });
        assert_eq!(failure.code.as_deref(), Some("6"));
        assert_eq!(failure.to_string(), "Fare expired (code 6)");
    }
}
