//! Travel backend client

use crate::{
    error::ApiError,
    model::{BookingId, Envelope, Flight, Hotel, InquiryToken, Itinerary, ItineraryToken},
    payloads::{
        BookingRecord, BookingStatusUpdate, CreateBookingRequest, FlightAllocationRequest,
        FlightSearchRequest, HotelAllocationRequest, HotelSearchRequest, PriceQuote, Receipt,
        RecheckFlightsRequest, RecheckHotelsRequest, ReplaceFlightRequest, ReplaceHotelRequest,
        ResourceBooking,
    },
};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by [`TravelApi`] methods
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// The travel backend, one method per endpoint
///
/// Object safe so the booking workflow can hold an `Arc<dyn TravelApi>` and
/// tests can swap in a scripted implementation.
pub trait TravelApi: Send + Sync {
    /// `GET /itinerary/:token`
    fn get_itinerary(&self, token: ItineraryToken) -> ApiFuture<'_, Itinerary>;

    /// `POST /bookings`
    fn create_booking(&self, request: CreateBookingRequest) -> ApiFuture<'_, BookingRecord>;

    /// `POST /guest-allocation/:bookingId/allocate-flight`
    fn allocate_flight(
        &self,
        booking_id: BookingId,
        request: FlightAllocationRequest,
    ) -> ApiFuture<'_, Receipt>;

    /// `POST /guest-allocation/:bookingId/allocate-hotel`
    fn allocate_hotel(
        &self,
        booking_id: BookingId,
        request: HotelAllocationRequest,
    ) -> ApiFuture<'_, Receipt>;

    /// `POST /itinerary/:token/recheck-flights`
    fn recheck_flights(
        &self,
        token: ItineraryToken,
        request: RecheckFlightsRequest,
    ) -> ApiFuture<'_, Vec<PriceQuote>>;

    /// `POST /itinerary/:token/recheck-hotels`
    fn recheck_hotels(
        &self,
        token: ItineraryToken,
        request: RecheckHotelsRequest,
    ) -> ApiFuture<'_, Vec<PriceQuote>>;

    /// `POST /flights/search`
    fn search_flights(&self, request: FlightSearchRequest) -> ApiFuture<'_, Vec<Flight>>;

    /// `POST /hotels/search`
    fn search_hotels(&self, request: HotelSearchRequest) -> ApiFuture<'_, Vec<Hotel>>;

    /// `POST /itinerary/:token/replace-flight`
    fn replace_flight(
        &self,
        token: ItineraryToken,
        request: ReplaceFlightRequest,
    ) -> ApiFuture<'_, Receipt>;

    /// `PUT /itinerary/:token/hotel`
    fn replace_hotel(
        &self,
        token: ItineraryToken,
        request: ReplaceHotelRequest,
    ) -> ApiFuture<'_, Receipt>;

    /// `POST /booking/itinerary/:bookingId/{flight,hotel,activity,transfer}`
    fn book_resource(
        &self,
        booking_id: BookingId,
        booking: ResourceBooking,
    ) -> ApiFuture<'_, Receipt>;

    /// `PUT /itinerary/:token/booking-status`
    fn update_booking_status(
        &self,
        token: ItineraryToken,
        update: BookingStatusUpdate,
    ) -> ApiFuture<'_, Receipt>;
}

/// Connection settings of [`HttpTravelApi`]
#[derive(Clone, Debug)]
pub struct ClientSettings {
    /// Base URL, for example `http://localhost:5000/api`
    pub base_url: String,
    /// Bearer token
    pub auth_token: String,
    /// Value of the `X-Inquiry-Token` header
    pub inquiry_token: Option<InquiryToken>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ClientSettings {
    /// Default base URL of a local backend
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:5000/api";

    /// Default per-request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Settings for a local backend with the given token
    #[must_use]
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            auth_token: auth_token.into(),
            inquiry_token: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Override the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send an `X-Inquiry-Token` header
    #[must_use]
    pub fn with_inquiry_token(mut self, token: InquiryToken) -> Self {
        self.inquiry_token = Some(token);
        self
    }

    /// Override the per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`TravelApi`] over JSON/HTTP
#[derive(Clone)]
pub struct HttpTravelApi {
    client: Client,
    base_url: String,
    auth_token: String,
    inquiry_token: Option<InquiryToken>,
}

impl std::fmt::Debug for HttpTravelApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTravelApi")
            .field("base_url", &self.base_url)
            .field("inquiry_token", &self.inquiry_token)
            .finish_non_exhaustive()
    }
}

impl HttpTravelApi {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidBaseUrl`] if the base URL is not an absolute
    /// http(s) URL, or [`ApiError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(&settings.base_url)?;
        let client = Client::builder().timeout(settings.timeout).build()?;

        Ok(Self {
            client,
            base_url,
            auth_token: settings.auth_token,
            inquiry_token: settings.inquiry_token,
        })
    }

    /// Normalized base URL, without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.auth_token);
        if let Some(token) = &self.inquiry_token {
            builder = builder.header("X-Inquiry-Token", token.as_str());
        }
        builder
    }

    async fn call<T>(&self, builder: RequestBuilder, context: &'static str) -> Result<Envelope<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        tracing::debug!(endpoint = context, "Calling travel API");

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let (message, code) = match serde_json::from_slice::<Envelope<serde_json::Value>>(&body) {
                Ok(envelope) => (
                    envelope
                        .message
                        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
                    envelope.code,
                ),
                Err(_) => (String::from_utf8_lossy(&body).into_owned(), None),
            };
            tracing::warn!(endpoint = context, status = status.as_u16(), %message, "Travel API error");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
                code,
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_slice(&body).map_err(|source| ApiError::Decode { context, source })?;

        if !envelope.success {
            let message = envelope
                .message
                .unwrap_or_else(|| format!("{context} was rejected"));
            tracing::warn!(endpoint = context, code = ?envelope.code, %message, "Travel API rejected request");
            return Err(ApiError::Rejected {
                message,
                code: envelope.code,
            });
        }

        Ok(envelope)
    }

    async fn data<T>(&self, builder: RequestBuilder, context: &'static str) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        self.call(builder, context)
            .await?
            .data
            .ok_or(ApiError::MissingData { context })
    }

    async fn receipt(&self, builder: RequestBuilder, context: &'static str) -> Result<Receipt, ApiError> {
        Ok(self
            .call::<Receipt>(builder, context)
            .await?
            .data
            .unwrap_or(Receipt::Null))
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> RequestBuilder {
        self.request(Method::POST, path).json(body)
    }

    fn put<B: Serialize>(&self, path: &str, body: &B) -> RequestBuilder {
        self.request(Method::PUT, path).json(body)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed).map_err(|_| ApiError::InvalidBaseUrl(raw.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

impl TravelApi for HttpTravelApi {
    fn get_itinerary(&self, token: ItineraryToken) -> ApiFuture<'_, Itinerary> {
        Box::pin(async move {
            let builder = self.request(Method::GET, &format!("/itinerary/{token}"));
            self.data(builder, "get itinerary").await
        })
    }

    fn create_booking(&self, request: CreateBookingRequest) -> ApiFuture<'_, BookingRecord> {
        Box::pin(async move {
            let builder = self.post("/bookings", &request);
            let record: Option<BookingRecord> = self.call(builder, "create booking").await?.data;
            Ok(record.unwrap_or_default())
        })
    }

    fn allocate_flight(
        &self,
        booking_id: BookingId,
        request: FlightAllocationRequest,
    ) -> ApiFuture<'_, Receipt> {
        Box::pin(async move {
            let path = format!("/guest-allocation/{booking_id}/allocate-flight");
            self.receipt(self.post(&path, &request), "allocate flight").await
        })
    }

    fn allocate_hotel(
        &self,
        booking_id: BookingId,
        request: HotelAllocationRequest,
    ) -> ApiFuture<'_, Receipt> {
        Box::pin(async move {
            let path = format!("/guest-allocation/{booking_id}/allocate-hotel");
            self.receipt(self.post(&path, &request), "allocate hotel").await
        })
    }

    fn recheck_flights(
        &self,
        token: ItineraryToken,
        request: RecheckFlightsRequest,
    ) -> ApiFuture<'_, Vec<PriceQuote>> {
        Box::pin(async move {
            let path = format!("/itinerary/{token}/recheck-flights");
            self.data(self.post(&path, &request), "recheck flights").await
        })
    }

    fn recheck_hotels(
        &self,
        token: ItineraryToken,
        request: RecheckHotelsRequest,
    ) -> ApiFuture<'_, Vec<PriceQuote>> {
        Box::pin(async move {
            let path = format!("/itinerary/{token}/recheck-hotels");
            self.data(self.post(&path, &request), "recheck hotels").await
        })
    }

    fn search_flights(&self, request: FlightSearchRequest) -> ApiFuture<'_, Vec<Flight>> {
        Box::pin(async move {
            self.data(self.post("/flights/search", &request), "search flights")
                .await
        })
    }

    fn search_hotels(&self, request: HotelSearchRequest) -> ApiFuture<'_, Vec<Hotel>> {
        Box::pin(async move {
            self.data(self.post("/hotels/search", &request), "search hotels")
                .await
        })
    }

    fn replace_flight(
        &self,
        token: ItineraryToken,
        request: ReplaceFlightRequest,
    ) -> ApiFuture<'_, Receipt> {
        Box::pin(async move {
            let path = format!("/itinerary/{token}/replace-flight");
            self.receipt(self.post(&path, &request), "replace flight").await
        })
    }

    fn replace_hotel(
        &self,
        token: ItineraryToken,
        request: ReplaceHotelRequest,
    ) -> ApiFuture<'_, Receipt> {
        Box::pin(async move {
            let path = format!("/itinerary/{token}/hotel");
            self.receipt(self.put(&path, &request), "replace hotel").await
        })
    }

    fn book_resource(
        &self,
        booking_id: BookingId,
        booking: ResourceBooking,
    ) -> ApiFuture<'_, Receipt> {
        Box::pin(async move {
            let path = format!("/booking/itinerary/{booking_id}/{}", booking.kind());
            self.receipt(self.post(&path, &booking), "book resource").await
        })
    }

    fn update_booking_status(
        &self,
        token: ItineraryToken,
        update: BookingStatusUpdate,
    ) -> ApiFuture<'_, Receipt> {
        Box::pin(async move {
            let path = format!("/itinerary/{token}/booking-status");
            self.receipt(self.put(&path, &update), "update booking status")
                .await
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_normalizes_base_url() {
        let client = HttpTravelApi::new(
            ClientSettings::new("secret").with_base_url("http://localhost:5000/api/"),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/api");
    }

    #[test]
    fn test_default_settings_point_at_local_backend() {
        let settings = ClientSettings::new("secret");
        assert_eq!(settings.base_url, "http://localhost:5000/api");
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        for bad in ["localhost:5000", "ftp://example.com", ""] {
            let result = HttpTravelApi::new(ClientSettings::new("secret").with_base_url(bad));
            assert!(
                matches!(result, Err(ApiError::InvalidBaseUrl(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
