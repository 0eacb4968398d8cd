use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::flights::{airline_name, booking_url, FlightOffer};
use crate::auth::{request_client_credentials, TokenCache};
use crate::providers::utils::handle_response;

pub const AMADEUS_HOST: &str = "https://test.api.amadeus.com";

const TOKEN_PATH: &str = "/v1/security/oauth2/token";
const SEARCH_PATH: &str = "/v2/shopping/flight-offers";
const MAX_OFFERS: &str = "5";

/// Flight Offers Search client. Owns its token cache, so two clients never share a token.
pub struct AmadeusClient {
    client: Client,
    host: String,
    client_id: String,
    client_secret: String,
    tokens: TokenCache,
}

impl AmadeusClient {
    pub fn new<H, I, S>(host: H, client_id: I, client_secret: S) -> Result<Self>
    where
        H: Into<String>,
        I: Into<String>,
        S: Into<String>,
    {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            host: host.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tokens: TokenCache::new(),
        })
    }

    /// Build a client from `AMADEUS_CLIENT_ID` and `AMADEUS_CLIENT_SECRET`, if both are set
    pub fn from_env() -> Option<Self> {
        let client_id = non_empty_var("AMADEUS_CLIENT_ID")?;
        let client_secret = non_empty_var("AMADEUS_CLIENT_SECRET")?;
        let host = non_empty_var("AMADEUS_HOST").unwrap_or_else(|| AMADEUS_HOST.to_string());

        match Self::new(host, client_id, client_secret) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "could not build the amadeus client");
                None
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String> {
        let token_url = self.url(TOKEN_PATH);
        self.tokens
            .get_or_refresh(|| {
                request_client_credentials(
                    &self.client,
                    &token_url,
                    &self.client_id,
                    &self.client_secret,
                )
            })
            .await
    }

    /// Search one-way offers for a single adult, at most five of them
    pub async fn search_flights(
        &self,
        origin: &str,
        destination: &str,
        date: &str,
    ) -> Result<Vec<FlightOffer>> {
        let token = self.access_token().await?;
        let url = Url::parse_with_params(
            &self.url(SEARCH_PATH),
            &[
                ("originLocationCode", origin),
                ("destinationLocationCode", destination),
                ("departureDate", date),
                ("adults", "1"),
                ("max", MAX_OFFERS),
            ],
        )?;

        let response = self.client.get(url).bearer_auth(token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        let body = handle_response("Amadeus", response).await?;

        let offers = parse_offers(&body, origin, destination);
        debug!(count = offers.len(), "amadeus flight offers");
        Ok(offers)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Flatten each offer to its first itinerary's first segment
fn parse_offers(body: &Value, origin: &str, destination: &str) -> Vec<FlightOffer> {
    let Some(offers) = body.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    offers
        .iter()
        .map(|offer| {
            let itinerary = &offer["itineraries"][0];
            let segment = &itinerary["segments"][0];
            let price = &offer["price"];
            let code = segment["carrierCode"].as_str().unwrap_or("Unknown");
            let number = segment["number"].as_str().unwrap_or("000");

            FlightOffer {
                flight_id: offer["id"].as_str().unwrap_or_default().to_string(),
                airline: format!("{} ({})", airline_name(code), code),
                airline_code: code.to_string(),
                flight_number: Some(format!("{}{}", code, number)),
                origin: origin.to_string(),
                destination: destination.to_string(),
                departure_time: segment["departure"]["at"].as_str().map(String::from),
                arrival_time: segment["arrival"]["at"].as_str().map(String::from),
                price: price["total"]
                    .as_str()
                    .and_then(|total| total.parse().ok())
                    .unwrap_or(0.0),
                currency: price["currency"].as_str().unwrap_or("USD").to_string(),
                duration: itinerary["duration"].as_str().map(String::from),
                booking_url: booking_url(code, origin, destination),
                is_alternative: None,
                alternative_reason: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "amadeus-token",
                "expires_in": 1799
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_search_flights() -> Result<()> {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(header("Authorization", "Bearer amadeus-token"))
            .and(query_param("originLocationCode", "LIS"))
            .and(query_param("destinationLocationCode", "FCO"))
            .and(query_param("departureDate", "2026-11-02"))
            .and(query_param("adults", "1"))
            .and(query_param("max", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "1",
                    "itineraries": [{
                        "duration": "PT3H05M",
                        "segments": [{
                            "carrierCode": "TP",
                            "number": "836",
                            "departure": {"iataCode": "LIS", "at": "2026-11-02T07:15:00"},
                            "arrival": {"iataCode": "FCO", "at": "2026-11-02T11:20:00"}
                        }]
                    }],
                    "price": {"currency": "EUR", "total": "142.37"}
                }]
            })))
            .mount(&server)
            .await;

        let client = AmadeusClient::new(server.uri(), "id", "secret")?;
        let offers = client.search_flights("LIS", "FCO", "2026-11-02").await?;
        // the second search reuses the cached token
        client.search_flights("LIS", "FCO", "2026-11-02").await?;

        assert_eq!(offers.len(), 1);
        let offer = &offers[0];
        assert_eq!(offer.flight_id, "1");
        assert_eq!(offer.airline, "TAP Air Portugal (TP)");
        assert_eq!(offer.flight_number.as_deref(), Some("TP836"));
        assert_eq!(offer.departure_time.as_deref(), Some("2026-11-02T07:15:00"));
        assert_eq!(offer.price, 142.37);
        assert_eq!(offer.currency, "EUR");
        assert_eq!(offer.duration.as_deref(), Some("PT3H05M"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthorized_drops_cached_token() -> Result<()> {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let client = AmadeusClient::new(server.uri(), "id", "secret")?;
        let err = client
            .search_flights("LIS", "FCO", "2026-11-02")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(client.tokens.get().await.is_none());

        client
            .search_flights("LIS", "FCO", "2026-11-02")
            .await
            .unwrap_err();
        Ok(())
    }

    #[test]
    fn test_parse_offers_without_data() {
        assert!(parse_offers(&json!({"errors": []}), "LIS", "FCO").is_empty());
    }
}
