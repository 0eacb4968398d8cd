use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::amadeus::AmadeusClient;

const AIRLINES: &[(&str, &str)] = &[
    ("DL", "Delta Air Lines"),
    ("UA", "United Airlines"),
    ("BA", "British Airways"),
    ("LH", "Lufthansa"),
    ("AF", "Air France"),
    ("AA", "American Airlines"),
    ("EK", "Emirates"),
    ("RY", "Ryanair"),
    ("AZ", "ITA Airways"),
    ("TP", "TAP Air Portugal"),
    ("VS", "Virgin Atlantic"),
];

// Mock searches draw from the carriers every fare source knows about
const MOCK_CARRIERS: usize = 9;

/// Origin code that always comes back with next-day alternatives
const NO_FLIGHTS_ORIGIN: &str = "NOW";

lazy_static! {
    static ref IATA_CODE: Regex = Regex::new(r"^[A-Z]{3}$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOffer {
    pub flight_id: String,
    pub airline: String,
    pub airline_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_number: Option<String>,
    pub origin: String,
    pub destination: String,
    pub departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    pub price: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub booking_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_alternative: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_reason: Option<String>,
}

/// Flight search backed by Amadeus when credentials exist, mock fares otherwise
#[derive(Default)]
pub struct FlightSearch {
    amadeus: Option<AmadeusClient>,
}

impl FlightSearch {
    pub fn new(amadeus: Option<AmadeusClient>) -> Self {
        Self { amadeus }
    }

    pub fn from_env() -> Self {
        Self::new(AmadeusClient::from_env())
    }

    pub async fn search(
        &self,
        origin: &str,
        destination: &str,
        date: &str,
    ) -> Result<Vec<FlightOffer>> {
        let origin = airport_code(origin)?;
        let destination = airport_code(destination)?;

        if let Some(client) = &self.amadeus {
            match client.search_flights(&origin, &destination, date).await {
                Ok(offers) => return Ok(offers),
                Err(e) => warn!(error = %e, "amadeus search failed, using mock fares"),
            }
        }

        info!(%origin, %destination, date, "searching mock flights");
        Ok(mock_flights(
            &mut rand::thread_rng(),
            &origin,
            &destination,
            date,
        ))
    }
}

fn airport_code(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    if IATA_CODE.is_match(&code) {
        Ok(code)
    } else {
        Err(anyhow!(
            "'{}' is not a three-letter IATA airport code",
            code
        ))
    }
}

pub(crate) fn airline_name(code: &str) -> &str {
    AIRLINES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

pub(crate) fn booking_url(code: &str, origin: &str, destination: &str) -> String {
    format!(
        "https://www.google.com/search?q=flight+{}+{}+{}",
        code, origin, destination
    )
}

/// Fares are quoted in the origin's currency
fn origin_currency(origin: &str) -> (&'static str, f64) {
    match origin {
        "LHR" | "LGW" | "MAN" => ("GBP", 0.8),
        "CDG" | "FRA" | "FCO" | "MXP" | "AMS" | "MAD" => ("EUR", 0.92),
        "TYO" | "HND" | "NRT" => ("JPY", 150.0),
        _ => ("USD", 1.0),
    }
}

pub(crate) fn mock_flights<R: Rng>(
    rng: &mut R,
    origin: &str,
    destination: &str,
    date: &str,
) -> Vec<FlightOffer> {
    let (currency, multiplier) = origin_currency(origin);

    let (count, travel_date, reason) = if origin == NO_FLIGHTS_ORIGIN {
        let next_day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.succ_opt())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| date.to_string());
        let reason = format!(
            "No flights on {}. Showing results for {}.",
            date, next_day
        );
        (2, next_day, Some(reason))
    } else {
        (3, date.to_string(), None)
    };

    (0..count)
        .map(|_| {
            let (code, name) = AIRLINES[..MOCK_CARRIERS]
                .choose(rng)
                .copied()
                .unwrap_or(AIRLINES[0]);
            let flight_id = format!("{}{}", code, rng.gen_range(100..=999));
            let base_price: u32 = rng.gen_range(300..=1200);

            FlightOffer {
                flight_id,
                airline: format!("{} ({})", name, code),
                airline_code: code.to_string(),
                flight_number: None,
                origin: origin.to_string(),
                destination: destination.to_string(),
                departure_time: Some(format!(
                    "{}T{:02}:00:00",
                    travel_date,
                    rng.gen_range(6..=22)
                )),
                arrival_time: None,
                price: (base_price as f64 * multiplier).trunc(),
                currency: currency.to_string(),
                duration: None,
                booking_url: booking_url(code, origin, destination),
                is_alternative: reason.as_ref().map(|_| true),
                alternative_reason: reason.clone(),
            }
        })
        .collect()
}
