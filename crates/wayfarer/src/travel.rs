//! Travel planning tools the front ends register with the orchestrator.
//!
//! Everything here returns mock data except flight search, which queries Amadeus when
//! `AMADEUS_CLIENT_ID` and `AMADEUS_CLIENT_SECRET` are set.
mod amadeus;
mod flights;

pub use amadeus::{AmadeusClient, AMADEUS_HOST};
pub use flights::{FlightOffer, FlightSearch};

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use rand::seq::SliceRandom;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::tools::{ToolRegistry, DEFAULT_TTL};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Serialize, PartialEq)]
pub struct DateTimeInfo {
    pub datetime: String,
    pub date: String,
    pub time: String,
    pub day_of_week: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

pub fn current_datetime<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTimeInfo
where
    Tz::Offset: std::fmt::Display,
{
    DateTimeInfo {
        datetime: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        date: now.format("%Y-%m-%d").to_string(),
        time: now.format("%H:%M:%S").to_string(),
        day_of_week: now.format("%A").to_string(),
        year: now.year(),
        month: now.month(),
        day: now.day(),
        hour: now.hour(),
        minute: now.minute(),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ForecastArgs {
    /// City name, e.g. Rome
    pub location: String,
    /// Forecast date (YYYY-MM-DD)
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct Forecast {
    pub location: String,
    pub date: String,
    pub condition: String,
    pub temperature_celsius: i32,
    pub temperature_fahrenheit: i32,
}

const CONDITIONS: &[&str] = &["Sunny", "Cloudy", "Rainy", "Partly Cloudy"];

pub fn forecast<R: Rng>(rng: &mut R, args: ForecastArgs) -> Forecast {
    let celsius: i32 = rng.gen_range(10..=30);
    let condition = CONDITIONS.choose(rng).copied().unwrap_or("Sunny");
    Forecast {
        location: args.location,
        date: args.date,
        condition: condition.to_string(),
        temperature_celsius: celsius,
        temperature_fahrenheit: celsius * 9 / 5 + 32,
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FlightSearchArgs {
    /// Three-letter airport code (e.g., JFK)
    pub origin: String,
    /// Three-letter airport code (e.g., LHR)
    pub destination: String,
    /// Date of travel (YYYY-MM-DD)
    pub date: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BookFlightArgs {
    /// The ID of the flight to book, as returned by search_flights
    pub flight_id: String,
    /// Full name of the passenger
    pub passenger_name: String,
    /// Passport number of the passenger
    pub passport_number: String,
}

#[derive(Debug, Serialize)]
pub struct Booking {
    pub status: String,
    pub booking_reference: String,
    pub flight_id: String,
    pub passenger: String,
}

pub fn book_flight<R: Rng>(rng: &mut R, args: BookFlightArgs) -> Booking {
    info!(flight_id = %args.flight_id, "booking flight");
    Booking {
        status: "confirmed".to_string(),
        booking_reference: format!("BK{}", rng.gen_range(10000..=99999)),
        flight_id: args.flight_id,
        passenger: args.passenger_name,
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RentCarArgs {
    /// City or airport code
    pub location: String,
    /// Start date of the rental (YYYY-MM-DD)
    pub start_date: String,
    /// End date of the rental (YYYY-MM-DD)
    pub end_date: String,
    /// Type of car (compact, sedan, suv, luxury)
    #[serde(default = "default_car_type")]
    pub car_type: String,
}

fn default_car_type() -> String {
    "compact".to_string()
}

#[derive(Debug, Serialize)]
pub struct CarReservation {
    pub status: String,
    pub reservation_id: String,
    pub car_type: String,
    pub location: String,
    pub total_price: u32,
    pub currency: String,
}

// Every mock rental is quoted for three days
const RENTAL_DAYS: u32 = 3;

fn daily_rate(car_type: &str) -> u32 {
    match car_type.to_lowercase().as_str() {
        "compact" => 40,
        "sedan" => 60,
        "suv" => 90,
        "luxury" => 150,
        _ => 50,
    }
}

pub fn rent_car<R: Rng>(rng: &mut R, args: RentCarArgs) -> CarReservation {
    info!(
        car_type = %args.car_type,
        location = %args.location,
        start = %args.start_date,
        end = %args.end_date,
        "renting car"
    );
    CarReservation {
        status: "reserved".to_string(),
        reservation_id: format!("CAR{}", rng.gen_range(10000..=99999)),
        total_price: daily_rate(&args.car_type) * RENTAL_DAYS,
        car_type: args.car_type,
        location: args.location,
        currency: "USD".to_string(),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PaymentArgs {
    /// Amount to charge in major currency units, e.g. 100.00
    pub amount: f64,
    /// Currency code, e.g. EUR
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Customer email for the receipt
    pub customer_email: Option<String>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Payment {
    Success {
        transaction_id: String,
        amount: f64,
        currency: String,
        payment_status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        receipt_email: Option<String>,
        mock: bool,
    },
    Failed {
        error: String,
        message: String,
        amount: f64,
        currency: String,
    },
}

/// Amount that the mock processor always declines
const DECLINED_AMOUNT: f64 = 0.01;

pub fn process_payment<R: Rng>(rng: &mut R, args: PaymentArgs) -> Payment {
    let currency = args.currency.to_uppercase();
    info!(amount = args.amount, %currency, "processing mock payment");

    if (args.amount - DECLINED_AMOUNT).abs() < f64::EPSILON {
        return Payment::Failed {
            error: "card_declined".to_string(),
            message: "Your card was declined (mock).".to_string(),
            amount: args.amount,
            currency,
        };
    }

    Payment::Success {
        transaction_id: format!("MOCK_TXN_{}", rng.gen_range(100000..=999999)),
        amount: args.amount,
        currency,
        payment_status: "succeeded".to_string(),
        receipt_email: args.customer_email,
        mock: true,
    }
}

/// Register the whole travel toolset
pub fn register_all(registry: &ToolRegistry, flights: Arc<FlightSearch>) {
    registry.register_fn(
        "get_current_datetime",
        "Get the current date and time, including the day of the week.",
        |_: NoArgs| anyhow::Ok(current_datetime(&Local::now())),
    );
    registry.register_fn(
        "get_forecast",
        "Get the weather forecast for a city on a specific date.",
        |args: ForecastArgs| anyhow::Ok(forecast(&mut rand::thread_rng(), args)),
    );
    registry.register_async(
        "search_flights",
        "Search for flights between two airports on a specific date.",
        move |args: FlightSearchArgs| {
            let flights = flights.clone();
            async move {
                flights
                    .search(&args.origin, &args.destination, &args.date)
                    .await
            }
        },
    );
    registry.register_fn(
        "book_flight",
        "Book a specific flight for a passenger.",
        |args: BookFlightArgs| anyhow::Ok(book_flight(&mut rand::thread_rng(), args)),
    );
    registry.register_fn(
        "rent_car",
        "Rent a car at a specific location.",
        |args: RentCarArgs| anyhow::Ok(rent_car(&mut rand::thread_rng(), args)),
    );
    registry.register_fn(
        "process_payment",
        "Process a payment for a booking.",
        |args: PaymentArgs| anyhow::Ok(process_payment(&mut rand::thread_rng(), args)),
    );

    // Lookups only. Bookings and payments have side effects and always run.
    registry.cache_results("get_forecast", DEFAULT_TTL);
    registry.cache_results("search_flights", DEFAULT_TTL);
}
