mod configuration;
mod error;
mod routes;
mod state;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wayfarer::providers::get_provider;
use wayfarer::tools::ToolRegistry;
use wayfarer::travel::{self, FlightSearch};

use crate::configuration::Settings;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing for logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new()?;
    let addr = settings.server.socket_addr()?;
    let agent = settings.agent.to_config();
    let provider_type = settings.provider.provider_type();
    let provider = get_provider(settings.provider.into_config())?;

    let tools = ToolRegistry::new();
    travel::register_all(&tools, Arc::new(FlightSearch::from_env()));
    info!(provider = %provider_type, tools = tools.len(), "agent initialized");

    let state = AppState::new(provider, Arc::new(tools), agent);
    let app = routes::configure(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
