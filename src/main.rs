//! Bloc CRM - smart lead assignment backend
//!
//! Ingests sales leads from a spreadsheet webhook, assigns each one to a
//! caller via state-based round robin under daily caps, and streams
//! assignment events to dashboards over WebSocket.

mod models;
mod server;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = server::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(port = config.port, "starting Bloc CRM server");

    server::run_server(config).await
}

/// `LOG_LEVEL` feeds the filter; `LOG_FORMAT=json` selects single-line
/// JSON records, anything else the human-readable formatter.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
