//! Server configuration loaded from environment variables

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// When set, webhook requests must carry a matching X-Webhook-Secret header.
    pub webhook_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable not set".to_string())?;

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8000);

        let cors_origins = parse_cors_origins(
            &env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".to_string()),
        );

        let webhook_secret = env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());

        Ok(Self {
            database_url,
            port,
            cors_origins,
            webhook_secret,
        })
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
