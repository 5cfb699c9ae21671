//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATA_DIR` (optional): root of the per-tenant asset tree (TTS cache,
///   alert sounds), defaults to `data`
/// - `SPEECH_KEY` (optional): speech service subscription key; when absent,
///   synthesis is disabled and purchases carry no audio URL
/// - `SPEECH_REGION` (optional): speech service region, defaults to `brazilsouth`
/// - `CHECKOUT_API_URL` (optional): payment provider checkout-link endpoint;
///   when empty, checkout creation only reserves the buyer locally
/// - `PUBLIC_BASE_URL` (optional): externally reachable base URL, used to
///   build the webhook/redirect URLs sent to the payment provider
/// - `ADMIN_TOKEN` (optional): bearer token required by the tenant
///   initialization endpoint; when absent, that endpoint is disabled
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub speech_key: Option<String>,

    #[serde(default = "default_speech_region")]
    pub speech_region: String,

    #[serde(default = "default_checkout_api_url")]
    pub checkout_api_url: String,

    #[serde(default)]
    pub public_base_url: Option<String>,

    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_speech_region() -> String {
    "brazilsouth".to_string()
}

fn default_checkout_api_url() -> String {
    "https://api.infinitepay.io/invoices/public/checkout/links".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}
