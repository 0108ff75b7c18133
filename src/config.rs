use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ShipperError;
use crate::sync::SyncConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub socket_url: String,
    pub log_level: String,
    pub store_dir: PathBuf,
    pub status_port: u16,
    pub offer_window_secs: u64,
    pub request_timeout_secs: u64,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub location_min_distance_m: f64,
    pub location_min_interval_secs: u64,
    pub shipper_phone: Option<String>,
    pub shipper_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            socket_url: "ws://localhost:8080/socket".to_string(),
            log_level: "info".to_string(),
            store_dir: PathBuf::from(".shipper-store"),
            status_port: 4000,
            offer_window_secs: 30,
            request_timeout_secs: 10,
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            http_timeout_secs: 15,
            location_min_distance_m: 25.0,
            location_min_interval_secs: 10,
            shipper_phone: None,
            shipper_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ShipperError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            socket_url: env::var("SOCKET_URL").unwrap_or(defaults.socket_url),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            store_dir: env::var("STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            status_port: parse_or_default("STATUS_PORT", defaults.status_port)?,
            offer_window_secs: parse_or_default("OFFER_WINDOW_SECS", defaults.offer_window_secs)?,
            request_timeout_secs: parse_or_default(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            reconnect_attempts: parse_or_default("RECONNECT_ATTEMPTS", defaults.reconnect_attempts)?,
            reconnect_delay_ms: parse_or_default("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms)?,
            http_timeout_secs: parse_or_default("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            location_min_distance_m: parse_or_default(
                "LOCATION_MIN_DISTANCE_M",
                defaults.location_min_distance_m,
            )?,
            location_min_interval_secs: parse_or_default(
                "LOCATION_MIN_INTERVAL_SECS",
                defaults.location_min_interval_secs,
            )?,
            shipper_phone: env::var("SHIPPER_PHONE").ok(),
            shipper_password: env::var("SHIPPER_PASSWORD").ok(),
        })
    }

    pub fn offer_window(&self) -> Duration {
        Duration::from_secs(self.offer_window_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn location_min_interval(&self) -> Duration {
        Duration::from_secs(self.location_min_interval_secs)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, ShipperError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| ShipperError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
