//! Configuration module for the rescue backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::MAX_MEDIA_BYTES;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Storage prefilter radius for volunteer matching. Must cover the largest
    /// personal notification radius.
    pub scan_radius_km: f64,
    /// Default radius for the nearby-cases query
    pub nearby_radius_km: f64,
    /// Maximum volunteers notified for a single new case
    pub match_limit: usize,
    /// Recipients per push batch
    pub notify_batch_size: usize,
    /// Accept requests allowed per caller per window
    pub accept_rate_limit: u32,
    /// Media upload requests allowed per caller per window
    pub upload_rate_limit: u32,
    pub rate_limit_window: Duration,
    /// Offset applied to UTC when evaluating volunteer quiet hours
    pub quiet_hours_utc_offset_minutes: i32,
    /// Base URL of the Nominatim-compatible geocoder
    pub geocoder_url: String,
    /// Directory holding uploaded case media
    pub media_dir: PathBuf,
    /// URL prefix the media directory is served under
    pub media_base_url: String,
    /// Largest accepted single file, in bytes
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("RESCUE_API_PSK").ok();

        let db_path = env::var("RESCUE_DB_PATH")
            .unwrap_or_else(|_| "./data/rescue.sqlite".to_string())
            .into();

        let bind_addr = env::var("RESCUE_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid RESCUE_BIND_ADDR format");

        let log_level = env::var("RESCUE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("RESCUE_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            log_format,
            scan_radius_km: env_or("RESCUE_SCAN_RADIUS_KM", 100.0),
            nearby_radius_km: env_or("RESCUE_NEARBY_RADIUS_KM", 10.0),
            match_limit: env_or("RESCUE_MATCH_LIMIT", 100),
            notify_batch_size: env_or("RESCUE_NOTIFY_BATCH_SIZE", 500),
            accept_rate_limit: env_or("RESCUE_ACCEPT_RATE_LIMIT", 10),
            upload_rate_limit: env_or("RESCUE_UPLOAD_RATE_LIMIT", 20),
            rate_limit_window: Duration::from_secs(env_or("RESCUE_RATE_LIMIT_WINDOW_SECS", 60)),
            quiet_hours_utc_offset_minutes: env_or("RESCUE_QUIET_HOURS_UTC_OFFSET_MINUTES", 0),
            geocoder_url: env::var("RESCUE_GEOCODER_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            media_dir: env::var("RESCUE_MEDIA_DIR")
                .unwrap_or_else(|_| "./data/media".to_string())
                .into(),
            media_base_url: env::var("RESCUE_MEDIA_BASE_URL")
                .unwrap_or_else(|_| "/media".to_string()),
            max_upload_bytes: env_or("RESCUE_MAX_UPLOAD_MB", MAX_MEDIA_BYTES / (1024 * 1024))
                * 1024
                * 1024,
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring malformed config value");
            default
        }),
        Err(_) => default,
    }
}
