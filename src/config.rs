use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    /// Default ticket TTL for newly enabled policies, in seconds.
    pub ticket_ttl_secs: u64,
    /// Default expected per-submission duration, in seconds.
    pub avg_processing_secs: u64,
    /// Default advertised wait cap, in minutes.
    pub max_wait_minutes: u32,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "3310"),
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379"),
            ticket_ttl_secs: try_load("WAITROOM_TICKET_TTL_SECS", "45"),
            avg_processing_secs: try_load("WAITROOM_AVG_PROCESSING_SECS", "30"),
            max_wait_minutes: try_load("WAITROOM_MAX_WAIT_MINUTES", "30"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
