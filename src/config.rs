use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    /// Max non-terminal orders an agent may hold at once.
    pub agent_order_cap: u32,
    pub offer_ttl: Duration,
    /// Candidate claim attempts per dispatch cycle.
    pub claim_retry_limit: u32,
    /// Expiry-driven reassignment cycles before an order is surfaced for
    /// manual dispatch.
    pub max_reassignments: u32,
    pub reaper_interval: Duration,
    /// Time-in-state after which a non-terminal order counts as stuck.
    pub stuck_threshold: Duration,
    pub store_retry_limit: u32,
    pub store_retry_base: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            agent_order_cap: parse_or_default("AGENT_ORDER_CAP", 1)?,
            offer_ttl: Duration::from_secs(parse_or_default("OFFER_TTL_SECS", 60)?),
            claim_retry_limit: parse_or_default("CLAIM_RETRY_LIMIT", 5)?,
            max_reassignments: parse_or_default("MAX_REASSIGNMENTS", 3)?,
            reaper_interval: Duration::from_millis(parse_or_default("REAPER_INTERVAL_MS", 1000)?),
            stuck_threshold: Duration::from_secs(parse_or_default("STUCK_THRESHOLD_SECS", 900)?),
            store_retry_limit: parse_or_default("STORE_RETRY_LIMIT", 4)?,
            store_retry_base: Duration::from_millis(parse_or_default("STORE_RETRY_BASE_MS", 50)?),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
