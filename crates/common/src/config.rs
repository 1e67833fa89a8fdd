use std::time::Duration;

use serde::Deserialize;

/// Provider ceiling for one push submission.
pub const MAX_PUSH_BATCH_SIZE: usize = 100;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string (membership store)
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Redis connection string (reminder dedup ledger)
    pub redis_url: String,

    /// Push delivery endpoint
    pub push_api_url: String,

    /// Optional bearer token for the push provider
    pub push_access_token: Option<String>,

    /// Messages per push submission (default: 100, never above the provider ceiling)
    pub push_batch_size: usize,

    /// Push chunks allowed in flight at once (default: 4)
    pub push_max_in_flight: usize,

    /// SMS delivery endpoint. SMS is disabled when unset.
    pub sms_api_url: Option<String>,

    /// Bearer credential for the SMS endpoint
    pub sms_api_key: Option<String>,

    /// Per-call timeout for every outbound HTTP collaborator
    pub http_timeout_secs: u64,

    /// How long a sent-reminder marker lives in Redis (default: 2 days)
    pub reminder_dedup_ttl_secs: u64,

    /// Hour of day (UTC) at which the reminder scheduler fires
    pub reminder_run_hour_utc: u32,

    /// HTTP listen port for the API server
    pub api_port: u16,
}

/// Connection settings for the push delivery collaborator.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub url: String,
    pub access_token: Option<String>,
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub timeout: Duration,
}

/// Connection settings for the SMS delivery collaborator.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let reminder_run_hour_utc: u32 = std::env::var("REMINDER_RUN_HOUR_UTC")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("REMINDER_RUN_HOUR_UTC must be a valid u32"))?;
        if reminder_run_hour_utc > 23 {
            anyhow::bail!("REMINDER_RUN_HOUR_UTC must be between 0 and 23");
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            push_api_url: std::env::var("PUSH_API_URL")
                .unwrap_or_else(|_| "https://exp.host/--/api/v2/push/send".to_string()),
            push_access_token: std::env::var("PUSH_ACCESS_TOKEN").ok(),
            push_batch_size: std::env::var("PUSH_BATCH_SIZE")
                .unwrap_or_else(|_| MAX_PUSH_BATCH_SIZE.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PUSH_BATCH_SIZE must be a valid usize"))?,
            push_max_in_flight: std::env::var("PUSH_MAX_IN_FLIGHT")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PUSH_MAX_IN_FLIGHT must be a valid usize"))?,
            sms_api_url: std::env::var("SMS_API_URL").ok(),
            sms_api_key: std::env::var("SMS_API_KEY").ok(),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a valid u64"))?,
            reminder_dedup_ttl_secs: std::env::var("REMINDER_DEDUP_TTL_SECS")
                .unwrap_or_else(|_| "172800".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REMINDER_DEDUP_TTL_SECS must be a valid u64"))?,
            reminder_run_hour_utc,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
        })
    }

    /// Push collaborator settings, with the batch size clamped to `1..=100`.
    pub fn push(&self) -> PushConfig {
        PushConfig {
            url: self.push_api_url.clone(),
            access_token: self.push_access_token.clone(),
            batch_size: self.push_batch_size.clamp(1, MAX_PUSH_BATCH_SIZE),
            max_in_flight: self.push_max_in_flight.max(1),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    /// SMS collaborator settings, or `None` when no SMS endpoint is configured.
    pub fn sms(&self) -> Option<SmsConfig> {
        self.sms_api_url.as_ref().map(|url| SmsConfig {
            url: url.clone(),
            api_key: self.sms_api_key.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        })
    }
}
