use clap::Parser;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::realtime::EventFilter;

/// Scoreboard score-update API with Supabase realtime mirroring
#[derive(Parser, Debug, Clone)]
#[command(name = "scoreboard-daemon", version, about)]
pub struct Config {
    /// HTTP listen port
    #[arg(long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// HTTP listen host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Deployment environment label (development, staging, production)
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub environment: String,

    /// Supabase project URL (e.g. https://xyz.supabase.co)
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase anon (public) API key
    #[arg(long, env = "SUPABASE_ANON_KEY")]
    pub supabase_anon_key: Option<String>,

    /// Supabase service-role key, preferred for table writes when set
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY")]
    pub supabase_service_role_key: Option<String>,

    /// Timeout for a single PostgREST request in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,

    /// Start the realtime scoreboard listener
    #[arg(
        long = "realtime",
        env = "REALTIME_ENABLED",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    pub realtime_enabled: bool,

    /// Change kinds mirrored from score_board: *, INSERT, UPDATE or DELETE
    #[arg(long, env = "REALTIME_EVENTS", default_value = "*")]
    pub realtime_events: EventFilter,

    /// Seconds between Phoenix heartbeat frames on realtime channels
    #[arg(long, env = "REALTIME_HEARTBEAT_SECS", default_value = "25")]
    pub heartbeat_interval_secs: u64,

    /// Seconds to wait for a channel join reply before reporting TIMED_OUT
    #[arg(long, env = "REALTIME_JOIN_TIMEOUT_SECS", default_value = "10")]
    pub join_timeout_secs: u64,

    /// Upper bound for tearing down a realtime channel
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value = "5")]
    pub shutdown_timeout_secs: u64,
}

/// Resolved Supabase connection settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub url: Url,
    pub anon_key: String,
    pub service_role_key: Option<String>,
}

impl StoreSettings {
    /// Key used for PostgREST writes: service role when present, anon otherwise.
    pub fn write_key(&self) -> &str {
        self.service_role_key.as_deref().unwrap_or(&self.anon_key)
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }
        if self.heartbeat_interval_secs == 0 {
            anyhow::bail!("heartbeat_interval_secs must be greater than 0");
        }
        if self.join_timeout_secs == 0 {
            anyhow::bail!("join_timeout_secs must be greater than 0");
        }
        if self.shutdown_timeout_secs == 0 {
            anyhow::bail!("shutdown_timeout_secs must be greater than 0");
        }
        if let Some(raw) = self.supabase_url.as_deref().filter(|s| !s.is_empty()) {
            let url = Url::parse(raw)
                .map_err(|e| anyhow::anyhow!("SUPABASE_URL is not a valid URL: {}", e))?;
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("SUPABASE_URL must use http or https, got '{}'", url.scheme());
            }
        }
        Ok(())
    }

    /// Supabase settings, or `None` (with a warning) when URL or anon key is missing.
    pub fn store_settings(&self) -> Option<StoreSettings> {
        let url = self.supabase_url.as_deref().filter(|s| !s.is_empty());
        let anon_key = self.supabase_anon_key.as_deref().filter(|s| !s.is_empty());
        match (url, anon_key) {
            (Some(url), Some(anon_key)) => Some(StoreSettings {
                url: Url::parse(url).ok()?,
                anon_key: anon_key.to_string(),
                service_role_key: self
                    .supabase_service_role_key
                    .clone()
                    .filter(|s| !s.is_empty()),
            }),
            _ => {
                warn!("SUPABASE_URL and SUPABASE_ANON_KEY are required for score storage and real-time features");
                None
            }
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
