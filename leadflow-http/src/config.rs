use std::env;
use std::path::PathBuf;

use leadflow::activity::DEFAULT_CAPACITY;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7800";
const DEFAULT_MAX_BODY_MB: usize = 10;

/// Runtime settings for the HTTP server, resolved from `LEADFLOW_*`
/// environment variables. Unparseable numbers fall back to the default.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    /// When set, every `/1/*` route except the webhook receivers requires it.
    pub api_key: Option<String>,
    /// When set, webhook bodies must carry a valid HMAC signature.
    pub webhook_secret: Option<String>,
    pub max_body_mb: usize,
    /// Seconds between follow-up scheduler passes; 0 disables the scheduler.
    pub followup_tick_secs: u64,
    pub activity_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            data_dir: PathBuf::from("./data"),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            api_key: None,
            webhook_secret: None,
            max_body_mb: DEFAULT_MAX_BODY_MB,
            followup_tick_secs: 0,
            activity_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = ServerConfig::default();
        ServerConfig {
            data_dir: env::var("LEADFLOW_DATA_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            bind_addr: env::var("LEADFLOW_BIND_ADDR")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.bind_addr),
            api_key: non_empty_var("LEADFLOW_API_KEY"),
            webhook_secret: non_empty_var("LEADFLOW_WEBHOOK_SECRET"),
            max_body_mb: parsed_var("LEADFLOW_MAX_BODY_MB").unwrap_or(defaults.max_body_mb),
            followup_tick_secs: parsed_var("LEADFLOW_FOLLOWUP_TICK_SECS")
                .unwrap_or(defaults.followup_tick_secs),
            activity_capacity: parsed_var("LEADFLOW_ACTIVITY_CAPACITY")
                .unwrap_or(defaults.activity_capacity),
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
