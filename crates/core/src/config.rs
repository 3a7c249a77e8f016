use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    pub scheduler: SchedulerConfig,
    pub fetcher: FetcherConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `NEWSWIRE_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("NEWSWIRE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            database: DatabaseConfig::from_env_profiled(p),
            bus: BusConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            fetcher: FetcherConfig::from_env_profiled(p),
            logging: LoggingConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  database:    {}",
            if self.database.is_configured() { "postgres" } else { "in-memory" }
        );
        tracing::info!(
            "  bus:         enabled={}, url={}, subject={}",
            self.bus.enabled, self.bus.nats_url, self.bus.subject
        );
        tracing::info!(
            "  scheduler:   interval={}s, fetch_limit={}",
            self.scheduler.interval_secs, self.scheduler.fetch_limit
        );
        tracing::info!("  fetcher:     mode={}, url={}", self.fetcher.mode, self.fetcher.base_url);
        tracing::info!("  logging:     dir={}", self.logging.dir.display());
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8000),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Database ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. `None` selects the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "DATABASE_URL"),
            max_connections: profiled_env_u64(p, "DATABASE_MAX_CONNECTIONS", 10) as u32,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

// ── Bus (NATS) ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub enabled: bool,
    pub nats_url: String,
    pub subject: String,
    pub connect_timeout_secs: u64,
}

impl BusConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            enabled: profiled_env_bool(p, "BUS_ENABLED", true),
            nats_url: profiled_env_or(p, "NATS_URL", "nats://localhost:4222"),
            subject: profiled_env_or(p, "NATS_SUBJECT", "items.updates"),
            connect_timeout_secs: profiled_env_u64(p, "NATS_CONNECT_TIMEOUT_SECS", 2),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub fetch_limit: usize,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            interval_secs: profiled_env_u64(p, "FETCH_INTERVAL_SECONDS", 300),
            fetch_limit: profiled_env_u64(p, "FETCH_LIMIT", 10) as usize,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

// ── Fetcher ───────────────────────────────────────────────────

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// "html" scrapes `base_url`; "static" serves the built-in fallback list.
    pub mode: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl FetcherConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            mode: profiled_env_or(p, "FETCH_MODE", "html"),
            base_url: profiled_env_or(p, "FETCH_URL", "https://www.hltv.org"),
            timeout_secs: profiled_env_u64(p, "FETCH_TIMEOUT_SECS", 60),
            user_agent: profiled_env_or(p, "FETCH_USER_AGENT", DEFAULT_USER_AGENT),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Logging ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl LoggingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            dir: PathBuf::from(profiled_env_or(p, "LOG_DIR", "logs")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; every test uses its own profile prefix.

    #[test]
    fn profiled_key_wins_over_plain_key() {
        env::set_var("CFGTEST_A_FETCH_INTERVAL_SECONDS", "42");
        let config = Config::for_profile("cfgtest_a");
        assert_eq!(config.scheduler.interval_secs, 42);
        assert_eq!(config.profile_label(), "CFGTEST_A");
        env::remove_var("CFGTEST_A_FETCH_INTERVAL_SECONDS");
    }

    #[test]
    fn bus_flag_parsing() {
        env::set_var("CFGTEST_B_BUS_ENABLED", "false");
        assert!(!Config::for_profile("CFGTEST_B").bus.enabled);
        env::set_var("CFGTEST_B_BUS_ENABLED", "garbage");
        assert!(Config::for_profile("CFGTEST_B").bus.enabled);
        env::remove_var("CFGTEST_B_BUS_ENABLED");
    }

    #[test]
    fn interval_is_never_zero() {
        let scheduler = SchedulerConfig { interval_secs: 0, fetch_limit: 10 };
        assert_eq!(scheduler.interval(), Duration::from_secs(1));
    }
}
