//! Manager tunables
//!
//! Defaults match the behaviour skill plugins expect: a 5 minute idle window
//! swept every minute, three attempts per operation. Every value can be
//! overridden in code, from JSON (durations in milliseconds), or from
//! `SKILLMUX_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagerConfig {
    /// Pooled clients unused for longer than this are evicted by the sweep
    #[serde(rename = "idleTimeoutMs", with = "duration_ms")]
    pub idle_timeout: Duration,
    /// Period of the idle sweep
    #[serde(rename = "cleanupIntervalMs", with = "duration_ms")]
    pub cleanup_interval: Duration,
    /// Attempts per logical operation (stale/step-up recovery budget)
    pub max_attempts: u32,
    /// Upper bound for spawn + MCP handshake
    #[serde(rename = "connectTimeoutMs", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Grace period for a client to close before it is dropped (and killed)
    #[serde(rename = "closeTimeoutMs", with = "duration_ms")]
    pub close_timeout: Duration,
    /// Upper bound for an OAuth `login()` during step-up
    #[serde(rename = "loginTimeoutMs", with = "duration_ms")]
    pub login_timeout: Duration,
    /// Install SIGINT/SIGTERM teardown handlers
    pub handle_signals: bool,
    /// Exit the process after signal teardown
    pub exit_on_signal: bool,
    /// Client name announced in the MCP handshake
    pub client_name: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            handle_signals: true,
            exit_on_signal: true,
            client_name: "skillmux".to_string(),
        }
    }
}

impl ManagerConfig {
    /// Defaults overridden by `SKILLMUX_*` environment variables.
    ///
    /// Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ManagerConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let ms = |name: &str| -> Option<Duration> {
            let raw = lookup(name)?;
            match raw.trim().parse::<u64>() {
                Ok(v) => Some(Duration::from_millis(v)),
                Err(_) => {
                    warn!(variable = %name, value = %raw, "[ManagerConfig] Ignoring non-numeric duration");
                    None
                }
            }
        };
        let flag = |name: &str| -> Option<bool> {
            let raw = lookup(name)?;
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => {
                    warn!(variable = %name, value = %raw, "[ManagerConfig] Ignoring non-boolean flag");
                    None
                }
            }
        };

        if let Some(v) = ms("SKILLMUX_IDLE_TIMEOUT_MS") {
            config.idle_timeout = v;
        }
        if let Some(v) = ms("SKILLMUX_CLEANUP_INTERVAL_MS") {
            config.cleanup_interval = v;
        }
        if let Some(v) = ms("SKILLMUX_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = v;
        }
        if let Some(v) = ms("SKILLMUX_CLOSE_TIMEOUT_MS") {
            config.close_timeout = v;
        }
        if let Some(v) = ms("SKILLMUX_LOGIN_TIMEOUT_MS") {
            config.login_timeout = v;
        }
        if let Some(raw) = lookup("SKILLMUX_MAX_ATTEMPTS") {
            match raw.trim().parse::<u32>() {
                Ok(v) if v > 0 => config.max_attempts = v,
                _ => warn!(value = %raw, "[ManagerConfig] Ignoring invalid SKILLMUX_MAX_ATTEMPTS"),
            }
        }
        if let Some(v) = flag("SKILLMUX_HANDLE_SIGNALS") {
            config.handle_signals = v;
        }
        if let Some(v) = flag("SKILLMUX_EXIT_ON_SIGNAL") {
            config.exit_on_signal = v;
        }
        if let Some(name) = lookup("SKILLMUX_CLIENT_NAME").filter(|n| !n.trim().is_empty()) {
            config.client_name = name;
        }

        config
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn with_exit_on_signal(mut self, exit: bool) -> Self {
        self.exit_on_signal = exit;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
