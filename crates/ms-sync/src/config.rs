//! Sync configuration (`msync.toml`).
//!
//! Every field has a default, so an empty file (or no file at all) describes
//! the stock setup: `meditatev4` scanned for sessions, `meditate-early`
//! kept in sync, window 05:00–08:30 America/New_York, 35 minutes minimum.
//! Credentials normally come from the environment rather than the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use ms_remote::RetryPolicy;

use crate::error::ConfigError;
use crate::qualify::QualificationRule;

/// Environment variables that override file settings.
pub const ENV_USERNAME: &str = "BEEMINDER_USERNAME";
pub const ENV_AUTH_TOKEN: &str = "BEEMINDER_AUTH_TOKEN";
pub const ENV_GOAL: &str = "BEEMINDER_GOAL_SLUG";
pub const ENV_SOURCE_GOAL: &str = "BEEMINDER_SOURCE_GOAL_SLUG";
pub const ENV_LEDGER_PATH: &str = "MSYNC_LEDGER_PATH";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub beeminder: BeeminderConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub qualify: QualifyConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Account and goal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeeminderConfig {
    #[serde(default = "default_username")]
    pub username: String,

    /// Prefer `BEEMINDER_AUTH_TOKEN` over putting the token in the file.
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,

    /// Goal kept in exact sync with the ledger.
    #[serde(default = "default_goal")]
    pub goal: String,

    /// Goal scanned for raw meditation sessions.
    #[serde(default = "default_source_goal")]
    pub source_goal: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for BeeminderConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            auth_token: None,
            goal: default_goal(),
            source_goal: default_source_goal(),
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Qualification rule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualifyConfig {
    /// IANA zone the window is evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Inclusive lower bound, `HH:MM`.
    #[serde(default = "default_window_start")]
    pub window_start: String,

    /// Exclusive upper bound, `HH:MM`.
    #[serde(default = "default_window_end")]
    pub window_end: String,

    #[serde(default = "default_min_duration")]
    pub min_duration_minutes: u32,

    /// Keep at most one qualifying session per local day.
    #[serde(default = "default_one_per_day")]
    pub one_per_day: bool,

    /// Only scan source events from the last N days. Unset scans everything.
    #[serde(default)]
    pub lookback_days: Option<u32>,
}

impl Default for QualifyConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            window_start: default_window_start(),
            window_end: default_window_end(),
            min_duration_minutes: default_min_duration(),
            one_per_day: default_one_per_day(),
            lookback_days: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

// Serde default functions
fn default_username() -> String {
    "zarathustra".to_string()
}

fn default_goal() -> String {
    "meditate-early".to_string()
}

fn default_source_goal() -> String {
    "meditatev4".to_string()
}

fn default_base_url() -> String {
    ms_remote::beeminder::DEFAULT_BASE_URL.to_string()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/meditation_sot.json")
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_window_start() -> String {
    "05:00".to_string()
}

fn default_window_end() -> String {
    "08:30".to_string()
}

fn default_min_duration() -> u32 {
    35
}

fn default_one_per_day() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

impl SyncConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load the file if it exists, otherwise use defaults. A file that
    /// exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides. `lookup` is `std::env::var(..).ok()` in
    /// production and a map in tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_USERNAME) {
            self.beeminder.username = v;
        }
        if let Some(v) = non_empty(ENV_AUTH_TOKEN) {
            self.beeminder.auth_token = Some(v);
        }
        if let Some(v) = non_empty(ENV_GOAL) {
            self.beeminder.goal = v;
        }
        if let Some(v) = non_empty(ENV_SOURCE_GOAL) {
            self.beeminder.source_goal = v;
        }
        if let Some(v) = non_empty(ENV_LEDGER_PATH) {
            self.ledger.path = PathBuf::from(v);
        }
    }

    /// The auth token, required by every command that talks to the service.
    pub fn auth_token(&self) -> Result<&str, ConfigError> {
        self.beeminder
            .auth_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingAuthToken)
    }
}

impl QualifyConfig {
    /// Build the qualification rule, validating zone and window bounds.
    pub fn rule(&self) -> Result<QualificationRule, ConfigError> {
        let tz: Tz = self
            .timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))?;
        let start = parse_clock(&self.window_start)?;
        let end = parse_clock(&self.window_end)?;
        if start >= end {
            return Err(ConfigError::InvalidWindow {
                start: self.window_start.clone(),
                end: self.window_end.clone(),
            });
        }
        Ok(QualificationRule::new(tz, start, end, self.min_duration_minutes))
    }

    pub fn lookback(&self) -> Option<chrono::Duration> {
        self.lookback_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

fn parse_clock(text: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .map_err(|_| ConfigError::InvalidTime(text.to_string()))
}
