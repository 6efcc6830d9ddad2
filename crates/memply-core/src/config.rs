//! Memply configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemplyConfig {
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub serve: ServeConfig,
}

impl Default for MemplyConfig {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleConfig::default(),
            reminder: ReminderConfig::default(),
            rate: RateConfig::default(),
            smtp: SmtpConfig::default(),
            store: StoreConfig::default(),
            serve: ServeConfig::default(),
        }
    }
}

impl MemplyConfig {
    /// Load config from the default path (~/.memply/config.toml).
    /// A missing file yields the built-in defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::MemplyError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::MemplyError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::MemplyError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Memply home directory (~/.memply).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".memply")
    }
}

/// Lifecycle thresholds, in days. Loaded per run; read-only while a run
/// is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Days after expiry before a member is marked expired.
    #[serde(default = "default_grace_period")]
    pub grace_period_days: i64,
    /// Days after expiry before an expired member is auto-suspended.
    #[serde(default = "default_auto_suspend")]
    pub auto_suspend_days: i64,
    /// Days since last payment before a suspended/expired member is
    /// marked inactive.
    #[serde(default = "default_auto_inactive")]
    pub auto_inactive_days: i64,
}

fn default_grace_period() -> i64 { 7 }
fn default_auto_suspend() -> i64 { 45 }
fn default_auto_inactive() -> i64 { 90 }

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grace_period_days: default_grace_period(),
            auto_suspend_days: default_auto_suspend(),
            auto_inactive_days: default_auto_inactive(),
        }
    }
}

/// Reminder selection window and message templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Members expiring within [today, today + window] are candidates.
    #[serde(default = "default_window")]
    pub window_days: i64,
    #[serde(default = "default_subject_template")]
    pub subject_template: String,
    #[serde(default = "default_body_template")]
    pub body_template: String,
}

fn default_window() -> i64 { 3 }
fn default_subject_template() -> String {
    "Your {{membershipName}} membership expires in {{daysUntilExpiry}} day(s)".into()
}
fn default_body_template() -> String {
    "Hi {{memberName}},\n\n\
     Your {{membershipName}} membership expires on {{expiryDate}}.\n\
     Renew now for {{price}} to keep your access without interruption.\n\n\
     Thanks,\nThe membership team"
        .into()
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            window_days: default_window(),
            subject_template: default_subject_template(),
            body_template: default_body_template(),
        }
    }
}

/// Send-rate limits. `max_per_day`/`max_per_batch`/`batch_delay_minutes`
/// seed the per-day rate-control row on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    #[serde(default = "default_max_per_day")]
    pub max_per_day: u32,
    #[serde(default = "default_max_per_batch")]
    pub max_per_batch: u32,
    /// Minimum gap between batches.
    #[serde(default = "default_batch_delay")]
    pub batch_delay_minutes: i64,
    /// Anti-burst delay between individual sends within a sub-batch.
    #[serde(default = "default_send_delay")]
    pub send_delay_secs: u64,
}

fn default_max_per_day() -> u32 { 50 }
fn default_max_per_batch() -> u32 { 10 }
fn default_batch_delay() -> i64 { 5 }
fn default_send_delay() -> u64 { 2 }

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            max_per_day: default_max_per_day(),
            max_per_batch: default_max_per_batch(),
            batch_delay_minutes: default_batch_delay(),
            send_delay_secs: default_send_delay(),
        }
    }
}

/// SMTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

fn default_smtp_port() -> u16 { 587 }

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            from_name: None,
        }
    }
}

/// Store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    MemplyConfig::home_dir().join("memply.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

/// Serve-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    /// How often the serve loop wakes up and attempts a run.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_check_interval() -> u64 { 3600 }

impl Default for ServeConfig {
    fn default() -> Self {
        Self { check_interval_secs: default_check_interval() }
    }
}
