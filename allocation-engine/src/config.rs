//! Configuration for the allocation engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Allocation engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Donor eligibility rules
    pub eligibility: EligibilityConfig,

    /// Transaction behaviour
    pub allocation: AllocationConfig,

    /// Ledger / identity settings
    pub ledger: donation_ledger::Config,

    /// Log output
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "allocation-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            eligibility: EligibilityConfig::default(),
            allocation: AllocationConfig::default(),
            ledger: donation_ledger::Config::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Eligibility configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    /// Minimum calendar months between two donations
    pub cooldown_months: u32,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self { cooldown_months: 3 }
    }
}

/// Allocation transaction configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Per-lock wait before a transaction gives up with `Contention`
    pub lock_timeout_ms: u64,

    /// Lock/re-validate rounds before `Contention`
    pub max_lock_attempts: u32,

    /// Confirm donations from donors never reserved on the request
    pub allow_walk_in: bool,

    /// Reject assignments whose donor mismatches the blood group or is in cool-down
    pub screen_assignments: bool,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 250,
            max_lock_attempts: 3,
            allow_walk_in: false,
            screen_assignments: false,
        }
    }
}

impl AllocationConfig {
    /// Lock wait as a `Duration`
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Some(months) = env_parse("ALLOCATION_COOLDOWN_MONTHS")? {
            config.eligibility.cooldown_months = months;
        }

        if let Some(ms) = env_parse("ALLOCATION_LOCK_TIMEOUT_MS")? {
            config.allocation.lock_timeout_ms = ms;
        }

        if let Some(attempts) = env_parse("ALLOCATION_MAX_LOCK_ATTEMPTS")? {
            config.allocation.max_lock_attempts = attempts;
        }

        if let Some(walk_in) = env_parse("ALLOCATION_ALLOW_WALK_IN")? {
            config.allocation.allow_walk_in = walk_in;
        }

        if let Some(screen) = env_parse("ALLOCATION_SCREEN_ASSIGNMENTS")? {
            config.allocation.screen_assignments = screen;
        }

        if let Some(json) = env_parse("ALLOCATION_LOG_JSON")? {
            config.logging.json = json;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.eligibility.cooldown_months == 0 {
            return Err(crate::Error::Config(
                "eligibility.cooldown_months must be at least 1".to_string(),
            ));
        }
        if self.allocation.lock_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "allocation.lock_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.allocation.max_lock_attempts == 0 {
            return Err(crate::Error::Config(
                "allocation.max_lock_attempts must be at least 1".to_string(),
            ));
        }
        self.ledger.validate()?;
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> crate::Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| crate::Error::Config(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "allocation-engine");
        assert_eq!(config.eligibility.cooldown_months, 3);
        assert!(!config.allocation.allow_walk_in);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[eligibility]\ncooldown_months = 4\n\n[allocation]\nallow_walk_in = true"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.eligibility.cooldown_months, 4);
        assert!(config.allocation.allow_walk_in);
        assert_eq!(config.allocation.lock_timeout_ms, 250);
    }

    #[test]
    fn test_from_file_rejects_zero_cooldown() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[eligibility]\ncooldown_months = 0").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file("/nonexistent/allocation.toml");
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
