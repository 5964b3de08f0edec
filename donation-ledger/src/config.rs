//! Configuration for identity issuance

use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum number of digits in a generated identity (`DREC001` → 3)
    pub id_width: usize,

    /// Prefix for donation record identities
    pub donation_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_width: 3,
            donation_prefix: "DREC".to_string(),
        }
    }
}

impl Config {
    /// Parse from a TOML fragment
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse ledger config: {}", e)))
    }

    /// Reject settings that would produce unusable identities
    pub fn validate(&self) -> crate::Result<()> {
        if self.id_width == 0 {
            return Err(crate::Error::Config("id_width must be at least 1".to_string()));
        }
        if self.donation_prefix.is_empty() {
            return Err(crate::Error::Config(
                "donation_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
