//! Runtime settings, loadable from YAML.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Permission strings checked against the host's permission oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionNames {
    pub capture: String,
    pub release: String,
    /// Skips every land-claim check.
    pub bypass_claim: String,
}

impl Default for PermissionNames {
    fn default() -> Self {
        Self {
            capture: "vessel.capture".into(),
            release: "vessel.release".into(),
            bypass_claim: "vessel.bypass.claim".into(),
        }
    }
}

/// Every knob the capture/release flows read. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselConfig {
    pub check_permissions: bool,
    pub permissions: PermissionNames,
    /// Worlds where neither capture nor release is allowed.
    pub disabled_worlds: BTreeSet<String>,
    /// When false, trades are neither captured nor re-applied.
    pub save_trades: bool,
    pub container_name: String,
    pub custom_model_data: Option<i32>,
    pub actor_cooldown_ms: u64,
    pub location_cooldown_ms: u64,
    pub cooldown_sweep_ticks: u64,
    pub cache_ttl_ms: u64,
    pub cache_sweep_ticks: u64,
    pub claim_retry_max: u32,
    pub claim_retry_period_ticks: u64,
    pub sync_timeout_ms: u64,
    /// Message template overrides keyed by message id, e.g. `too-fast`.
    pub messages: BTreeMap<String, String>,
}

impl Default for VesselConfig {
    fn default() -> Self {
        Self {
            check_permissions: true,
            permissions: PermissionNames::default(),
            disabled_worlds: BTreeSet::new(),
            save_trades: true,
            container_name: "Merchant Vessel".into(),
            custom_model_data: Some(1000),
            actor_cooldown_ms: 1_000,
            location_cooldown_ms: 3_000,
            cooldown_sweep_ticks: 1_200,
            cache_ttl_ms: 30 * 60 * 1_000,
            cache_sweep_ticks: 36_000,
            claim_retry_max: 60,
            claim_retry_period_ticks: 100,
            sync_timeout_ms: 5_000,
            messages: BTreeMap::new(),
        }
    }
}

impl VesselConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&text)?;
        tracing::info!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn is_world_disabled(&self, world: &str) -> bool {
        self.disabled_worlds.contains(world)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}
