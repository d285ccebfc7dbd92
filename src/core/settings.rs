use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

use super::store::ProcessStore;

pub const SETTINGS_PREFIX: &str = "settings";
const SETTINGS_KEY: &str = "default";
const MIN_EDGE_KEY_LEN: usize = 3;

/// Edge-wide settings stored next to workload records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_secret: Option<String>,
}

impl Settings {
    fn validate(&self) -> Result<()> {
        if let Some(key) = &self.edge_key {
            if key.chars().count() < MIN_EDGE_KEY_LEN {
                return Err(Error::InvalidSettings {
                    message: format!("edge_key must be at least {MIN_EDGE_KEY_LEN} characters"),
                });
            }
        }
        Ok(())
    }
}

pub struct SettingsManager {
    store: Arc<dyn ProcessStore>,
}

impl SettingsManager {
    pub fn new(store: Arc<dyn ProcessStore>) -> Self {
        Self { store }
    }

    /// Stored settings, or defaults when nothing was saved yet.
    pub fn get(&self) -> Result<Settings> {
        match self.store.get(SETTINGS_PREFIX, SETTINGS_KEY) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| Error::DecodeRecord {
                key: format!("{SETTINGS_PREFIX}/{SETTINGS_KEY}"),
                source,
            }),
            Err(err) if err.is_not_found() => Ok(Settings::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the stored settings with a JSON document.
    pub fn overwrite_json(&self, body: &str) -> Result<Settings> {
        let settings: Settings = serde_json::from_str(body).map_err(|err| {
            warn!(error = %err, "settings body does not match schema");
            Error::InvalidSettings {
                message: err.to_string(),
            }
        })?;
        self.overwrite(settings)
    }

    pub fn overwrite(&self, settings: Settings) -> Result<Settings> {
        settings.validate()?;
        let bytes = serde_json::to_vec(&settings).map_err(|source| Error::EncodeRecord {
            name: SETTINGS_KEY.to_string(),
            source,
        })?;
        self.store.put(SETTINGS_PREFIX, SETTINGS_KEY, &bytes)?;
        info!(name = %settings.name, "settings overwritten");
        Ok(settings)
    }
}
