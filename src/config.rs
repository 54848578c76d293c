use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const FHIR_URL_ENV: &str = "FHIR_URL";
pub const FHIR_TIMEOUT_ENV: &str = "FHIR_TIMEOUT_SECS";

/// Namespaces of the three identifiers attached to every questionnaire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierSystems {
    pub survey: String,
    pub version: String,
    pub questionnaire: String,
}

impl Default for IdentifierSystems {
    fn default() -> Self {
        Self {
            survey: "https://qualtrics.com/survey/id".to_string(),
            version: "https://qualtrics.com/survey/version".to_string(),
            questionnaire: "urn:fhir:questionnaire:id".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub fhir_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub identifier_systems: IdentifierSystems,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fhir_url: String::new(),
            timeout_secs: default_timeout_secs(),
            identifier_systems: IdentifierSystems::default(),
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Applies `FHIR_URL` and `FHIR_TIMEOUT_SECS` on top of file values.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup(FHIR_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.fhir_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(FHIR_TIMEOUT_ENV).filter(|v| !v.trim().is_empty()) {
            self.timeout_secs = raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {FHIR_TIMEOUT_ENV} '{raw}': {e}")))?;
        }
        Ok(self)
    }
}

/// Reads settings from `path`. A missing or empty file yields defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid settings {}: {e}", path.display())))
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_string_pretty(settings)
        .map_err(|e| Error::Config(format!("unable to serialize settings: {e}")))?;
    fs::write(path, payload)?;
    Ok(())
}
