use mextrain_ai::{MAX_SKILL_LEVEL, MIN_SKILL_LEVEL};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

/// Server-wide knobs for sessions and computer players, editable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    /// Skill level for AI seats when a session does not pick one (1-5)
    pub default_skill_level: u8,
    /// Pause before an AI seat acts, in milliseconds
    pub ai_think_delay_ms: u64,
    /// Longest an AI decision may take before the turn is auto-played
    pub ai_decision_timeout_ms: u64,
    /// How long a disconnected player keeps control of their turns
    pub disconnect_grace_secs: u64,
    /// Session timeout in minutes of inactivity
    pub session_timeout_minutes: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_skill_level: 2,
            ai_think_delay_ms: 600,
            ai_decision_timeout_ms: 5_000,
            disconnect_grace_secs: 30,
            session_timeout_minutes: 30,
        }
    }
}

impl AppSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_SKILL_LEVEL..=MAX_SKILL_LEVEL).contains(&self.default_skill_level) {
            return Err(SettingsError::InvalidValue(format!(
                "default_skill_level must be between {MIN_SKILL_LEVEL} and {MAX_SKILL_LEVEL}"
            )));
        }

        if self.ai_decision_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "ai_decision_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.session_timeout_minutes == 0 {
            return Err(SettingsError::InvalidValue(
                "session_timeout_minutes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn think_delay(&self) -> Duration {
        Duration::from_millis(self.ai_think_delay_ms)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.ai_decision_timeout_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes * 60)
    }
}

/// In-memory settings store with validation
#[derive(Debug)]
pub struct SettingsStore {
    settings: RwLock<AppSettings>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(AppSettings::default()),
        }
    }

    pub fn with_settings(settings: AppSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            settings: RwLock::new(settings),
        })
    }

    pub fn get(&self) -> Result<AppSettings, SettingsError> {
        self.settings
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| SettingsError::StoragePoisoned)
    }

    /// Replaces every setting; nothing changes when validation fails.
    pub fn update(&self, new_settings: AppSettings) -> Result<AppSettings, SettingsError> {
        new_settings.validate()?;

        let mut guard = self
            .settings
            .write()
            .map_err(|_| SettingsError::StoragePoisoned)?;
        *guard = new_settings.clone();
        tracing::info!(settings = ?new_settings, "settings updated");
        Ok(new_settings)
    }

    pub fn update_field(
        &self,
        field: &str,
        value: serde_json::Value,
    ) -> Result<AppSettings, SettingsError> {
        let mut current = self.get()?;
        let number = || {
            value.as_u64().ok_or_else(|| {
                SettingsError::InvalidValue(format!("{field} must be a non-negative number"))
            })
        };

        match field {
            "default_skill_level" => {
                current.default_skill_level = u8::try_from(number()?).map_err(|_| {
                    SettingsError::InvalidValue("default_skill_level is out of range".to_string())
                })?;
            }
            "ai_think_delay_ms" => current.ai_think_delay_ms = number()?,
            "ai_decision_timeout_ms" => current.ai_decision_timeout_ms = number()?,
            "disconnect_grace_secs" => current.disconnect_grace_secs = number()?,
            "session_timeout_minutes" => current.session_timeout_minutes = number()?,
            _ => {
                return Err(SettingsError::InvalidValue(format!(
                    "unknown field: {}",
                    field
                )))
            }
        }

        self.update(current)
    }

    pub fn reset(&self) -> Result<AppSettings, SettingsError> {
        self.update(AppSettings::default())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
    #[error("Settings storage poisoned")]
    StoragePoisoned,
}

impl crate::errors::IntoErrorResponse for SettingsError {
    fn status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            SettingsError::InvalidValue(_) => StatusCode::BAD_REQUEST,
            SettingsError::StoragePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            SettingsError::InvalidValue(_) => "invalid_settings",
            SettingsError::StoragePoisoned => "settings_storage_error",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn severity(&self) -> crate::errors::ErrorSeverity {
        use crate::errors::ErrorSeverity;
        match self {
            SettingsError::InvalidValue(_) => ErrorSeverity::Client,
            SettingsError::StoragePoisoned => ErrorSeverity::Critical,
        }
    }
}
