use thiserror::Error;

use crate::config::{
    builtin_preset, DatabaseSettings, DelaySetting, NetworkPreset, NetworkSettings, ReloadSettings,
    ServerSettings, Settings, SourceSettings,
};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown reference: {0}")]
    UnknownReference(String),
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        errors.extend(Self::validate_server(&settings.server));
        errors.extend(Self::validate_sources(&settings.sources));
        errors.extend(Self::validate_network(&settings.network));
        errors.extend(Self::validate_database(&settings.database));
        errors.extend(Self::validate_reload(&settings.reload));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(server: &ServerSettings) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if server.host.is_empty() {
            errors.push(ValidationError::MissingField("server.host".to_string()));
        }

        // Port 0 binds an ephemeral port.

        if server.max_count == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "server.max_count".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        errors
    }

    fn validate_sources(sources: &SourceSettings) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if sources.paths.is_empty() {
            errors.push(ValidationError::MissingField("sources.paths".to_string()));
        }
        for (idx, pattern) in sources.paths.iter().enumerate() {
            if pattern.trim().is_empty() {
                errors.push(ValidationError::MissingField(format!("sources.paths[{}]", idx)));
            } else if let Err(e) = glob::Pattern::new(pattern) {
                errors.push(ValidationError::InvalidValue {
                    field: format!("sources.paths[{}]", idx),
                    reason: e.to_string(),
                });
            }
        }

        errors
    }

    fn validate_network(network: &NetworkSettings) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(name) = &network.preset {
            if builtin_preset(name).is_none() && !network.presets.contains_key(name) {
                errors.push(ValidationError::UnknownReference(format!(
                    "network.preset '{}' is neither built in nor defined under network.presets",
                    name
                )));
            }
        }

        errors.extend(Self::validate_preset("network", &network.explicit()));
        for (name, preset) in &network.presets {
            errors.extend(Self::validate_preset(&format!("network.presets.{}", name), preset));
        }

        errors
    }

    fn validate_preset(prefix: &str, preset: &NetworkPreset) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, rate) in [("error_rate", preset.error_rate), ("timeout_rate", preset.timeout_rate)] {
            if let Some(rate) = rate {
                if !(0.0..=1.0).contains(&rate) {
                    errors.push(ValidationError::InvalidValue {
                        field: format!("{}.{}", prefix, field),
                        reason: format!("{} is outside [0, 1]", rate),
                    });
                }
            }
        }

        if let Some(DelaySetting::Range(min, max)) = preset.delay {
            if min > max {
                errors.push(ValidationError::InvalidValue {
                    field: format!("{}.delay", prefix),
                    reason: format!("minimum {} exceeds maximum {}", min, max),
                });
            }
        }

        for code in preset.error_status_codes.iter().flatten() {
            if !(100..=599).contains(code) {
                errors.push(ValidationError::InvalidValue {
                    field: format!("{}.error_status_codes", prefix),
                    reason: format!("{} is not an HTTP status code", code),
                });
            }
        }

        for key in preset.error_messages.keys() {
            if key.trim().parse::<u16>().is_err() {
                errors.push(ValidationError::InvalidValue {
                    field: format!("{}.error_messages", prefix),
                    reason: format!("key '{}' is not a status code", key),
                });
            }
        }

        errors
    }

    fn validate_database(database: &DatabaseSettings) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if database.enabled && database.seed_count == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "database.seed_count".to_string(),
                reason: "must be greater than 0 when the database is enabled".to_string(),
            });
        }
        errors
    }

    fn validate_reload(reload: &ReloadSettings) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if reload.heartbeat_secs == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "reload.heartbeat_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        errors
    }
}
