//! Operator configuration loaded via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::finalizer::DEFAULT_FINALIZER;
use crate::operation::PollSettings;

const DEFAULT_NAMESPACE: &str = "kcp-system";
const DEFAULT_OPERATION_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_PROVIDER_FAILURE_DELAY_SECS: u64 = 300;
const DEFAULT_DEPENDENCY_RECHECK_DELAY_SECS: u64 = 30;
const DEFAULT_NUKE_POLL_INTERVAL_SECS: u64 = 10;

/// Settings shared by every reconciler, merged from defaults, `stratus.toml`,
/// `STRATUS_*` environment variables, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq, Serialize)]
#[ortho_config(
    prefix = "STRATUS",
    discovery(
        app_name = "stratus",
        env_var = "STRATUS_CONFIG_PATH",
        config_file_name = "stratus.toml",
        dotfile_name = ".stratus.toml",
        project_file_name = "stratus.toml"
    )
)]
pub struct OperatorConfig {
    /// Namespace holding control-plane objects.
    #[ortho_config(default = DEFAULT_NAMESPACE.to_owned())]
    pub namespace: String,
    /// Finalizer installed on every managed object.
    #[ortho_config(default = DEFAULT_FINALIZER.to_owned())]
    pub finalizer_name: String,
    /// Seconds between polls of a pending provider operation.
    #[ortho_config(default = DEFAULT_OPERATION_POLL_INTERVAL_SECS)]
    pub operation_poll_interval_secs: u64,
    /// Seconds to wait before retrying after a provider failure.
    #[ortho_config(default = DEFAULT_PROVIDER_FAILURE_DELAY_SECS)]
    pub provider_failure_delay_secs: u64,
    /// Seconds between checks of dependents blocking a deletion.
    #[ortho_config(default = DEFAULT_DEPENDENCY_RECHECK_DELAY_SECS)]
    pub dependency_recheck_delay_secs: u64,
    /// Seconds between Nuke passes over a scope.
    #[ortho_config(default = DEFAULT_NUKE_POLL_INTERVAL_SECS)]
    pub nuke_poll_interval_secs: u64,
}

impl OperatorConfig {
    /// Built-in defaults, as used when no source overrides a field.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            finalizer_name: DEFAULT_FINALIZER.to_owned(),
            operation_poll_interval_secs: DEFAULT_OPERATION_POLL_INTERVAL_SECS,
            provider_failure_delay_secs: DEFAULT_PROVIDER_FAILURE_DELAY_SECS,
            dependency_recheck_delay_secs: DEFAULT_DEPENDENCY_RECHECK_DELAY_SECS,
            nuke_poll_interval_secs: DEFAULT_NUKE_POLL_INTERVAL_SECS,
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn hint(&self) -> String {
        format!(
            "set {} or add {} to stratus.toml",
            self.env_var, self.toml_key
        )
    }
}

impl OperatorConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{} must be greater than zero: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Rejects blank names and zero delays.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank strings and
    /// [`ConfigError::InvalidValue`] for zero delays.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.namespace,
            &FieldMetadata::new("control-plane namespace", "STRATUS_NAMESPACE", "namespace"),
        )?;
        Self::require_field(
            &self.finalizer_name,
            &FieldMetadata::new(
                "finalizer name",
                "STRATUS_FINALIZER_NAME",
                "finalizer_name",
            ),
        )?;
        Self::require_positive(
            self.operation_poll_interval_secs,
            &FieldMetadata::new(
                "operation poll interval",
                "STRATUS_OPERATION_POLL_INTERVAL_SECS",
                "operation_poll_interval_secs",
            ),
        )?;
        Self::require_positive(
            self.provider_failure_delay_secs,
            &FieldMetadata::new(
                "provider failure delay",
                "STRATUS_PROVIDER_FAILURE_DELAY_SECS",
                "provider_failure_delay_secs",
            ),
        )?;
        Self::require_positive(
            self.dependency_recheck_delay_secs,
            &FieldMetadata::new(
                "dependency recheck delay",
                "STRATUS_DEPENDENCY_RECHECK_DELAY_SECS",
                "dependency_recheck_delay_secs",
            ),
        )?;
        Self::require_positive(
            self.nuke_poll_interval_secs,
            &FieldMetadata::new(
                "Nuke poll interval",
                "STRATUS_NUKE_POLL_INTERVAL_SECS",
                "nuke_poll_interval_secs",
            ),
        )?;
        Ok(())
    }

    /// Delays consumed by reconcilers.
    #[must_use]
    pub const fn timings(&self) -> Timings {
        Timings {
            operation_poll_interval: Duration::from_secs(self.operation_poll_interval_secs),
            provider_failure_delay: Duration::from_secs(self.provider_failure_delay_secs),
            dependency_recheck_delay: Duration::from_secs(self.dependency_recheck_delay_secs),
            nuke_poll_interval: Duration::from_secs(self.nuke_poll_interval_secs),
        }
    }
}

/// Delays used by reconcilers when they stop and retry later.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timings {
    /// Delay between polls of a pending provider operation.
    pub operation_poll_interval: Duration,
    /// Delay after a provider failure.
    pub provider_failure_delay: Duration,
    /// Delay while deletion is blocked by dependents.
    pub dependency_recheck_delay: Duration,
    /// Delay between Nuke passes.
    pub nuke_poll_interval: Duration,
}

impl Timings {
    /// Settings for operation polling.
    #[must_use]
    pub const fn poll_settings(&self) -> PollSettings {
        PollSettings::new(self.operation_poll_interval, self.provider_failure_delay)
    }
}

impl Default for Timings {
    fn default() -> Self {
        OperatorConfig::defaults().timings()
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn timings_default_follows_config_defaults() {
        assert_eq!(Timings::default(), OperatorConfig::defaults().timings());
        assert_eq!(
            Timings::default().dependency_recheck_delay,
            Duration::from_secs(DEFAULT_DEPENDENCY_RECHECK_DELAY_SECS)
        );
    }

    #[rstest]
    fn defaults_are_valid() {
        let config = OperatorConfig::defaults();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(
            config.timings().poll_settings(),
            PollSettings::new(Duration::from_secs(5), Duration::from_secs(300))
        );
    }

    #[rstest]
    #[case::namespace(
        OperatorConfig { namespace: String::from("  "), ..OperatorConfig::defaults() },
        "STRATUS_NAMESPACE"
    )]
    #[case::finalizer(
        OperatorConfig { finalizer_name: String::new(), ..OperatorConfig::defaults() },
        "STRATUS_FINALIZER_NAME"
    )]
    #[case::poll(
        OperatorConfig { operation_poll_interval_secs: 0, ..OperatorConfig::defaults() },
        "STRATUS_OPERATION_POLL_INTERVAL_SECS"
    )]
    #[case::nuke(
        OperatorConfig { nuke_poll_interval_secs: 0, ..OperatorConfig::defaults() },
        "STRATUS_NUKE_POLL_INTERVAL_SECS"
    )]
    fn validation_names_env_var_and_file(#[case] config: OperatorConfig, #[case] env_var: &str) {
        let message = config.validate().expect_err("invalid").to_string();
        assert!(message.contains(env_var), "{message}");
        assert!(message.contains("stratus.toml"), "{message}");
    }
}
