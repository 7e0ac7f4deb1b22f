//! Config loading and validation.

use super::model::Config;
use crate::error::{PatchbayError, Result};
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config from `path` if it exists, otherwise use defaults.
    ///
    /// A present but invalid file is an error, not a silent fallback.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| {
                PatchbayError::UserError(format!("failed to parse config YAML: {}", e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate config values.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_workers", self.max_workers as u64),
            ("merge_lock_timeout_secs", self.merge_lock_timeout_secs),
            ("merge_lock_poll_ms", self.merge_lock_poll_ms),
            ("lock_stale_minutes", u64::from(self.lock_stale_minutes)),
            ("test_gate.timeout_secs", self.test_gate.timeout_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        if self.run_root.trim().is_empty() {
            return Err(invalid("run_root must be non-empty".to_string()));
        }

        if let Some(generator) = &self.generator {
            if generator.command.trim().is_empty() {
                return Err(invalid("generator.command must be non-empty".to_string()));
            }
            if generator.timeout_secs == 0 {
                return Err(invalid(
                    "generator.timeout_secs must be greater than 0".to_string(),
                ));
            }
        }

        for (i, step) in self.test_gate.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(invalid(format!("test_gate.steps[{}].name must be non-empty", i)));
            }
            if step.command.trim().is_empty() {
                return Err(invalid(format!(
                    "test_gate.steps[{}] ('{}') has an empty command",
                    i, step.name
                )));
            }
        }

        Ok(())
    }
}

fn invalid(msg: String) -> PatchbayError {
    PatchbayError::UserError(format!("config validation failed: {}", msg))
}
