//! Configuration loading and validation.

use crate::error::{Error, Result};
use crate::paths;
use crate::uniqueness;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest template size LocalDB accepts, in megabytes.
pub const MIN_TEMPLATE_SIZE_MB: u16 = 3;

/// Settings for one template cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSettings {
    /// LocalDB instance name. Also used as the default directory name.
    pub instance: String,

    /// Directory holding the template, marker and clone files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Initial size of new databases in megabytes.
    #[serde(default = "default_template_size")]
    pub template_size: u16,

    /// Explicit uniqueness token. Derived from the executable timestamp when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniqueness: Option<String>,

    /// Pre-built template files used instead of building one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_template: Option<ExistingTemplate>,
}

/// An externally supplied template file pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingTemplate {
    pub data_path: PathBuf,
    pub log_path: PathBuf,
}

fn default_template_size() -> u16 {
    MIN_TEMPLATE_SIZE_MB
}

impl TemplateSettings {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            directory: None,
            template_size: default_template_size(),
            uniqueness: None,
            existing_template: None,
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_template_size(mut self, size: u16) -> Self {
        self.template_size = size;
        self
    }

    pub fn with_uniqueness(mut self, uniqueness: impl Into<String>) -> Self {
        self.uniqueness = Some(uniqueness.into());
        self
    }

    pub fn with_existing_template(
        mut self,
        data_path: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        self.existing_template = Some(ExistingTemplate {
            data_path: data_path.into(),
            log_path: log_path.into(),
        });
        self
    }

    /// Load settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: TemplateSettings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Overlay `LOCALDB_TEMPLATE_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(directory) = var("LOCALDB_TEMPLATE_DIRECTORY") {
            self.directory = Some(PathBuf::from(directory));
        }

        if let Some(size) = var("LOCALDB_TEMPLATE_SIZE") {
            self.template_size = size.trim().parse().map_err(|_| {
                Error::config(format!(
                    "LOCALDB_TEMPLATE_SIZE must be a size in megabytes, got '{}'",
                    size
                ))
            })?;
        }

        if let Some(uniqueness) = var("LOCALDB_TEMPLATE_UNIQUENESS") {
            self.uniqueness = Some(uniqueness);
        }
        Ok(())
    }

    /// Check the instance name and template size.
    pub fn validate(&self) -> Result<()> {
        validate_file_name("instance", &self.instance)?;
        if self.template_size < MIN_TEMPLATE_SIZE_MB {
            return Err(Error::config(format!(
                "template_size must be at least {}MB, got {}MB",
                MIN_TEMPLATE_SIZE_MB, self.template_size
            )));
        }
        Ok(())
    }

    /// Configured directory, or the default one for the instance.
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| paths::default_directory(&self.instance))
    }

    /// The explicit uniqueness token, or one derived from the running executable.
    pub fn uniqueness_token(&self) -> Result<String> {
        match &self.uniqueness {
            Some(token) => Ok(token.clone()),
            None => uniqueness::from_current_exe(),
        }
    }
}

/// Reject names that cannot be used as a file name.
pub fn validate_file_name(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::config(format!("{} must not be empty", field)));
    }
    if let Some(c) = value
        .chars()
        .find(|&c| c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
    {
        return Err(Error::config(format!(
            "{} contains an invalid character {:?}: {}",
            field, c, value
        )));
    }
    Ok(())
}
