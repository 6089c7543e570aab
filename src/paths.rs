//! File layout and connection strings for a template cache.
//!
//! Everything lives in one directory per instance:
//! - `template.mdf` / `template_log.ldf` - the cached template
//! - `uniqueness.txt` - token of the last successful template build
//! - `{name}.mdf` / `{name}_log.ldf` - one pair per clone

use crate::config::ExistingTemplate;
use std::path::{Path, PathBuf};

/// Database name reserved for the template.
pub const TEMPLATE_NAME: &str = "template";

/// Database name of the shared rollback clone.
pub const WITH_ROLLBACK_NAME: &str = "withRollback";

pub const DATA_EXTENSION: &str = "mdf";
pub const LOG_EXTENSION: &str = "ldf";
pub const UNIQUENESS_FILE: &str = "uniqueness.txt";

/// Resolved file locations for one cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePaths {
    directory: PathBuf,
    data_file: PathBuf,
    log_file: PathBuf,
    uniqueness_file: PathBuf,
}

impl TemplatePaths {
    pub fn new(directory: impl Into<PathBuf>, existing: Option<&ExistingTemplate>) -> Self {
        let directory = directory.into();
        let (data_file, log_file) = match existing {
            Some(existing) => (existing.data_path.clone(), existing.log_path.clone()),
            None => database_files(&directory, TEMPLATE_NAME),
        };
        Self {
            uniqueness_file: directory.join(UNIQUENESS_FILE),
            directory,
            data_file,
            log_file,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn uniqueness_file(&self) -> &Path {
        &self.uniqueness_file
    }

    /// Data and log file for a clone called `name`.
    pub fn clone_files(&self, name: &str) -> (PathBuf, PathBuf) {
        database_files(&self.directory, name)
    }
}

fn database_files(directory: &Path, name: &str) -> (PathBuf, PathBuf) {
    (
        directory.join(format!("{}.{}", name, DATA_EXTENSION)),
        directory.join(format!("{}_log.{}", name, LOG_EXTENSION)),
    )
}

/// `(LocalDb)\{instance}`
pub fn server_name(instance: &str) -> String {
    format!(r"(LocalDb)\{}", instance)
}

pub fn connection_string(instance: &str, database: &str) -> String {
    format!(
        "Data Source={};Database={};Integrated Security=True",
        server_name(instance),
        database
    )
}

/// Default directory for an instance.
///
/// `$LocalDBData/{instance}` when the variable is set, otherwise
/// `LocalDb/{instance}` under the user cache directory (or the temp directory).
pub fn default_directory(instance: &str) -> PathBuf {
    if let Ok(root) = std::env::var("LocalDBData") {
        return PathBuf::from(root).join(instance);
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("LocalDb")
        .join(instance)
}
