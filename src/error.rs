//! Error types for the template cache.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid settings or arguments, detected before any I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A clone was requested before `start` was called.
    #[error("The template cache has not been started")]
    NotStarted,

    /// The template build failed. Stored once and shared with every awaiter.
    #[error(
        "Failed to build template. instance: {instance}, directory: {}, uniqueness: {uniqueness}: {source}",
        directory.display()
    )]
    Build {
        instance: String,
        directory: PathBuf,
        uniqueness: String,
        #[source]
        source: Box<Error>,
    },

    /// Re-surfaced outcome of a failed template build.
    #[error(transparent)]
    Template(Arc<Error>),

    /// Re-surfaced outcome of the first attempt to create the rollback clone.
    #[error(transparent)]
    RollbackClone(Arc<Error>),

    /// The build task ended without reporting an outcome.
    #[error("The template build task ended without completing")]
    BuildAbandoned,

    #[error("Failed to create database '{name}': {source}")]
    Clone {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Clone callback failed: {0}")]
    Callback(#[source] Box<Error>),

    #[error("Instance error: {0}")]
    Instance(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Short alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn instance(msg: impl Into<String>) -> Self {
        Self::Instance(msg.into())
    }

    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// The shared build failure behind this error, if it is one.
    pub fn shared_build_failure(&self) -> Option<&Arc<Error>> {
        match self {
            Self::Template(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_mentions_context() {
        let err = Error::Build {
            instance: "Tests".to_string(),
            directory: PathBuf::from("/tmp/LocalDb/Tests"),
            uniqueness: "v1".to_string(),
            source: Box::new(Error::command("boom")),
        };
        let message = err.to_string();
        assert!(message.contains("instance: Tests"));
        assert!(message.contains("uniqueness: v1"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_shared_build_failure_is_exposed() {
        let shared = Arc::new(Error::command("broken"));
        let err = Error::Template(Arc::clone(&shared));
        assert!(Arc::ptr_eq(err.shared_build_failure().unwrap(), &shared));
        assert_eq!(err.to_string(), "Command failed: broken");
        assert!(Error::config("x").shared_build_failure().is_none());
    }
}
