//! Capabilities the template cache consumes from the database server.
//!
//! The cache never talks to a server directly. Instance lifecycle goes through
//! [`InstanceController`] and command execution through [`ConnectionOpener`],
//! so other backends (or test doubles) can be substituted.

pub mod localdb;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use localdb::SqlLocalDb;

/// Externally observed state of a named instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Absent,
    /// Created but not running; its files may still be on disk.
    Stopped,
    Running,
}

/// Result of querying an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub exists: bool,
    pub is_running: bool,
}

impl InstanceInfo {
    pub const ABSENT: Self = Self {
        exists: false,
        is_running: false,
    };

    pub fn state(&self) -> InstanceState {
        match (self.exists, self.is_running) {
            (false, _) => InstanceState::Absent,
            (true, false) => InstanceState::Stopped,
            (true, true) => InstanceState::Running,
        }
    }
}

/// Creates, starts, stops and deletes server instances.
#[async_trait]
pub trait InstanceController: Send + Sync {
    async fn info(&self, name: &str) -> Result<InstanceInfo>;

    async fn create(&self, name: &str) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.info(name).await?.exists)
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.info(name).await?.is_running)
    }

    async fn stop_and_delete(&self, name: &str) -> Result<()> {
        self.stop(name).await?;
        self.delete(name).await
    }
}

/// An open connection able to run commands.
#[async_trait]
pub trait Connection: Send {
    async fn execute(&mut self, command: &str) -> Result<()>;
}

/// Opens connections from connection strings.
#[async_trait]
pub trait ConnectionOpener: Send + Sync {
    async fn open(&self, connection_string: &str) -> Result<Box<dyn Connection>>;
}
