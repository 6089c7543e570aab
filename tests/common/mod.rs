//! In-memory stand-in for a LocalDB server.
//!
//! Tracks instance state, records every command and connection, and creates
//! the template files when the "create template" command runs so that clones
//! have something to copy.

#![allow(dead_code)]

use async_trait::async_trait;
use localdb_template::server::{Connection, ConnectionOpener, InstanceController, InstanceInfo};
use localdb_template::{BuildTemplate, CloneCallback, Error, Result, TemplateCacheBuilder};
use localdb_template::{TemplateCache, TemplateSettings};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEMPLATE_DATA: &[u8] = b"template-data";
pub const TEMPLATE_LOG: &[u8] = b"template-log";

#[derive(Default)]
struct FakeState {
    exists: bool,
    running: bool,
    lifecycle: Vec<String>,
    opened: Vec<String>,
    commands: Vec<String>,
    fail_command: Option<String>,
    fail_lifecycle: Option<String>,
}

pub struct FakeServer {
    directory: PathBuf,
    state: Mutex<FakeState>,
}

impl FakeServer {
    /// No instance yet.
    pub fn new(directory: &Path) -> Arc<Self> {
        Arc::new(Self {
            directory: directory.to_path_buf(),
            state: Mutex::new(FakeState::default()),
        })
    }

    pub fn set_state(&self, exists: bool, running: bool) {
        let mut state = self.state.lock().unwrap();
        state.exists = exists;
        state.running = running;
    }

    /// Make every command containing `needle` fail.
    pub fn fail_commands_containing(&self, needle: &str) {
        self.state.lock().unwrap().fail_command = Some(needle.to_string());
    }

    /// Make one lifecycle operation (`create`, `start`, ...) fail.
    pub fn fail_lifecycle(&self, operation: &str) {
        self.state.lock().unwrap().fail_lifecycle = Some(operation.to_string());
    }

    pub fn lifecycle(&self) -> Vec<String> {
        self.state.lock().unwrap().lifecycle.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn count_commands(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }

    fn record_lifecycle(&self, operation: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.lifecycle.push(operation.to_string());
        if state.fail_lifecycle.as_deref() == Some(operation) {
            return Err(Error::instance(format!("{} \"{}\" failed", operation, name)));
        }
        match operation {
            "create" => state.exists = true,
            "start" => state.running = true,
            "stop" => state.running = false,
            "delete" => {
                state.exists = false;
                state.running = false;
            }
            _ => {}
        }
        Ok(())
    }

    fn execute(&self, command: &str) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.commands.push(command.to_string());
            if let Some(needle) = &state.fail_command
                && command.contains(needle.as_str())
            {
                return Err(Error::command(format!("injected failure for {}", needle)));
            }
        }
        if command.contains("create database [template]") {
            std::fs::write(self.directory.join("template.mdf"), TEMPLATE_DATA)?;
            std::fs::write(self.directory.join("template_log.ldf"), TEMPLATE_LOG)?;
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceController for FakeServer {
    async fn info(&self, _name: &str) -> Result<InstanceInfo> {
        let state = self.state.lock().unwrap();
        Ok(InstanceInfo {
            exists: state.exists,
            is_running: state.running,
        })
    }

    async fn create(&self, name: &str) -> Result<()> {
        self.record_lifecycle("create", name)
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.record_lifecycle("start", name)
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.record_lifecycle("stop", name)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.record_lifecycle("delete", name)
    }
}

pub struct FakeConnection {
    server: Arc<FakeServer>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn execute(&mut self, command: &str) -> Result<()> {
        tokio::task::yield_now().await;
        self.server.execute(command)
    }
}

/// Opens [`FakeConnection`]s against a shared [`FakeServer`].
pub struct FakeOpener {
    server: Arc<FakeServer>,
}

impl FakeOpener {
    pub fn new(server: &Arc<FakeServer>) -> Arc<Self> {
        Arc::new(Self {
            server: Arc::clone(server),
        })
    }
}

#[async_trait]
impl ConnectionOpener for FakeOpener {
    async fn open(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        {
            let mut state = self.server.state.lock().unwrap();
            if !state.running {
                return Err(Error::command("instance is not running"));
            }
            state.opened.push(connection_string.to_string());
        }
        Ok(Box::new(FakeConnection {
            server: Arc::clone(&self.server),
        }))
    }
}

/// Populate function that counts its invocations.
#[derive(Default)]
pub struct CountingBuilder {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub fail: bool,
}

impl CountingBuilder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn failing(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail: true,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildTemplate for CountingBuilder {
    async fn build(&self, connection: &mut dyn Connection) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        connection.execute("create table MyTable (Value int);").await?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::command("populate failed"));
        }
        Ok(())
    }
}

/// Clone callback that counts its invocations.
#[derive(Default)]
pub struct CountingCallback {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingCallback {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloneCallback for CountingCallback {
    async fn on_clone(&self, connection: &mut dyn Connection) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        connection.execute("insert into MyTable (Value) values (1);").await?;
        if self.fail {
            return Err(Error::command("callback failed"));
        }
        Ok(())
    }
}

/// Builder for a cache named `Tests` over `directory`, backed by `server`.
pub fn cache_builder(server: &Arc<FakeServer>, directory: &Path) -> TemplateCacheBuilder {
    let settings = TemplateSettings::new("Tests").with_directory(directory);
    TemplateCache::builder(
        settings,
        Arc::clone(server) as Arc<dyn InstanceController>,
        FakeOpener::new(server),
    )
}

pub fn cache(server: &Arc<FakeServer>, directory: &Path) -> TemplateCache {
    cache_builder(server, directory)
        .build()
        .expect("Failed to build template cache")
}

pub fn marker(cache: &TemplateCache) -> Option<String> {
    std::fs::read_to_string(cache.uniqueness_file()).ok()
}
