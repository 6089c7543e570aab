//! LocalDB template cache library.
//!
//! Build a template database once per test run and clone it cheaply, via file
//! copy and attach, for every test that needs an isolated database.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod paths;
pub mod server;
pub mod sql;
pub mod uniqueness;

pub use cache::{BuildTemplate, CloneCallback, TemplateCache, TemplateCacheBuilder};
pub use config::{ExistingTemplate, TemplateSettings};
pub use error::{Error, Result};
pub use server::{Connection, ConnectionOpener, InstanceController, InstanceInfo, InstanceState};
