//! Template cache: build a template database once, clone it per test.
//!
//! # Lifecycle
//!
//! 1. [`TemplateCache::start`] reconciles the LocalDB instance with what is on
//!    disk (see [`reconcile::plan`]) and launches one background build task.
//!    Its outcome is shared by every later clone request.
//! 2. [`TemplateCache::create_database`] waits for that outcome, copies the
//!    template files, attaches the copies as a new database and returns its
//!    connection string.
//! 3. The registered [`CloneCallback`], if any, runs once against the first
//!    clone that gets there.
//!
//! The template is rebuilt only when the instance had to be recreated or the
//! uniqueness token differs from the one persisted after the last successful
//! build. The "take other databases offline" step runs on every start, even
//! when nothing is rebuilt.

mod gate;
pub mod reconcile;
mod signal;

use crate::config::{TemplateSettings, validate_file_name};
use crate::error::{Error, Result};
use crate::fs;
use crate::paths::{self, TEMPLATE_NAME, TemplatePaths, WITH_ROLLBACK_NAME};
use crate::server::{Connection, ConnectionOpener, InstanceController, InstanceState};
use crate::sql;
use async_trait::async_trait;
use gate::CallbackGate;
use reconcile::StartPlan;
use signal::BuildSignal;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info};

/// Populates a freshly created template database.
#[async_trait]
pub trait BuildTemplate: Send + Sync {
    async fn build(&self, connection: &mut dyn Connection) -> Result<()>;
}

/// Runs once, against the first database cloned from the template.
#[async_trait]
pub trait CloneCallback: Send + Sync {
    async fn on_clone(&self, connection: &mut dyn Connection) -> Result<()>;
}

#[async_trait]
impl<T: BuildTemplate + ?Sized> BuildTemplate for Arc<T> {
    async fn build(&self, connection: &mut dyn Connection) -> Result<()> {
        (**self).build(connection).await
    }
}

#[async_trait]
impl<T: CloneCallback + ?Sized> CloneCallback for Arc<T> {
    async fn on_clone(&self, connection: &mut dyn Connection) -> Result<()> {
        (**self).on_clone(connection).await
    }
}

type RollbackOutcome = std::result::Result<String, Arc<Error>>;

/// State installed by one `start` call.
#[derive(Clone)]
struct Startup {
    ready: BuildSignal,
    rollback: Arc<OnceCell<RollbackOutcome>>,
}

/// Handle to a template cache. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct TemplateCache {
    inner: Arc<Inner>,
}

struct Inner {
    instance: String,
    paths: TemplatePaths,
    template_size: u16,
    template_provided: bool,
    master_connection_string: String,
    template_connection_string: String,
    controller: Arc<dyn InstanceController>,
    opener: Arc<dyn ConnectionOpener>,
    gate: CallbackGate,
    startup: Mutex<Option<Startup>>,
    start_lock: tokio::sync::Mutex<()>,
    /// Held for writing while a start reconciles and builds, for reading while
    /// a clone copies the template files.
    template_files: Arc<RwLock<()>>,
}

/// Builder for [`TemplateCache`].
pub struct TemplateCacheBuilder {
    settings: TemplateSettings,
    controller: Arc<dyn InstanceController>,
    opener: Arc<dyn ConnectionOpener>,
    callback: Option<Arc<dyn CloneCallback>>,
}

impl TemplateCacheBuilder {
    /// Register a callback to run once after the first clone.
    pub fn callback(mut self, callback: impl CloneCallback + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Validate the settings and create the cache directory.
    pub fn build(self) -> Result<TemplateCache> {
        self.settings.validate()?;

        let instance = self.settings.instance.clone();
        let directory = self.settings.resolved_directory();
        std::fs::create_dir_all(&directory)?;
        debug!(directory = %directory.display(), "template cache directory");

        let existing = self.settings.existing_template.as_ref();
        let inner = Inner {
            paths: TemplatePaths::new(directory, existing),
            template_size: self.settings.template_size,
            template_provided: existing.is_some(),
            master_connection_string: paths::connection_string(&instance, "master"),
            template_connection_string: paths::connection_string(&instance, TEMPLATE_NAME),
            controller: self.controller,
            opener: self.opener,
            gate: CallbackGate::new(self.callback),
            startup: Mutex::new(None),
            start_lock: tokio::sync::Mutex::new(()),
            template_files: Arc::new(RwLock::new(())),
            instance,
        };

        Ok(TemplateCache {
            inner: Arc::new(inner),
        })
    }
}

impl TemplateCache {
    pub fn builder(
        settings: TemplateSettings,
        controller: Arc<dyn InstanceController>,
        opener: Arc<dyn ConnectionOpener>,
    ) -> TemplateCacheBuilder {
        TemplateCacheBuilder {
            settings,
            controller,
            opener,
            callback: None,
        }
    }

    pub fn instance(&self) -> &str {
        &self.inner.instance
    }

    /// `(LocalDb)\{instance}`
    pub fn server_name(&self) -> String {
        paths::server_name(&self.inner.instance)
    }

    pub fn directory(&self) -> &Path {
        self.inner.paths.directory()
    }

    pub fn data_file(&self) -> &Path {
        self.inner.paths.data_file()
    }

    pub fn log_file(&self) -> &Path {
        self.inner.paths.log_file()
    }

    pub fn uniqueness_file(&self) -> &Path {
        self.inner.paths.uniqueness_file()
    }

    pub fn master_connection_string(&self) -> &str {
        &self.inner.master_connection_string
    }

    /// Connection string of the database `name` on this instance.
    pub fn connection_string(&self, name: &str) -> String {
        paths::connection_string(&self.inner.instance, name)
    }

    /// Reconcile the instance and launch the template build.
    ///
    /// Returns once the build task is running; use [`await_ready`](Self::await_ready)
    /// to wait for it. A reconciliation failure is returned here and also
    /// poisons the build outcome seen by clone requests.
    pub async fn start(
        &self,
        uniqueness: impl Into<String>,
        populate: impl BuildTemplate + 'static,
    ) -> Result<()> {
        self.start_with(uniqueness.into(), Arc::new(populate)).await
    }

    pub async fn start_with(
        &self,
        uniqueness: String,
        populate: Arc<dyn BuildTemplate>,
    ) -> Result<()> {
        let started = Instant::now();
        let _serialized = self.inner.start_lock.lock().await;

        if let Some(previous) = self.current_startup()
            && !previous.ready.is_complete()
        {
            debug!(instance = %self.inner.instance, "waiting for the previous build");
        }
        // waits for the previous build and for clones still copying
        let files = Arc::clone(&self.inner.template_files).write_owned().await;

        let (completer, ready) = BuildSignal::new();
        self.install(Startup {
            ready,
            rollback: Arc::new(OnceCell::new()),
        });

        let plan = match self.inner.reconcile(&uniqueness).await {
            Ok(plan) => plan,
            Err(e) => {
                let shared = Arc::new(self.inner.build_error(&uniqueness, e));
                error!(instance = %self.inner.instance, "template start failed: {shared}");
                completer.fail_shared(Arc::clone(&shared));
                return Err(Error::Template(shared));
            }
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let build_started = Instant::now();
            let outcome = inner
                .build(&uniqueness, populate.as_ref(), plan)
                .await
                .map_err(|e| inner.build_error(&uniqueness, e));
            match &outcome {
                Ok(()) => info!(
                    instance = %inner.instance,
                    rebuild = plan.rebuilds(),
                    "template ready in {}ms",
                    build_started.elapsed().as_millis()
                ),
                Err(e) => error!(instance = %inner.instance, "template build failed: {e}"),
            }
            drop(files);
            completer.complete(outcome);
        });

        info!(
            "Start `{}` {}ms.",
            self.server_name(),
            started.elapsed().as_millis()
        );
        Ok(())
    }

    /// Wait until the template build started by the last `start` finishes.
    pub async fn await_ready(&self) -> Result<()> {
        let startup = self.current_startup().ok_or(Error::NotStarted)?;
        startup.ready.wait().await
    }

    /// Clone the template into a new database called `name`.
    pub async fn create_database(&self, name: &str) -> Result<String> {
        self.create_database_with(name, false).await
    }

    /// Clone the template; `with_rollback` prepares the database for use inside
    /// one rolled-back transaction per test.
    pub async fn create_database_with(&self, name: &str, with_rollback: bool) -> Result<String> {
        validate_clone_name(name)?;
        let startup = self.current_startup().ok_or(Error::NotStarted)?;
        self.clone_from(&startup, name, with_rollback).await
    }

    /// Shared clone for rollback-style tests, created on first request.
    ///
    /// Every caller gets the same connection string, or the same error.
    pub async fn create_rollback_database(&self) -> Result<String> {
        let startup = self.current_startup().ok_or(Error::NotStarted)?;
        startup.ready.wait().await?;

        let outcome = startup
            .rollback
            .get_or_init(|| async {
                self.clone_from(&startup, WITH_ROLLBACK_NAME, true)
                    .await
                    .map_err(Arc::new)
            })
            .await;
        outcome.clone().map_err(Error::RollbackClone)
    }

    /// Clone from the build installed by `startup`.
    async fn clone_from(
        &self,
        startup: &Startup,
        name: &str,
        with_rollback: bool,
    ) -> Result<String> {
        startup.ready.wait().await?;

        let connection_string = {
            let _files = self.inner.template_files.read().await;
            self.inner.attach_clone(name, with_rollback).await
        }
        .map_err(|e| Error::Clone {
            name: name.to_string(),
            source: Box::new(e),
        })?;

        self.inner
            .gate
            .run(self.inner.opener.as_ref(), &connection_string)
            .await?;
        Ok(connection_string)
    }

    /// Detach the clone `name` and remove its files.
    pub async fn delete_database(&self, name: &str) -> Result<()> {
        validate_clone_name(name)?;
        {
            let mut master = self.inner.open_master().await?;
            master.execute(&sql::delete_database(name)).await?;
        }

        let (data_file, log_file) = self.inner.paths.clone_files(name);
        fs::remove_if_exists(&data_file).await?;
        fs::remove_if_exists(&log_file).await?;
        debug!(name, "deleted database");
        Ok(())
    }

    /// Stop and delete the instance and remove the whole cache directory.
    pub async fn delete_instance(&self) -> Result<()> {
        let started = Instant::now();
        let _files = self.inner.template_files.write().await;
        self.inner
            .controller
            .stop_and_delete(&self.inner.instance)
            .await?;
        fs::remove_dir_if_exists(self.directory()).await?;
        info!(
            "Deleted `{}` {}ms.",
            self.server_name(),
            started.elapsed().as_millis()
        );
        Ok(())
    }

    fn current_startup(&self) -> Option<Startup> {
        self.inner
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, startup: Startup) {
        *self
            .inner
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(startup);
    }
}

/// Clone names must be usable as file names and must not be the template's.
fn validate_clone_name(name: &str) -> Result<()> {
    if name.eq_ignore_ascii_case(TEMPLATE_NAME) {
        return Err(Error::config(format!(
            "The database name '{}' is reserved.",
            TEMPLATE_NAME
        )));
    }
    validate_file_name("name", name)
}

impl Inner {
    async fn open_master(&self) -> Result<Box<dyn Connection>> {
        self.opener.open(&self.master_connection_string).await
    }

    fn build_error(&self, uniqueness: &str, source: Error) -> Error {
        Error::Build {
            instance: self.instance.clone(),
            directory: self.paths.directory().to_path_buf(),
            uniqueness: uniqueness.to_string(),
            source: Box::new(source),
        }
    }

    /// Inspect the instance and files, and prepare the instance for the build.
    async fn reconcile(&self, uniqueness: &str) -> Result<StartPlan> {
        let state = self.controller.info(&self.instance).await?.state();
        let data_file_exists = tokio::fs::try_exists(self.paths.data_file()).await?;
        let marker = if state == InstanceState::Running && data_file_exists {
            fs::read_optional(self.paths.uniqueness_file()).await?
        } else {
            None
        };

        let plan = reconcile::plan(state, data_file_exists, marker.as_deref(), uniqueness);
        debug!(instance = %self.instance, ?state, ?plan, "reconciled template instance");

        match plan {
            StartPlan::CleanStart | StartPlan::Reuse { rebuild: true } => {}
            StartPlan::DeleteThenCleanStart => self.controller.delete(&self.instance).await?,
            StartPlan::RecreateCorrupt => {
                self.controller.stop_and_delete(&self.instance).await?
            }
            StartPlan::Reuse { rebuild: false } => {
                debug!(uniqueness, "Not modified so skipping rebuild");
            }
        }

        if plan.recreates_instance() {
            fs::flush_directory(self.paths.directory()).await?;
            self.controller.create(&self.instance).await?;
            self.controller.start(&self.instance).await?;
        }

        Ok(plan)
    }

    /// The background part of `start`.
    async fn build(
        &self,
        uniqueness: &str,
        populate: &dyn BuildTemplate,
        plan: StartPlan,
    ) -> Result<()> {
        let take_offline = async {
            let mut connection = self.open_master().await?;
            connection.execute(sql::TAKE_DBS_OFFLINE).await
        };

        let prepare = async {
            let mut master = self.open_master().await?;
            if plan.recreates_instance() {
                master.execute(&sql::optimize(self.template_size)).await?;
            }
            if plan.rebuilds() && !self.template_provided {
                self.rebuild(uniqueness, populate, master.as_mut()).await?;
            }
            Ok::<(), Error>(())
        };

        let (offline, prepared) = tokio::join!(take_offline, prepare);
        prepared?;
        offline
    }

    async fn rebuild(
        &self,
        uniqueness: &str,
        populate: &dyn BuildTemplate,
        master: &mut dyn Connection,
    ) -> Result<()> {
        let data_file = self.paths.data_file();
        let log_file = self.paths.log_file();

        fs::remove_if_exists(data_file).await?;
        fs::remove_if_exists(log_file).await?;
        master
            .execute(&sql::create_template(data_file, log_file))
            .await?;

        fs::mark_writable(data_file).await?;
        fs::mark_writable(log_file).await?;

        {
            let mut connection = self.opener.open(&self.template_connection_string).await?;
            populate.build(connection.as_mut()).await?;
        }

        master.execute(&sql::detach_template()).await?;

        // only after everything above succeeded
        tokio::fs::write(self.paths.uniqueness_file(), uniqueness).await?;
        Ok(())
    }

    async fn attach_clone(&self, name: &str, with_rollback: bool) -> Result<String> {
        let (data_file, log_file) = self.paths.clone_files(name);

        fs::copy_overwrite(self.paths.data_file(), &data_file).await?;
        fs::copy_overwrite(self.paths.log_file(), &log_file).await?;
        fs::mark_writable(&data_file).await?;
        fs::mark_writable(&log_file).await?;

        let command = sql::create_or_make_online(name, &data_file, &log_file, with_rollback);
        {
            let mut master = self.open_master().await?;
            master.execute(&command).await?;
        }

        Ok(paths::connection_string(&self.instance, name))
    }
}
