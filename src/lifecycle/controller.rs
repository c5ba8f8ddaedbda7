//! Lifecycle controller.
//!
//! Validates an operation against the session's state and on-disk artifacts,
//! claims the session, then runs the tool on a spawned task that owns the
//! claim. The caller gets the operation's feed back immediately; dropping it
//! does not stop the operation.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{
    derive_name, rendered_region, ConfigHasher, ConfigRenderer, Descriptor, RenderedConfig, Settings,
};
use crate::error::{ConfigError, InfraError, LifecycleError, ProcessError, Result};
use crate::process::{CommandRunner, Invocation, OutputChunk, OutputSink, ProcessSupervisor};
use crate::session::{
    Operation, OperationGuard, Session, SessionSnapshot, SessionStatus, SessionStore, Workspace,
};
use crate::stream::{self, EventFeed, FeedPublisher};

/// Parameters of an `init` request.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InitRequest {
    /// Region the session provisions into.
    pub region: String,
    /// Descriptor to render; a baseline one is derived when absent.
    #[serde(default)]
    pub descriptor: Option<Descriptor>,
}

impl InitRequest {
    /// Creates a request without a descriptor.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            descriptor: None,
        }
    }

    /// Attaches a descriptor.
    #[must_use]
    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }
}

/// Configuration prepared for an `init`.
struct PreparedConfig {
    rendered: RenderedConfig,
    explicit: bool,
}

/// Drives lifecycle operations for every session.
pub struct LifecycleController {
    store: Arc<SessionStore>,
    runner: Arc<dyn CommandRunner>,
    renderer: ConfigRenderer,
    tool: String,
    feed_capacity: usize,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("root", &self.store.root())
            .field("tool", &self.tool)
            .field("feed_capacity", &self.feed_capacity)
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    /// Creates a controller over an existing store and runner.
    #[must_use]
    pub fn new(settings: &Settings, store: Arc<SessionStore>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            store,
            runner,
            renderer: ConfigRenderer::with_validator(settings.validator()),
            tool: settings.tool.clone(),
            feed_capacity: settings.feed_capacity,
        }
    }

    /// Creates a controller with a fresh store running real child processes.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings,
            Arc::new(SessionStore::new(&settings.workspace_root)),
            Arc::new(ProcessSupervisor::new()),
        )
    }

    /// Returns the session store.
    #[must_use]
    pub const fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Returns the renderer used by `init`.
    #[must_use]
    pub const fn renderer(&self) -> &ConfigRenderer {
        &self.renderer
    }

    /// Writes the configuration if needed and initializes the working
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for a bad region or descriptor, and a
    /// `PreconditionError` unless the session is idle or failed.
    pub async fn init(&self, session_id: &str, request: InitRequest) -> Result<EventFeed> {
        let prepared = self.prepare_config(session_id, request)?;
        self.start(Operation::Init, session_id, Some(prepared)).await
    }

    /// Computes and saves a plan.
    ///
    /// # Errors
    ///
    /// Returns a `PreconditionError` unless the session is initialized,
    /// planned or applied and its configuration is on disk.
    pub async fn plan(&self, session_id: &str) -> Result<EventFeed> {
        self.start(Operation::Plan, session_id, None).await
    }

    /// Applies the saved plan.
    ///
    /// # Errors
    ///
    /// Returns a `PreconditionError` unless the session is planned and the
    /// plan artifact exists on disk.
    pub async fn apply(&self, session_id: &str) -> Result<EventFeed> {
        self.start(Operation::Apply, session_id, None).await
    }

    /// Tears down everything the session applied.
    ///
    /// # Errors
    ///
    /// Returns a `PreconditionError` if the working directory does not exist.
    pub async fn destroy(&self, session_id: &str) -> Result<EventFeed> {
        self.start(Operation::Destroy, session_id, None).await
    }

    /// Runs any operation except `init`, which needs a request.
    ///
    /// # Errors
    ///
    /// Same as the dedicated methods.
    pub async fn run(&self, operation: Operation, session_id: &str) -> Result<EventFeed> {
        match operation {
            Operation::Init => Err(InfraError::internal("init requires an InitRequest")),
            _ => self.start(operation, session_id, None).await,
        }
    }

    /// Returns the status view of a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown sessions.
    pub fn status(&self, session_id: &str) -> Result<SessionSnapshot> {
        self.store.snapshot(session_id)
    }

    fn prepare_config(&self, session_id: &str, request: InitRequest) -> Result<PreparedConfig> {
        let region = request.region.trim();
        self.renderer.validator().validate_region_id(region)?;

        let explicit = request.descriptor.is_some();
        let mut descriptor = request
            .descriptor
            .unwrap_or_else(|| Descriptor::new(derive_name(session_id), region));

        match descriptor.region().map(str::to_string) {
            Some(own) if own != region => {
                return Err(ConfigError::validation(
                    format!("Descriptor region '{own}' does not match requested region '{region}'"),
                    "environment.region",
                )
                .into());
            }
            Some(_) => {}
            None => descriptor.environment.region = Some(region.to_string()),
        }

        let rendered = self.renderer.render(&descriptor)?;
        debug!(
            "Rendered configuration for session {session_id} ({})",
            ConfigHasher::new().short_hash(&rendered.fingerprint)
        );
        Ok(PreparedConfig { rendered, explicit })
    }

    async fn start(
        &self,
        operation: Operation,
        session_id: &str,
        prepared: Option<PreparedConfig>,
    ) -> Result<EventFeed> {
        let session = self.store.get_or_create(session_id).await?;
        let mut guard = self.store.begin_operation(session_id, operation)?;
        let workspace = Workspace::new(&session.working_dir);

        self.check_preconditions(operation, &session, &workspace).await?;
        if let Some(prepared) = prepared {
            write_config(&workspace, session_id, &prepared).await?;
        }

        guard.start(operation.running_status())?;
        let invocation = operation.invocation(&self.tool, workspace.path());
        let (publisher, feed) = stream::channel(session_id, self.feed_capacity);

        info!("Starting {operation} for session {session_id}");
        tokio::spawn(run_operation(
            Arc::clone(&self.store),
            Arc::clone(&self.runner),
            guard,
            publisher,
            invocation,
            workspace,
        ));

        Ok(feed)
    }

    async fn check_preconditions(
        &self,
        operation: Operation,
        session: &Session,
        workspace: &Workspace,
    ) -> Result<()> {
        let status = self.store.status(&session.id)?;
        let reject = |reason: String| -> Result<()> {
            warn!("Rejecting {operation} for session {}: {reason}", session.id);
            Err(LifecycleError::precondition(&session.id, operation.as_str(), reason).into())
        };

        if !operation.allowed_from(status) {
            return reject(format!(
                "session is {status}, expected {}",
                operation.expected_states()
            ));
        }

        let missing = match operation {
            Operation::Init => None,
            Operation::Plan => (!workspace.has_config().await).then(|| {
                format!(
                    "configuration file {} is missing",
                    workspace.config_path().display()
                )
            }),
            Operation::Apply => (!workspace.has_plan().await)
                .then(|| String::from("plan artifact is missing; run plan again")),
            Operation::Destroy => (!workspace.exists().await).then(|| {
                format!(
                    "working directory {} does not exist",
                    workspace.path().display()
                )
            }),
        };

        missing.map_or(Ok(()), reject)
    }
}

async fn write_config(workspace: &Workspace, session_id: &str, prepared: &PreparedConfig) -> Result<()> {
    let needs_write = match workspace.read_config().await? {
        None => true,
        Some(current) if prepared.explicit => {
            ConfigHasher::new().fingerprint(&current) != prepared.rendered.fingerprint
        }
        Some(current) => {
            let requested = prepared.rendered.region.as_str();
            match rendered_region(&current) {
                Some(existing) if existing != requested => {
                    warn!(
                        "Session {session_id} is configured for region '{existing}', \
                         init requested '{requested}'"
                    );
                    return Err(ConfigError::validation(
                        format!(
                            "Session is configured for region '{existing}', not '{requested}'; \
                             destroy it or supply a descriptor"
                        ),
                        "region",
                    )
                    .into());
                }
                _ => false,
            }
        }
    };

    if needs_write {
        workspace.write_config(&prepared.rendered.text).await?;
        info!(
            "Wrote configuration for session {session_id} ({} service(s))",
            prepared.rendered.services.len()
        );
    } else {
        debug!("Keeping existing configuration for session {session_id}");
    }
    Ok(())
}

/// Copies each line into the session log and offers it to the feed.
struct SessionSink<'a> {
    store: &'a SessionStore,
    session_id: &'a str,
    publisher: &'a FeedPublisher,
}

impl OutputSink for SessionSink<'_> {
    fn on_output(&self, chunk: OutputChunk) {
        if let Err(e) = self.store.append_log(self.session_id, chunk.line.as_str()) {
            debug!("Dropping output line: {e}");
        }
        self.publisher.publish_line(&chunk.line, chunk.stream);
    }
}

async fn run_operation(
    store: Arc<SessionStore>,
    runner: Arc<dyn CommandRunner>,
    guard: OperationGuard,
    publisher: FeedPublisher,
    invocation: Invocation,
    workspace: Workspace,
) {
    let operation = guard.operation();
    let session_id = guard.session_id().to_string();

    let result = {
        let sink = SessionSink {
            store: &store,
            session_id: &session_id,
            publisher: &publisher,
        };
        runner.run(&invocation, &sink).await
    };

    let outcome = match result {
        Ok(exit) => {
            if operation == Operation::Apply {
                if let Err(e) = workspace.remove_plan().await {
                    warn!("Could not remove consumed plan for session {session_id}: {e}");
                }
            }
            let status = operation.success_status();
            record(guard, status, Some(exit.code), None);
            info!(
                "{operation} for session {session_id} succeeded in {:.1}s",
                exit.duration.as_secs_f64()
            );
            Ok(status)
        }
        Err(e) => {
            let code = match &e {
                InfraError::Process(ProcessError::Execution { code, .. }) => *code,
                _ => None,
            };
            let message = e.to_string();
            error!("{operation} for session {session_id} failed: {message}");
            record(guard, SessionStatus::Error, code, Some(message.clone()));
            Err(message)
        }
    };

    if !publisher.finish(outcome) {
        debug!("Result of {operation} for session {session_id} recorded without a subscriber");
    }
}

fn record(guard: OperationGuard, status: SessionStatus, code: Option<i32>, message: Option<String>) {
    let session_id = guard.session_id().to_string();
    if let Err(e) = guard.finish(status, code, message) {
        warn!("Could not record result for session {session_id}: {e}");
    }
}
