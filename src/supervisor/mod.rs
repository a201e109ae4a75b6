// src/supervisor/mod.rs

//! Task supervisor for project pipelines.
//!
//! This module ties together:
//! - the task registry (at most one cancellable handle per project id)
//! - the pipeline runner (sequential step execution with streamed output)
//! - the port probe (best-effort discovery of the listening port)
//!
//! `start` detaches a background run and returns immediately; `stop` fires
//! cancellation into the live run and force-terminates its process tree.

pub mod ports;
pub mod registry;
pub mod runner;

use std::sync::Arc;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::errors::{HelmsmanError, Result};
use crate::store::{ProjectStatus, Store};

pub use ports::ProbeConfig;
pub use registry::TaskRegistry;

pub struct Supervisor {
    store: Arc<Store>,
    registry: Arc<TaskRegistry>,
    allow_actions: bool,
    probe: ProbeConfig,
}

impl Supervisor {
    pub fn new(store: Arc<Store>, allow_actions: bool) -> Self {
        Self {
            store,
            registry: Arc::new(TaskRegistry::new()),
            allow_actions,
            probe: ProbeConfig::default(),
        }
    }

    /// Override the port-probe cadence. Tests use this to shrink the
    /// discovery window.
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    /// Begin a pipeline run for `id`.
    ///
    /// Rejected when actions are disabled, the project is unknown, or a run
    /// is already live (the existing handle is never replaced: replacing it
    /// would orphan the in-flight cancellation control and leak the
    /// subprocess). On success the project is already visible as BOOTING
    /// when this returns; the run itself proceeds in a detached task.
    pub fn start(&self, id: &str) -> Result<()> {
        if !self.allow_actions {
            return Err(HelmsmanError::ActionsDisabled);
        }
        let mut project = self
            .store
            .get_project(id)
            .ok_or_else(|| HelmsmanError::NotFound(id.to_string()))?;
        let token = self
            .registry
            .try_register(id)
            .ok_or_else(|| HelmsmanError::AlreadyRunning(id.to_string()))?;

        project.status = ProjectStatus::Booting;
        project.progress = 0;
        project.last_log.clear();
        project.current_step.clear();
        self.store.add_project(project.clone());

        info!(project = %id, steps = project.pipeline.len(), "starting pipeline run");

        tokio::spawn(runner::run_pipeline(
            self.store.clone(),
            self.registry.clone(),
            project,
            token,
            self.probe.clone(),
        ));
        Ok(())
    }

    /// Stop a project's run (if any) and reset it to IDLE.
    ///
    /// Idempotent: stopping an already-idle project is a no-op beyond the
    /// reset writes.
    pub async fn stop(&self, id: &str) -> Result<()> {
        self.kill(id).await;

        let mut project = self
            .store
            .get_project(id)
            .ok_or_else(|| HelmsmanError::NotFound(id.to_string()))?;
        project.status = ProjectStatus::Idle;
        project.progress = 0;
        project.current_step.clear();
        self.store.add_project(project);
        info!(project = %id, "project stopped");
        Ok(())
    }

    /// Kill a project and remove its record entirely.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.kill(id).await;
        self.store.remove_project(id);
        if let Err(err) = self.store.snapshot() {
            error!(error = %err, "snapshot after delete failed");
        }
        info!(project = %id, "project deleted");
        Ok(())
    }

    /// Shared teardown used by stop and delete: fire cancellation on the
    /// live handle, then best-effort kill whatever still holds the project's
    /// known port (covers processes the handle no longer tracks, e.g. a dev
    /// server daemonized by a wrapper script).
    pub async fn kill(&self, id: &str) {
        if let Some(token) = self.registry.remove(id) {
            token.cancel();
        }

        let port = self.store.get_project(id).and_then(|p| p.port);
        if let Some(port) = port {
            if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) {
                let cmdline = format!("lsof -ti:{port} | xargs -r kill -9");
                if let Err(err) = Command::new("sh").arg("-c").arg(&cmdline).status().await {
                    warn!(project = %id, port = %port, error = %err, "port-based kill failed");
                }
            }
        }
    }

    /// True while a run task holds the handle for `id`.
    pub fn is_running(&self, id: &str) -> bool {
        self.registry.contains(id)
    }
}
