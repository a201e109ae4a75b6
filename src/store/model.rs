// src/store/model.rs

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a project as shown to API readers.
///
/// `Booting` covers the whole pipeline run; `Active` means every step exited
/// cleanly. A stopped run goes back to `Idle`, never `Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectStatus {
    #[default]
    Idle,
    Booting,
    Active,
    Failed,
}

/// A single named shell command in a project's pipeline.
///
/// Immutable once defined; steps execute strictly in sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
    pub cmd: String,
}

/// A user-defined project: an ordered pipeline of shell steps plus the
/// mutable run state the supervisor maintains for it.
///
/// Every write to the store replaces the full record, so readers never see
/// a torn combination of status/progress/log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Missing and empty ids decode the same; the API rejects both.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pipeline: Vec<PipelineStep>,
    /// Optional working directory for all pipeline steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub status: ProjectStatus,
    /// Full accumulated output of the current / most recent run.
    #[serde(default)]
    pub last_log: String,
    /// Name of the step currently executing; empty between runs.
    #[serde(default)]
    pub current_step: String,
    /// 0-100.
    #[serde(default)]
    pub progress: u8,
    /// Fixed by the operator, or discovered by the port probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl Project {
    /// True while a run may still legitimately claim this record
    /// (port discovery write-back window).
    pub fn is_running(&self) -> bool {
        matches!(self.status, ProjectStatus::Booting | ProjectStatus::Active)
    }
}

/// One timestamped host health reading, appended by the telemetry collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub time: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_percent: f64,
    pub temperature: f64,
    pub disk_percent: f64,
}
