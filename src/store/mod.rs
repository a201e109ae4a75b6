// src/store/mod.rs

//! Persistent project + health-history state.
//!
//! The [`Store`] owns the authoritative in-memory map of projects and a
//! bounded time series of host health samples. Mutations go through its
//! internal lock; persistence is a separate, explicitly invoked snapshot
//! that writes atomically via temp-file + rename.

pub mod model;
pub mod state;

pub use model::{HealthSample, PipelineStep, Project, ProjectStatus};
pub use state::{Store, HISTORY_CAP};
