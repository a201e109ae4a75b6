// src/errors.rs

//! Crate-wide error types.
//!
//! The request-error taxonomy (`NotFound`, `AlreadyRunning`, `ActionsDisabled`)
//! is surfaced directly to API callers; everything else funnels through the
//! `Io`/`Other` variants.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HelmsmanError {
    #[error("project not found: {0}")]
    NotFound(String),

    #[error("project already running: {0}")]
    AlreadyRunning(String),

    #[error("actions are disabled on this server")]
    ActionsDisabled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HelmsmanError>;
