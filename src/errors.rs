//! Error classification for the reconciliation core.
//!
//! These are not a type hierarchy: each boundary gets its own flat
//! `thiserror` enum, and the driver only ever asks "is this transient" or
//! composes errors into a [`PassError`] for [`crate::state::ReconcilerState::invalidate`].

use std::fmt;
use thiserror::Error;

/// A single error entry as it would be recorded on a status sub-resource.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileErrorMessage {
    pub code: String,
    pub message: String,
}

impl ReconcileErrorMessage {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ReconcileErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Errors returned by [`crate::source::SourceReader`].
#[derive(Debug, Error)]
pub enum SourceReadError {
    #[error("source directory not yet populated")]
    NotReady,
    #[error("failed to resolve commit: {0}")]
    ResolveFailed(String),
    #[error("i/o error reading source: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceReadError {
    /// Transient errors auto-heal on the next tick and are never published.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceReadError::NotReady)
    }
}

/// Errors returned by [`crate::render::RenderGate::evaluate`].
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to stat done-marker: {0}")]
    StatFailed(#[from] std::io::Error),
}

/// Errors returned by [`crate::files::FileLoader`].
#[derive(Debug, Error)]
pub enum FileLoadError {
    #[error("source directory not ready: {0}")]
    Transient(String),
    #[error("failed to enumerate or read files: {0}")]
    Permanent(String),
}

impl FileLoadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FileLoadError::Transient(_))
    }
}

/// Errors returned by [`crate::status::StatusPublisher`] writes.
#[derive(Debug, Error)]
pub enum StatusWriteError {
    #[error("status write transport failure: {0}")]
    Transport(String),
}

/// Errors returned by [`crate::conflict::ConflictReporter`].
#[derive(Debug, Error)]
pub enum ConflictWriteError {
    #[error("failed to write remediator status to RootSync {target}: {source}")]
    Write { target: String, source: String },
}

/// Aggregated errors for one pass, consulted by [`crate::state::ReconcilerState::invalidate`].
#[derive(Debug, Default, Clone)]
pub struct PassError {
    pub entries: Vec<ReconcileErrorMessage>,
}

impl PassError {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.entries.push(ReconcileErrorMessage::new(code, message));
    }

    pub fn from_one(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut e = Self::default();
        e.push(code, message);
        e
    }
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}
