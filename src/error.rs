//! Error taxonomy shared by the mergers, the exporter and the orchestrator.
//!
//! `Read`, `Export` and `Persist` are scoped to one reference, one job or the persistence step and are
//! collected into reports. `Config` and `ExternalResourceUnavailable` abort a request before any work is
//! done. `StructuralCopy` aborts the build it happens in.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// Source file unreadable, corrupt, or the sheet is missing.
    #[error("cannot read {}: {cause}", .file.display())]
    Read { file: PathBuf, cause: String },

    /// The application rejected a copy or rename operation.
    #[error("structural copy failed: {0}")]
    StructuralCopy(String),

    /// Save target locked, invalid, or the container format is not supported.
    #[error("cannot save workbook to {}: {cause}", .path.display())]
    Persist { path: PathBuf, cause: String },

    /// Rendering of one export job failed.
    #[error("export to {} failed: {cause}", .destination.display())]
    Export { destination: PathBuf, cause: String },

    /// Missing or contradictory request configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The spreadsheet application cannot be acquired at all.
    #[error("could not acquire required external resource: {0}")]
    ExternalResourceUnavailable(String),
}

impl MergeError {
    pub fn read(file: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        MergeError::Read { file: file.into(), cause: format!("{cause:#}") }
    }

    pub fn persist(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        MergeError::Persist { path: path.into(), cause: format!("{cause:#}") }
    }

    pub fn export(destination: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        MergeError::Export { destination: destination.into(), cause: format!("{cause:#}") }
    }

    /// Short taxonomy name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            MergeError::Read { .. } => "ReadError",
            MergeError::StructuralCopy(_) => "StructuralCopyError",
            MergeError::Persist { .. } => "PersistError",
            MergeError::Export { .. } => "ExportError",
            MergeError::Config(_) => "ConfigError",
            MergeError::ExternalResourceUnavailable(_) => "ExternalResourceUnavailable",
        }
    }

    /// Whether the error is scoped to one reference or job and the run may continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MergeError::Read { .. } | MergeError::Persist { .. } | MergeError::Export { .. })
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
