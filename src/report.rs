//! Build, export and request reports.

use std::fmt;
use std::path::PathBuf;

use crate::error::MergeError;
use crate::model::{ExportJob, SheetReference};

/// A reference the merger could not copy.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedReference {
    pub reference: SheetReference,
    pub error: MergeError,
}

impl fmt::Display for SkippedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reference, self.error.kind())
    }
}

/// Outcome of one merger run: what made it into the workbook and what did not.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BuildReport {
    /// Number of references in the request.
    pub requested: usize,
    /// References that contributed to the workbook, in order.
    pub merged: usize,
    /// Per-reference failures.
    pub skipped: Vec<SkippedReference>,
    /// Informational notes, such as rows of differing width in concatenation mode.
    pub warnings: Vec<String>,
}

impl BuildReport {
    pub fn new(requested: usize) -> Self {
        Self { requested, ..Default::default() }
    }

    pub fn add_merged(&mut self) {
        self.merged += 1;
    }

    pub fn add_skipped(&mut self, reference: &SheetReference, error: MergeError) {
        log::warn!("skipped {}: {}", reference, error);
        self.skipped.push(SkippedReference { reference: reference.clone(), error });
    }

    pub fn add_warning(&mut self, warning: String) {
        log::debug!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merged {} of {} sheets", self.merged, self.requested)?;
        if !self.skipped.is_empty() {
            let skipped: Vec<String> = self.skipped.iter().map(|s| s.to_string()).collect();
            write!(f, ", {} skipped: {}", self.skipped.len(), skipped.join(", "))?;
        }
        Ok(())
    }
}

/// Result of one export job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub job: ExportJob,
    pub result: Result<(), MergeError>,
}

impl ExportOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Results of every job of a plan, in planned order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExportResults {
    pub outcomes: Vec<ExportOutcome>,
}

impl ExportResults {
    pub fn push(&mut self, job: ExportJob, result: Result<(), MergeError>) {
        self.outcomes.push(ExportOutcome { job, result });
    }

    pub fn produced(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.produced()
    }

    /// Documents written, in planned order.
    pub fn documents(&self) -> Vec<PathBuf> {
        self.outcomes.iter().filter(|o| o.is_success()).map(|o| o.job.destination.clone()).collect()
    }

    pub fn errors(&self) -> Vec<&MergeError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err()).collect()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Overall outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Every reference merged, every requested output produced.
    Complete,
    /// Something was merged, but references were skipped or an output failed.
    Partial,
    /// Nothing was merged.
    Failed,
}

/// Terminal report of [`crate::MergeOrchestrator::run`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergeSummary {
    pub build: BuildReport,
    /// `None` when no export was requested.
    pub export: Option<ExportResults>,
    /// Where the workbook was saved, if it was.
    pub persisted: Option<PathBuf>,
    pub persist_error: Option<MergeError>,
    /// Export was requested but could not start, e.g. the output directory vanished after validation.
    pub export_error: Option<MergeError>,
}

impl MergeSummary {
    pub fn sheets_merged(&self) -> usize {
        self.build.merged
    }

    pub fn sheets_skipped(&self) -> usize {
        self.build.skipped_count()
    }

    pub fn documents_produced(&self) -> usize {
        self.export.as_ref().map(|e| e.produced()).unwrap_or(0)
    }

    pub fn documents_failed(&self) -> usize {
        self.export.as_ref().map(|e| e.failed()).unwrap_or(0)
    }

    pub fn status(&self) -> RequestStatus {
        if self.build.merged == 0 {
            RequestStatus::Failed
        } else if self.build.is_partial()
            || self.documents_failed() > 0
            || self.persist_error.is_some()
            || self.export_error.is_some()
        {
            RequestStatus::Partial
        } else {
            RequestStatus::Complete
        }
    }
}

impl fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build)?;
        if let Some(path) = &self.persisted {
            write!(f, "; saved {}", path.display())?;
        }
        if let Some(err) = &self.persist_error {
            write!(f, "; {}", err)?;
        }
        if let Some(err) = &self.export_error {
            write!(f, "; {}", err)?;
        }
        if self.export.is_some() {
            write!(f, "; documents: {} produced, {} failed", self.documents_produced(), self.documents_failed())?;
        }
        Ok(())
    }
}
