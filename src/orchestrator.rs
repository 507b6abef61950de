//! Top-level coordinator.
//!
//! `Idle -> Building -> (Persisting)? -> (Exporting)? -> Done | Failed`. The spreadsheet application is
//! acquired the first time a step needs it and released before [`MergeOrchestrator::run`] returns, whatever
//! the outcome. Export always renders a staged copy of the assembled workbook, written to a private
//! temporary directory that is removed when the export step ends.
use std::path::{Path, PathBuf};

use crate::app::{ApplicationLauncher, ApplicationSession, NativeLauncher, Persister, StructuralCopier, WorkbookHandle};
use crate::catalog::{SheetCatalog, SheetListing};
use crate::error::{MergeError, Result};
use crate::export::{ExportDriver, ExportPlanner};
use crate::merge::{BuildOutcome, ConcatMerger, StructuralMerger};
use crate::model::{normalize_path, AssembledWorkbook, ContainerFormat, ExportGrouping, MergeMode, MergeRequest, SheetContent};
use crate::read::{AutoReader, SheetReader};
use crate::report::{ExportResults, MergeSummary, RequestStatus};
use crate::write::XlsxWriter;

/// Prefix of the private staging directory.
pub const STAGING_DIR_PREFIX: &str = "excelpdf_";
const STAGED_WORKBOOK_NAME: &str = "merged.xlsx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Building,
    Persisting,
    Exporting,
    Done,
    Failed,
}

pub struct MergeOrchestrator<L: ApplicationLauncher = NativeLauncher, R: SheetReader = AutoReader> {
    launcher: L,
    reader: R,
    session: Option<ApplicationSession<L::App>>,
    state: OrchestratorState,
}

impl MergeOrchestrator {
    /// Native application, reader picked by file extension.
    pub fn new() -> Self {
        Self::with_collaborators(NativeLauncher::new(), AutoReader)
    }
}

impl Default for MergeOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ApplicationLauncher, R: SheetReader> MergeOrchestrator<L, R> {
    pub fn with_collaborators(launcher: L, reader: R) -> Self {
        Self { launcher, reader, session: None, state: OrchestratorState::Idle }
    }

    /// Progress of [`run`](Self::run). The single-step operations leave the state of the step they
    /// performed, or `Failed`.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Whether the spreadsheet application is currently held.
    pub fn holds_application(&self) -> bool {
        self.session.is_some()
    }

    fn set_state(&mut self, state: OrchestratorState) {
        log::debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn application(&mut self) -> Result<&mut ApplicationSession<L::App>> {
        if self.session.is_none() {
            self.session = Some(ApplicationSession::open(&self.launcher)?);
        }
        self.session
            .as_mut()
            .ok_or_else(|| MergeError::ExternalResourceUnavailable("spreadsheet application session lost".to_string()))
    }

    /// Quit the application if it is held.
    pub fn release(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => session.release(),
            None => Ok(()),
        }
    }

    /// Sheet names per file; unreadable files are reported, not fatal.
    pub fn list_sheets<P, I>(&self, files: I) -> SheetListing
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = P>,
    {
        SheetCatalog::new(&self.reader).list_sheets(files)
    }

    /// Assemble the referenced sheets. Skipped references are in the report; a rejected copy or an
    /// unavailable application is returned as an error.
    pub fn build_workbook(&mut self, request: &MergeRequest) -> Result<BuildOutcome> {
        request.validate()?;
        self.set_state(OrchestratorState::Building);
        let built = match request.mode() {
            MergeMode::Structural => self
                .application()
                .and_then(|app| StructuralMerger::new(&mut **app).merge(request.references())),
            MergeMode::Concat => Ok(ConcatMerger::new(&self.reader).merge(request.references())),
        };
        match built {
            Ok(outcome) => {
                log::info!("{}", outcome.report);
                Ok(outcome)
            }
            Err(e) => {
                log::error!("build aborted: {}", e);
                self.set_state(OrchestratorState::Failed);
                Err(e)
            }
        }
    }

    /// Save the workbook; the container follows the extension of `path`.
    pub fn persist_workbook(&mut self, workbook: &AssembledWorkbook, path: &Path) -> Result<PathBuf> {
        self.set_state(OrchestratorState::Persisting);
        let path = normalize_path(path);
        let format = ContainerFormat::from_path(&path);
        self.save_workbook(workbook, &path, format)?;
        log::info!("workbook saved to {}", path.display());
        Ok(path)
    }

    fn save_workbook(&mut self, workbook: &AssembledWorkbook, path: &Path, format: ContainerFormat) -> Result<()> {
        match workbook.mode() {
            MergeMode::Structural => {
                let backing = workbook
                    .backing()
                    .ok_or_else(|| MergeError::persist(path, "structural workbook has no application workbook"))?;
                self.application()?.save_as(backing, path, format)
            }
            MergeMode::Concat => {
                if format != ContainerFormat::OpenXml {
                    return Err(MergeError::persist(path, format!("{format:?} container not supported by this backend")));
                }
                let mut writer = XlsxWriter::new();
                for sheet in workbook.sheets() {
                    if let SheetContent::Values(rows) = &sheet.content {
                        writer.append_rows(&sheet.identifier, rows).map_err(|e| MergeError::persist(path, e))?;
                    }
                }
                writer.save_as(path).map_err(|e| MergeError::persist(path, e))
            }
        }
    }

    /// Plan and run the export jobs for `workbook`. Job failures are in the results; only an unusable
    /// output directory or an unavailable application is returned as an error.
    pub fn export_documents(
        &mut self,
        workbook: &AssembledWorkbook,
        grouping: ExportGrouping,
        output_dir: &Path,
    ) -> Result<ExportResults> {
        self.set_state(OrchestratorState::Exporting);
        let output_dir = prepare_output_dir(output_dir)?;

        let jobs = ExportPlanner::plan(workbook, grouping, &output_dir);
        if jobs.is_empty() {
            return Ok(ExportResults::default());
        }
        let staging = tempfile::Builder::new()
            .prefix(STAGING_DIR_PREFIX)
            .tempdir()
            .map_err(|e| MergeError::ExternalResourceUnavailable(format!("cannot create staging directory: {e}")))?;
        let staged = staging.path().join(STAGED_WORKBOOK_NAME);

        let handle = match self.stage(workbook, &staged).and_then(|()| self.open_staged(&staged)) {
            Ok(handle) => handle,
            Err(e @ MergeError::ExternalResourceUnavailable(_)) => return Err(e),
            Err(e) => {
                log::warn!("cannot stage workbook for export: {}", e);
                let mut results = ExportResults::default();
                for job in jobs {
                    let err = MergeError::export(&job.destination, &e);
                    results.push(job, Err(err));
                }
                return Ok(results);
            }
        };
        let app = self.application()?;
        let results = ExportDriver::new(&mut **app).execute(jobs, handle);
        if let Err(e) = app.close_workbook(handle) {
            log::warn!("cannot close staged workbook: {}", e);
        }
        log::debug!("removing staging directory {}", staging.path().display());
        Ok(results)
    }

    fn stage(&mut self, workbook: &AssembledWorkbook, staged: &Path) -> Result<()> {
        self.save_workbook(workbook, staged, ContainerFormat::OpenXml)
    }

    fn open_staged(&mut self, staged: &Path) -> Result<WorkbookHandle> {
        self.application()?.open_workbook(staged)
    }

    /// The whole request: build, then persist and export as requested. The application is released
    /// before returning.
    pub fn run(&mut self, request: &MergeRequest) -> Result<MergeSummary> {
        self.set_state(OrchestratorState::Idle);
        let result = self.run_inner(request);
        if let Err(e) = self.release() {
            log::error!("failed to release spreadsheet application: {}", e);
        }
        match &result {
            Ok(summary) if summary.status() == RequestStatus::Failed => self.set_state(OrchestratorState::Failed),
            Ok(_) => self.set_state(OrchestratorState::Done),
            Err(e) => {
                log::error!("request failed: {}", e);
                self.set_state(OrchestratorState::Failed);
            }
        }
        result
    }

    fn run_inner(&mut self, request: &MergeRequest) -> Result<MergeSummary> {
        request.validate()?;
        let output_dir = match request.output_dir() {
            Some(dir) if request.exports_documents() => Some(prepare_output_dir(dir)?),
            _ => None,
        };
        let BuildOutcome { workbook, report } = self.build_workbook(request)?;
        let mut summary = MergeSummary { build: report, ..Default::default() };
        if summary.sheets_merged() == 0 {
            log::error!("no sheet could be merged");
            return Ok(summary);
        }

        if let Some(path) = request.workbook_save_path() {
            match self.persist_workbook(&workbook, path) {
                Ok(saved) => summary.persisted = Some(saved),
                Err(e) => {
                    log::warn!("{}", e);
                    summary.persist_error = Some(e);
                }
            }
        }

        if let Some(output_dir) = output_dir {
            match self.export_documents(&workbook, request.grouping(), &output_dir) {
                Ok(results) => summary.export = Some(results),
                Err(e) => {
                    log::error!("export not started: {}", e);
                    summary.export_error = Some(e);
                }
            }
        }

        if let (Some(backing), Some(session)) = (workbook.backing(), self.session.as_mut()) {
            if let Err(e) = session.close_workbook(backing) {
                log::warn!("cannot close merged workbook: {}", e);
            }
        }
        log::info!("{}", summary);
        Ok(summary)
    }
}

fn prepare_output_dir(dir: &Path) -> Result<PathBuf> {
    let dir = normalize_path(dir);
    std::fs::create_dir_all(&dir)
        .map_err(|e| MergeError::Config(format!("cannot use output directory {}: {}", dir.display(), e)))?;
    Ok(dir)
}
