use crate::app::{Renderer, WorkbookHandle};
use crate::error::MergeError;
use crate::model::ExportJob;
use crate::report::ExportResults;

/// Runs export jobs one after the other against one open workbook.
pub struct ExportDriver<'a, R: Renderer + ?Sized> {
    renderer: &'a mut R,
}

impl<'a, R: Renderer + ?Sized> ExportDriver<'a, R> {
    pub fn new(renderer: &'a mut R) -> Self {
        Self { renderer }
    }

    /// Every job is attempted in planned order; a failed job is recorded and the next one runs.
    pub fn execute(&mut self, jobs: Vec<ExportJob>, workbook: WorkbookHandle) -> ExportResults {
        let mut results = ExportResults::default();
        for job in jobs {
            let result = self
                .renderer
                .render_sheets(workbook, &job.sheet_identifiers, &job.destination)
                .map_err(|e| match e {
                    MergeError::Export { .. } => e,
                    other => MergeError::export(&job.destination, other),
                });
            match &result {
                Ok(()) => log::info!("wrote {} ({} sheets)", job.destination.display(), job.sheet_identifiers.len()),
                Err(e) => log::warn!("{}", e),
            }
            results.push(job, result);
        }
        results
    }
}
