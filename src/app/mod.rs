//! Spreadsheet-application collaborator.
//!
//! The application is a single-instance, stateful resource: it is acquired through an
//! [`ApplicationLauncher`], held in an [`ApplicationSession`] and quit exactly once when the session ends.
//! Selection is ambient state of the application, so rendering always goes through
//! [`Renderer::render_sheets`], which selects and renders in one step.
use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::error::Result;
use crate::model::ContainerFormat;

/// in-process application backed by the crate's own reader, writer and renderer
pub mod native;
/// fixed-layout PDF rendering
pub mod pdf;

pub use native::{NativeApplication, NativeLauncher};
pub use pdf::PageSetup;

/// Workbook open in the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkbookHandle(pub u32);

/// Sheet of an open workbook; stays valid across renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetHandle {
    pub workbook: WorkbookHandle,
    pub id: u32,
}

impl SheetHandle {
    pub fn new(workbook: WorkbookHandle, id: u32) -> Self {
        Self { workbook, id }
    }
}

/// Workbook and sheet operations that keep formatting and layout.
///
/// `copy_sheet` fails with `MergeError::Read` when the source cannot be opened or lacks the sheet, and with
/// `MergeError::StructuralCopy` when the application rejects the operation.
pub trait StructuralCopier {
    /// new workbook holding exactly one empty placeholder sheet
    fn new_workbook(&mut self) -> Result<WorkbookHandle>;
    fn open_workbook(&mut self, path: &Path) -> Result<WorkbookHandle>;
    fn close_workbook(&mut self, workbook: WorkbookHandle) -> Result<()>;
    /// appends a copy of the source sheet at the end of `into`
    fn copy_sheet(&mut self, source: &Path, sheet_name: &str, into: WorkbookHandle) -> Result<SheetHandle>;
    fn rename_sheet(&mut self, sheet: SheetHandle, new_name: &str) -> Result<()>;
    fn delete_sheet(&mut self, sheet: SheetHandle) -> Result<()>;
    /// sheets in workbook order
    fn sheets(&self, workbook: WorkbookHandle) -> Result<Vec<SheetHandle>>;
    fn sheet_name(&self, sheet: SheetHandle) -> Result<String>;
    fn is_sheet_empty(&self, sheet: SheetHandle) -> Result<bool>;
}

/// Saves workbooks.
pub trait Persister {
    fn save_as(&mut self, workbook: WorkbookHandle, path: &Path, format: ContainerFormat) -> Result<()>;
}

/// Produces fixed-layout documents from the selected sheets.
pub trait Renderer {
    /// replaces the current selection
    fn select_sheets(&mut self, workbook: WorkbookHandle, identifiers: &[String]) -> Result<()>;
    /// renders the current selection, overwriting `destination`
    fn export_fixed_layout(&mut self, workbook: WorkbookHandle, destination: &Path) -> Result<()>;

    /// Select exactly `identifiers` and render them. Never relies on an earlier selection.
    fn render_sheets(&mut self, workbook: WorkbookHandle, identifiers: &[String], destination: &Path) -> Result<()> {
        self.select_sheets(workbook, identifiers)?;
        self.export_fixed_layout(workbook, destination)
    }
}

/// The whole application.
pub trait Application: StructuralCopier + Persister + Renderer {
    /// closes every workbook and gives the instance back
    fn quit(&mut self) -> Result<()>;
}

/// Acquires the application; fails with `ExternalResourceUnavailable` when it cannot, without retrying.
pub trait ApplicationLauncher {
    type App: Application;

    fn launch(&self) -> Result<Self::App>;
}

/// Scoped hold on the application: quits it exactly once, on [`release`](Self::release) or on drop.
pub struct ApplicationSession<A: Application> {
    app: A,
    released: bool,
}

impl<A: Application> ApplicationSession<A> {
    pub fn open<L: ApplicationLauncher<App = A>>(launcher: &L) -> Result<Self> {
        let app = launcher.launch()?;
        log::debug!("spreadsheet application acquired");
        Ok(Self { app, released: false })
    }

    /// Quit now and report how it went.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        log::debug!("spreadsheet application released");
        self.app.quit()
    }
}

impl<A: Application> Deref for ApplicationSession<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.app
    }
}

impl<A: Application> DerefMut for ApplicationSession<A> {
    fn deref_mut(&mut self) -> &mut A {
        &mut self.app
    }
}

impl<A: Application> Drop for ApplicationSession<A> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            log::debug!("spreadsheet application released on drop");
            if let Err(e) = self.app.quit() {
                log::error!("failed to quit spreadsheet application: {}", e);
            }
        }
    }
}
