use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::app::pdf::{render_pdf, PageSetup};
use crate::app::{Application, ApplicationLauncher, Persister, Renderer, SheetHandle, StructuralCopier, WorkbookHandle};
use crate::error::{MergeError, Result};
use crate::model::ContainerFormat;
use crate::read::{AutoReader, SheetData, SheetReader};
use crate::{write, EXCEL_ILLEGAL_SHEET_CHARS, MAX_SHEET_NAME_LEN, RESERVED_NAME_CHARS};

/// Name of the sheet every new workbook starts with.
pub const PLACEHOLDER_SHEET_NAME: &str = "Sheet1";

/// Hands out the one native application instance.
#[derive(Debug, Clone, Default)]
pub struct NativeLauncher {
    held: Arc<AtomicBool>,
    page_setup: PageSetup,
}

impl NativeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_setup(mut self, page_setup: PageSetup) -> Self {
        self.page_setup = page_setup;
        self
    }

    /// Whether an application launched from here is still running.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl ApplicationLauncher for NativeLauncher {
    type App = NativeApplication;

    fn launch(&self) -> Result<NativeApplication> {
        if self.held.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(MergeError::ExternalResourceUnavailable("spreadsheet application is already in use".to_string()));
        }
        Ok(NativeApplication {
            held: self.held.clone(),
            reader: AutoReader,
            page_setup: self.page_setup.clone(),
            workbooks: HashMap::new(),
            next_id: 1,
            running: true,
        })
    }
}

#[derive(Debug)]
struct NativeSheet {
    id: u32,
    name: String,
    data: SheetData,
}

#[derive(Debug, Default)]
struct NativeWorkbook {
    sheets: Vec<NativeSheet>,
    selected: Vec<u32>,
}

impl NativeWorkbook {
    fn position(&self, id: u32) -> Option<usize> {
        self.sheets.iter().position(|s| s.id == id)
    }

    fn name_taken(&self, name: &str, except: Option<u32>) -> bool {
        self.sheets.iter().any(|s| Some(s.id) != except && s.name.eq_ignore_ascii_case(name))
    }

    /// Excel names a copy "Sales (2)" when "Sales" is taken
    fn copy_name(&self, base: &str) -> String {
        if !self.name_taken(base, None) {
            return base.to_string();
        }
        let mut n_idx = 2usize;
        loop {
            let suffix = format!(" ({n_idx})");
            let stem: String = base.chars().take(MAX_SHEET_NAME_LEN.saturating_sub(suffix.len())).collect();
            let candidate = format!("{stem}{suffix}");
            if !self.name_taken(&candidate, None) {
                return candidate;
            }
            n_idx += 1;
        }
    }
}

/// In-process spreadsheet application: workbooks live in memory, sheets are copied with their values,
/// merged ranges and column widths, and printed to PDF.
#[derive(Debug)]
pub struct NativeApplication {
    held: Arc<AtomicBool>,
    reader: AutoReader,
    page_setup: PageSetup,
    workbooks: HashMap<u32, NativeWorkbook>,
    next_id: u32,
    running: bool,
}

impl NativeApplication {
    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn workbook(&self, handle: WorkbookHandle) -> Result<&NativeWorkbook> {
        self.workbooks.get(&handle.0).ok_or_else(|| MergeError::StructuralCopy(format!("workbook {} is not open", handle.0)))
    }

    fn workbook_mut(&mut self, handle: WorkbookHandle) -> Result<&mut NativeWorkbook> {
        self.workbooks.get_mut(&handle.0).ok_or_else(|| MergeError::StructuralCopy(format!("workbook {} is not open", handle.0)))
    }

    fn sheet(&self, handle: SheetHandle) -> Result<&NativeSheet> {
        let book = self.workbook(handle.workbook)?;
        book.sheets
            .iter()
            .find(|s| s.id == handle.id)
            .ok_or_else(|| MergeError::StructuralCopy(format!("sheet {} no longer exists", handle.id)))
    }
}

fn check_sheet_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MergeError::StructuralCopy("sheet name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(MergeError::StructuralCopy(format!("sheet name {name:?} is longer than {MAX_SHEET_NAME_LEN} characters")));
    }
    if name.chars().any(|c| RESERVED_NAME_CHARS.contains(&c) || EXCEL_ILLEGAL_SHEET_CHARS.contains(&c)) {
        return Err(MergeError::StructuralCopy(format!("sheet name {name:?} contains a reserved character")));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(MergeError::StructuralCopy(format!("sheet name {name:?} cannot start or end with an apostrophe")));
    }
    Ok(())
}

impl StructuralCopier for NativeApplication {
    fn new_workbook(&mut self) -> Result<WorkbookHandle> {
        let id = self.next_id();
        let sheet_id = self.next_id();
        let placeholder = NativeSheet { id: sheet_id, name: PLACEHOLDER_SHEET_NAME.to_string(), data: SheetData::default() };
        self.workbooks.insert(id, NativeWorkbook { sheets: vec![placeholder], ..Default::default() });
        Ok(WorkbookHandle(id))
    }

    fn open_workbook(&mut self, path: &Path) -> Result<WorkbookHandle> {
        let names = self.reader.list_sheet_names(path).map_err(|e| MergeError::read(path, e))?;
        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let data = self.reader.read_sheet(path, &name).map_err(|e| MergeError::read(path, e))?;
            sheets.push(NativeSheet { id: self.next_id(), name, data });
        }
        let id = self.next_id();
        self.workbooks.insert(id, NativeWorkbook { sheets, ..Default::default() });
        log::debug!("opened {} as workbook {}", path.display(), id);
        Ok(WorkbookHandle(id))
    }

    fn close_workbook(&mut self, workbook: WorkbookHandle) -> Result<()> {
        self.workbooks.remove(&workbook.0);
        Ok(())
    }

    fn copy_sheet(&mut self, source: &Path, sheet_name: &str, into: WorkbookHandle) -> Result<SheetHandle> {
        self.workbook(into)?;
        let data = self.reader.read_sheet(source, sheet_name).map_err(|e| MergeError::read(source, e))?;
        let id = self.next_id();
        let book = self.workbook_mut(into)?;
        let name = book.copy_name(sheet_name);
        book.sheets.push(NativeSheet { id, name, data });
        Ok(SheetHandle::new(into, id))
    }

    fn rename_sheet(&mut self, sheet: SheetHandle, new_name: &str) -> Result<()> {
        check_sheet_name(new_name)?;
        let book = self.workbook_mut(sheet.workbook)?;
        if book.name_taken(new_name, Some(sheet.id)) {
            return Err(MergeError::StructuralCopy(format!("a sheet named {new_name:?} already exists")));
        }
        let pos = book.position(sheet.id).ok_or_else(|| MergeError::StructuralCopy(format!("sheet {} no longer exists", sheet.id)))?;
        book.sheets[pos].name = new_name.to_string();
        Ok(())
    }

    fn delete_sheet(&mut self, sheet: SheetHandle) -> Result<()> {
        let book = self.workbook_mut(sheet.workbook)?;
        let pos = book.position(sheet.id).ok_or_else(|| MergeError::StructuralCopy(format!("sheet {} no longer exists", sheet.id)))?;
        if book.sheets.len() == 1 {
            return Err(MergeError::StructuralCopy("a workbook must keep at least one sheet".to_string()));
        }
        book.sheets.remove(pos);
        book.selected.retain(|id| *id != sheet.id);
        Ok(())
    }

    fn sheets(&self, workbook: WorkbookHandle) -> Result<Vec<SheetHandle>> {
        Ok(self.workbook(workbook)?.sheets.iter().map(|s| SheetHandle::new(workbook, s.id)).collect())
    }

    fn sheet_name(&self, sheet: SheetHandle) -> Result<String> {
        Ok(self.sheet(sheet)?.name.clone())
    }

    fn is_sheet_empty(&self, sheet: SheetHandle) -> Result<bool> {
        Ok(self.sheet(sheet)?.data.is_empty())
    }
}

impl Persister for NativeApplication {
    fn save_as(&mut self, workbook: WorkbookHandle, path: &Path, format: ContainerFormat) -> Result<()> {
        if format != ContainerFormat::OpenXml {
            return Err(MergeError::persist(path, format!("{format:?} container not supported by this backend")));
        }
        let book = self.workbook(workbook)?;
        let sheets = book.sheets.iter().map(|s| (s.name.as_str(), &s.data));
        write::save_sheets(sheets, path).map_err(|e| MergeError::persist(path, e))
    }
}

impl Renderer for NativeApplication {
    fn select_sheets(&mut self, workbook: WorkbookHandle, identifiers: &[String]) -> Result<()> {
        let book = self.workbook_mut(workbook)?;
        let mut selected = Vec::with_capacity(identifiers.len());
        for name in identifiers {
            match book.sheets.iter().find(|s| &s.name == name) {
                Some(s) => selected.push(s.id),
                None => return Err(MergeError::StructuralCopy(format!("no sheet named {name:?}"))),
            }
        }
        if selected.is_empty() {
            return Err(MergeError::StructuralCopy("empty sheet selection".to_string()));
        }
        book.selected = selected;
        Ok(())
    }

    fn export_fixed_layout(&mut self, workbook: WorkbookHandle, destination: &Path) -> Result<()> {
        let book = self.workbook(workbook)?;
        if book.selected.is_empty() {
            return Err(MergeError::export(destination, "no sheets selected"));
        }
        // printed in workbook order, like the real application
        let sheets = book.sheets.iter().filter(|s| book.selected.contains(&s.id)).map(|s| &s.data);
        let pages = render_pdf(sheets, &self.page_setup, destination).map_err(|e| MergeError::export(destination, e))?;
        log::debug!("{} pages written to {}", pages, destination.display());
        Ok(())
    }
}

impl Application for NativeApplication {
    fn quit(&mut self) -> Result<()> {
        self.workbooks.clear();
        if self.running {
            self.running = false;
            self.held.store(false, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for NativeApplication {
    fn drop(&mut self) {
        if self.running {
            self.held.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(app: &NativeApplication, wb: WorkbookHandle) -> Vec<String> {
        app.sheets(wb).unwrap().into_iter().map(|s| app.sheet_name(s).unwrap()).collect()
    }

    #[test]
    fn only_one_instance_at_a_time() {
        let launcher = NativeLauncher::new();
        let mut first = launcher.launch().unwrap();
        let err = launcher.launch().unwrap_err();
        assert_eq!(err.kind(), "ExternalResourceUnavailable");
        first.quit().unwrap();
        assert!(!launcher.is_held());
        let second = launcher.launch().unwrap();
        drop(second);
        assert!(!launcher.is_held());
    }

    #[test]
    fn new_workbook_starts_with_placeholder() {
        let mut app = NativeLauncher::new().launch().unwrap();
        let wb = app.new_workbook().unwrap();
        assert_eq!(names(&app, wb), vec![PLACEHOLDER_SHEET_NAME]);
        let placeholder = app.sheets(wb).unwrap()[0];
        assert!(app.is_sheet_empty(placeholder).unwrap());
        assert_eq!(app.delete_sheet(placeholder).unwrap_err().kind(), "StructuralCopyError");
    }

    #[test]
    fn copy_of_missing_file_is_a_read_error() {
        let mut app = NativeLauncher::new().launch().unwrap();
        let wb = app.new_workbook().unwrap();
        let err = app.copy_sheet(Path::new("/nonexistent/A.xlsx"), "Sales", wb).unwrap_err();
        assert_eq!(err.kind(), "ReadError");
        assert_eq!(names(&app, wb).len(), 1);
    }

    #[test]
    fn rename_rejects_duplicates_and_bad_names() {
        let mut app = NativeLauncher::new().launch().unwrap();
        let wb = app.new_workbook().unwrap();
        let placeholder = app.sheets(wb).unwrap()[0];
        assert!(app.rename_sheet(placeholder, "a/b").is_err());
        assert!(app.rename_sheet(placeholder, "this name is far too long for excel").is_err());
        app.rename_sheet(placeholder, "Summary").unwrap();
        assert_eq!(names(&app, wb), vec!["Summary"]);
    }

    #[test]
    fn legacy_and_macro_containers_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = NativeLauncher::new().launch().unwrap();
        let wb = app.new_workbook().unwrap();
        let err = app.save_as(wb, &dir.path().join("out.xls"), ContainerFormat::LegacyBinary).unwrap_err();
        assert_eq!(err.kind(), "PersistError");
        let err = app.save_as(wb, &dir.path().join("out.xlsm"), ContainerFormat::MacroEnabled).unwrap_err();
        assert_eq!(err.kind(), "PersistError");
    }

    #[test]
    fn copy_names_follow_excel() {
        let mut book = NativeWorkbook::default();
        book.sheets.push(NativeSheet { id: 1, name: "Sales".into(), data: SheetData::default() });
        assert_eq!(book.copy_name("Cost"), "Cost");
        assert_eq!(book.copy_name("sales"), "sales (2)");
    }
}
