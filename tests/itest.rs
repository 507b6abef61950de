// 集成测试
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use xlsx_merge_export::app::{
    Application, ApplicationLauncher, NativeApplication, NativeLauncher, Persister, Renderer, SheetHandle,
    StructuralCopier, WorkbookHandle,
};
use xlsx_merge_export::catalog::discover_workbook_files;
use xlsx_merge_export::error::Result as MergeResult;
use xlsx_merge_export::model::{ContainerFormat, SheetContent};
use xlsx_merge_export::read::{AutoReader, SheetReader, XlsxBook};
use xlsx_merge_export::{
    get_num_from_ord, get_ord_from_num, get_ord_from_tuple, get_tuple_from_ord, CellValue, ExportGrouping, MergeError, MergeMode,
    MergeOrchestrator, MergeRequest, RequestStatus,
};

#[test]
pub fn test_ord_to_num(){
    assert!(get_num_from_ord("B3".as_bytes()).unwrap() == 2);
    assert!(get_num_from_ord("Z".as_bytes()).unwrap() == 26);
    assert!(get_num_from_ord("AB".as_bytes()).unwrap() == 28);

    assert!(get_ord_from_num(1).unwrap() == "A".to_string());
    assert!(get_ord_from_num(27).unwrap() == "AA".to_string());
    assert!(get_ord_from_num(37).unwrap() == "AK".to_string());

    assert!(get_tuple_from_ord("A1".as_bytes()).unwrap() == (1, 1));
    assert!(get_tuple_from_ord("B3".as_bytes()).unwrap() == (3, 2));
    assert!(get_ord_from_tuple(3, 2).unwrap() == "B3".to_string());
}

fn row(vals: &[&str]) -> Vec<CellValue> {
    vals.iter()
        .map(|v| match v.parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::from(*v),
        })
        .collect()
}

fn write_book(dir: &Path, name: &str, sheets: &[(&str, Vec<Vec<CellValue>>)]) -> PathBuf {
    let path = dir.join(name);
    let mut book = rust_xlsxwriter::Workbook::new();
    for (sheet, rows) in sheets {
        let ws = book.add_worksheet();
        ws.set_name(*sheet).unwrap();
        for (r, line) in rows.iter().enumerate() {
            for (c, val) in line.iter().enumerate() {
                ws.write(r as u32, c as u16, val.clone()).unwrap();
            }
        }
    }
    book.save(&path).unwrap();
    path
}

fn sales() -> Vec<Vec<CellValue>> {
    vec![row(&["region", "amount"]), row(&["north", "10"]), row(&["south", "20"])]
}

fn is_pdf(path: &Path) -> bool {
    std::fs::read(path).map(|b| b.starts_with(b"%PDF")).unwrap_or(false)
}

#[test]
fn structural_merge_keeps_sheets_apart() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_book(dir.path(), "A.xlsx", &[("Sales", sales())]);
    let b = write_book(dir.path(), "B.xlsx", &[("Sales", sales())]);
    let request = MergeRequest::new(vec![(&a, "Sales"), (&b, "Sales")], MergeMode::Structural).unwrap();

    let mut orchestrator = MergeOrchestrator::new();
    let outcome = orchestrator.build_workbook(&request).unwrap();
    assert_eq!(outcome.workbook.identifiers(), vec!["A_Sales", "B_Sales"]);
    assert_eq!(outcome.workbook.sheet("B_Sales").and_then(|s| s.origin.clone()), Some(b.canonicalize().unwrap()));
    assert!(orchestrator.holds_application());

    let out = dir.path().join("merged.xlsx");
    orchestrator.persist_workbook(&outcome.workbook, &out).unwrap();
    orchestrator.release().unwrap();
    assert!(!orchestrator.holds_application());

    let mut book = XlsxBook::new(&out, true).unwrap();
    assert_eq!(book.sheet_names(), &vec!["A_Sales".to_string(), "B_Sales".to_string()]);
    assert_eq!(book.read_sheet("B_Sales").unwrap().rows, sales());
}

#[test]
fn structural_build_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_book(dir.path(), "A.xlsx", &[("Sales", sales()), ("Cost", sales())]);
    let request = MergeRequest::new(vec![(&a, "Cost"), (&a, "Sales"), (&a, "Cost")], MergeMode::Structural).unwrap();

    let mut orchestrator = MergeOrchestrator::new();
    let first = orchestrator.build_workbook(&request).unwrap().workbook.identifiers();
    orchestrator.release().unwrap();
    let second = orchestrator.build_workbook(&request).unwrap().workbook.identifiers();
    orchestrator.release().unwrap();
    assert_eq!(first, vec!["A_Cost", "A_Sales", "A_Cost_2"]);
    assert_eq!(first, second);
}

#[test]
fn concat_merge_drops_later_headers() {
    let dir = tempfile::tempdir().unwrap();
    let f1 = write_book(dir.path(), "file1.xlsx", &[("Data", vec![row(&["h1", "h2"]), row(&["1", "2"]), row(&["3", "4"])])]);
    let f2 = write_book(dir.path(), "file2.xlsx", &[("Data", vec![row(&["h1", "h2"]), row(&["5", "6"])])]);
    let request = MergeRequest::new(vec![(&f1, "Data"), (&f2, "Data")], MergeMode::Concat).unwrap();

    let mut orchestrator = MergeOrchestrator::new();
    let outcome = orchestrator.build_workbook(&request).unwrap();
    assert_eq!(outcome.workbook.len(), 1);
    let expected = vec![row(&["h1", "h2"]), row(&["1", "2"]), row(&["3", "4"]), row(&["5", "6"])];
    assert_eq!(outcome.workbook.sheets()[0].content, SheetContent::Values(expected.clone()));

    let out = dir.path().join("concat.xlsx");
    orchestrator.persist_workbook(&outcome.workbook, &out).unwrap();
    assert!(!orchestrator.holds_application());
    assert_eq!(AutoReader.list_sheet_names(&out).unwrap(), vec!["MergedData"]);
    assert_eq!(AutoReader.read_rows(&out, "MergedData").unwrap(), expected);
}

#[test]
fn deleted_source_gives_partial_success() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_book(dir.path(), "A.xlsx", &[("Sales", sales())]);
    let b = write_book(dir.path(), "B.xlsx", &[("Sales", sales())]);
    let gone = write_book(dir.path(), "gone.xlsx", &[("Sales", sales())]);
    std::fs::remove_file(&gone).unwrap();
    let pdf_dir = dir.path().join("pdf");
    let request = MergeRequest::new(vec![(&a, "Sales"), (&gone, "Sales"), (&b, "Sales")], MergeMode::Structural)
        .unwrap()
        .with_output_dir(&pdf_dir);

    let mut orchestrator = MergeOrchestrator::new();
    let summary = orchestrator.run(&request).unwrap();
    assert_eq!(summary.sheets_merged(), 2);
    assert_eq!(summary.sheets_skipped(), 1);
    assert_eq!(summary.build.skipped[0].error.kind(), "ReadError");
    assert_eq!(summary.status(), RequestStatus::Partial);
    assert_eq!(
        summary.to_string(),
        "merged 2 of 3 sheets, 1 skipped: gone.xlsx | Sales (ReadError); documents: 1 produced, 0 failed"
    );
    assert!(is_pdf(&pdf_dir.join("merged.pdf")));
    assert!(!orchestrator.holds_application());
}

#[test]
fn per_source_file_export_writes_one_document_per_file() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_book(dir.path(), "A.xlsx", &[("Sales", sales()), ("Cost", sales())]);
    let b = write_book(dir.path(), "B.xlsx", &[("Sales", sales())]);
    let pdf_dir = dir.path().join("pdf");
    let request = MergeRequest::new(vec![(&a, "Sales"), (&a, "Cost"), (&b, "Sales")], MergeMode::Structural)
        .unwrap()
        .with_grouping(ExportGrouping::PerSourceFile)
        .with_output_dir(&pdf_dir);

    let summary = MergeOrchestrator::new().run(&request).unwrap();
    assert_eq!(summary.status(), RequestStatus::Complete);
    let export = summary.export.unwrap();
    assert_eq!(export.outcomes[0].job.sheet_identifiers, vec!["A_Sales", "A_Cost"]);
    let names: Vec<String> = export.documents().iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
    assert_eq!(names, vec!["A.pdf", "B.pdf"]);
    assert!(is_pdf(&pdf_dir.join("A.pdf")));
    assert!(is_pdf(&pdf_dir.join("B.pdf")));
}

#[test]
fn per_sheet_export_of_concat_result() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_book(dir.path(), "A.xlsx", &[("Sales", sales())]);
    let b = write_book(dir.path(), "B.xlsx", &[("Sales", sales())]);
    let pdf_dir = dir.path().join("pdf");
    let request = MergeRequest::new(vec![(&a, "Sales"), (&b, "Sales")], MergeMode::Concat)
        .unwrap()
        .with_grouping(ExportGrouping::PerSheet)
        .with_output_dir(&pdf_dir)
        .with_workbook_save_path(dir.path().join("merged.xlsx"));

    let summary = MergeOrchestrator::new().run(&request).unwrap();
    assert_eq!(summary.documents_produced(), 1);
    assert!(is_pdf(&pdf_dir.join("MergedData.pdf")));
    assert!(summary.persisted.as_deref().is_some_and(|p| p.ends_with("merged.xlsx")));
    assert_eq!(AutoReader.read_rows(&dir.path().join("merged.xlsx"), "MergedData").unwrap().len(), 5);
}

#[test]
fn unsupported_container_fails_persistence_only() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_book(dir.path(), "A.xlsx", &[("Sales", sales())]);
    let request = MergeRequest::new(vec![(&a, "Sales")], MergeMode::Structural)
        .unwrap()
        .with_workbook_save_path(dir.path().join("merged.xls"))
        .with_output_dir(dir.path().join("pdf"));

    let summary = MergeOrchestrator::new().run(&request).unwrap();
    assert_eq!(summary.persist_error.as_ref().map(|e| e.kind()), Some("PersistError"));
    assert_eq!(summary.documents_produced(), 1);
    assert_eq!(summary.status(), RequestStatus::Partial);
    assert!(!dir.path().join("merged.xls").exists());
}

#[test]
fn listing_reports_corrupt_files_separately() {
    let dir = tempfile::tempdir().unwrap();
    write_book(dir.path(), "A.xlsx", &[("Sales", sales()), ("Cost", sales())]);
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    write_book(&dir.path().join("nested"), "B.xlsx", &[("Sales", sales())]);
    std::fs::write(dir.path().join("broken.xlsx"), b"not a zip").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let files = discover_workbook_files([dir.path()]);
    assert_eq!(files.len(), 3);
    let listing = MergeOrchestrator::new().list_sheets(&files);
    assert_eq!(listing.errors().len(), 1);
    let labels: Vec<String> = listing.entries().iter().map(|e| e.label()).collect();
    assert_eq!(labels, vec!["A.xlsx | Sales", "A.xlsx | Cost", "B.xlsx | Sales"]);
}

struct UnavailableLauncher;

impl ApplicationLauncher for UnavailableLauncher {
    type App = NativeApplication;

    fn launch(&self) -> MergeResult<NativeApplication> {
        Err(MergeError::ExternalResourceUnavailable("no spreadsheet application installed".into()))
    }
}

#[test]
fn unavailable_application_is_a_total_failure() {
    let request = MergeRequest::new(vec![("/data/A.xlsx", "Sales")], MergeMode::Structural).unwrap();
    let mut orchestrator = MergeOrchestrator::with_collaborators(UnavailableLauncher, AutoReader);
    let err = orchestrator.run(&request).unwrap_err();
    assert_eq!(err.kind(), "ExternalResourceUnavailable");
    assert_eq!(err.to_string(), "could not acquire required external resource: no spreadsheet application installed");
}

#[test]
fn unusable_output_dir_fails_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_book(dir.path(), "A.xlsx", &[("Sales", sales())]);
    std::fs::write(dir.path().join("blocker"), b"").unwrap();
    let saved = dir.path().join("merged.xlsx");
    let request = MergeRequest::new(vec![(&a, "Sales")], MergeMode::Concat)
        .unwrap()
        .with_workbook_save_path(&saved)
        .with_output_dir(dir.path().join("blocker").join("pdf"));

    let err = MergeOrchestrator::new().run(&request).unwrap_err();
    assert_eq!(err.kind(), "ConfigError");
    assert!(!saved.exists());
}

#[test]
fn export_that_cannot_start_keeps_the_summary() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_book(dir.path(), "A.xlsx", &[("Sales", sales())]);
    let b = write_book(dir.path(), "B.xlsx", &[("Sales", sales())]);
    let saved = dir.path().join("merged.xlsx");
    let request = MergeRequest::new(vec![(&a, "Sales"), (&b, "Sales")], MergeMode::Concat)
        .unwrap()
        .with_workbook_save_path(&saved)
        .with_output_dir(dir.path().join("pdf"));

    // concatenation needs no application until the export step
    let summary = MergeOrchestrator::with_collaborators(UnavailableLauncher, AutoReader).run(&request).unwrap();
    assert_eq!(summary.sheets_merged(), 2);
    assert!(summary.persisted.is_some());
    assert!(saved.exists());
    assert_eq!(summary.export_error.as_ref().map(|e| e.kind()), Some("ExternalResourceUnavailable"));
    assert!(summary.export.is_none());
    assert_eq!(summary.status(), RequestStatus::Partial);
}

#[test]
fn concat_rows_start_at_row_one() {
    let dir = tempfile::tempdir().unwrap();
    let f1 = write_book(dir.path(), "file1.xlsx", &[("Data", vec![vec![], row(&["h"]), row(&["1"])])]);
    let f2 = write_book(dir.path(), "file2.xlsx", &[("Data", vec![vec![], row(&["h"]), row(&["2"])])]);
    let request = MergeRequest::new(vec![(&f1, "Data"), (&f2, "Data")], MergeMode::Concat).unwrap();

    let outcome = MergeOrchestrator::new().build_workbook(&request).unwrap();
    // 3 + 3 rows, the first row of file2 dropped
    let expected = vec![vec![], row(&["h"]), row(&["1"]), row(&["h"]), row(&["2"])];
    assert_eq!(outcome.workbook.sheets()[0].content, SheetContent::Values(expected));
}

/// native application whose renderer fails for one destination
struct FlakyApp {
    inner: NativeApplication,
    fail_on: String,
    quits: Rc<Cell<u32>>,
}

impl StructuralCopier for FlakyApp {
    fn new_workbook(&mut self) -> MergeResult<WorkbookHandle> {
        self.inner.new_workbook()
    }
    fn open_workbook(&mut self, path: &Path) -> MergeResult<WorkbookHandle> {
        self.inner.open_workbook(path)
    }
    fn close_workbook(&mut self, workbook: WorkbookHandle) -> MergeResult<()> {
        self.inner.close_workbook(workbook)
    }
    fn copy_sheet(&mut self, source: &Path, sheet_name: &str, into: WorkbookHandle) -> MergeResult<SheetHandle> {
        self.inner.copy_sheet(source, sheet_name, into)
    }
    fn rename_sheet(&mut self, sheet: SheetHandle, new_name: &str) -> MergeResult<()> {
        self.inner.rename_sheet(sheet, new_name)
    }
    fn delete_sheet(&mut self, sheet: SheetHandle) -> MergeResult<()> {
        self.inner.delete_sheet(sheet)
    }
    fn sheets(&self, workbook: WorkbookHandle) -> MergeResult<Vec<SheetHandle>> {
        self.inner.sheets(workbook)
    }
    fn sheet_name(&self, sheet: SheetHandle) -> MergeResult<String> {
        self.inner.sheet_name(sheet)
    }
    fn is_sheet_empty(&self, sheet: SheetHandle) -> MergeResult<bool> {
        self.inner.is_sheet_empty(sheet)
    }
}

impl Persister for FlakyApp {
    fn save_as(&mut self, workbook: WorkbookHandle, path: &Path, format: ContainerFormat) -> MergeResult<()> {
        self.inner.save_as(workbook, path, format)
    }
}

impl Renderer for FlakyApp {
    fn select_sheets(&mut self, workbook: WorkbookHandle, identifiers: &[String]) -> MergeResult<()> {
        self.inner.select_sheets(workbook, identifiers)
    }
    fn export_fixed_layout(&mut self, workbook: WorkbookHandle, destination: &Path) -> MergeResult<()> {
        if destination.ends_with(&self.fail_on) {
            return Err(MergeError::export(destination, "printer driver crashed"));
        }
        self.inner.export_fixed_layout(workbook, destination)
    }
}

impl Application for FlakyApp {
    fn quit(&mut self) -> MergeResult<()> {
        self.quits.set(self.quits.get() + 1);
        self.inner.quit()
    }
}

struct FlakyLauncher {
    inner: NativeLauncher,
    fail_on: String,
    quits: Rc<Cell<u32>>,
}

impl ApplicationLauncher for FlakyLauncher {
    type App = FlakyApp;

    fn launch(&self) -> MergeResult<FlakyApp> {
        Ok(FlakyApp { inner: self.inner.launch()?, fail_on: self.fail_on.clone(), quits: self.quits.clone() })
    }
}

#[test]
fn failed_document_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_book(dir.path(), "A.xlsx", &[("Sales", sales())]);
    let b = write_book(dir.path(), "B.xlsx", &[("Sales", sales())]);
    let c = write_book(dir.path(), "C.xlsx", &[("Sales", sales())]);
    let pdf_dir = dir.path().join("pdf");
    let request = MergeRequest::new(vec![(&a, "Sales"), (&b, "Sales"), (&c, "Sales")], MergeMode::Structural)
        .unwrap()
        .with_grouping(ExportGrouping::PerSheet)
        .with_output_dir(&pdf_dir);

    let quits = Rc::new(Cell::new(0));
    let native = NativeLauncher::new();
    let launcher = FlakyLauncher { inner: native.clone(), fail_on: "B_Sales.pdf".into(), quits: quits.clone() };
    let mut orchestrator = MergeOrchestrator::with_collaborators(launcher, AutoReader);
    let summary = orchestrator.run(&request).unwrap();

    assert_eq!(summary.documents_produced(), 2);
    assert_eq!(summary.documents_failed(), 1);
    assert_eq!(summary.status(), RequestStatus::Partial);
    assert!(is_pdf(&pdf_dir.join("A_Sales.pdf")));
    assert!(!pdf_dir.join("B_Sales.pdf").exists());
    assert!(is_pdf(&pdf_dir.join("C_Sales.pdf")));
    assert_eq!(quits.get(), 1);
    assert!(!native.is_held());
}
