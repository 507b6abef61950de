//! Request and workbook model: what is merged, how, and what the mergers produce.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::app::{SheetHandle, WorkbookHandle};
use crate::error::{MergeError, Result};
use crate::CellValue;

/// Destination sheet name used by concatenation mode.
pub const CONCAT_SHEET_NAME: &str = "MergedData";

/// One (source file, sheet) pair at its position in the merge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetReference {
    /// Absolute, normalized.
    pub source_path: PathBuf,
    pub sheet_name: String,
    /// Dense 0..N-1 within one request.
    pub order: usize,
    /// Concatenation mode drops the first row of every non-first reference only when this is set.
    pub has_header: bool,
}

impl SheetReference {
    pub fn new(source_path: impl AsRef<Path>, sheet_name: impl Into<String>, order: usize) -> Self {
        Self {
            source_path: normalize_path(source_path.as_ref()),
            sheet_name: sheet_name.into(),
            order,
            has_header: true,
        }
    }
}

impl fmt::Display for SheetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.source_path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        write!(f, "{} | {}", file, self.sheet_name)
    }
}

/// How the referenced sheets are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Every source sheet is copied, layout included, as its own destination sheet.
    Structural,
    /// Raw values are flattened into one continuous sheet.
    Concat,
}

/// How many documents an export produces and which sheets go into each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportGrouping {
    /// One document holding every sheet.
    #[default]
    OneMerged,
    /// One document per destination sheet.
    PerSheet,
    /// One document per original source file.
    PerSourceFile,
}

/// Persisted workbook container, chosen from the target extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// `.xlsx`, and the default for unknown extensions
    OpenXml,
    /// `.xlsm`
    MacroEnabled,
    /// `.xls`
    LegacyBinary,
}

impl ContainerFormat {
    pub fn from_path(path: &Path) -> ContainerFormat {
        let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("xlsm") => ContainerFormat::MacroEnabled,
            Some("xls") => ContainerFormat::LegacyBinary,
            _ => ContainerFormat::OpenXml,
        }
    }
}

/// Immutable description of one merge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    references: Vec<SheetReference>,
    mode: MergeMode,
    grouping: ExportGrouping,
    output_dir: Option<PathBuf>,
    workbook_save_path: Option<PathBuf>,
    export_documents: bool,
}

impl MergeRequest {
    /// References get their order from their position.
    pub fn new<P, S, I>(sources: I, mode: MergeMode) -> Result<Self>
    where
        P: AsRef<Path>,
        S: Into<String>,
        I: IntoIterator<Item = (P, S)>,
    {
        let references: Vec<SheetReference> = sources
            .into_iter()
            .enumerate()
            .map(|(order, (path, sheet))| SheetReference::new(path, sheet, order))
            .collect();
        if references.is_empty() {
            return Err(MergeError::Config("no sheets selected".to_string()));
        }
        Ok(Self {
            references,
            mode,
            grouping: ExportGrouping::default(),
            output_dir: None,
            workbook_save_path: None,
            export_documents: false,
        })
    }

    pub fn with_grouping(mut self, grouping: ExportGrouping) -> Self {
        self.grouping = grouping;
        self
    }

    /// Setting the output directory also requests document export.
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = Some(normalize_path(dir.as_ref()));
        self.export_documents = true;
        self
    }

    pub fn with_export(mut self, export_documents: bool) -> Self {
        self.export_documents = export_documents;
        self
    }

    pub fn with_workbook_save_path(mut self, path: impl AsRef<Path>) -> Self {
        self.workbook_save_path = Some(normalize_path(path.as_ref()));
        self
    }

    /// Header flag of the reference at `order`; unknown orders are ignored.
    pub fn with_header(mut self, order: usize, has_header: bool) -> Self {
        if let Some(r) = self.references.get_mut(order) {
            r.has_header = has_header;
        }
        self
    }

    pub fn references(&self) -> &[SheetReference] {
        &self.references
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    pub fn grouping(&self) -> ExportGrouping {
        self.grouping
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn workbook_save_path(&self) -> Option<&Path> {
        self.workbook_save_path.as_deref()
    }

    pub fn exports_documents(&self) -> bool {
        self.export_documents
    }

    /// Checks done before any work begins.
    pub fn validate(&self) -> Result<()> {
        if self.export_documents {
            match &self.output_dir {
                None => return Err(MergeError::Config("document export requested without an output directory".to_string())),
                Some(dir) => {
                    // the nearest existing ancestor decides whether the directory can be created
                    if let Some(existing) = dir.ancestors().find(|p| p.exists()) {
                        if !existing.is_dir() {
                            return Err(MergeError::Config(format!(
                                "cannot use output directory {}: {} is not a directory",
                                dir.display(),
                                existing.display()
                            )));
                        }
                    }
                }
            }
        }
        if let Some(path) = &self.workbook_save_path {
            if path.is_dir() {
                return Err(MergeError::Config(format!("workbook save path is a directory: {}", path.display())));
            }
        }
        Ok(())
    }
}

/// Cells of a destination sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetContent {
    /// Copied structure living inside the spreadsheet application.
    Structural(SheetHandle),
    /// Flattened value grid.
    Values(Vec<Vec<CellValue>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestinationSheet {
    /// Collision-free within the workbook, at most 31 characters, no reserved characters.
    pub identifier: String,
    /// Source file the sheet was copied from; `None` for the concatenated sheet.
    pub origin: Option<PathBuf>,
    pub content: SheetContent,
}

impl DestinationSheet {
    /// Widest row of a value grid; structural sheets report 0.
    pub fn column_count(&self) -> usize {
        match &self.content {
            SheetContent::Values(rows) => rows.iter().map(|r| r.len()).max().unwrap_or(0),
            SheetContent::Structural(_) => 0,
        }
    }
}

/// Result of one merger run; lives only for the duration of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledWorkbook {
    mode: MergeMode,
    backing: Option<WorkbookHandle>,
    sheets: Vec<DestinationSheet>,
}

impl AssembledWorkbook {
    pub fn structural(backing: WorkbookHandle, sheets: Vec<DestinationSheet>) -> Self {
        Self { mode: MergeMode::Structural, backing: Some(backing), sheets }
    }

    pub fn concatenated(rows: Vec<Vec<CellValue>>) -> Self {
        let sheet = DestinationSheet {
            identifier: CONCAT_SHEET_NAME.to_string(),
            origin: None,
            content: SheetContent::Values(rows),
        };
        Self { mode: MergeMode::Concat, backing: None, sheets: vec![sheet] }
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Application workbook holding the structural copies.
    pub fn backing(&self) -> Option<WorkbookHandle> {
        self.backing
    }

    pub fn sheets(&self) -> &[DestinationSheet] {
        &self.sheets
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Identifiers in workbook order.
    pub fn identifiers(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.identifier.clone()).collect()
    }

    pub fn sheet(&self, identifier: &str) -> Option<&DestinationSheet> {
        self.sheets.iter().find(|s| s.identifier == identifier)
    }
}

/// One document to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub destination: PathBuf,
    /// Ordered, never empty.
    pub sheet_identifiers: Vec<String>,
}

/// File name without directory and extension.
pub fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Absolute path with `.` and `..` folded; symlinks resolved when the path exists.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(path)
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
