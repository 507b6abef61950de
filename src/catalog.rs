//! Sheet listing and workbook discovery.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::error::MergeError;
use crate::model::normalize_path;
use crate::read::{AutoReader, SheetReader};

/// Extensions picked up when a directory is expanded.
pub const WORKBOOK_EXTENSIONS: [&str; 4] = ["xls", "xlsx", "xlsm", "xlsb"];

/// One selectable sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub file: PathBuf,
    pub sheet_name: String,
}

impl SheetEntry {
    /// `<file name> | <sheet>`
    pub fn label(&self) -> String {
        let file = self.file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        format!("{} | {}", file, self.sheet_name)
    }
}

/// Sheets of one file, or why they could not be listed.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSheets {
    pub file: PathBuf,
    pub sheets: Result<Vec<String>, MergeError>,
}

/// Result of [`SheetCatalog::list_sheets`], in the order the files were given.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SheetListing {
    pub files: Vec<FileSheets>,
}

impl SheetListing {
    /// Every listed sheet, file by file.
    pub fn entries(&self) -> Vec<SheetEntry> {
        self.files
            .iter()
            .filter_map(|f| f.sheets.as_ref().ok().map(|names| (f, names)))
            .flat_map(|(f, names)| names.iter().map(move |n| SheetEntry { file: f.file.clone(), sheet_name: n.clone() }))
            .collect()
    }

    pub fn errors(&self) -> Vec<&MergeError> {
        self.files.iter().filter_map(|f| f.sheets.as_ref().err()).collect()
    }

    /// Sheet names of `file`, if it was listed successfully.
    pub fn sheets_of(&self, file: &Path) -> Option<&[String]> {
        let file = normalize_path(file);
        self.files.iter().find(|f| f.file == file).and_then(|f| f.sheets.as_ref().ok()).map(|v| v.as_slice())
    }
}

/// Lists the sheets of source files through a reader.
#[derive(Debug, Default, Clone)]
pub struct SheetCatalog<R: SheetReader = AutoReader> {
    reader: R,
}

impl<R: SheetReader> SheetCatalog<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Per-file sheet names; a file that cannot be read gets a `ReadError` and the others are still listed.
    pub fn list_sheets<P, I>(&self, files: I) -> SheetListing
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = P>,
    {
        let mut seen = HashSet::new();
        let mut listing = SheetListing::default();
        for file in files {
            let file = normalize_path(file.as_ref());
            if !seen.insert(file.clone()) {
                continue;
            }
            let sheets = match self.reader.list_sheet_names(&file) {
                Ok(names) => {
                    log::debug!("{}: {} sheets", file.display(), names.len());
                    Ok(names)
                }
                Err(e) => {
                    let err = MergeError::read(&file, e);
                    log::warn!("{}", err);
                    Err(err)
                }
            };
            listing.files.push(FileSheets { file, sheets });
        }
        listing
    }
}

/// Expand directories recursively and keep workbook files, normalized, de-duplicated and sorted.
pub fn discover_workbook_files<P, I>(paths: I) -> Vec<PathBuf>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = P>,
{
    let mut files = BTreeSet::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            for entry in walkdir::WalkDir::new(path).follow_links(true).into_iter() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() && is_workbook_file(entry.path()) => {
                        files.insert(normalize_path(entry.path()));
                    }
                    Ok(_) => (),
                    Err(e) => log::warn!("skipping unreadable entry under {}: {}", path.display(), e),
                }
            }
        } else if path.is_file() && is_workbook_file(path) {
            files.insert(normalize_path(path));
        } else {
            log::debug!("not a workbook: {}", path.display());
        }
    }
    files.into_iter().collect()
}

fn is_workbook_file(path: &Path) -> bool {
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    // lock files Excel leaves next to open workbooks
    if file_name.starts_with("~$") {
        return false;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => WORKBOOK_EXTENSIONS.iter().any(|w| w.eq_ignore_ascii_case(ext)),
        None => false,
    }
}
