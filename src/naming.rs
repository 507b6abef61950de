//! Sheet identifiers and output file names.
//!
//! Destination sheet identifiers are composed as `<source stem>_<sheet name>`, stripped of characters Excel
//! rejects and cut to 31 characters. Truncation can make two identifiers equal, so every identifier goes
//! through a [`SheetIdentifierAllocator`] which appends `_2`, `_3`, ... until it is unique. Sheet names
//! compare case-insensitively, so does the allocator.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::model::file_stem;
use crate::{EXCEL_ILLEGAL_SHEET_CHARS, MAX_SHEET_NAME_LEN, RESERVED_NAME_CHARS};

/// Identifier of the copy of `sheet_name` taken from `source`; always the same for the same pair.
pub fn compose_sheet_identifier(source: &Path, sheet_name: &str) -> String {
    sanitize_sheet_identifier(&format!("{}_{}", file_stem(source), sheet_name))
}

/// Strip invalid chars and cut to a valid Excel sheet name.
pub fn sanitize_sheet_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !RESERVED_NAME_CHARS.contains(c) && !EXCEL_ILLEGAL_SHEET_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').trim();
    if cleaned.is_empty() {
        return "Sheet".to_string();
    }
    fit_sheet_name(cleaned, MAX_SHEET_NAME_LEN)
}

/// Output file stem: reserved characters removed, never empty.
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !RESERVED_NAME_CHARS.contains(c) && !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "sheet".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Group key recovered from the `<stem>_<sheet>` convention: everything before the first `_`.
///
/// Only meaningful for identifiers built by [`compose_sheet_identifier`] from stems without underscores;
/// a stem like `Q1_report` is split too early.
pub fn fallback_group_key(identifier: &str) -> &str {
    match identifier.split_once('_') {
        Some((prefix, _)) if !prefix.is_empty() => prefix,
        _ => identifier,
    }
}

/// first `max` chars, never ending in an apostrophe
fn fit_sheet_name(name: &str, max: usize) -> String {
    let cut: String = name.chars().take(max).collect();
    cut.trim_end_matches('\'').to_string()
}

/// Hands out sheet names that are unique within one workbook.
#[derive(Debug, Default, Clone)]
pub struct SheetIdentifierAllocator {
    taken: HashSet<String>,
}

impl SheetIdentifierAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names already present in the destination.
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_lowercase());
    }

    /// Give a name back, after its sheet was removed.
    pub fn release(&mut self, name: &str) {
        self.taken.remove(&name.to_lowercase());
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(&name.to_lowercase())
    }

    /// `base` itself when free, else `base` cut short enough to carry a `_n` suffix.
    pub fn allocate(&mut self, base: &str) -> String {
        if !self.is_taken(base) {
            self.reserve(base);
            return base.to_string();
        }
        let mut n_idx = 2usize;
        loop {
            let suffix = format!("_{n_idx}");
            let stem = fit_sheet_name(base, usize::max(1, MAX_SHEET_NAME_LEN.saturating_sub(suffix.len())));
            let candidate = format!("{stem}{suffix}");
            if !self.is_taken(&candidate) {
                self.reserve(&candidate);
                return candidate;
            }
            n_idx += 1;
        }
    }
}

/// Hands out `.pdf` paths that are unique within one export plan.
#[derive(Debug, Clone)]
pub struct OutputPathAllocator {
    dir: PathBuf,
    taken: HashSet<String>,
}

impl OutputPathAllocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), taken: HashSet::new() }
    }

    /// `<dir>/<stem>.pdf`, or `<dir>/<stem>_2.pdf` ... if an earlier job already took that name.
    pub fn allocate(&mut self, stem: &str) -> PathBuf {
        let stem = sanitize_file_stem(stem);
        let mut file_name = format!("{stem}.pdf");
        let mut n_idx = 2usize;
        while self.taken.contains(&file_name.to_lowercase()) {
            file_name = format!("{stem}_{n_idx}.pdf");
            n_idx += 1;
        }
        self.taken.insert(file_name.to_lowercase());
        self.dir.join(file_name)
    }
}
