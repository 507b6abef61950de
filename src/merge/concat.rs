use crate::error::MergeError;
use crate::merge::BuildOutcome;
use crate::model::{AssembledWorkbook, SheetReference};
use crate::read::SheetReader;
use crate::report::BuildReport;
use crate::CellValue;

/// Flattens the values of every referenced sheet into one sheet.
///
/// The first reference with rows is written whole, its first row being the header. Later references lose
/// their first row when they are flagged as having a header (the default). Rows keep their own width.
pub struct ConcatMerger<'a, R: SheetReader + ?Sized> {
    reader: &'a R,
}

impl<'a, R: SheetReader + ?Sized> ConcatMerger<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    pub fn merge(&self, references: &[SheetReference]) -> BuildOutcome {
        let mut report = BuildReport::new(references.len());
        let mut merged: Vec<Vec<CellValue>> = Vec::new();
        let mut header_written = false;
        let mut width = 0usize;

        for reference in references {
            let rows = match self.reader.read_rows(&reference.source_path, &reference.sheet_name) {
                Ok(rows) => rows,
                Err(e) => {
                    report.add_skipped(reference, MergeError::read(&reference.source_path, e));
                    continue;
                }
            };
            report.add_merged();

            if rows.is_empty() {
                log::debug!("{} has no data", reference);
                continue;
            }
            let skip = if header_written && reference.has_header { 1 } else { 0 };
            header_written = true;

            let body = &rows[skip.min(rows.len())..];
            let ref_width = body.iter().map(|r| r.len()).max().unwrap_or(0);
            if width > 0 && ref_width > 0 && ref_width != width {
                report.add_warning(format!(
                    "ConcatShapeMismatch: {} has {} columns, merged sheet had {}",
                    reference, ref_width, width
                ));
            }
            width = width.max(ref_width);
            log::debug!("{}: {} rows appended at row {}", reference, body.len(), merged.len() + 1);
            merged.extend(body.iter().cloned());
        }

        BuildOutcome { workbook: AssembledWorkbook::concatenated(merged), report }
    }
}
