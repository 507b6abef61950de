use crate::app::{SheetHandle, StructuralCopier};
use crate::error::{MergeError, Result};
use crate::merge::BuildOutcome;
use crate::model::{AssembledWorkbook, DestinationSheet, SheetContent, SheetReference};
use crate::naming::{compose_sheet_identifier, SheetIdentifierAllocator};
use crate::report::BuildReport;

/// Copies every referenced sheet, layout included, into one new workbook of the application.
pub struct StructuralMerger<'a, C: StructuralCopier + ?Sized> {
    copier: &'a mut C,
}

impl<'a, C: StructuralCopier + ?Sized> StructuralMerger<'a, C> {
    pub fn new(copier: &'a mut C) -> Self {
        Self { copier }
    }

    /// A reference whose file or sheet cannot be read is skipped; any other copier failure aborts the build.
    pub fn merge(&mut self, references: &[SheetReference]) -> Result<BuildOutcome> {
        let mut report = BuildReport::new(references.len());
        let workbook = self.copier.new_workbook()?;

        // the new workbook comes with a placeholder sheet
        let initial = self.copier.sheets(workbook)?;
        let mut allocator = SheetIdentifierAllocator::new();
        for sheet in initial.iter() {
            allocator.reserve(&self.copier.sheet_name(*sheet)?);
        }

        let mut sheets = Vec::with_capacity(references.len());
        for reference in references {
            let copied = match self.copier.copy_sheet(&reference.source_path, &reference.sheet_name, workbook) {
                Ok(handle) => handle,
                Err(e @ MergeError::Read { .. }) => {
                    report.add_skipped(reference, e);
                    continue;
                }
                Err(e) => {
                    log::error!("copy of {} rejected: {}", reference, e);
                    return Err(e);
                }
            };

            let composed = compose_sheet_identifier(&reference.source_path, &reference.sheet_name);
            let identifier = allocator.allocate(&composed);
            if identifier != composed {
                report.add_warning(format!("sheet name {composed} already used, {reference} becomes {identifier}"));
            }
            if let Err(e) = self.copier.rename_sheet(copied, &identifier) {
                // keep one destination sheet per merged reference
                allocator.release(&identifier);
                self.copier.delete_sheet(copied)?;
                report.add_skipped(reference, e);
                continue;
            }
            log::debug!("{} copied as {}", reference, identifier);
            sheets.push(DestinationSheet {
                identifier,
                origin: Some(reference.source_path.clone()),
                content: SheetContent::Structural(copied),
            });
            report.add_merged();
        }

        if !sheets.is_empty() {
            self.remove_placeholders(&initial)?;
        }
        Ok(BuildOutcome { workbook: AssembledWorkbook::structural(workbook, sheets), report })
    }

    /// Placeholders still there and still empty are deleted.
    fn remove_placeholders(&mut self, initial: &[SheetHandle]) -> Result<()> {
        for placeholder in initial {
            let workbook = placeholder.workbook;
            if !self.copier.sheets(workbook)?.contains(placeholder) {
                continue;
            }
            if self.copier.is_sheet_empty(*placeholder)? {
                self.copier.delete_sheet(*placeholder)?;
            }
        }
        Ok(())
    }
}
