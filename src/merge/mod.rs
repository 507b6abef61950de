//! The two ways of assembling references into one workbook.

mod concat;
mod structural;

pub use concat::ConcatMerger;
pub use structural::StructuralMerger;

use crate::model::AssembledWorkbook;
use crate::report::BuildReport;

/// Workbook built from a request, with what was skipped on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub workbook: AssembledWorkbook,
    pub report: BuildReport,
}
