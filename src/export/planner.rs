use std::path::{Path, PathBuf};

use crate::model::{file_stem, AssembledWorkbook, ExportGrouping, ExportJob, MergeMode};
use crate::naming::{fallback_group_key, OutputPathAllocator};

/// File stem of the single combined document.
pub const MERGED_DOCUMENT_STEM: &str = "merged";

#[derive(Debug, PartialEq, Eq)]
enum GroupKey {
    Origin(PathBuf),
    /// recovered from the `<stem>_<sheet>` naming convention
    Convention(String),
}

impl GroupKey {
    fn stem(&self) -> String {
        match self {
            GroupKey::Origin(path) => file_stem(path),
            GroupKey::Convention(prefix) => prefix.clone(),
        }
    }
}

/// Turns an assembled workbook and a grouping into export jobs.
pub struct ExportPlanner;

impl ExportPlanner {
    /// Jobs in workbook order; every job has at least one sheet and its own destination.
    pub fn plan(workbook: &AssembledWorkbook, grouping: ExportGrouping, output_dir: &Path) -> Vec<ExportJob> {
        if workbook.is_empty() {
            return Vec::new();
        }
        let mut paths = OutputPathAllocator::new(output_dir);
        match grouping {
            ExportGrouping::OneMerged => Self::merged(workbook, &mut paths),
            ExportGrouping::PerSheet => workbook
                .sheets()
                .iter()
                .map(|sheet| ExportJob {
                    destination: paths.allocate(&sheet.identifier),
                    sheet_identifiers: vec![sheet.identifier.clone()],
                })
                .collect(),
            // a concatenated workbook has one sheet and no single origin
            ExportGrouping::PerSourceFile if workbook.mode() == MergeMode::Concat => Self::merged(workbook, &mut paths),
            ExportGrouping::PerSourceFile => {
                let mut groups: Vec<(GroupKey, Vec<String>)> = Vec::new();
                for sheet in workbook.sheets() {
                    let key = match &sheet.origin {
                        Some(origin) => GroupKey::Origin(origin.clone()),
                        None => GroupKey::Convention(fallback_group_key(&sheet.identifier).to_string()),
                    };
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, ids)) => ids.push(sheet.identifier.clone()),
                        None => groups.push((key, vec![sheet.identifier.clone()])),
                    }
                }
                groups
                    .into_iter()
                    .map(|(key, sheet_identifiers)| ExportJob { destination: paths.allocate(&key.stem()), sheet_identifiers })
                    .collect()
            }
        }
    }

    fn merged(workbook: &AssembledWorkbook, paths: &mut OutputPathAllocator) -> Vec<ExportJob> {
        vec![ExportJob { destination: paths.allocate(MERGED_DOCUMENT_STEM), sheet_identifiers: workbook.identifiers() }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{SheetHandle, WorkbookHandle};
    use crate::model::{DestinationSheet, SheetContent};

    fn structural(sheets: &[(&str, Option<&str>)]) -> AssembledWorkbook {
        let wb = WorkbookHandle(1);
        let sheets = sheets
            .iter()
            .enumerate()
            .map(|(i, (id, origin))| DestinationSheet {
                identifier: id.to_string(),
                origin: origin.map(PathBuf::from),
                content: SheetContent::Structural(SheetHandle::new(wb, i as u32)),
            })
            .collect();
        AssembledWorkbook::structural(wb, sheets)
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_merged_holds_all_sheets_in_order() {
        let wb = structural(&[("A_Sales", Some("/d/A.xlsx")), ("B_Sales", Some("/d/B.xlsx"))]);
        let jobs = ExportPlanner::plan(&wb, ExportGrouping::OneMerged, Path::new("/out"));
        assert_eq!(jobs, vec![ExportJob { destination: PathBuf::from("/out/merged.pdf"), sheet_identifiers: ids(&["A_Sales", "B_Sales"]) }]);
    }

    #[test]
    fn per_sheet_has_one_job_per_sheet() {
        let wb = structural(&[("A_Sales", Some("/d/A.xlsx")), ("A_Cost", Some("/d/A.xlsx")), ("B_Sales", Some("/d/B.xlsx"))]);
        let jobs = ExportPlanner::plan(&wb, ExportGrouping::PerSheet, Path::new("/out"));
        assert_eq!(jobs.len(), wb.len());
        assert_eq!(jobs[1].destination, PathBuf::from("/out/A_Cost.pdf"));
        assert_eq!(jobs[1].sheet_identifiers, ids(&["A_Cost"]));
    }

    #[test]
    fn per_source_file_groups_by_origin() {
        let wb = structural(&[("A_Sales", Some("/d/A.xlsx")), ("A_Cost", Some("/d/A.xlsx")), ("B_Sales", Some("/d/B.xlsx"))]);
        let jobs = ExportPlanner::plan(&wb, ExportGrouping::PerSourceFile, Path::new("/out"));
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0], ExportJob { destination: PathBuf::from("/out/A.pdf"), sheet_identifiers: ids(&["A_Sales", "A_Cost"]) });
        assert_eq!(jobs[1], ExportJob { destination: PathBuf::from("/out/B.pdf"), sheet_identifiers: ids(&["B_Sales"]) });
    }

    #[test]
    fn same_stem_in_two_folders_gets_two_documents() {
        let wb = structural(&[("A_Sales", Some("/d/A.xlsx")), ("A_Sales_2", Some("/e/A.xlsx"))]);
        let jobs = ExportPlanner::plan(&wb, ExportGrouping::PerSourceFile, Path::new("/out"));
        assert_eq!(jobs[0].destination, PathBuf::from("/out/A.pdf"));
        assert_eq!(jobs[1].destination, PathBuf::from("/out/A_2.pdf"));
    }

    #[test]
    fn missing_origin_falls_back_to_name_prefix() {
        let wb = structural(&[("A_Sales", None), ("A_Cost", None), ("B_Sales", None)]);
        let jobs = ExportPlanner::plan(&wb, ExportGrouping::PerSourceFile, Path::new("/out"));
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].destination, PathBuf::from("/out/A.pdf"));
        assert_eq!(jobs[0].sheet_identifiers, ids(&["A_Sales", "A_Cost"]));
    }

    #[test]
    fn concatenated_workbook_naming() {
        let wb = AssembledWorkbook::concatenated(vec![vec!["h".into()]]);
        let out = Path::new("/out");
        assert_eq!(ExportPlanner::plan(&wb, ExportGrouping::PerSheet, out)[0].destination, PathBuf::from("/out/MergedData.pdf"));
        assert_eq!(ExportPlanner::plan(&wb, ExportGrouping::PerSourceFile, out)[0].destination, PathBuf::from("/out/merged.pdf"));
        assert_eq!(ExportPlanner::plan(&wb, ExportGrouping::OneMerged, out)[0].sheet_identifiers, ids(&["MergedData"]));
    }

    #[test]
    fn empty_workbook_has_no_jobs() {
        let wb = structural(&[]);
        assert!(ExportPlanner::plan(&wb, ExportGrouping::OneMerged, Path::new("/out")).is_empty());
    }
}
