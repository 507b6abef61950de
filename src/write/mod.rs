use std::{collections::HashMap, path::Path};
use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::{read::SheetData, CellValue, ColNum, RowNum};

pub use rust_xlsxwriter::IntoExcelData;

impl IntoExcelData for CellValue {
    fn write(
        self,
        worksheet: &mut Worksheet,
        row: RowNum,
        col: ColNum,
    ) -> Result<&mut Worksheet, XlsxError> {
        match self {
            CellValue::Blank => Ok(worksheet),
            CellValue::Bool(v) => worksheet.write_boolean(row, col, v),
            CellValue::Number(v) => worksheet.write_number(row, col, v),
            CellValue::Date(v) => worksheet.write_number_with_format(row, col, v, &FMT_DEFAULT_DATE),
            CellValue::Time(v) => worksheet.write_number_with_format(row, col, v, &FMT_DEFAULT_TIME),
            CellValue::Datetime(v) => worksheet.write_number_with_format(row, col, v, &FMT_DEFAULT_DATETIME),
            // error literals keep their text
            CellValue::String(v) | CellValue::Error(v) => worksheet.write_string(row, col, v),
        }
    }

    fn write_with_format<'a>(
        self,
        worksheet: &'a mut Worksheet,
        row: RowNum,
        col: ColNum,
        format: &Format,
    ) -> Result<&'a mut Worksheet, XlsxError> {
        match self {
            CellValue::Blank => worksheet.write_blank(row, col, format),
            CellValue::Bool(v) => worksheet.write_boolean_with_format(row, col, v, format),
            CellValue::Number(v) | CellValue::Date(v) | CellValue::Time(v) | CellValue::Datetime(v) => {
                worksheet.write_number_with_format(row, col, v, format)
            },
            CellValue::String(v) | CellValue::Error(v) => worksheet.write_string_with_format(row, col, v, format),
        }
    }
}

struct Sheet {
    sheet: Worksheet,
    nextrow: RowNum,
    width: usize,
}

impl Sheet {
    fn new(name: &str) -> Result<Self> {
        let mut sheet = Worksheet::new();
        sheet.set_name(name)?;
        Ok(Sheet { sheet, nextrow: 0, width: 0 })
    }
    /// rows go below the ones already written, blanks are left out
    fn write_rows(&mut self, rows: &[Vec<CellValue>]) -> Result<()> {
        for row in rows {
            for (icol, val) in row.iter().enumerate() {
                if !val.is_blank() {
                    self.sheet.write(self.nextrow, col_index(icol)?, val.clone())?;
                }
            }
            self.width = self.width.max(row.len());
            self.nextrow += 1;
        }
        Ok(())
    }
    /// merged ranges and column widths of a copied sheet
    fn apply_layout(&mut self, data: &SheetData) -> Result<()> {
        for &(first, last, width) in data.column_widths.iter() {
            for col in first.max(1)..=last {
                self.sheet.set_column_width(col - 1, width)?;
            }
        }
        let empty_format = Format::new();
        for &((top, left), (bottom, right)) in data.merged_ranges.iter() {
            if top == 0 || left == 0 || (top == bottom && left == right) {
                continue;
            }
            self.sheet.merge_range(top - 1, left - 1, bottom - 1, right - 1, "", &empty_format)?;
            // the value of a merged area lives in its top-left cell
            let first = data.rows.get(top as usize - 1).and_then(|r| r.get(left as usize - 1));
            if let Some(val) = first.filter(|v| !v.is_blank()) {
                self.sheet.write(top - 1, left - 1, val.clone())?;
            }
        }
        Ok(())
    }
    fn close_sheet(self) -> Worksheet {
        self.sheet
    }
}

fn col_index(icol: usize) -> Result<ColNum> {
    ColNum::try_from(icol).map_err(|_| anyhow!("column {} out of range", icol + 1))
}

/// OOXML workbook writer; sheets keep the order they were added in.
pub struct XlsxWriter {
    names: Vec<String>,
    sheets: HashMap<String, Sheet>,
    opened: bool,
}

impl Default for XlsxWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XlsxWriter {
    pub fn new() -> Self {
        Self {
            names: vec![],
            sheets: HashMap::new(),
            opened: true,
        }
    }
    /// check whether the sheet exists
    pub fn has_sheet(&self, shname: &str) -> bool {
        self.names.iter().any(|n| n == shname)
    }
    fn sheet_mut(&mut self, name: &str) -> Result<&mut Sheet> {
        if !self.opened {
            return Err(anyhow!("cannot write saved workbook"));
        }
        if !self.sheets.contains_key(name) {
            self.sheets.insert(name.to_owned(), Sheet::new(name)?);
            self.names.push(name.to_owned());
        };
        self.sheets.get_mut(name).ok_or(anyhow!("sheet-{} not exist", name))
    }
    /// a whole sheet: values, merged ranges, column widths
    pub fn add_sheet(&mut self, name: &str, data: &SheetData) -> Result<()> {
        if self.has_sheet(name) {
            return Err(anyhow!("sheet-{} already exists", name));
        }
        let sht = self.sheet_mut(name)?;
        sht.write_rows(&data.rows)?;
        sht.apply_layout(data)?;
        Ok(())
    }
    /// appends below the rows already in the sheet, creating it on first use
    pub fn append_rows(&mut self, name: &str, rows: &[Vec<CellValue>]) -> Result<()> {
        self.sheet_mut(name)?.write_rows(rows)
    }
    /// number of rows written to a sheet so far
    pub fn next_row(&self, name: &str) -> Option<RowNum> {
        self.sheets.get(name).map(|s| s.nextrow)
    }
    /// save as file
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if !self.opened {
            return Err(anyhow!("workbook already saved"));
        }
        if self.names.is_empty() {
            return Err(anyhow!("a workbook needs at least one sheet"));
        }
        let mut book = Workbook::new();
        for name in self.names.iter() {
            let sht = self.sheets.remove(name).ok_or(anyhow!("sheet-{} not exist", name))?;
            log::debug!("writing sheet {} ({} rows, {} columns)", name, sht.nextrow, sht.width);
            book.push_worksheet(sht.close_sheet());
        };
        book.save(path.as_ref())?;
        self.opened = false;
        Ok(())
    }
}

/// write named sheets to an `.xlsx` container in one go
pub fn save_sheets<'a, I>(sheets: I, path: &Path) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a SheetData)>,
{
    let mut writer = XlsxWriter::new();
    for (name, data) in sheets {
        writer.add_sheet(name, data)?;
    }
    writer.save_as(path)
}

lazy_static! {
    static ref FMT_DEFAULT_DATE: Format = Format::new().set_num_format_index(14);
    static ref FMT_DEFAULT_TIME: Format = Format::new().set_num_format_index(21);
    static ref FMT_DEFAULT_DATETIME: Format = Format::new().set_num_format_index(22);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::XlsxBook;

    #[test]
    fn appended_rows_follow_the_cursor() {
        let mut writer = XlsxWriter::new();
        writer.append_rows("MergedData", &[vec!["h1".into(), "h2".into()], vec![1.0.into()]]).unwrap();
        writer.append_rows("MergedData", &[vec![3.0.into(), 4.0.into(), 5.0.into()]]).unwrap();
        assert_eq!(writer.next_row("MergedData"), Some(3));
        assert!(writer.has_sheet("MergedData"));
    }

    #[test]
    fn written_sheet_reads_back_with_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let data = SheetData {
            rows: vec![
                vec!["Title".into()],
                vec!["a".into(), 2.0.into(), CellValue::Date(45292.0), true.into()],
            ],
            merged_ranges: vec![((1, 1), (1, 3))],
            column_widths: vec![(1, 1, 20.0)],
        };
        save_sheets([("Report", &data)], &path).unwrap();

        let mut book = XlsxBook::new(&path, true).unwrap();
        assert_eq!(book.sheet_names(), &vec!["Report".to_string()]);
        let back = book.read_sheet("Report").unwrap();
        assert_eq!(back.rows, data.rows);
        assert_eq!(back.merged_ranges, data.merged_ranges);
        assert!(back.column_width(1).is_some());
    }

    #[test]
    fn saving_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = XlsxWriter::new();
        writer.append_rows("S", &[vec![1.0.into()]]).unwrap();
        writer.save_as(dir.path().join("a.xlsx")).unwrap();
        assert!(writer.save_as(dir.path().join("b.xlsx")).is_err());
        assert!(XlsxWriter::new().save_as(dir.path().join("c.xlsx")).is_err());
    }
}
