use std::path::Path;
use anyhow::{anyhow, Result};
use calamine::{open_workbook_auto, Data, Reader};

use crate::CellValue;

/// sheet names in workbook order
pub fn list_sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path).map_err(|e| anyhow!("cannot open workbook: {}", e))?;
    Ok(workbook.sheet_names().to_vec())
}

/// row-major values, re-anchored at row 1 / column A
pub fn read_rows(path: &Path, sheet_name: &str) -> Result<Vec<Vec<CellValue>>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| anyhow!("cannot open workbook: {}", e))?;
    if !workbook.sheet_names().iter().any(|n| n == sheet_name) {
        return Err(anyhow!("{} sheet not found!", sheet_name));
    }
    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| anyhow!("failed to read sheet '{}': {}", sheet_name, e))?;

    // calamine trims leading empty rows and columns
    let (top, left) = match range.start() {
        Some(start) => start,
        None => return Ok(Vec::new()),
    };
    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); top as usize];
    for row in range.rows() {
        let mut line = vec![CellValue::Blank; left as usize];
        line.extend(row.iter().map(convert_cell_value));
        while matches!(line.last(), Some(CellValue::Blank)) {
            line.pop();
        }
        rows.push(line);
    }
    while matches!(rows.last(), Some(r) if r.is_empty()) {
        rows.pop();
    }
    Ok(rows)
}

fn convert_cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Blank,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            if serial < 1.0 {
                CellValue::Time(serial)
            } else if serial.fract() == 0.0 {
                CellValue::Date(serial)
            } else {
                CellValue::Datetime(serial)
            }
        }
        Data::DateTimeIso(s) => CellValue::String(s.clone()),
        Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}
