//! Merge selected sheets of many Excel workbooks, in a user-chosen order, into one workbook and export the result as fixed-layout PDF documents. Two merge modes are supported: structural copy (every source sheet becomes its own destination sheet, layout preserved) and concatenation (raw values flattened into one continuous sheet). Export can produce one combined document, one document per sheet, or one document per source file.
//!
//! The entry point is [`orchestrator::MergeOrchestrator`]; file and sheet selection happen before it, through [`catalog::SheetCatalog`] and [`model::MergeRequest`].
use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate, NaiveTime};
use lazy_static::lazy_static;

/// spreadsheet-application collaborator and its native implementation
pub mod app;
/// sheet listing and workbook discovery
pub mod catalog;
/// error taxonomy
pub mod error;
/// export planning and execution
pub mod export;
/// structural and concatenation mergers
pub mod merge;
/// request and workbook model
pub mod model;
/// sheet identifiers and output file names
pub mod naming;
/// top-level coordinator
pub mod orchestrator;
/// Excel file reader
pub mod read;
/// build, export and request reports
pub mod report;
/// Excel file writer
pub mod write;

pub use error::MergeError;
pub use model::{AssembledWorkbook, ExportGrouping, ExportJob, MergeMode, MergeRequest, SheetReference};
pub use orchestrator::MergeOrchestrator;
pub use report::{MergeSummary, RequestStatus};

/// reexport chrono
pub use chrono;

/// row number
pub type RowNum = u32;
/// column number
pub type ColNum = u16;
/// merged range, ((top, left), (bottom, right)), 1-based and inclusive
pub type MergedRange = ((RowNum, ColNum), (RowNum, ColNum));

/// max sheet name length accepted by Excel
pub const MAX_SHEET_NAME_LEN: usize = 31;
/// characters never allowed in sheet identifiers or output file names
pub const RESERVED_NAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
/// characters Excel additionally rejects in sheet names
pub const EXCEL_ILLEGAL_SHEET_CHARS: [char; 2] = ['[', ']'];

/// Convert character based Excel cell column addresses to number. If you pass parameter D to this function, you will get 4
pub fn get_num_from_ord(addr: &[u8]) -> Result<ColNum> {
    let mut col: u32 = 0;
    for ch in addr.to_ascii_uppercase() {
        if ch.is_ascii_uppercase() {
            col = col.saturating_mul(26).saturating_add((ch - b'@') as u32);
        } else if !ch.is_ascii_digit() {
            return Err(anyhow!("invalid column address: {:?}", String::from_utf8_lossy(addr)));
        }
    }
    ColNum::try_from(col).map_err(|_| anyhow!("column out of range: {:?}", String::from_utf8_lossy(addr)))
}

/// Convert number based Excel cell column addresses to character. If you pass parameter 4 to this function, you will get D
pub fn get_ord_from_num(num: ColNum) -> Result<String> {
    if num == 0 {
        return Err(anyhow!("column number starts from 1"));
    }
    let mut col = num as u32;
    let mut addr = Vec::with_capacity(3);
    while col > 0 {
        let rem = (col - 1) % 26;
        addr.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    addr.reverse();
    Ok(String::from_iter(addr))
}

/// Convert character based Excel cell addresses to numbers. If you pass parameter D2 to this function, you will get (2, 4)
pub fn get_tuple_from_ord(addr: &[u8]) -> Result<(RowNum, ColNum)> {
    let split = addr.iter().position(|c| c.is_ascii_digit()).ok_or(anyhow!("invalid cell address: {:?}", String::from_utf8_lossy(addr)))?;
    if split == 0 {
        return Err(anyhow!("invalid cell address: {:?}", String::from_utf8_lossy(addr)));
    }
    let col = get_num_from_ord(&addr[..split])?;
    let row = std::str::from_utf8(&addr[split..])?.parse::<RowNum>()?;
    Ok((row, col))
}

/// Convert numbers based Excel cell addresses to characters. If you pass parameter (2, 4) to this function, you will get D2.
pub fn get_ord_from_tuple(row: RowNum, col: ColNum) -> Result<String> {
    Ok(format!("{}{}", get_ord_from_num(col)?, row))
}

/// Cell Value Type
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Bool(bool),
    Number(f64),
    Date(f64),
    Time(f64),
    Datetime(f64),
    String(String),
    Error(String),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    /// numbers and date/time serials, printed right-aligned
    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Number(_) | CellValue::Date(_) | CellValue::Time(_) | CellValue::Datetime(_))
    }

    /// text shown for the cell when printed
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Blank => String::new(),
            CellValue::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            CellValue::Number(n) => format_number(*n),
            CellValue::Date(n) => match serial_to_date(*n) {
                Some(d) => d.format("%Y-%m-%d").to_string(),
                None => format_number(*n),
            },
            CellValue::Time(n) => serial_to_time(*n).format("%H:%M:%S").to_string(),
            CellValue::Datetime(n) => match serial_to_date(*n) {
                Some(d) => format!("{} {}", d.format("%Y-%m-%d"), serial_to_time(*n).format("%H:%M:%S")),
                None => format_number(*n),
            },
            CellValue::String(s) => s.clone(),
            CellValue::Error(s) => s.clone(),
        }
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::String(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::String(v.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Number(v as f64)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn serial_to_date(n: f64) -> Option<NaiveDate> {
    BASE_DATE.checked_add_signed(Duration::try_days(n.trunc() as i64)?)
}

fn serial_to_time(n: f64) -> NaiveTime {
    let secs = ((n - n.trunc()).abs() * 86400.0).round().min(86399.0) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).unwrap_or_default()
}

lazy_static! {
    static ref BASE_DATE: NaiveDate = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
}
