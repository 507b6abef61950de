use std::{collections::HashMap, fs::File, io::BufReader, path::Path};
use anyhow::{anyhow, Context, Result};
use zip::ZipArchive;
use quick_xml::{events::{BytesStart, Event}, reader::Reader};

use lazy_static::lazy_static;
use crate::{get_tuple_from_ord, CellValue, ColNum, MergedRange, RowNum};

/// xls / xlsb / ods reader
#[cfg(feature = "legacy")]
pub mod legacy;

// ooxml： http://www.officeopenxml.com/

macro_rules! get_attr_val {
    ($e:expr, $tag:expr) => {
        match $e.try_get_attribute($tag)? {
            Some(v) => {v.unescape_value()?},
            None => return Err(anyhow!("attribute {} not exist", $tag))
        }
    };
    ($e:expr, $tag:expr, parse) => {
        match $e.try_get_attribute($tag)? {
            Some(v) => {v.unescape_value()?.parse()?},
            None => return Err(anyhow!("attribute {} not exist", $tag))
        }
    };
    ($e:expr, $tag:expr, to_string) => {
        match $e.try_get_attribute($tag)? {
            Some(v) => {v.unescape_value()?.to_string()},
            None => return Err(anyhow!("attribute {} not exist", $tag))
        }
    };
}

/// optional attribute, parsed
macro_rules! get_attr_opt {
    ($e:expr, $tag:expr) => {
        match $e.try_get_attribute($tag)? {
            Some(v) => Some(v.unescape_value()?.parse()?),
            None => None
        }
    };
}

/// Reading side of the spreadsheet collaborator.
pub trait SheetReader {
    /// sheet names in workbook order
    fn list_sheet_names(&self, path: &Path) -> Result<Vec<String>>;
    /// row-major cell values, starting at row 1 / column A
    fn read_rows(&self, path: &Path, sheet_name: &str) -> Result<Vec<Vec<CellValue>>>;
}

impl<R: SheetReader + ?Sized> SheetReader for &R {
    fn list_sheet_names(&self, path: &Path) -> Result<Vec<String>> {
        (**self).list_sheet_names(path)
    }

    fn read_rows(&self, path: &Path, sheet_name: &str) -> Result<Vec<Vec<CellValue>>> {
        (**self).read_rows(path, sheet_name)
    }
}

/// Container families a source file can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// xlsx, xlsm
    OpenXml,
    /// xls, xlsb, ods
    Legacy,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<SourceKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" => Some(SourceKind::OpenXml),
            "xls" | "xlsb" | "ods" => Some(SourceKind::Legacy),
            _ => None,
        }
    }
}

/// Picks the reader appropriate to the container format of each file.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoReader;

impl AutoReader {
    /// cell values plus the layout the structural copier keeps (merged ranges, column widths)
    pub fn read_sheet(&self, path: &Path, sheet_name: &str) -> Result<SheetData> {
        match SourceKind::from_path(path) {
            Some(SourceKind::OpenXml) => XlsxBook::new(path, true)?.read_sheet(sheet_name),
            Some(SourceKind::Legacy) => read_legacy_sheet(path, sheet_name),
            None => Err(anyhow!("unsupported container: {}", path.display())),
        }
    }
}

impl SheetReader for AutoReader {
    fn list_sheet_names(&self, path: &Path) -> Result<Vec<String>> {
        match SourceKind::from_path(path) {
            Some(SourceKind::OpenXml) => Ok(XlsxBook::new(path, false)?.sheet_names().clone()),
            Some(SourceKind::Legacy) => list_legacy_sheet_names(path),
            None => Err(anyhow!("unsupported container: {}", path.display())),
        }
    }

    fn read_rows(&self, path: &Path, sheet_name: &str) -> Result<Vec<Vec<CellValue>>> {
        Ok(self.read_sheet(path, sheet_name)?.rows)
    }
}

#[cfg(feature = "legacy")]
fn read_legacy_sheet(path: &Path, sheet_name: &str) -> Result<SheetData> {
    Ok(SheetData { rows: legacy::read_rows(path, sheet_name)?, ..Default::default() })
}

#[cfg(not(feature = "legacy"))]
fn read_legacy_sheet(path: &Path, _sheet_name: &str) -> Result<SheetData> {
    Err(anyhow!("legacy container support is disabled: {}", path.display()))
}

#[cfg(feature = "legacy")]
fn list_legacy_sheet_names(path: &Path) -> Result<Vec<String>> {
    legacy::list_sheet_names(path)
}

#[cfg(not(feature = "legacy"))]
fn list_legacy_sheet_names(path: &Path) -> Result<Vec<String>> {
    Err(anyhow!("legacy container support is disabled: {}", path.display()))
}

/// One sheet read fully into memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetData {
    /// dense from row 1 / column A, trailing blanks of a row not materialized
    pub rows: Vec<Vec<CellValue>>,
    pub merged_ranges: Vec<MergedRange>,
    /// (first column, last column, width in characters), 1-based
    pub column_widths: Vec<(ColNum, ColNum, f64)>,
}

impl SheetData {
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(CellValue::is_blank))
    }

    /// widest row
    pub fn max_columns(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// width of a 1-based column, if set
    pub fn column_width(&self, col: ColNum) -> Option<f64> {
        self.column_widths.iter().find(|(min, max, _)| *min <= col && col <= *max).map(|(_, _, w)| *w)
    }
}

/// xlsx book reader
pub struct XlsxBook {
    ini_share: bool,
    str_share: Vec<String>,
    shts_all: Vec<String>,
    map_style: Vec<u32>,
    map_sheet: HashMap<String, String>,
    zip_archive: ZipArchive<BufReader<File>>,
    datetime_fmts: HashMap<u32, u8>,
}

impl XlsxBook {
    /// load_share: if set to false, shared strings are loaded on the first sheet read. Set it false when only the sheet names are needed.
    pub fn new<T: AsRef<Path>>(path: T, load_share: bool) -> Result<XlsxBook> {
        let mut zip_archive = {
            let file = File::open(path.as_ref()).with_context(|| format!("open {}", path.as_ref().display()))?;
            ZipArchive::new(BufReader::new(file)).context("not an OOXML container")?
        };

        let book_refs = {
            let file = zip_archive.by_name("xl/_rels/workbook.xml.rels")?;
            let mut buf = Vec::new();
            let mut refs = HashMap::new();
            let mut reader = Reader::from_reader(BufReader::new(file));
            loop {
                match reader.read_event_into(&mut buf) {
                    Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                        if e.local_name().as_ref() == b"Relationship" {
                            refs.insert(get_attr_val!(e, "Id", to_string), get_attr_val!(e, "Target", to_string));
                        };
                    },
                    Ok(Event::Eof) => break,
                    Err(e) => return Err(anyhow!("workbook.xml.rels broken: {:?}", e)),
                    _ => ()
                }
                buf.clear();
            };
            refs
        };

        // sheets in workbook order
        let mut shts_all = Vec::<String>::new();
        let map_sheet = {
            let file = zip_archive.by_name("xl/workbook.xml")?;
            let mut reader = Reader::from_reader(BufReader::new(file));
            let mut buf = Vec::new();
            let mut map_sheet: HashMap<String, String> = HashMap::new();
            loop {
                match reader.read_event_into(&mut buf) {
                    Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                        if e.local_name().as_ref() == b"sheet" {
                            let name = get_attr_val!(e, "name", to_string);
                            let rid = get_attr_val!(e, "r:id", to_string);
                            let part = match book_refs.get(&rid) {
                                Some(target) => resolve_part(target),
                                None => return Err(anyhow!("Relationship of sheet-{rid} not found")),
                            };
                            shts_all.push(name.clone());
                            map_sheet.insert(name, part);
                        };
                    },
                    Ok(Event::Eof) => break,
                    Err(e) => return Err(anyhow!("workbook.xml is broken: {:?}", e)),
                    _ => ()
                }
                buf.clear();
            };
            map_sheet
        };

        // cell style index -> number format, plus custom date formats
        let mut datetime_fmts = DATETIME_FMTS.clone();
        let map_style = match zip_archive.by_name("xl/styles.xml") {
            Ok(file) => {
                let mut reader = Reader::from_reader(BufReader::new(file));
                let mut in_xfs = false;
                let mut buf = Vec::new();
                let mut map_style: Vec<u32> = Vec::new();
                loop {
                    match reader.read_event_into(&mut buf) {
                        Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                            match e.local_name().as_ref() {
                                b"cellXfs" => in_xfs = true,
                                b"numFmt" => {
                                    let code = get_attr_val!(e, "formatCode", to_string);
                                    if let Some(kind) = classify_num_fmt(&code) {
                                        datetime_fmts.insert(get_attr_val!(e, "numFmtId", parse), kind);
                                    }
                                },
                                b"xf" if in_xfs => {
                                    map_style.push(get_attr_opt!(e, "numFmtId").unwrap_or(0));
                                },
                                _ => ()
                            }
                        },
                        Ok(Event::End(ref e)) => {
                            if e.local_name().as_ref() == b"cellXfs" {
                                break;
                            };
                        },
                        Ok(Event::Eof) => break,
                        Err(e) => return Err(anyhow!("styles.xml is broken: {:?}", e)),
                        _ => ()
                    }
                    buf.clear();
                };
                map_style
            },
            Err(_) => Vec::new(),
        };

        let mut book = XlsxBook {
            ini_share: false,
            str_share: Vec::new(),
            shts_all,
            map_style,
            map_sheet,
            zip_archive,
            datetime_fmts,
        };
        if load_share {
            book.load_share_strings()?;
        };
        Ok(book)
    }
    /// all sheets, in workbook order
    pub fn sheet_names(&self) -> &Vec<String> {
        &self.shts_all
    }
    /// if set load_share to false, it is called before reading data
    pub fn load_share_strings(&mut self) -> Result<()> {
        if self.ini_share {
            return Ok(());
        };
        let str_share = match self.zip_archive.by_name("xl/sharedStrings.xml") {
            Ok(file) => {
                let mut reader = Reader::from_reader(BufReader::new(file));
                let mut buf = Vec::with_capacity(3069);
                let mut in_t = false;
                let mut in_rph = false;
                let mut shstring = String::new();
                let mut vec_share: Vec<String> = Vec::new();
                loop {
                    match reader.read_event_into(&mut buf) {
                        Ok(Event::Start(ref e)) => {
                            match e.local_name().as_ref() {
                                b"si" => shstring.clear(),
                                b"t" => in_t = !in_rph,
                                b"rPh" => in_rph = true,
                                _ => (),
                            }
                        },
                        Ok(Event::Empty(ref e)) => {
                            if e.local_name().as_ref() == b"si" {
                                vec_share.push(String::new());
                            }
                        },
                        Ok(Event::Text(ref t)) => {
                            if in_t {
                                shstring.push_str(&t.unescape()?);
                            }
                        },
                        Ok(Event::End(ref e)) => {
                            match e.local_name().as_ref() {
                                b"si" => vec_share.push(std::mem::take(&mut shstring)),
                                b"t" => in_t = false,
                                b"rPh" => in_rph = false,
                                _ => (),
                            }
                        },
                        Ok(Event::Eof) => break,
                        Err(e) => return Err(anyhow!("sharedStrings.xml is broken: {:?}", e)),
                        _ => ()
                    }
                    buf.clear();
                };
                vec_share
            },
            Err(_) => Vec::new(),
        };
        self.ini_share = true;
        self.str_share = str_share;
        Ok(())
    }
    /// read the whole sheet: values, merged ranges and column widths
    pub fn read_sheet(&mut self, sht_name: &str) -> Result<SheetData> {
        let part = match self.map_sheet.get(sht_name) {
            Some(part) => part.clone(),
            None => return Err(anyhow!("{} sheet not found!", sht_name)),
        };
        self.load_share_strings()?;

        let decoder = CellDecoder {
            str_share: &self.str_share,
            map_style: &self.map_style,
            datetime_fmts: &self.datetime_fmts,
        };
        let file = self.zip_archive.by_name(&part).map_err(|_| anyhow!("sheet {} - {} lost！", sht_name, part))?;
        let mut reader = Reader::from_reader(BufReader::new(file));
        let mut buf = Vec::with_capacity(8 * 1024);
        let mut data = SheetData::default();

        let mut currow: RowNum = 0;
        let mut curcol: ColNum = 0;
        let mut cell_type: Vec<u8> = Vec::new();
        let mut num_fmt_id: u32 = 0;
        let mut text = String::new();
        let mut in_value = false;
        let mut in_rph = false;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    match e.local_name().as_ref() {
                        b"row" => currow = row_number(e, currow)?,
                        b"c" => {
                            (curcol, cell_type, num_fmt_id) = decoder.cell_header(e, curcol)?;
                            text.clear();
                        },
                        b"v" => in_value = true,
                        b"t" => in_value = !in_rph,
                        b"rPh" => in_rph = true,
                        b"col" => data.column_widths.extend(column_width(e)?),
                        b"mergeCell" => data.merged_ranges.push(merged_range(e)?),
                        _ => (),
                    }
                },
                Ok(Event::Empty(ref e)) => {
                    match e.local_name().as_ref() {
                        b"row" => {
                            currow = row_number(e, currow)?;
                        },
                        b"c" => {
                            curcol = decoder.cell_header(e, curcol)?.0;
                        },
                        b"col" => data.column_widths.extend(column_width(e)?),
                        b"mergeCell" => data.merged_ranges.push(merged_range(e)?),
                        _ => (),
                    }
                },
                Ok(Event::Text(ref t)) => {
                    if in_value {
                        text.push_str(&t.unescape()?);
                    }
                },
                Ok(Event::End(ref e)) => {
                    match e.local_name().as_ref() {
                        b"v" | b"t" => in_value = false,
                        b"rPh" => in_rph = false,
                        b"row" => curcol = 0,
                        b"c" => {
                            let val = decoder.cell_value(&cell_type, num_fmt_id, &text)?;
                            if !val.is_blank() {
                                place_cell(&mut data.rows, currow, curcol, val);
                            }
                        },
                        _ => (),
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(anyhow!("sheet data is broken: {:?}", e)),
                _ => ()
            }
            buf.clear();
        }
        Ok(data)
    }
}

/// decodes `<c>` elements against the book's shared strings and styles
struct CellDecoder<'a> {
    str_share: &'a [String],
    map_style: &'a [u32],
    datetime_fmts: &'a HashMap<u32, u8>,
}

impl CellDecoder<'_> {
    /// (column, type, number format) of a `<c>` element; `r` may be omitted, then the next column is used
    fn cell_header(&self, e: &BytesStart<'_>, prev_col: ColNum) -> Result<(ColNum, Vec<u8>, u32)> {
        let col = match e.try_get_attribute("r")? {
            Some(addr) => get_tuple_from_ord(addr.unescape_value()?.as_bytes())?.1,
            None => prev_col + 1,
        };
        let cell_type = match e.try_get_attribute("t")? {
            Some(attr) => attr.unescape_value()?.as_bytes().to_owned(),
            None => b"n".to_vec(),
        };
        let style: Option<usize> = get_attr_opt!(e, "s");
        let num_fmt_id = style.and_then(|s| self.map_style.get(s).copied()).unwrap_or(0);
        Ok((col, cell_type, num_fmt_id))
    }
    // b for boolean
    // d for date
    // e for error
    // inlineStr for an inline string (i.e., not stored in the shared strings part, but directly in the cell)
    // n for number
    // s for shared string (so stored in the shared strings part and not in the cell)
    // str for a formula (a string representing the formula)
    fn cell_value(&self, cell_type: &[u8], num_fmt_id: u32, text: &str) -> Result<CellValue> {
        if text.is_empty() && cell_type != b"str" && cell_type != b"inlineStr" {
            return Ok(CellValue::Blank);
        }
        let val = match cell_type {
            b"s" => {
                let idx = text.trim().parse::<usize>()?;
                match self.str_share.get(idx) {
                    Some(s) => CellValue::String(s.clone()),
                    None => return Err(anyhow!("shared string {} out of range", idx)),
                }
            },
            b"n" => {
                let n = text.trim().parse::<f64>()?;
                match self.datetime_fmts.get(&num_fmt_id) {
                    Some(&FMT_DATE) => CellValue::Date(n),
                    Some(&FMT_TIME) => CellValue::Time(n),
                    Some(&FMT_DATETIME) => CellValue::Datetime(n),
                    _ => CellValue::Number(n),
                }
            },
            b"b" => CellValue::Bool(text.trim() == "1"),
            b"e" => CellValue::Error(text.to_string()),
            b"str" | b"inlineStr" | b"d" => CellValue::String(text.to_string()),
            _ => CellValue::Blank,
        };
        Ok(val)
    }
}

/// relationship targets are relative to `xl/` unless absolute
fn resolve_part(target: &str) -> String {
    if target.starts_with('/') {
        target.trim_start_matches('/').to_string()
    } else if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{}", target.trim_start_matches("./"))
    }
}

fn row_number(e: &BytesStart<'_>, prev_row: RowNum) -> Result<RowNum> {
    let row: Option<RowNum> = get_attr_opt!(e, "r");
    Ok(row.unwrap_or(prev_row + 1))
}

fn column_width(e: &BytesStart<'_>) -> Result<Option<(ColNum, ColNum, f64)>> {
    let min: ColNum = get_attr_val!(e, "min", parse);
    let max: ColNum = get_attr_val!(e, "max", parse);
    let width: Option<f64> = get_attr_opt!(e, "width");
    Ok(width.map(|w| (min, max, w)))
}

fn merged_range(e: &BytesStart<'_>) -> Result<MergedRange> {
    let attr = get_attr_val!(e, "ref", to_string);
    match attr.split_once(':') {
        Some((left_top, right_end)) => Ok((get_tuple_from_ord(left_top.as_bytes())?, get_tuple_from_ord(right_end.as_bytes())?)),
        None => Err(anyhow!("mergeCell error：{}", attr)),
    }
}

fn place_cell(rows: &mut Vec<Vec<CellValue>>, row: RowNum, col: ColNum, val: CellValue) {
    if row == 0 || col == 0 {
        return;
    }
    let (r, c) = (row as usize - 1, col as usize - 1);
    if rows.len() <= r {
        rows.resize(r + 1, Vec::new());
    }
    let line = &mut rows[r];
    if line.len() <= c {
        line.resize(c + 1, CellValue::Blank);
    }
    line[c] = val;
}

/// custom number formats that display dates or times
fn classify_num_fmt(code: &str) -> Option<u8> {
    // quoted literals and colors never decide the type
    let mut plain = String::with_capacity(code.len());
    let mut quoted = false;
    let mut bracket = false;
    for ch in code.chars() {
        match ch {
            '"' => quoted = !quoted,
            '[' if !quoted => bracket = true,
            ']' if !quoted => bracket = false,
            _ if !quoted && !bracket => plain.push(ch.to_ascii_lowercase()),
            _ => (),
        }
    }
    let has_date = plain.contains("yy") || plain.contains('d');
    let has_time = plain.contains('h') || plain.contains("ss");
    match (has_date, has_time) {
        (true, true) => Some(FMT_DATETIME),
        (true, false) => Some(FMT_DATE),
        (false, true) => Some(FMT_TIME),
        _ => None,
    }
}

// datetime sign
const FMT_DATE: u8 = 0;
const FMT_TIME: u8 = 1;
const FMT_DATETIME: u8 = 2;

lazy_static! {
    static ref DATETIME_FMTS: HashMap<u32, u8> = {
        let mut v = HashMap::new();
        v.extend((14..18).map(|n| (n, FMT_DATE)));
        v.extend((27..32).map(|n| (n, FMT_DATE)));
        v.extend((34..37).map(|n| (n, FMT_DATE)));
        v.extend((50..59).map(|n| (n, FMT_DATE)));
        v.extend((18..22).map(|n| (n, FMT_TIME)));
        v.extend((32..34).map(|n| (n, FMT_TIME)));
        v.extend((45..48).map(|n| (n, FMT_TIME)));
        v.insert(22, FMT_DATETIME);
        v
    };
}
