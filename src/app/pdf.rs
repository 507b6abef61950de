use std::path::Path;

use anyhow::{anyhow, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::read::SheetData;
use crate::ColNum;

/// Excel's default column width, in characters of the default font.
pub const DEFAULT_COLUMN_WIDTH: f64 = 8.43;

// average advance of a Helvetica glyph, in em
const GLYPH_ADVANCE: f64 = 0.556;
const CELL_PADDING: f64 = 2.0;

/// Paper and print settings, in points.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    pub page_width: f64,
    pub page_height: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub font_size: f64,
    pub row_height: f64,
}

impl Default for PageSetup {
    /// A4 portrait, Excel "normal" margins
    fn default() -> Self {
        Self {
            page_width: 595.0,
            page_height: 842.0,
            margin_left: 50.4,
            margin_right: 50.4,
            margin_top: 54.0,
            margin_bottom: 54.0,
            font_size: 9.0,
            row_height: 15.0,
        }
    }
}

impl PageSetup {
    pub fn printable_width(&self) -> f64 {
        (self.page_width - self.margin_left - self.margin_right).max(1.0)
    }

    pub fn printable_height(&self) -> f64 {
        (self.page_height - self.margin_top - self.margin_bottom).max(1.0)
    }

    pub fn rows_per_page(&self) -> usize {
        ((self.printable_height() / self.row_height).floor() as usize).max(1)
    }
}

/// Column width in characters to points, the way Excel converts it for Calibri 11.
fn column_points(width_chars: f64) -> f64 {
    (width_chars * 7.0 + 5.0) * 0.75
}

/// One printed page: a block of rows and a band of columns of one sheet.
#[derive(Debug, Clone, PartialEq)]
struct PageSlice {
    /// 0-based, end exclusive
    rows: (usize, usize),
    /// 0-based column indexes with their widths in points
    columns: Vec<(usize, f64)>,
}

/// Pages of one sheet, "down, then over". Empty sheets print nothing.
fn paginate(data: &SheetData, setup: &PageSetup) -> Vec<PageSlice> {
    let used_rows = match data.rows.iter().rposition(|r| r.iter().any(|v| !v.is_blank())) {
        Some(last) => last + 1,
        None => return Vec::new(),
    };
    let used_cols = data.max_columns();

    // columns packed into bands that fit across the page
    let mut bands: Vec<Vec<(usize, f64)>> = Vec::new();
    let mut band: Vec<(usize, f64)> = Vec::new();
    let mut band_width = 0.0;
    for icol in 0..used_cols {
        let chars = ColNum::try_from(icol + 1).ok().and_then(|c| data.column_width(c)).unwrap_or(DEFAULT_COLUMN_WIDTH);
        let width = column_points(chars).min(setup.printable_width());
        if !band.is_empty() && band_width + width > setup.printable_width() {
            bands.push(std::mem::take(&mut band));
            band_width = 0.0;
        }
        band.push((icol, width));
        band_width += width;
    }
    if !band.is_empty() {
        bands.push(band);
    }

    let per_page = setup.rows_per_page();
    let mut pages = Vec::new();
    for columns in bands {
        let mut start = 0;
        while start < used_rows {
            let end = usize::min(used_rows, start + per_page);
            pages.push(PageSlice { rows: (start, end), columns: columns.clone() });
            start = end;
        }
    }
    pages
}

/// WinAnsi bytes; characters outside Latin-1 print as `?`. Also returns how many were replaced.
fn encode_text(text: &str) -> (Vec<u8>, usize) {
    let mut replaced = 0;
    let bytes = text
        .chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            _ => {
                replaced += 1;
                b'?'
            }
        })
        .collect();
    (bytes, replaced)
}

/// Content operations of one page.
fn page_operations(data: &SheetData, slice: &PageSlice, setup: &PageSetup, replaced: &mut usize) -> Vec<Operation> {
    let mut ops = Vec::new();
    let max_glyph = setup.font_size * GLYPH_ADVANCE;
    for (irow, row) in data.rows[slice.rows.0..slice.rows.1].iter().enumerate() {
        let top = setup.page_height - setup.margin_top - irow as f64 * setup.row_height;
        let baseline = top - setup.row_height + (setup.row_height - setup.font_size) / 2.0 + 1.0;
        let mut left = setup.margin_left;
        for (pos, &(icol, width)) in slice.columns.iter().enumerate() {
            let cell_left = left;
            left += width;
            let value = match row.get(icol) {
                Some(v) if !v.is_blank() => v,
                _ => continue,
            };
            let area = merged_width(data, slice, pos, slice.rows.0 + irow).unwrap_or(width);
            let fit = (((area - 2.0 * CELL_PADDING) / max_glyph).floor().max(1.0)) as usize;
            let text: String = value.display_text().chars().take(fit).collect();
            let text_width = text.chars().count() as f64 * max_glyph;
            let x = if value.is_numeric() {
                cell_left + area - CELL_PADDING - text_width
            } else {
                cell_left + CELL_PADDING
            };
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec!["F1".into(), Object::Integer(setup.font_size.round() as i64)]));
            ops.push(Operation::new("Td", vec![Object::Integer(x.round() as i64), Object::Integer(baseline.round() as i64)]));
            let (encoded, lost) = encode_text(&text);
            *replaced += lost;
            ops.push(Operation::new("Tj", vec![Object::string_literal(encoded)]));
            ops.push(Operation::new("ET", vec![]));
        }
    }
    ops
}

/// width of the merged area starting at this cell, limited to the columns of the band
fn merged_width(data: &SheetData, slice: &PageSlice, pos: usize, irow: usize) -> Option<f64> {
    let icol = slice.columns[pos].0;
    let &(_, (_, right)) = data
        .merged_ranges
        .iter()
        .find(|((top, left), _)| *top as usize == irow + 1 && *left as usize == icol + 1)?;
    Some(
        slice.columns[pos..]
            .iter()
            .take_while(|(c, _)| *c < right as usize)
            .map(|(_, w)| *w)
            .sum(),
    )
}

/// Render sheets, in order, into one PDF at `destination`. Returns the page count.
pub fn render_pdf<'a, I>(sheets: I, setup: &PageSetup, destination: &Path) -> Result<usize>
where
    I: IntoIterator<Item = &'a SheetData>,
{
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    let mut replaced = 0;
    for data in sheets {
        for slice in paginate(data, setup) {
            let content = Content { operations: page_operations(data, &slice, setup, &mut replaced) };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
    }
    if kids.is_empty() {
        return Err(anyhow!("nothing to print: the selected sheets are empty"));
    }

    if replaced > 0 {
        log::warn!(
            "{}: {} characters outside Latin-1 cannot be printed with the standard font, shown as '?'",
            destination.display(),
            replaced
        );
    }

    let count = kids.len();
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(count as i64),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(setup.page_width.round() as i64),
            Object::Integer(setup.page_height.round() as i64),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    doc.save(destination)?;
    Ok(count)
}
