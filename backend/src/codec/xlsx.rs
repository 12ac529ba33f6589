//! Office Open XML workbooks.
//!
//! Reading goes through calamine and only looks at the first sheet. Writing
//! goes through rust_xlsxwriter and always produces a single sheet whose first
//! row is the bold, grey-filled header.

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx, XlsxError};
use rust_xlsxwriter::{Color, Format, FormatPattern, Workbook};

use super::{CellValue, ColumnSpec, Grid};
use crate::error::{CodecError, CodecResult};

/// Header fill, matching the portal's other exports.
const HEADER_FILL: u32 = 0xE0E0E0;

/// Decode the first sheet of a workbook.
///
/// Cells keep their absolute position: a sheet whose data starts at C3 still
/// yields a grid where that cell is (3, 3).
pub fn decode_xlsx(bytes: &[u8]) -> CodecResult<Grid> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: XlsxError| CodecError::Format(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(CodecError::EmptySheet)?
        .map_err(|e| CodecError::Format(e.to_string()))?;

    let (row_offset, col_offset) = match range.start() {
        Some((row, col)) => (row as usize, col as usize),
        None => return Ok(Grid::default()),
    };

    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(row.iter().map(convert_cell));
        rows.push(cells);
    }

    Ok(Grid::new(rows))
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Error(_) => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

/// Encode a single-sheet workbook.
///
/// Each row of `rows` is aligned with `columns`; missing trailing cells are
/// left empty.
pub fn encode_xlsx(
    sheet_name: &str,
    columns: &[ColumnSpec],
    rows: &[Vec<CellValue>],
) -> CodecResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new()
        .set_bold()
        .set_pattern(FormatPattern::Solid)
        .set_background_color(Color::RGB(HEADER_FILL));

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col, column) in columns.iter().enumerate() {
        let col = col as u16;
        worksheet.set_column_width(col, column.width)?;
        worksheet.write_string_with_format(0, col, &column.header, &header_format)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let row_num = (index + 1) as u32;
        for (col, cell) in row.iter().take(columns.len()).enumerate() {
            let col = col as u16;
            match cell {
                CellValue::Empty => {}
                CellValue::Text(s) => {
                    worksheet.write_string(row_num, col, s)?;
                }
                CellValue::Number(n) => {
                    worksheet.write_number(row_num, col, *n)?;
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean(row_num, col, *b)?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
