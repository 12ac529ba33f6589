//! Spreadsheet codec.
//!
//! Decodes uploaded bytes into a [`Grid`] of typed cells and encodes ordered
//! rows back into downloadable bytes. Pure and stateless.
//!
//! - [`xlsx`] - Office Open XML workbooks (read with calamine, written with
//!   rust_xlsxwriter)
//! - [`delimited`] - CSV/TSV with encoding and delimiter auto-detection

pub mod delimited;
pub mod xlsx;

use serde::Serialize;
use serde_json::Value;

use crate::error::CodecResult;
use crate::models::XLSX_CONTENT_TYPE;

pub use delimited::{decode_content, detect_delimiter, detect_encoding, encode_csv};
pub use xlsx::encode_xlsx;

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Trimmed textual form, `None` for blank cells.
    ///
    /// Whole numbers lose their fractional part so that ids and phone numbers
    /// stored as numbers read back as written.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            CellValue::Empty => return None,
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_text().is_none()
    }

    /// JSON form used by structured exports.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Empty => Value::Null,
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                Value::from(*n as i64)
            }
            CellValue::Number(n) => Value::from(*n),
            CellValue::Bool(b) => Value::Bool(*b),
        }
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map(CellValue::Text).unwrap_or(CellValue::Empty)
    }
}

impl From<Option<i64>> for CellValue {
    fn from(value: Option<i64>) -> Self {
        value.map(|n| CellValue::Number(n as f64)).unwrap_or(CellValue::Empty)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Cells of the first sheet, addressed 1-based by (row, column).
///
/// Row 1 is the header row. Rows may be ragged; missing cells read as empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<CellValue>>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl Grid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    /// Build a grid from plain strings (header first).
    pub fn from_strings<S: AsRef<str>>(rows: &[Vec<S>]) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|s| {
                        let s = s.as_ref();
                        if s.is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::Text(s.to_string())
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    /// Cell at 1-based (row, column).
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        if row == 0 || col == 0 {
            return &EMPTY_CELL;
        }
        self.rows
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Number of rows including the header.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Header labels as text, blank headers as empty strings.
    pub fn headers(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.iter().map(|c| c.as_text().unwrap_or_default()).collect())
            .unwrap_or_default()
    }

    /// Non-blank data rows in sheet order, numbered 1.. (header excluded).
    pub fn data_rows(&self) -> Vec<(usize, &[CellValue])> {
        self.rows
            .iter()
            .skip(1)
            .filter(|row| row.iter().any(|c| !c.is_blank()))
            .enumerate()
            .map(|(i, row)| (i + 1, row.as_slice()))
            .collect()
    }
}

/// Column layout of an encoded sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub header: String,
    /// Stable machine key (JSON exports).
    pub key: String,
    pub width: f64,
}

impl ColumnSpec {
    pub fn new(header: impl Into<String>, key: impl Into<String>, width: f64) -> Self {
        Self { header: header.into(), key: key.into(), width }
    }
}

/// Container format of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetKind {
    Xlsx,
    Delimited,
}

impl SpreadsheetKind {
    /// Detect the container from the declared content type, then the file
    /// extension.
    pub fn detect(content_type: Option<&str>, file_name: Option<&str>) -> Option<Self> {
        let by_type = content_type.and_then(|ct| {
            let ct = ct.split(';').next().unwrap_or("").trim().to_lowercase();
            match ct.as_str() {
                XLSX_CONTENT_TYPE => Some(SpreadsheetKind::Xlsx),
                "text/csv" | "application/csv" | "text/tab-separated-values" => {
                    Some(SpreadsheetKind::Delimited)
                }
                _ => None,
            }
        });
        by_type.or_else(|| {
            let name = file_name?.to_lowercase();
            if name.ends_with(".xlsx") {
                Some(SpreadsheetKind::Xlsx)
            } else if name.ends_with(".csv") || name.ends_with(".tsv") {
                Some(SpreadsheetKind::Delimited)
            } else {
                None
            }
        })
    }
}

/// Decode uploaded bytes into a grid.
pub fn decode(bytes: &[u8], kind: SpreadsheetKind) -> CodecResult<Grid> {
    match kind {
        SpreadsheetKind::Xlsx => xlsx::decode_xlsx(bytes),
        SpreadsheetKind::Delimited => delimited::decode_delimited(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text_normalization() {
        assert_eq!(CellValue::Text("  Paris  ".into()).as_text().as_deref(), Some("Paris"));
        assert_eq!(CellValue::Text("   ".into()).as_text(), None);
        assert_eq!(CellValue::Number(123456789.0).as_text().as_deref(), Some("123456789"));
        assert_eq!(CellValue::Number(2.5).as_text().as_deref(), Some("2.5"));
        assert_eq!(CellValue::Empty.as_text(), None);
    }

    #[test]
    fn test_grid_is_one_based_and_ragged() {
        let grid = Grid::from_strings(&[vec!["Nom", "Code"], vec!["A"]]);
        assert_eq!(grid.cell(1, 1), &CellValue::Text("Nom".into()));
        assert_eq!(grid.cell(2, 2), &CellValue::Empty);
        assert_eq!(grid.cell(0, 1), &CellValue::Empty);
        assert_eq!(grid.cell(9, 9), &CellValue::Empty);
    }

    #[test]
    fn test_blank_rows_are_not_numbered() {
        let grid = Grid::from_strings(&[
            vec!["Nom"],
            vec!["A"],
            vec![""],
            vec!["B"],
        ]);
        let rows = grid.data_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, 2);
        assert_eq!(rows[1].1[0], CellValue::Text("B".into()));
    }

    #[test]
    fn test_detect_spreadsheet_kind() {
        assert_eq!(
            SpreadsheetKind::detect(Some(XLSX_CONTENT_TYPE), None),
            Some(SpreadsheetKind::Xlsx)
        );
        assert_eq!(
            SpreadsheetKind::detect(Some("application/octet-stream"), Some("modele.CSV")),
            Some(SpreadsheetKind::Delimited)
        );
        assert_eq!(SpreadsheetKind::detect(Some("image/png"), Some("logo.png")), None);
    }
}
