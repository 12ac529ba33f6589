//! Delimited text (CSV/TSV) with encoding and delimiter auto-detection.
//!
//! Spreadsheets saved as CSV from office suites come in many flavours
//! (UTF-8 with BOM, Windows-1252, semicolon-separated in French locales).
//! Every cell is read as text; typing happens later in validation.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use super::{CellValue, ColumnSpec, Grid};
use crate::error::{CodecError, CodecResult};

/// Candidate separators, in tie-break order.
const SEPARATORS: [char; 4] = [';', ',', '\t', '|'];

/// Non-blank lines inspected by [`detect_delimiter`].
const SAMPLE_LINES: usize = 5;

/// Below this chardet confidence the guess is ignored.
const MIN_CONFIDENCE: f32 = 0.5;

/// Pick the codec for raw bytes.
///
/// Valid UTF-8 always wins: chardet tends to misreport short files with a few
/// accented letters. Otherwise the chardet guess is resolved through the
/// WHATWG label table, and anything unknown or low-confidence falls back to
/// Windows-1252, which is what French office suites write.
pub fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }

    let (charset, confidence, _) = chardet::detect(bytes);
    Encoding::for_label(charset.as_bytes())
        .filter(|encoding| *encoding != UTF_8 && confidence >= MIN_CONFIDENCE)
        .unwrap_or(WINDOWS_1252)
}

/// Decode bytes with `encoding`, dropping a leading byte-order mark.
pub fn decode_content(bytes: &[u8], encoding: &'static Encoding) -> CodecResult<String> {
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        return Err(CodecError::Encoding(format!(
            "content is not valid {}",
            encoding.name()
        )));
    }
    Ok(text.into_owned())
}

/// Occurrences of `sep` outside double-quoted fields.
fn count_unquoted(line: &str, sep: char) -> usize {
    let mut quoted = false;
    let mut count = 0;
    for c in line.chars() {
        if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            count += 1;
        }
    }
    count
}

/// Detect the delimiter from the first few non-blank lines.
///
/// A separator found in the header scores higher when every sampled line
/// holds the same number of it outside quotes; among equals the higher count
/// wins, then the earlier entry of [`SEPARATORS`]. Defaults to `,`.
pub fn detect_delimiter(content: &str) -> char {
    let sample: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SAMPLE_LINES)
        .collect();
    let Some((header, body)) = sample.split_first() else {
        return ',';
    };

    let mut best = (',', (false, 0));
    for sep in SEPARATORS {
        let count = count_unquoted(header, sep);
        if count == 0 {
            continue;
        }
        let consistent = body.iter().all(|line| count_unquoted(line, sep) == count);
        if (consistent, count) > best.1 {
            best = (sep, (consistent, count));
        }
    }
    best.0
}

/// Decode delimited text bytes into a grid, header row first.
pub fn decode_delimited(bytes: &[u8]) -> CodecResult<Grid> {
    let content = decode_content(bytes, detect_encoding(bytes))?;
    let delimiter = detect_delimiter(&content);
    parse_delimited(&content, delimiter)
}

/// Parse delimited text with an explicit delimiter.
pub fn parse_delimited(content: &str, delimiter: char) -> CodecResult<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter as u8)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells = record
            .iter()
            .map(|value| {
                if value.trim().is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(value.to_string())
                }
            })
            .collect();
        rows.push(cells);
    }

    Ok(Grid::new(rows))
}

/// Encode rows as comma-separated UTF-8, header first.
pub fn encode_csv(columns: &[ColumnSpec], rows: &[Vec<CellValue>]) -> CodecResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns.iter().map(|c| c.header.as_str()))?;

    for row in rows {
        let record: Vec<String> = (0..columns.len())
            .map(|i| row.get(i).and_then(CellValue::as_text).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| CodecError::Io(e.into_error()))
}
