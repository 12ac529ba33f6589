//! Row validation.
//!
//! Turns decoded rows into [`NormalizedRecord`]s. The only rule is that every
//! required field of the entity is non-blank after trimming; all other cells
//! are passed through as trimmed text, blank cells becoming `None`. Rows are
//! validated independently: one row's failure never affects another.
//!
//! # Example
//!
//! ```rust,ignore
//! use campusload::codec::Grid;
//! use campusload::entity::ESTABLISHMENTS;
//! use campusload::mapping::map_headers;
//! use campusload::validation::validate_grid;
//!
//! let grid = Grid::from_strings(&[
//!     vec!["Nom", "Université"],
//!     vec!["IUT Nord", "Université de Lille"],
//!     vec!["", "Université de Lille"],
//! ]);
//! let map = map_headers(&grid.headers(), &ESTABLISHMENTS).unwrap();
//! let outcome = validate_grid(&grid, &map, &ESTABLISHMENTS);
//!
//! assert_eq!(outcome.records.len(), 1);
//! assert_eq!(outcome.errors[0].to_string(), "Row 2: name is required");
//! ```

use crate::codec::{CellValue, Grid};
use crate::entity::EntityProfile;
use crate::mapping::FieldMap;
use crate::models::{Field, FieldError, NormalizedRecord};

/// Result of validating every data row of a grid.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    /// Non-blank data rows seen.
    pub total_rows: usize,
    /// Valid rows, in sheet order.
    pub records: Vec<NormalizedRecord>,
    /// Field errors, in sheet order.
    pub errors: Vec<FieldError>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Failing rows with their reasons, in sheet order.
    pub fn rejected_rows(&self) -> Vec<(usize, Vec<String>)> {
        let mut rejected: Vec<(usize, Vec<String>)> = Vec::new();
        for error in &self.errors {
            match rejected.last_mut() {
                Some((row, reasons)) if *row == error.row => reasons.push(error.message.clone()),
                _ => rejected.push((error.row, vec![error.message.clone()])),
            }
        }
        rejected
    }

    /// Error messages grouped per row: one line per failing row.
    pub fn row_messages(&self) -> Vec<String> {
        self.rejected_rows()
            .into_iter()
            .map(|(row, reasons)| format!("Row {}: {}", row, reasons.join("; ")))
            .collect()
    }
}

/// Validate one row.
pub fn validate_row(
    row: usize,
    cells: &[CellValue],
    field_map: &FieldMap,
    profile: &EntityProfile,
) -> Result<NormalizedRecord, Vec<FieldError>> {
    let mut record = NormalizedRecord { row, ..Default::default() };
    let mut errors = Vec::new();

    for (field, column) in field_map.iter() {
        let value = cells.get(column - 1).and_then(CellValue::as_text);
        record.set(field, value);
    }

    for field in profile.required {
        let present = match field {
            Field::Name => !record.name.is_empty(),
            Field::Code => record.code.is_some(),
            Field::Parent => record.parent.is_some(),
            _ => true,
        };
        if !present {
            errors.push(FieldError {
                row,
                field: *field,
                message: required_message(*field, profile),
            });
        }
    }

    if errors.is_empty() {
        Ok(record)
    } else {
        Err(errors)
    }
}

fn required_message(field: Field, profile: &EntityProfile) -> String {
    match field {
        Field::Parent => format!("{} is required", profile.parent_noun),
        other => format!("{} is required", other.as_str()),
    }
}

/// Validate every non-blank data row of a grid.
pub fn validate_grid(grid: &Grid, field_map: &FieldMap, profile: &EntityProfile) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    for (row, cells) in grid.data_rows() {
        outcome.total_rows += 1;
        match validate_row(row, cells, field_map, profile) {
            Ok(record) => outcome.records.push(record),
            Err(errors) => outcome.errors.extend(errors),
        }
    }

    outcome
}
