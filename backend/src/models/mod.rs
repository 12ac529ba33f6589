//! Domain models for the Campusload import/export pipeline.
//!
//! This module contains the data structures passed between pipeline stages:
//!
//! - [`EntityKind`] - which institution-scoped table a call targets
//! - [`Field`] - semantic fields recognized in a header row
//! - [`NormalizedRecord`] - a validated spreadsheet row
//! - [`ResolvedOperation`] - what the importer must do with one record
//! - [`ImportSummary`] - per-call counters returned to the caller
//! - [`ExportSpec`] / [`ExportFormat`] - caller-supplied export request
//! - [`EstablishmentRow`] / [`ProgramRow`] - rows read back from the store
//!
//! Everything here lives for a single request; the durable state is the
//! relational store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Entity Kind
// =============================================================================

/// Institution-scoped entity handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// School or campus belonging to a university.
    Establishment,
    /// Academic track (filière) belonging to an establishment.
    Program,
}

impl EntityKind {
    /// Plural name used in routes and CLI arguments.
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Establishment => "establishments",
            EntityKind::Program => "programs",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "establishment" | "establishments" | "etablissement" | "etablissements" => {
                Ok(EntityKind::Establishment)
            }
            "program" | "programs" | "filiere" | "filieres" => Ok(EntityKind::Program),
            other => Err(format!("Unknown entity type: {}", other)),
        }
    }
}

// =============================================================================
// Semantic Fields
// =============================================================================

/// Semantic field a spreadsheet column can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Code,
    Address,
    Contact,
    Email,
    Phone,
    Website,
    ImageUrl,
    /// Reference to the owning entity (university or establishment).
    Parent,
}

impl Field {
    /// Lowercase identifier used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Code => "code",
            Field::Address => "address",
            Field::Contact => "contact",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::Website => "website",
            Field::ImageUrl => "image_url",
            Field::Parent => "parent",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Validated Records
// =============================================================================

/// A spreadsheet row after validation.
///
/// `name` is always present and non-blank. Optional cells are trimmed and
/// blank cells become `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// 1-based data-row ordinal (header excluded).
    pub row: usize,
    pub name: String,
    pub code: Option<String>,
    /// Raw parent reference as written in the sheet (name or id).
    pub parent: Option<String>,
    pub address: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub image_url: Option<String>,
}

impl NormalizedRecord {
    /// Set an optional field by its semantic name.
    pub fn set(&mut self, field: Field, value: Option<String>) {
        match field {
            Field::Name => self.name = value.unwrap_or_default(),
            Field::Code => self.code = value,
            Field::Parent => self.parent = value,
            Field::Address => self.address = value,
            Field::Contact => self.contact = value,
            Field::Email => self.email = value,
            Field::Phone => self.phone = value,
            Field::Website => self.website = value,
            Field::ImageUrl => self.image_url = value,
        }
    }
}

/// A required cell left blank in one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub row: usize,
    pub field: Field,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Decision taken for one record, produced by the resolver and consumed by the
/// importer inside the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedOperation {
    /// Create a new row under `parent_id`.
    Insert { parent_id: i64, record: NormalizedRecord },
    /// Overwrite the row `existing_id` in place.
    Update { existing_id: i64, parent_id: i64, record: NormalizedRecord },
    /// Already present; leave the store untouched.
    Skip { row: usize, reason: String },
    /// Business-rule failure; recorded, never aborts the batch.
    Reject { row: usize, reasons: Vec<String> },
}

/// Counters returned by an import call.
///
/// Once a batch is committed, `imported + updated + skipped + errors.len()`
/// equals `total_rows`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_rows: usize,
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl ImportSummary {
    pub fn new(total_rows: usize) -> Self {
        Self { total_rows, ..Default::default() }
    }

    /// Number of rows that received an outcome so far.
    pub fn accounted(&self) -> usize {
        self.imported + self.updated + self.skipped + self.errors.len()
    }
}

// =============================================================================
// Export Requests
// =============================================================================

/// Row filters applied by the store before the grid is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilters {
    /// Case-insensitive substring on name or code.
    #[serde(default)]
    pub search: Option<String>,
    /// Exact parent id (university for establishments, establishment for programs).
    #[serde(default, alias = "universityId", alias = "establishmentId")]
    pub institution_id: Option<i64>,
}

impl ExportFilters {
    /// Search term, or `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Caller-supplied export request. Fields are narrowed to the entity's
/// allow-list before use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSpec {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: ExportFilters,
}

/// Output encoding of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Xlsx,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => XLSX_CONTENT_TYPE,
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(other.to_string()),
        }
    }
}

/// MIME type of Office Open XML workbooks.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

// =============================================================================
// Store Rows
// =============================================================================

/// An establishment joined with its university's display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EstablishmentRow {
    pub id: i64,
    pub nom: String,
    pub code: Option<String>,
    pub adresse: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
    pub site_web: Option<String>,
    pub image: Option<String>,
    pub university_id: i64,
    pub university_name: Option<String>,
}

/// A program joined with its establishment and university.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProgramRow {
    pub id: i64,
    pub nom: String,
    pub code: Option<String>,
    pub etablissement_id: i64,
    pub etablissement_nom: Option<String>,
    pub university_id: Option<i64>,
    pub universite_nom: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parsing() {
        assert_eq!("establishments".parse::<EntityKind>().unwrap(), EntityKind::Establishment);
        assert_eq!("Filieres".parse::<EntityKind>().unwrap(), EntityKind::Program);
        assert!("courses".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_summary_accounting() {
        let mut summary = ImportSummary::new(4);
        summary.imported = 1;
        summary.updated = 1;
        summary.skipped = 1;
        summary.errors.push("Row 4: nope".into());
        assert_eq!(summary.accounted(), summary.total_rows);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let json = serde_json::to_value(ImportSummary::new(3)).unwrap();
        assert_eq!(json["totalRows"], 3);
        assert!(json["errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_export_filters_accept_legacy_keys() {
        let filters: ExportFilters =
            serde_json::from_value(serde_json::json!({ "search": "  ", "universityId": 7 })).unwrap();
        assert_eq!(filters.institution_id, Some(7));
        assert_eq!(filters.search_term(), None);
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert_eq!("pdf".parse::<ExportFormat>().unwrap_err(), "pdf");
        assert_eq!(ExportFormat::Csv.extension(), "csv");
    }
}
