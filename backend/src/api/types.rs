//! Request and response bodies of the REST API, and the mapping from
//! pipeline errors to HTTP statuses.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::logs::log_error;
use crate::entity::EntityProfile;
use crate::error::{ExportError, ImportError};
use crate::export::default_fields;
use crate::models::{ExportFilters, ExportSpec, ImportSummary};

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<Value>);

/// Body returned after a committed import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub success: bool,
    /// Correlates the response with the log stream.
    pub import_id: String,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

impl ImportResponse {
    pub fn new(import_id: Uuid, summary: ImportSummary) -> Self {
        Self { success: true, import_id: import_id.to_string(), summary }
    }
}

/// JSON body of `POST /api/establishments/export`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: ExportFilters,
    #[serde(default)]
    pub format: Option<String>,
}

impl ExportRequest {
    pub fn spec(&self) -> ExportSpec {
        ExportSpec { fields: self.fields.clone(), filters: self.filters.clone() }
    }
}

/// Query string of `GET /api/programs/export`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub format: Option<String>,
    pub search: Option<String>,
    #[serde(alias = "institutionId")]
    pub establishment_id: Option<i64>,
    /// Comma-separated keys; all allow-listed fields when absent.
    pub fields: Option<String>,
}

impl ExportQuery {
    pub fn spec(&self, profile: &EntityProfile) -> ExportSpec {
        let fields = self
            .fields
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(|f| f.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| default_fields(profile));
        ExportSpec {
            fields,
            filters: ExportFilters {
                search: self.search.clone(),
                institution_id: self.establishment_id,
            },
        }
    }
}

/// `{ "error": ... }`
pub fn error_response(error: &str) -> Value {
    json!({ "error": error })
}

pub fn bad_request(error: impl AsRef<str>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(error.as_ref())))
}

fn server_error(summary: &str, details: String) -> ApiError {
    log_error(format!("{}: {}", summary, details));
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": summary, "details": details })),
    )
}

/// Status and body for a failed import.
pub fn import_error(err: ImportError) -> ApiError {
    match err {
        ImportError::RowValidation { errors } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": format!("{} row(s) failed validation", errors.len()),
                "errors": errors,
            })),
        ),
        ImportError::Store(e) => server_error("Import failed", e.to_string()),
        other => bad_request(other.to_string()),
    }
}

/// Status and body for a failed export.
pub fn export_error(err: ExportError) -> ApiError {
    if err.is_client_error() {
        bad_request(err.to_string())
    } else {
        server_error("Export failed", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PROGRAMS;
    use crate::error::StoreError;

    #[test]
    fn test_import_response_is_flat() {
        let mut summary = ImportSummary::new(2);
        summary.imported = 1;
        summary.errors.push("Row 1: university \"X\" not found for \"A\"".into());
        let json = serde_json::to_value(ImportResponse::new(Uuid::nil(), summary)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["totalRows"], 2);
        assert_eq!(json["imported"], 1);
        assert_eq!(json["skipped"], 0);
        assert_eq!(json["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_import_error_statuses() {
        let (status, Json(body)) = import_error(ImportError::RowValidation {
            errors: vec!["Row 2: name is required".into()],
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"][0], "Row 2: name is required");

        let (status, _) = import_error(ImportError::NoRows);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, Json(body)) = import_error(StoreError::Schema("boom".into()).into());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["details"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn test_export_query_defaults_to_all_fields() {
        let query = ExportQuery::default();
        assert_eq!(query.spec(&PROGRAMS).fields, vec!["id", "nom", "code", "etablissement_id"]);

        let query = ExportQuery {
            fields: Some("nom, code".into()),
            establishment_id: Some(3),
            ..Default::default()
        };
        let spec = query.spec(&PROGRAMS);
        assert_eq!(spec.fields, vec!["nom", "code"]);
        assert_eq!(spec.filters.institution_id, Some(3));
    }
}
