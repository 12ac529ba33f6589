//! High-level import API.
//!
//! Runs the whole chain for one uploaded file:
//! decode → map headers → validate → (transaction) resolve → apply → commit.
//!
//! # Example
//!
//! ```rust,ignore
//! use campusload::import::import_file;
//! use campusload::models::EntityKind;
//! use campusload::store::Store;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::connect("sqlite://campusload.db").await?;
//!     let summary = import_file(&store, EntityKind::Establishment, Path::new("etablissements.xlsx")).await?;
//!     println!("{} imported, {} skipped", summary.imported, summary.skipped);
//!     Ok(())
//! }
//! ```

use std::path::Path;

use super::importer::Importer;
use super::resolver::Resolver;
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::codec::{self, Grid, SpreadsheetKind};
use crate::entity::ValidationPolicy;
use crate::error::{ImportError, ImportResult};
use crate::mapping::map_headers;
use crate::models::{EntityKind, ImportSummary, NormalizedRecord, ResolvedOperation};
use crate::store::Store;
use crate::validation::validate_grid;

/// A data row ready for the transaction: either a record to resolve or a
/// row already rejected by validation.
enum Pending {
    Record(NormalizedRecord),
    Invalid { row: usize, reasons: Vec<String> },
}

impl Pending {
    fn row(&self) -> usize {
        match self {
            Pending::Record(record) => record.row,
            Pending::Invalid { row, .. } => *row,
        }
    }
}

/// Import a file from disk; the container is chosen from the extension.
pub async fn import_file(store: &Store, kind: EntityKind, path: &Path) -> ImportResult<ImportSummary> {
    let file_name = path.file_name().and_then(|n| n.to_str());
    let format = SpreadsheetKind::detect(None, file_name).ok_or_else(|| {
        ImportError::UnsupportedFileType(file_name.unwrap_or("unknown").to_string())
    })?;
    let bytes = tokio::fs::read(path).await.map_err(|e| ImportError::Codec(e.into()))?;
    import_bytes(store, kind, &bytes, format).await
}

/// Import uploaded bytes.
pub async fn import_bytes(
    store: &Store,
    kind: EntityKind,
    bytes: &[u8],
    format: SpreadsheetKind,
) -> ImportResult<ImportSummary> {
    log_info(format!("📖 Reading {} file ({} bytes)...", kind, bytes.len()));
    let grid = codec::decode(bytes, format)?;
    import_grid(store, kind, &grid).await
}

/// Import an already decoded grid.
pub async fn import_grid(store: &Store, kind: EntityKind, grid: &Grid) -> ImportResult<ImportSummary> {
    let profile = kind.profile();

    let headers = grid.headers();
    let field_map = map_headers(&headers, profile)?;
    log_success(format!("Recognized {} of {} columns", field_map.len(), headers.len()));

    let outcome = validate_grid(grid, &field_map, profile);
    if outcome.total_rows == 0 {
        return Err(ImportError::NoRows);
    }
    log_info(format!("{} data rows, {} with errors", outcome.total_rows, outcome.rejected_rows().len()));

    if !outcome.is_valid() && profile.validation_policy == ValidationPolicy::FailClosed {
        let errors = outcome.row_messages();
        for message in errors.iter().take(3) {
            log_error(message.clone());
        }
        log_warning("Import rejected, nothing was written");
        return Err(ImportError::RowValidation { errors });
    }

    let total_rows = outcome.total_rows;
    let mut pending: Vec<Pending> = outcome
        .rejected_rows()
        .into_iter()
        .map(|(row, reasons)| Pending::Invalid { row, reasons })
        .collect();
    pending.extend(outcome.records.into_iter().map(Pending::Record));
    pending.sort_by_key(Pending::row);

    // Dropping `tx` on any early return rolls the batch back.
    let mut tx = store.begin().await?;
    let resolver = Resolver::load(&mut tx, profile).await?;
    log_info(format!("🔄 Resolving against {} {}(s)...", resolver.parents().len(), profile.parent_noun));

    let mut importer = Importer::new(kind, total_rows);
    for item in pending {
        let operation = match item {
            Pending::Record(record) => resolver.resolve(&mut tx, record).await?,
            Pending::Invalid { row, reasons } => ResolvedOperation::Reject { row, reasons },
        };
        importer.apply(&mut tx, operation).await?;
    }
    tx.commit().await.map_err(|e| ImportError::Store(e.into()))?;

    let summary = importer.finish();
    log_success(format!(
        "{}: {} imported, {} updated, {} skipped, {} errors",
        kind,
        summary.imported,
        summary.updated,
        summary.skipped,
        summary.errors.len()
    ));
    Ok(summary)
}
