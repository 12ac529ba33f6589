//! # Campusload - bulk import/export for a university portal
//!
//! Campusload loads establishments and academic programs from spreadsheets
//! into the portal database, and exports them back as workbooks, CSV or JSON.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ xlsx / csv  │──▶│  Codec  │──▶│  Header   │──▶│   Row    │──▶│ Resolver │
//! │   upload    │   │ (Grid)  │   │  Mapper   │   │ Validator│   │ + Import │──▶ SQLite
//! └─────────────┘   └─────────┘   └───────────┘   └──────────┘   └──────────┘
//!
//!   fields + filters ──▶ store query ──▶ Exporter ──▶ Codec ──▶ xlsx / csv / json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use campusload::{import_file, EntityKind, Store};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Store::connect("sqlite://campusload.db").await.unwrap();
//!     let summary = import_file(&store, EntityKind::Program, Path::new("filieres.csv")).await.unwrap();
//!     println!("{} imported, {} updated", summary.imported, summary.updated);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Records, operations, summaries, export requests
//! - [`codec`] - Spreadsheet decoding and encoding
//! - [`entity`] - Per-entity strategy (fields, policies, export columns)
//! - [`mapping`] - Header recognition
//! - [`validation`] - Row validation
//! - [`store`] - SQLite store
//! - [`import`] - Resolution and transactional import
//! - [`export`] - Exports and import templates
//! - [`config`] - Environment settings
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Spreadsheets
pub mod codec;
pub mod entity;
pub mod mapping;
pub mod validation;

// Persistence
pub mod store;

// Pipelines
pub mod export;
pub mod import;

// Settings
pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CodecError,
    ConfigError,
    ExportError,
    ImportError,
    MappingError,
    StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    EntityKind,
    ExportFilters,
    ExportFormat,
    ExportSpec,
    Field,
    FieldError,
    ImportSummary,
    NormalizedRecord,
    ResolvedOperation,
};

// =============================================================================
// Re-exports - Codec
// =============================================================================

pub use codec::{decode, CellValue, ColumnSpec, Grid, SpreadsheetKind};

// =============================================================================
// Re-exports - Entities, mapping, validation
// =============================================================================

pub use entity::{ConflictPolicy, EntityProfile, ValidationPolicy, ESTABLISHMENTS, PROGRAMS};
pub use mapping::{map_headers, normalize_header, FieldMap};
pub use validation::{validate_grid, validate_row, ValidationOutcome};

// =============================================================================
// Re-exports - Pipelines
// =============================================================================

pub use export::{export, export_table, template, ExportArtifact, ExportTable};
pub use import::{import_bytes, import_file, import_grid};
pub use store::Store;

// =============================================================================
// Re-exports - Server
// =============================================================================

pub use config::ServerConfig;

pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
