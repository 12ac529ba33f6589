//! Import pipeline: resolution, transactional application and the
//! end-to-end entry points.
//!
//! - [`resolver`] - parent lookup and duplicate detection
//! - [`importer`] - applies operations and counts outcomes
//! - [`pipeline`] - bytes in, [`ImportSummary`](crate::models::ImportSummary) out

pub mod importer;
pub mod pipeline;
pub mod resolver;

pub use importer::Importer;
pub use pipeline::{import_bytes, import_file, import_grid};
pub use resolver::{ParentDirectory, ParentLookup, Resolver};
