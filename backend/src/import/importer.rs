//! Transactional importer.
//!
//! Applies resolved operations through the import transaction and keeps the
//! per-call counters. Rejected and skipped rows never abort the batch; a
//! store failure does, and the caller drops the transaction.

use sqlx::sqlite::SqliteConnection;

use crate::api::logs::{log_info_indent, log_warning};
use crate::error::StoreResult;
use crate::models::{EntityKind, ImportSummary, ResolvedOperation};
use crate::store;

/// Accumulates the outcome of every row of one call.
#[derive(Debug)]
pub struct Importer {
    kind: EntityKind,
    summary: ImportSummary,
}

impl Importer {
    pub fn new(kind: EntityKind, total_rows: usize) -> Self {
        Self { kind, summary: ImportSummary::new(total_rows) }
    }

    /// Execute one operation and count it.
    pub async fn apply(
        &mut self,
        conn: &mut SqliteConnection,
        operation: ResolvedOperation,
    ) -> StoreResult<()> {
        match operation {
            ResolvedOperation::Insert { parent_id, record } => {
                let id = store::insert_record(conn, self.kind, parent_id, &record).await?;
                log_info_indent(format!("Row {}: inserted \"{}\" (id {})", record.row, record.name, id), 1);
                self.summary.imported += 1;
            }
            ResolvedOperation::Update { existing_id, parent_id, record } => {
                store::update_record(conn, self.kind, existing_id, parent_id, &record).await?;
                log_info_indent(
                    format!("Row {}: updated \"{}\" (id {})", record.row, record.name, existing_id),
                    1,
                );
                self.summary.updated += 1;
            }
            ResolvedOperation::Skip { row, reason } => {
                log_info_indent(format!("Row {}: skipped, {}", row, reason), 1);
                self.summary.skipped += 1;
            }
            ResolvedOperation::Reject { row, reasons } => {
                let message = format!("Row {}: {}", row, reasons.join("; "));
                log_warning(message.clone());
                self.summary.errors.push(message);
            }
        }
        Ok(())
    }

    pub fn finish(self) -> ImportSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedRecord;
    use crate::store::Store;

    #[tokio::test]
    async fn test_every_operation_is_counted_once() {
        let store = Store::in_memory().await.unwrap();
        let u = store.create_university("Université A").await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let mut importer = Importer::new(EntityKind::Establishment, 3);

        let record = NormalizedRecord { row: 1, name: "IUT".into(), ..Default::default() };
        importer
            .apply(&mut tx, ResolvedOperation::Insert { parent_id: u, record })
            .await
            .unwrap();
        importer
            .apply(&mut tx, ResolvedOperation::Skip { row: 2, reason: "exists".into() })
            .await
            .unwrap();
        importer
            .apply(&mut tx, ResolvedOperation::Reject { row: 3, reasons: vec!["a".into(), "b".into()] })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let summary = importer.finish();
        assert_eq!((summary.imported, summary.skipped), (1, 1));
        assert_eq!(summary.errors, vec!["Row 3: a; b"]);
        assert_eq!(summary.accounted(), summary.total_rows);
        assert_eq!(store.count(EntityKind::Establishment).await.unwrap(), 1);
    }
}
