//! Relational store client.
//!
//! A [`Store`] wraps an SQLite connection pool. It is created once at process
//! start and passed explicitly to every pipeline call; nothing here is global.
//!
//! Import work runs inside a single [`sqlx::Transaction`] obtained from
//! [`Store::begin`]. The free functions in this module take the transaction's
//! connection so that resolution and writes see each other's effects in sheet
//! order. A transaction dropped without commit is rolled back, so every early
//! return releases the connection and discards partial writes.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{QueryBuilder, Sqlite, Transaction};

use crate::error::{StoreError, StoreResult};
use crate::mapping::{fold, fold_accents};
use crate::models::{EntityKind, EstablishmentRow, ExportFilters, NormalizedRecord, ProgramRow};

const SCHEMA: &str = include_str!("schema.sql");

/// A row that may own imported records (university or establishment).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ParentEntry {
    pub id: i64,
    pub nom: String,
}

/// An existing child row considered during duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ExistingRow {
    pub id: i64,
    pub nom: String,
    pub code: Option<String>,
    pub parent_id: i64,
}

/// Handle on the portal database.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to `database_url` (e.g. `sqlite://campusload.db`), creating the
    /// file if needed, and apply the schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    /// Private in-memory database with the schema applied.
    ///
    /// The pool holds exactly one connection for its whole life, since every
    /// SQLite in-memory connection is a separate database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply `schema.sql`. Idempotent.
    pub async fn apply_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Schema(format!("{}: {}", first_line(statement), e)))?;
        }
        Ok(())
    }

    /// Open the transaction for one import call.
    pub async fn begin(&self) -> StoreResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // -------------------------------------------------------------------------
    // Reads used by exports
    // -------------------------------------------------------------------------

    /// Establishments matching `filters`, ordered by name (accents and case
    /// ignored), then id.
    pub async fn list_establishments(
        &self,
        filters: &ExportFilters,
    ) -> StoreResult<Vec<EstablishmentRow>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT e.id, e.nom, e.code, e.adresse, e.contact, e.email, e.telephone, \
             e.site_web, e.image, e.university_id, u.nom AS university_name \
             FROM etablissement e \
             LEFT JOIN university u ON e.university_id = u.id \
             WHERE 1=1",
        );

        if let Some(university_id) = filters.institution_id {
            query.push(" AND e.university_id = ").push_bind(university_id);
        }

        let mut rows = query
            .build_query_as::<EstablishmentRow>()
            .fetch_all(&self.pool)
            .await?;
        if let Some(term) = filters.search_term() {
            let term = fold(term);
            rows.retain(|r| matches_search(&term, &r.nom, r.code.as_deref()));
        }
        rows.sort_by_cached_key(|r| (fold_accents(&r.nom), r.id));
        Ok(rows)
    }

    /// Programs matching `filters`, ordered like [`Store::list_establishments`].
    pub async fn list_programs(&self, filters: &ExportFilters) -> StoreResult<Vec<ProgramRow>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT f.id, f.nom, f.code, f.etablissement_id, \
             e.nom AS etablissement_nom, e.university_id AS university_id, \
             u.nom AS universite_nom \
             FROM filiere f \
             LEFT JOIN etablissement e ON f.etablissement_id = e.id \
             LEFT JOIN university u ON e.university_id = u.id \
             WHERE 1=1",
        );

        if let Some(etablissement_id) = filters.institution_id {
            query.push(" AND f.etablissement_id = ").push_bind(etablissement_id);
        }

        let mut rows = query.build_query_as::<ProgramRow>().fetch_all(&self.pool).await?;
        if let Some(term) = filters.search_term() {
            let term = fold(term);
            rows.retain(|r| matches_search(&term, &r.nom, r.code.as_deref()));
        }
        rows.sort_by_cached_key(|r| (fold_accents(&r.nom), r.id));
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Seeding (CLI and tests)
    // -------------------------------------------------------------------------

    pub async fn create_university(&self, nom: &str) -> StoreResult<i64> {
        let result = sqlx::query("INSERT INTO university (nom) VALUES (?)")
            .bind(nom)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn create_establishment(&self, nom: &str, university_id: i64) -> StoreResult<i64> {
        let result = sqlx::query("INSERT INTO etablissement (nom, university_id) VALUES (?, ?)")
            .bind(nom)
            .bind(university_id)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Row count of the table backing `kind`.
    pub async fn count(&self, kind: EntityKind) -> StoreResult<i64> {
        let sql = match kind {
            EntityKind::Establishment => "SELECT COUNT(*) FROM etablissement",
            EntityKind::Program => "SELECT COUNT(*) FROM filiere",
        };
        Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool).await?)
    }
}

/// `folded_term` is a substring of the folded name or code. SQLite `LIKE`
/// folds ASCII only and treats `_` and `%` as wildcards, so this runs here.
fn matches_search(folded_term: &str, nom: &str, code: Option<&str>) -> bool {
    fold(nom).contains(folded_term) || code.is_some_and(|c| fold(c).contains(folded_term))
}

fn first_line(statement: &str) -> &str {
    statement
        .lines()
        .find(|l| !l.trim_start().starts_with("--") && !l.trim().is_empty())
        .unwrap_or(statement)
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Every row that can own a record of `kind`, in id order.
pub async fn load_parents(
    conn: &mut SqliteConnection,
    kind: EntityKind,
) -> StoreResult<Vec<ParentEntry>> {
    let sql = match kind {
        EntityKind::Establishment => "SELECT id, nom FROM university ORDER BY id",
        EntityKind::Program => "SELECT id, nom FROM etablissement ORDER BY id",
    };
    Ok(sqlx::query_as::<_, ParentEntry>(sql).fetch_all(&mut *conn).await?)
}

/// Rows that could collide with a record under `parent_id`: every row of the
/// same parent, plus (for programs) rows carrying the same folded code
/// anywhere.
pub async fn find_candidates(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    parent_id: i64,
    code: Option<&str>,
) -> StoreResult<Vec<ExistingRow>> {
    let rows: Vec<ExistingRow> = match kind {
        EntityKind::Establishment => {
            sqlx::query_as::<_, ExistingRow>(
                "SELECT id, nom, code, university_id AS parent_id \
                 FROM etablissement WHERE university_id = ? ORDER BY id",
            )
            .bind(parent_id)
            .fetch_all(&mut *conn)
            .await?
        }
        EntityKind::Program => {
            let rows = sqlx::query_as::<_, ExistingRow>(
                "SELECT id, nom, code, etablissement_id AS parent_id \
                 FROM filiere \
                 WHERE etablissement_id = ? OR (? AND code IS NOT NULL) \
                 ORDER BY id",
            )
            .bind(parent_id)
            .bind(code.is_some())
            .fetch_all(&mut *conn)
            .await?;

            // Codes are compared here: SQLite `LOWER` leaves "É" unchanged.
            let code = code.map(fold);
            rows.into_iter()
                .filter(|row| {
                    row.parent_id == parent_id
                        || (code.is_some() && row.code.as_deref().map(fold) == code)
                })
                .collect()
        }
    };
    Ok(rows)
}

/// Insert a record under `parent_id`; returns the new id.
pub async fn insert_record(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    parent_id: i64,
    record: &NormalizedRecord,
) -> StoreResult<i64> {
    let result = match kind {
        EntityKind::Establishment => {
            sqlx::query(
                "INSERT INTO etablissement \
                 (nom, code, adresse, contact, email, telephone, site_web, image, university_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.name)
            .bind(&record.code)
            .bind(&record.address)
            .bind(&record.contact)
            .bind(&record.email)
            .bind(&record.phone)
            .bind(&record.website)
            .bind(&record.image_url)
            .bind(parent_id)
            .execute(&mut *conn)
            .await?
        }
        EntityKind::Program => {
            sqlx::query("INSERT INTO filiere (nom, code, etablissement_id) VALUES (?, ?, ?)")
                .bind(&record.name)
                .bind(&record.code)
                .bind(parent_id)
                .execute(&mut *conn)
                .await?
        }
    };
    Ok(result.last_insert_rowid())
}

/// Overwrite row `id` with the record's values.
pub async fn update_record(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    id: i64,
    parent_id: i64,
    record: &NormalizedRecord,
) -> StoreResult<()> {
    match kind {
        EntityKind::Establishment => {
            sqlx::query(
                "UPDATE etablissement SET nom = ?, code = ?, adresse = ?, contact = ?, \
                 email = ?, telephone = ?, site_web = ?, image = ?, university_id = ? \
                 WHERE id = ?",
            )
            .bind(&record.name)
            .bind(&record.code)
            .bind(&record.address)
            .bind(&record.contact)
            .bind(&record.email)
            .bind(&record.phone)
            .bind(&record.website)
            .bind(&record.image_url)
            .bind(parent_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        }
        EntityKind::Program => {
            sqlx::query("UPDATE filiere SET nom = ?, code = ?, etablissement_id = ? WHERE id = ?")
                .bind(&record.name)
                .bind(&record.code)
                .bind(parent_id)
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}
