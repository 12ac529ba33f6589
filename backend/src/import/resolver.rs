//! Resolution engine.
//!
//! Decides, for each validated record, whether it is inserted, updated,
//! skipped or rejected. Resolution reads the store through the import
//! transaction, so a record sees every write made for the rows before it.

use sqlx::sqlite::SqliteConnection;

use crate::entity::{ConflictPolicy, DuplicateKey, EntityProfile};
use crate::error::StoreResult;
use crate::mapping::fold;
use crate::models::{NormalizedRecord, ResolvedOperation};
use crate::store::{self, ExistingRow, ParentEntry};

/// Outcome of looking up a parent reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLookup {
    Found(i64),
    NotFound,
    /// Several parents share the referenced name.
    Ambiguous(Vec<i64>),
}

/// Every candidate parent of a batch.
///
/// Imports never create or rename parents, so the directory is loaded once
/// per call.
#[derive(Debug, Clone, Default)]
pub struct ParentDirectory {
    entries: Vec<ParentEntry>,
}

impl ParentDirectory {
    pub fn new(entries: Vec<ParentEntry>) -> Self {
        Self { entries }
    }

    /// Resolve a sheet reference: exact name (ignoring case and surrounding
    /// whitespace) first, then numeric id.
    pub fn lookup(&self, reference: &str) -> ParentLookup {
        let key = fold(reference);
        let by_name: Vec<i64> = self
            .entries
            .iter()
            .filter(|entry| fold(&entry.nom) == key)
            .map(|entry| entry.id)
            .collect();

        match by_name.len() {
            1 => return ParentLookup::Found(by_name[0]),
            0 => {}
            _ => return ParentLookup::Ambiguous(by_name),
        }

        match reference.trim().parse::<i64>() {
            Ok(id) if self.entries.iter().any(|entry| entry.id == id) => ParentLookup::Found(id),
            _ => ParentLookup::NotFound,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-call resolver bound to one entity profile.
pub struct Resolver {
    profile: &'static EntityProfile,
    parents: ParentDirectory,
}

impl Resolver {
    pub fn new(profile: &'static EntityProfile, parents: ParentDirectory) -> Self {
        Self { profile, parents }
    }

    /// Load the parent directory through the import transaction.
    pub async fn load(
        conn: &mut SqliteConnection,
        profile: &'static EntityProfile,
    ) -> StoreResult<Self> {
        let entries = store::load_parents(conn, profile.kind).await?;
        Ok(Self::new(profile, ParentDirectory::new(entries)))
    }

    pub fn parents(&self) -> &ParentDirectory {
        &self.parents
    }

    /// Decide what to do with one record.
    ///
    /// Business-rule failures come back as [`ResolvedOperation::Reject`];
    /// only store failures are errors.
    pub async fn resolve(
        &self,
        conn: &mut SqliteConnection,
        record: NormalizedRecord,
    ) -> StoreResult<ResolvedOperation> {
        let row = record.row;
        let Some(reference) = record.parent.clone() else {
            return Ok(ResolvedOperation::Reject {
                row,
                reasons: vec![format!("{} is required", self.profile.parent_noun)],
            });
        };

        let parent_id = match self.parents.lookup(&reference) {
            ParentLookup::Found(id) => id,
            ParentLookup::NotFound => {
                return Ok(ResolvedOperation::Reject {
                    row,
                    reasons: vec![format!(
                        "{} \"{}\" not found for \"{}\"",
                        self.profile.parent_noun, reference, record.name
                    )],
                });
            }
            ParentLookup::Ambiguous(ids) => {
                return Ok(ResolvedOperation::Reject {
                    row,
                    reasons: vec![format!(
                        "{} \"{}\" is ambiguous ({} matches) for \"{}\"",
                        self.profile.parent_noun,
                        reference,
                        ids.len(),
                        record.name
                    )],
                });
            }
        };

        let candidates =
            store::find_candidates(conn, self.profile.kind, parent_id, record.code.as_deref())
                .await?;

        let existing = match find_duplicate(self.profile.duplicate_key, &candidates, parent_id, &record) {
            Some(existing) => existing.id,
            None => return Ok(ResolvedOperation::Insert { parent_id, record }),
        };

        Ok(match self.profile.conflict_policy {
            ConflictPolicy::Skip => ResolvedOperation::Skip {
                row,
                reason: format!("{} \"{}\" already exists", self.profile.noun, record.name),
            },
            ConflictPolicy::Update => ResolvedOperation::Update {
                existing_id: existing,
                parent_id,
                record,
            },
        })
    }
}

/// Pick the existing row a record collides with, if any.
///
/// A code match wins over a name match so that a renamed program keeps its
/// identity.
pub fn find_duplicate<'a>(
    key: DuplicateKey,
    candidates: &'a [ExistingRow],
    parent_id: i64,
    record: &NormalizedRecord,
) -> Option<&'a ExistingRow> {
    let name = fold(&record.name);
    let by_name = || {
        candidates
            .iter()
            .find(|c| c.parent_id == parent_id && fold(&c.nom) == name)
    };

    match key {
        DuplicateKey::NameWithinParent => by_name(),
        DuplicateKey::CodeOrNameWithinParent => {
            let by_code = record.code.as_deref().map(fold).and_then(|code| {
                candidates
                    .iter()
                    .find(|c| c.code.as_deref().map(fold).as_deref() == Some(code.as_str()))
            });
            by_code.or_else(by_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> ParentDirectory {
        ParentDirectory::new(vec![
            ParentEntry { id: 1, nom: "Université de Lille".into() },
            ParentEntry { id: 2, nom: "Université Paris Cité".into() },
            ParentEntry { id: 3, nom: "Institut Polytechnique".into() },
            ParentEntry { id: 4, nom: "institut polytechnique ".into() },
            ParentEntry { id: 42, nom: "7".into() },
        ])
    }

    fn existing(id: i64, nom: &str, code: Option<&str>, parent_id: i64) -> ExistingRow {
        ExistingRow { id, nom: nom.into(), code: code.map(String::from), parent_id }
    }

    #[test]
    fn test_lookup_by_name_ignores_case() {
        assert_eq!(directory().lookup("  université de LILLE"), ParentLookup::Found(1));
    }

    #[test]
    fn test_lookup_falls_back_to_id() {
        assert_eq!(directory().lookup("2"), ParentLookup::Found(2));
        assert_eq!(directory().lookup("99"), ParentLookup::NotFound);
        // A parent literally named "7" is matched by name, not id.
        assert_eq!(directory().lookup("7"), ParentLookup::Found(42));
    }

    #[test]
    fn test_lookup_reports_ambiguity() {
        assert_eq!(
            directory().lookup("Institut Polytechnique"),
            ParentLookup::Ambiguous(vec![3, 4])
        );
    }

    #[test]
    fn test_lookup_unknown_name() {
        assert_eq!(directory().lookup("Sorbonne"), ParentLookup::NotFound);
    }

    #[test]
    fn test_name_duplicate_is_scoped_to_parent() {
        let record = NormalizedRecord { row: 1, name: "IUT Nord".into(), ..Default::default() };
        let candidates = vec![existing(10, "iut nord", None, 2)];
        assert!(find_duplicate(DuplicateKey::NameWithinParent, &candidates, 1, &record).is_none());
        assert_eq!(
            find_duplicate(DuplicateKey::NameWithinParent, &candidates, 2, &record).map(|c| c.id),
            Some(10)
        );
    }

    #[test]
    fn test_code_match_beats_name_match() {
        let record = NormalizedRecord {
            row: 1,
            name: "Licence Info".into(),
            code: Some("linf".into()),
            ..Default::default()
        };
        let candidates = vec![
            existing(5, "Licence Info", Some("OTHER"), 1),
            existing(9, "Old name", Some("LINF"), 3),
        ];
        let found = find_duplicate(DuplicateKey::CodeOrNameWithinParent, &candidates, 1, &record);
        assert_eq!(found.map(|c| c.id), Some(9));
    }

    #[test]
    fn test_program_falls_back_to_name_within_parent() {
        let record = NormalizedRecord {
            row: 1,
            name: "Licence Info".into(),
            code: Some("NEW".into()),
            ..Default::default()
        };
        let candidates = vec![existing(5, "LICENCE INFO", Some("OLD"), 1)];
        let found = find_duplicate(DuplicateKey::CodeOrNameWithinParent, &candidates, 1, &record);
        assert_eq!(found.map(|c| c.id), Some(5));
    }
}
