//! Header mapper.
//!
//! Recognizes the header row of an uploaded sheet and maps semantic fields to
//! 1-based column indices. Matching ignores case, accents, underscores and
//! repeated whitespace, and accepts the synonyms declared by the entity
//! profile (`"Téléphone"`, `"telephone"` and `"TELEPHONE"` are the same column).
//!
//! A missing required column fails the whole import before any data row is
//! read.

use std::collections::{BTreeMap, HashSet};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::entity::EntityProfile;
use crate::error::MappingError;
use crate::models::Field;

/// Case-insensitive comparison key for names and codes. Accents are kept.
pub fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Lowercase `value` with accents stripped: `"École"` and `"ecole"` fold to
/// the same string.
pub fn fold_accents(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Canonical form of a header label: accents stripped, lowercase, `_` read as
/// a space, whitespace collapsed, trailing required-markers removed.
pub fn normalize_header(raw: &str) -> String {
    let folded = fold_accents(raw).replace('_', " ");

    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| c == '*' || c == ':')
        .trim_end()
        .to_string()
}

/// Semantic field → 1-based column index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    columns: BTreeMap<Field, usize>,
}

impl FieldMap {
    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    /// Mapped fields in field order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, usize)> + '_ {
        self.columns.iter().map(|(field, col)| (*field, *col))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Map a header row for the given entity.
///
/// For each field, synonyms are tried in declared order and the first column
/// carrying that spelling wins; a column is never assigned to two fields.
/// Unrecognized columns are ignored.
pub fn map_headers(headers: &[String], profile: &EntityProfile) -> Result<FieldMap, MappingError> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut columns = BTreeMap::new();

    for spec in profile.fields {
        let found = spec.synonyms.iter().find_map(|synonym| {
            normalized
                .iter()
                .enumerate()
                .find(|(idx, header)| header.as_str() == *synonym && !claimed.contains(idx))
                .map(|(idx, _)| idx)
        });

        if let Some(idx) = found {
            claimed.insert(idx);
            columns.insert(spec.field, idx + 1);
        }
    }

    for field in profile.required {
        if !columns.contains_key(field) {
            return Err(MappingError::MissingColumn {
                column: profile.label(*field).to_string(),
            });
        }
    }

    Ok(FieldMap { columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ESTABLISHMENTS, PROGRAMS};

    fn headers(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Téléphone "), "telephone");
        assert_eq!(normalize_header("TELEPHONE"), "telephone");
        assert_eq!(normalize_header("site_web"), "site web");
        assert_eq!(normalize_header("Nom   Université"), "nom universite");
        assert_eq!(normalize_header("Nom *"), "nom");
        assert_eq!(normalize_header("ID Établissement"), "id etablissement");
    }

    #[test]
    fn test_fold_accents() {
        assert_eq!(fold_accents("École Sud"), "ecole sud");
        assert_eq!(fold_accents("ÉCO1"), fold_accents("éco1"));
        assert!(fold_accents("École") < fold_accents("Fac"));
        assert_eq!(fold(" ÉCO1 "), "éco1");
    }

    #[test]
    fn test_phone_spellings_map_to_same_field() {
        for label in ["Téléphone", "telephone", "TELEPHONE"] {
            let map = map_headers(&headers(&["Nom", "Université", label]), &ESTABLISHMENTS).unwrap();
            assert_eq!(map.get(Field::Phone), Some(3), "{}", label);
        }
    }

    #[test]
    fn test_establishment_template_headers() {
        let map = map_headers(&headers(ESTABLISHMENTS.template_headers), &ESTABLISHMENTS).unwrap();
        assert_eq!(map.len(), 9);
        assert_eq!(map.get(Field::Name), Some(1));
        assert_eq!(map.get(Field::Website), Some(7));
        assert_eq!(map.get(Field::Parent), Some(9));
    }

    #[test]
    fn test_name_column_preferred_over_id_column() {
        // Layout produced by an establishment export with the university selected.
        let map = map_headers(
            &headers(&["ID", "Nom", "ID Université", "Nom Université"]),
            &ESTABLISHMENTS,
        )
        .unwrap();
        assert_eq!(map.get(Field::Parent), Some(4));
        assert_eq!(map.get(Field::Name), Some(2));
    }

    #[test]
    fn test_program_prefers_establishment_id() {
        let map = map_headers(
            &headers(&["ID", "Nom", "Code", "ID Établissement", "Établissement", "Université"]),
            &PROGRAMS,
        )
        .unwrap();
        assert_eq!(map.get(Field::Parent), Some(4));
        assert!(!map.contains(Field::Phone));
    }

    #[test]
    fn test_program_accepts_snake_case_parent() {
        let map = map_headers(&headers(&["nom", "code", "etablissement_id"]), &PROGRAMS).unwrap();
        assert_eq!(map.get(Field::Parent), Some(3));
    }

    #[test]
    fn test_missing_required_column_names_it() {
        let err = map_headers(&headers(&["Nom", "Code"]), &ESTABLISHMENTS).unwrap_err();
        assert_eq!(err.to_string(), "Missing required column \"Nom Université\"");

        let err = map_headers(&headers(&["Nom", "Établissement"]), &PROGRAMS).unwrap_err();
        assert!(err.to_string().contains("\"Code\""));
    }

    #[test]
    fn test_empty_header_row() {
        let err = map_headers(&[], &ESTABLISHMENTS).unwrap_err();
        assert!(err.to_string().contains("\"Nom\""));
    }
}
