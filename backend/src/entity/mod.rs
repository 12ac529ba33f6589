//! Per-entity import/export strategy.
//!
//! Establishments and programs share one pipeline. Everything that differs
//! between them (recognized headers, required columns, what a duplicate is,
//! what happens to a duplicate, how strict row validation is, which columns
//! can be exported) lives in a static [`EntityProfile`] selected once per call.

use crate::models::{EntityKind, ExportFormat, Field};

/// What to do with a record that already exists in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Leave the existing row alone and count the record as skipped.
    Skip,
    /// Overwrite the existing row with the record's values.
    Update,
}

/// How row validation failures affect the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Any invalid row rejects the whole file before the store is touched.
    FailClosed,
    /// Invalid rows are reported individually; valid rows still import.
    PerRow,
}

/// Natural key used to find an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKey {
    /// Same name (case-insensitive) under the same parent.
    NameWithinParent,
    /// Same code anywhere, or same name under the same parent.
    CodeOrNameWithinParent,
}

/// A recognizable column: its semantic field, the label shown to users, and
/// the header spellings accepted for it, in priority order.
///
/// Synonyms are stored in normalized form (see [`crate::mapping::normalize_header`]).
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub label: &'static str,
    pub synonyms: &'static [&'static str],
}

/// An exportable column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportColumn {
    /// Store column name, also the key accepted in export requests.
    pub key: &'static str,
    pub header: &'static str,
    pub width: f64,
}

/// Strategy object for one entity type.
#[derive(Debug)]
pub struct EntityProfile {
    pub kind: EntityKind,
    /// Singular noun used in messages.
    pub noun: &'static str,
    /// Singular noun of the owning entity.
    pub parent_noun: &'static str,
    pub sheet_name: &'static str,
    pub file_stem: &'static str,
    pub fields: &'static [FieldSpec],
    pub required: &'static [Field],
    pub conflict_policy: ConflictPolicy,
    pub validation_policy: ValidationPolicy,
    pub duplicate_key: DuplicateKey,
    /// Allow-list of selectable export columns, in default order.
    pub export_columns: &'static [ExportColumn],
    /// Key of the column holding the parent id.
    pub parent_key: &'static str,
    /// Display columns appended when the parent id column is selected.
    pub derived_columns: &'static [ExportColumn],
    pub default_export_format: ExportFormat,
    pub template_headers: &'static [&'static str],
    pub template_example: &'static [&'static str],
}

impl EntityProfile {
    /// Column spec for a semantic field, if this entity recognizes it.
    pub fn field_spec(&self, field: Field) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.field == field)
    }

    /// Label shown to users for a field.
    pub fn label(&self, field: Field) -> &'static str {
        self.field_spec(field)
            .map(|spec| spec.label)
            .unwrap_or_else(|| field.as_str())
    }

    /// Look up an allow-listed export column by key.
    pub fn export_column(&self, key: &str) -> Option<&ExportColumn> {
        self.export_columns.iter().find(|c| c.key == key)
    }
}

impl EntityKind {
    /// Strategy for this entity type.
    pub fn profile(&self) -> &'static EntityProfile {
        match self {
            EntityKind::Establishment => &ESTABLISHMENTS,
            EntityKind::Program => &PROGRAMS,
        }
    }
}

// =============================================================================
// Establishments
// =============================================================================

pub static ESTABLISHMENTS: EntityProfile = EntityProfile {
    kind: EntityKind::Establishment,
    noun: "establishment",
    parent_noun: "university",
    sheet_name: "Établissements",
    file_stem: "etablissements",
    fields: &[
        FieldSpec { field: Field::Name, label: "Nom", synonyms: &["nom", "name"] },
        FieldSpec { field: Field::Code, label: "Code", synonyms: &["code", "code etablissement"] },
        FieldSpec { field: Field::Address, label: "Adresse", synonyms: &["adresse", "address"] },
        FieldSpec { field: Field::Contact, label: "Contact", synonyms: &["contact"] },
        FieldSpec { field: Field::Email, label: "Email", synonyms: &["email", "e-mail", "mail"] },
        FieldSpec {
            field: Field::Phone,
            label: "Téléphone",
            synonyms: &["telephone", "tel", "phone"],
        },
        FieldSpec {
            field: Field::Website,
            label: "Site Web",
            synonyms: &["site web", "siteweb", "website"],
        },
        FieldSpec { field: Field::ImageUrl, label: "Image URL", synonyms: &["image", "image url"] },
        FieldSpec {
            field: Field::Parent,
            label: "Nom Université",
            synonyms: &[
                "nom universite",
                "universite",
                "universite id",
                "id universite",
                "university",
            ],
        },
    ],
    required: &[Field::Name, Field::Parent],
    conflict_policy: ConflictPolicy::Skip,
    validation_policy: ValidationPolicy::FailClosed,
    duplicate_key: DuplicateKey::NameWithinParent,
    export_columns: &[
        ExportColumn { key: "id", header: "ID", width: 20.0 },
        ExportColumn { key: "nom", header: "Nom", width: 20.0 },
        ExportColumn { key: "code", header: "Code", width: 20.0 },
        ExportColumn { key: "adresse", header: "Adresse", width: 20.0 },
        ExportColumn { key: "contact", header: "Contact", width: 20.0 },
        ExportColumn { key: "email", header: "Email", width: 20.0 },
        ExportColumn { key: "telephone", header: "Téléphone", width: 20.0 },
        ExportColumn { key: "site_web", header: "Site Web", width: 20.0 },
        ExportColumn { key: "image", header: "Image URL", width: 20.0 },
        ExportColumn { key: "university_id", header: "ID Université", width: 20.0 },
    ],
    parent_key: "university_id",
    derived_columns: &[ExportColumn {
        key: "university_name",
        header: "Nom Université",
        width: 20.0,
    }],
    default_export_format: ExportFormat::Xlsx,
    template_headers: &[
        "Nom",
        "Code",
        "Adresse",
        "Contact",
        "Email",
        "Téléphone",
        "Site Web",
        "Image URL",
        "Nom Université",
    ],
    template_example: &[
        "Exemple Établissement",
        "ETB001",
        "123 rue Exemple",
        "M. Contact",
        "contact@example.com",
        "123456789",
        "https://example.com",
        "",
        "Université Exemple",
    ],
};

// =============================================================================
// Programs
// =============================================================================

pub static PROGRAMS: EntityProfile = EntityProfile {
    kind: EntityKind::Program,
    noun: "program",
    parent_noun: "establishment",
    sheet_name: "Filières",
    file_stem: "filieres",
    fields: &[
        FieldSpec { field: Field::Name, label: "Nom", synonyms: &["nom", "name"] },
        FieldSpec { field: Field::Code, label: "Code", synonyms: &["code", "code filiere"] },
        FieldSpec {
            field: Field::Parent,
            label: "Établissement",
            synonyms: &[
                "id etablissement",
                "etablissement id",
                "etablissement",
                "nom etablissement",
                "establishment",
            ],
        },
    ],
    required: &[Field::Name, Field::Code, Field::Parent],
    conflict_policy: ConflictPolicy::Update,
    validation_policy: ValidationPolicy::PerRow,
    duplicate_key: DuplicateKey::CodeOrNameWithinParent,
    export_columns: &[
        ExportColumn { key: "id", header: "ID", width: 10.0 },
        ExportColumn { key: "nom", header: "Nom", width: 30.0 },
        ExportColumn { key: "code", header: "Code", width: 15.0 },
        ExportColumn { key: "etablissement_id", header: "ID Établissement", width: 15.0 },
    ],
    parent_key: "etablissement_id",
    derived_columns: &[
        ExportColumn { key: "etablissement_nom", header: "Établissement", width: 30.0 },
        ExportColumn { key: "universite_nom", header: "Université", width: 30.0 },
        ExportColumn { key: "university_id", header: "ID Université", width: 15.0 },
    ],
    default_export_format: ExportFormat::Json,
    template_headers: &["Nom", "Code", "Établissement"],
    template_example: &["Licence Informatique", "LINF", "Exemple Établissement"],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::normalize_header;

    #[test]
    fn test_synonyms_are_stored_normalized() {
        for profile in [&ESTABLISHMENTS, &PROGRAMS] {
            for spec in profile.fields {
                for synonym in spec.synonyms {
                    assert_eq!(normalize_header(synonym), *synonym);
                }
            }
        }
    }

    #[test]
    fn test_required_fields_are_recognized() {
        for profile in [&ESTABLISHMENTS, &PROGRAMS] {
            for field in profile.required {
                assert!(profile.field_spec(*field).is_some());
            }
        }
    }

    #[test]
    fn test_policies_differ_per_entity() {
        assert_eq!(ESTABLISHMENTS.conflict_policy, ConflictPolicy::Skip);
        assert_eq!(PROGRAMS.conflict_policy, ConflictPolicy::Update);
        assert_eq!(ESTABLISHMENTS.validation_policy, ValidationPolicy::FailClosed);
        assert_eq!(PROGRAMS.validation_policy, ValidationPolicy::PerRow);
    }

    #[test]
    fn test_template_rows_are_aligned() {
        for profile in [&ESTABLISHMENTS, &PROGRAMS] {
            assert_eq!(profile.template_headers.len(), profile.template_example.len());
        }
    }

    #[test]
    fn test_parent_key_is_exportable() {
        for profile in [&ESTABLISHMENTS, &PROGRAMS] {
            assert!(profile.export_column(profile.parent_key).is_some());
        }
    }
}
