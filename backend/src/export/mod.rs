//! Exporter.
//!
//! Narrows the requested fields to the entity's allow-list, reads the matching
//! rows from the store (already filtered and ordered by name) and renders them
//! as a workbook, delimited text or JSON. Also serves the import templates.

use chrono::{Local, NaiveDate};
use serde_json::{Map, Value};

use crate::api::logs::log_info;
use crate::codec::{encode_csv, encode_xlsx, CellValue, ColumnSpec};
use crate::entity::{EntityProfile, ExportColumn};
use crate::error::{ExportError, ExportResult};
use crate::models::{EntityKind, EstablishmentRow, ExportFormat, ExportSpec, ProgramRow};
use crate::store::Store;

/// Column layout plus ordered rows, before encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportTable {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ExportTable {
    /// Array of objects keyed by column key.
    pub fn to_json(&self) -> Value {
        let records = self
            .rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        let value = row.get(i).map(CellValue::to_json).unwrap_or(Value::Null);
                        (column.key.clone(), value)
                    })
                    .collect();
                Value::Object(object)
            })
            .collect();
        Value::Array(records)
    }
}

/// Encoded export ready to be downloaded.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
}

/// Narrow `fields` to the allow-list, keeping request order and dropping
/// repeats; append the derived display columns when the parent id is kept.
pub fn select_columns(profile: &EntityProfile, fields: &[String]) -> ExportResult<Vec<ExportColumn>> {
    if fields.iter().all(|f| f.trim().is_empty()) {
        return Err(ExportError::NoFields);
    }

    let mut selected: Vec<ExportColumn> = Vec::new();
    for field in fields {
        if let Some(column) = profile.export_column(field.trim()) {
            if !selected.iter().any(|c| c.key == column.key) {
                selected.push(*column);
            }
        }
    }

    if selected.is_empty() {
        return Err(ExportError::NoValidFields);
    }
    if selected.iter().any(|c| c.key == profile.parent_key) {
        selected.extend(profile.derived_columns.iter().copied());
    }
    Ok(selected)
}

/// Every allow-listed key, in default order.
pub fn default_fields(profile: &EntityProfile) -> Vec<String> {
    profile.export_columns.iter().map(|c| c.key.to_string()).collect()
}

fn establishment_cell(row: &EstablishmentRow, key: &str) -> CellValue {
    match key {
        "id" => Some(row.id).into(),
        "nom" => CellValue::Text(row.nom.clone()),
        "code" => row.code.clone().into(),
        "adresse" => row.adresse.clone().into(),
        "contact" => row.contact.clone().into(),
        "email" => row.email.clone().into(),
        "telephone" => row.telephone.clone().into(),
        "site_web" => row.site_web.clone().into(),
        "image" => row.image.clone().into(),
        "university_id" => Some(row.university_id).into(),
        "university_name" => row.university_name.clone().into(),
        _ => CellValue::Empty,
    }
}

fn program_cell(row: &ProgramRow, key: &str) -> CellValue {
    match key {
        "id" => Some(row.id).into(),
        "nom" => CellValue::Text(row.nom.clone()),
        "code" => row.code.clone().into(),
        "etablissement_id" => Some(row.etablissement_id).into(),
        "etablissement_nom" => row.etablissement_nom.clone().into(),
        "universite_nom" => row.universite_nom.clone().into(),
        "university_id" => row.university_id.into(),
        _ => CellValue::Empty,
    }
}

/// Query the store and lay the rows out under the selected columns.
pub async fn export_table(store: &Store, kind: EntityKind, spec: &ExportSpec) -> ExportResult<ExportTable> {
    let profile = kind.profile();
    let selected = select_columns(profile, &spec.fields)?;
    let columns: Vec<ColumnSpec> = selected
        .iter()
        .map(|c| ColumnSpec::new(c.header, c.key, c.width))
        .collect();

    let rows: Vec<Vec<CellValue>> = match kind {
        EntityKind::Establishment => store
            .list_establishments(&spec.filters)
            .await?
            .iter()
            .map(|row| selected.iter().map(|c| establishment_cell(row, c.key)).collect())
            .collect(),
        EntityKind::Program => store
            .list_programs(&spec.filters)
            .await?
            .iter()
            .map(|row| selected.iter().map(|c| program_cell(row, c.key)).collect())
            .collect(),
    };

    log_info(format!("📤 Exporting {} {} with {} columns", rows.len(), kind, columns.len()));
    Ok(ExportTable { columns, rows })
}

/// Download name, e.g. `etablissements_export_2024-05-01.xlsx`.
pub fn export_filename(profile: &EntityProfile, format: ExportFormat, date: NaiveDate) -> String {
    format!("{}_export_{}.{}", profile.file_stem, date.format("%Y-%m-%d"), format.extension())
}

/// Encode a table in the requested format.
pub fn render(
    table: &ExportTable,
    profile: &EntityProfile,
    format: ExportFormat,
    date: NaiveDate,
) -> ExportResult<ExportArtifact> {
    let bytes = match format {
        ExportFormat::Xlsx => encode_xlsx(profile.sheet_name, &table.columns, &table.rows)?,
        ExportFormat::Csv => encode_csv(&table.columns, &table.rows)?,
        ExportFormat::Json => serde_json::to_vec_pretty(&table.to_json())?,
    };
    Ok(ExportArtifact {
        bytes,
        content_type: format.content_type(),
        filename: export_filename(profile, format, date),
    })
}

/// Full export: select, query, encode.
pub async fn export(
    store: &Store,
    kind: EntityKind,
    spec: &ExportSpec,
    format: ExportFormat,
) -> ExportResult<ExportArtifact> {
    let table = export_table(store, kind, spec).await?;
    render(&table, kind.profile(), format, Local::now().date_naive())
}

/// CSV import template: canonical headers and one example row.
pub fn template(kind: EntityKind) -> ExportResult<ExportArtifact> {
    let profile = kind.profile();
    let columns: Vec<ColumnSpec> = profile
        .template_headers
        .iter()
        .map(|h| ColumnSpec::new(*h, *h, 20.0))
        .collect();
    let example: Vec<CellValue> = profile
        .template_example
        .iter()
        .map(|v| if v.is_empty() { CellValue::Empty } else { CellValue::Text(v.to_string()) })
        .collect();

    Ok(ExportArtifact {
        bytes: encode_csv(&columns, &[example])?,
        content_type: ExportFormat::Csv.content_type(),
        filename: format!("modele_{}.csv", profile.file_stem),
    })
}
