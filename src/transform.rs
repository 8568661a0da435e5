use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

pub const REQUIRED_FIELDS: [&str; 10] = [
    "party_id",
    "party_name",
    "start_date",
    "end_date",
    "ToU_sign_date",
    "ToU_expiry_date",
    "ToU_agreement_file",
    "AA_sign_date",
    "AA_expiry_date",
    "AA_agreement_file",
];

pub const ADDITIONAL_INFO_FIELDS: [&str; 5] = [
    "description",
    "logo",
    "website",
    "company_phone",
    "company_email",
];

#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("template {path} is not valid JSON: {source}")]
    TemplateJson {
        path: String,
        source: serde_json::Error,
    },
    #[error("template must be a JSON object")]
    TemplateNotAnObject,
    #[error("error reading csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("unable to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

type Row = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRow {
    pub index: usize,
    pub party_id: String,
    pub party: Value,
}

impl TransformedRow {
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.index, self.party_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingField(&'static str),
    /// The party id cannot be used as part of a file name.
    UnsafePartyId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub index: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct Transformed {
    pub rows: Vec<TransformedRow>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Default)]
pub struct TransformReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<SkippedRow>,
}

fn field<'a>(row: &'a Row, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or_default()
}

fn missing_field(row: &Row) -> Option<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .find(|name| field(row, name).is_empty())
}

/// Party ids end up in output file names, so they must not contain path
/// separators or be a relative path component.
fn is_safe_party_id(party_id: &str) -> bool {
    !matches!(party_id, "." | "..")
        && !party_id
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
}

/// Fills in sign date, expiry date and agreement file for the agreement
/// types the csv knows about. Anything else is passed through.
pub fn map_agreement(agreement: &Value, row: &Row) -> Value {
    let prefix = match agreement.get("type").and_then(Value::as_str) {
        Some("TermsOfUse") => "ToU",
        Some("AccessionAgreement") => "AA",
        _ => return agreement.clone(),
    };

    let mut mapped = agreement.as_object().cloned().unwrap_or_default();
    for key in ["sign_date", "expiry_date", "agreement_file"] {
        mapped.insert(
            key.to_owned(),
            Value::from(field(row, &format!("{prefix}_{key}"))),
        );
    }

    Value::Object(mapped)
}

pub fn build_entitled_party(template: &Map<String, Value>, row: &Row) -> Value {
    let mut party = template.clone();

    party.insert("party_id".to_owned(), Value::from(field(row, "party_id")));
    party.insert("party_name".to_owned(), Value::from(field(row, "party_name")));

    let mut adherence = Map::new();
    adherence.insert("status".to_owned(), Value::from("Active"));
    adherence.insert("start_date".to_owned(), Value::from(field(row, "start_date")));
    adherence.insert("end_date".to_owned(), Value::from(field(row, "end_date")));
    party.insert("adherence".to_owned(), Value::Object(adherence));

    let mut additional_info = template
        .get("additional_info")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for name in ADDITIONAL_INFO_FIELDS {
        additional_info.insert(name.to_owned(), Value::from(field(row, name)));
    }
    party.insert(
        "additional_info".to_owned(),
        Value::Object(additional_info),
    );

    let agreements = template
        .get("agreements")
        .and_then(Value::as_array)
        .map(|agreements| {
            agreements
                .iter()
                .map(|agreement| map_agreement(agreement, row))
                .collect()
        })
        .unwrap_or_default();
    party.insert("agreements".to_owned(), Value::Array(agreements));

    Value::Object(party)
}

/// Turns semicolon separated rows into entitled party documents. Rows are
/// numbered from 1, skipped rows keep their number.
pub fn transform_rows<R: Read>(template: &Value, reader: R) -> Result<Transformed, TransformError> {
    let template = template
        .as_object()
        .ok_or(TransformError::TemplateNotAnObject)?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut transformed = Transformed::default();

    for (offset, record) in csv_reader.records().enumerate() {
        let index = offset + 1;
        let record = record?;

        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.to_owned(), value.to_owned()))
            .collect();

        if let Some(missing_field) = missing_field(&row) {
            tracing::warn!("{} not found for row #{} --- skipping row", missing_field, index);
            transformed.skipped.push(SkippedRow {
                index,
                reason: SkipReason::MissingField(missing_field),
            });
            continue;
        }

        let party_id = field(&row, "party_id").to_owned();
        if !is_safe_party_id(&party_id) {
            tracing::warn!(
                "party_id {:?} of row #{} is not usable as file name --- skipping row",
                party_id,
                index
            );
            transformed.skipped.push(SkippedRow {
                index,
                reason: SkipReason::UnsafePartyId(party_id),
            });
            continue;
        }
        tracing::info!("handling party: {}", party_id);

        transformed.rows.push(TransformedRow {
            index,
            party: build_entitled_party(template, &row),
            party_id,
        });
    }

    Ok(transformed)
}

fn to_pretty_json(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;

    Ok(out)
}

pub fn load_template(path: &Path) -> Result<Value, TransformError> {
    tracing::info!("loading template: {}", path.display());

    let content = std::fs::read(path).map_err(|source| TransformError::Read {
        path: path.display().to_string(),
        source,
    })?;

    serde_json::from_slice(&content).map_err(|source| TransformError::TemplateJson {
        path: path.display().to_string(),
        source,
    })
}

pub fn transform_csv(
    template_path: &Path,
    csv_path: &Path,
    output_dir: &Path,
) -> Result<TransformReport, TransformError> {
    let template = load_template(template_path)?;

    let csv_file = std::fs::File::open(csv_path).map_err(|source| TransformError::Read {
        path: csv_path.display().to_string(),
        source,
    })?;

    let transformed = transform_rows(&template, csv_file)?;

    std::fs::create_dir_all(output_dir).map_err(|source| TransformError::Write {
        path: output_dir.display().to_string(),
        source,
    })?;

    let mut report = TransformReport {
        skipped: transformed.skipped,
        ..Default::default()
    };

    for row in transformed.rows {
        let path = output_dir.join(row.file_name());
        tracing::info!("writing to entitled party json file: {}", path.display());

        std::fs::write(&path, to_pretty_json(&row.party)?).map_err(|source| {
            TransformError::Write {
                path: path.display().to_string(),
                source,
            }
        })?;

        report.written.push(path);
    }

    Ok(report)
}
