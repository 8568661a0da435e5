use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

#[derive(thiserror::Error, Debug)]
pub enum PartyFileError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("unable to read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid JSON format in file {path}: {source}")]
    InvalidJson {
        path: String,
        source: serde_json::Error,
    },
    #[error("entitled party must be a JSON object")]
    NotAnObject,
    #[error("entitled party is missing required field '{0}'")]
    MissingField(&'static str),
}

/// An entitled party as read from disk. The schema is owned by the
/// satellite, so everything besides the identifying fields stays untyped.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitledParty {
    fields: Map<String, Value>,
}

impl EntitledParty {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PartyFileError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let content = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                PartyFileError::NotFound(display.clone())
            } else {
                PartyFileError::Unreadable {
                    path: display.clone(),
                    source,
                }
            }
        })?;

        let value: Value =
            serde_json::from_slice(&content).map_err(|source| PartyFileError::InvalidJson {
                path: display,
                source,
            })?;

        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PartyFileError> {
        let fields = match value {
            Value::Object(fields) => fields,
            _ => return Err(PartyFileError::NotAnObject),
        };

        let party = Self { fields };
        party.required_str("party_id")?;
        party.required_str("party_name")?;

        Ok(party)
    }

    fn required_str(&self, field: &'static str) -> Result<&str, PartyFileError> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(PartyFileError::MissingField(field))
    }

    pub fn party_id(&self) -> &str {
        self.fields
            .get("party_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn party_name(&self) -> &str {
        self.fields
            .get("party_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn capability_url(&self) -> Result<&str, PartyFileError> {
        self.required_str("capability_url")
    }

    /// Attaches the signed SPOR request and our own id as registrar.
    pub fn attach_registration(&mut self, spor_token: &str, registrar_id: &str) {
        let mut spor = Map::new();
        spor.insert(
            "signed_request".to_owned(),
            Value::String(spor_token.to_owned()),
        );

        self.fields.insert("spor".to_owned(), Value::Object(spor));
        self.fields.insert(
            "registrar_id".to_owned(),
            Value::String(registrar_id.to_owned()),
        );
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// JSON files directly inside `dir`, sorted by file name.
pub fn list_party_files(dir: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if path.is_file() && is_json {
            files.push(path);
        }
    }

    files.sort();

    Ok(files)
}
