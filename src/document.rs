//! Document Helpers
//!
//! Sort specifications plus conversions between `serde_json` values and BSON
//! documents for callers that hold JSON.

use crate::error::{Result, SoraError};
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Sort direction for a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }

    /// The value MongoDB expects in a sort document
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

impl From<SortDirection> for Bson {
    fn from(direction: SortDirection) -> Self {
        Bson::Int32(direction.as_i32())
    }
}

impl TryFrom<&Bson> for SortDirection {
    type Error = SoraError;

    fn try_from(value: &Bson) -> Result<Self> {
        let direction = match value {
            Bson::Int32(1) | Bson::Int64(1) => Some(SortDirection::Ascending),
            Bson::Int32(-1) | Bson::Int64(-1) => Some(SortDirection::Descending),
            Bson::Double(d) if *d == 1.0 => Some(SortDirection::Ascending),
            Bson::Double(d) if *d == -1.0 => Some(SortDirection::Descending),
            Bson::String(s) => match s.to_ascii_lowercase().as_str() {
                "asc" | "ascending" => Some(SortDirection::Ascending),
                "desc" | "descending" => Some(SortDirection::Descending),
                _ => None,
            },
            _ => None,
        };

        direction.ok_or_else(|| {
            SoraError::Validation(format!(
                "sort direction must be 1, -1, \"asc\" or \"desc\", got {}",
                value
            ))
        })
    }
}

/// Sort order for `find`
///
/// Either an ordered list of `(field, direction)` pairs or a sort document
/// passed through to the server (which may also hold `{ "$meta": ... }`
/// entries).
#[derive(Debug, Clone, PartialEq)]
pub enum SortSpec {
    Fields(Vec<(String, SortDirection)>),
    Document(Document),
}

impl SortSpec {
    /// Sort on a single field
    pub fn by(field: impl Into<String>, direction: SortDirection) -> Self {
        SortSpec::Fields(vec![(field.into(), direction)])
    }

    /// Append a further sort key
    pub fn then(self, field: impl Into<String>, direction: SortDirection) -> Self {
        match self {
            SortSpec::Fields(mut fields) => {
                fields.push((field.into(), direction));
                SortSpec::Fields(fields)
            }
            SortSpec::Document(mut doc) => {
                let field: String = field.into();
                doc.insert(field, direction);
                SortSpec::Document(doc)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SortSpec::Fields(fields) => fields.is_empty(),
            SortSpec::Document(doc) => doc.is_empty(),
        }
    }

    /// Validate and render the sort document sent to the driver.
    ///
    /// String directions are normalized to `1` / `-1`; nested documents are
    /// kept as-is.
    pub fn to_document(&self) -> Result<Document> {
        let mut sort = Document::new();
        match self {
            SortSpec::Fields(fields) => {
                for (field, direction) in fields {
                    if field.is_empty() {
                        return Err(SoraError::Validation(
                            "sort field name cannot be empty".to_string(),
                        ));
                    }
                    sort.insert(field.clone(), *direction);
                }
            }
            SortSpec::Document(doc) => {
                for (field, value) in doc {
                    if field.is_empty() {
                        return Err(SoraError::Validation(
                            "sort field name cannot be empty".to_string(),
                        ));
                    }
                    match value {
                        Bson::Document(meta) => {
                            sort.insert(field.clone(), meta.clone());
                        }
                        other => {
                            sort.insert(field.clone(), SortDirection::try_from(other)?);
                        }
                    }
                }
            }
        }
        Ok(sort)
    }
}

impl From<Document> for SortSpec {
    fn from(doc: Document) -> Self {
        SortSpec::Document(doc)
    }
}

impl From<Vec<(String, SortDirection)>> for SortSpec {
    fn from(fields: Vec<(String, SortDirection)>) -> Self {
        SortSpec::Fields(fields)
    }
}

impl TryFrom<Bson> for SortSpec {
    type Error = SoraError;

    /// Accepts a document or an array of `[field, direction]` pairs.
    fn try_from(value: Bson) -> Result<Self> {
        match value {
            Bson::Document(doc) => Ok(SortSpec::Document(doc)),
            Bson::Array(items) => {
                let mut fields = Vec::with_capacity(items.len());
                for item in items {
                    fields.push(sort_pair(item)?);
                }
                Ok(SortSpec::Fields(fields))
            }
            other => Err(SoraError::Validation(format!(
                "sort parameter must be a document or a list of [field, direction] pairs, got {:?}",
                other.element_type()
            ))),
        }
    }
}

impl TryFrom<JsonValue> for SortSpec {
    type Error = SoraError;

    fn try_from(value: JsonValue) -> Result<Self> {
        let bson = Bson::try_from(value)
            .map_err(|e| SoraError::Serialization(format!("JSON to BSON error: {}", e)))?;
        SortSpec::try_from(bson)
    }
}

fn sort_pair(item: Bson) -> Result<(String, SortDirection)> {
    if let Bson::Array(pair) = &item {
        if let [Bson::String(field), direction] = pair.as_slice() {
            return Ok((field.clone(), SortDirection::try_from(direction)?));
        }
    }
    Err(SoraError::Validation(format!(
        "sort entries must be [field, direction] pairs, got {}",
        item
    )))
}

/// Convert a JSON object into a BSON document
///
/// Extended JSON forms such as `{"$oid": "..."}` are understood.
pub fn document_from_json(json: JsonValue) -> Result<Document> {
    if !json.is_object() {
        return Err(SoraError::Validation(
            "expected a JSON object for a document".to_string(),
        ));
    }

    let bson = Bson::try_from(json)
        .map_err(|e| SoraError::Serialization(format!("JSON to BSON error: {}", e)))?;

    match bson {
        Bson::Document(doc) => Ok(doc),
        _ => Err(SoraError::Serialization(
            "Expected BSON document".to_string(),
        )),
    }
}

/// Parse a JSON string into a BSON document
pub fn document_from_json_str(text: &str) -> Result<Document> {
    let json: JsonValue = serde_json::from_str(text)?;
    document_from_json(json)
}

/// Render a document as relaxed extended JSON
pub fn document_to_json(document: &Document) -> JsonValue {
    Bson::Document(document.clone()).into_relaxed_extjson()
}

/// Render a single value as relaxed extended JSON
pub fn value_to_json(value: &Bson) -> JsonValue {
    value.clone().into_relaxed_extjson()
}

/// Top-level keys that can be pushed to the server as an `$exists` filter
/// without being read as a dotted path or an operator.
pub(crate) fn is_plain_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('.') && !key.starts_with('$')
}

/// Values of `key` from each document that has it, in iteration order.
pub(crate) fn values_for_key<I>(documents: I, key: &str) -> Vec<Bson>
where
    I: IntoIterator<Item = Document>,
{
    documents
        .into_iter()
        .filter_map(|mut doc| doc.remove(key))
        .collect()
}
