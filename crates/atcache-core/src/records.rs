//! Airtable record shapes and the conversions between them.
//!
//! Airtable speaks `{"id": "rec…", "fields": {…}}`. Callers usually want a
//! flat row keyed by column name, with the record id carried alongside. The
//! wire format cannot carry non-finite numbers, so Airtable wraps them as
//! `{"specialValue": "Infinity"}`; rows hold them as plain `f64`.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Pseudo-column holding the Airtable record id in the JSON form of a [`Row`].
pub const RECORD_ID_FIELD: &str = "at_record_id";

const SPECIAL_VALUE_KEY: &str = "specialValue";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";
const NAN: &str = "NaN";

/// A record as returned by the Airtable API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(
        rename = "createdTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_time: Option<String>,
}

/// A single cell value.
///
/// `Float` only ever holds non-finite numbers; finite numbers stay as JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    Float(f64),
}

impl FieldValue {
    /// Builds a numeric cell, keeping finite values as JSON numbers.
    pub fn float(value: f64) -> Self {
        match serde_json::Number::from_f64(value) {
            Some(n) => Self::Json(Value::Number(n)),
            None => Self::Float(value),
        }
    }

    /// Decodes a cell as Airtable sent it.
    ///
    /// Returns `None` for a `specialValue` wrapper this client does not know.
    pub fn from_airtable(value: Value) -> Option<Self> {
        let special = match &value {
            Value::Object(map) => map.get(SPECIAL_VALUE_KEY).filter(|v| is_truthy(v)),
            _ => None,
        };
        let Some(special) = special else {
            return Some(Self::Json(value));
        };
        match special.as_str() {
            Some(INFINITY) => Some(Self::Float(f64::INFINITY)),
            Some(NEG_INFINITY) => Some(Self::Float(f64::NEG_INFINITY)),
            Some(NAN) => Some(Self::Float(f64::NAN)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Json(Value::Null))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Float(_) => None,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(v) => v.serialize(serializer),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(f) => {
                let label = if f.is_nan() {
                    NAN
                } else if f.is_sign_positive() {
                    INFINITY
                } else {
                    NEG_INFINITY
                };
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(SPECIAL_VALUE_KEY, label)?;
                map.end()
            }
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Json(Value::Bool(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Json(Value::String(value.to_owned()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Json(Value::String(value))
    }
}

/// A processed record: one entry per column plus the record id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub id: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// Parses the JSON form of a row, where the id lives under
    /// [`RECORD_ID_FIELD`].
    pub fn from_json(index: usize, value: Value) -> crate::Result<Self> {
        let Value::Object(map) = value else {
            return Err(crate::Error::NotAnObject {
                index,
                kind: json_kind(&value),
            });
        };

        let mut row = Row::new();
        for (column, cell) in map {
            if column == RECORD_ID_FIELD {
                row.id = match cell {
                    Value::String(id) => Some(id),
                    Value::Null => None,
                    _ => return Err(crate::Error::InvalidRecordId { index }),
                };
                continue;
            }
            match FieldValue::from_airtable(cell) {
                Some(v) => {
                    row.fields.insert(column, v);
                }
                None => tracing::warn!(index, column = %column, "dropping unknown specialValue"),
            }
        }
        Ok(row)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.fields.len() + usize::from(self.id.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(id) = &self.id {
            map.serialize_entry(RECORD_ID_FIELD, id)?;
        }
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Request body entry for create and update calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl RecordPayload {
    pub fn new(fields: BTreeMap<String, FieldValue>) -> Self {
        Self { id: None, fields }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl From<AtRecord> for RecordPayload {
    fn from(record: AtRecord) -> Self {
        Self {
            id: Some(record.id),
            fields: record
                .fields
                .into_iter()
                .map(|(k, v)| (k, FieldValue::Json(v)))
                .collect(),
        }
    }
}

/// Converts Airtable records into rows.
///
/// Special numeric values are decoded; unknown `specialValue` wrappers are
/// dropped from the row.
pub fn rows_from_records(records: Vec<AtRecord>, keep_id: bool) -> Vec<Row> {
    records
        .into_iter()
        .map(|record| {
            let mut row = Row::new();
            if keep_id {
                row.id = Some(record.id.clone());
            }
            for (column, cell) in record.fields {
                match FieldValue::from_airtable(cell) {
                    Some(v) => {
                        row.fields.insert(column, v);
                    }
                    None => tracing::warn!(
                        record = %record.id,
                        column = %column,
                        "dropping unknown specialValue"
                    ),
                }
            }
            row
        })
        .collect()
}

/// Converts rows into create/update payloads.
///
/// Null cells are dropped unless `keep_null` is set (sending null clears the
/// cell in Airtable). New records are sent without ids; for updates every row
/// must carry one.
pub fn records_for_write(
    rows: &[Row],
    keep_null: bool,
    new: bool,
) -> crate::Result<Vec<RecordPayload>> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let fields: BTreeMap<String, FieldValue> = row
                .fields
                .iter()
                .filter(|(_, v)| keep_null || !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();

            if new {
                return Ok(RecordPayload::new(fields));
            }
            let id = row
                .id
                .clone()
                .ok_or(crate::Error::MissingRecordId { index })?;
            Ok(RecordPayload::new(fields).with_id(id))
        })
        .collect()
}

/// Result of [`match_record_ids`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    /// Rows that received a record id.
    pub updated: Vec<Row>,
    /// Key values of the rows nothing matched.
    pub missing_keys: Vec<BTreeMap<String, FieldValue>>,
    /// The unmatched rows themselves.
    pub not_updated: Vec<Row>,
}

/// Attaches record ids from `with_id` to `without_id` by comparing the
/// `keys` columns.
///
/// A row matches a candidate when every key is present in the row and equal
/// in the candidate. Candidates without an id are ignored. More than one
/// match is an error.
pub fn match_record_ids(
    without_id: Vec<Row>,
    with_id: &[Row],
    keys: &[String],
) -> crate::Result<MatchOutcome> {
    let mut outcome = MatchOutcome::default();

    for (index, mut row) in without_id.into_iter().enumerate() {
        let mut matches = with_id.iter().filter_map(|candidate| {
            let id = candidate.id.as_ref()?;
            let all_equal = keys.iter().all(|key| match row.fields.get(key) {
                Some(value) => candidate.fields.get(key) == Some(value),
                None => false,
            });
            all_equal.then_some(id)
        });

        let first = matches.next().cloned();
        let extra = matches.count();
        if extra > 0 {
            return Err(crate::Error::DuplicateMatch {
                keys: keys.to_vec(),
                index,
                count: extra + 1,
            });
        }

        match first {
            Some(id) => {
                row.id = Some(id);
                outcome.updated.push(row);
            }
            None => {
                let uid = keys
                    .iter()
                    .filter_map(|k| row.fields.get(k).map(|v| (k.clone(), v.clone())))
                    .collect();
                outcome.missing_keys.push(uid);
                outcome.not_updated.push(row);
            }
        }
    }

    Ok(outcome)
}
