use std::collections::BTreeMap;
use std::path::PathBuf;

use atcache_client::{AirtableClient, Credentials, ListOptions};
use atcache_core::{FieldValue, RecordPayload, Row, match_record_ids};
use serde::Serialize;
use serde_json::Value;

use super::{load_config, print_json, read_json};

/// Shape of record data on stdin/stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// `{"at_record_id": .., "<column>": ..}` per row
    Rows,
    /// Airtable's `{"id": .., "fields": {..}}`
    Raw,
    /// `[airtable].process` decides.
    Configured,
}

impl RecordFormat {
    pub fn from_flags(rows: bool, raw: bool) -> Self {
        match (rows, raw) {
            (true, _) => Self::Rows,
            (false, true) => Self::Raw,
            (false, false) => Self::Configured,
        }
    }

    fn uses_rows(self, configured: bool) -> bool {
        match self {
            Self::Rows => true,
            Self::Raw => false,
            Self::Configured => configured,
        }
    }
}

fn client() -> anyhow::Result<AirtableClient> {
    let config = load_config()?;
    let credentials = Credentials::from_env()?;
    Ok(AirtableClient::new(&config.airtable, &credentials)?)
}

pub async fn records_list(
    table: &str,
    base: Option<String>,
    view: Option<String>,
    cache: bool,
    format: RecordFormat,
) -> anyhow::Result<()> {
    let client = client()?;
    let options = ListOptions {
        view,
        base,
        via_cache: cache,
    };

    if format.uses_rows(client.prefers_rows()) {
        print_json(&client.list_rows(table, &options).await?)
    } else {
        print_json(&client.list(table, &options).await?)
    }
}

pub async fn records_create(
    table: &str,
    base: Option<&str>,
    file: Option<PathBuf>,
    format: RecordFormat,
) -> anyhow::Result<()> {
    let input = read_json(file.as_deref())?;
    let client = client()?;

    let created = if format.uses_rows(client.prefers_rows()) {
        let rows = rows_from_input(input)?;
        client.create_rows(table, &rows, base).await?
    } else {
        let payloads = payloads_from_input(input)?;
        client.create(table, &payloads, base).await?
    };
    print_json(&created)
}

/// Rows need `at_record_id`; raw records need `id`. `keep_null` applies to
/// rows only, raw fields are sent as given.
pub async fn records_update(
    table: &str,
    base: Option<&str>,
    file: Option<PathBuf>,
    format: RecordFormat,
    keep_null: bool,
) -> anyhow::Result<()> {
    let input = read_json(file.as_deref())?;
    let client = client()?;

    let updated = if format.uses_rows(client.prefers_rows()) {
        let rows = rows_from_input(input)?;
        client.update_rows(table, &rows, keep_null, base).await?
    } else {
        let payloads = payloads_from_input(input)?;
        if let Some(index) = payloads.iter().position(|p| p.id.is_none()) {
            anyhow::bail!("record {index} has no \"id\"; updates need the Airtable record id");
        }
        client.update(table, &payloads, base).await?
    };
    print_json(&updated)
}

#[derive(Serialize)]
struct MatchReport<'a> {
    updated: &'a [Row],
    missing_keys: &'a [BTreeMap<String, FieldValue>],
    not_updated: &'a [Row],
}

/// Attach record ids to input rows from the table's current contents.
pub async fn records_match(
    table: &str,
    base: Option<String>,
    file: Option<PathBuf>,
    keys: &[String],
    view: Option<String>,
) -> anyhow::Result<()> {
    let rows = rows_from_input(read_json(file.as_deref())?)?;
    let client = client()?;

    let options = ListOptions {
        view,
        base,
        via_cache: false,
    };
    let existing = client.list_rows(table, &options).await?;
    let outcome = match_record_ids(rows, &existing, keys)?;

    if !outcome.not_updated.is_empty() {
        tracing::warn!(
            unmatched = outcome.not_updated.len(),
            keys = ?keys,
            "rows without a matching record"
        );
    }
    print_json(&MatchReport {
        updated: &outcome.updated,
        missing_keys: &outcome.missing_keys,
        not_updated: &outcome.not_updated,
    })
}

pub async fn records_delete(
    table: &str,
    ids: &[String],
    base: Option<&str>,
    yes: bool,
) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!(
            "refusing to delete {} record(s) from {table} without --yes; deletion is permanent",
            ids.len()
        );
    }

    let client = client()?;
    let deleted = client.delete(table, ids, base).await?;
    print_json(&deleted)
}

// ── Input parsing ──

/// Accepts a JSON array, or an object wrapping one under `records`.
fn records_array(input: Value) -> anyhow::Result<Vec<Value>> {
    match input {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(items)) => Ok(items),
            _ => anyhow::bail!("expected a JSON array of records or an object with a \"records\" array"),
        },
        _ => anyhow::bail!("expected a JSON array of records or an object with a \"records\" array"),
    }
}

fn rows_from_input(input: Value) -> anyhow::Result<Vec<Row>> {
    records_array(input)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| Row::from_json(index, item).map_err(anyhow::Error::from))
        .collect()
}

fn payloads_from_input(input: Value) -> anyhow::Result<Vec<RecordPayload>> {
    records_array(input)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::Object(mut map) = item else {
                anyhow::bail!("record {index} is not a JSON object");
            };
            let id = match map.remove("id") {
                None | Some(Value::Null) => None,
                Some(Value::String(id)) => Some(id),
                Some(_) => anyhow::bail!("record {index}: \"id\" must be a string"),
            };
            let fields = match map.remove("fields") {
                Some(Value::Object(fields)) => fields
                    .into_iter()
                    .map(|(column, cell)| (column, FieldValue::from(cell)))
                    .collect(),
                _ => anyhow::bail!("record {index}: \"fields\" must be an object"),
            };
            Ok(RecordPayload { id, fields })
        })
        .collect()
}
