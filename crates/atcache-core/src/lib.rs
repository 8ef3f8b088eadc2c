//! Core types and configuration for atcache.
//!
//! This crate defines the `atcache.toml` schema ([`AtcacheConfig`]), the
//! Airtable record model ([`AtRecord`], [`Row`], [`FieldValue`]) with its
//! processing helpers, and shared error types.

pub mod config;
pub mod error;
pub mod records;

pub use config::{AirtableConfig, AtcacheConfig, CONFIG_FILE, ImageConfig};
pub use error::{Error, Result};
pub use records::{
    AtRecord, FieldValue, MatchOutcome, RECORD_ID_FIELD, RecordPayload, Row, match_record_ids,
    records_for_write, rows_from_records,
};
