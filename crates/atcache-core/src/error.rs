use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid [image].{field}: {reason}")]
    InvalidImageConfig {
        field: &'static str,
        reason: &'static str,
    },

    // ── Record processing ──
    #[error("row {index} has no record id; updates need `{}`", crate::records::RECORD_ID_FIELD)]
    MissingRecordId { index: usize },

    #[error(
        "matching on [{}] found {count} records for row {index}",
        .keys.join(", ")
    )]
    DuplicateMatch {
        keys: Vec<String>,
        index: usize,
        count: usize,
    },

    #[error("expected a JSON object for row {index}, got {kind}")]
    NotAnObject { index: usize, kind: &'static str },

    #[error("`{}` must be a string in row {index}", crate::records::RECORD_ID_FIELD)]
    InvalidRecordId { index: usize },
}
