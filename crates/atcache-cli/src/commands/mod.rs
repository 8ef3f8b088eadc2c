mod image;
mod records;
mod webhooks;

use std::path::{Path, PathBuf};

use anyhow::Context;
use atcache_core::AtcacheConfig;
use serde::Serialize;
use serde_json::Value;

pub use image::{build, check, dockerfile, eject};
pub use records::{
    RecordFormat, records_create, records_delete, records_list, records_match, records_update,
};
pub use webhooks::{
    webhooks_create, webhooks_delete, webhooks_list, webhooks_notifications, webhooks_payloads,
    webhooks_refresh,
};

fn project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn load_config() -> anyhow::Result<AtcacheConfig> {
    Ok(AtcacheConfig::load(&project_dir())?)
}

/// Read JSON from a file, or stdin when the path is absent or `-`.
fn read_json(file: Option<&Path>) -> anyhow::Result<Value> {
    let text = match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?,
    };
    serde_json::from_str(&text).context("input is not valid JSON")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
