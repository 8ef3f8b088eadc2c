use std::path::Path;

use atcache_client::{Credentials, WebhooksClient};
use serde_json::Value;

use super::{load_config, print_json, read_json};

/// Resolve the base before touching credentials so a missing base is
/// reported first.
fn client_for(base: Option<String>) -> anyhow::Result<(WebhooksClient, String)> {
    let config = load_config()?;
    let base = base
        .or_else(|| config.airtable.base.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("no base given; pass --base or set [airtable].base in atcache.toml")
        })?;
    let credentials = Credentials::from_env()?;
    let client = WebhooksClient::new(&config.airtable, &credentials)?;
    Ok((client, base))
}

pub async fn webhooks_list(base: Option<String>) -> anyhow::Result<()> {
    let (client, base) = client_for(base)?;
    let hooks = client.list(&base).await?;
    if hooks.is_empty() {
        eprintln!("No webhooks registered for {base}");
    }
    print_json(&hooks)
}

pub async fn webhooks_create(
    base: Option<String>,
    spec: &Path,
    notification_url: Option<&str>,
) -> anyhow::Result<()> {
    let specification = read_json(Some(spec))?;
    if !matches!(specification, Value::Object(_)) {
        anyhow::bail!("webhook specification must be a JSON object");
    }

    let (client, base) = client_for(base)?;
    let created = client
        .create(&base, &specification, notification_url)
        .await?;

    eprintln!("Store macSecretBase64 now; Airtable does not return it again.");
    print_json(&created)
}

pub async fn webhooks_delete(base: Option<String>, id: &str) -> anyhow::Result<()> {
    let (client, base) = client_for(base)?;
    client.delete(&base, id).await?;
    println!("Deleted webhook {id}");
    Ok(())
}

pub async fn webhooks_refresh(base: Option<String>, id: &str) -> anyhow::Result<()> {
    let (client, base) = client_for(base)?;
    print_json(&client.refresh(&base, id).await?)
}

pub async fn webhooks_payloads(
    base: Option<String>,
    id: &str,
    cursor: Option<u64>,
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let (client, base) = client_for(base)?;
    print_json(&client.payloads(&base, id, cursor, limit).await?)
}

pub async fn webhooks_notifications(
    base: Option<String>,
    id: &str,
    enable: bool,
) -> anyhow::Result<()> {
    let (client, base) = client_for(base)?;
    client.set_notifications(&base, id, enable).await?;
    let state = if enable { "enabled" } else { "disabled" };
    println!("Notifications {state} for webhook {id}");
    Ok(())
}
