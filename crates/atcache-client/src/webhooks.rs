use std::fmt;

use atcache_core::AirtableConfig;
use reqwest::Method;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ClientError, decode, send_checked};
use crate::credentials::Credentials;
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};

/// Hard cap on payloads returned per request.
pub const MAX_PAYLOADS_PER_REQUEST: u32 = 50;

/// A registered webhook and its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    #[serde(default)]
    pub are_notifications_enabled: bool,
    /// Grows by one with every payload generated for this webhook.
    #[serde(default)]
    pub cursor_for_next_payload: u64,
    #[serde(default)]
    pub is_hook_enabled: bool,
    #[serde(default)]
    pub last_successful_notification_time: Option<String>,
    #[serde(default)]
    pub notification_url: Option<String>,
    #[serde(default)]
    pub expiration_time: Option<String>,
    #[serde(default)]
    pub last_notification_result: Option<Value>,
    #[serde(default)]
    pub specification: Value,
}

/// Response to webhook creation.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCreated {
    pub id: String,
    /// Key for verifying notification pings. Only returned once.
    pub mac_secret_base64: String,
    #[serde(default)]
    pub expiration_time: Option<String>,
}

impl fmt::Debug for WebhookCreated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookCreated")
            .field("id", &self.id)
            .field("mac_secret_base64", &"[REDACTED]")
            .field("expiration_time", &self.expiration_time)
            .finish()
    }
}

/// One page of change payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadPage {
    /// Cursor to pass on the next call.
    pub cursor: u64,
    #[serde(default)]
    pub might_have_more: bool,
    #[serde(default)]
    pub payloads: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRefresh {
    #[serde(default)]
    pub expiration_time: Option<String>,
}

/// Airtable webhooks API. Authenticates with a personal access token.
///
/// Webhooks expire seven days after creation; [`refresh`](Self::refresh)
/// and [`payloads`](Self::payloads) both extend an active webhook.
pub struct WebhooksClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    api_url: String,
    token: SecretString,
}

impl WebhooksClient<ReqwestTransport> {
    pub fn new(config: &AirtableConfig, credentials: &Credentials) -> Result<Self, ClientError> {
        Self::with_transport(ReqwestTransport::new(), config, credentials)
    }
}

impl<T: HttpTransport> WebhooksClient<T> {
    pub fn with_transport(
        transport: T,
        config: &AirtableConfig,
        credentials: &Credentials,
    ) -> Result<Self, ClientError> {
        let token = credentials
            .personal_token
            .clone()
            .ok_or(ClientError::MissingPersonalToken)?;
        Ok(Self {
            transport,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            token,
        })
    }

    /// Register a webhook. `notification_url` receives pings when set.
    pub async fn create(
        &self,
        base: &str,
        specification: &Value,
        notification_url: Option<&str>,
    ) -> Result<WebhookCreated, ClientError> {
        let body = serde_json::to_string(&CreateBody {
            notification_url,
            specification,
        })
        .map_err(|e| ClientError::Encode { source: e })?;
        let request = self.request(Method::POST, &self.webhooks_url(base)).json_body(body);

        let response = send_checked(&self.transport, request).await?;
        let created: WebhookCreated = decode(&response.body)?;
        tracing::info!(base, webhook = %created.id, "webhook created");
        Ok(created)
    }

    pub async fn delete(&self, base: &str, webhook_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/{webhook_id}", self.webhooks_url(base));
        send_checked(&self.transport, self.request(Method::DELETE, &url)).await?;
        tracing::info!(base, webhook = webhook_id, "webhook deleted");
        Ok(())
    }

    pub async fn list(&self, base: &str) -> Result<Vec<Webhook>, ClientError> {
        let request = self.request(Method::GET, &self.webhooks_url(base));
        let response = send_checked(&self.transport, request).await?;
        let list: WebhookList = decode(&response.body)?;
        Ok(list.webhooks)
    }

    /// List change payloads starting at `cursor` (Airtable defaults to 1).
    /// `limit` is capped at [`MAX_PAYLOADS_PER_REQUEST`].
    pub async fn payloads(
        &self,
        base: &str,
        webhook_id: &str,
        cursor: Option<u64>,
        limit: Option<u32>,
    ) -> Result<PayloadPage, ClientError> {
        let url = format!("{}/{webhook_id}/payloads", self.webhooks_url(base));
        let mut request = self.request(Method::GET, &url);
        if let Some(cursor) = cursor {
            request = request.query("cursor", cursor.to_string());
        }
        if let Some(limit) = limit {
            let capped = limit.clamp(1, MAX_PAYLOADS_PER_REQUEST);
            if capped != limit {
                tracing::warn!(requested = limit, limit = capped, "payload limit adjusted");
            }
            request = request.query("limit", capped.to_string());
        }

        let response = send_checked(&self.transport, request).await?;
        let page: PayloadPage = decode(&response.body)?;
        tracing::debug!(
            webhook = webhook_id,
            payloads = page.payloads.len(),
            cursor = page.cursor,
            "fetched payloads"
        );
        Ok(page)
    }

    /// Extend the webhook's life by seven days from now.
    pub async fn refresh(&self, base: &str, webhook_id: &str) -> Result<WebhookRefresh, ClientError> {
        let url = format!("{}/{webhook_id}/refresh", self.webhooks_url(base));
        let response = send_checked(&self.transport, self.request(Method::POST, &url)).await?;
        decode(&response.body)
    }

    /// Turn notification pings on or off.
    pub async fn set_notifications(
        &self,
        base: &str,
        webhook_id: &str,
        enable: bool,
    ) -> Result<(), ClientError> {
        let url = format!(
            "{}/{webhook_id}/enableNotifications",
            self.webhooks_url(base)
        );
        let body = serde_json::json!({ "enable": enable }).to_string();
        let request = self.request(Method::POST, &url).json_body(body);
        send_checked(&self.transport, request).await?;
        tracing::info!(webhook = webhook_id, enable, "webhook notifications updated");
        Ok(())
    }

    fn webhooks_url(&self, base: &str) -> String {
        format!("{}/bases/{base}/webhooks", self.api_url)
    }

    fn request(&self, method: Method, url: &str) -> HttpRequest {
        HttpRequest::new(method, url).bearer(&self.token)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
    specification: &'a Value,
}

#[derive(Deserialize)]
struct WebhookList {
    #[serde(default)]
    webhooks: Vec<Webhook>,
}
