use atcache_core::{AirtableConfig, AtRecord, RecordPayload, Row, records_for_write, rows_from_records};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};

/// Airtable's per-request limit for create, update and delete.
pub const MAX_RECORDS_PER_REQUEST: usize = 10;

/// Header carrying the cache proxy token.
pub const CACHE_HEADER: &str = "X-Mw-Bearer";

/// Options for [`AirtableClient::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Restrict to a named view.
    pub view: Option<String>,
    /// Overrides the client's default base.
    pub base: Option<String>,
    /// Read through the cache proxy. Ignored without a cache token.
    pub via_cache: bool,
}

/// One entry of a delete response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub id: String,
    pub deleted: bool,
}

/// Airtable records client, parameterized over the transport for testability.
///
/// ```text
/// list    GET    <url>/<base>/<table>?view=..&offset=..   (follows pages)
/// create  POST   <api>/<base>/<table>   {"records": [..10]}
/// update  PATCH  <api>/<base>/<table>   {"records": [..10]}
/// delete  DELETE <api>/<base>/<table>?records[]=..        (..10)
/// ```
///
/// Writes are chunked and sent in order. A failed chunk stops the call;
/// chunks already accepted by Airtable stay applied.
pub struct AirtableClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    api_url: String,
    cache_url: String,
    base: Option<String>,
    process: bool,
    api_key: SecretString,
    cache_token: Option<SecretString>,
}

impl AirtableClient<ReqwestTransport> {
    pub fn new(config: &AirtableConfig, credentials: &Credentials) -> Result<Self, ClientError> {
        Self::with_transport(ReqwestTransport::new(), config, credentials)
    }
}

impl<T: HttpTransport> AirtableClient<T> {
    pub fn with_transport(
        transport: T,
        config: &AirtableConfig,
        credentials: &Credentials,
    ) -> Result<Self, ClientError> {
        let api_key = credentials
            .api_key
            .clone()
            .ok_or(ClientError::MissingApiKey)?;
        Ok(Self {
            transport,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            cache_url: config.cache_url.trim_end_matches('/').to_owned(),
            base: config.base.clone(),
            process: config.process,
            api_key,
            cache_token: credentials.cache_token.clone(),
        })
    }

    /// Whether callers should prefer rows over raw records by default.
    pub fn prefers_rows(&self) -> bool {
        self.process
    }

    pub fn default_base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    // ── Read ──

    /// Fetch every record of a table, following `offset` pagination.
    pub async fn list(
        &self,
        table: &str,
        options: &ListOptions,
    ) -> Result<Vec<AtRecord>, ClientError> {
        let base = self.resolve_base(options.base.as_deref())?;
        let cache_token = self.cache_token.as_ref().filter(|_| options.via_cache);
        if options.via_cache && cache_token.is_none() {
            tracing::debug!("no cache token configured, reading directly");
        }
        let root = if cache_token.is_some() {
            &self.cache_url
        } else {
            &self.api_url
        };
        let url = format!("{root}/{base}/{table}");

        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let mut request = HttpRequest::new(Method::GET, &url).bearer(&self.api_key);
            if let Some(token) = cache_token {
                request = request.header(CACHE_HEADER, token.expose_secret());
            }
            if let Some(view) = &options.view {
                request = request.query("view", view.as_str());
            }
            if let Some(offset) = &offset {
                request = request.query("offset", offset.as_str());
            }

            let response = self.send(request).await?;
            let page: ListPage = decode(&response.body)?;
            pages += 1;
            tracing::debug!(table, page = pages, records = page.records.len(), "fetched page");
            records.extend(page.records);

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        tracing::info!(table, base = %base, records = records.len(), pages, "listed records");
        Ok(records)
    }

    /// [`list`](Self::list), converted to rows with their record ids.
    pub async fn list_rows(
        &self,
        table: &str,
        options: &ListOptions,
    ) -> Result<Vec<Row>, ClientError> {
        let records = self.list(table, options).await?;
        Ok(rows_from_records(records, true))
    }

    // ── Write ──

    /// Create records. Returns the created records in request order.
    pub async fn create(
        &self,
        table: &str,
        records: &[RecordPayload],
        base: Option<&str>,
    ) -> Result<Vec<AtRecord>, ClientError> {
        let created = self.write_chunks(Method::POST, table, records, base).await?;
        tracing::info!(table, records = created.len(), "created records");
        Ok(created)
    }

    pub async fn create_rows(
        &self,
        table: &str,
        rows: &[Row],
        base: Option<&str>,
    ) -> Result<Vec<AtRecord>, ClientError> {
        let payloads =
            records_for_write(rows, false, true).map_err(|e| ClientError::Records { source: e })?;
        self.create(table, &payloads, base).await
    }

    /// Non-destructive update (PATCH): only the listed fields change.
    pub async fn update(
        &self,
        table: &str,
        records: &[RecordPayload],
        base: Option<&str>,
    ) -> Result<Vec<AtRecord>, ClientError> {
        let updated = self.write_chunks(Method::PATCH, table, records, base).await?;
        tracing::info!(table, records = updated.len(), "updated records");
        Ok(updated)
    }

    /// Update from rows carrying record ids. With `keep_null`, null cells
    /// are sent and clear the value in Airtable.
    pub async fn update_rows(
        &self,
        table: &str,
        rows: &[Row],
        keep_null: bool,
        base: Option<&str>,
    ) -> Result<Vec<AtRecord>, ClientError> {
        let payloads = records_for_write(rows, keep_null, false)
            .map_err(|e| ClientError::Records { source: e })?;
        self.update(table, &payloads, base).await
    }

    /// Permanently delete records by id.
    pub async fn delete(
        &self,
        table: &str,
        ids: &[String],
        base: Option<&str>,
    ) -> Result<Vec<DeletedRecord>, ClientError> {
        let base = self.resolve_base(base)?;
        let url = format!("{}/{base}/{table}", self.api_url);

        let mut deleted = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_RECORDS_PER_REQUEST) {
            let request = chunk.iter().fold(
                HttpRequest::new(Method::DELETE, &url).bearer(&self.api_key),
                |request, id| request.query("records[]", id.as_str()),
            );
            let response = self.send(request).await?;
            let body: DeleteResponse = decode(&response.body)?;
            deleted.extend(body.records);
        }

        tracing::info!(table, base = %base, records = deleted.len(), "deleted records");
        Ok(deleted)
    }

    // ── Internals ──

    fn resolve_base(&self, base: Option<&str>) -> Result<String, ClientError> {
        base.or(self.base.as_deref())
            .filter(|b| !b.is_empty())
            .map(str::to_owned)
            .ok_or(ClientError::MissingBase)
    }

    async fn write_chunks(
        &self,
        method: Method,
        table: &str,
        records: &[RecordPayload],
        base: Option<&str>,
    ) -> Result<Vec<AtRecord>, ClientError> {
        let base = self.resolve_base(base)?;
        let url = format!("{}/{base}/{table}", self.api_url);

        let mut written = Vec::with_capacity(records.len());
        for (index, chunk) in records.chunks(MAX_RECORDS_PER_REQUEST).enumerate() {
            let body = serde_json::to_string(&WriteBody { records: chunk })
                .map_err(|e| ClientError::Encode { source: e })?;
            let request = HttpRequest::new(method.clone(), &url)
                .bearer(&self.api_key)
                .json_body(body);

            let response = self.send(request).await?;
            let page: RecordsResponse = decode(&response.body)?;
            tracing::debug!(table, chunk = index, records = page.records.len(), %method, "chunk accepted");
            written.extend(page.records);
        }
        Ok(written)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        send_checked(&self.transport, request).await
    }
}

// ── Shared helpers ──

/// Send a request and require a 200 response.
pub(crate) async fn send_checked<T: HttpTransport>(
    transport: &T,
    request: HttpRequest,
) -> Result<HttpResponse, ClientError> {
    tracing::debug!(method = %request.method, url = %request.url, "airtable request");
    let response = transport
        .send(request)
        .await
        .map_err(|e| ClientError::Transport { source: e })?;

    if response.status != 200 {
        identify_errors(&response.body);
        return Err(ClientError::Status {
            status: response.status,
            body: response.body,
        });
    }
    Ok(response)
}

pub(crate) fn decode<D: DeserializeOwned>(body: &str) -> Result<D, ClientError> {
    serde_json::from_str(body).map_err(|e| ClientError::Decode { source: e })
}

/// Log the error Airtable reported, if the body carries one.
fn identify_errors(body: &str) {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ApiError::Detailed { kind, message },
        }) => {
            tracing::error!(kind = %kind, message = message.as_deref().unwrap_or(""), "Airtable error");
        }
        Ok(ErrorEnvelope {
            error: ApiError::Plain(error),
        }) => {
            tracing::error!(error = %error, "Airtable error");
        }
        Err(e) => tracing::debug!(error = %e, "response body carries no Airtable error"),
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApiError {
    Detailed {
        #[serde(rename = "type")]
        kind: String,
        message: Option<String>,
    },
    Plain(serde_json::Value),
}

#[derive(Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<AtRecord>,
    offset: Option<String>,
}

#[derive(Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<AtRecord>,
}

#[derive(Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    records: Vec<DeletedRecord>,
}

#[derive(Serialize)]
struct WriteBody<'a> {
    records: &'a [RecordPayload],
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("AIRTABLE_API_KEY is not set")]
    MissingApiKey,

    #[error("AIRTABLE_PERSONAL_TOKEN is not set; the webhooks API needs a personal access token")]
    MissingPersonalToken,

    #[error("no Airtable base given and no default base configured")]
    MissingBase,

    #[error("request to Airtable failed")]
    Transport { source: TransportError },

    #[error("Airtable did not return 200 ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode request body")]
    Encode { source: serde_json::Error },

    #[error("unexpected response body from Airtable")]
    Decode { source: serde_json::Error },

    #[error("invalid record data")]
    Records { source: atcache_core::Error },
}
