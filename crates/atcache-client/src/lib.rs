pub mod client;
pub mod credentials;
pub mod transport;
pub mod webhooks;

pub use client::{AirtableClient, ClientError, DeletedRecord, ListOptions, MAX_RECORDS_PER_REQUEST};
pub use credentials::{Credentials, CredentialsError};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use webhooks::{
    MAX_PAYLOADS_PER_REQUEST, PayloadPage, Webhook, WebhookCreated, WebhookRefresh, WebhooksClient,
};
