use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::contacts::{Contact, ContactDraft, ContactId, ContactPatch};
use crate::schema_model::TableSchema;

/// Failure of a single remote call. The gateway never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Transport-level failure; the detail is for logs only.
    #[error("engine unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("{0}")]
    RemoteRejected(String),
    #[error("malformed engine response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkUnreachable(_) => ErrorKind::Transport,
            Self::RemoteRejected(_) | Self::MalformedResponse(_) => ErrorKind::RemoteRejection,
        }
    }

    /// Text safe to show next to the action that triggered the call.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NetworkUnreachable(_) => ENGINE_UNREACHABLE_MESSAGE.to_string(),
            Self::RemoteRejected(message) => message.clone(),
            Self::MalformedResponse(_) => MALFORMED_RESPONSE_MESSAGE.to_string(),
        }
    }
}

pub const ENGINE_UNREACHABLE_MESSAGE: &str = "Database engine is unreachable";
pub const MALFORMED_RESPONSE_MESSAGE: &str = "Database engine returned an unreadable response";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    RemoteRejection,
    Validation,
}

/// Raw `POST /sql/execute` envelope, before normalization.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct SqlEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    #[serde(default)]
    pub rows_affected: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One remote history row as listed by `GET /sql/history`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlHistoryRecord {
    pub id: Option<u64>,
    pub query: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub result: Option<SqlEnvelope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    pub table_name: String,
    pub column_name: String,
    pub index_name: Option<String>,
}

#[async_trait]
pub trait ContactsGateway {
    async fn list_contacts(&self) -> Result<Vec<Contact>, GatewayError>;
    async fn get_contact(&self, id: ContactId) -> Result<Contact, GatewayError>;
    async fn search_contacts(&self, text: &str) -> Result<Vec<Contact>, GatewayError>;
    async fn create_contact(&self, draft: &ContactDraft) -> Result<Contact, GatewayError>;
    async fn update_contact(&self, id: ContactId, patch: &ContactPatch)
        -> Result<(), GatewayError>;
    async fn delete_contact(&self, id: ContactId) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait SqlGateway {
    async fn execute_sql(&self, query: &str) -> Result<SqlEnvelope, GatewayError>;
    async fn query_history(&self) -> Result<Vec<SqlHistoryRecord>, GatewayError>;
}

#[async_trait]
pub trait SchemaGateway {
    async fn fetch_schema(&self) -> Result<Vec<TableSchema>, GatewayError>;
    async fn fetch_table_schema(&self, table: &str) -> Result<TableSchema, GatewayError>;
    async fn create_index(&self, request: &IndexRequest) -> Result<(), GatewayError>;
    async fn drop_index(&self, table: &str, index_name: &str) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait HealthGateway {
    async fn ping(&self) -> Result<(), GatewayError>;
}
