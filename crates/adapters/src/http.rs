use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabula_core::contacts::{Contact, ContactDraft, ContactId, ContactPatch};
use tabula_core::gateway::{
    ContactsGateway, GatewayError, HealthGateway, IndexRequest, SchemaGateway, SqlEnvelope,
    SqlGateway, SqlHistoryRecord,
};
use tabula_core::profiles::EngineProfile;
use tabula_core::schema_model::TableSchema;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("tabula/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GatewayBuildError {
    message: String,
}

impl GatewayBuildError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Engine gateway over the engine's JSON HTTP API.
///
/// Requests carry no timeout and are never retried; a hung engine leaves the caller
/// waiting until the connection resolves.
#[derive(Debug, Clone)]
pub struct HttpEngineGateway {
    client: Client,
    base_url: Url,
}

impl HttpEngineGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayBuildError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| GatewayBuildError::new(format!("invalid base url `{base_url}`: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayBuildError::new(format!(
                "base url `{base_url}` cannot carry endpoint paths"
            )));
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| GatewayBuildError::new(format!("failed to build http client: {error}")))?;

        Ok(Self { client, base_url })
    }

    pub fn from_profile(profile: &EngineProfile) -> Result<Self, GatewayBuildError> {
        Self::new(&profile.base_url)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        endpoint_url(&self.base_url, segments)
    }

    async fn send(&self, request: RequestBuilder) -> Result<RawResponse, GatewayError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "engine responded");
        let body = response.text().await.map_err(transport_error)?;
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl ContactsGateway for HttpEngineGateway {
    async fn list_contacts(&self) -> Result<Vec<Contact>, GatewayError> {
        let url = self.endpoint(&["contacts"])?;
        let raw = self.send(self.client.get(url)).await?;
        decode_envelope(&raw, "Failed to fetch contacts")?.into_data()
    }

    async fn get_contact(&self, id: ContactId) -> Result<Contact, GatewayError> {
        let url = self.endpoint(&["contacts", &id.to_string()])?;
        let raw = self.send(self.client.get(url)).await?;
        decode_envelope(&raw, "Failed to fetch contact")?.into_data()
    }

    async fn search_contacts(&self, text: &str) -> Result<Vec<Contact>, GatewayError> {
        let url = self.endpoint(&["contacts", "search"])?;
        let raw = self.send(self.client.get(url).query(&[("q", text)])).await?;
        decode_envelope(&raw, "Failed to search contacts")?.into_data()
    }

    async fn create_contact(&self, draft: &ContactDraft) -> Result<Contact, GatewayError> {
        let url = self.endpoint(&["contacts"])?;
        let raw = self.send(self.client.post(url).json(draft)).await?;
        match decode_created(&raw)? {
            Created::Record(contact) => Ok(contact),
            Created::Id(id) => {
                debug!(%id, "create acknowledged by id, fetching record");
                self.get_contact(id).await
            }
        }
    }

    async fn update_contact(
        &self,
        id: ContactId,
        patch: &ContactPatch,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(&["contacts", &id.to_string()])?;
        let raw = self.send(self.client.put(url).json(patch)).await?;
        decode_envelope::<Value>(&raw, "Failed to update contact").map(|_| ())
    }

    async fn delete_contact(&self, id: ContactId) -> Result<(), GatewayError> {
        let url = self.endpoint(&["contacts", &id.to_string()])?;
        let raw = self.send(self.client.delete(url)).await?;
        decode_envelope::<Value>(&raw, "Failed to delete contact").map(|_| ())
    }
}

#[derive(Debug, Serialize)]
struct ExecuteBody<'a> {
    query: &'a str,
}

#[async_trait]
impl SqlGateway for HttpEngineGateway {
    async fn execute_sql(&self, query: &str) -> Result<SqlEnvelope, GatewayError> {
        let url = self.endpoint(&["sql", "execute"])?;
        let raw = self
            .send(self.client.post(url).json(&ExecuteBody { query }))
            .await?;
        decode_sql_envelope(&raw)
    }

    async fn query_history(&self) -> Result<Vec<SqlHistoryRecord>, GatewayError> {
        let url = self.endpoint(&["sql", "history"])?;
        let raw = self.send(self.client.get(url)).await?;
        decode_history(&raw)
    }
}

#[derive(Debug, Serialize)]
struct IndexBody<'a> {
    table_name: &'a str,
    column_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_name: Option<&'a str>,
}

#[async_trait]
impl SchemaGateway for HttpEngineGateway {
    async fn fetch_schema(&self) -> Result<Vec<TableSchema>, GatewayError> {
        let url = self.endpoint(&["sql", "schema"])?;
        let raw = self.send(self.client.get(url)).await?;
        decode_payload(&raw, "Failed to fetch schema")
    }

    async fn fetch_table_schema(&self, table: &str) -> Result<TableSchema, GatewayError> {
        let url = self.endpoint(&["sql", "schema", table])?;
        let raw = self.send(self.client.get(url)).await?;
        decode_payload(&raw, "Failed to fetch table schema")
    }

    async fn create_index(&self, request: &IndexRequest) -> Result<(), GatewayError> {
        let url = self.endpoint(&["sql", "index"])?;
        let body = IndexBody {
            table_name: &request.table_name,
            column_name: &request.column_name,
            index_name: request.index_name.as_deref(),
        };
        let raw = self.send(self.client.post(url).json(&body)).await?;
        decode_envelope::<Value>(&raw, "Failed to create index").map(|_| ())
    }

    async fn drop_index(&self, table: &str, index_name: &str) -> Result<(), GatewayError> {
        let url = self.endpoint(&["sql", "index", table, index_name])?;
        let raw = self.send(self.client.delete(url)).await?;
        decode_envelope::<Value>(&raw, "Failed to drop index").map(|_| ())
    }
}

#[async_trait]
impl HealthGateway for HttpEngineGateway {
    async fn ping(&self) -> Result<(), GatewayError> {
        let url = self.endpoint(&["health"])?;
        let raw = self.send(self.client.get(url)).await?;
        decode_health(&raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RawResponse {
    status: StatusCode,
    body: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    id: Option<ContactId>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, GatewayError> {
        self.data.ok_or_else(|| {
            GatewayError::MalformedResponse("successful response carried no data".to_string())
        })
    }
}

/// Listing endpoints answer either with an envelope or with the bare payload.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Bare(T),
    Enveloped(ApiEnvelope<T>),
}

enum Created {
    Record(Contact),
    Id(ContactId),
}

#[derive(Debug, Deserialize)]
struct WireHistoryRecord {
    #[serde(default)]
    id: Option<u64>,
    query: String,
    #[serde(alias = "created_at")]
    timestamp: String,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct HealthBody {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url, GatewayError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| GatewayError::MalformedResponse(format!("base url `{base}` has no path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_decode() {
        return GatewayError::MalformedResponse(error.to_string());
    }
    GatewayError::NetworkUnreachable(error.to_string())
}

fn status_rejection(status: StatusCode) -> GatewayError {
    GatewayError::RemoteRejected(format!("Engine responded with HTTP {status}"))
}

fn parse_body<T: DeserializeOwned>(raw: &RawResponse) -> Result<T, GatewayError> {
    serde_json::from_str(&raw.body).map_err(|error| {
        if raw.status.is_success() {
            GatewayError::MalformedResponse(error.to_string())
        } else {
            status_rejection(raw.status)
        }
    })
}

fn decode_envelope<T: DeserializeOwned>(
    raw: &RawResponse,
    fallback: &str,
) -> Result<ApiEnvelope<T>, GatewayError> {
    let envelope: ApiEnvelope<T> = parse_body(raw)?;
    if !envelope.success || !raw.status.is_success() {
        return Err(GatewayError::RemoteRejected(
            envelope
                .error
                .or(envelope.message)
                .unwrap_or_else(|| fallback.to_string()),
        ));
    }
    Ok(envelope)
}

fn decode_payload<T: DeserializeOwned>(raw: &RawResponse, fallback: &str) -> Result<T, GatewayError> {
    match parse_body::<Payload<T>>(raw)? {
        Payload::Bare(payload) if raw.status.is_success() => Ok(payload),
        Payload::Bare(_) => Err(status_rejection(raw.status)),
        Payload::Enveloped(envelope) => {
            if !envelope.success || !raw.status.is_success() {
                return Err(GatewayError::RemoteRejected(
                    envelope
                        .error
                        .or(envelope.message)
                        .unwrap_or_else(|| fallback.to_string()),
                ));
            }
            envelope.into_data()
        }
    }
}

fn decode_created(raw: &RawResponse) -> Result<Created, GatewayError> {
    let envelope = decode_envelope::<Contact>(raw, "Failed to create contact")?;
    match (envelope.data, envelope.id) {
        (Some(contact), _) => Ok(Created::Record(contact)),
        (None, Some(id)) => Ok(Created::Id(id)),
        (None, None) => Err(GatewayError::MalformedResponse(
            "create acknowledgement carried neither record nor id".to_string(),
        )),
    }
}

/// The SQL envelope carries its own success flag, so it is read whatever the HTTP status.
fn decode_sql_envelope(raw: &RawResponse) -> Result<SqlEnvelope, GatewayError> {
    parse_body(raw)
}

fn decode_history(raw: &RawResponse) -> Result<Vec<SqlHistoryRecord>, GatewayError> {
    let records: Vec<WireHistoryRecord> = decode_payload(raw, "Failed to fetch query history")?;
    Ok(records
        .into_iter()
        .filter_map(|record| {
            let Some(timestamp) = parse_timestamp(&record.timestamp) else {
                warn!(timestamp = %record.timestamp, "skipping history row with unreadable timestamp");
                return None;
            };
            Some(SqlHistoryRecord {
                id: record.id,
                query: record.query,
                timestamp,
                result: record.result.and_then(history_result),
            })
        })
        .collect())
}

// Some engines store the result as a JSON-encoded string.
fn history_result(value: Value) -> Option<SqlEnvelope> {
    match value {
        Value::String(encoded) => serde_json::from_str(&encoded).ok(),
        Value::Null => None,
        other => serde_json::from_value(other).ok(),
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn decode_health(raw: &RawResponse) -> Result<(), GatewayError> {
    if !raw.status.is_success() {
        return Err(status_rejection(raw.status));
    }
    let body: HealthBody = serde_json::from_str(&raw.body).unwrap_or_default();
    let reported_down = body.success == Some(false)
        || body
            .status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("unhealthy"));
    if reported_down {
        return Err(GatewayError::RemoteRejected(
            body.error.unwrap_or_else(|| "Engine reported unhealthy".to_string()),
        ));
    }
    Ok(())
}
