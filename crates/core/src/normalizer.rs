use serde_json::Value;

use crate::gateway::{GatewayError, SqlEnvelope};

pub type ResultRow = serde_json::Map<String, Value>;

pub const GENERIC_FAILURE_MESSAGE: &str = "Query execution failed";
pub const NO_DATA_MESSAGE: &str = "No data returned";
pub const RESULT_PREVIEW_LIMIT: usize = 100;

/// Outcome of one submitted statement. Exactly one variant holds.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Success(QuerySuccess),
    Failure(QueryFailure),
}

/// Each field is `None` only when the engine left it out of the payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySuccess {
    pub rows: Option<Vec<ResultRow>>,
    pub rows_affected: Option<u64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    pub error: String,
}

impl QueryResult {
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure(QueryFailure {
            error: error.into(),
        })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(&failure.error),
        }
    }

    #[must_use]
    pub fn rows(&self) -> Option<&[ResultRow]> {
        match self {
            Self::Success(success) => success.rows.as_deref(),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn render(&self) -> RenderedResult {
        match self {
            Self::Failure(failure) => RenderedResult::Error(failure.error.clone()),
            Self::Success(QuerySuccess {
                rows: Some(rows),
                rows_affected,
                ..
            }) => render_table(rows, *rows_affected),
            Self::Success(QuerySuccess {
                rows: None,
                rows_affected,
                message,
            }) => RenderedResult::Acknowledgement {
                message: message
                    .clone()
                    .unwrap_or_else(|| NO_DATA_MESSAGE.to_string()),
                rows_affected: *rows_affected,
            },
        }
    }
}

/// Turns a gateway outcome for `POST /sql/execute` into a [`QueryResult`].
///
/// Pure: the same input always yields the same value.
#[must_use]
pub fn normalize(outcome: Result<SqlEnvelope, GatewayError>) -> QueryResult {
    match outcome {
        Err(error) => QueryResult::failure(error.user_message()),
        Ok(envelope) => normalize_envelope(envelope),
    }
}

#[must_use]
pub fn normalize_envelope(envelope: SqlEnvelope) -> QueryResult {
    if !envelope.success {
        let error = envelope
            .error
            .or(envelope.message)
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
        return QueryResult::failure(error);
    }

    QueryResult::Success(QuerySuccess {
        rows: envelope.data,
        rows_affected: envelope.rows_affected,
        message: envelope.message,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedResult {
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        total_rows: usize,
        rows_affected: Option<u64>,
    },
    Acknowledgement {
        message: String,
        rows_affected: Option<u64>,
    },
    Error(String),
}

impl RenderedResult {
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Table { rows, total_rows, .. } if rows.len() < *total_rows)
    }
}

fn render_table(rows: &[ResultRow], rows_affected: Option<u64>) -> RenderedResult {
    let columns = rows
        .first()
        .map(|row| row.keys().cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    let rendered = rows
        .iter()
        .take(RESULT_PREVIEW_LIMIT)
        .map(|row| row.values().map(render_cell).collect::<Vec<_>>())
        .collect();

    RenderedResult::Table {
        columns,
        rows: rendered,
        total_rows: rows.len(),
        rows_affected,
    }
}

#[must_use]
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(text) => text.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        normalize, normalize_envelope, render_cell, QueryResult, RenderedResult, ResultRow,
        GENERIC_FAILURE_MESSAGE, NO_DATA_MESSAGE, RESULT_PREVIEW_LIMIT,
    };
    use crate::gateway::{GatewayError, SqlEnvelope, ENGINE_UNREACHABLE_MESSAGE};

    fn row(value: serde_json::Value) -> ResultRow {
        value.as_object().cloned().expect("row fixture must be an object")
    }

    fn envelope(raw: &str) -> SqlEnvelope {
        serde_json::from_str(raw).expect("envelope fixture should parse")
    }

    #[test]
    fn transport_failure_becomes_fixed_message() {
        let result = normalize(Err(GatewayError::NetworkUnreachable(
            "dns error: no such host".to_string(),
        )));

        assert_eq!(result, QueryResult::failure(ENGINE_UNREACHABLE_MESSAGE));
    }

    #[test]
    fn remote_failure_is_verbatim_with_generic_fallback() {
        let verbatim =
            normalize_envelope(envelope(r#"{"success": false, "error": "no such table: ghosts"}"#));
        assert_eq!(verbatim.error(), Some("no such table: ghosts"));

        let fallback = normalize_envelope(envelope(r#"{"success": false}"#));
        assert_eq!(fallback.error(), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[test]
    fn success_preserves_field_presence() {
        let select = normalize_envelope(envelope(r#"{"success": true, "data": []}"#));
        let update = normalize_envelope(envelope(r#"{"success": true, "rows_affected": 3}"#));

        let QueryResult::Success(select) = select else {
            panic!("select should succeed");
        };
        assert_eq!(select.rows, Some(Vec::new()));
        assert_eq!(select.message, None);

        let QueryResult::Success(update) = update else {
            panic!("update should succeed");
        };
        assert_eq!(update.rows, None);
        assert_eq!(update.rows_affected, Some(3));
        assert_eq!(update.message, None);
    }

    #[test]
    fn bare_acknowledgement_is_a_valid_success() {
        let result = normalize_envelope(envelope(r#"{"success": true}"#));

        assert!(result.is_success());
        assert_eq!(
            result.render(),
            RenderedResult::Acknowledgement {
                message: NO_DATA_MESSAGE.to_string(),
                rows_affected: None,
            }
        );
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let raw = envelope(
            r#"{"success": true, "data": [{"id": 1, "name": "Ada"}], "message": "1 row"}"#,
        );

        assert_eq!(normalize(Ok(raw.clone())), normalize(Ok(raw)));
    }

    #[test]
    fn empty_row_set_renders_empty_table_not_message() {
        let result = normalize_envelope(envelope(
            r#"{"success": true, "data": [], "message": "ignored"}"#,
        ));

        assert_eq!(
            result.render(),
            RenderedResult::Table {
                columns: Vec::new(),
                rows: Vec::new(),
                total_rows: 0,
                rows_affected: None,
            }
        );
    }

    #[test]
    fn table_columns_follow_engine_order_and_cells_render() {
        let result = normalize_envelope(SqlEnvelope {
            success: true,
            data: Some(vec![row(json!({
                "name": "Ada",
                "id": 1,
                "phone": null,
                "tags": ["math", "engines"]
            }))]),
            ..SqlEnvelope::default()
        });

        let RenderedResult::Table { columns, rows, .. } = result.render() else {
            panic!("row-set should render as table");
        };
        assert_eq!(columns, vec!["name", "id", "phone", "tags"]);
        assert_eq!(rows[0], vec!["Ada", "1", "NULL", r#"["math","engines"]"#]);
    }

    #[test]
    fn large_row_sets_are_previewed() {
        let rows = (0..150)
            .map(|id| row(json!({ "id": id })))
            .collect::<Vec<_>>();
        let result = normalize_envelope(SqlEnvelope {
            success: true,
            data: Some(rows),
            ..SqlEnvelope::default()
        });

        let rendered = result.render();
        assert!(rendered.is_truncated());
        let RenderedResult::Table {
            rows, total_rows, ..
        } = rendered
        else {
            panic!("row-set should render as table");
        };
        assert_eq!(rows.len(), RESULT_PREVIEW_LIMIT);
        assert_eq!(total_rows, 150);
    }

    #[test]
    fn cell_rendering_keeps_strings_verbatim() {
        assert_eq!(render_cell(&json!("O'Brien")), "O'Brien");
        assert_eq!(render_cell(&json!(true)), "true");
        assert_eq!(render_cell(&json!({"k": 1})), r#"{"k":1}"#);
    }
}
