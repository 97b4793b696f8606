use std::cell::RefCell;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gateway::{ErrorKind, SqlGateway};
use crate::history::QueryLedger;
use crate::normalizer::{normalize, QueryResult};
use crate::sequencing::{RequestSequencer, ResponseOrdering};

pub const DEFAULT_EDITOR_TEXT: &str = "SELECT * FROM contacts LIMIT 10";

pub const SAMPLE_QUERIES: [&str; 10] = [
    "SELECT * FROM contacts",
    "SELECT name, email FROM contacts WHERE name LIKE '%john%'",
    "SELECT COUNT(*) as total_contacts FROM contacts",
    "SELECT * FROM contacts ORDER BY created_at DESC",
    "SELECT company, COUNT(*) as count FROM contacts GROUP BY company",
    "INSERT INTO contacts (name, email, phone) VALUES ('John Doe', 'john@example.com', '1234567890')",
    "UPDATE contacts SET phone = '0987654321' WHERE email = 'john@example.com'",
    "DELETE FROM contacts WHERE id = 1",
    "CREATE INDEX idx_contacts_email ON contacts (email)",
    "DROP INDEX idx_contacts_email ON contacts",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlConsoleError {
    #[error("SQL statement is empty")]
    EmptyStatement,
    #[error("no history entry at position {0}")]
    UnknownHistoryEntry(usize),
    #[error("no sample query at position {0}")]
    UnknownSample(usize),
}

impl SqlConsoleError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Editor buffer, last displayed result and the history ledger of the SQL console.
///
/// Statements go to the engine verbatim; the console never inspects SQL text beyond
/// rejecting a blank buffer.
#[derive(Debug)]
pub struct SqlConsole<B: SqlGateway + Clone> {
    backend: B,
    ledger: QueryLedger<B>,
    editor: RefCell<String>,
    last_result: RefCell<Option<QueryResult>>,
    sequencer: RequestSequencer,
}

impl<B: SqlGateway + Clone> SqlConsole<B> {
    #[must_use]
    pub fn new(backend: B, ordering: ResponseOrdering) -> Self {
        Self {
            ledger: QueryLedger::new(backend.clone(), ordering),
            backend,
            editor: RefCell::new(DEFAULT_EDITOR_TEXT.to_string()),
            last_result: RefCell::new(None),
            sequencer: RequestSequencer::new(ordering),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &QueryLedger<B> {
        &self.ledger
    }

    #[must_use]
    pub fn editor_text(&self) -> String {
        self.editor.borrow().clone()
    }

    pub fn set_editor_text(&self, text: impl Into<String>) {
        self.editor.replace(text.into());
    }

    #[must_use]
    pub fn last_result(&self) -> Option<QueryResult> {
        self.last_result.borrow().clone()
    }

    pub fn clear_result(&self) {
        self.last_result.replace(None);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sequencer.is_loading()
    }

    /// Executes `query` and records it in the ledger.
    ///
    /// Engine and transport failures come back as a failed [`QueryResult`]; only a
    /// blank statement is an `Err`, and it never reaches the engine.
    pub async fn submit(&self, query: &str) -> Result<QueryResult, SqlConsoleError> {
        if query.trim().is_empty() {
            return Err(SqlConsoleError::EmptyStatement);
        }

        let ticket = self.sequencer.issue();
        debug!(sequence = ticket.sequence(), "executing statement");

        let result = normalize(self.backend.execute_sql(query).await);
        match result.error() {
            Some(error) => warn!(sequence = ticket.sequence(), error, "statement failed"),
            None => info!(sequence = ticket.sequence(), "statement executed"),
        }

        if self.sequencer.admit(ticket).is_current() {
            self.last_result.replace(Some(result.clone()));
        } else {
            warn!(sequence = ticket.sequence(), "discarding stale statement result");
        }

        self.ledger.append(query, result.clone());
        self.ledger.list().await;
        Ok(result)
    }

    pub async fn run_editor(&self) -> Result<QueryResult, SqlConsoleError> {
        let text = self.editor_text();
        self.submit(&text).await
    }

    /// Copies a history entry's query into the editor without running it.
    pub fn replay(&self, position: usize) -> Result<String, SqlConsoleError> {
        let query = self
            .ledger
            .load_into(position)
            .ok_or(SqlConsoleError::UnknownHistoryEntry(position))?;
        self.set_editor_text(query.clone());
        Ok(query)
    }

    pub fn load_sample(&self, position: usize) -> Result<&'static str, SqlConsoleError> {
        let sample = SAMPLE_QUERIES
            .get(position)
            .copied()
            .ok_or(SqlConsoleError::UnknownSample(position))?;
        self.set_editor_text(sample);
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use chrono::Utc;

    use super::{SqlConsole, SqlConsoleError, DEFAULT_EDITOR_TEXT, SAMPLE_QUERIES};
    use crate::gateway::{
        GatewayError, SqlEnvelope, SqlGateway, SqlHistoryRecord, ENGINE_UNREACHABLE_MESSAGE,
    };
    use crate::sequencing::ResponseOrdering;

    #[derive(Debug, Clone, Default)]
    struct FakeSqlBackend {
        executed: Arc<Mutex<Vec<String>>>,
        history: Arc<Mutex<Vec<SqlHistoryRecord>>>,
        offline: Arc<AtomicUsize>,
        history_calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SqlGateway for FakeSqlBackend {
        async fn execute_sql(&self, query: &str) -> Result<SqlEnvelope, GatewayError> {
            if self.offline.load(Ordering::Relaxed) > 0 {
                return Err(GatewayError::NetworkUnreachable("refused".to_string()));
            }
            self.executed
                .lock()
                .expect("executed lock poisoned")
                .push(query.to_string());

            let envelope = if query.starts_with("SELECT") {
                SqlEnvelope {
                    success: true,
                    data: Some(Vec::new()),
                    ..SqlEnvelope::default()
                }
            } else {
                SqlEnvelope {
                    success: false,
                    error: Some("near \"FROB\": syntax error".to_string()),
                    ..SqlEnvelope::default()
                }
            };
            self.history
                .lock()
                .expect("history lock poisoned")
                .push(SqlHistoryRecord {
                    id: None,
                    query: query.to_string(),
                    timestamp: Utc::now(),
                    result: Some(envelope.clone()),
                });
            Ok(envelope)
        }

        async fn query_history(&self) -> Result<Vec<SqlHistoryRecord>, GatewayError> {
            self.history_calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.history.lock().expect("history lock poisoned").clone())
        }
    }

    fn console(backend: &FakeSqlBackend) -> SqlConsole<FakeSqlBackend> {
        SqlConsole::new(backend.clone(), ResponseOrdering::default())
    }

    #[tokio::test]
    async fn blank_statement_never_reaches_engine_or_ledger() {
        let backend = FakeSqlBackend::default();
        let console = console(&backend);

        let error = console.submit("  \n\t").await.expect_err("blank should fail");

        assert_eq!(error, SqlConsoleError::EmptyStatement);
        assert!(backend.executed.lock().expect("executed lock poisoned").is_empty());
        assert_eq!(backend.history_calls.load(Ordering::Relaxed), 0);
        assert!(console.ledger().entries().is_empty());
    }

    #[tokio::test]
    async fn submission_records_result_and_relists_history() {
        let backend = FakeSqlBackend::default();
        let console = console(&backend);

        let result = console
            .submit("SELECT * FROM contacts")
            .await
            .expect("statement should be submitted");

        assert!(result.is_success());
        assert_eq!(console.last_result(), Some(result));
        assert_eq!(backend.history_calls.load(Ordering::Relaxed), 1);
        assert_eq!(console.ledger().entries()[0].query, "SELECT * FROM contacts");
        assert!(!console.is_running());
    }

    #[tokio::test]
    async fn engine_rejection_is_a_failed_result_not_an_error() {
        let backend = FakeSqlBackend::default();
        let console = console(&backend);

        let result = console
            .submit("FROB contacts")
            .await
            .expect("rejected statement is still a submission");

        assert_eq!(result.error(), Some("near \"FROB\": syntax error"));
        assert!(!console.ledger().entries()[0].result.is_success());
    }

    #[tokio::test]
    async fn unreachable_engine_shows_fixed_message() {
        let backend = FakeSqlBackend::default();
        backend.offline.store(1, Ordering::Relaxed);
        let console = console(&backend);

        let result = console
            .submit("SELECT 1")
            .await
            .expect("transport failure is still a submission");

        assert_eq!(result.error(), Some(ENGINE_UNREACHABLE_MESSAGE));
    }

    #[tokio::test]
    async fn replay_fills_editor_without_executing() {
        let backend = FakeSqlBackend::default();
        let console = console(&backend);
        assert_eq!(console.editor_text(), DEFAULT_EDITOR_TEXT);
        console
            .submit("SELECT name FROM contacts")
            .await
            .expect("statement should be submitted");
        console.set_editor_text("something else");

        let replayed = console.replay(0).expect("entry 0 should exist");

        assert_eq!(replayed, "SELECT name FROM contacts");
        assert_eq!(console.editor_text(), "SELECT name FROM contacts");
        assert_eq!(backend.executed.lock().expect("executed lock poisoned").len(), 1);
        assert_eq!(console.replay(9), Err(SqlConsoleError::UnknownHistoryEntry(9)));
    }

    #[tokio::test]
    async fn run_editor_submits_buffer_and_clear_resets_result() {
        let backend = FakeSqlBackend::default();
        let console = console(&backend);

        console.run_editor().await.expect("default buffer should run");
        assert_eq!(
            backend.executed.lock().expect("executed lock poisoned")[0],
            DEFAULT_EDITOR_TEXT
        );

        console.clear_result();
        assert!(console.last_result().is_none());
    }

    #[test]
    fn samples_load_into_editor() {
        let console = console(&FakeSqlBackend::default());

        assert_eq!(console.load_sample(2), Ok(SAMPLE_QUERIES[2]));
        assert_eq!(console.editor_text(), SAMPLE_QUERIES[2]);
        assert_eq!(
            console.load_sample(SAMPLE_QUERIES.len()),
            Err(SqlConsoleError::UnknownSample(SAMPLE_QUERIES.len()))
        );
    }
}
