use std::cell::RefCell;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::events::{ActiveView, ConsoleEvent, InvalidationSubscriber};
use crate::gateway::{GatewayError, SqlGateway, SqlHistoryRecord};
use crate::normalizer::{normalize_envelope, QueryResult};
use crate::sequencing::{Applied, RequestSequencer, ResponseOrdering};

pub const MISSING_RESULT_MESSAGE: &str = "No result recorded";

/// Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: Option<u64>,
    pub query: String,
    pub result: QueryResult,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    #[must_use]
    pub fn local(query: impl Into<String>, result: QueryResult) -> Self {
        Self {
            id: None,
            query: query.into(),
            result,
            created_at: Utc::now(),
        }
    }

    fn from_record(record: SqlHistoryRecord) -> Self {
        let result = record.result.map_or_else(
            || QueryResult::failure(MISSING_RESULT_MESSAGE),
            normalize_envelope,
        );
        Self {
            id: record.id,
            query: record.query,
            result,
            created_at: record.timestamp,
        }
    }

    /// Single-line preview for history listings.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let flattened = self.query.split_whitespace().collect::<Vec<_>>().join(" ");
        if flattened.chars().count() <= max_chars {
            return flattened;
        }
        let mut truncated = flattened.chars().take(max_chars).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

/// Append-only, newest-first log of submitted statements.
///
/// The engine is the source of truth: [`QueryLedger::list`] replaces the local view
/// with whatever the engine reports, so a local [`QueryLedger::append`] is only
/// visible until the next listing.
#[derive(Debug)]
pub struct QueryLedger<B: SqlGateway> {
    backend: B,
    entries: RefCell<Arc<Vec<HistoryEntry>>>,
    sequencer: RequestSequencer,
}

impl<B: SqlGateway> QueryLedger<B> {
    #[must_use]
    pub fn new(backend: B, ordering: ResponseOrdering) -> Self {
        Self {
            backend,
            entries: RefCell::new(Arc::new(Vec::new())),
            sequencer: RequestSequencer::new(ordering),
        }
    }

    pub fn append(&self, query: impl Into<String>, result: QueryResult) {
        let entry = HistoryEntry::local(query, result);
        let current = self.entries();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.push(entry);
        next.extend(current.iter().cloned());
        self.entries.replace(Arc::new(next));
    }

    /// Re-fetches the full history. A failed fetch degrades to an empty history.
    pub async fn list(&self) -> Arc<Vec<HistoryEntry>> {
        let ticket = self.sequencer.issue();
        debug!(sequence = ticket.sequence(), "listing query history");

        let fetched = match self.backend.query_history().await {
            Ok(records) => {
                let mut entries = records
                    .into_iter()
                    .map(HistoryEntry::from_record)
                    .collect::<Vec<_>>();
                entries.sort_by(|left, right| right.created_at.cmp(&left.created_at));
                entries
            }
            Err(error) => {
                warn!(%error, "query history unavailable, showing empty history");
                Vec::new()
            }
        };

        if self.sequencer.admit(ticket) == Applied::Stale {
            warn!(
                sequence = ticket.sequence(),
                "discarding stale query history response"
            );
        } else {
            self.entries.replace(Arc::new(fetched));
        }
        self.entries()
    }

    #[must_use]
    pub fn entries(&self) -> Arc<Vec<HistoryEntry>> {
        Arc::clone(&self.entries.borrow())
    }

    #[must_use]
    pub fn entry(&self, position: usize) -> Option<HistoryEntry> {
        self.entries.borrow().get(position).cloned()
    }

    /// Query text of the entry at `position`, for re-populating the editor. Never executes it.
    #[must_use]
    pub fn load_into(&self, position: usize) -> Option<String> {
        self.entries
            .borrow()
            .get(position)
            .map(|entry| entry.query.clone())
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.sequencer.is_loading()
    }
}

#[async_trait(?Send)]
impl<B: SqlGateway> InvalidationSubscriber for QueryLedger<B> {
    fn subscriber_name(&self) -> &'static str {
        "history"
    }

    fn is_invalidated_by(&self, event: &ConsoleEvent) -> bool {
        matches!(event, ConsoleEvent::ViewActivated(ActiveView::SqlConsole))
    }

    // Listing never fails; an unavailable history shows as empty.
    async fn invalidate(&self) -> Result<(), GatewayError> {
        self.list().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use chrono::{TimeZone, Utc};

    use super::{HistoryEntry, QueryLedger, MISSING_RESULT_MESSAGE};
    use crate::events::{ActiveView, ConsoleEvent, InvalidationSubscriber};
    use crate::gateway::{GatewayError, SqlEnvelope, SqlGateway, SqlHistoryRecord};
    use crate::normalizer::QueryResult;
    use crate::sequencing::ResponseOrdering;

    #[derive(Debug, Clone, Default)]
    struct FakeHistoryBackend {
        records: Arc<Mutex<Vec<SqlHistoryRecord>>>,
        unavailable: Arc<AtomicBool>,
        list_calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SqlGateway for FakeHistoryBackend {
        async fn execute_sql(&self, _query: &str) -> Result<SqlEnvelope, GatewayError> {
            Ok(SqlEnvelope::default())
        }

        async fn query_history(&self) -> Result<Vec<SqlHistoryRecord>, GatewayError> {
            self.list_calls.fetch_add(1, Ordering::Relaxed);
            if self.unavailable.load(Ordering::Relaxed) {
                return Err(GatewayError::NetworkUnreachable("refused".to_string()));
            }
            Ok(self.records.lock().expect("records lock poisoned").clone())
        }
    }

    fn record(id: u64, query: &str, minute: u32, result: Option<SqlEnvelope>) -> SqlHistoryRecord {
        SqlHistoryRecord {
            id: Some(id),
            query: query.to_string(),
            timestamp: Utc
                .with_ymd_and_hms(2026, 3, 1, 12, minute, 0)
                .single()
                .expect("valid fixture timestamp"),
            result,
        }
    }

    fn ok_envelope() -> SqlEnvelope {
        SqlEnvelope {
            success: true,
            ..SqlEnvelope::default()
        }
    }

    #[test]
    fn append_inserts_at_head_without_deduplicating() {
        let ledger = QueryLedger::new(FakeHistoryBackend::default(), ResponseOrdering::default());
        ledger.append("SELECT 1", QueryResult::failure("x"));
        ledger.append("SELECT 2", QueryResult::failure("y"));
        ledger.append("SELECT 2", QueryResult::failure("y"));

        let queries = ledger
            .entries()
            .iter()
            .map(|entry| entry.query.clone())
            .collect::<Vec<_>>();
        assert_eq!(queries, vec!["SELECT 2", "SELECT 2", "SELECT 1"]);
    }

    #[tokio::test]
    async fn list_replaces_local_entries_newest_first() {
        let backend = FakeHistoryBackend::default();
        backend.records.lock().expect("records lock poisoned").extend([
            record(1, "SELECT * FROM contacts", 1, Some(ok_envelope())),
            record(2, "DELETE FROM contacts", 5, None),
            record(3, "SELECT 1", 3, Some(ok_envelope())),
        ]);
        let ledger = QueryLedger::new(backend.clone(), ResponseOrdering::default());
        ledger.append("local only", QueryResult::failure("boom"));

        let entries = ledger.list().await;

        assert_eq!(backend.list_calls.load(Ordering::Relaxed), 1);
        let ids = entries.iter().map(|entry| entry.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![Some(2), Some(3), Some(1)]);
        assert_eq!(entries[0].result.error(), Some(MISSING_RESULT_MESSAGE));
        assert!(entries[1].result.is_success());
        assert!(!entries.iter().any(|entry| entry.query == "local only"));
    }

    #[tokio::test]
    async fn unavailable_history_degrades_to_empty() {
        let backend = FakeHistoryBackend::default();
        let ledger = QueryLedger::new(backend.clone(), ResponseOrdering::default());
        ledger.append("SELECT 1", QueryResult::failure("x"));
        backend.unavailable.store(true, Ordering::Relaxed);

        let entries = ledger.list().await;

        assert!(entries.is_empty());
        assert!(!ledger.is_loading());
    }

    #[test]
    fn load_into_returns_query_text_without_executing() {
        let backend = FakeHistoryBackend::default();
        let ledger = QueryLedger::new(backend.clone(), ResponseOrdering::default());
        ledger.append("SELECT * FROM contacts LIMIT 10", QueryResult::failure("x"));

        assert_eq!(
            ledger.load_into(0).as_deref(),
            Some("SELECT * FROM contacts LIMIT 10")
        );
        assert_eq!(ledger.load_into(1), None);
        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(backend.list_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn sql_console_activation_relists_history() {
        let backend = FakeHistoryBackend::default();
        backend
            .records
            .lock()
            .expect("records lock poisoned")
            .push(record(7, "SELECT 1", 0, Some(ok_envelope())));
        let ledger = QueryLedger::new(backend.clone(), ResponseOrdering::default());

        assert!(!ledger.is_invalidated_by(&ConsoleEvent::ViewActivated(ActiveView::Contacts)));
        assert!(ledger.is_invalidated_by(&ConsoleEvent::ViewActivated(ActiveView::SqlConsole)));

        ledger.invalidate().await.expect("history invalidation never fails");
        assert_eq!(backend.list_calls.load(Ordering::Relaxed), 1);
        assert_eq!(ledger.entries()[0].id, Some(7));
    }

    #[test]
    fn preview_flattens_and_truncates() {
        let entry = HistoryEntry::local(
            "SELECT name,\n       email\nFROM contacts",
            QueryResult::failure("x"),
        );

        assert_eq!(entry.preview(80), "SELECT name, email FROM contacts");
        assert_eq!(entry.preview(6), "SELECT...");
    }
}
