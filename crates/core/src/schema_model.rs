use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{ActiveView, ConsoleEvent, InvalidationSubscriber};
use crate::gateway::{ErrorKind, GatewayError, IndexRequest, SchemaGateway};
use crate::sequencing::{Applied, RequestSequencer, ResponseOrdering};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    #[serde(default)]
    pub table_name: String,
    pub column_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    /// The sole primary-key column. Composite keys are not modelled and yield `None`.
    #[must_use]
    pub fn primary_key(&self) -> Option<&ColumnSchema> {
        let mut primary = self.columns.iter().filter(|column| column.is_primary);
        let first = primary.next()?;
        primary.next().is_none().then_some(first)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.name == name)
    }

    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Stamps the owning table on every index and drops repeated index names.
    fn sanitized(mut self) -> Self {
        let mut seen = HashSet::new();
        let table_name = self.name.clone();
        self.indexes.retain_mut(|index| {
            if !seen.insert(index.name.clone()) {
                warn!(table = %table_name, index = %index.name, "dropping duplicate index name");
                return false;
            }
            if index.table_name.is_empty() {
                index.table_name.clone_from(&table_name);
            }
            true
        });
        self
    }
}

/// Immutable view of every table the engine reported at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaSnapshot {
    tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    #[must_use]
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self {
            tables: tables.into_iter().map(TableSchema::sanitized).collect(),
        }
    }

    #[must_use]
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }

    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.name.clone()).collect()
    }

    #[must_use]
    pub fn indexes_of(&self, table: &str) -> Vec<IndexSchema> {
        self.table(table)
            .map(|table| table.indexes.clone())
            .unwrap_or_default()
    }

    fn with_table(&self, replacement: TableSchema) -> Self {
        let replacement = replacement.sanitized();
        let mut tables = self.tables.clone();
        match tables
            .iter_mut()
            .find(|table| table.name == replacement.name)
        {
            Some(existing) => *existing = replacement,
            None => tables.push(replacement),
        }
        Self { tables }
    }
}

#[derive(Debug, Error)]
pub enum SchemaModelError {
    #[error("column name is required")]
    MissingColumn,
    #[error("index name is required")]
    MissingIndexName,
    #[error("table `{0}` is not in the current schema")]
    UnknownTable(String),
    #[error("schema request failed: {0}")]
    Gateway(#[source] GatewayError),
    #[error("index change applied but schema refresh failed: {0}")]
    RefreshAfterMutation(#[source] GatewayError),
}

impl SchemaModelError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingColumn | Self::MissingIndexName | Self::UnknownTable(_) => {
                ErrorKind::Validation
            }
            Self::Gateway(error) | Self::RefreshAfterMutation(error) => error.kind(),
        }
    }

    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Gateway(error) => error.user_message(),
            Self::RefreshAfterMutation(error) => {
                format!("Index change applied, but refresh failed: {}", error.user_message())
            }
            Self::MissingColumn | Self::MissingIndexName | Self::UnknownTable(_) => {
                self.to_string()
            }
        }
    }
}

/// Snapshot of tables and indexes plus the table currently selected for display.
///
/// Every update builds a complete [`SchemaSnapshot`] and swaps it in with a single
/// assignment, so readers never observe a half-applied refresh.
#[derive(Debug)]
pub struct SchemaModel<B: SchemaGateway> {
    backend: B,
    snapshot: RefCell<Option<Arc<SchemaSnapshot>>>,
    selected_table: RefCell<Option<String>>,
    sequencer: RequestSequencer,
}

impl<B: SchemaGateway> SchemaModel<B> {
    #[must_use]
    pub fn new(backend: B, ordering: ResponseOrdering) -> Self {
        Self {
            backend,
            snapshot: RefCell::new(None),
            selected_table: RefCell::new(None),
            sequencer: RequestSequencer::new(ordering),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<SchemaSnapshot>> {
        self.snapshot.borrow().clone()
    }

    #[must_use]
    pub fn selected_table(&self) -> Option<String> {
        self.selected_table.borrow().clone()
    }

    #[must_use]
    pub fn current_table(&self) -> Option<TableSchema> {
        let selected = self.selected_table()?;
        self.snapshot()?.table(&selected).cloned()
    }

    pub fn select_table(&self, name: &str) -> Result<(), SchemaModelError> {
        let exists = self
            .snapshot()
            .is_some_and(|snapshot| snapshot.table(name).is_some());
        if !exists {
            return Err(SchemaModelError::UnknownTable(name.to_string()));
        }
        self.selected_table.replace(Some(name.to_string()));
        Ok(())
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.sequencer.is_loading()
    }

    pub async fn refresh(&self) -> Result<Arc<SchemaSnapshot>, SchemaModelError> {
        self.reload().await.map_err(SchemaModelError::Gateway)
    }

    /// Re-fetches one table and swaps in a snapshot where only that table changed.
    pub async fn refresh_table(&self, name: &str) -> Result<Arc<SchemaSnapshot>, SchemaModelError> {
        let ticket = self.sequencer.issue();
        debug!(sequence = ticket.sequence(), table = name, "refreshing table schema");

        let fetched = self.backend.fetch_table_schema(name).await;
        let applied = self.sequencer.admit(ticket);
        let table = fetched.map_err(SchemaModelError::Gateway)?;

        if applied == Applied::Stale {
            warn!(sequence = ticket.sequence(), "discarding stale table schema response");
            return Ok(self.snapshot().unwrap_or_default());
        }
        let next = self.snapshot().unwrap_or_default().with_table(table);
        Ok(self.install(next))
    }

    pub async fn create_index(
        &self,
        table: &str,
        column: &str,
        index_name: Option<&str>,
    ) -> Result<Arc<SchemaSnapshot>, SchemaModelError> {
        let column = column.trim();
        if column.is_empty() {
            return Err(SchemaModelError::MissingColumn);
        }
        let request = IndexRequest {
            table_name: table.to_string(),
            column_name: column.to_string(),
            index_name: index_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        };

        if let Err(error) = self.backend.create_index(&request).await {
            warn!(table, column, %error, "index creation rejected");
            return Err(SchemaModelError::Gateway(error));
        }
        info!(table, column, "index created");
        self.refresh_after_mutation().await
    }

    pub async fn drop_index(
        &self,
        table: &str,
        index_name: &str,
    ) -> Result<Arc<SchemaSnapshot>, SchemaModelError> {
        let index_name = index_name.trim();
        if index_name.is_empty() {
            return Err(SchemaModelError::MissingIndexName);
        }

        if let Err(error) = self.backend.drop_index(table, index_name).await {
            warn!(table, index = index_name, %error, "index drop rejected");
            return Err(SchemaModelError::Gateway(error));
        }
        info!(table, index = index_name, "index dropped");
        self.refresh_after_mutation().await
    }

    async fn refresh_after_mutation(&self) -> Result<Arc<SchemaSnapshot>, SchemaModelError> {
        self.reload()
            .await
            .map_err(SchemaModelError::RefreshAfterMutation)
    }

    async fn reload(&self) -> Result<Arc<SchemaSnapshot>, GatewayError> {
        let ticket = self.sequencer.issue();
        debug!(sequence = ticket.sequence(), "refreshing schema");

        let fetched = self.backend.fetch_schema().await;
        let applied = self.sequencer.admit(ticket);
        let tables = fetched?;

        if applied == Applied::Stale {
            warn!(sequence = ticket.sequence(), "discarding stale schema response");
            return Ok(self.snapshot().unwrap_or_default());
        }
        Ok(self.install(SchemaSnapshot::new(tables)))
    }

    fn install(&self, next: SchemaSnapshot) -> Arc<SchemaSnapshot> {
        let next = Arc::new(next);
        // Falls back to the first table whenever nothing valid is selected.
        let selection = self
            .selected_table()
            .filter(|selected| next.table(selected).is_some())
            .or_else(|| next.tables().first().map(|table| table.name.clone()));

        self.snapshot.replace(Some(Arc::clone(&next)));
        self.selected_table.replace(selection);
        next
    }
}

#[async_trait(?Send)]
impl<B: SchemaGateway> InvalidationSubscriber for SchemaModel<B> {
    fn subscriber_name(&self) -> &'static str {
        "schema"
    }

    fn is_invalidated_by(&self, event: &ConsoleEvent) -> bool {
        matches!(event, ConsoleEvent::ViewActivated(ActiveView::SchemaBrowser))
    }

    async fn invalidate(&self) -> Result<(), GatewayError> {
        self.reload().await.map(|_| ())
    }
}
