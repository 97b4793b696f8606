use std::cell::Cell;

use tracing::{debug, info, warn};

use crate::contact_store::ContactStore;
use crate::events::{ActiveView, ConsoleEvent, InvalidationSubscriber};
use crate::gateway::{ContactsGateway, GatewayError, HealthGateway, SchemaGateway, SqlGateway};
use crate::health::{HealthMonitor, HealthStatus};
use crate::normalizer::QueryResult;
use crate::schema_model::SchemaModel;
use crate::sequencing::ResponseOrdering;
use crate::sql_console::{SqlConsole, SqlConsoleError};

/// Every remote capability the console uses, behind one cloneable handle.
pub trait EngineGateway:
    ContactsGateway + SqlGateway + SchemaGateway + HealthGateway + Clone
{
}

impl<T> EngineGateway for T where
    T: ContactsGateway + SqlGateway + SchemaGateway + HealthGateway + Clone
{
}

#[derive(Debug)]
pub struct RefreshFailure {
    pub subscriber: &'static str,
    pub error: GatewayError,
}

/// Which models re-fetched after an event, and which of those refreshes failed.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub refreshed: Vec<&'static str>,
    pub failures: Vec<RefreshFailure>,
}

impl RefreshReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn did_refresh(&self, subscriber: &str) -> bool {
        self.refreshed.iter().any(|name| *name == subscriber)
    }
}

#[derive(Debug)]
pub struct StatementOutcome {
    pub result: QueryResult,
    pub refresh: RefreshReport,
}

/// Owns the three stateful views and routes invalidation between them.
///
/// Models never call each other. The coordinator publishes a [`ConsoleEvent`] and
/// each model decides from the event alone whether its data went stale.
#[derive(Debug)]
pub struct ConsoleCoordinator<G: EngineGateway> {
    active: Cell<ActiveView>,
    contacts: ContactStore<G>,
    console: SqlConsole<G>,
    schema: SchemaModel<G>,
    health: HealthMonitor<G>,
}

impl<G: EngineGateway> ConsoleCoordinator<G> {
    #[must_use]
    pub fn new(gateway: G, ordering: ResponseOrdering) -> Self {
        Self {
            active: Cell::new(ActiveView::default()),
            contacts: ContactStore::new(gateway.clone(), ordering),
            console: SqlConsole::new(gateway.clone(), ordering),
            schema: SchemaModel::new(gateway.clone(), ordering),
            health: HealthMonitor::new(gateway),
        }
    }

    #[must_use]
    pub fn active_view(&self) -> ActiveView {
        self.active.get()
    }

    #[must_use]
    pub fn contacts(&self) -> &ContactStore<G> {
        &self.contacts
    }

    #[must_use]
    pub fn console(&self) -> &SqlConsole<G> {
        &self.console
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaModel<G> {
        &self.schema
    }

    #[must_use]
    pub fn health(&self) -> &HealthMonitor<G> {
        &self.health
    }

    /// Initial load: the contact list plus the first health probe.
    pub async fn mount(&self) -> (RefreshReport, HealthStatus) {
        let mut report = RefreshReport::default();
        refresh_one(&self.contacts, &mut report).await;
        let status = self.health.check().await;
        info!(health = status.label(), "console mounted");
        (report, status)
    }

    /// Switches views. Any view may follow any other.
    pub async fn activate(&self, view: ActiveView) -> RefreshReport {
        let previous = self.active.replace(view);
        debug!(from = previous.label(), to = view.label(), "view activated");
        self.publish(ConsoleEvent::ViewActivated(view)).await
    }

    pub async fn execute_sql(&self, query: &str) -> Result<StatementOutcome, SqlConsoleError> {
        let result = self.console.submit(query).await?;
        Ok(self.after_statement(result).await)
    }

    pub async fn run_editor(&self) -> Result<StatementOutcome, SqlConsoleError> {
        let result = self.console.run_editor().await?;
        Ok(self.after_statement(result).await)
    }

    async fn after_statement(&self, result: QueryResult) -> StatementOutcome {
        let event = ConsoleEvent::StatementExecuted {
            active_view: self.active.get(),
            succeeded: result.is_success(),
        };
        let refresh = self.publish(event).await;
        StatementOutcome { result, refresh }
    }

    pub async fn publish(&self, event: ConsoleEvent) -> RefreshReport {
        let subscribers: [&dyn InvalidationSubscriber; 3] =
            [&self.contacts, &self.schema, self.console.ledger()];

        let mut report = RefreshReport::default();
        for subscriber in subscribers {
            if subscriber.is_invalidated_by(&event) {
                refresh_one(subscriber, &mut report).await;
            }
        }
        report
    }
}

async fn refresh_one(subscriber: &dyn InvalidationSubscriber, report: &mut RefreshReport) {
    let name = subscriber.subscriber_name();
    report.refreshed.push(name);
    if let Err(error) = subscriber.invalidate().await {
        warn!(subscriber = name, %error, "refresh after event failed");
        report.failures.push(RefreshFailure {
            subscriber: name,
            error,
        });
    }
}
