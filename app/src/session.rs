use tabula_core::contact_store::DeleteConfirmation;
use tabula_core::contacts::ContactId;
use tabula_core::coordinator::{ConsoleCoordinator, EngineGateway, RefreshReport, StatementOutcome};
use tabula_core::events::ActiveView;
use tabula_core::sql_console::SAMPLE_QUERIES;
use tracing::debug;

use crate::commands::{is_confirmation, parse_line, Command, HELP};
use crate::render;

pub enum Flow {
    Continue(String),
    Quit,
}

/// One interactive console over a coordinator. Holds only the pending delete prompt.
pub struct Session<G: EngineGateway> {
    coordinator: ConsoleCoordinator<G>,
    pending_delete: Option<ContactId>,
}

impl<G: EngineGateway> Session<G> {
    pub fn new(coordinator: ConsoleCoordinator<G>) -> Self {
        Self {
            coordinator,
            pending_delete: None,
        }
    }

    pub fn prompt(&self) -> String {
        if let Some(id) = self.pending_delete {
            return format!("delete contact #{id}? [y/N] ");
        }
        format!("tabula[{}]> ", self.coordinator.active_view().label())
    }

    pub async fn mount(&self) -> String {
        let (report, _) = self.coordinator.mount().await;
        let contacts = self.coordinator.contacts();
        let mut out = render::health(&self.coordinator.health().report());
        out.push('\n');
        out.push_str(&render::contacts(&contacts.contacts(), None));
        push_refresh_failures(&mut out, &report);
        out
    }

    pub async fn handle_line(&mut self, line: &str) -> Flow {
        if let Some(id) = self.pending_delete.take() {
            if !is_confirmation(line) {
                return Flow::Continue("delete cancelled".to_string());
            }
            return Flow::Continue(self.delete(id).await);
        }

        let command = match parse_line(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Flow::Continue(String::new()),
            Err(error) => return Flow::Continue(error.to_string()),
        };
        debug!(?command, "console command");

        if command == Command::Quit {
            return Flow::Quit;
        }
        Flow::Continue(self.run(command).await)
    }

    async fn run(&mut self, command: Command) -> String {
        let coordinator = &self.coordinator;
        let contacts = coordinator.contacts();
        let console = coordinator.console();
        let schema = coordinator.schema();

        match command {
            Command::Sql(query) => {
                console.set_editor_text(query.clone());
                statement(coordinator.execute_sql(&query).await)
            }
            Command::Run => statement(coordinator.run_editor().await),
            Command::View(view) => {
                let report = coordinator.activate(view).await;
                let mut out = self.describe_view(view);
                push_refresh_failures(&mut out, &report);
                out
            }
            Command::Contacts => match contacts.load_all().await {
                Ok(_) => render::contacts(&contacts.contacts(), None),
                Err(error) => error.user_message(),
            },
            Command::Search(text) => match contacts.search(&text).await {
                Ok(_) => render::contacts(&contacts.contacts(), contacts.active_search().as_deref()),
                Err(error) => error.user_message(),
            },
            Command::Show(id) => match contacts.get(id).await {
                Ok(contact) => render::contact(&contact),
                Err(error) => error.user_message(),
            },
            Command::Add(draft) => match contacts.create(&draft).await {
                Ok(created) => self.after_contact_change(format!("created contact #{}", created.id)),
                Err(error) => error.user_message(),
            },
            Command::Edit(id, patch) => match contacts.update(id, &patch).await {
                Ok(()) => self.after_contact_change(format!("updated contact #{id}")),
                Err(error) => error.user_message(),
            },
            Command::Delete(id) => {
                self.pending_delete = Some(id);
                String::new()
            }
            Command::Schema => {
                if schema.snapshot().is_none() {
                    if let Err(error) = schema.refresh().await {
                        return error.user_message();
                    }
                }
                self.describe_view(ActiveView::SchemaBrowser)
            }
            Command::Table(name) => {
                if schema.snapshot().is_none() {
                    if let Err(error) = schema.refresh().await {
                        return error.user_message();
                    }
                }
                match schema.select_table(&name) {
                    Ok(()) => schema
                        .current_table()
                        .map_or_else(String::new, |table| render::table(&table)),
                    Err(error) => error.user_message(),
                }
            }
            Command::Refresh(None) => match schema.refresh().await {
                Ok(snapshot) => render::tables(&snapshot, schema.selected_table().as_deref()),
                Err(error) => error.user_message(),
            },
            Command::Refresh(Some(name)) => match schema.refresh_table(&name).await {
                Ok(snapshot) => snapshot
                    .table(&name)
                    .map_or_else(String::new, render::table),
                Err(error) => error.user_message(),
            },
            Command::CreateIndex {
                table,
                column,
                name,
            } => match schema.create_index(&table, &column, name.as_deref()).await {
                Ok(snapshot) => snapshot
                    .table(&table)
                    .map_or_else(|| "index created".to_string(), render::table),
                Err(error) => error.user_message(),
            },
            Command::DropIndex { table, name } => match schema.drop_index(&table, &name).await {
                Ok(snapshot) => snapshot
                    .table(&table)
                    .map_or_else(|| "index dropped".to_string(), render::table),
                Err(error) => error.user_message(),
            },
            Command::History => render::history(&console.ledger().list().await),
            Command::Replay(position) => match console.replay(position) {
                Ok(query) => format!("editor: {query}\n(:run to execute)"),
                Err(error) => error.to_string(),
            },
            Command::Samples => render::samples(&SAMPLE_QUERIES),
            Command::Sample(position) => match console.load_sample(position) {
                Ok(query) => format!("editor: {query}\n(:run to execute)"),
                Err(error) => error.to_string(),
            },
            Command::Editor => format!("editor: {}", console.editor_text()),
            Command::Clear => {
                console.clear_result();
                "result cleared".to_string()
            }
            Command::Health => {
                coordinator.health().check().await;
                render::health(&coordinator.health().report())
            }
            Command::Help => HELP.to_string(),
            Command::Quit => String::new(),
        }
    }

    async fn delete(&self, id: ContactId) -> String {
        let contacts = self.coordinator.contacts();
        match contacts.delete(DeleteConfirmation::confirmed(id)).await {
            Ok(()) => self.after_contact_change(format!("deleted contact #{id}")),
            Err(error) => error.user_message(),
        }
    }

    fn after_contact_change(&self, summary: String) -> String {
        let contacts = self.coordinator.contacts();
        let mut out = summary;
        out.push('\n');
        out.push_str(&render::contacts(&contacts.contacts(), None));
        if let Some(error) = contacts.last_error() {
            out.push_str("\nrefresh failed: ");
            out.push_str(&error);
        }
        out
    }

    fn describe_view(&self, view: ActiveView) -> String {
        match view {
            ActiveView::Contacts => {
                let contacts = self.coordinator.contacts();
                render::contacts(&contacts.contacts(), contacts.active_search().as_deref())
            }
            ActiveView::SqlConsole => {
                let console = self.coordinator.console();
                let mut out = render::history(&console.ledger().entries());
                out.push_str("\neditor: ");
                out.push_str(&console.editor_text());
                out
            }
            ActiveView::SchemaBrowser => {
                let schema = self.coordinator.schema();
                let Some(snapshot) = schema.snapshot() else {
                    return "schema not loaded".to_string();
                };
                let mut out = render::tables(&snapshot, schema.selected_table().as_deref());
                if let Some(table) = schema.current_table() {
                    out.push_str("\n\n");
                    out.push_str(&render::table(&table));
                }
                out
            }
        }
    }
}

fn statement<E: std::fmt::Display>(outcome: Result<StatementOutcome, E>) -> String {
    match outcome {
        Ok(outcome) => {
            let mut out = render::result(&outcome.result.render());
            if outcome.refresh.did_refresh("contacts") {
                out.push_str("\n(contact list refreshed)");
            }
            push_refresh_failures(&mut out, &outcome.refresh);
            out
        }
        Err(error) => error.to_string(),
    }
}

fn push_refresh_failures(out: &mut String, report: &RefreshReport) {
    for failure in &report.failures {
        out.push_str(&format!(
            "\n{} refresh failed: {}",
            failure.subscriber,
            failure.error.user_message()
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use tabula_core::contacts::{Contact, ContactDraft, ContactId, ContactPatch};
    use tabula_core::coordinator::ConsoleCoordinator;
    use tabula_core::gateway::{
        ContactsGateway, GatewayError, HealthGateway, IndexRequest, SchemaGateway, SqlEnvelope,
        SqlGateway, SqlHistoryRecord,
    };
    use tabula_core::schema_model::TableSchema;
    use tabula_core::sequencing::ResponseOrdering;

    use super::{Flow, Session};

    #[derive(Debug, Clone, Default)]
    struct FakeEngine {
        rows: Arc<Mutex<Vec<Contact>>>,
        executed: Arc<Mutex<Vec<String>>>,
        delete_calls: Arc<AtomicUsize>,
    }

    impl FakeEngine {
        fn with_contact(id: u64, name: &str) -> Self {
            let engine = Self::default();
            engine.rows.lock().expect("rows lock poisoned").push(Contact {
                id: ContactId(id),
                name: name.to_string(),
                email: format!("{}@x.io", name.to_lowercase()),
                phone: None,
                address: None,
                company: None,
                created_at: None,
            });
            engine
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().expect("executed lock poisoned").clone()
        }
    }

    #[async_trait::async_trait]
    impl ContactsGateway for FakeEngine {
        async fn list_contacts(&self) -> Result<Vec<Contact>, GatewayError> {
            Ok(self.rows.lock().expect("rows lock poisoned").clone())
        }

        async fn get_contact(&self, id: ContactId) -> Result<Contact, GatewayError> {
            self.rows
                .lock()
                .expect("rows lock poisoned")
                .iter()
                .find(|contact| contact.id == id)
                .cloned()
                .ok_or_else(|| GatewayError::RemoteRejected("Contact not found".to_string()))
        }

        async fn search_contacts(&self, _text: &str) -> Result<Vec<Contact>, GatewayError> {
            self.list_contacts().await
        }

        async fn create_contact(&self, _draft: &ContactDraft) -> Result<Contact, GatewayError> {
            Err(GatewayError::RemoteRejected("not used".to_string()))
        }

        async fn update_contact(
            &self,
            _id: ContactId,
            _patch: &ContactPatch,
        ) -> Result<(), GatewayError> {
            Err(GatewayError::RemoteRejected("not used".to_string()))
        }

        async fn delete_contact(&self, id: ContactId) -> Result<(), GatewayError> {
            self.delete_calls.fetch_add(1, Ordering::Relaxed);
            self.rows
                .lock()
                .expect("rows lock poisoned")
                .retain(|contact| contact.id != id);
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl SqlGateway for FakeEngine {
        async fn execute_sql(&self, query: &str) -> Result<SqlEnvelope, GatewayError> {
            self.executed
                .lock()
                .expect("executed lock poisoned")
                .push(query.to_string());
            Ok(SqlEnvelope {
                success: true,
                message: Some("ok".to_string()),
                ..SqlEnvelope::default()
            })
        }

        async fn query_history(&self) -> Result<Vec<SqlHistoryRecord>, GatewayError> {
            Ok(self
                .executed()
                .into_iter()
                .rev()
                .map(|query| SqlHistoryRecord {
                    id: None,
                    query,
                    timestamp: chrono::DateTime::default(),
                    result: None,
                })
                .collect())
        }
    }

    #[async_trait::async_trait]
    impl SchemaGateway for FakeEngine {
        async fn fetch_schema(&self) -> Result<Vec<TableSchema>, GatewayError> {
            Ok(Vec::new())
        }

        async fn fetch_table_schema(&self, table: &str) -> Result<TableSchema, GatewayError> {
            Err(GatewayError::RemoteRejected(format!("no such table: {table}")))
        }

        async fn create_index(&self, _request: &IndexRequest) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn drop_index(&self, _table: &str, _index_name: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl HealthGateway for FakeEngine {
        async fn ping(&self) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn session(engine: &FakeEngine) -> Session<FakeEngine> {
        Session::new(ConsoleCoordinator::new(
            engine.clone(),
            ResponseOrdering::default(),
        ))
    }

    async fn output(session: &mut Session<FakeEngine>, line: &str) -> String {
        match session.handle_line(line).await {
            Flow::Continue(output) => output,
            Flow::Quit => panic!("`{line}` should not quit"),
        }
    }

    #[tokio::test]
    async fn delete_waits_for_confirmation() {
        let engine = FakeEngine::with_contact(1, "Ada");
        let mut session = session(&engine);
        session.mount().await;

        assert_eq!(output(&mut session, ":delete 1").await, "");
        assert_eq!(session.prompt(), "delete contact #1? [y/N] ");
        assert_eq!(engine.delete_calls.load(Ordering::Relaxed), 0);

        assert_eq!(output(&mut session, "n").await, "delete cancelled");
        assert_eq!(engine.delete_calls.load(Ordering::Relaxed), 0);
        assert_eq!(session.prompt(), "tabula[contacts]> ");

        output(&mut session, ":delete 1").await;
        let deleted = output(&mut session, "yes").await;

        assert_eq!(engine.delete_calls.load(Ordering::Relaxed), 1);
        assert!(deleted.starts_with("deleted contact #1\n0 contacts"));
    }

    #[tokio::test]
    async fn blank_answer_cancels_delete() {
        let engine = FakeEngine::with_contact(1, "Ada");
        let mut session = session(&engine);

        output(&mut session, ":delete 1").await;
        assert_eq!(output(&mut session, "").await, "delete cancelled");
        assert_eq!(engine.delete_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn plain_sql_replaces_editor_and_executes() {
        let engine = FakeEngine::default();
        let mut session = session(&engine);

        output(&mut session, "SELECT name FROM contacts").await;

        assert_eq!(engine.executed(), vec!["SELECT name FROM contacts"]);
        assert_eq!(
            session.coordinator.console().editor_text(),
            "SELECT name FROM contacts"
        );
    }

    #[tokio::test]
    async fn replay_and_sample_only_load_the_editor() {
        let engine = FakeEngine::default();
        let mut session = session(&engine);
        output(&mut session, "SELECT 1").await;
        output(&mut session, "SELECT 2").await;

        let replayed = output(&mut session, ":replay 2").await;
        assert!(replayed.starts_with("editor: SELECT 1"));
        output(&mut session, ":sample 1").await;
        assert_eq!(engine.executed().len(), 2);

        output(&mut session, ":replay 2").await;
        output(&mut session, ":run").await;
        assert_eq!(engine.executed(), vec!["SELECT 1", "SELECT 2", "SELECT 1"]);
    }

    #[tokio::test]
    async fn quit_and_blank_lines() {
        let engine = FakeEngine::default();
        let mut session = session(&engine);

        assert_eq!(output(&mut session, "   ").await, "");
        assert!(matches!(session.handle_line(":quit").await, Flow::Quit));
        assert!(engine.executed().is_empty());
    }
}
