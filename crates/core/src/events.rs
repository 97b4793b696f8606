use async_trait::async_trait;

use crate::gateway::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveView {
    #[default]
    Contacts,
    SqlConsole,
    SchemaBrowser,
}

impl ActiveView {
    pub const ALL: [Self; 3] = [Self::Contacts, Self::SqlConsole, Self::SchemaBrowser];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::SqlConsole => "sql",
            Self::SchemaBrowser => "schema",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contacts" => Some(Self::Contacts),
            "sql" | "console" => Some(Self::SqlConsole),
            "schema" | "indexes" => Some(Self::SchemaBrowser),
            _ => None,
        }
    }
}

/// Something that happened in the console that may leave a model's data out of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleEvent {
    ViewActivated(ActiveView),
    StatementExecuted {
        active_view: ActiveView,
        succeeded: bool,
    },
}

/// A model that re-fetches when a [`ConsoleEvent`] affects it.
///
/// Futures are `?Send`: models keep their state in `Cell`/`RefCell` and run on a
/// single-threaded executor.
#[async_trait(?Send)]
pub trait InvalidationSubscriber {
    fn subscriber_name(&self) -> &'static str;

    fn is_invalidated_by(&self, event: &ConsoleEvent) -> bool;

    async fn invalidate(&self) -> Result<(), GatewayError>;
}
