use std::cell::RefCell;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::contacts::{Contact, ContactDraft, ContactId, ContactPatch, ValidationErrors};
use crate::events::{ActiveView, ConsoleEvent, InvalidationSubscriber};
use crate::gateway::{ContactsGateway, ErrorKind, GatewayError};
use crate::sequencing::{Applied, RequestSequencer, RequestTicket, ResponseOrdering};

#[derive(Debug, Error)]
pub enum ContactStoreError {
    #[error("invalid contact: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("contact request failed: {0}")]
    Gateway(#[source] GatewayError),
}

impl ContactStoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Gateway(error) => error.kind(),
        }
    }

    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(errors) => errors.to_string(),
            Self::Gateway(error) => error.user_message(),
        }
    }
}

/// Proof that the user confirmed a delete. The store refuses to delete without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteConfirmation {
    id: ContactId,
}

impl DeleteConfirmation {
    #[must_use]
    pub fn confirmed(id: ContactId) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(self) -> ContactId {
        self.id
    }
}

/// The displayed contact list plus the CRUD calls that change it.
///
/// Every successful mutation re-lists the whole table; an active search filter is
/// dropped at that point.
#[derive(Debug)]
pub struct ContactStore<B: ContactsGateway> {
    backend: B,
    contacts: RefCell<Arc<Vec<Contact>>>,
    active_search: RefCell<Option<String>>,
    last_error: RefCell<Option<String>>,
    sequencer: RequestSequencer,
}

impl<B: ContactsGateway> ContactStore<B> {
    #[must_use]
    pub fn new(backend: B, ordering: ResponseOrdering) -> Self {
        Self {
            backend,
            contacts: RefCell::new(Arc::new(Vec::new())),
            active_search: RefCell::new(None),
            last_error: RefCell::new(None),
            sequencer: RequestSequencer::new(ordering),
        }
    }

    #[must_use]
    pub fn contacts(&self) -> Arc<Vec<Contact>> {
        Arc::clone(&self.contacts.borrow())
    }

    #[must_use]
    pub fn active_search(&self) -> Option<String> {
        self.active_search.borrow().clone()
    }

    /// Error from the most recent applied listing, if it failed.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.sequencer.is_loading()
    }

    pub async fn load_all(&self) -> Result<Applied, ContactStoreError> {
        self.reload().await.map_err(ContactStoreError::Gateway)
    }

    /// Blank text is the same as [`ContactStore::load_all`].
    pub async fn search(&self, text: &str) -> Result<Applied, ContactStoreError> {
        let text = text.trim();
        if text.is_empty() {
            return self.load_all().await;
        }

        let ticket = self.sequencer.issue();
        debug!(sequence = ticket.sequence(), text, "searching contacts");

        let fetched = self.backend.search_contacts(text).await;
        self.apply_listing(ticket, Some(text.to_string()), fetched)
            .map_err(ContactStoreError::Gateway)
    }

    /// Fetches one contact without touching the displayed list.
    pub async fn get(&self, id: ContactId) -> Result<Contact, ContactStoreError> {
        self.backend
            .get_contact(id)
            .await
            .map_err(ContactStoreError::Gateway)
    }

    pub async fn create(&self, draft: &ContactDraft) -> Result<Contact, ContactStoreError> {
        draft.validate()?;
        let created = self
            .backend
            .create_contact(&draft.normalized())
            .await
            .map_err(|error| {
                warn!(%error, "contact creation rejected");
                ContactStoreError::Gateway(error)
            })?;

        info!(id = %created.id, "contact created");
        self.refresh_after_mutation().await;
        Ok(created)
    }

    pub async fn update(
        &self,
        id: ContactId,
        patch: &ContactPatch,
    ) -> Result<(), ContactStoreError> {
        patch.validate()?;
        self.backend
            .update_contact(id, &patch.normalized())
            .await
            .map_err(|error| {
                warn!(%id, %error, "contact update rejected");
                ContactStoreError::Gateway(error)
            })?;

        info!(%id, "contact updated");
        self.refresh_after_mutation().await;
        Ok(())
    }

    pub async fn delete(&self, confirmation: DeleteConfirmation) -> Result<(), ContactStoreError> {
        let id = confirmation.id();
        self.backend.delete_contact(id).await.map_err(|error| {
            warn!(%id, %error, "contact delete rejected");
            ContactStoreError::Gateway(error)
        })?;

        info!(%id, "contact deleted");
        self.refresh_after_mutation().await;
        Ok(())
    }

    // The mutation already succeeded; a failed re-list is reported through `last_error`.
    async fn refresh_after_mutation(&self) {
        if let Err(error) = self.load_all().await {
            warn!(%error, "contact list refresh after mutation failed");
        }
    }

    async fn reload(&self) -> Result<Applied, GatewayError> {
        let ticket = self.sequencer.issue();
        debug!(sequence = ticket.sequence(), "loading all contacts");

        let fetched = self.backend.list_contacts().await;
        self.apply_listing(ticket, None, fetched)
    }

    // The filter label only changes together with the rows it describes.
    fn apply_listing(
        &self,
        ticket: RequestTicket,
        search: Option<String>,
        fetched: Result<Vec<Contact>, GatewayError>,
    ) -> Result<Applied, GatewayError> {
        let applied = self.sequencer.admit(ticket);
        if applied == Applied::Stale {
            warn!(sequence = ticket.sequence(), "discarding stale contact listing");
        }

        match fetched {
            Ok(contacts) => {
                if applied.is_current() {
                    self.contacts.replace(Arc::new(contacts));
                    self.active_search.replace(search);
                    self.last_error.replace(None);
                }
                Ok(applied)
            }
            Err(error) => {
                if applied.is_current() {
                    self.last_error.replace(Some(error.user_message()));
                }
                Err(error)
            }
        }
    }
}

#[async_trait(?Send)]
impl<B: ContactsGateway> InvalidationSubscriber for ContactStore<B> {
    fn subscriber_name(&self) -> &'static str {
        "contacts"
    }

    fn is_invalidated_by(&self, event: &ConsoleEvent) -> bool {
        matches!(
            event,
            ConsoleEvent::StatementExecuted {
                active_view: ActiveView::Contacts,
                succeeded: true,
            }
        )
    }

    async fn invalidate(&self) -> Result<(), GatewayError> {
        self.reload().await.map(|_| ())
    }
}
