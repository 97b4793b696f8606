use std::cell::Cell;

use serde::{Deserialize, Serialize};

/// How a model treats responses to overlapping requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrdering {
    /// Every response is applied as it arrives, even if a newer request was issued after it.
    #[default]
    LastArrival,
    /// Responses older than the last applied one are discarded.
    LatestIssued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(u64);

impl RequestTicket {
    #[must_use]
    pub fn sequence(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Current,
    Stale,
}

impl Applied {
    #[must_use]
    pub fn is_current(self) -> bool {
        matches!(self, Self::Current)
    }
}

/// Per-model sequence counter. Single-threaded; all state lives in `Cell`s.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    ordering: ResponseOrdering,
    issued: Cell<u64>,
    last_applied: Cell<u64>,
    in_flight: Cell<usize>,
}

impl RequestSequencer {
    #[must_use]
    pub fn new(ordering: ResponseOrdering) -> Self {
        Self {
            ordering,
            ..Self::default()
        }
    }

    pub fn issue(&self) -> RequestTicket {
        let next = self.issued.get() + 1;
        self.issued.set(next);
        self.in_flight.set(self.in_flight.get() + 1);
        RequestTicket(next)
    }

    /// Retires `ticket` and decides whether its response may overwrite displayed state.
    pub fn admit(&self, ticket: RequestTicket) -> Applied {
        self.in_flight.set(self.in_flight.get().saturating_sub(1));

        match self.ordering {
            ResponseOrdering::LastArrival => {
                self.last_applied.set(ticket.0);
                Applied::Current
            }
            ResponseOrdering::LatestIssued => {
                if ticket.0 <= self.last_applied.get() {
                    return Applied::Stale;
                }
                self.last_applied.set(ticket.0);
                Applied::Current
            }
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.get() > 0
    }
}
