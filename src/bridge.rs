use serde::{Deserialize, Serialize};

use crate::models::Subject;

/// A free-text question waiting to be handed to the tutoring chat,
/// together with the subject context it should run under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingQuery {
    pub query_text: String,
    pub target_subject: Subject,
}

/// Single-slot handoff between features: Idle until a producer offers a
/// query, Pending until the consumer drains it. At most one query is ever
/// held; a second offer overwrites the first (last-offer-wins).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryBridge {
    pending: Option<PendingQuery>,
}

impl QueryBridge {
    /// Park a query for the tutoring chat. Overwrites any query still
    /// waiting to be drained.
    pub fn offer(&mut self, query_text: impl Into<String>, target_subject: Subject) {
        self.pending = Some(PendingQuery {
            query_text: query_text.into(),
            target_subject,
        });
    }

    /// Atomically take the pending query, leaving the bridge Idle.
    /// Draining an Idle bridge returns None and changes nothing.
    pub fn drain(&mut self) -> Option<PendingQuery> {
        self.pending.take()
    }

    /// Observe without consuming; used by consumers that are not yet able
    /// to dispatch the query.
    pub fn peek(&self) -> Option<&PendingQuery> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
