//! Session events and subscription handles.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use vigil_core::{EnforcementPolicy, StateTransition, TrustSample};

/// Event categories accepted by [`crate::VerificationSession::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventKind {
    Scores,
    StateChange,
    Error,
    Stopped,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scores => "scores",
            Self::StateChange => "stateChange",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a running session reports to consumers.
///
/// Every event carries the epoch of the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum SessionEvent {
    /// A tick completed.
    Scores { epoch: u64, sample: TrustSample },
    /// The tick that produced the preceding `Scores` changed state.
    StateChange { epoch: u64, transition: StateTransition, policy: EnforcementPolicy },
    /// A fatal or notable failure.
    Error { epoch: u64, message: String },
    /// The run ended.
    Stopped { epoch: u64 },
}

impl SessionEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Scores { .. } => EventKind::Scores,
            Self::StateChange { .. } => EventKind::StateChange,
            Self::Error { .. } => EventKind::Error,
            Self::Stopped { .. } => EventKind::Stopped,
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        match self {
            Self::Scores { epoch, .. }
            | Self::StateChange { epoch, .. }
            | Self::Error { epoch, .. }
            | Self::Stopped { epoch } => *epoch,
        }
    }
}

pub(crate) type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Handlers registered on one session, in registration order.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    inner: Mutex<HandlerTable>,
}

#[derive(Default)]
struct HandlerTable {
    next_id: u64,
    entries: Vec<(u64, EventKind, Handler)>,
}

impl HandlerRegistry {
    fn table(&self) -> MutexGuard<'_, HandlerTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, kind: EventKind, handler: Handler) -> u64 {
        let mut table = self.table();
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, kind, handler));
        id
    }

    fn remove(&self, id: u64) {
        self.table().entries.retain(|(entry, _, _)| *entry != id);
    }

    fn contains(&self, id: u64) -> bool {
        self.table().entries.iter().any(|(entry, _, _)| *entry == id)
    }

    /// Handlers for `kind`, cloned out so none runs under the table lock.
    pub(crate) fn matching(&self, kind: EventKind) -> Vec<(u64, Handler)> {
        self.table()
            .entries
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(id, _, handler)| (*id, Arc::clone(handler)))
            .collect()
    }

    /// Run `handler` unless it was unsubscribed since `matching` returned.
    pub(crate) fn call(&self, id: u64, handler: &Handler, event: &SessionEvent) {
        if self.contains(id) {
            handler(event);
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry").field("handlers", &self.table().entries.len()).finish()
    }
}

/// Disposer for a handler registered with [`crate::VerificationSession::on`].
///
/// Dropping the handle also unsubscribes.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    id: Option<u64>,
}

impl Subscription {
    pub(crate) fn new(registry: &Arc<HandlerRegistry>, id: u64) -> Self {
        Self { registry: Arc::downgrade(registry), id: Some(id) }
    }

    /// Stop delivering events to the handler.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    /// Whether the handler can still receive events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        match (self.id, self.registry.upgrade()) {
            (Some(id), Some(registry)) => registry.contains(id),
            _ => false,
        }
    }

    fn cancel(&mut self) {
        if let (Some(id), Some(registry)) = (self.id.take(), self.registry.upgrade()) {
            registry.remove(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_names_match_wire_names() {
        assert_eq!(EventKind::StateChange.to_string(), "stateChange");
        assert_eq!(EventKind::Scores.as_str(), "scores");
    }

    #[test]
    fn unsubscribing_removes_only_that_handler() {
        let registry = Arc::new(HandlerRegistry::default());
        let noop: Handler = Arc::new(|_: &SessionEvent| {});
        let first = Subscription::new(&registry, registry.insert(EventKind::Scores, Arc::clone(&noop)));
        let second = Subscription::new(&registry, registry.insert(EventKind::Scores, noop));
        assert_eq!(registry.matching(EventKind::Scores).len(), 2);

        first.unsubscribe();
        assert!(second.is_active());
        assert_eq!(registry.matching(EventKind::Scores).len(), 1);
        assert!(registry.matching(EventKind::Stopped).is_empty());

        drop(second);
        assert!(registry.matching(EventKind::Scores).is_empty(), "dropping the handle unsubscribes");
    }

    #[test]
    fn stopped_event_serializes_with_type_tag() {
        let json = match serde_json::to_string(&SessionEvent::Stopped { epoch: 3 }) {
            Ok(j) => j,
            Err(e) => panic!("event must serialize: {e}"),
        };
        assert!(json.contains("\"type\":\"stopped\""), "got {json}");
        assert!(json.contains("\"epoch\":3"), "got {json}");
    }
}
