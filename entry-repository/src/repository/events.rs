//! Entry change notifications
//!
//! Backends publish an [`EntryEvent`] after every write. Events go out on a
//! `tokio::sync::broadcast` channel so any number of listeners can subscribe.
//! Publishing is suspended while an [`EventsPaused`] guard is alive; the guard
//! resumes publishing when dropped, whether the guarded block returned,
//! failed or unwound.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::entry::EntryId;

/// Default channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// What happened to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryEventKind {
    /// A new entry was inserted
    Created,
    /// An entry was saved (inserted or updated through `save`)
    Saved,
    /// Entries were bulk updated
    Updated,
    /// An entry was soft deleted
    Deleted,
    /// An entry was permanently removed
    ForceDeleted,
    /// A soft-deleted entry was restored
    Restored,
    /// Every entry was purged
    Truncated,
}

impl fmt::Display for EntryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Saved => write!(f, "saved"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
            Self::ForceDeleted => write!(f, "force_deleted"),
            Self::Restored => write!(f, "restored"),
            Self::Truncated => write!(f, "truncated"),
        }
    }
}

/// A change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryEvent {
    /// What happened
    pub kind: EntryEventKind,
    /// Entry type the event concerns
    pub entry_type: String,
    /// Affected entry, `None` for bulk events
    pub entry_id: Option<EntryId>,
}

impl EntryEvent {
    /// Create an event
    pub fn new(kind: EntryEventKind, entry_type: impl Into<String>, entry_id: Option<EntryId>) -> Self {
        Self {
            kind,
            entry_type: entry_type.into(),
            entry_id,
        }
    }
}

/// Shared change-notification sink
///
/// Clones share the channel and the pause state.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<EntryEvent>,
    paused: Arc<AtomicUsize>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    /// Create a dispatcher with default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a dispatcher with a specific channel capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            paused: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EntryEvent> {
        self.sender.subscribe()
    }

    /// Whether publishing is currently suspended
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst) > 0
    }

    /// Suspend publishing until the returned guard is dropped
    ///
    /// Guards nest: publishing resumes when the last one is dropped.
    #[must_use = "events resume as soon as the guard is dropped"]
    pub fn pause(&self) -> EventsPaused {
        self.paused.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("Entry events paused");
        EventsPaused {
            paused: Arc::clone(&self.paused),
        }
    }

    /// Publish an event
    ///
    /// Returns `true` if the event went out, `false` when publishing is
    /// paused. Having no subscribers is not an error.
    pub fn dispatch(&self, event: EntryEvent) -> bool {
        if self.is_paused() {
            tracing::trace!(kind = %event.kind, entry_type = %event.entry_type, "Entry event suppressed");
            return false;
        }
        tracing::trace!(kind = %event.kind, entry_type = %event.entry_type, entry_id = ?event.entry_id, "Entry event");
        let _ = self.sender.send(event);
        true
    }
}

/// Keeps entry events suspended while alive
#[derive(Debug)]
pub struct EventsPaused {
    paused: Arc<AtomicUsize>,
}

impl Drop for EventsPaused {
    fn drop(&mut self) {
        self.paused.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!("Entry events resumed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(id: EntryId) -> EntryEvent {
        EntryEvent::new(EntryEventKind::Created, "posts", Some(id))
    }

    #[tokio::test]
    async fn test_dispatch_reaches_subscribers() {
        let events = EventDispatcher::new();
        let mut rx = events.subscribe();

        assert!(events.dispatch(created(1)));
        assert_eq!(rx.recv().await.unwrap(), created(1));
    }

    #[test]
    fn test_dispatch_without_subscribers_is_fine() {
        let events = EventDispatcher::new();
        assert!(events.dispatch(created(1)));
    }

    #[tokio::test]
    async fn test_pause_suppresses_until_dropped() {
        let events = EventDispatcher::new();
        let mut rx = events.subscribe();

        {
            let _paused = events.pause();
            assert!(events.is_paused());
            assert!(!events.dispatch(created(1)));
        }

        assert!(!events.is_paused());
        assert!(events.dispatch(created(2)));
        assert_eq!(rx.recv().await.unwrap(), created(2));
    }

    #[test]
    fn test_pause_guards_nest() {
        let events = EventDispatcher::new();
        let outer = events.pause();
        let inner = events.clone().pause();
        drop(inner);
        assert!(events.is_paused());
        drop(outer);
        assert!(!events.is_paused());
    }

    #[test]
    fn test_pause_released_on_unwind() {
        let events = EventDispatcher::new();
        let cloned = events.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _paused = cloned.pause();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!events.is_paused());
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EntryEventKind::ForceDeleted.to_string(), "force_deleted");
        assert_eq!(EntryEventKind::Truncated.to_string(), "truncated");
    }
}
