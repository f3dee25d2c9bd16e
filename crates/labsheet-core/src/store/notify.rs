//! Change notifications for store subscribers.

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broadcast tag listeners refresh on.
pub const DATA_CHANGED_TAG: &str = "dataUpdated";

/// What kind of mutation happened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    ProfileSaved,
    TestSaved,
    PatientDeleted,
    TestDeleted,
    Cleared,
    Imported,
}

/// A dataset change, sent after the write is committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Always [`DATA_CHANGED_TAG`]
    pub tag: String,
    pub kind: ChangeKind,
    /// Affected patient, `None` for bulk changes
    pub patient_id: Option<String>,
    pub at: String,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, patient_id: Option<&str>) -> Self {
        Self {
            tag: DATA_CHANGED_TAG.to_string(),
            kind,
            patient_id: patient_id.map(str::to_string),
            at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Delivery failures. Never surfaced to store callers.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The receiving side is gone; the listener gets unregistered.
    #[error("Listener disconnected")]
    Disconnected,

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Something that wants to hear about dataset changes.
pub trait ChangeListener: Send + Sync {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError>;
}

impl ChangeListener for Sender<ChangeEvent> {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        self.send(event.clone()).map_err(|_| NotifyError::Disconnected)
    }
}

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Registered listeners.
///
/// The map lock is only held to register, unregister or snapshot; listeners
/// run after it is released so a slow or re-entrant listener cannot block
/// subscription changes.
#[derive(Default)]
pub struct Subscribers {
    listeners: Mutex<HashMap<SubscriptionId, Arc<dyn ChangeListener>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.lock().insert(id, listener);
        tracing::debug!(subscription = %id, "Listener subscribed");
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(subscription = %id, "Listener unsubscribed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener. Returns how many accepted it.
    pub fn broadcast(&self, event: &ChangeEvent) -> usize {
        let snapshot: Vec<(SubscriptionId, Arc<dyn ChangeListener>)> = self
            .lock()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        let mut delivered = 0;
        let mut disconnected = Vec::new();
        for (id, listener) in snapshot {
            match listener.notify(event) {
                Ok(()) => delivered += 1,
                Err(NotifyError::Disconnected) => disconnected.push(id),
                Err(e) => {
                    tracing::warn!(subscription = %id, kind = ?event.kind, "Change notification failed: {e}");
                }
            }
        }

        if !disconnected.is_empty() {
            let mut listeners = self.lock();
            for id in disconnected {
                listeners.remove(&id);
                tracing::debug!(subscription = %id, "Dropped disconnected listener");
            }
        }

        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Arc<dyn ChangeListener>>> {
        // A listener map is still consistent after a panic elsewhere.
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
