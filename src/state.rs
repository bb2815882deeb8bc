//! Host state write-back.
//!
//! The host keeps, per resource, an id plus a flat attribute map. After an
//! operation converges, [`record`] copies what was observed into the store,
//! or clears the entry when the resource is gone. A failed operation that
//! already saw its resource is kept through [`record_failure`], marked
//! tainted so the host replaces it on the next apply.

use converge::{LifecycleState, OperationReport, ResourceHandle};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

/// Attributes recorded for a resource.
pub type Attributes = BTreeMap<String, String>;

/// Host-side resource state.
pub trait StateStore: Send + Sync {
    /// Store the id and attributes under `address`.
    fn set(&self, address: &str, id: &str, attributes: Attributes);

    /// Remove the entry for `address`.
    fn clear(&self, address: &str);

    /// Current id and attributes for `address`.
    fn get(&self, address: &str) -> Option<(String, Attributes)>;
}

/// In-process state store.
#[derive(Debug, Default)]
pub struct MemoryState {
    entries: Mutex<HashMap<String, (String, Attributes)>>,
}

impl MemoryState {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryState {
    fn set(&self, address: &str, id: &str, attributes: Attributes) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_string(), (id.to_string(), attributes));
    }

    fn clear(&self, address: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
    }

    fn get(&self, address: &str) -> Option<(String, Attributes)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }
}

/// Write the outcome of an operation to the host store.
///
/// Returns `true` when the store was changed.
pub fn record(report: &OperationReport, address: &str, store: &dyn StateStore) -> bool {
    if report.state == LifecycleState::Absent {
        log::debug!("{address}: clearing state");
        store.clear(address);
        return true;
    }

    let Some(handle) = &report.handle else {
        log::debug!("{address}: no handle observed, leaving state untouched");
        return false;
    };

    store.set(address, &handle.id, attributes(handle));
    true
}

/// Write the partial report of a failed operation to the host store.
///
/// A resource the operation already saw (for example a server whose create
/// was accepted but never reached RUN) is stored with `tainted = "true"`.
/// Without an observed handle the store is left alone. Returns `true` when
/// the store was changed.
pub fn record_failure(report: &OperationReport, address: &str, store: &dyn StateStore) -> bool {
    let handle = match &report.handle {
        Some(handle) if report.state != LifecycleState::Absent => handle,
        _ => return false,
    };

    log::warn!("{address}: keeping {} {} as tainted", report.kind, handle.id);
    let mut attributes = attributes(handle);
    attributes.insert("tainted".to_string(), "true".to_string());
    store.set(address, &handle.id, attributes);
    true
}

fn attributes(handle: &ResourceHandle) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("status".to_string(), handle.status_code.clone());
    attributes.insert("operation".to_string(), handle.operation_code.clone());
    attributes.insert("backend".to_string(), handle.variant.to_string());
    attributes
}
