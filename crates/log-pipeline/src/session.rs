//! Session id to display name mapping.
//!
//! Servers often log leaves and kicks with only the numeric id. The
//! tracker remembers the last name seen for each live id so those events
//! can still be posted with a name.

use std::collections::HashMap;

use logrelay_core::types::SessionId;

/// Name used when an id was never seen with a name.
pub fn fallback_name(id: SessionId) -> String {
    format!("User {id}")
}

/// In-memory session table for one source.
#[derive(Debug, Default)]
pub struct SessionTracker {
    names: HashMap<SessionId, String>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a join. An existing entry for `id` is overwritten.
    pub fn observe_join(&mut self, id: SessionId, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.names.insert(id, name.to_owned());
    }

    /// Records a fresher name for `id`, e.g. from a chat line.
    pub fn observe_name(&mut self, id: SessionId, name: &str) {
        self.observe_join(id, name);
    }

    /// Removes `id` and returns its name, or the fallback.
    pub fn observe_leave(&mut self, id: SessionId) -> String {
        self.names
            .remove(&id)
            .unwrap_or_else(|| fallback_name(id))
    }

    /// Name for `id`, or the fallback. Does not modify the table.
    pub fn resolve_or_fallback(&self, id: SessionId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| fallback_name(id))
    }

    pub fn get(&self, id: SessionId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
