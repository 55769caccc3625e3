use std::sync::Mutex;

use crate::error::StateResult;
use crate::{StateStore, SyncState};

/// In-memory state store (for testing).
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<SyncState>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SyncState) -> Self {
        Self {
            state: Mutex::new(state),
            saves: Mutex::new(0),
        }
    }

    /// Number of times `save` has been called.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> SyncState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, state: &SyncState) -> StateResult<()> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStateStore::new();
        let mut state = store.load();
        state.file_mut("x.dbf").records_delivered = 9;
        store.save(&state).unwrap();

        assert_eq!(store.load(), state);
        assert_eq!(store.save_count(), 1);
    }
}
