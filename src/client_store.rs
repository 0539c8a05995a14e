//! Partner identity and the client-state map. Partners live in the CAN
//! stack; this crate never owns them by shared pointer, only by a stable
//! handle — §9 design note "shared ownership of partners", and
//! `backend-rust/src/handlers.rs`'s map-of-entities pattern simplified to
//! single-threaded access per spec §5 (no `Arc<RwLock<_>>` needed here).

use std::collections::HashMap;

use crate::client_state::ClientState;
use crate::ddop::Pool;
use crate::error::PoolError;

/// A stable handle to a remote control function, supplied by the CAN stack.
/// Wraps the ISOBUS NAME rather than any owning pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartnerId(pub u64);

#[derive(Debug, Default)]
pub struct ActivateOutcome {
    pub ok: bool,
    pub activation_error: bool,
    pub pool_error: Option<PoolError>,
    pub parent_object_id: u16,
    pub object_id: u16,
}

#[derive(Debug, Default)]
pub struct ClientStateStore {
    states: HashMap<PartnerId, ClientState>,
    pool_chunks: HashMap<PartnerId, Vec<Vec<u8>>>,
}

impl ClientStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.1 `store_pool`: append a chunk, always succeeds, never parses.
    pub fn store_pool(&mut self, partner: PartnerId, chunk: Vec<u8>) {
        self.pool_chunks.entry(partner).or_default().push(chunk);
    }

    /// §4.1 `activate_pool`: try concatenating stored chunks, one prefix at
    /// a time, until one parses — the implement may upload in parts, and
    /// some uploads are only valid once fully assembled.
    pub fn activate_pool(&mut self, partner: PartnerId) -> ActivateOutcome {
        let Some(chunks) = self.pool_chunks.get(&partner) else {
            return ActivateOutcome {
                ok: false,
                activation_error: true,
                pool_error: Some(PoolError::NoChunksStored),
                ..Default::default()
            };
        };
        if chunks.is_empty() {
            return ActivateOutcome {
                ok: false,
                activation_error: true,
                pool_error: Some(PoolError::NoChunksStored),
                ..Default::default()
            };
        }

        let mut accumulated = Vec::new();
        let mut last_error = None;
        for chunk in chunks {
            accumulated.extend_from_slice(chunk);
            match Pool::parse(&accumulated) {
                Ok(pool) => {
                    self.states.insert(partner, ClientState::new(pool));
                    return ActivateOutcome {
                        ok: true,
                        activation_error: false,
                        pool_error: None,
                        parent_object_id: 0,
                        object_id: 0,
                    };
                }
                Err(e) => last_error = Some(e),
            }
        }

        ActivateOutcome {
            ok: false,
            activation_error: true,
            pool_error: Some(last_error.unwrap_or(PoolError::UnparseableAfterAllChunks)),
            ..Default::default()
        }
    }

    /// §4.1 `deactivate_pool` / `delete_pool`: drop state and chunks.
    pub fn deactivate_pool(&mut self, partner: PartnerId) {
        self.states.remove(&partner);
        self.pool_chunks.remove(&partner);
    }

    pub fn delete_pool(&mut self, partner: PartnerId) {
        self.deactivate_pool(partner);
    }

    /// §4.1 `on_client_timeout`: drop state but keep chunks, so a fresh
    /// upload can follow without re-sending everything.
    pub fn on_timeout(&mut self, partner: PartnerId) {
        self.states.remove(&partner);
    }

    pub fn get(&self, partner: PartnerId) -> Option<&ClientState> {
        self.states.get(&partner)
    }

    pub fn get_mut(&mut self, partner: PartnerId) -> Option<&mut ClientState> {
        self.states.get_mut(&partner)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PartnerId, &ClientState)> {
        self.states.iter().map(|(id, state)| (*id, state))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PartnerId, &mut ClientState)> {
        self.states.iter_mut().map(|(id, state)| (*id, state))
    }

    pub fn partners(&self) -> impl Iterator<Item = PartnerId> + '_ {
        self.states.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddop::test_fixtures::three_section_pool_bytes;

    #[test]
    fn activate_without_any_chunks_fails() {
        let mut store = ClientStateStore::new();
        let outcome = store.activate_pool(PartnerId(1));
        assert!(!outcome.ok);
        assert!(outcome.activation_error);
        assert!(matches!(outcome.pool_error, Some(PoolError::NoChunksStored)));
    }

    #[test]
    fn activate_across_two_chunks_installs_state() {
        let mut store = ClientStateStore::new();
        let bytes = three_section_pool_bytes();
        let (first, second) = bytes.split_at(bytes.len() / 2);
        store.store_pool(PartnerId(1), first.to_vec());
        store.store_pool(PartnerId(1), second.to_vec());

        let outcome = store.activate_pool(PartnerId(1));
        assert!(outcome.ok);
        assert_eq!(store.get(PartnerId(1)).unwrap().number_of_sections, 3);
    }

    #[test]
    fn deactivate_drops_state_and_chunks_idempotently() {
        let mut store = ClientStateStore::new();
        store.store_pool(PartnerId(1), three_section_pool_bytes());
        store.activate_pool(PartnerId(1));
        store.deactivate_pool(PartnerId(1));
        assert!(store.get(PartnerId(1)).is_none());
        // idempotent — removing again does not panic
        store.deactivate_pool(PartnerId(1));
    }

    #[test]
    fn timeout_drops_state_but_keeps_chunks_for_reupload() {
        let mut store = ClientStateStore::new();
        store.store_pool(PartnerId(1), three_section_pool_bytes());
        store.activate_pool(PartnerId(1));
        store.on_timeout(PartnerId(1));
        assert!(store.get(PartnerId(1)).is_none());
        // chunks survived, so re-activating immediately succeeds
        let outcome = store.activate_pool(PartnerId(1));
        assert!(outcome.ok);
    }
}
