//! Cancellation registry - the set of live download sessions

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Cancellation tokens of every in-flight session, keyed by session id
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    entries: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token; it stays registered until the returned guard is dropped
    pub fn register(&self) -> Registration {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        self.entries.lock().insert(id, token.clone());
        debug!("Registered session {}", id);

        Registration {
            id,
            token,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Signal one session. Returns false if it is no longer registered.
    pub fn cancel(&self, id: Uuid) -> bool {
        let token = self.entries.lock().get(&id).cloned();
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every registered session without waiting for any to stop.
    /// Returns how many sessions were signalled.
    pub fn cancel_all(&self) -> usize {
        let tokens: Vec<CancellationToken> = self.entries.lock().values().cloned().collect();
        for token in &tokens {
            token.cancel();
        }
        info!("Signalled cancellation for {} session(s)", tokens.len());
        tokens.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// A live registry entry; removes itself when dropped
pub struct Registration {
    id: Uuid,
    token: CancellationToken,
    entries: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl Registration {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.entries.lock().remove(&self.id);
    }
}
