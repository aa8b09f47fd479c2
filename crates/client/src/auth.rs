//! Credential storage and expiry signaling
//!
//! The client only reads the credential; the single writer inside the core
//! is the 401-handling path, which evicts it. Whatever external login flow
//! sets a new token does so through [`MemoryTokenStore::set`] (or its own
//! [`TokenProvider`] implementation).

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffer size for the auth event broadcast channel
const AUTH_EVENT_BUFFER_SIZE: usize = 16;

/// Supplies the current bearer credential.
///
/// Absence of a credential is not an error at request-build time;
/// authorization failures are handled downstream by the transport.
pub trait TokenProvider: Send + Sync {
    /// Current credential, if one is held
    fn token(&self) -> Option<String>;

    /// Evict the stored credential, returning it if one was present.
    ///
    /// Returning the evicted value lets the transport emit exactly one
    /// unauthorized notification per credential even when several in-flight
    /// requests observe the same 401.
    fn clear(&self) -> Option<String>;
}

/// In-memory token store
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: RwLock::new(Some(token.into())) }
    }

    /// Install a new credential (called by the external login flow)
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }
}

impl TokenProvider for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn clear(&self) -> Option<String> {
        self.token.write().take()
    }
}

/// Auth lifecycle events observable by the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The server rejected the credential; it has been evicted
    Unauthorized,
}

/// Broadcaster for auth lifecycle events.
///
/// Bounded channel; lagged receivers drop events rather than blocking the
/// transport.
pub struct AuthEvents {
    sender: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(AUTH_EVENT_BUFFER_SIZE);
        Self { sender }
    }

    /// Subscribe to auth events
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    /// Non-blocking emit; an event with no subscribers is dropped
    pub(crate) fn emit(&self, event: AuthEvent) {
        debug!(?event, "auth event");
        let _ = self.sender.send(event);
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_returns_the_evicted_token_exactly_once() {
        let store = MemoryTokenStore::with_token("secret");
        assert_eq!(store.token().as_deref(), Some("secret"));
        assert_eq!(store.clear().as_deref(), Some("secret"));
        assert_eq!(store.clear(), None);
        assert_eq!(store.token(), None);
    }

    #[test]
    fn set_replaces_the_credential() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.token(), None);
        store.set("first");
        store.set("second");
        assert_eq!(store.token().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let events = AuthEvents::new();
        let mut receiver = events.subscribe();

        events.emit(AuthEvent::Unauthorized);
        assert_eq!(receiver.recv().await.unwrap(), AuthEvent::Unauthorized);
    }
}
