//! Per-connection session state

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::protocol::Info;

/// What the client said about itself in `initialize`
#[derive(Debug, Clone)]
pub struct ClientDetails {
    /// `clientInfo`, if sent
    pub info: Option<Info>,
    /// Requested protocol version, if sent
    pub protocol_version: Option<String>,
}

/// Lifecycle state of one stdio connection.
///
/// `Uninitialized -> Initialized` happens exactly once, on
/// `notifications/initialized`. `initialize` itself only records client
/// details.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    initialized: AtomicBool,
    client: Mutex<Option<ClientDetails>>,
}

impl Session {
    /// New uninitialized session
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            initialized: AtomicBool::new(false),
            client: Mutex::new(None),
        }
    }

    /// Session id (for logs)
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the handshake has completed
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Perform the transition. Returns `false` if already initialized.
    pub fn mark_initialized(&self) -> bool {
        self.initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Remember the client's self-description (latest `initialize` wins)
    pub fn record_client(&self, details: ClientDetails) {
        *self.client.lock() = Some(details);
    }

    /// Client details from the last `initialize`
    #[must_use]
    pub fn client(&self) -> Option<ClientDetails> {
        self.client.lock().clone()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_happens_once() {
        let session = Session::new();
        assert!(!session.is_initialized());
        assert!(session.mark_initialized());
        assert!(session.is_initialized());
        assert!(!session.mark_initialized());
        assert!(session.is_initialized());
    }

    #[test]
    fn records_latest_client() {
        let session = Session::new();
        assert!(session.client().is_none());
        session.record_client(ClientDetails {
            info: Some(Info {
                name: "test-client".to_string(),
                version: "1.0".to_string(),
                title: None,
            }),
            protocol_version: Some("2024-11-05".to_string()),
        });
        let client = session.client().unwrap();
        assert_eq!(client.info.unwrap().name, "test-client");
        assert_eq!(client.protocol_version.as_deref(), Some("2024-11-05"));
    }
}
