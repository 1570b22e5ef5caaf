//! Tracks the live [`TunnelSession`] for every joined machine, so a `Link`
//! destroy closes its session immediately rather than waiting on anything
//! downstream (spec §8 scenario 6: "destroy `Link(workerId)`;
//! `ClusterMachine(workerId)` is destroyed without waiting for Kubernetes
//! node deletion").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::session::{MachineEndpoints, TunnelSession};

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<TunnelSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh session for `machine_id`, replacing and closing any
    /// stale one already registered for it.
    pub fn open(&self, machine_id: impl Into<String>) -> (Arc<TunnelSession>, MachineEndpoints) {
        let machine_id = machine_id.into();
        let (session, endpoints) = TunnelSession::new(machine_id.clone());
        let session = Arc::new(session);
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        if let Some(stale) = sessions.insert(machine_id, session.clone()) {
            stale.close();
        }
        (session, endpoints)
    }

    pub fn get(&self, machine_id: &str) -> Option<Arc<TunnelSession>> {
        self.sessions.lock().expect("session registry lock poisoned").get(machine_id).cloned()
    }

    /// Closes and forgets `machine_id`'s session, if any (called when its
    /// `Link` is destroyed).
    pub fn close(&self, machine_id: &str) {
        if let Some(session) = self.sessions.lock().expect("session registry lock poisoned").remove(machine_id) {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closing_a_registered_session_cancels_it() {
        let registry = SessionRegistry::new();
        let (session, _endpoints) = registry.open("machine-1");
        assert!(!session.is_closed());

        registry.close("machine-1");
        assert!(session.is_closed());
        assert!(registry.get("machine-1").is_none());
    }

    #[tokio::test]
    async fn opening_twice_closes_the_stale_session() {
        let registry = SessionRegistry::new();
        let (first, _e1) = registry.open("machine-1");
        let (second, _e2) = registry.open("machine-1");

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert!(Arc::ptr_eq(&registry.get("machine-1").unwrap(), &second));
    }
}
