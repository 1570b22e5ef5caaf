//! Per-machine stream multiplex (spec §6): once joined, a machine's single
//! tunnel connection carries three independent logical streams -- config
//! push, event stream (stage transitions, log lines), and a proxied Talos
//! API -- each its own channel pair, torn down together by one
//! [`CancellationToken`] the way `controller-runtime` tears down a
//! controller's work via a shared token rather than three separate ones.

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 256;

/// One line of a machine's event stream (spec §6: "stage transitions, log
/// lines").
#[derive(Clone, Debug)]
pub enum TunnelEvent {
    StageChanged { stage: String },
    LogLine { line: String },
}

/// The transport-adapter-facing half of a session: the ends a real
/// connection handler would read from / write to. Kept separate from
/// [`TunnelSession`] so the server-side API never has to know whether the
/// other end is a real socket or a test harness.
pub struct MachineEndpoints {
    pub config_rx: mpsc::Receiver<Vec<u8>>,
    pub event_tx: mpsc::Sender<TunnelEvent>,
    pub talos_downstream_rx: mpsc::Receiver<Vec<u8>>,
    pub talos_upstream_tx: mpsc::Sender<Vec<u8>>,
}

/// The server-side handle to one joined machine's multiplexed streams.
pub struct TunnelSession {
    pub machine_id: String,
    config_tx: mpsc::Sender<Vec<u8>>,
    events_rx: Mutex<mpsc::Receiver<TunnelEvent>>,
    talos_downstream_tx: mpsc::Sender<Vec<u8>>,
    talos_upstream_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    cancellation: CancellationToken,
}

impl TunnelSession {
    pub fn new(machine_id: impl Into<String>) -> (Self, MachineEndpoints) {
        let (config_tx, config_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (talos_downstream_tx, talos_downstream_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (talos_upstream_tx, talos_upstream_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let session = Self {
            machine_id: machine_id.into(),
            config_tx,
            events_rx: Mutex::new(events_rx),
            talos_downstream_tx,
            talos_upstream_rx: Mutex::new(talos_upstream_rx),
            cancellation: CancellationToken::new(),
        };
        let endpoints = MachineEndpoints { config_rx, event_tx, talos_downstream_rx, talos_upstream_tx };
        (session, endpoints)
    }

    /// Pushes a rendered config onto the machine's config-push stream.
    /// Returns `false` if the session has already been torn down.
    pub async fn push_config(&self, payload: Vec<u8>) -> bool {
        self.config_tx.send(payload).await.is_ok()
    }

    /// The next event the machine reported, or `None` once the session is
    /// closed and drained.
    pub async fn next_event(&self) -> Option<TunnelEvent> {
        self.events_rx.lock().await.recv().await
    }

    /// Forwards a Talos API request frame down to the machine.
    pub async fn send_talos_request(&self, frame: Vec<u8>) -> bool {
        self.talos_downstream_tx.send(frame).await.is_ok()
    }

    /// The next Talos API response frame the machine sent back.
    pub async fn recv_talos_response(&self) -> Option<Vec<u8>> {
        self.talos_upstream_rx.lock().await.recv().await
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Tears down all three streams (spec §8 scenario 6: force-removing a
    /// worker destroys its `Link` without waiting on anything downstream).
    pub fn close(&self) {
        self.cancellation.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_push_reaches_the_machine_endpoint() {
        let (session, mut endpoints) = TunnelSession::new("machine-1");
        assert!(session.push_config(b"config-bytes".to_vec()).await);
        assert_eq!(endpoints.config_rx.recv().await.unwrap(), b"config-bytes");
    }

    #[tokio::test]
    async fn events_from_the_machine_reach_the_session() {
        let (session, endpoints) = TunnelSession::new("machine-1");
        endpoints.event_tx.send(TunnelEvent::StageChanged { stage: "BOOTING".into() }).await.unwrap();
        let event = session.next_event().await.unwrap();
        assert!(matches!(event, TunnelEvent::StageChanged { stage } if stage == "BOOTING"));
    }

    #[tokio::test]
    async fn talos_frames_flow_in_both_directions() {
        let (session, mut endpoints) = TunnelSession::new("machine-1");
        session.send_talos_request(b"req".to_vec()).await;
        assert_eq!(endpoints.talos_downstream_rx.recv().await.unwrap(), b"req");

        endpoints.talos_upstream_tx.send(b"resp".to_vec()).await.unwrap();
        assert_eq!(session.recv_talos_response().await.unwrap(), b"resp");
    }

    #[tokio::test]
    async fn closing_the_session_is_observable_immediately() {
        let (session, _endpoints) = TunnelSession::new("machine-1");
        assert!(!session.is_closed());
        session.close();
        assert!(session.is_closed());
    }
}
