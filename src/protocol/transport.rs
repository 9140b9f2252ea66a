//! The transport seam: a reliable, ordered, message-framed bidirectional
//! channel to the server. The actual socket and wire codec live outside
//! this crate; this module is the interface they're assumed to satisfy.
//!
//! Structured so the sync actor is generic over a small trait rather than
//! a concrete connection type: a trait the actor is generic over, plus an
//! in-memory test double (`MockTransport`) for driving the actor in tests
//! without any real I/O.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::HydraError;
use crate::protocol::types::{ClientFrame, ServerFrame};

/// One open session to the server. At most one outstanding request at a
/// time — enforced by the client, not by this trait.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, frame: ClientFrame) -> Result<(), HydraError>;

    /// Wait up to `timeout` for the next frame. `Ok(None)` means the
    /// timeout elapsed with nothing received — used by the heartbeat loop
    /// to detect a dead server without that being a hard transport error.
    async fn recv(&mut self, timeout: Duration) -> Result<Option<ServerFrame>, HydraError>;
}

/// Opens a `Transport` session to `endpoint`. Kept separate from `Transport`
/// itself so the connect step (which may fail with `BadEndpoint` before any
/// session exists) and the session's send/recv loop have distinct, minimal
/// interfaces — the same split as keeping a one-shot setup step separate
/// from a long-lived connection's steady-state API.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self::Transport, HydraError>;
}

/// In-memory transport for tests: one end is handed to the `SyncClient`,
/// the other (`MockPeer`) lets the test assert what the client sent and
/// script what the "server" replies.
pub struct MockTransport {
    outgoing: mpsc::UnboundedSender<ClientFrame>,
    incoming: mpsc::UnboundedReceiver<ServerFrame>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: ClientFrame) -> Result<(), HydraError> {
        self.outgoing
            .send(frame)
            .map_err(|_| HydraError::Transport("peer end dropped".into()))
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<ServerFrame>, HydraError> {
        match tokio::time::timeout(timeout, self.incoming.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(HydraError::Transport("peer end dropped".into())),
            Err(_elapsed) => Ok(None),
        }
    }
}

/// Harness-side handle paired with a `MockTransport`.
pub struct MockPeer {
    pub sent: mpsc::UnboundedReceiver<ClientFrame>,
    pub reply: mpsc::UnboundedSender<ServerFrame>,
}

impl MockPeer {
    /// Wait for the client's next outgoing frame.
    pub async fn recv_sent(&mut self) -> Option<ClientFrame> {
        self.sent.recv().await
    }

    pub fn send_reply(&self, frame: ServerFrame) {
        let _ = self.reply.send(frame);
    }
}

/// Build a connected `(MockTransport, MockPeer)` pair.
pub fn mock_pair() -> (MockTransport, MockPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    (
        MockTransport {
            outgoing: out_tx,
            incoming: in_rx,
        },
        MockPeer {
            sent: out_rx,
            reply: in_tx,
        },
    )
}

/// A `Connector` that always hands out the same pre-built `MockTransport`
/// (single use, since a `Transport` can't be cloned), or always fails with
/// `BadEndpoint` if configured to.
pub struct MockConnector {
    transport: std::sync::Mutex<Option<MockTransport>>,
    fail: bool,
}

impl MockConnector {
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport: std::sync::Mutex::new(Some(transport)),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            transport: std::sync::Mutex::new(None),
            fail: true,
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(
        &self,
        endpoint: &str,
        _timeout: Duration,
    ) -> Result<Self::Transport, HydraError> {
        if self.fail {
            return Err(HydraError::BadEndpoint(endpoint.to_string()));
        }
        self.transport
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| HydraError::BadEndpoint("mock transport already consumed".into()))
    }
}
