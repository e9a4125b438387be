//! Test transports for async tests.

use std::time::Duration;

use scene::display::DisplaySet;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::MapQuery;
use crate::transport::{BoxFuture, QueryTransport, TransportError};

/// Records every fetch and blocks it until the test replies.
pub(crate) struct ManualTransport {
    calls: mpsc::UnboundedSender<PendingCall>,
}

pub(crate) struct ManualCalls {
    rx: mpsc::UnboundedReceiver<PendingCall>,
}

pub(crate) struct PendingCall {
    pub query: MapQuery,
    reply: oneshot::Sender<Result<DisplaySet, TransportError>>,
}

impl ManualTransport {
    pub fn new() -> (Self, ManualCalls) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { calls }, ManualCalls { rx })
    }
}

impl QueryTransport for ManualTransport {
    fn fetch(&self, query: MapQuery) -> BoxFuture<'_, Result<DisplaySet, TransportError>> {
        let (reply, rx) = oneshot::channel();
        let _ = self.calls.send(PendingCall { query, reply });
        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(TransportError::Network("reply dropped".into())))
        })
    }
}

impl ManualCalls {
    /// Next recorded fetch. Panics if none arrives within a minute of
    /// (possibly virtual) time.
    pub async fn next(&mut self) -> PendingCall {
        tokio::time::timeout(Duration::from_secs(60), self.rx.recv())
            .await
            .expect("no fetch issued")
            .expect("transport dropped")
    }

    pub fn try_next(&mut self) -> Option<PendingCall> {
        self.rx.try_recv().ok()
    }
}

impl PendingCall {
    pub fn respond(self, result: Result<DisplaySet, TransportError>) {
        let _ = self.reply.send(result);
    }

    /// True once the fetch future has been dropped by its caller.
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }
}

/// Answers every fetch with the same result set, ready on first poll.
pub(crate) struct ImmediateTransport {
    set: DisplaySet,
}

impl ImmediateTransport {
    pub fn new(set: DisplaySet) -> Self {
        Self { set }
    }
}

impl QueryTransport for ImmediateTransport {
    fn fetch(&self, _query: MapQuery) -> BoxFuture<'_, Result<DisplaySet, TransportError>> {
        let set = self.set.clone();
        Box::pin(async move { Ok(set) })
    }
}

/// Lets spawned tasks run until they block.
pub(crate) async fn drain_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
