//! Live connection registry and fan-out.
//!
//! Each connection owns a bounded outbound queue drained by its socket task.
//! `broadcast` serializes once and pushes the frame onto every queue under
//! the registry lock, so each connection sees frames in broadcast order.
//! A full or closed queue counts as a failed write and drops the connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

pub type ConnectionId = u64;

/// Serialized frame shared by every recipient of one broadcast.
pub type Frame = Arc<str>;

/// Sending half of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame for this connection only.
    pub fn try_send(&self, frame: Frame) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

struct Inner {
    connections: Mutex<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Broadcaster {
    /// `buffer` is the per-connection outbound queue depth.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Allocate a handle and the receiver its socket task drains. The handle
    /// receives nothing until [`connect`](Self::connect) registers it.
    pub fn open(&self) -> (ConnectionHandle, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        (ConnectionHandle { id, tx }, rx)
    }

    /// Register a handle. Registering the same handle twice is a no-op.
    pub async fn connect(&self, handle: &ConnectionHandle) {
        let mut connections = self.inner.connections.lock().await;
        if connections.insert(handle.id, handle.clone()).is_none() {
            info!(connection_id = handle.id, active = connections.len(), "Client connected");
        }
    }

    /// Deregister a handle. Returns `false` if it was already gone.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let mut connections = self.inner.connections.lock().await;
        let removed = connections.remove(&id).is_some();
        if removed {
            info!(connection_id = id, active = connections.len(), "Client disconnected");
        }
        removed
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.lock().await.len()
    }

    /// Deliver `message` to every registered connection. Returns the number
    /// of connections that accepted it. Connections whose queue is full or
    /// closed are removed.
    pub async fn broadcast<T: Serialize + ?Sized>(&self, message: &T) -> Result<usize> {
        let frame: Frame = serde_json::to_string(message)?.into();

        let mut connections = self.inner.connections.lock().await;
        let mut failed = Vec::new();
        for (id, handle) in connections.iter() {
            if !handle.try_send(frame.clone()) {
                failed.push(*id);
            }
        }
        for id in &failed {
            connections.remove(id);
            debug!(connection_id = id, "Dropped connection after failed write");
        }

        let delivered = connections.len();
        if !failed.is_empty() {
            info!(delivered, dropped = failed.len(), "Broadcast pruned dead connections");
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn parse(frame: &Frame) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let broadcaster = Broadcaster::new(4);
        let (handle, _rx) = broadcaster.open();
        broadcaster.connect(&handle).await;
        broadcaster.connect(&handle).await;
        assert_eq!(broadcaster.connection_count().await, 1);
    }

    #[tokio::test]
    async fn double_disconnect_is_noop() {
        let broadcaster = Broadcaster::new(4);
        let (handle, _rx) = broadcaster.open();
        broadcaster.connect(&handle).await;

        assert!(broadcaster.disconnect(handle.id()).await);
        assert!(!broadcaster.disconnect(handle.id()).await);
        assert_eq!(broadcaster.connection_count().await, 0);
    }

    #[tokio::test]
    async fn every_connection_receives_each_frame_once_in_order() {
        let broadcaster = Broadcaster::new(8);
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (handle, rx) = broadcaster.open();
            broadcaster.connect(&handle).await;
            receivers.push(rx);
        }

        for n in 0..3 {
            let delivered = broadcaster.broadcast(&json!({ "n": n })).await.unwrap();
            assert_eq!(delivered, 3);
        }

        for rx in receivers.iter_mut() {
            for n in 0..3 {
                let frame = rx.recv().await.unwrap();
                assert_eq!(parse(&frame)["n"], n);
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn failed_peer_is_removed_and_others_still_receive() {
        let broadcaster = Broadcaster::new(8);
        let (a, rx_a) = broadcaster.open();
        let (b, mut rx_b) = broadcaster.open();
        let (c, mut rx_c) = broadcaster.open();
        for handle in [&a, &b, &c] {
            broadcaster.connect(handle).await;
        }

        // A's socket task has gone away.
        drop(rx_a);

        let delivered = broadcaster.broadcast(&json!({ "type": "echo" })).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(broadcaster.connection_count().await, 2);
        assert_eq!(parse(&rx_b.recv().await.unwrap())["type"], "echo");
        assert_eq!(parse(&rx_c.recv().await.unwrap())["type"], "echo");

        // Racing disconnect after removal is tolerated.
        assert!(!broadcaster.disconnect(a.id()).await);
    }

    #[tokio::test]
    async fn slow_peer_with_full_queue_is_dropped() {
        let broadcaster = Broadcaster::new(1);
        let (slow, _rx_slow) = broadcaster.open();
        let (fast, mut rx_fast) = broadcaster.open();
        broadcaster.connect(&slow).await;
        broadcaster.connect(&fast).await;

        broadcaster.broadcast(&json!({ "n": 1 })).await.unwrap();
        rx_fast.recv().await.unwrap();

        let delivered = broadcaster.broadcast(&json!({ "n": 2 })).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(parse(&rx_fast.recv().await.unwrap())["n"], 2);
    }

    #[tokio::test]
    async fn unregistered_handle_receives_nothing() {
        let broadcaster = Broadcaster::new(4);
        let (_handle, mut rx) = broadcaster.open();
        assert_eq!(broadcaster.broadcast(&json!({})).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }
}
