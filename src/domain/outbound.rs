//! Bounded per-connection outbound queue.
//!
//! Each WebSocket connection owns one [`OutboundReceiver`] drained by its
//! write loop, while the broadcast engine holds cloneable [`OutboundSender`]
//! handles. The queue is bounded; when full, the configured
//! [`OverflowPolicy`] decides which message gives way. A stalled connection
//! therefore never blocks delivery to any other connection.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};

/// A serialized server event, shared across all delivery targets.
pub type Frame = Arc<str>;

/// What to do with an incoming message when a connection's outbound
/// buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued message to make room (ring-buffer style).
    DropOldest,
    /// Discard the incoming message, keeping the queue as-is.
    DropNewest,
    /// Refuse the send; the caller observes the rejection.
    Reject,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop_oldest" => Ok(Self::DropOldest),
            "drop_newest" => Ok(Self::DropNewest),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown overflow policy: {other}")),
        }
    }
}

/// Result of attempting to enqueue a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Frame accepted with room to spare.
    Enqueued,
    /// Frame accepted after evicting the oldest queued frame.
    DroppedOldest,
    /// Queue full; the incoming frame was discarded.
    DroppedNewest,
    /// Queue full; the send was refused under the reject policy.
    Rejected,
    /// The connection is gone; the frame went nowhere.
    Closed,
}

#[derive(Debug)]
struct Shared {
    queue: Mutex<VecDeque<Frame>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
}

/// Sending half of an outbound queue. Cheap to clone; held by the
/// connection registry and handed out during scope resolution.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    shared: Arc<Shared>,
}

/// Receiving half, owned exclusively by the connection's write loop.
#[derive(Debug)]
pub struct OutboundReceiver {
    shared: Arc<Shared>,
}

/// Creates a linked sender/receiver pair with the given capacity.
///
/// A capacity of zero is clamped to one so the queue can always hold at
/// least the frame being delivered.
#[must_use]
pub fn outbound_channel(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::new()),
        notify: Notify::new(),
        closed: AtomicBool::new(false),
        capacity: capacity.max(1),
    });
    (
        OutboundSender {
            shared: Arc::clone(&shared),
        },
        OutboundReceiver { shared },
    )
}

impl OutboundSender {
    /// Enqueues a frame, applying `policy` if the buffer is full.
    pub async fn enqueue(&self, frame: Frame, policy: OverflowPolicy) -> EnqueueOutcome {
        if self.shared.closed.load(Ordering::Acquire) {
            return EnqueueOutcome::Closed;
        }
        let outcome = {
            let mut queue = self.shared.queue.lock().await;
            if queue.len() >= self.shared.capacity {
                match policy {
                    OverflowPolicy::DropOldest => {
                        queue.pop_front();
                        queue.push_back(frame);
                        EnqueueOutcome::DroppedOldest
                    }
                    OverflowPolicy::DropNewest => EnqueueOutcome::DroppedNewest,
                    OverflowPolicy::Reject => EnqueueOutcome::Rejected,
                }
            } else {
                queue.push_back(frame);
                EnqueueOutcome::Enqueued
            }
        };
        if matches!(
            outcome,
            EnqueueOutcome::Enqueued | EnqueueOutcome::DroppedOldest
        ) {
            self.shared.notify.notify_one();
        }
        outcome
    }

    /// Marks the queue closed. Subsequent enqueues return
    /// [`EnqueueOutcome::Closed`]; the receiver drains remaining frames
    /// and then observes end-of-stream.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    /// Returns `true` once either side has closed the queue.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl OutboundReceiver {
    /// Waits for the next frame. Returns `None` once the queue is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            {
                let mut queue = self.shared.queue.lock().await;
                if let Some(frame) = queue.pop_front() {
                    return Some(frame);
                }
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }
}

impl Drop for OutboundReceiver {
    fn drop(&mut self) {
        // The write loop is gone; further enqueues must become no-ops.
        self.shared.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Frame {
        Arc::from(s)
    }

    #[tokio::test]
    async fn enqueue_then_recv() {
        let (tx, mut rx) = outbound_channel(4);
        let outcome = tx.enqueue(frame("a"), OverflowPolicy::Reject).await;
        assert_eq!(outcome, EnqueueOutcome::Enqueued);
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let (tx, mut rx) = outbound_channel(4);
        let _ = tx.enqueue(frame("first"), OverflowPolicy::Reject).await;
        let _ = tx.enqueue(frame("second"), OverflowPolicy::Reject).await;
        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(rx.recv().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn drop_oldest_evicts_head() {
        let (tx, mut rx) = outbound_channel(2);
        let _ = tx.enqueue(frame("a"), OverflowPolicy::DropOldest).await;
        let _ = tx.enqueue(frame("b"), OverflowPolicy::DropOldest).await;
        let outcome = tx.enqueue(frame("c"), OverflowPolicy::DropOldest).await;
        assert_eq!(outcome, EnqueueOutcome::DroppedOldest);
        assert_eq!(rx.recv().await.as_deref(), Some("b"));
        assert_eq!(rx.recv().await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn drop_newest_discards_incoming() {
        let (tx, mut rx) = outbound_channel(1);
        let _ = tx.enqueue(frame("kept"), OverflowPolicy::DropNewest).await;
        let outcome = tx.enqueue(frame("lost"), OverflowPolicy::DropNewest).await;
        assert_eq!(outcome, EnqueueOutcome::DroppedNewest);
        assert_eq!(rx.recv().await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn reject_refuses_when_full() {
        let (tx, _rx) = outbound_channel(1);
        let _ = tx.enqueue(frame("a"), OverflowPolicy::Reject).await;
        let outcome = tx.enqueue(frame("b"), OverflowPolicy::Reject).await;
        assert_eq!(outcome, EnqueueOutcome::Rejected);
    }

    #[tokio::test]
    async fn closed_queue_drains_then_ends() {
        let (tx, mut rx) = outbound_channel(4);
        let _ = tx.enqueue(frame("tail"), OverflowPolicy::Reject).await;
        tx.close();
        assert_eq!(rx.recv().await.as_deref(), Some("tail"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn enqueue_after_close_is_noop() {
        let (tx, rx) = outbound_channel(4);
        drop(rx);
        let outcome = tx.enqueue(frame("x"), OverflowPolicy::Reject).await;
        assert_eq!(outcome, EnqueueOutcome::Closed);
    }

    #[tokio::test]
    async fn recv_wakes_on_enqueue() {
        let (tx, mut rx) = outbound_channel(4);
        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        let _ = tx.enqueue(frame("wake"), OverflowPolicy::Reject).await;
        let received = waiter.await.ok().flatten();
        assert_eq!(received.as_deref(), Some("wake"));
    }

    #[test]
    fn overflow_policy_parses() {
        assert_eq!(
            "drop_oldest".parse::<OverflowPolicy>().ok(),
            Some(OverflowPolicy::DropOldest)
        );
        assert_eq!(
            "drop_newest".parse::<OverflowPolicy>().ok(),
            Some(OverflowPolicy::DropNewest)
        );
        assert_eq!(
            "reject".parse::<OverflowPolicy>().ok(),
            Some(OverflowPolicy::Reject)
        );
        assert!("banana".parse::<OverflowPolicy>().is_err());
    }
}
