//! Joinable task queue drained by a single consumer
//!
//! Routed reify requests land here and are applied in FIFO order by one
//! consumer, which keeps the candidates map single-writer. `join` is
//! barrier phase B: it parks until every task ever enqueued has been
//! marked done, not merely received.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Default)]
struct QueueState {
    pending: AtomicUsize,
    drained: Notify,
}

/// Sending half plus join/depth accounting.
#[derive(Debug)]
pub struct TaskQueue<T> {
    tx: mpsc::Sender<T>,
    state: Arc<QueueState>,
}

// manual impl: clones must not require T: Clone
impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

/// Receiving half held by the single consumer.
#[derive(Debug)]
pub struct TaskReceiver<T> {
    rx: mpsc::Receiver<T>,
    state: Arc<QueueState>,
}

/// Create a bounded queue and its consumer handle.
pub fn task_queue<T>(capacity: usize) -> (TaskQueue<T>, TaskReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let state = Arc::new(QueueState::default());

    (
        TaskQueue {
            tx,
            state: Arc::clone(&state),
        },
        TaskReceiver { rx, state },
    )
}

impl<T> TaskQueue<T> {
    /// Enqueue a task, suspending while the queue is at capacity.
    ///
    /// Returns false when the consumer is gone (worker shutting down).
    pub async fn put(&self, task: T) -> bool {
        self.state.pending.fetch_add(1, Ordering::AcqRel);

        if self.tx.send(task).await.is_err() {
            // consumer dropped; roll the accounting back
            if self.state.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.state.drained.notify_waiters();
            }
            return false;
        }

        true
    }

    /// Tasks enqueued but not yet marked done.
    pub fn depth(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Park until every enqueued task has been marked done.
    pub async fn join(&self) {
        loop {
            let drained = self.state.drained.notified();
            if self.state.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            drained.await;
        }
    }
}

impl<T> TaskReceiver<T> {
    /// Next task in FIFO order; None once all senders are gone.
    pub async fn get(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Mark the most recently received task as done.
    pub fn task_done(&self) {
        if self.state.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.drained.notify_waiters();
        }
    }
}
