//! In-memory work queue.
//!
//! A named FIFO with visible and in-flight messages. `receive` hands out
//! a `Delivery` lease: acknowledging it deletes the message, dropping it
//! puts the message back at the head of the queue so a worker that is
//! torn down mid-job never loses work.
//!
//! The queue also tracks the high-water mark of its visible depth so the
//! backlog metric can report the maximum over a sampling window instead
//! of whatever the depth happens to be at read time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};

/// A message in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub body: String,
    /// How many times this message has been handed to a receiver.
    pub receive_count: u32,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub visible: usize,
    pub in_flight: usize,
    pub sent: u64,
    pub deleted: u64,
}

struct QueueState {
    visible: VecDeque<Message>,
    in_flight: usize,
    /// Highest visible depth since the last window read.
    high_water: usize,
    next_id: u64,
    sent: u64,
    deleted: u64,
    closed: bool,
}

struct QueueInner {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

/// Cloneable handle to a shared work queue.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<QueueInner>,
}

impl WorkQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                state: Mutex::new(QueueState {
                    visible: VecDeque::new(),
                    in_flight: 0,
                    high_water: 0,
                    next_id: 1,
                    sent: 0,
                    deleted: 0,
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message; returns its id.
    pub fn send(&self, body: impl Into<String>) -> QueueResult<u64> {
        let id = {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed(self.inner.name.clone()));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.sent += 1;
            state.visible.push_back(Message {
                id,
                body: body.into(),
                receive_count: 0,
            });
            state.high_water = state.high_water.max(state.visible.len());
            id
        };
        self.inner.notify.notify_one();
        Ok(id)
    }

    /// Wait for the next visible message.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn receive(&self) -> Option<Delivery> {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(delivery) = self.try_receive() {
                return Some(delivery);
            }
            if self.lock().closed {
                return None;
            }
            notified.await;
        }
    }

    /// Take the next visible message without waiting.
    pub fn try_receive(&self) -> Option<Delivery> {
        let mut state = self.lock();
        let mut message = state.visible.pop_front()?;
        message.receive_count += 1;
        state.in_flight += 1;
        Some(Delivery {
            queue: self.clone(),
            message: Some(message),
        })
    }

    /// Number of messages waiting to be received.
    pub fn visible(&self) -> usize {
        self.lock().visible.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            visible: state.visible.len(),
            in_flight: state.in_flight,
            sent: state.sent,
            deleted: state.deleted,
        }
    }

    /// Maximum visible depth since the previous call, then start a new window.
    pub fn take_window_max(&self) -> usize {
        let mut state = self.lock();
        let current = state.visible.len();
        let max = state.high_water.max(current);
        state.high_water = current;
        max
    }

    /// Stop accepting messages and wake every waiting receiver.
    pub fn close(&self) {
        self.lock().closed = true;
        self.inner.notify.notify_waiters();
        info!(queue = %self.inner.name, "queue closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn complete(&self, message: &Message) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.deleted += 1;
        debug!(queue = %self.inner.name, id = message.id, "message deleted");
    }

    fn requeue(&self, message: Message) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            debug!(
                queue = %self.inner.name,
                id = message.id,
                receive_count = message.receive_count,
                "message returned to queue"
            );
            state.visible.push_front(message);
            state.high_water = state.high_water.max(state.visible.len());
        }
        self.inner.notify.notify_one();
    }
}

/// A received message, leased until acknowledged or dropped.
pub struct Delivery {
    queue: WorkQueue,
    message: Option<Message>,
}

impl Delivery {
    pub fn message(&self) -> &Message {
        // Only `ack`/`release` take the message, and both consume `self`.
        self.message
            .as_ref()
            .unwrap_or_else(|| unreachable!("delivery already settled"))
    }

    pub fn body(&self) -> &str {
        &self.message().body
    }

    /// Processing finished; delete the message.
    pub fn ack(mut self) {
        if let Some(message) = self.message.take() {
            self.queue.complete(&message);
        }
    }

    /// Give the message back for another receiver.
    pub fn release(mut self) {
        if let Some(message) = self.message.take() {
            self.queue.requeue(message);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(message) = self.message.take() {
            self.queue.requeue(message);
        }
    }
}
