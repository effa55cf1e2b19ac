use crate::config::OverflowPolicy;
use futures::FutureExt;
use pipecore::{panic_message, EventCallback, NotificationError, RunState, StageId, WorkflowEvent};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// One queued callback invocation
#[derive(Debug, Clone)]
pub struct Notification {
    pub snapshot: Arc<RunState>,
    pub event: WorkflowEvent,
    pub stage_id: Option<StageId>,
}

struct Shared {
    queue: Mutex<VecDeque<Notification>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        // A poisoned queue still holds valid notifications
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Delivery counters, mostly for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dropped: u64,
    pub failed: u64,
}

/// Bounded, non-blocking notification queue drained by a single task
///
/// `enqueue` never waits: when the queue is full the configured
/// [`OverflowPolicy`] decides which notification is discarded. The drain
/// task delivers notifications in enqueue order and swallows every
/// callback error or panic.
pub struct EventDispatcher {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    /// Start the drain task. Must be called from within a Tokio runtime.
    pub fn spawn(callback: Arc<dyn EventCallback>, capacity: usize, policy: OverflowPolicy) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity: capacity.max(1),
            policy,
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let worker = tokio::spawn(drain(shared.clone(), callback));

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn enqueue(&self, notification: Notification) {
        if self.shared.closed.load(Ordering::Acquire) {
            tracing::debug!(
                "Dispatcher closed, discarding {} notification",
                notification.event
            );
            return;
        }

        {
            let mut queue = self.shared.queue();
            if queue.len() >= self.shared.capacity {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                match self.shared.policy {
                    OverflowPolicy::DropNewest => {
                        tracing::warn!(
                            "Event queue full ({}), dropping {} notification",
                            self.shared.capacity,
                            notification.event
                        );
                        return;
                    }
                    OverflowPolicy::DropOldest => {
                        if let Some(old) = queue.pop_front() {
                            tracing::warn!(
                                "Event queue full ({}), dropping oldest {} notification",
                                self.shared.capacity,
                                old.event
                            );
                        }
                    }
                }
            }
            queue.push_back(notification);
        }

        self.shared.notify.notify_one();
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.queue().len()
    }

    /// Stop accepting notifications and wait until everything already queued
    /// has been delivered.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!("Event drain task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        // Let the drain task finish the backlog on its own
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }
}

/// Thin sending handle used while a run executes; a no-op without a callback.
#[derive(Clone, Copy)]
pub(crate) struct Notifier<'a> {
    dispatcher: Option<&'a EventDispatcher>,
}

impl<'a> Notifier<'a> {
    pub(crate) fn new(dispatcher: Option<&'a EventDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub(crate) fn send(&self, state: &RunState, event: WorkflowEvent, stage_id: Option<&str>) {
        if let Some(dispatcher) = self.dispatcher {
            dispatcher.enqueue(Notification {
                snapshot: Arc::new(state.clone()),
                event,
                stage_id: stage_id.map(str::to_string),
            });
        }
    }
}

async fn drain(shared: Arc<Shared>, callback: Arc<dyn EventCallback>) {
    loop {
        let next = shared.queue().pop_front();
        match next {
            Some(notification) => {
                if let Err(e) = deliver(callback.as_ref(), notification).await {
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Event notification failed: {}", e);
                }
            }
            None if shared.closed.load(Ordering::Acquire) => break,
            None => shared.notify.notified().await,
        }
    }
    tracing::debug!("Event drain task finished");
}

async fn deliver(
    callback: &dyn EventCallback,
    notification: Notification,
) -> Result<(), NotificationError> {
    let Notification {
        snapshot,
        event,
        stage_id,
    } = notification;

    match AssertUnwindSafe(callback.on_event(snapshot, event, stage_id))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => Err(NotificationError::Panicked(panic_message(payload.as_ref()))),
    }
}
