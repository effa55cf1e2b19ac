use super::base::{EventCallback, ProgressEvent, WorkflowEvent};
use crate::{NotificationError, RunState, StageId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Fan-out of progress events to any number of subscribers
///
/// Slow subscribers lag and lose the oldest events; publishing never waits.
pub struct EventBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ProgressEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl EventCallback for EventBus {
    async fn on_event(
        &self,
        snapshot: Arc<RunState>,
        event: WorkflowEvent,
        stage_id: Option<StageId>,
    ) -> Result<(), NotificationError> {
        self.emit(ProgressEvent::from_snapshot(
            &snapshot,
            event,
            stage_id.as_deref(),
        ));
        Ok(())
    }
}
