//! Typed events emitted by the realtime service.
//!
//! Consumers receive a single tagged-variant stream and dispatch by
//! variant. Events are emitted synchronously from within task execution,
//! so a checkpoint for block N is observed strictly before any event for
//! block N+1.

use tokio::sync::mpsc;

/// Everything the realtime service reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A new head block was accepted onto the local chain.
    RealtimeCheckpoint { timestamp: i64 },
    /// The finality checkpoint advanced.
    FinalityCheckpoint { timestamp: i64 },
    /// A fork was reconciled against a common ancestor above finality.
    ShallowReorg { common_ancestor_timestamp: i64 },
    /// The ancestor walk reached the finalized block without converging;
    /// recovery (typically a full resync) is the consumer's call.
    DeepReorg {
        detected_at_block_number: u64,
        minimum_depth: u64,
    },
    /// A block task failed; the queue policy decides whether it retries.
    Error { message: String },
}

/// Sending half of the event stream, held by the service.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl EventPublisher {
    /// Create a publisher and the receiver its consumer listens on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. A dropped receiver means the consumer is gone and
    /// the event is discarded.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let (publisher, mut rx) = EventPublisher::channel();
        publisher.emit(SyncEvent::RealtimeCheckpoint { timestamp: 100 });
        publisher.emit(SyncEvent::FinalityCheckpoint { timestamp: 50 });

        assert_eq!(
            rx.recv().await,
            Some(SyncEvent::RealtimeCheckpoint { timestamp: 100 })
        );
        assert_eq!(
            rx.recv().await,
            Some(SyncEvent::FinalityCheckpoint { timestamp: 50 })
        );
    }

    #[test]
    fn emit_after_receiver_drop_is_silent() {
        let (publisher, rx) = EventPublisher::channel();
        drop(rx);
        publisher.emit(SyncEvent::Error {
            message: "ignored".into(),
        });
    }
}
