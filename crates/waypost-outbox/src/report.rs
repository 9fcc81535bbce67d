//! Status events and the sinks that receive them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Something noteworthy the delivery controller did.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Started,
    Stopped,
    /// A new fix was handed to the controller.
    FixReceived {
        device_id: String,
        captured_at: DateTime<Utc>,
    },
    /// A fix was appended to the outbox.
    FixQueued { id: i64 },
    /// The outbox rejected a fix. The fix is lost.
    PersistFailed { error: String },
    /// Unbuffered fix delivered.
    DirectSent { captured_at: DateTime<Utc> },
    /// Unbuffered fix could not be delivered and was dropped.
    DirectSendFailed {
        captured_at: DateTime<Utc>,
        error: String,
    },
    ReadFailed { error: String },
    Sent { id: i64 },
    SendFailed { id: i64, error: String },
    /// A queued fix from another device was dropped without being sent.
    OrphanDiscarded { id: i64, device_id: String },
    DeleteFailed { id: i64, error: String },
    RetryScheduled,
    QueueDrained,
    ReachabilityChanged { reachable: bool },
    AcquisitionFailed { error: String },
    SideChannelFailed { error: String },
}

/// Receives status events. Called synchronously from the controller task,
/// so implementations must not block.
pub trait StatusReporter: Send + Sync {
    fn report(&self, event: &StatusEvent);
}

/// Reports events as `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report(&self, event: &StatusEvent) {
        match event {
            StatusEvent::Started => info!("Delivery controller started"),
            StatusEvent::Stopped => info!("Delivery controller stopped"),
            StatusEvent::FixReceived {
                device_id,
                captured_at,
            } => debug!(device_id = %device_id, captured_at = %captured_at, "Fix received"),
            StatusEvent::FixQueued { id } => debug!(fix_id = id, "Fix queued"),
            StatusEvent::PersistFailed { error } => {
                error!(error = %error, "Failed to queue fix, fix dropped")
            }
            StatusEvent::DirectSent { captured_at } => {
                info!(captured_at = %captured_at, "Fix sent")
            }
            StatusEvent::DirectSendFailed { captured_at, error } => warn!(
                captured_at = %captured_at,
                error = %error,
                "Send failed, fix dropped (buffering disabled)"
            ),
            StatusEvent::ReadFailed { error } => warn!(error = %error, "Failed to read outbox"),
            StatusEvent::Sent { id } => info!(fix_id = id, "Fix sent"),
            StatusEvent::SendFailed { id, error } => {
                warn!(fix_id = id, error = %error, "Send failed")
            }
            StatusEvent::OrphanDiscarded { id, device_id } => info!(
                fix_id = id,
                device_id = %device_id,
                "Discarding fix queued for another device"
            ),
            StatusEvent::DeleteFailed { id, error } => {
                warn!(fix_id = id, error = %error, "Failed to delete sent fix")
            }
            StatusEvent::RetryScheduled => debug!("Retry scheduled"),
            StatusEvent::QueueDrained => debug!("Outbox drained"),
            StatusEvent::ReachabilityChanged { reachable } => {
                info!(reachable = *reachable, "Reachability changed")
            }
            StatusEvent::AcquisitionFailed { error } => {
                warn!(error = %error, "Fix acquisition failed")
            }
            StatusEvent::SideChannelFailed { error } => {
                warn!(error = %error, "Side channel notification failed")
            }
        }
    }
}

/// Keeps every reported event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events reported so far, oldest first.
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }

    /// Number of reported events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&StatusEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, event: &StatusEvent) {
        self.events.lock().push(event.clone());
    }
}
