//! Store-and-forward delivery of location fixes.
//!
//! Fixes are persisted to a durable outbox as they arrive and drained to a
//! remote collector one at a time, oldest first, whenever the network allows.
//!
//! # Core Invariants
//!
//! 1. **Ordered**: fixes are sent and retired in insertion order
//! 2. **At-least-once**: a fix leaves the outbox only after the collector
//!    accepted it (or it belongs to another device)
//! 3. **Single-flight**: at most one read, send or delete is outstanding
//! 4. **Restart-safe**: the outbox survives restarts; nothing else needs to
//!
//! # Architecture
//!
//! ```text
//! FixSource ─▶ DeliveryController ─▶ FixQueue (SQLite)
//!                    │    ▲
//!                    ▼    │
//!               Transport (HTTP) ─▶ collector
//! ```
//!
//! [`DrainMachine`] holds the decision logic without any I/O;
//! [`DeliveryController`] runs it on a Tokio task and performs the effects.

pub mod controller;
pub mod error;
pub mod machine;
pub mod queue;
pub mod reachability;
pub mod report;
pub mod sender;
pub mod side_channel;
pub mod source;

#[cfg(test)]
mod tests;

pub use controller::{Collaborators, ControllerConfig, ControllerHandle, DeliveryController};
pub use error::{AcquisitionError, OutboxError, OutboxResult};
pub use machine::{ControllerStatus, DrainMachine, DrainState, Effect, Input, MachineConfig};
pub use queue::{FixQueue, SqliteFixQueue};
pub use reachability::{ManualReachability, ReachabilityMonitor, TcpProbeMonitor};
pub use report::{RecordingReporter, StatusEvent, StatusReporter, TracingReporter};
pub use sender::{DeliveryRequest, OsmAndTransport, Transport};
pub use side_channel::{SideChannelNotifier, WebhookNotifier};
pub use source::{parse_fix_line, FixInput, FixSource, JsonLinesFixSource};
