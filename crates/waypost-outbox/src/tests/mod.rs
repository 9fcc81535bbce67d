//! Integration tests for the delivery controller.
//!
//! - `harness.rs`      - Fakes for every collaborator plus the controller harness
//! - `scenarios.rs`    - End-to-end walkthroughs (offline arrival, failed send,
//!                       unbuffered send, orphan discard)
//! - `ordering.rs`     - Insertion-order delivery
//! - `single_flight.rs` - No overlapping read/send/delete
//! - `retry.rs`        - Retry timer and reachability interplay
//! - `lifecycle.rs`    - Start, stop, restart and shutdown
//! - `side_channel.rs` - Best-effort side-channel copies
//! - `persistence.rs`  - Real SQLite outbox across controller restarts

pub(crate) mod harness;
mod single_flight;
