//! SQLite storage for queued location fixes.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread ([`AsyncDatabase`])
//! - Versioned migrations
//! - The fix model types and the queue queries
//!
//! # Queue semantics
//!
//! `location_fix_outbox` is append-only. Rows get a monotonically increasing
//! `id` on insert (`AUTOINCREMENT`, so ids are never reused even after the
//! newest row is deleted), the oldest row is read without removing it, and a
//! row is only ever removed by id.
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let id = db.insert_fix(fix).await?;
//! if let Some(head) = db.select_oldest_fix().await? {
//!     // deliver head, then:
//!     db.delete_fix(head.id).await?;
//! }
//! ```

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::{LocationFix, StoredFix};
