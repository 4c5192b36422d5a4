//! Audit log: the append-only record of every review round.

pub mod entry;
pub mod store;

pub use entry::{AuditLogEntry, Disposition, Outcome, ReviewerStats};
pub use store::{
    window_of, window_start, AuditError, AuditResult, AuditStore, JsonlAuditLog, MemoryAuditLog,
};
