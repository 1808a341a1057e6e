//! Repository layer: ordered-lane store and audit ledger persistence.
//!
//! # Responsibility
//! - Keep SQL and renumbering details behind typed repository APIs.
//! - Accept an explicit connection or transaction handle; repositories
//!   never commit on their own.
//!
//! # Invariants
//! - Every ordered write goes through [`ordering`], which keeps partitions
//!   dense.
//! - Repository APIs return semantic errors (`NotFound`, `InvalidArgument`)
//!   in addition to DB transport errors.

pub mod audit_repo;
pub mod error;
pub mod flow_repo;
pub mod ordering;
pub mod subtask_repo;
pub mod task_repo;
pub mod write_tx;

use crate::db::migrations::latest_version;
use error::{StoreError, StoreResult};
use uuid::Uuid;

/// Rejects connections that were not opened through `db::open_*`.
pub(crate) fn ensure_schema_current(conn: &rusqlite::Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
