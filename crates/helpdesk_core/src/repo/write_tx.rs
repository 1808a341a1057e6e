//! Write transaction scaffolding with a single contention retry.
//!
//! # Responsibility
//! - Run one logical mutation (store change plus its audit entry) inside a
//!   single `BEGIN IMMEDIATE` transaction.
//! - Retry lock contention exactly once after a fixed backoff, then report
//!   `StoreError::Conflict`.
//!
//! # Invariants
//! - The body either commits completely or leaves no trace.
//! - Non-contention errors are returned unchanged and never retried.
//! - `BEGIN IMMEDIATE` takes the database write lock before the body reads
//!   any position, so no two writers observe the same numbering.

use crate::repo::error::{StoreError, StoreResult};
use log::{debug, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 2;

/// Backoff applied before the single retry of a contended write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(50),
        }
    }
}

/// Runs `body` in an immediate write transaction and commits it.
///
/// `body` may run twice; it must not keep side effects outside the
/// transaction.
pub fn run_write<T>(
    conn: &Connection,
    policy: RetryPolicy,
    operation: &'static str,
    mut body: impl FnMut(&Transaction<'_>) -> StoreResult<T>,
) -> StoreResult<T> {
    let mut attempt = 1;
    loop {
        match run_once(conn, &mut body) {
            Ok(value) => {
                debug!("event=write_tx module=repo status=ok op={operation} attempt={attempt}");
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                warn!(
                    "event=write_tx module=repo status=retry op={operation} attempt={attempt} backoff_ms={} error={err}",
                    policy.backoff.as_millis()
                );
                std::thread::sleep(policy.backoff);
                attempt += 1;
            }
            Err(err) if err.is_retryable() => {
                warn!(
                    "event=write_tx module=repo status=conflict op={operation} attempt={attempt} error={err}"
                );
                return Err(StoreError::Conflict { operation });
            }
            Err(err) => {
                debug!(
                    "event=write_tx module=repo status=error op={operation} attempt={attempt} error={err}"
                );
                return Err(err);
            }
        }
    }
}

fn run_once<T>(
    conn: &Connection,
    body: &mut impl FnMut(&Transaction<'_>) -> StoreResult<T>,
) -> StoreResult<T> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = body(&tx)?;
    tx.commit()?;
    Ok(value)
}
