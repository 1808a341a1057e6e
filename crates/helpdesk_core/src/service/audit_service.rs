//! Audit ledger use-case service.
//!
//! # Responsibility
//! - Append standalone ledger records for entities owned outside the board
//!   (tickets, users, attachments).
//! - Serve the paginated ledger view and the bulk export read.
//!
//! # Invariants
//! - `per_page` is always within `[1, 100]`; bulk limits within `[1, 200]`.
//! - Only authenticated callers may read the ledger.

use crate::access::{can_act_on, Resource};
use crate::model::actor::{Actor, AuditContext};
use crate::model::audit::{AuditEntry, AuditRecord};
use crate::repo::audit_repo::{AuditFilter, AuditRepository, SqliteAuditRepository};
use crate::repo::ensure_schema_current;
use crate::repo::error::StoreError;
use crate::repo::write_tx::{run_write, RetryPolicy};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_PER_PAGE: i64 = 25;
pub const MAX_PER_PAGE: i64 = 100;
pub const DEFAULT_BULK_LIMIT: i64 = 50;
pub const MAX_BULK_LIMIT: i64 = 200;

/// Service error for ledger use-cases.
#[derive(Debug)]
pub enum AuditServiceError {
    /// Anonymous callers cannot read the ledger.
    Forbidden,
    Store(StoreError),
}

impl Display for AuditServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forbidden => write!(f, "audit ledger requires an authenticated user"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AuditServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Forbidden => None,
        }
    }
}

impl From<StoreError> for AuditServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type AuditServiceResult<T> = Result<T, AuditServiceError>;

/// Normalized page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    /// Non-positive values fall back to the defaults; `per_page` is capped.
    pub fn new(page: i64, per_page: i64) -> Self {
        let page = if page < 1 { 1 } else { page };
        let per_page = if per_page < 1 {
            DEFAULT_PER_PAGE
        } else {
            per_page.min(MAX_PER_PAGE)
        };
        Self { page, per_page }
    }

    /// Parses raw query-string values; anything unparsable uses defaults.
    pub fn from_params(page: Option<&str>, per_page: Option<&str>) -> Self {
        let parse = |value: Option<&str>| value.and_then(|raw| raw.trim().parse::<i64>().ok());
        Self::new(
            parse(page).unwrap_or(1),
            parse(per_page).unwrap_or(DEFAULT_PER_PAGE),
        )
    }

    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// One page of ledger records, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditPage {
    pub items: Vec<AuditRecord>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

/// Clamps a bulk read limit; `None` uses the default.
pub fn normalize_bulk_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_BULK_LIMIT)
        .clamp(1, MAX_BULK_LIMIT)
}

/// Ledger service over one connection.
pub struct AuditService<'conn> {
    conn: &'conn Connection,
    policy: RetryPolicy,
}

impl<'conn> AuditService<'conn> {
    pub fn try_new(conn: &'conn Connection) -> AuditServiceResult<Self> {
        Self::with_policy(conn, RetryPolicy::default())
    }

    pub fn with_policy(conn: &'conn Connection, policy: RetryPolicy) -> AuditServiceResult<Self> {
        ensure_schema_current(conn)?;
        Ok(Self { conn, policy })
    }

    /// Appends one record in its own write transaction.
    ///
    /// Use this for mutations whose entity lives outside this crate; board
    /// mutations are recorded by the board service itself.
    pub fn record(&self, ctx: &AuditContext, entry: AuditEntry) -> AuditServiceResult<AuditRecord> {
        let record = run_write(self.conn, self.policy, "audit_record", |tx| {
            SqliteAuditRepository::new_unchecked(tx).record(ctx, entry.clone())
        })?;
        Ok(record)
    }

    /// Returns one page of records matching `filter`.
    ///
    /// `page` is re-normalized, so hand-built requests get the same clamps.
    pub fn query(
        &self,
        viewer: Option<&Actor>,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> AuditServiceResult<AuditPage> {
        authorize(viewer)?;
        let page = PageRequest::new(page.page, page.per_page);
        let repo = SqliteAuditRepository::new_unchecked(self.conn);
        let total = repo.count(filter)?;
        let items = repo.list(filter, page.per_page, page.offset())?;
        let pages = if total == 0 {
            0
        } else {
            (total + page.per_page - 1) / page.per_page
        };
        Ok(AuditPage {
            items,
            page: page.page,
            per_page: page.per_page,
            total,
            pages,
            has_prev: page.page > 1,
            has_next: page.page < pages,
        })
    }

    /// Returns up to `limit` newest records matching `filter`.
    pub fn list_recent(
        &self,
        viewer: Option<&Actor>,
        filter: &AuditFilter,
        limit: Option<i64>,
    ) -> AuditServiceResult<Vec<AuditRecord>> {
        authorize(viewer)?;
        let limit = normalize_bulk_limit(limit);
        Ok(SqliteAuditRepository::new_unchecked(self.conn).list(filter, limit, 0)?)
    }
}

fn authorize(viewer: Option<&Actor>) -> AuditServiceResult<()> {
    if can_act_on(viewer, &Resource::AuditLedger) {
        Ok(())
    } else {
        Err(AuditServiceError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_bulk_limit, PageRequest, DEFAULT_PER_PAGE, MAX_PER_PAGE};

    #[test]
    fn page_request_falls_back_and_caps() {
        assert_eq!(PageRequest::new(0, 0), PageRequest::default());
        assert_eq!(PageRequest::new(3, 500).per_page, MAX_PER_PAGE);
        assert_eq!(PageRequest::new(-2, 10), PageRequest { page: 1, per_page: 10 });
    }

    #[test]
    fn page_request_parses_query_strings() {
        let page = PageRequest::from_params(Some(" 4 "), Some("abc"));
        assert_eq!(page.page, 4);
        assert_eq!(page.per_page, DEFAULT_PER_PAGE);
        assert_eq!(PageRequest::from_params(None, None), PageRequest::default());
        assert_eq!(page.offset(), 3 * DEFAULT_PER_PAGE);
    }

    #[test]
    fn bulk_limit_is_clamped() {
        assert_eq!(normalize_bulk_limit(None), 50);
        assert_eq!(normalize_bulk_limit(Some(0)), 1);
        assert_eq!(normalize_bulk_limit(Some(1_000)), 200);
        assert_eq!(normalize_bulk_limit(Some(75)), 75);
    }
}
