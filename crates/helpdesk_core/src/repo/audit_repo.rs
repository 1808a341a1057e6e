//! Append-only audit ledger persistence.
//!
//! # Responsibility
//! - Append one record per mutation inside the caller's transaction.
//! - Count and page through records with optional filters.
//!
//! # Invariants
//! - This module never commits and never updates or deletes ledger rows;
//!   the schema rejects both with triggers.
//! - Reads are newest-first: `created_at DESC, id DESC`.

use crate::model::actor::AuditContext;
use crate::model::audit::{AuditEntry, AuditRecord, Snapshot};
use crate::repo::ensure_schema_current;
use crate::repo::error::{StoreError, StoreResult};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const AUDIT_SELECT_SQL: &str = "SELECT
    id,
    created_at,
    actor_id,
    actor_email,
    actor_name,
    ip,
    user_agent,
    entity_type,
    entity_id,
    action,
    message,
    before_json,
    after_json
FROM audit_logs";

/// Optional ledger filters. Blank values are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditFilter {
    /// Exact entity type, e.g. `Task` or `Ticket`.
    pub entity_type: Option<String>,
    /// Exact action name.
    pub action: Option<String>,
    /// Actor id (exact) or a substring of actor email/name.
    pub actor: Option<String>,
    /// Substring of the message.
    pub text: Option<String>,
}

impl AuditFilter {
    /// Builds a filter from raw query-string values.
    pub fn from_params(
        entity_type: Option<&str>,
        action: Option<&str>,
        actor: Option<&str>,
        text: Option<&str>,
    ) -> Self {
        Self {
            entity_type: non_blank(entity_type),
            action: non_blank(action),
            actor: non_blank(actor),
            text: non_blank(text),
        }
    }

    pub fn entity_type(mut self, value: &str) -> Self {
        self.entity_type = non_blank(Some(value));
        self
    }

    pub fn action(mut self, value: &str) -> Self {
        self.action = non_blank(Some(value));
        self
    }

    pub fn actor(mut self, value: &str) -> Self {
        self.actor = non_blank(Some(value));
        self
    }

    pub fn text(mut self, value: &str) -> Self {
        self.text = non_blank(Some(value));
        self
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<&'static str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(entity_type) = self.entity_type.as_ref() {
            clauses.push("entity_type = ?");
            bind_values.push(Value::Text(entity_type.clone()));
        }
        if let Some(action) = self.action.as_ref() {
            clauses.push("action = ?");
            bind_values.push(Value::Text(action.clone()));
        }
        if let Some(actor) = self.actor.as_ref() {
            let pattern = like_contains(actor);
            match actor.parse::<i64>() {
                Ok(actor_id) => {
                    clauses.push(
                        "(actor_email LIKE ? ESCAPE '\\' OR actor_name LIKE ? ESCAPE '\\' OR actor_id = ?)",
                    );
                    bind_values.push(Value::Text(pattern.clone()));
                    bind_values.push(Value::Text(pattern));
                    bind_values.push(Value::Integer(actor_id));
                }
                Err(_) => {
                    clauses.push("(actor_email LIKE ? ESCAPE '\\' OR actor_name LIKE ? ESCAPE '\\')");
                    bind_values.push(Value::Text(pattern.clone()));
                    bind_values.push(Value::Text(pattern));
                }
            }
        }
        if let Some(text) = self.text.as_ref() {
            clauses.push("message LIKE ? ESCAPE '\\'");
            bind_values.push(Value::Text(like_contains(text)));
        }

        if clauses.is_empty() {
            return (String::new(), bind_values);
        }
        (format!(" WHERE {}", clauses.join(" AND ")), bind_values)
    }
}

/// Repository interface for the audit ledger.
pub trait AuditRepository {
    /// Appends one record and returns it as stored.
    fn record(&self, ctx: &AuditContext, entry: AuditEntry) -> StoreResult<AuditRecord>;
    fn count(&self, filter: &AuditFilter) -> StoreResult<i64>;
    fn list(&self, filter: &AuditFilter, limit: i64, offset: i64) -> StoreResult<Vec<AuditRecord>>;
}

/// SQLite-backed audit ledger.
pub struct SqliteAuditRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_current(conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn new_unchecked(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AuditRepository for SqliteAuditRepository<'_> {
    fn record(&self, ctx: &AuditContext, entry: AuditEntry) -> StoreResult<AuditRecord> {
        if self.conn.is_autocommit() {
            return Err(StoreError::InvalidArgument(
                "audit records require an open write transaction".to_string(),
            ));
        }
        let degraded = entry.is_degraded();
        let actor = ctx.actor.as_ref();
        self.conn.execute(
            "INSERT INTO audit_logs (
                actor_id,
                actor_email,
                actor_name,
                ip,
                user_agent,
                entity_type,
                entity_id,
                action,
                message,
                before_json,
                after_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                actor.map(|actor| actor.id),
                actor.and_then(|actor| actor.email.as_deref()),
                actor.and_then(|actor| actor.name.as_deref()),
                ctx.origin.ip,
                ctx.origin.user_agent,
                entry.entity_type,
                entry.entity_id,
                entry.action,
                entry.message,
                entry.before.as_ref().map(Snapshot::as_str),
                entry.after.as_ref().map(Snapshot::as_str),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(
            "event=audit_record module=audit status=ok id={id} entity_type={} action={} degraded={degraded}",
            entry.entity_type, entry.action
        );

        let mut stmt = self
            .conn
            .prepare(&format!("{AUDIT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => parse_audit_row(row),
            None => Err(StoreError::InvalidData(format!(
                "audit record {id} missing after insert"
            ))),
        }
    }

    fn count(&self, filter: &AuditFilter) -> StoreResult<i64> {
        let (where_sql, bind_values) = filter.where_clause();
        let total = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM audit_logs{where_sql};"),
            params_from_iter(bind_values),
            |row| row.get(0),
        )?;
        Ok(total)
    }

    fn list(&self, filter: &AuditFilter, limit: i64, offset: i64) -> StoreResult<Vec<AuditRecord>> {
        let (where_sql, mut bind_values) = filter.where_clause();
        let sql = format!(
            "{AUDIT_SELECT_SQL}{where_sql} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?;"
        );
        bind_values.push(Value::Integer(limit.max(0)));
        bind_values.push(Value::Integer(offset.max(0)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_audit_row(row)?);
        }
        Ok(records)
    }
}

fn parse_audit_row(row: &Row<'_>) -> StoreResult<AuditRecord> {
    let before: Option<String> = row.get("before_json")?;
    let after: Option<String> = row.get("after_json")?;
    Ok(AuditRecord {
        id: row.get("id")?,
        created_at: row.get("created_at")?,
        actor_id: row.get("actor_id")?,
        actor_email: row.get("actor_email")?,
        actor_name: row.get("actor_name")?,
        ip: row.get("ip")?,
        user_agent: row.get("user_agent")?,
        entity_type: row.get("entity_type")?,
        entity_id: row.get("entity_id")?,
        action: row.get("action")?,
        message: row.get("message")?,
        before: before.map(Snapshot::from_stored),
        after: after.map(Snapshot::from_stored),
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

/// `%value%` with LIKE wildcards in `value` escaped.
fn like_contains(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
