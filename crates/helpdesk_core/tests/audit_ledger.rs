use helpdesk_core::db::open_db_in_memory;
use helpdesk_core::repo::audit_repo::{AuditRepository, SqliteAuditRepository};
use helpdesk_core::repo::ordering::{positions, TASKS};
use helpdesk_core::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use helpdesk_core::repo::write_tx::run_write;
use helpdesk_core::{
    Actor, AuditContext, AuditEntry, AuditFilter, AuditService, AuditServiceError, BoardService,
    Lane, NewTask, PageRequest, RequestOrigin, RetryPolicy, Role, StoreError,
};
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;

fn viewer() -> Actor {
    Actor::new(1, Role::User)
}

fn ctx_for(id: i64, email: &str, name: &str) -> AuditContext {
    AuditContext::for_actor(
        Actor::new(id, Role::Agent)
            .with_email(email)
            .with_name(name),
    )
}

fn seed(service: &AuditService<'_>, count: usize) {
    for index in 0..count {
        service
            .record(
                &AuditContext::system(),
                AuditEntry::new("Ticket", "update", format!("ticket note {index}")).entity(index),
            )
            .unwrap();
    }
}

#[test]
fn ticket_delete_is_queryable_with_before_snapshot_only() {
    let conn = open_db_in_memory().unwrap();
    let service = AuditService::try_new(&conn).unwrap();
    let ctx = ctx_for(3, "maria@example.com", "Maria").with_origin(RequestOrigin::from_headers(
        Some("203.0.113.9, 10.0.0.1"),
        Some("127.0.0.1"),
        Some("curl/8.0"),
    ));

    service
        .record(
            &ctx,
            AuditEntry::new("Ticket", "delete", "Ticket removed")
                .entity(7)
                .before(&json!({"status": "open"})),
        )
        .unwrap();

    let page = service
        .query(
            Some(&viewer()),
            &AuditFilter::default().entity_type("Ticket"),
            PageRequest::default(),
        )
        .unwrap();
    assert_eq!(page.total, 1);
    let record = &page.items[0];
    assert_eq!(record.entity_id.as_deref(), Some("7"));
    assert_eq!(record.action, "delete");
    assert!(record.after.is_none());
    assert_eq!(
        record.before.as_ref().unwrap().to_value().unwrap()["status"],
        "open"
    );
    assert_eq!(record.actor_id, Some(3));
    assert_eq!(record.actor_email.as_deref(), Some("maria@example.com"));
    assert_eq!(record.ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(record.user_agent.as_deref(), Some("curl/8.0"));
    assert!(record.created_at > 0);
}

#[test]
fn unserializable_snapshot_is_stored_degraded() {
    let conn = open_db_in_memory().unwrap();
    let service = AuditService::try_new(&conn).unwrap();
    let mut grid = BTreeMap::new();
    grid.insert((2, 3), "upload");

    let entry = AuditEntry::new("Attachment", "upload", "grid attached").after(&grid);
    assert!(entry.is_degraded());
    let record = service.record(&AuditContext::system(), entry).unwrap();

    let stored = record.after.unwrap().to_value().unwrap();
    assert!(stored.as_str().unwrap().contains("upload"));
    assert_eq!(record.actor_id, None);
}

#[test]
fn filters_match_action_actor_and_message() {
    let conn = open_db_in_memory().unwrap();
    let service = AuditService::try_new(&conn).unwrap();
    let ana = ctx_for(21, "ana@example.com", "Ana Lima");
    let bruno = ctx_for(22, "bruno@example.com", "Bruno");

    service
        .record(&ana, AuditEntry::new("Ticket", "create", "Ticket opened"))
        .unwrap();
    service
        .record(&ana, AuditEntry::new("Ticket", "update", "Status: 100% done"))
        .unwrap();
    service
        .record(&bruno, AuditEntry::new("User", "update", "Role changed"))
        .unwrap();

    let query = |filter: AuditFilter| {
        service
            .query(Some(&viewer()), &filter, PageRequest::default())
            .unwrap()
            .total
    };
    assert_eq!(query(AuditFilter::default()), 3);
    assert_eq!(query(AuditFilter::default().action("update")), 2);
    assert_eq!(query(AuditFilter::default().actor("ANA@")), 2);
    assert_eq!(query(AuditFilter::default().actor("lima")), 2);
    assert_eq!(query(AuditFilter::default().actor("22")), 1);
    assert_eq!(query(AuditFilter::default().text("100%")), 1);
    assert_eq!(query(AuditFilter::default().text("0%_")), 0);
    assert_eq!(
        query(AuditFilter::from_params(Some("Ticket"), Some("update"), Some(" "), None)),
        1
    );
}

#[test]
fn pages_are_newest_first_and_clamped() {
    let conn = open_db_in_memory().unwrap();
    let service = AuditService::try_new(&conn).unwrap();
    seed(&service, 30);

    let first = service
        .query(Some(&viewer()), &AuditFilter::default(), PageRequest::default())
        .unwrap();
    assert_eq!(first.items.len(), 25);
    assert_eq!((first.total, first.pages), (30, 2));
    assert!(!first.has_prev);
    assert!(first.has_next);
    assert_eq!(first.items[0].message, "ticket note 29");
    assert!(first
        .items
        .windows(2)
        .all(|pair| pair[0].id > pair[1].id));

    let second = service
        .query(
            Some(&viewer()),
            &AuditFilter::default(),
            PageRequest::from_params(Some("2"), Some("nope")),
        )
        .unwrap();
    assert_eq!(second.items.len(), 5);
    assert!(second.has_prev);
    assert!(!second.has_next);
    assert_eq!(second.items[4].message, "ticket note 0");

    let wide = service
        .query(Some(&viewer()), &AuditFilter::default(), PageRequest::new(1, 500))
        .unwrap();
    assert_eq!(wide.per_page, 100);
    assert_eq!(wide.items.len(), 30);

    let past_end = service
        .query(Some(&viewer()), &AuditFilter::default(), PageRequest::new(9, 25))
        .unwrap();
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total, 30);
}

#[test]
fn hand_built_page_requests_are_clamped() {
    let conn = open_db_in_memory().unwrap();
    let service = AuditService::try_new(&conn).unwrap();
    seed(&service, 130);

    let oversized = service
        .query(
            Some(&viewer()),
            &AuditFilter::default(),
            PageRequest {
                page: 1,
                per_page: 500,
            },
        )
        .unwrap();
    assert_eq!(oversized.per_page, 100);
    assert_eq!(oversized.items.len(), 100);
    assert_eq!((oversized.total, oversized.pages), (130, 2));

    let empty = service
        .query(
            Some(&viewer()),
            &AuditFilter::default(),
            PageRequest {
                page: 0,
                per_page: 0,
            },
        )
        .unwrap();
    assert_eq!((empty.page, empty.per_page), (1, 25));
    assert_eq!(empty.items.len(), 25);
    assert_eq!(empty.pages, 6);
    assert!(!empty.has_prev);
}

#[test]
fn bulk_read_applies_default_and_cap() {
    let conn = open_db_in_memory().unwrap();
    let service = AuditService::try_new(&conn).unwrap();
    seed(&service, 60);

    let recent = |limit: Option<i64>| {
        service
            .list_recent(Some(&viewer()), &AuditFilter::default(), limit)
            .unwrap()
            .len()
    };
    assert_eq!(recent(None), 50);
    assert_eq!(recent(Some(0)), 1);
    assert_eq!(recent(Some(10_000)), 60);
    assert_eq!(recent(Some(7)), 7);
}

#[test]
fn anonymous_viewer_cannot_read_ledger() {
    let conn = open_db_in_memory().unwrap();
    let service = AuditService::try_new(&conn).unwrap();

    let err = service
        .query(None, &AuditFilter::default(), PageRequest::default())
        .unwrap_err();
    assert!(matches!(err, AuditServiceError::Forbidden));
    assert!(matches!(
        service.list_recent(None, &AuditFilter::default(), None),
        Err(AuditServiceError::Forbidden)
    ));
}

#[test]
fn ledger_rows_cannot_be_updated_or_deleted() {
    let conn = open_db_in_memory().unwrap();
    let service = AuditService::try_new(&conn).unwrap();
    seed(&service, 1);

    assert!(conn
        .execute("UPDATE audit_logs SET message = 'tampered';", [])
        .is_err());
    assert!(conn.execute("DELETE FROM audit_logs;", []).is_err());
    let message: String = conn
        .query_row("SELECT message FROM audit_logs;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(message, "ticket note 0");
}

#[test]
fn failed_transaction_discards_move_and_audit_entry() {
    let conn = open_db_in_memory().unwrap();
    let agent = AuditContext::for_actor(Actor::new(2, Role::Agent));
    let board = BoardService::try_new(&conn).unwrap();
    let first = board.create_task(&agent, &NewTask::new("first")).unwrap();
    board.create_task(&agent, &NewTask::new("second")).unwrap();
    let audits_before = audit_count(&conn);

    let result: Result<(), StoreError> =
        run_write(&conn, RetryPolicy::default(), "aborted_move", |tx| {
            SqliteTaskRepository::try_new(tx)?.move_task(first.id, Lane::Done, 1)?;
            SqliteAuditRepository::try_new(tx)?
                .record(&agent, AuditEntry::new("Task", "move", "todo#1 -> done#1"))?;
            Err(StoreError::InvalidArgument("abort after writes".to_string()))
        });
    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));

    assert_eq!(positions(&conn, TASKS, "todo").unwrap(), vec![1, 2]);
    assert!(positions(&conn, TASKS, "done").unwrap().is_empty());
    assert_eq!(audit_count(&conn), audits_before);
    assert!(conn.is_autocommit());
}

#[test]
fn repository_record_requires_no_commit_of_its_own() {
    let mut conn = open_db_in_memory().unwrap();
    let tx = conn.transaction().unwrap();
    SqliteAuditRepository::try_new(&tx)
        .unwrap()
        .record(&AuditContext::system(), AuditEntry::new("User", "create", "seeded"))
        .unwrap();
    drop(tx);

    assert_eq!(audit_count(&conn), 0);
}

#[test]
fn repository_record_rejects_autocommit_connection() {
    let conn = open_db_in_memory().unwrap();
    let err = SqliteAuditRepository::try_new(&conn)
        .unwrap()
        .record(&AuditContext::system(), AuditEntry::new("User", "create", "loose"))
        .unwrap_err();

    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert_eq!(audit_count(&conn), 0);
}

fn audit_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM audit_logs;", [], |row| row.get(0))
        .unwrap()
}
