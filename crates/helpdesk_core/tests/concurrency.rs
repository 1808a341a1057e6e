use helpdesk_core::db::{open_db, open_db_with_config};
use helpdesk_core::repo::ordering::{check_all_dense, positions, TASKS};
use helpdesk_core::{
    Actor, AuditContext, BoardService, CoreConfig, Lane, NewTask, RetryPolicy, Role, StoreError,
};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

const MOVES_PER_WORKER: usize = 25;

fn agent_ctx(id: i64) -> AuditContext {
    AuditContext::for_actor(Actor::new(id, Role::Agent))
}

fn seed_board(path: &Path, per_lane: usize) -> Vec<Uuid> {
    let conn = open_db(path).unwrap();
    let service = BoardService::try_new(&conn).unwrap();
    let mut ids = Vec::new();
    for lane in Lane::ALL {
        for index in 0..per_lane {
            let task = service
                .create_task(&agent_ctx(1), &NewTask::new(format!("{lane} {index}")).in_lane(lane))
                .unwrap();
            ids.push(task.id);
        }
    }
    ids
}

fn lane_for(step: usize) -> Lane {
    Lane::ALL[step % Lane::ALL.len()]
}

#[test]
fn concurrent_moves_keep_every_lane_dense() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.db");
    let ids = Arc::new(seed_board(&path, 4));
    let barrier = Arc::new(Barrier::new(2));

    let workers: Vec<_> = (0..2)
        .map(|worker| {
            let path = path.clone();
            let ids = Arc::clone(&ids);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = BoardService::try_new(&conn).unwrap();
                let ctx = agent_ctx(10 + worker as i64);
                barrier.wait();
                for step in 0..MOVES_PER_WORKER {
                    let id = ids[(step * 5 + worker * 3) % ids.len()];
                    let target = lane_for(step + worker);
                    let position = ((step * 7 + worker) % 6) as i64 + 1;
                    service.move_task(&ctx, id, target, position).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let conn = open_db(&path).unwrap();
    check_all_dense(&conn, TASKS).unwrap();
    let total: usize = Lane::ALL
        .iter()
        .map(|lane| positions(&conn, TASKS, lane.as_str()).unwrap().len())
        .sum();
    assert_eq!(total, ids.len());
}

#[test]
fn concurrent_moves_of_same_task_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("same.db");
    let ids = seed_board(&path, 3);
    let contested = ids[0];
    let barrier = Arc::new(Barrier::new(2));

    let workers: Vec<_> = [(Lane::Doing, 1_i64), (Lane::Done, 2_i64)]
        .into_iter()
        .map(|(lane, position)| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = BoardService::try_new(&conn).unwrap();
                barrier.wait();
                service
                    .move_task(&agent_ctx(2), contested, lane, position)
                    .unwrap()
            })
        })
        .collect();
    let results: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();

    let conn = open_db(&path).unwrap();
    check_all_dense(&conn, TASKS).unwrap();
    let service = BoardService::try_new(&conn).unwrap();
    let final_task = service.get_task(contested).unwrap();
    assert!(results
        .iter()
        .any(|task| (task.lane, task.position) == (final_task.lane, final_task.position)));

    let moves: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM audit_logs WHERE action = 'move' AND entity_id = ?1;",
            [contested.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(moves, 2);
}

#[test]
fn held_write_lock_surfaces_conflict_after_one_retry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.db");
    let ids = seed_board(&path, 2);

    let config = CoreConfig {
        lock_timeout_ms: 20,
        retry_backoff_ms: 5,
        ..CoreConfig::default()
    };
    let contender = open_db_with_config(&path, &config).unwrap();
    let holder = open_db(&path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let service = BoardService::with_policy(&contender, config.retry_policy()).unwrap();
    let err = service
        .move_task(&agent_ctx(3), ids[0], Lane::Done, 1)
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(
        err.store_error(),
        Some(StoreError::Conflict {
            operation: "move_task"
        })
    ));
    assert!(contender.is_autocommit());

    holder.execute_batch("ROLLBACK;").unwrap();
    let moved = service
        .move_task(&agent_ctx(3), ids[0], Lane::Done, 1)
        .unwrap();
    assert_eq!((moved.lane, moved.position), (Lane::Done, 1));
}

#[test]
fn lock_released_during_backoff_lets_retry_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retry.db");
    let ids = seed_board(&path, 2);

    let contender = open_db_with_config(
        &path,
        &CoreConfig {
            lock_timeout_ms: 30,
            ..CoreConfig::default()
        },
    )
    .unwrap();
    let holder_path = path.clone();
    let locked = Arc::new(Barrier::new(2));
    let holder_locked = Arc::clone(&locked);
    let holder = thread::spawn(move || {
        let conn = open_db(&holder_path).unwrap();
        conn.execute_batch("BEGIN IMMEDIATE;").unwrap();
        holder_locked.wait();
        thread::sleep(Duration::from_millis(60));
        conn.execute_batch("ROLLBACK;").unwrap();
    });

    locked.wait();
    let service = BoardService::with_policy(
        &contender,
        RetryPolicy {
            backoff: Duration::from_millis(250),
        },
    )
    .unwrap();
    let moved = service
        .move_task(&agent_ctx(4), ids[1], Lane::Doing, 1)
        .unwrap();
    holder.join().unwrap();

    assert_eq!((moved.lane, moved.position), (Lane::Doing, 1));
    check_all_dense(&contender, TASKS).unwrap();
}
