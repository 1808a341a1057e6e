use helpdesk_core::db::open_db_in_memory;
use helpdesk_core::repo::ordering::{check_all_dense, check_dense, positions, MoveOutcome, TASKS};
use helpdesk_core::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use helpdesk_core::repo::write_tx::run_write;
use helpdesk_core::{Lane, NewTask, RetryPolicy, StoreError, StoreResult};
use rusqlite::{Connection, Transaction};

fn write<T>(
    conn: &Connection,
    body: impl FnMut(&Transaction<'_>) -> StoreResult<T>,
) -> StoreResult<T> {
    run_write(conn, RetryPolicy::default(), "test_write", body)
}

/// Small deterministic LCG so the sequence is reproducible without extra crates.
struct Sequence(u64);

impl Sequence {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) as usize) % bound
    }
}

#[test]
fn mixed_operations_keep_partitions_dense() {
    let conn = open_db_in_memory().unwrap();
    let mut sequence = Sequence(7);
    let mut ids = Vec::new();

    for step in 0..200 {
        let choice = sequence.next(10);
        let lane = Lane::ALL[sequence.next(3)];
        let position = sequence.next(8) as i64 + 1;
        match choice {
            0..=2 => {
                let task = write(&conn, |tx| {
                    SqliteTaskRepository::try_new(tx)?
                        .create_task(&NewTask::new(format!("task {step}")).in_lane(lane))
                })
                .unwrap();
                ids.push(task.id);
            }
            3 if !ids.is_empty() => {
                let id = ids.swap_remove(sequence.next(ids.len()));
                write(&conn, |tx| SqliteTaskRepository::try_new(tx)?.delete_task(id)).unwrap();
            }
            _ if !ids.is_empty() => {
                let id = ids[sequence.next(ids.len())];
                write(&conn, |tx| {
                    SqliteTaskRepository::try_new(tx)?.move_task(id, lane, position)
                })
                .unwrap();
            }
            _ => {}
        }
        check_all_dense(&conn, TASKS).unwrap();
    }

    let total: usize = Lane::ALL
        .iter()
        .map(|lane| positions(&conn, TASKS, lane.as_str()).unwrap().len())
        .sum();
    assert_eq!(total, ids.len());
}

#[test]
fn transfer_into_empty_lane_clamps_to_first_slot() {
    let conn = open_db_in_memory().unwrap();
    let ids: Vec<_> = (0..3)
        .map(|index| {
            write(&conn, |tx| {
                SqliteTaskRepository::try_new(tx)?.create_task(&NewTask::new(format!("t{index}")))
            })
            .unwrap()
            .id
        })
        .collect();

    let (task, outcome) = write(&conn, |tx| {
        SqliteTaskRepository::try_new(tx)?.move_task(ids[2], Lane::Doing, 5)
    })
    .unwrap();
    assert!(outcome.is_cross_partition());
    assert_eq!((task.lane, task.position), (Lane::Doing, 1));
    match outcome {
        MoveOutcome::Moved { from, to } => {
            assert_eq!((from.partition.as_str(), from.position), ("todo", 3));
            assert_eq!((to.partition.as_str(), to.position), ("doing", 1));
        }
        MoveOutcome::Unchanged(_) => panic!("transfer must move"),
    }
    assert_eq!(positions(&conn, TASKS, "todo").unwrap(), vec![1, 2]);
}

#[test]
fn transfer_into_middle_shifts_later_items() {
    let conn = open_db_in_memory().unwrap();
    let create = |lane: Lane| {
        write(&conn, |tx| {
            SqliteTaskRepository::try_new(tx)?.create_task(&NewTask::new("card").in_lane(lane))
        })
        .unwrap()
    };
    let done: Vec<_> = (0..3).map(|_| create(Lane::Done)).collect();
    let incoming = create(Lane::Todo);

    write(&conn, |tx| {
        SqliteTaskRepository::try_new(tx)?.move_task(incoming.id, Lane::Done, 2)
    })
    .unwrap();

    let lane = write(&conn, |tx| SqliteTaskRepository::try_new(tx)?.list_lane(Lane::Done)).unwrap();
    let order: Vec<_> = lane.iter().map(|task| task.id).collect();
    assert_eq!(order, vec![done[0].id, incoming.id, done[1].id, done[2].id]);
    check_dense(&conn, TASKS, "done").unwrap();
    assert!(positions(&conn, TASKS, "todo").unwrap().is_empty());
}

#[test]
fn check_dense_reports_gaps() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO tasks (uuid, title, lane, position) VALUES
            ('00000000-0000-4000-8000-000000000001', 'a', 'todo', 1),
            ('00000000-0000-4000-8000-000000000002', 'b', 'todo', 3);",
    )
    .unwrap();

    let err = check_dense(&conn, TASKS, "todo").unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
    check_dense(&conn, TASKS, "doing").unwrap();
}

#[test]
fn repository_mutations_require_a_transaction() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let err = repo.create_task(&NewTask::new("loose")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert!(repo.list_lane(Lane::Todo).unwrap().is_empty());
}
