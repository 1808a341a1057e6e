//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist Kanban tasks and their activity journal.
//! - Delegate all position changes to [`crate::repo::ordering`].
//!
//! # Invariants
//! - Lane listing is deterministic: `position ASC, uuid ASC`.
//! - Deleting a task cascades to its subtasks, flow diagram and journal.

use crate::model::board::{NewTask, Task, TaskId, TaskLog, UserId};
use crate::model::lane::Lane;
use crate::model::EntityKind;
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::ordering::{self, MoveOutcome, NOW_MS_SQL, TASKS};
use crate::repo::{ensure_schema_current, parse_uuid};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    description,
    lane,
    position,
    due_date,
    assignee_id,
    created_at,
    updated_at
FROM tasks";

/// All three lanes of the board, each in position order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoardView {
    pub todo: Vec<Task>,
    pub doing: Vec<Task>,
    pub done: Vec<Task>,
}

impl BoardView {
    pub fn lane(&self, lane: Lane) -> &[Task] {
        match lane {
            Lane::Todo => &self.todo,
            Lane::Doing => &self.doing,
            Lane::Done => &self.done,
        }
    }

    fn lane_mut(&mut self, lane: Lane) -> &mut Vec<Task> {
        match lane {
            Lane::Todo => &mut self.todo,
            Lane::Doing => &mut self.doing,
            Lane::Done => &mut self.done,
        }
    }
}

/// Repository interface for task operations.
///
/// Mutating methods must run inside a write transaction owned by the caller.
pub trait TaskRepository {
    /// Inserts a task at the end of its lane.
    fn create_task(&self, input: &NewTask) -> StoreResult<Task>;
    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>>;
    fn list_lane(&self, lane: Lane) -> StoreResult<Vec<Task>>;
    fn list_board(&self) -> StoreResult<BoardView>;
    /// Writes payload fields; lane and position are left untouched.
    fn update_task(&self, task: &Task) -> StoreResult<()>;
    /// Reorders within a lane or transfers to another lane.
    fn move_task(&self, id: TaskId, lane: Lane, position: i64)
        -> StoreResult<(Task, MoveOutcome)>;
    /// Deletes a task and returns its last state.
    fn delete_task(&self, id: TaskId) -> StoreResult<Task>;
    fn append_log(
        &self,
        task_id: TaskId,
        author_id: Option<UserId>,
        note: &str,
    ) -> StoreResult<TaskLog>;
    fn list_logs(&self, task_id: TaskId) -> StoreResult<Vec<TaskLog>>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Creates repository from a migrated connection or transaction.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_current(conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn new_unchecked(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn load_required(&self, id: TaskId) -> StoreResult<Task> {
        self.get_task(id)?
            .ok_or_else(|| StoreError::not_found(EntityKind::Task, id))
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, input: &NewTask) -> StoreResult<Task> {
        let input = input.normalized()?;
        let lane = input.lane.unwrap_or(Lane::Todo);
        let id = Uuid::new_v4();
        let position = ordering::append_position(self.conn, TASKS, lane.as_str())?;

        self.conn.execute(
            "INSERT INTO tasks (
                uuid,
                title,
                description,
                lane,
                position,
                due_date,
                assignee_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                id.to_string(),
                input.title,
                input.description,
                lane.as_str(),
                position,
                input.due_date,
                input.assignee_id,
            ],
        )?;
        self.load_required(id)
    }

    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn list_lane(&self, lane: Lane) -> StoreResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL} WHERE lane = ?1 ORDER BY position ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([lane.as_str()])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn list_board(&self) -> StoreResult<BoardView> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL} ORDER BY lane ASC, position ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut board = BoardView::default();
        while let Some(row) = rows.next()? {
            let task = parse_task_row(row)?;
            board.lane_mut(task.lane).push(task);
        }
        Ok(board)
    }

    fn update_task(&self, task: &Task) -> StoreResult<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE tasks
                 SET title = ?2,
                     description = ?3,
                     due_date = ?4,
                     assignee_id = ?5,
                     updated_at = {NOW_MS_SQL}
                 WHERE uuid = ?1;"
            ),
            params![
                task.id.to_string(),
                task.title,
                task.description,
                task.due_date,
                task.assignee_id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(EntityKind::Task, task.id));
        }
        Ok(())
    }

    fn move_task(
        &self,
        id: TaskId,
        lane: Lane,
        position: i64,
    ) -> StoreResult<(Task, MoveOutcome)> {
        let outcome = ordering::move_item(self.conn, TASKS, id, lane.as_str(), position)?;
        Ok((self.load_required(id)?, outcome))
    }

    fn delete_task(&self, id: TaskId) -> StoreResult<Task> {
        let task = self.load_required(id)?;
        ordering::remove_item(self.conn, TASKS, id)?;
        Ok(task)
    }

    fn append_log(
        &self,
        task_id: TaskId,
        author_id: Option<UserId>,
        note: &str,
    ) -> StoreResult<TaskLog> {
        self.conn.execute(
            "INSERT INTO task_logs (task_uuid, author_id, note) VALUES (?1, ?2, ?3);",
            params![task_id.to_string(), author_id, note],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, task_uuid, author_id, note, log_date, created_at
                 FROM task_logs
                 WHERE id = ?1;",
                [id],
                |row| Ok(parse_log_row(row)),
            )
            .optional()?
            .transpose()?
            .ok_or_else(|| StoreError::InvalidData(format!("task log {id} vanished after insert")))
    }

    fn list_logs(&self, task_id: TaskId) -> StoreResult<Vec<TaskLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_uuid, author_id, note, log_date, created_at
             FROM task_logs
             WHERE task_uuid = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([task_id.to_string()])?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next()? {
            logs.push(parse_log_row(row)?);
        }
        Ok(logs)
    }
}

fn parse_task_row(row: &Row<'_>) -> StoreResult<Task> {
    let id_text: String = row.get("uuid")?;
    let lane_text: String = row.get("lane")?;
    let lane = Lane::parse(&lane_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid lane `{lane_text}` in tasks.lane"))
    })?;

    Ok(Task {
        id: parse_uuid(&id_text, "tasks.uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        lane,
        position: row.get("position")?,
        due_date: row.get("due_date")?,
        assignee_id: row.get("assignee_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_log_row(row: &Row<'_>) -> StoreResult<TaskLog> {
    let task_text: String = row.get("task_uuid")?;
    Ok(TaskLog {
        id: row.get("id")?,
        task_id: parse_uuid(&task_text, "task_logs.task_uuid")?,
        author_id: row.get("author_id")?,
        note: row.get("note")?,
        log_date: row.get("log_date")?,
        created_at: row.get("created_at")?,
    })
}
