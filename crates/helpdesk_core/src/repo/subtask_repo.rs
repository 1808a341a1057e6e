//! Subtask persistence, ordered within the parent task.

use crate::model::board::{NewSubtask, Subtask, SubtaskId, SubtaskStatus, TaskId};
use crate::model::EntityKind;
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::ordering::{self, MoveOutcome, NOW_MS_SQL, SUBTASKS};
use crate::repo::{ensure_schema_current, parse_uuid};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const SUBTASK_SELECT_SQL: &str = "SELECT
    uuid,
    task_uuid,
    title,
    description,
    work_date,
    status,
    position,
    assignee_id,
    created_at,
    updated_at
FROM subtasks";

/// Repository interface for subtask operations.
pub trait SubtaskRepository {
    /// Inserts a subtask at the end of `task_id`.
    fn create_subtask(&self, task_id: TaskId, input: &NewSubtask) -> StoreResult<Subtask>;
    fn get_subtask(&self, id: SubtaskId) -> StoreResult<Option<Subtask>>;
    fn list_subtasks(&self, task_id: TaskId) -> StoreResult<Vec<Subtask>>;
    fn update_subtask(&self, subtask: &Subtask) -> StoreResult<()>;
    /// Reorders within the parent or transfers to another task.
    fn move_subtask(
        &self,
        id: SubtaskId,
        task_id: TaskId,
        position: i64,
    ) -> StoreResult<(Subtask, MoveOutcome)>;
    fn delete_subtask(&self, id: SubtaskId) -> StoreResult<Subtask>;
}

/// SQLite-backed subtask repository.
pub struct SqliteSubtaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSubtaskRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_current(conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn new_unchecked(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn load_required(&self, id: SubtaskId) -> StoreResult<Subtask> {
        self.get_subtask(id)?
            .ok_or_else(|| StoreError::not_found(EntityKind::Subtask, id))
    }

    fn ensure_task_exists(&self, task_id: TaskId) -> StoreResult<()> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM tasks WHERE uuid = ?1;",
                [task_id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        found.ok_or_else(|| StoreError::not_found(EntityKind::Task, task_id))
    }
}

impl SubtaskRepository for SqliteSubtaskRepository<'_> {
    fn create_subtask(&self, task_id: TaskId, input: &NewSubtask) -> StoreResult<Subtask> {
        let input = input.normalized()?;
        self.ensure_task_exists(task_id)?;
        let id = Uuid::new_v4();
        let partition = task_id.to_string();
        let position = ordering::append_position(self.conn, SUBTASKS, &partition)?;

        self.conn.execute(
            "INSERT INTO subtasks (
                uuid,
                task_uuid,
                title,
                description,
                work_date,
                status,
                position,
                assignee_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                id.to_string(),
                partition,
                input.title,
                input.description,
                input.work_date,
                input.status.as_str(),
                position,
                input.assignee_id,
            ],
        )?;
        self.load_required(id)
    }

    fn get_subtask(&self, id: SubtaskId) -> StoreResult<Option<Subtask>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SUBTASK_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_subtask_row(row)?));
        }
        Ok(None)
    }

    fn list_subtasks(&self, task_id: TaskId) -> StoreResult<Vec<Subtask>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SUBTASK_SELECT_SQL} WHERE task_uuid = ?1 ORDER BY position ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([task_id.to_string()])?;
        let mut subtasks = Vec::new();
        while let Some(row) = rows.next()? {
            subtasks.push(parse_subtask_row(row)?);
        }
        Ok(subtasks)
    }

    fn update_subtask(&self, subtask: &Subtask) -> StoreResult<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE subtasks
                 SET title = ?2,
                     description = ?3,
                     work_date = ?4,
                     status = ?5,
                     assignee_id = ?6,
                     updated_at = {NOW_MS_SQL}
                 WHERE uuid = ?1;"
            ),
            params![
                subtask.id.to_string(),
                subtask.title,
                subtask.description,
                subtask.work_date,
                subtask.status.as_str(),
                subtask.assignee_id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(EntityKind::Subtask, subtask.id));
        }
        Ok(())
    }

    fn move_subtask(
        &self,
        id: SubtaskId,
        task_id: TaskId,
        position: i64,
    ) -> StoreResult<(Subtask, MoveOutcome)> {
        if position >= 1 {
            self.ensure_task_exists(task_id)?;
        }
        let outcome =
            ordering::move_item(self.conn, SUBTASKS, id, &task_id.to_string(), position)?;
        Ok((self.load_required(id)?, outcome))
    }

    fn delete_subtask(&self, id: SubtaskId) -> StoreResult<Subtask> {
        let subtask = self.load_required(id)?;
        ordering::remove_item(self.conn, SUBTASKS, id)?;
        Ok(subtask)
    }
}

fn parse_subtask_row(row: &Row<'_>) -> StoreResult<Subtask> {
    let id_text: String = row.get("uuid")?;
    let task_text: String = row.get("task_uuid")?;
    let status_text: String = row.get("status")?;
    let status = SubtaskStatus::parse(&status_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid status `{status_text}` in subtasks.status"))
    })?;

    Ok(Subtask {
        id: parse_uuid(&id_text, "subtasks.uuid")?,
        task_id: parse_uuid(&task_text, "subtasks.task_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        work_date: row.get("work_date")?,
        status,
        position: row.get("position")?,
        assignee_id: row.get("assignee_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
