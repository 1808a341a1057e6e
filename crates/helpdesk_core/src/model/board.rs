//! Kanban board records: tasks, subtasks and the task activity log.
//!
//! # Invariants
//! - `Task.position` is dense within `Task.lane`.
//! - `Subtask.position` is dense within `Subtask.task_id`.
//! - Patches report which fields actually changed; a patch that changes
//!   nothing produces no write and no audit entry.

use crate::model::fields::{
    normalize_optional_date, normalize_optional_text, normalize_title, FieldError,
};
use crate::model::lane::Lane;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable task identifier.
pub type TaskId = Uuid;
/// Stable subtask identifier.
pub type SubtaskId = Uuid;
/// External user identifier (owned by the account system).
pub type UserId = i64;

/// Kanban task read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    /// Partition key.
    pub lane: Lane,
    /// 1-based position within `lane`.
    pub position: i64,
    /// `YYYY-MM-DD`.
    pub due_date: Option<String>,
    pub assignee_id: Option<UserId>,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}

/// Input for creating a task at the end of a lane.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub lane: Option<Lane>,
    pub due_date: Option<String>,
    pub assignee_id: Option<UserId>,
}

impl NewTask {
    /// Creates a task input with only a title; lands in `todo`.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the target lane.
    pub fn in_lane(mut self, lane: Lane) -> Self {
        self.lane = Some(lane);
        self
    }

    /// Returns a trimmed, validated copy.
    pub fn normalized(&self) -> Result<Self, FieldError> {
        Ok(Self {
            title: normalize_title(&self.title)?,
            description: normalize_optional_text(self.description.as_deref()),
            lane: Some(self.lane.unwrap_or(Lane::Todo)),
            due_date: normalize_optional_date(self.due_date.as_deref())?,
            assignee_id: self.assignee_id,
        })
    }
}

/// Partial task update. `None` leaves a field untouched; for clearable
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<String>>,
    pub assignee_id: Option<Option<UserId>>,
}

impl TaskPatch {
    /// Applies the patch to `task` and returns the names of changed fields.
    ///
    /// Validation runs before any field is touched, so an error leaves
    /// `task` unchanged.
    pub fn apply(&self, task: &mut Task) -> Result<Vec<&'static str>, FieldError> {
        let title = self.title.as_deref().map(normalize_title).transpose()?;
        let description = self
            .description
            .as_ref()
            .map(|value| normalize_optional_text(value.as_deref()));
        let due_date = self
            .due_date
            .as_ref()
            .map(|value| normalize_optional_date(value.as_deref()))
            .transpose()?;

        let mut changed = Vec::new();
        if let Some(title) = title {
            if title != task.title {
                task.title = title;
                changed.push("title");
            }
        }
        if let Some(description) = description {
            if description != task.description {
                task.description = description;
                changed.push("description");
            }
        }
        if let Some(due_date) = due_date {
            if due_date != task.due_date {
                task.due_date = due_date;
                changed.push("due_date");
            }
        }
        if let Some(assignee_id) = self.assignee_id {
            if assignee_id != task.assignee_id {
                task.assignee_id = assignee_id;
                changed.push("assignee");
            }
        }
        Ok(changed)
    }
}

/// Subtask completion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Open,
    Done,
}

impl SubtaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Subtask read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: SubtaskId,
    /// Partition key.
    pub task_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    /// `YYYY-MM-DD`.
    pub work_date: Option<String>,
    pub status: SubtaskStatus,
    /// 1-based position within `task_id`.
    pub position: i64,
    pub assignee_id: Option<UserId>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating a subtask at the end of its parent task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubtask {
    pub title: String,
    pub description: Option<String>,
    pub work_date: Option<String>,
    pub status: SubtaskStatus,
    pub assignee_id: Option<UserId>,
}

impl NewSubtask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            work_date: None,
            status: SubtaskStatus::Open,
            assignee_id: None,
        }
    }

    /// Returns a trimmed, validated copy.
    pub fn normalized(&self) -> Result<Self, FieldError> {
        Ok(Self {
            title: normalize_title(&self.title)?,
            description: normalize_optional_text(self.description.as_deref()),
            work_date: normalize_optional_date(self.work_date.as_deref())?,
            status: self.status,
            assignee_id: self.assignee_id,
        })
    }
}

/// Partial subtask update; same conventions as [`TaskPatch`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubtaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<SubtaskStatus>,
    pub work_date: Option<Option<String>>,
    pub assignee_id: Option<Option<UserId>>,
}

impl SubtaskPatch {
    /// Applies the patch and returns the names of changed fields.
    pub fn apply(&self, subtask: &mut Subtask) -> Result<Vec<&'static str>, FieldError> {
        let title = self.title.as_deref().map(normalize_title).transpose()?;
        let description = self
            .description
            .as_ref()
            .map(|value| normalize_optional_text(value.as_deref()));
        let work_date = self
            .work_date
            .as_ref()
            .map(|value| normalize_optional_date(value.as_deref()))
            .transpose()?;

        let mut changed = Vec::new();
        if let Some(title) = title {
            if title != subtask.title {
                subtask.title = title;
                changed.push("title");
            }
        }
        if let Some(description) = description {
            if description != subtask.description {
                subtask.description = description;
                changed.push("description");
            }
        }
        if let Some(status) = self.status {
            if status != subtask.status {
                subtask.status = status;
                changed.push("status");
            }
        }
        if let Some(work_date) = work_date {
            if work_date != subtask.work_date {
                subtask.work_date = work_date;
                changed.push("work_date");
            }
        }
        if let Some(assignee_id) = self.assignee_id {
            if assignee_id != subtask.assignee_id {
                subtask.assignee_id = assignee_id;
                changed.push("assignee");
            }
        }
        Ok(changed)
    }
}

/// One entry of a task's activity journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: i64,
    pub task_id: TaskId,
    pub author_id: Option<UserId>,
    pub note: String,
    /// `YYYY-MM-DD` (UTC).
    pub log_date: String,
    pub created_at: i64,
}
