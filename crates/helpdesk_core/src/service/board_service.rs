//! Kanban board use-case service.
//!
//! # Responsibility
//! - Run every board mutation in one retried write transaction together with
//!   its task-journal line and its audit record.
//! - Gate all board work on the caller's role.
//!
//! # Invariants
//! - A mutation and its audit record commit together or not at all.
//! - Requests that change nothing (same-place move, empty patch, identical
//!   edge label) write nothing and record nothing.

use crate::access::{can_act_on, Resource};
use crate::model::actor::AuditContext;
use crate::model::audit::AuditEntry;
use crate::model::board::{
    NewSubtask, NewTask, Subtask, SubtaskId, SubtaskPatch, Task, TaskId, TaskLog, TaskPatch,
};
use crate::model::flow::{FlowEdge, FlowEdgeId, FlowNode, FlowNodeId, FlowNodePatch, NewFlowNode};
use crate::model::lane::Lane;
use crate::model::EntityKind;
use crate::repo::audit_repo::{AuditRepository, SqliteAuditRepository};
use crate::repo::ensure_schema_current;
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::flow_repo::{FlowRepository, LinkOutcome, SqliteFlowRepository};
use crate::repo::ordering::{MoveOutcome, Placement};
use crate::repo::subtask_repo::{SqliteSubtaskRepository, SubtaskRepository};
use crate::repo::task_repo::{BoardView, SqliteTaskRepository, TaskRepository};
use crate::repo::write_tx::{run_write, RetryPolicy};
use log::{info, warn};
use rusqlite::{Connection, Transaction};
use serde_json::json;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Service error for board use-cases.
#[derive(Debug)]
pub enum BoardServiceError {
    /// Caller's role does not allow board work.
    Forbidden { operation: &'static str },
    /// Store or ledger failure, including `NotFound`, `InvalidArgument`
    /// and `Conflict`.
    Store(StoreError),
}

impl BoardServiceError {
    /// Underlying store error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(err) => Some(err),
            Self::Forbidden { .. } => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}

impl Display for BoardServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forbidden { operation } => {
                write!(f, "{operation} requires an agent, gestor or admin role")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BoardServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Forbidden { .. } => None,
        }
    }
}

impl From<StoreError> for BoardServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type BoardServiceResult<T> = Result<T, BoardServiceError>;

/// Board service over one connection.
///
/// Each call opens its own `BEGIN IMMEDIATE` transaction; the connection
/// must not have a transaction open.
pub struct BoardService<'conn> {
    conn: &'conn Connection,
    policy: RetryPolicy,
}

impl<'conn> BoardService<'conn> {
    /// Creates a service with the default retry policy.
    pub fn try_new(conn: &'conn Connection) -> BoardServiceResult<Self> {
        Self::with_policy(conn, RetryPolicy::default())
    }

    pub fn with_policy(conn: &'conn Connection, policy: RetryPolicy) -> BoardServiceResult<Self> {
        ensure_schema_current(conn)?;
        Ok(Self { conn, policy })
    }

    pub fn board(&self) -> BoardServiceResult<BoardView> {
        Ok(SqliteTaskRepository::new_unchecked(self.conn).list_board()?)
    }

    pub fn get_task(&self, id: TaskId) -> BoardServiceResult<Task> {
        SqliteTaskRepository::new_unchecked(self.conn)
            .get_task(id)?
            .ok_or_else(|| StoreError::not_found(EntityKind::Task, id).into())
    }

    pub fn task_logs(&self, id: TaskId) -> BoardServiceResult<Vec<TaskLog>> {
        Ok(SqliteTaskRepository::new_unchecked(self.conn).list_logs(id)?)
    }

    pub fn subtasks(&self, task_id: TaskId) -> BoardServiceResult<Vec<Subtask>> {
        Ok(SqliteSubtaskRepository::new_unchecked(self.conn).list_subtasks(task_id)?)
    }

    pub fn flow(&self, subtask_id: SubtaskId) -> BoardServiceResult<(Vec<FlowNode>, Vec<FlowEdge>)> {
        let repo = SqliteFlowRepository::new_unchecked(self.conn);
        Ok((repo.list_nodes(subtask_id)?, repo.list_edges(subtask_id)?))
    }

    /// Creates a task at the end of its lane.
    pub fn create_task(&self, ctx: &AuditContext, input: &NewTask) -> BoardServiceResult<Task> {
        self.authorize(ctx, "create_task")?;
        let task = self.write("create_task", |tx| {
            let tasks = SqliteTaskRepository::new_unchecked(tx);
            let task = tasks.create_task(input)?;
            tasks.append_log(task.id, ctx.actor_id(), &format!("created in {}", task.lane))?;
            ledger(tx).record(
                ctx,
                AuditEntry::new("Task", "create", format!("Task created in {}", task.lane))
                    .entity(task.id)
                    .after(&task),
            )?;
            Ok(task)
        })?;
        info!(
            "event=task_create module=board status=ok lane={} position={}",
            task.lane, task.position
        );
        Ok(task)
    }

    /// Applies a partial update; lane and position are not touched.
    pub fn update_task(
        &self,
        ctx: &AuditContext,
        id: TaskId,
        patch: &TaskPatch,
    ) -> BoardServiceResult<Task> {
        self.authorize(ctx, "update_task")?;
        self.write("update_task", |tx| {
            let tasks = SqliteTaskRepository::new_unchecked(tx);
            let before = tasks
                .get_task(id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Task, id))?;
            let mut after = before.clone();
            let changed = patch.apply(&mut after)?;
            if changed.is_empty() {
                return Ok(before);
            }

            tasks.update_task(&after)?;
            let fields = changed.join(", ");
            tasks.append_log(id, ctx.actor_id(), &format!("updated: {fields}"))?;
            ledger(tx).record(
                ctx,
                AuditEntry::new("Task", "update", format!("Fields: {fields}"))
                    .entity(id)
                    .before(&before)
                    .after(&after),
            )?;
            reload_task(&tasks, id)
        })
    }

    /// Moves a task to `position` in `lane`.
    ///
    /// Positions past the end are clamped; `position < 1` is rejected.
    pub fn move_task(
        &self,
        ctx: &AuditContext,
        id: TaskId,
        lane: Lane,
        position: i64,
    ) -> BoardServiceResult<Task> {
        self.authorize(ctx, "move_task")?;
        self.write("move_task", |tx| {
            let tasks = SqliteTaskRepository::new_unchecked(tx);
            let (task, outcome) = tasks.move_task(id, lane, position)?;
            let MoveOutcome::Moved { from, to } = &outcome else {
                return Ok(task);
            };

            let (note, entry) = if outcome.is_cross_partition() {
                let text = format!(
                    "{}#{} -> {}#{}",
                    from.partition, from.position, to.partition, to.position
                );
                (
                    format!("moved {text}"),
                    AuditEntry::new("Task", "move", text)
                        .before(&json!({"lane": from.partition, "position": from.position}))
                        .after(&json!({"lane": to.partition, "position": to.position})),
                )
            } else {
                let text = format!("reordered {} -> #{}", to.partition, to.position);
                (
                    text.clone(),
                    AuditEntry::new("Task", "move", text)
                        .before(&json!({"position": from.position}))
                        .after(&json!({"position": to.position})),
                )
            };
            tasks.append_log(id, ctx.actor_id(), &note)?;
            ledger(tx).record(ctx, entry.entity(id))?;
            Ok(task)
        })
    }

    /// Deletes a task together with its subtasks, diagrams and journal.
    pub fn delete_task(&self, ctx: &AuditContext, id: TaskId) -> BoardServiceResult<Task> {
        self.authorize(ctx, "delete_task")?;
        self.write("delete_task", |tx| {
            let tasks = SqliteTaskRepository::new_unchecked(tx);
            let task = tasks.delete_task(id)?;
            ledger(tx).record(
                ctx,
                AuditEntry::new(
                    "Task",
                    "delete",
                    format!("Task removed from {}#{}", task.lane, task.position),
                )
                .entity(id)
                .before(&task),
            )?;
            Ok(task)
        })
    }

    pub fn create_subtask(
        &self,
        ctx: &AuditContext,
        task_id: TaskId,
        input: &NewSubtask,
    ) -> BoardServiceResult<Subtask> {
        self.authorize(ctx, "create_subtask")?;
        self.write("create_subtask", |tx| {
            let subtask = SqliteSubtaskRepository::new_unchecked(tx).create_subtask(task_id, input)?;
            ledger(tx).record(
                ctx,
                AuditEntry::new("Subtask", "create", format!("Subtask created for task {task_id}"))
                    .entity(subtask.id)
                    .after(&subtask),
            )?;
            Ok(subtask)
        })
    }

    pub fn update_subtask(
        &self,
        ctx: &AuditContext,
        id: SubtaskId,
        patch: &SubtaskPatch,
    ) -> BoardServiceResult<Subtask> {
        self.authorize(ctx, "update_subtask")?;
        self.write("update_subtask", |tx| {
            let subtasks = SqliteSubtaskRepository::new_unchecked(tx);
            let before = subtasks
                .get_subtask(id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Subtask, id))?;
            let mut after = before.clone();
            let changed = patch.apply(&mut after)?;
            if changed.is_empty() {
                return Ok(before);
            }

            subtasks.update_subtask(&after)?;
            ledger(tx).record(
                ctx,
                AuditEntry::new("Subtask", "update", format!("Fields: {}", changed.join(", ")))
                    .entity(id)
                    .before(&before)
                    .after(&after),
            )?;
            subtasks
                .get_subtask(id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::Subtask, id))
        })
    }

    /// Moves a subtask within its task or under another task.
    pub fn move_subtask(
        &self,
        ctx: &AuditContext,
        id: SubtaskId,
        task_id: TaskId,
        position: i64,
    ) -> BoardServiceResult<Subtask> {
        self.authorize(ctx, "move_subtask")?;
        self.write("move_subtask", |tx| {
            let (subtask, outcome) =
                SqliteSubtaskRepository::new_unchecked(tx).move_subtask(id, task_id, position)?;
            if let MoveOutcome::Moved { from, to } = &outcome {
                ledger(tx).record(ctx, placement_entry("Subtask", id, from, to))?;
            }
            Ok(subtask)
        })
    }

    pub fn delete_subtask(&self, ctx: &AuditContext, id: SubtaskId) -> BoardServiceResult<Subtask> {
        self.authorize(ctx, "delete_subtask")?;
        self.write("delete_subtask", |tx| {
            let subtask = SqliteSubtaskRepository::new_unchecked(tx).delete_subtask(id)?;
            ledger(tx).record(
                ctx,
                AuditEntry::new(
                    "Subtask",
                    "delete",
                    format!(
                        "Subtask removed (task {}, pos {})",
                        subtask.task_id, subtask.position
                    ),
                )
                .entity(id)
                .before(&subtask),
            )?;
            Ok(subtask)
        })
    }

    pub fn create_node(
        &self,
        ctx: &AuditContext,
        subtask_id: SubtaskId,
        input: &NewFlowNode,
    ) -> BoardServiceResult<FlowNode> {
        self.authorize(ctx, "create_node")?;
        self.write("create_node", |tx| {
            let node = SqliteFlowRepository::new_unchecked(tx).create_node(subtask_id, input)?;
            ledger(tx).record(
                ctx,
                AuditEntry::new("FlowNode", "create", format!("Node created in subtask {subtask_id}"))
                    .entity(node.id)
                    .after(&node),
            )?;
            Ok(node)
        })
    }

    pub fn update_node(
        &self,
        ctx: &AuditContext,
        id: FlowNodeId,
        patch: &FlowNodePatch,
    ) -> BoardServiceResult<FlowNode> {
        self.authorize(ctx, "update_node")?;
        self.write("update_node", |tx| {
            let flow = SqliteFlowRepository::new_unchecked(tx);
            let before = flow
                .get_node(id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::FlowNode, id))?;
            let mut after = before.clone();
            let changed = patch.apply(&mut after)?;
            if changed.is_empty() {
                return Ok(before);
            }

            flow.update_node(&after)?;
            ledger(tx).record(
                ctx,
                AuditEntry::new("FlowNode", "update", format!("Fields: {}", changed.join(", ")))
                    .entity(id)
                    .before(&before)
                    .after(&after),
            )?;
            flow.get_node(id)?
                .ok_or_else(|| StoreError::not_found(EntityKind::FlowNode, id))
        })
    }

    pub fn reorder_node(
        &self,
        ctx: &AuditContext,
        id: FlowNodeId,
        position: i64,
    ) -> BoardServiceResult<FlowNode> {
        self.authorize(ctx, "reorder_node")?;
        self.write("reorder_node", |tx| {
            let (node, outcome) = SqliteFlowRepository::new_unchecked(tx).reorder_node(id, position)?;
            if let MoveOutcome::Moved { from, to } = &outcome {
                ledger(tx).record(ctx, placement_entry("FlowNode", id, from, to))?;
            }
            Ok(node)
        })
    }

    /// Deletes a node; every edge touching it goes with it.
    pub fn delete_node(&self, ctx: &AuditContext, id: FlowNodeId) -> BoardServiceResult<FlowNode> {
        self.authorize(ctx, "delete_node")?;
        self.write("delete_node", |tx| {
            let node = SqliteFlowRepository::new_unchecked(tx).delete_node(id)?;
            ledger(tx).record(
                ctx,
                AuditEntry::new(
                    "FlowNode",
                    "delete",
                    format!("Node removed from subtask {}", node.subtask_id),
                )
                .entity(id)
                .before(&node),
            )?;
            Ok(node)
        })
    }

    /// Links `from -> to`, or relabels the existing edge for that pair.
    pub fn link_nodes(
        &self,
        ctx: &AuditContext,
        subtask_id: SubtaskId,
        from_id: FlowNodeId,
        to_id: FlowNodeId,
        label: Option<&str>,
    ) -> BoardServiceResult<FlowEdge> {
        self.authorize(ctx, "link_nodes")?;
        self.write("link_nodes", |tx| {
            let outcome =
                SqliteFlowRepository::new_unchecked(tx).link_nodes(subtask_id, from_id, to_id, label)?;
            let entry = match &outcome {
                LinkOutcome::Unchanged(_) => None,
                LinkOutcome::Created(edge) => Some(
                    AuditEntry::new(
                        "FlowEdge",
                        "link",
                        format!("Linked {from_id} -> {to_id} (subtask {subtask_id})"),
                    )
                    .entity(edge.id)
                    .after(edge),
                ),
                LinkOutcome::Relabeled { before, after } => Some(
                    AuditEntry::new(
                        "FlowEdge",
                        "update",
                        format!("Edge {from_id}->{to_id} label changed"),
                    )
                    .entity(after.id)
                    .before(before)
                    .after(after),
                ),
            };
            if let Some(entry) = entry {
                ledger(tx).record(ctx, entry)?;
            }
            Ok(outcome.edge().clone())
        })
    }

    pub fn unlink(&self, ctx: &AuditContext, id: FlowEdgeId) -> BoardServiceResult<FlowEdge> {
        self.authorize(ctx, "unlink")?;
        self.write("unlink", |tx| {
            let edge = SqliteFlowRepository::new_unchecked(tx).unlink(id)?;
            ledger(tx).record(
                ctx,
                AuditEntry::new(
                    "FlowEdge",
                    "unlink",
                    format!(
                        "Edge removed {}->{} (subtask {})",
                        edge.from_id, edge.to_id, edge.subtask_id
                    ),
                )
                .entity(id)
                .before(&edge),
            )?;
            Ok(edge)
        })
    }

    fn authorize(&self, ctx: &AuditContext, operation: &'static str) -> BoardServiceResult<()> {
        if can_act_on(ctx.actor.as_ref(), &Resource::Board) {
            return Ok(());
        }
        warn!(
            "event=board_access module=board status=forbidden op={operation} actor_id={}",
            ctx.actor_id().map_or_else(|| "none".to_string(), |id| id.to_string())
        );
        Err(BoardServiceError::Forbidden { operation })
    }

    fn write<T>(
        &self,
        operation: &'static str,
        body: impl FnMut(&Transaction<'_>) -> StoreResult<T>,
    ) -> BoardServiceResult<T> {
        Ok(run_write(self.conn, self.policy, operation, body)?)
    }
}

fn ledger<'tx>(tx: &'tx Connection) -> SqliteAuditRepository<'tx> {
    SqliteAuditRepository::new_unchecked(tx)
}

fn reload_task(tasks: &SqliteTaskRepository<'_>, id: TaskId) -> StoreResult<Task> {
    tasks
        .get_task(id)?
        .ok_or_else(|| StoreError::not_found(EntityKind::Task, id))
}

fn placement_entry(entity_type: &str, id: Uuid, from: &Placement, to: &Placement) -> AuditEntry {
    let text = if from.partition == to.partition {
        format!("reordered -> #{}", to.position)
    } else {
        format!(
            "{}#{} -> {}#{}",
            from.partition, from.position, to.partition, to.position
        )
    };
    AuditEntry::new(entity_type, "move", text)
        .entity(id)
        .before(&json!({"parent": from.partition, "position": from.position}))
        .after(&json!({"parent": to.partition, "position": to.position}))
}
