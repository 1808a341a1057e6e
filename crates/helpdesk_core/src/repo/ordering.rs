//! Dense per-partition ordering shared by tasks, subtasks and flow nodes.
//!
//! # Responsibility
//! - Append, reorder, transfer and remove items while keeping positions of
//!   every partition equal to `{1..count}`.
//! - Keep the renumbering SQL in one place for all ordered tables.
//!
//! # Invariants
//! - Mutations require an open transaction on `conn`; the write lock is held
//!   before the moved item's position is read.
//! - Same-partition moves never write when the clamped target equals the
//!   current position.
//! - Targets are clamped to `[1, count]` within a partition and to
//!   `[1, count + 1]` on transfer, so no request can open a gap.

use crate::model::EntityKind;
use crate::repo::error::{StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// SQL expression for the current epoch-ms timestamp.
pub(crate) const NOW_MS_SQL: &str = "(strftime('%s', 'now') * 1000)";

/// Table whose rows carry a dense `position` within a partition column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedTable {
    pub table: &'static str,
    pub partition_column: &'static str,
    pub entity: EntityKind,
}

/// Tasks, partitioned by lane.
pub const TASKS: OrderedTable = OrderedTable {
    table: "tasks",
    partition_column: "lane",
    entity: EntityKind::Task,
};

/// Subtasks, partitioned by parent task.
pub const SUBTASKS: OrderedTable = OrderedTable {
    table: "subtasks",
    partition_column: "task_uuid",
    entity: EntityKind::Subtask,
};

/// Flow nodes, partitioned by parent subtask.
pub const FLOW_NODES: OrderedTable = OrderedTable {
    table: "flow_nodes",
    partition_column: "subtask_uuid",
    entity: EntityKind::FlowNode,
};

/// Partition key and position of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub partition: String,
    pub position: i64,
}

/// Result of a move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Target equals current placement; nothing was written.
    Unchanged(Placement),
    Moved { from: Placement, to: Placement },
}

impl MoveOutcome {
    /// Final placement of the item.
    pub fn placement(&self) -> &Placement {
        match self {
            Self::Unchanged(placement) => placement,
            Self::Moved { to, .. } => to,
        }
    }

    pub fn is_cross_partition(&self) -> bool {
        match self {
            Self::Unchanged(_) => false,
            Self::Moved { from, to } => from.partition != to.partition,
        }
    }
}

/// Returns the position for a new item at the end of `partition`.
pub(crate) fn append_position(
    conn: &Connection,
    table: OrderedTable,
    partition: &str,
) -> StoreResult<i64> {
    ensure_in_transaction(conn, table)?;
    Ok(current_max(conn, table, partition)? + 1)
}

/// Loads the placement of `id` inside the current write transaction.
pub(crate) fn lock_placement(
    conn: &Connection,
    table: OrderedTable,
    id: Uuid,
) -> StoreResult<Placement> {
    ensure_in_transaction(conn, table)?;
    conn.query_row(
        &format!(
            "SELECT {col}, position FROM {table} WHERE uuid = ?1;",
            col = table.partition_column,
            table = table.table
        ),
        [id.to_string()],
        |row| {
            Ok(Placement {
                partition: row.get(0)?,
                position: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(table.entity, id))
}

/// Moves `id` to `requested` within `target_partition`.
///
/// Same partition: items between the old and new slot shift by one toward
/// the vacated slot. Other partition: the old partition closes its gap, the
/// target is clamped to `count + 1`, and later items in the new partition
/// shift down by one.
pub(crate) fn move_item(
    conn: &Connection,
    table: OrderedTable,
    id: Uuid,
    target_partition: &str,
    requested: i64,
) -> StoreResult<MoveOutcome> {
    if requested < 1 {
        return Err(StoreError::InvalidArgument(format!(
            "target position must be >= 1, got {requested}"
        )));
    }

    let from = lock_placement(conn, table, id)?;
    if from.partition == target_partition {
        return reorder_within(conn, table, id, from, requested);
    }

    shift_down_after(conn, table, &from.partition, from.position)?;
    let target = requested.min(current_max(conn, table, target_partition)? + 1);
    conn.execute(
        &format!(
            "UPDATE {table} SET position = position + 1 WHERE {col} = ?1 AND position >= ?2;",
            table = table.table,
            col = table.partition_column
        ),
        params![target_partition, target],
    )?;
    let to = Placement {
        partition: target_partition.to_string(),
        position: target,
    };
    write_placement(conn, table, id, &to)?;
    Ok(MoveOutcome::Moved { from, to })
}

fn reorder_within(
    conn: &Connection,
    table: OrderedTable,
    id: Uuid,
    from: Placement,
    requested: i64,
) -> StoreResult<MoveOutcome> {
    // A lone item's partition max is its own position, so `target >= 1`.
    let target = requested.min(current_max(conn, table, &from.partition)?);
    if target == from.position {
        return Ok(MoveOutcome::Unchanged(from));
    }

    if target > from.position {
        conn.execute(
            &format!(
                "UPDATE {table} SET position = position - 1
                 WHERE {col} = ?1 AND position > ?2 AND position <= ?3;",
                table = table.table,
                col = table.partition_column
            ),
            params![from.partition, from.position, target],
        )?;
    } else {
        conn.execute(
            &format!(
                "UPDATE {table} SET position = position + 1
                 WHERE {col} = ?1 AND position >= ?2 AND position < ?3;",
                table = table.table,
                col = table.partition_column
            ),
            params![from.partition, target, from.position],
        )?;
    }

    let to = Placement {
        partition: from.partition.clone(),
        position: target,
    };
    write_placement(conn, table, id, &to)?;
    Ok(MoveOutcome::Moved { from, to })
}

/// Deletes `id` and closes the gap it leaves behind.
///
/// Rows referencing the item are removed by the schema's cascades.
pub(crate) fn remove_item(
    conn: &Connection,
    table: OrderedTable,
    id: Uuid,
) -> StoreResult<Placement> {
    let placement = lock_placement(conn, table, id)?;
    conn.execute(
        &format!("DELETE FROM {table} WHERE uuid = ?1;", table = table.table),
        [id.to_string()],
    )?;
    shift_down_after(conn, table, &placement.partition, placement.position)?;
    Ok(placement)
}

/// Positions of `partition` in ascending order.
pub fn positions(conn: &Connection, table: OrderedTable, partition: &str) -> StoreResult<Vec<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT position FROM {table} WHERE {col} = ?1 ORDER BY position ASC, uuid ASC;",
        table = table.table,
        col = table.partition_column
    ))?;
    let mut rows = stmt.query([partition])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(row.get(0)?);
    }
    Ok(result)
}

/// Verifies that `partition` holds exactly the positions `{1..count}`.
pub fn check_dense(conn: &Connection, table: OrderedTable, partition: &str) -> StoreResult<()> {
    let found = positions(conn, table, partition)?;
    for (index, position) in found.iter().enumerate() {
        let expected = index as i64 + 1;
        if *position != expected {
            return Err(StoreError::InvalidData(format!(
                "{} partition `{partition}` expected position {expected}, found {position}",
                table.table
            )));
        }
    }
    Ok(())
}

/// Verifies every partition currently present in `table`.
pub fn check_all_dense(conn: &Connection, table: OrderedTable) -> StoreResult<()> {
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {col} FROM {table};",
        table = table.table,
        col = table.partition_column
    ))?;
    let mut rows = stmt.query([])?;
    let mut partitions = Vec::new();
    while let Some(row) = rows.next()? {
        partitions.push(row.get::<_, String>(0)?);
    }
    for partition in partitions {
        check_dense(conn, table, &partition)?;
    }
    Ok(())
}

fn current_max(conn: &Connection, table: OrderedTable, partition: &str) -> StoreResult<i64> {
    let max = conn.query_row(
        &format!(
            "SELECT COALESCE(MAX(position), 0) FROM {table} WHERE {col} = ?1;",
            table = table.table,
            col = table.partition_column
        ),
        [partition],
        |row| row.get(0),
    )?;
    Ok(max)
}

fn shift_down_after(
    conn: &Connection,
    table: OrderedTable,
    partition: &str,
    position: i64,
) -> StoreResult<()> {
    conn.execute(
        &format!(
            "UPDATE {table} SET position = position - 1 WHERE {col} = ?1 AND position > ?2;",
            table = table.table,
            col = table.partition_column
        ),
        params![partition, position],
    )?;
    Ok(())
}

fn write_placement(
    conn: &Connection,
    table: OrderedTable,
    id: Uuid,
    placement: &Placement,
) -> StoreResult<()> {
    conn.execute(
        &format!(
            "UPDATE {table}
             SET {col} = ?2,
                 position = ?3,
                 updated_at = {NOW_MS_SQL}
             WHERE uuid = ?1;",
            table = table.table,
            col = table.partition_column
        ),
        params![id.to_string(), placement.partition, placement.position],
    )?;
    Ok(())
}

fn ensure_in_transaction(conn: &Connection, table: OrderedTable) -> StoreResult<()> {
    if conn.is_autocommit() {
        return Err(StoreError::InvalidArgument(format!(
            "{} ordering changes require an open write transaction",
            table.table
        )));
    }
    Ok(())
}
