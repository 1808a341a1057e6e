//! Flow diagram persistence: ordered nodes and upserted edges per subtask.
//!
//! # Invariants
//! - Nodes are dense within their subtask; edges carry no position.
//! - An edge's endpoints are distinct nodes of the edge's own subtask.
//! - Linking an already-linked pair updates the label in place; the pair
//!   never gets a second edge.
//! - Removing a node removes every edge touching it (schema cascade).

use crate::model::board::SubtaskId;
use crate::model::fields::{truncate_optional_text, LABEL_MAX_CHARS};
use crate::model::flow::{FlowEdge, FlowEdgeId, FlowNode, FlowNodeId, NewFlowNode, NodeShape};
use crate::model::EntityKind;
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::ordering::{self, MoveOutcome, FLOW_NODES, NOW_MS_SQL};
use crate::repo::{ensure_schema_current, parse_uuid};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const NODE_SELECT_SQL: &str = "SELECT
    uuid,
    subtask_uuid,
    title,
    shape,
    color,
    x,
    y,
    body,
    position,
    created_at,
    updated_at
FROM flow_nodes";

const EDGE_SELECT_SQL: &str = "SELECT
    uuid,
    subtask_uuid,
    from_uuid,
    to_uuid,
    label,
    created_at
FROM flow_edges";

/// Result of [`FlowRepository::link_nodes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Created(FlowEdge),
    /// The pair was linked already; only the label changed.
    Relabeled { before: FlowEdge, after: FlowEdge },
    /// The pair was linked already with the same label.
    Unchanged(FlowEdge),
}

impl LinkOutcome {
    pub fn edge(&self) -> &FlowEdge {
        match self {
            Self::Created(edge) | Self::Unchanged(edge) => edge,
            Self::Relabeled { after, .. } => after,
        }
    }
}

/// Repository interface for flow diagram operations.
pub trait FlowRepository {
    fn create_node(&self, subtask_id: SubtaskId, input: &NewFlowNode) -> StoreResult<FlowNode>;
    fn get_node(&self, id: FlowNodeId) -> StoreResult<Option<FlowNode>>;
    fn list_nodes(&self, subtask_id: SubtaskId) -> StoreResult<Vec<FlowNode>>;
    /// Writes payload and canvas coordinates; ordering is left untouched.
    fn update_node(&self, node: &FlowNode) -> StoreResult<()>;
    /// Moves a node within its own subtask diagram.
    fn reorder_node(&self, id: FlowNodeId, position: i64)
        -> StoreResult<(FlowNode, MoveOutcome)>;
    fn delete_node(&self, id: FlowNodeId) -> StoreResult<FlowNode>;
    /// Creates `from -> to` or relabels the existing edge for that pair.
    fn link_nodes(
        &self,
        subtask_id: SubtaskId,
        from_id: FlowNodeId,
        to_id: FlowNodeId,
        label: Option<&str>,
    ) -> StoreResult<LinkOutcome>;
    fn get_edge(&self, id: FlowEdgeId) -> StoreResult<Option<FlowEdge>>;
    fn list_edges(&self, subtask_id: SubtaskId) -> StoreResult<Vec<FlowEdge>>;
    fn unlink(&self, id: FlowEdgeId) -> StoreResult<FlowEdge>;
}

/// SQLite-backed flow repository.
pub struct SqliteFlowRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFlowRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_current(conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn new_unchecked(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn load_node(&self, id: FlowNodeId) -> StoreResult<FlowNode> {
        self.get_node(id)?
            .ok_or_else(|| StoreError::not_found(EntityKind::FlowNode, id))
    }

    fn load_edge(&self, id: FlowEdgeId) -> StoreResult<FlowEdge> {
        self.get_edge(id)?
            .ok_or_else(|| StoreError::not_found(EntityKind::FlowEdge, id))
    }

    fn ensure_subtask_exists(&self, subtask_id: SubtaskId) -> StoreResult<()> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM subtasks WHERE uuid = ?1;",
                [subtask_id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        found.ok_or_else(|| StoreError::not_found(EntityKind::Subtask, subtask_id))
    }

    fn find_edge_by_pair(
        &self,
        subtask_id: SubtaskId,
        from_id: FlowNodeId,
        to_id: FlowNodeId,
    ) -> StoreResult<Option<FlowEdge>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EDGE_SELECT_SQL} WHERE subtask_uuid = ?1 AND from_uuid = ?2 AND to_uuid = ?3;"
        ))?;
        let mut rows = stmt.query(params![
            subtask_id.to_string(),
            from_id.to_string(),
            to_id.to_string()
        ])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_edge_row(row)?));
        }
        Ok(None)
    }
}

impl FlowRepository for SqliteFlowRepository<'_> {
    fn create_node(&self, subtask_id: SubtaskId, input: &NewFlowNode) -> StoreResult<FlowNode> {
        let input = input.normalized()?;
        self.ensure_subtask_exists(subtask_id)?;
        let id = Uuid::new_v4();
        let partition = subtask_id.to_string();
        let position = ordering::append_position(self.conn, FLOW_NODES, &partition)?;

        self.conn.execute(
            "INSERT INTO flow_nodes (
                uuid,
                subtask_uuid,
                title,
                shape,
                color,
                x,
                y,
                body,
                position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                id.to_string(),
                partition,
                input.title,
                input.shape.as_str(),
                input.color,
                input.x,
                input.y,
                input.body,
                position,
            ],
        )?;
        self.load_node(id)
    }

    fn get_node(&self, id: FlowNodeId) -> StoreResult<Option<FlowNode>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NODE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_node_row(row)?));
        }
        Ok(None)
    }

    fn list_nodes(&self, subtask_id: SubtaskId) -> StoreResult<Vec<FlowNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NODE_SELECT_SQL} WHERE subtask_uuid = ?1 ORDER BY position ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([subtask_id.to_string()])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }
        Ok(nodes)
    }

    fn update_node(&self, node: &FlowNode) -> StoreResult<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE flow_nodes
                 SET title = ?2,
                     shape = ?3,
                     color = ?4,
                     x = ?5,
                     y = ?6,
                     body = ?7,
                     updated_at = {NOW_MS_SQL}
                 WHERE uuid = ?1;"
            ),
            params![
                node.id.to_string(),
                node.title,
                node.shape.as_str(),
                node.color,
                node.x,
                node.y,
                node.body,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(EntityKind::FlowNode, node.id));
        }
        Ok(())
    }

    fn reorder_node(
        &self,
        id: FlowNodeId,
        position: i64,
    ) -> StoreResult<(FlowNode, MoveOutcome)> {
        let current = ordering::lock_placement(self.conn, FLOW_NODES, id)?;
        let outcome = ordering::move_item(self.conn, FLOW_NODES, id, &current.partition, position)?;
        Ok((self.load_node(id)?, outcome))
    }

    fn delete_node(&self, id: FlowNodeId) -> StoreResult<FlowNode> {
        let node = self.load_node(id)?;
        ordering::remove_item(self.conn, FLOW_NODES, id)?;
        Ok(node)
    }

    fn link_nodes(
        &self,
        subtask_id: SubtaskId,
        from_id: FlowNodeId,
        to_id: FlowNodeId,
        label: Option<&str>,
    ) -> StoreResult<LinkOutcome> {
        if from_id == to_id {
            return Err(StoreError::InvalidArgument(
                "an edge must connect two different nodes".to_string(),
            ));
        }
        self.ensure_subtask_exists(subtask_id)?;
        for node_id in [from_id, to_id] {
            let node = self.load_node(node_id)?;
            if node.subtask_id != subtask_id {
                return Err(StoreError::InvalidArgument(format!(
                    "node {node_id} belongs to another diagram"
                )));
            }
        }

        let label = truncate_optional_text(label, LABEL_MAX_CHARS);
        if let Some(existing) = self.find_edge_by_pair(subtask_id, from_id, to_id)? {
            if existing.label == label {
                return Ok(LinkOutcome::Unchanged(existing));
            }
            self.conn.execute(
                "UPDATE flow_edges SET label = ?2 WHERE uuid = ?1;",
                params![existing.id.to_string(), label],
            )?;
            let after = FlowEdge {
                label,
                ..existing.clone()
            };
            return Ok(LinkOutcome::Relabeled {
                before: existing,
                after,
            });
        }

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO flow_edges (uuid, subtask_uuid, from_uuid, to_uuid, label)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.to_string(),
                subtask_id.to_string(),
                from_id.to_string(),
                to_id.to_string(),
                label,
            ],
        )?;
        Ok(LinkOutcome::Created(self.load_edge(id)?))
    }

    fn get_edge(&self, id: FlowEdgeId) -> StoreResult<Option<FlowEdge>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EDGE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_edge_row(row)?));
        }
        Ok(None)
    }

    fn list_edges(&self, subtask_id: SubtaskId) -> StoreResult<Vec<FlowEdge>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EDGE_SELECT_SQL} WHERE subtask_uuid = ?1 ORDER BY created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([subtask_id.to_string()])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(parse_edge_row(row)?);
        }
        Ok(edges)
    }

    fn unlink(&self, id: FlowEdgeId) -> StoreResult<FlowEdge> {
        let edge = self.load_edge(id)?;
        self.conn
            .execute("DELETE FROM flow_edges WHERE uuid = ?1;", [id.to_string()])?;
        Ok(edge)
    }
}

fn parse_node_row(row: &Row<'_>) -> StoreResult<FlowNode> {
    let id_text: String = row.get("uuid")?;
    let subtask_text: String = row.get("subtask_uuid")?;
    let shape_text: String = row.get("shape")?;
    let shape = NodeShape::parse(&shape_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid shape `{shape_text}` in flow_nodes.shape"))
    })?;

    Ok(FlowNode {
        id: parse_uuid(&id_text, "flow_nodes.uuid")?,
        subtask_id: parse_uuid(&subtask_text, "flow_nodes.subtask_uuid")?,
        title: row.get("title")?,
        shape,
        color: row.get("color")?,
        x: row.get("x")?,
        y: row.get("y")?,
        body: row.get("body")?,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_edge_row(row: &Row<'_>) -> StoreResult<FlowEdge> {
    let id_text: String = row.get("uuid")?;
    let subtask_text: String = row.get("subtask_uuid")?;
    let from_text: String = row.get("from_uuid")?;
    let to_text: String = row.get("to_uuid")?;

    Ok(FlowEdge {
        id: parse_uuid(&id_text, "flow_edges.uuid")?,
        subtask_id: parse_uuid(&subtask_text, "flow_edges.subtask_uuid")?,
        from_id: parse_uuid(&from_text, "flow_edges.from_uuid")?,
        to_id: parse_uuid(&to_text, "flow_edges.to_uuid")?,
        label: row.get("label")?,
        created_at: row.get("created_at")?,
    })
}
