//! Subtask flow-diagram records.
//!
//! # Invariants
//! - `FlowNode.position` is dense within `FlowNode.subtask_id`.
//! - A `FlowEdge` connects two distinct nodes of the same subtask and is
//!   unique per `(subtask_id, from_id, to_id)`.

use crate::model::board::SubtaskId;
use crate::model::fields::{
    normalize_optional_text, normalize_title, truncate_optional_text, FieldError, COLOR_MAX_CHARS,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type FlowNodeId = Uuid;
pub type FlowEdgeId = Uuid;

/// Default node fill color.
pub const DEFAULT_NODE_COLOR: &str = "#e5e7eb";
/// Default canvas coordinate for new nodes.
pub const DEFAULT_NODE_COORD: i64 = 40;

/// Node outline drawn by the diagram editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeShape {
    #[default]
    Rect,
    Diamond,
    Pill,
}

impl NodeShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Diamond => "diamond",
            Self::Pill => "pill",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rect" => Some(Self::Rect),
            "diamond" => Some(Self::Diamond),
            "pill" => Some(Self::Pill),
            _ => None,
        }
    }
}

/// Flow node read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: FlowNodeId,
    /// Partition key.
    pub subtask_id: SubtaskId,
    pub title: String,
    pub shape: NodeShape,
    pub color: String,
    pub x: i64,
    pub y: i64,
    pub body: Option<String>,
    /// 1-based position within `subtask_id`.
    pub position: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating a flow node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFlowNode {
    pub title: String,
    pub shape: NodeShape,
    pub color: Option<String>,
    pub x: i64,
    pub y: i64,
    pub body: Option<String>,
}

impl NewFlowNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            shape: NodeShape::Rect,
            color: None,
            x: DEFAULT_NODE_COORD,
            y: DEFAULT_NODE_COORD,
            body: None,
        }
    }

    /// Returns a trimmed, validated copy with the default color filled in.
    pub fn normalized(&self) -> Result<Self, FieldError> {
        Ok(Self {
            title: normalize_title(&self.title)?,
            shape: self.shape,
            color: Some(normalize_color(self.color.as_deref())),
            x: self.x,
            y: self.y,
            body: normalize_optional_text(self.body.as_deref()),
        })
    }
}

/// Partial node update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowNodePatch {
    pub title: Option<String>,
    pub shape: Option<NodeShape>,
    pub color: Option<String>,
    pub body: Option<Option<String>>,
    pub x: Option<i64>,
    pub y: Option<i64>,
}

impl FlowNodePatch {
    /// Applies the patch and returns the names of changed fields.
    ///
    /// Coordinate changes are reported once as `pos`.
    pub fn apply(&self, node: &mut FlowNode) -> Result<Vec<&'static str>, FieldError> {
        let title = self.title.as_deref().map(normalize_title).transpose()?;

        let mut changed = Vec::new();
        if let Some(title) = title {
            if title != node.title {
                node.title = title;
                changed.push("title");
            }
        }
        if let Some(shape) = self.shape {
            if shape != node.shape {
                node.shape = shape;
                changed.push("shape");
            }
        }
        if let Some(color) = self.color.as_deref() {
            let color = normalize_color(Some(color));
            if color != node.color {
                node.color = color;
                changed.push("color");
            }
        }
        if let Some(body) = self.body.as_ref() {
            let body = normalize_optional_text(body.as_deref());
            if body != node.body {
                node.body = body;
                changed.push("body");
            }
        }
        let x = self.x.unwrap_or(node.x);
        let y = self.y.unwrap_or(node.y);
        if x != node.x || y != node.y {
            node.x = x;
            node.y = y;
            changed.push("pos");
        }
        Ok(changed)
    }
}

/// Directed edge between two nodes of one subtask diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: FlowEdgeId,
    pub subtask_id: SubtaskId,
    pub from_id: FlowNodeId,
    pub to_id: FlowNodeId,
    pub label: Option<String>,
    pub created_at: i64,
}

fn normalize_color(value: Option<&str>) -> String {
    truncate_optional_text(value, COLOR_MAX_CHARS).unwrap_or_else(|| DEFAULT_NODE_COLOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::{FlowNode, FlowNodePatch, NewFlowNode, NodeShape, DEFAULT_NODE_COLOR};
    use uuid::Uuid;

    #[test]
    fn new_node_fills_default_color() {
        let input = NewFlowNode::new("Check cabling").normalized().unwrap();
        assert_eq!(input.color.as_deref(), Some(DEFAULT_NODE_COLOR));
        assert_eq!(input.shape, NodeShape::Rect);
    }

    #[test]
    fn patch_reports_coordinates_once() {
        let mut node = FlowNode {
            id: Uuid::new_v4(),
            subtask_id: Uuid::new_v4(),
            title: "Start".to_string(),
            shape: NodeShape::Pill,
            color: DEFAULT_NODE_COLOR.to_string(),
            x: 40,
            y: 40,
            body: None,
            position: 1,
            created_at: 0,
            updated_at: 0,
        };
        let patch = FlowNodePatch {
            shape: Some(NodeShape::Diamond),
            x: Some(120),
            y: Some(80),
            ..FlowNodePatch::default()
        };

        let changed = patch.apply(&mut node).unwrap();
        assert_eq!(changed, vec!["shape", "pos"]);
        assert_eq!((node.x, node.y), (120, 80));
    }

    #[test]
    fn shape_parse_rejects_unknown() {
        assert_eq!(NodeShape::parse(" Diamond"), Some(NodeShape::Diamond));
        assert_eq!(NodeShape::parse("circle"), None);
    }
}
