//! Domain model for the helpdesk board and audit ledger.
//!
//! # Responsibility
//! - Define the records owned by the ordered-lane store (tasks, subtasks,
//!   flow nodes/edges) and by the audit ledger.
//! - Normalize user-provided field values before they reach SQL.
//!
//! # Invariants
//! - Every ordered item carries a 1-based `position` that is dense within its
//!   partition.
//! - Items reference users and parents by id only.

pub mod actor;
pub mod audit;
pub mod board;
pub mod fields;
pub mod flow;
pub mod lane;

/// Entity kinds managed by the ordered-lane store.
///
/// The string form doubles as the audit `entity_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Task,
    Subtask,
    FlowNode,
    FlowEdge,
}

impl EntityKind {
    /// Stable name used in audit records and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "Task",
            Self::Subtask => "Subtask",
            Self::FlowNode => "FlowNode",
            Self::FlowEdge => "FlowEdge",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
