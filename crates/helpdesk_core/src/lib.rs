//! Storage core for the helpdesk ticketing and Kanban application.
//!
//! Owns the ordered-lane store (tasks, subtasks, flow diagrams) and the
//! append-only audit ledger. Request routing, sessions and rendering live
//! in the host application.

pub mod access;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use access::{can_act_on, Resource};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::actor::{Actor, AuditContext, RequestOrigin, Role};
pub use model::audit::{AuditEntry, AuditRecord, Snapshot};
pub use model::board::{
    NewSubtask, NewTask, Subtask, SubtaskId, SubtaskPatch, SubtaskStatus, Task, TaskId, TaskLog,
    TaskPatch, UserId,
};
pub use model::flow::{FlowEdge, FlowNode, FlowNodePatch, NewFlowNode, NodeShape};
pub use model::lane::Lane;
pub use model::EntityKind;
pub use repo::audit_repo::AuditFilter;
pub use repo::error::{StoreError, StoreResult};
pub use repo::ordering::{MoveOutcome, Placement};
pub use repo::task_repo::BoardView;
pub use repo::write_tx::RetryPolicy;
pub use service::audit_service::{AuditPage, AuditService, AuditServiceError, PageRequest};
pub use service::board_service::{BoardService, BoardServiceError};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
