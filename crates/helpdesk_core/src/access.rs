//! Role and ownership checks shared by request handlers and services.
//!
//! Checks are pure functions of the caller and the target; they never touch
//! storage. An absent actor (anonymous request) is denied everything.

use crate::model::actor::{Actor, Role};
use crate::model::board::UserId;

/// Something a caller wants to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Kanban tasks, subtasks and flow diagrams.
    Board,
    /// Assigning tickets or tasks to agents.
    AssignWork,
    /// Editing a ticket's fields.
    TicketEdit { reporter_id: UserId },
    /// Posting a reply on a ticket.
    TicketReply { assignee_id: Option<UserId> },
    /// Account and role administration.
    UserAdmin,
    /// Reading the audit ledger.
    AuditLedger,
}

/// Returns whether `actor` may act on `resource`.
pub fn can_act_on(actor: Option<&Actor>, resource: &Resource) -> bool {
    let Some(actor) = actor else {
        return false;
    };
    match resource {
        Resource::Board | Resource::AssignWork => actor.role.is_agent_like(),
        Resource::TicketEdit { reporter_id } => {
            actor.id == *reporter_id || actor.role.is_agent_like()
        }
        Resource::TicketReply { assignee_id } => {
            actor.role.is_agent_like() || *assignee_id == Some(actor.id)
        }
        Resource::UserAdmin => actor.role == Role::Admin,
        Resource::AuditLedger => true,
    }
}
