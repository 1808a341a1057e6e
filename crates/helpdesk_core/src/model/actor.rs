//! Caller identity and request metadata supplied by the request layer.
//!
//! The core never resolves sessions itself; handlers pass an explicit
//! [`AuditContext`] into every mutating call.

use crate::model::board::UserId;
use serde::{Deserialize, Serialize};

/// Account role as stored by the account system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular requester filing tickets.
    User,
    Agent,
    /// Team lead ("gestor").
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::Manager => "gestor",
            Self::Admin => "admin",
        }
    }

    /// Parses a stored role name. Unknown values are treated as `user`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "agent" => Self::Agent,
            "gestor" | "manager" => Self::Manager,
            "admin" => Self::Admin,
            _ => Self::User,
        }
    }

    /// Roles allowed to work the support queue and the Kanban board.
    pub fn is_agent_like(self) -> bool {
        matches!(self, Self::Agent | Self::Manager | Self::Admin)
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            email: None,
            name: None,
            role,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Best-effort request origin.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestOrigin {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestOrigin {
    /// Builds origin metadata from raw header values.
    ///
    /// The client IP is the first `X-Forwarded-For` entry when present,
    /// otherwise the peer address.
    pub fn from_headers(
        forwarded_for: Option<&str>,
        remote_addr: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        let forwarded = forwarded_for
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let ip = forwarded
            .or_else(|| remote_addr.map(str::trim).filter(|value| !value.is_empty()))
            .map(str::to_string);
        let user_agent = user_agent
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Self { ip, user_agent }
    }
}

/// Actor and origin attached to every audit record written for one request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditContext {
    /// `None` for anonymous or system-initiated actions.
    pub actor: Option<Actor>,
    pub origin: RequestOrigin,
}

impl AuditContext {
    /// Context for background jobs and maintenance tasks.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn for_actor(actor: Actor) -> Self {
        Self {
            actor: Some(actor),
            origin: RequestOrigin::default(),
        }
    }

    pub fn with_origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn actor_id(&self) -> Option<UserId> {
        self.actor.as_ref().map(|actor| actor.id)
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestOrigin, Role};

    #[test]
    fn forwarded_for_wins_over_peer_address() {
        let origin = RequestOrigin::from_headers(
            Some(" 10.0.0.7 , 172.16.0.1"),
            Some("127.0.0.1"),
            Some("Mozilla/5.0"),
        );
        assert_eq!(origin.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(origin.user_agent.as_deref(), Some("Mozilla/5.0"));
    }

    #[test]
    fn blank_forwarded_for_falls_back_to_peer() {
        let origin = RequestOrigin::from_headers(Some("  "), Some("192.168.0.26"), None);
        assert_eq!(origin.ip.as_deref(), Some("192.168.0.26"));
        assert_eq!(origin.user_agent, None);
    }

    #[test]
    fn role_parse_accepts_legacy_names() {
        assert_eq!(Role::parse("GESTOR"), Role::Manager);
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("guest"), Role::User);
        assert!(Role::Manager.is_agent_like());
        assert!(!Role::User.is_agent_like());
    }
}
