//! Kanban lanes used as the partition key for tasks.

use serde::{Deserialize, Serialize};

/// One of the fixed Kanban states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Todo,
    Doing,
    Done,
}

impl Lane {
    /// All lanes in board display order.
    pub const ALL: [Lane; 3] = [Lane::Todo, Lane::Doing, Lane::Done];

    /// Stable storage value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        }
    }

    /// Parses a lane name, case-insensitive and trimmed.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(Self::Todo),
            "doing" => Some(Self::Doing),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Lane;

    #[test]
    fn parse_accepts_known_lanes_case_insensitive() {
        assert_eq!(Lane::parse(" Doing "), Some(Lane::Doing));
        assert_eq!(Lane::parse("DONE"), Some(Lane::Done));
        assert_eq!(Lane::parse("blocked"), None);
    }
}
