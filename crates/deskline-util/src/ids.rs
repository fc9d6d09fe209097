//! Strongly-typed identifiers for deskline

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifiers that name configuration objects (rules, policies, agents)
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

/// Identifiers for rows owned by the store
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Stable identifier of an automation rule
    RuleId
);
string_id!(
    /// Identifier of an SLA policy
    SlaPolicyId
);
string_id!(
    /// Identifier of a ticket category
    CategoryId
);
string_id!(
    /// Identifier of a support agent
    AgentId
);

row_id!(
    /// Support ticket
    TicketId
);
row_id!(MenuId);
row_id!(MenuItemId);
row_id!(
    /// Media folder
    FolderId
);
row_id!(PageId);
row_id!(TemplateId);
row_id!(RedirectId);
row_id!(
    /// Notification outbox row
    NotificationId
);

/// Correlates everything one automation dispatch did
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_id_equality() {
        let id1 = RuleId::new("urgent-to-lead");
        let id2 = RuleId::new("urgent-to-lead");
        let id3 = RuleId::new("vip-tag");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn run_id_uniqueness() {
        let r1 = RunId::new();
        let r2 = RunId::new();
        assert_ne!(r1, r2);
    }

    #[test]
    fn ids_serialize_as_inner_value() {
        let ticket = TicketId::new(42);
        assert_eq!(serde_json::to_string(&ticket).unwrap(), "42");

        let agent = AgentId::new("alice");
        let json = serde_json::to_string(&agent).unwrap();
        assert_eq!(json, "\"alice\"");
        let parsed: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(agent, parsed);

        let run = RunId::new();
        let json = serde_json::to_string(&run).unwrap();
        let parsed: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(run, parsed);
    }
}
