use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HavenError;

/// Store-assigned message identifier. Strictly increasing within a database.
pub type MessageId = i64;

// =============================================================================
// Enums
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Message typed by the person using the app.
    User,
    /// Generated reply.
    Assistant,
}

impl Role {
    /// The canonical string stored in the `messages.role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Role::Assistant)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = HavenError;

    /// Parse a role name. `ai` is accepted as a legacy spelling of `assistant`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" | "ai" => Ok(Role::Assistant),
            other => Err(HavenError::Validation(format!(
                "Role must be either 'user' or 'assistant', got '{}'",
                other
            ))),
        }
    }
}

/// Distance metric used by a vector collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance. Similarity is reported as `1 - distance`.
    #[default]
    L2,
    /// Cosine similarity, reported as-is.
    Cosine,
}

// =============================================================================
// Records
// =============================================================================

/// A persisted chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

/// One row of a session's history, in the shape the chat page renders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: MessageId,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

impl From<Message> for HistoryEntry {
    fn from(msg: Message) -> Self {
        Self {
            id: msg.id,
            content: msg.content,
            role: msg.role,
            timestamp: msg.timestamp,
        }
    }
}

/// Aggregate view of a single session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: u64,
    pub last_activity: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!("ai".parse::<Role>().unwrap(), Role::Assistant);
    }

    #[test]
    fn test_role_rejects_system() {
        let err = "system".parse::<Role>().unwrap_err();
        assert!(matches!(err, HavenError::Validation(_)));
        assert!(err.to_string().contains("system"));
    }

    #[test]
    fn test_role_rejects_case_variants() {
        assert!("User".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_roundtrip() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let back: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(back, Role::User);
    }

    #[test]
    fn test_role_display_matches_column_value() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_distance_metric_default_is_l2() {
        assert_eq!(DistanceMetric::default(), DistanceMetric::L2);
        let parsed: DistanceMetric = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(parsed, DistanceMetric::Cosine);
    }

    #[test]
    fn test_history_entry_from_message() {
        let msg = Message {
            id: 7,
            session_id: "s1".to_string(),
            content: "Hello".to_string(),
            role: Role::User,
            timestamp: Utc::now(),
        };
        let entry = HistoryEntry::from(msg.clone());
        assert_eq!(entry.id, 7);
        assert_eq!(entry.content, "Hello");
        assert_eq!(entry.role, Role::User);
        assert_eq!(entry.timestamp, msg.timestamp);
    }
}
