use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single chat message extracted from an exported archive.
///
/// `uuid` is the dedup key: the same logical message parsed from two
/// independent exports carries the same `uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub datetime: DateTime<Utc>,
    pub group: String,
    pub uuid: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Message {
    /// Stable dedup key for a message of `group` with the archive-local `message_id`.
    pub fn derive_uuid(group: &str, message_id: &str) -> String {
        let name = format!("tg://{}/{}", group, message_id);
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_uuid_is_stable() {
        let a = Message::derive_uuid("rustaceans", "42");
        let b = Message::derive_uuid("rustaceans", "42");
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_derive_uuid_differs_by_group() {
        assert_ne!(
            Message::derive_uuid("group_a", "1"),
            Message::derive_uuid("group_b", "1")
        );
    }
}
