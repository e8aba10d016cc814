use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique key for one registered connection, assigned at upgrade time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The envelope exchanged between hub and clients.
///
/// Immutable once submitted: fan-out shares one `Arc<Message>` across every
/// target queue, so a broadcast never copies the payload per target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    /// Routing flag. Empty means "broadcast to all"; non-empty means "only
    /// connections registered under this exact flag".
    #[serde(default)]
    pub user_flag: String,

    /// Opaque payload tag (e.g. text vs. binary vs. control). The hub passes
    /// it through untouched.
    #[serde(default)]
    pub data_type: u8,

    /// Payload bytes, already serialized by the caller or handler.
    #[serde(default)]
    pub data: Vec<u8>,

    /// Creation timestamp, for audit/display only. Never used for ordering.
    #[serde(default)]
    pub date_time: String,
}

impl Message {
    /// Build a message and stamp its creation time.
    pub fn new(user_flag: impl Into<String>, data_type: u8, data: Vec<u8>) -> Self {
        Self {
            user_flag: user_flag.into(),
            data_type,
            data,
            date_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stamps_date_time() {
        let msg = Message::new("usertest", 1, b"payload".to_vec());
        assert_eq!(msg.user_flag, "usertest");
        assert_eq!(msg.data_type, 1);
        // "YYYY-MM-DD HH:MM:SS"
        assert_eq!(msg.date_time.len(), 19);
    }

    #[test]
    fn decodes_with_missing_fields() {
        let msg: Message = serde_json::from_str(r#"{"data":[1,2,3]}"#).unwrap();
        assert!(msg.user_flag.is_empty());
        assert_eq!(msg.data_type, 0);
        assert_eq!(msg.data, vec![1, 2, 3]);
        assert!(msg.date_time.is_empty());
    }

    #[test]
    fn round_trips_through_json() {
        let msg = Message::new("", 2, b"x".to_vec());
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, msg.data);
        assert_eq!(back.date_time, msg.date_time);
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
