//! Session wire messages.
//!
//! Framed JSON both ways. Inbound messages are parsed leniently — every
//! field except `type` is optional and unknown types get an `ignored`
//! reply. Outbound messages are a tagged enum so each reply carries only
//! its own fields.

use chrono::{DateTime, Utc};
use coauthor_collab::Delta;
use serde::{Deserialize, Serialize};

/// Message from a client. All fields except `type` are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "docId", default)]
    pub doc_id: String,
    #[serde(rename = "docTitle", default)]
    pub doc_title: String,
    #[serde(rename = "baseRevision", default)]
    pub base_revision: u64,
    #[serde(rename = "clientId", default)]
    pub client_id: String,
    #[serde(rename = "clientSeq", default)]
    pub client_seq: u64,
    #[serde(default)]
    pub ops: Delta,
    #[serde(default)]
    pub range: Option<serde_json::Value>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A presence entry in a `show_alive_members` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    #[serde(rename = "userId")]
    pub user_id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
}

/// Message to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "welcome")]
    Welcome { content: String },

    #[serde(rename = "feedback")]
    Feedback { content: String },

    #[serde(rename = "presence")]
    #[serde(rename_all = "camelCase")]
    Presence {
        #[serde(skip_serializing_if = "String::is_empty")]
        doc_id: String,
        content: String,
    },

    #[serde(rename = "createDocument")]
    #[serde(rename_all = "camelCase")]
    CreateDocument { doc_id: String, content: String },

    #[serde(rename = "joinDocument")]
    #[serde(rename_all = "camelCase")]
    JoinDocument { doc_id: String, content: String },

    #[serde(rename = "show_alive_members")]
    ShowAliveMembers {
        members: Vec<MemberEntry>,
        content: String,
    },

    /// Ack to the submitting connection.
    #[serde(rename = "op_applied")]
    #[serde(rename_all = "camelCase")]
    OpApplied {
        doc_id: String,
        base_revision: u64,
        current_revision: u64,
        client_id: String,
        client_seq: u64,
    },

    /// Applied operation pushed to the other connections in the room
    /// (including the same user's other tabs).
    #[serde(rename = "op_broadcast")]
    #[serde(rename_all = "camelCase")]
    OpBroadcast {
        doc_id: String,
        revision: u64,
        author_id: u64,
        #[serde(skip_serializing_if = "String::is_empty")]
        client_id: String,
        client_seq: u64,
        ops: Delta,
        applied_at: DateTime<Utc>,
    },

    #[serde(rename = "saveDocument")]
    SaveDocument { content: String },

    #[serde(rename = "loadDocumentContent")]
    LoadDocumentContent { content: String, revision: u64 },

    #[serde(rename = "error")]
    Error { content: String },

    #[serde(rename = "ignored")]
    Ignored { content: String },
}

impl ServerMessage {
    /// The wire-level `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::Feedback { .. } => "feedback",
            ServerMessage::Presence { .. } => "presence",
            ServerMessage::CreateDocument { .. } => "createDocument",
            ServerMessage::JoinDocument { .. } => "joinDocument",
            ServerMessage::ShowAliveMembers { .. } => "show_alive_members",
            ServerMessage::OpApplied { .. } => "op_applied",
            ServerMessage::OpBroadcast { .. } => "op_broadcast",
            ServerMessage::SaveDocument { .. } => "saveDocument",
            ServerMessage::LoadDocumentContent { .. } => "loadDocumentContent",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Ignored { .. } => "ignored",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_is_lenient() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(msg.kind, "heartbeat");
        assert!(msg.doc_id.is_empty());
        assert!(msg.ops.is_empty());

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"op_submit","docId":"d1","baseRevision":3,"clientId":"c1",
                "clientSeq":9,"ops":[{"kind":"retain","count":1},{"kind":"insert","text":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.base_revision, 3);
        assert_eq!(msg.client_seq, 9);
        assert_eq!(msg.ops.len(), 2);
    }

    #[test]
    fn test_op_applied_wire_shape() {
        let msg = ServerMessage::OpApplied {
            doc_id: "d1".into(),
            base_revision: 3,
            current_revision: 4,
            client_id: "c1".into(),
            client_seq: 9,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "op_applied");
        assert_eq!(json["docId"], "d1");
        assert_eq!(json["baseRevision"], 3);
        assert_eq!(json["currentRevision"], 4);
        assert_eq!(json["clientId"], "c1");
        assert_eq!(json["clientSeq"], 9);
    }

    #[test]
    fn test_op_broadcast_wire_shape() {
        let msg = ServerMessage::OpBroadcast {
            doc_id: "d1".into(),
            revision: 4,
            author_id: 7,
            client_id: "c1".into(),
            client_seq: 9,
            ops: Delta::new().retain(2).delete(1),
            applied_at: Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "op_broadcast");
        assert_eq!(json["revision"], 4);
        assert_eq!(json["authorId"], 7);
        assert_eq!(json["ops"][0]["kind"], "retain");
    }

    #[test]
    fn test_member_entry_hides_empty_username() {
        let with_name = serde_json::to_value(MemberEntry {
            user_id: 1,
            username: "alice".into(),
        })
        .unwrap();
        assert_eq!(with_name["username"], "alice");

        let nameless = serde_json::to_value(MemberEntry {
            user_id: 1,
            username: String::new(),
        })
        .unwrap();
        assert!(nameless.get("username").is_none());
    }
}
