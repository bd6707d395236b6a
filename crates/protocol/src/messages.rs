use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;

// ---------------------------------------------------------------------------
// Control payloads
// ---------------------------------------------------------------------------

/// Announces the chunk whose framed bytes follow as the next binary message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub chunk_index: u32,
    pub file_name: String,
}

/// Receiver's acknowledgement of one chunk.
///
/// Sent only after the chunk is durably stored. `received == false` means
/// the receiver paused the transfer and the sender should stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    pub chunk_index: u32,
    pub file_name: String,
    pub received: bool,
}

/// Receiver's reply to a manifest: the chunks it still needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeState {
    pub file_name: String,
    #[serde(default)]
    pub missing_chunks: Vec<u32>,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Structured text message exchanged on the data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    Username { username: String },
    Manifest { manifest: Manifest },
    ChunkMeta(ChunkMeta),
    ChunkAck(ChunkAck),
    ResumeState(ResumeState),
}

impl ControlMessage {
    /// Serializes to the JSON text sent on the channel.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Classification of an inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMessage {
    Control(ControlMessage),
    Chat(String),
}

impl TextMessage {
    /// Parses inbound text.
    ///
    /// Never fails: text that is not a recognised control record (invalid
    /// JSON, unknown `type`, missing fields) is chat.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<ControlMessage>(text) {
            Ok(control) => TextMessage::Control(control),
            Err(_) => TextMessage::Chat(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_wire_shape() {
        let msg = ControlMessage::Username {
            username: "alice".into(),
        };
        let json = msg.to_text().unwrap();
        assert_eq!(json, r#"{"type":"username","username":"alice"}"#);
    }

    #[test]
    fn chunk_meta_wire_shape() {
        let msg = ControlMessage::ChunkMeta(ChunkMeta {
            chunk_index: 2,
            file_name: "a.bin".into(),
        });
        let json = msg.to_text().unwrap();
        assert!(json.contains("\"type\":\"chunk-meta\""));
        assert!(json.contains("\"chunkIndex\":2"));
        assert!(json.contains("\"fileName\":\"a.bin\""));
    }

    #[test]
    fn manifest_message_nests_manifest() {
        let manifest = Manifest::plan("a.bin", 100, 64).unwrap();
        let msg = ControlMessage::Manifest {
            manifest: manifest.clone(),
        };
        let json = msg.to_text().unwrap();
        assert!(json.starts_with(r#"{"type":"manifest","manifest":{"#));
        assert_eq!(
            TextMessage::parse(&json),
            TextMessage::Control(ControlMessage::Manifest { manifest })
        );
    }

    #[test]
    fn parses_ack_and_resume_state() {
        let ack = r#"{"type":"chunk-ack","chunkIndex":7,"fileName":"x","received":true}"#;
        assert_eq!(
            TextMessage::parse(ack),
            TextMessage::Control(ControlMessage::ChunkAck(ChunkAck {
                chunk_index: 7,
                file_name: "x".into(),
                received: true,
            }))
        );

        let resume = r#"{"type":"resume-state","fileName":"x","missingChunks":[1,2]}"#;
        assert_eq!(
            TextMessage::parse(resume),
            TextMessage::Control(ControlMessage::ResumeState(ResumeState {
                file_name: "x".into(),
                missing_chunks: vec![1, 2],
            }))
        );
    }

    #[test]
    fn plain_text_is_chat() {
        assert_eq!(
            TextMessage::parse("hello there"),
            TextMessage::Chat("hello there".into())
        );
    }

    #[test]
    fn json_without_known_type_is_chat() {
        for text in [
            r#"{"type":"wave"}"#,
            r#"{"hello":1}"#,
            r#"42"#,
            r#"{"type":"chunk-meta"}"#,
        ] {
            assert_eq!(TextMessage::parse(text), TextMessage::Chat(text.into()));
        }
    }
}
