//! JSON frames exchanged over the session WebSocket.
//!
//! Inbound: `{"type":"query","message":..}` and `{"type":"language","language":0|1}`.
//! Outbound: `response`, `echo`, `language` and `error` frames.

use serde::{Deserialize, Serialize};

use clarify_dialog::{ClientEvent, Language, ServerEvent};

/// Frame sent by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Query { message: String },
    Language { language: u8 },
}

/// Frame sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Response { text: String },
    Echo { text: String },
    Language { language: u8 },
    /// A frame was rejected before reaching the conversation.
    Error { message: String },
}

impl From<ServerEvent> for ServerFrame {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::Message(text) => ServerFrame::Response { text },
            ServerEvent::Echo(text) => ServerFrame::Echo { text },
            ServerEvent::Language(language) => ServerFrame::Language {
                language: language.code(),
            },
        }
    }
}

/// Decode an inbound text frame into a conversation event.
///
/// Returns the message for an error frame when the frame is malformed,
/// names an unknown language, or carries an over-long query.
pub fn decode(text: &str, max_message_length: usize) -> Result<ClientEvent, String> {
    let frame: ClientFrame =
        serde_json::from_str(text).map_err(|e| format!("malformed frame: {e}"))?;
    match frame {
        ClientFrame::Query { message } => {
            let length = message.chars().count();
            if length > max_message_length {
                return Err(format!(
                    "message too long: {length} characters, at most {max_message_length} allowed"
                ));
            }
            Ok(ClientEvent::Utterance(message))
        }
        ClientFrame::Language { language } => Language::from_code(language)
            .map(ClientEvent::Language)
            .ok_or_else(|| format!("unknown language code {language}")),
    }
}

/// Encode an outbound frame as JSON text.
pub fn encode(frame: &ServerFrame) -> String {
    // A frame of strings and integers always serializes.
    serde_json::to_string(frame).unwrap_or_default()
}
