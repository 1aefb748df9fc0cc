use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound chat update delivered by the transport webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUpdate {
    pub user_id: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: UpdatePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdatePayload {
    /// Free-form text message.
    Message { text: String },
    /// A picked keyboard option; the payload is the option value, or a
    /// bare index for lesson choices.
    Choice { payload: String },
}

/// Closed set of reply actions the transport knows how to render.
/// Keyboards are opaque option lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplyAction {
    SendText {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        keyboard: Option<Vec<String>>,
    },
    EditText {
        msg_id: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        keyboard: Option<Vec<String>>,
    },
    ShowOptions {
        prompt: String,
        options: Vec<String>,
    },
    ClearOptions,
}

impl ReplyAction {
    pub fn text(text: impl Into<String>) -> Self {
        Self::SendText {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn options(prompt: impl Into<String>, options: Vec<String>) -> Self {
        Self::ShowOptions {
            prompt: prompt.into(),
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_deserializes_message_kind() {
        let json = r#"{"userId":"u1","ts":"2026-01-01T10:00:00Z","kind":"message","text":"дом"}"#;
        let update: ChatUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.user_id, "u1");
        assert!(matches!(update.payload, UpdatePayload::Message { ref text } if text == "дом"));
    }

    #[test]
    fn update_deserializes_choice_kind() {
        let json = r#"{"userId":"u1","ts":"2026-01-01T10:00:00Z","kind":"choice","payload":"2"}"#;
        let update: ChatUpdate = serde_json::from_str(json).unwrap();
        assert!(matches!(update.payload, UpdatePayload::Choice { ref payload } if payload == "2"));
    }

    #[test]
    fn send_text_omits_empty_keyboard() {
        let action = ReplyAction::text("hi");
        let json = serde_json::to_string(&action).unwrap();
        assert!(!json.contains("keyboard"));
        assert!(json.contains("send_text"));
    }
}
