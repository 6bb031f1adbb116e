use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Events published by the messaging service and streamed over the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessageEvent {
    /// A new message was persisted
    MessageCreated {
        message: Message,
        /// Set in the conversation layout so subscribers can filter on
        /// membership; `None` in the direct layout.
        conversation_id: Option<String>,
    },

    /// A batch of messages was flipped from unread to read
    MessagesRead {
        reader_id: String,
        sender_id: String,
        count: u64,
    },
}

impl MessageEvent {
    /// Returns the user this event is addressed to, if it targets one.
    /// `MessageCreated` targets the receiver; `MessagesRead` targets the
    /// original sender (their sent messages changed state).
    pub fn addressee(&self) -> &str {
        match self {
            Self::MessageCreated { message, .. } => &message.receiver_id,
            Self::MessagesRead { sender_id, .. } => sender_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn events_serialize_tagged() {
        let event = MessageEvent::MessageCreated {
            message: Message {
                id: "m1".into(),
                sender_id: "a".into(),
                receiver_id: "b".into(),
                content: "hello".into(),
                created_at: Utc::now(),
                read: false,
            },
            conversation_id: None,
        };

        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "MessageCreated");
        assert_eq!(json["data"]["message"]["content"], "hello");
    }

    #[test]
    fn read_events_are_addressed_to_the_original_sender() {
        let event = MessageEvent::MessagesRead {
            reader_id: "a".into(),
            sender_id: "b".into(),
            count: 3,
        };
        assert_eq!(event.addressee(), "b");
    }
}
