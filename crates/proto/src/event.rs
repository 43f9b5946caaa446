use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ident::{ChannelId, SenderId};

/// Inbound event from a channel adapter to the bus.
///
/// Immutable after creation; consumed once by the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Reply address for this conversation.
    pub channel_id: ChannelId,
    /// Stable identity of the remote principal.
    pub sender_id: SenderId,
    /// Text payload (message text, caption, media annotations).
    pub content: String,
    /// Local paths of media downloaded for this event, in receipt order.
    pub media: Vec<PathBuf>,
    /// Optional structured metadata attached by the adapter.
    pub metadata: Option<serde_json::Value>,
}

impl InboundEvent {
    /// Creates a new inbound event with no media or metadata.
    pub fn new(channel_id: ChannelId, sender_id: SenderId, content: impl Into<String>) -> Self {
        Self {
            channel_id,
            sender_id,
            content: content.into(),
            media: Vec::new(),
            metadata: None,
        }
    }

    /// Attaches downloaded media paths.
    pub fn with_media(mut self, media: Vec<PathBuf>) -> Self {
        self.media = media;
        self
    }

    /// Attaches adapter metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// What an outbound event asks the receiving adapter to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundIntent {
    /// Render and deliver the content as a reply.
    Reply,
    /// Stop the composing indicator for the chat without sending text.
    StopTyping,
}

/// Outbound event from the bus to a channel adapter.
///
/// Content is source markup produced upstream and is treated as untrusted
/// text: adapters must escape it fully before embedding in platform markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Target channel identifier.
    pub channel_id: ChannelId,
    /// Reply content in the lightweight markup dialect.
    pub content: String,
    /// Requested adapter action.
    pub intent: OutboundIntent,
}

impl OutboundEvent {
    /// Creates a reply event.
    pub fn new(channel_id: ChannelId, content: impl Into<String>) -> Self {
        Self {
            channel_id,
            content: content.into(),
            intent: OutboundIntent::Reply,
        }
    }

    /// Creates a stop-typing event with no content.
    pub fn stop_typing(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            content: String::new(),
            intent: OutboundIntent::StopTyping,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_event_new_initializes_empty_media_and_metadata() {
        let event = InboundEvent::new(
            ChannelId::new("telegram", "7"),
            SenderId::from("42|alice"),
            "hello",
        );
        assert_eq!(event.channel_id.as_str(), "telegram:7");
        assert_eq!(event.sender_id.as_str(), "42|alice");
        assert_eq!(event.content, "hello");
        assert!(event.media.is_empty());
        assert!(event.metadata.is_none());
    }

    #[test]
    fn inbound_event_builders_attach_media_and_metadata() {
        let event = InboundEvent::new(
            ChannelId::new("telegram", "7"),
            SenderId::from("42"),
            "photo",
        )
        .with_media(vec![PathBuf::from("/tmp/a.jpg")])
        .with_metadata(serde_json::json!({"message_id": 9}));

        assert_eq!(event.media.len(), 1);
        assert_eq!(event.metadata.unwrap()["message_id"], 9);
    }

    #[test]
    fn outbound_event_new_is_reply() {
        let event = OutboundEvent::new(ChannelId::new("telegram", "7"), "hi");
        assert_eq!(event.intent, OutboundIntent::Reply);
        assert_eq!(event.content, "hi");
    }

    #[test]
    fn outbound_stop_typing_has_empty_content() {
        let event = OutboundEvent::stop_typing(ChannelId::new("telegram", "7"));
        assert_eq!(event.intent, OutboundIntent::StopTyping);
        assert!(event.content.is_empty());
    }

    #[test]
    fn events_round_trip_through_json() {
        let event = InboundEvent::new(
            ChannelId::new("telegram", "7"),
            SenderId::from("42"),
            "ping",
        );
        let bytes = serde_json::to_vec(&event).expect("serialize");
        let parsed: InboundEvent = serde_json::from_slice(&bytes).expect("deserialize");
        assert_eq!(parsed.channel_id, event.channel_id);
        assert_eq!(parsed.content, "ping");
    }
}
