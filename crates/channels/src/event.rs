//! Transport-neutral inbound events.
//!
//! Transports deserialize their wire frames into [`InboundEvent`] and hand
//! them to an [`EventHandler`](crate::EventHandler). Events are immutable once
//! built and are discarded after routing.

/// A chat message addressed to (or overheard by) the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Sender's user identifier.
    pub sender_id: String,
    /// Group identifier; `None` for private messages.
    pub group_id: Option<String>,
    /// Raw message text, including any rich-text markers.
    pub raw_text: String,
    /// The bot's own identifier as reported by the transport, if any.
    pub self_id: Option<String>,
    /// Unix timestamp (seconds) reported by the transport.
    pub time: i64,
}

/// Inbound event delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Heartbeats, lifecycle notices and anything else that is not a chat
    /// message. Only the self identifier hint is of interest.
    Meta {
        self_id: Option<String>,
        detail: String,
    },
    PrivateMessage(MessageEvent),
    GroupMessage(MessageEvent),
}

impl InboundEvent {
    /// Self identifier hint carried by the event, if any.
    pub fn self_id(&self) -> Option<&str> {
        match self {
            Self::Meta { self_id, .. } => self_id.as_deref(),
            Self::PrivateMessage(msg) | Self::GroupMessage(msg) => msg.self_id.as_deref(),
        }
    }

    /// Short label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Meta { .. } => "meta",
            Self::PrivateMessage(_) => "private",
            Self::GroupMessage(_) => "group",
        }
    }
}
