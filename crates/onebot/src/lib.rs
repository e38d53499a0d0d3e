//! OneBot v11 transport.
//!
//! [`OneBotClient`] keeps a WebSocket connection to the endpoint, decodes
//! inbound frames into [`InboundEvent`](mangabot_channels::InboundEvent)s and
//! hands them to an [`EventHandler`](mangabot_channels::EventHandler).
//! [`OneBotOutbound`] is the matching
//! [`NotificationSink`](mangabot_channels::NotificationSink).

pub mod connection;
pub mod error;
pub mod event;
pub mod outbound;

pub use {
    connection::OneBotClient,
    error::{Error, Result},
    event::{Frame, parse_frame},
    outbound::OneBotOutbound,
};
