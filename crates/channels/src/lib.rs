//! Boundary types shared by the bot core and its transports.
//!
//! Transports turn wire frames into [`InboundEvent`]s, feed them to an
//! [`EventHandler`], and implement [`NotificationSink`] for replies.
//! [`gating::AccessPolicy`] decides which senders are served at all.

pub mod error;
pub mod event;
pub mod gating;
pub mod sink;

pub use {
    error::{Error, Result},
    event::{InboundEvent, MessageEvent},
    gating::{AccessDenied, AccessPolicy},
    sink::{EventHandler, NotificationSink, ReplyTarget},
};
