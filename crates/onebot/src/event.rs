//! Inbound OneBot v11 frames.
//!
//! The endpoint pushes two kinds of frames over the same socket: events
//! (carrying `post_type`) and responses to actions we sent (carrying `status`
//! and our `echo`). Ids arrive as numbers from most implementations but are
//! accepted as strings too.

use {
    mangabot_channels::{InboundEvent, MessageEvent},
    serde::Deserialize,
};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(InboundEvent),
    /// Response to an action we sent.
    ActionResponse {
        status: String,
        retcode: i64,
        echo: Option<String>,
    },
    /// Valid JSON we have no use for (e.g. a message event without sender).
    Ignored(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Id {
    Number(i64),
    Text(String),
}

impl Id {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFrame {
    post_type: Option<String>,
    message_type: Option<String>,
    meta_event_type: Option<String>,
    notice_type: Option<String>,
    request_type: Option<String>,
    user_id: Option<Id>,
    group_id: Option<Id>,
    raw_message: Option<String>,
    self_id: Option<Id>,
    time: Option<i64>,
    /// A string on action responses; an object on heartbeats.
    status: Option<serde_json::Value>,
    retcode: Option<i64>,
    echo: Option<serde_json::Value>,
}

/// Decode one text frame.
pub fn parse_frame(text: &str) -> serde_json::Result<Frame> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let self_id = raw.self_id.map(Id::into_string);

    let Some(post_type) = raw.post_type else {
        let echo = raw.echo.map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        return Ok(match raw.status.as_ref().and_then(serde_json::Value::as_str) {
            Some(status) => Frame::ActionResponse {
                status: status.to_string(),
                retcode: raw.retcode.unwrap_or_default(),
                echo,
            },
            None => Frame::Ignored("frame without post_type or status".into()),
        });
    };

    let meta = |detail: String| {
        Frame::Event(InboundEvent::Meta {
            self_id: self_id.clone(),
            detail,
        })
    };

    match post_type.as_str() {
        "message" => {
            let Some(sender_id) = raw.user_id.map(Id::into_string) else {
                return Ok(Frame::Ignored("message without user_id".into()));
            };
            let message = MessageEvent {
                sender_id,
                group_id: raw.group_id.map(Id::into_string),
                raw_text: raw.raw_message.unwrap_or_default(),
                self_id: self_id.clone(),
                time: raw.time.unwrap_or_default(),
            };
            Ok(match raw.message_type.as_deref() {
                Some("private") => Frame::Event(InboundEvent::PrivateMessage(message)),
                Some("group") if message.group_id.is_some() => {
                    Frame::Event(InboundEvent::GroupMessage(message))
                },
                Some("group") => Frame::Ignored("group message without group_id".into()),
                other => meta(format!("message/{}", other.unwrap_or("unknown"))),
            })
        },
        "meta_event" => Ok(meta(format!(
            "meta_event/{}",
            raw.meta_event_type.as_deref().unwrap_or("unknown")
        ))),
        "notice" => Ok(meta(format!(
            "notice/{}",
            raw.notice_type.as_deref().unwrap_or("unknown")
        ))),
        "request" => Ok(meta(format!(
            "request/{}",
            raw.request_type.as_deref().unwrap_or("unknown")
        ))),
        other => Ok(meta(other.to_string())),
    }
}
