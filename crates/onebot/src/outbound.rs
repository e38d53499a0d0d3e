//! Outbound actions (`send_private_msg` / `send_group_msg`).

use std::{
    path::Path,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    mangabot_channels::{Error, NotificationSink, ReplyTarget, Result},
    serde_json::{Value, json},
    tokio::sync::mpsc,
    tracing::{debug, info},
};

/// Handle for sending actions over the current connection.
///
/// Cheap to clone. While the socket is down every send fails with
/// [`Error::Unavailable`]; nothing is buffered for the next connection.
#[derive(Clone, Default)]
pub struct OneBotOutbound {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    writer: RwLock<Option<mpsc::UnboundedSender<String>>>,
    next_echo: AtomicU64,
}

impl OneBotOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .writer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub(crate) fn attach(&self, writer: mpsc::UnboundedSender<String>) {
        *self.inner.writer.write().unwrap_or_else(|e| e.into_inner()) = Some(writer);
    }

    pub(crate) fn detach(&self) {
        self.inner
            .writer
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    fn send_action(&self, frame: Value) -> Result<()> {
        let text = serde_json::to_string(&frame)?;
        let guard = self.inner.writer.read().unwrap_or_else(|e| e.into_inner());
        let Some(writer) = guard.as_ref() else {
            return Err(Error::unavailable("OneBot connection is not established"));
        };
        writer
            .send(text)
            .map_err(|_| Error::unavailable("OneBot connection closed"))
    }

    fn next_echo(&self) -> String {
        let n = self.inner.next_echo.fetch_add(1, Ordering::Relaxed);
        format!("mangabot-{n}")
    }
}

/// Build a `send_*_msg` action frame for `to`.
pub fn message_action(to: &ReplyTarget, message: Value, echo: &str) -> Result<Value> {
    if to.private {
        return Ok(json!({
            "action": "send_private_msg",
            "params": { "user_id": wire_id(&to.user_id), "message": message },
            "echo": echo,
        }));
    }
    let Some(group_id) = to.group_id.as_deref() else {
        return Err(Error::invalid_input("group reply target without group id"));
    };
    Ok(json!({
        "action": "send_group_msg",
        "params": { "group_id": wire_id(group_id), "message": message },
        "echo": echo,
    }))
}

/// Message segments delivering a local file by absolute path.
pub fn file_segments(path: &Path) -> Value {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    json!([{
        "type": "file",
        "data": { "file": path.to_string_lossy(), "name": name },
    }])
}

/// Numeric ids go out as numbers, anything else verbatim.
fn wire_id(id: &str) -> Value {
    id.parse::<i64>()
        .map_or_else(|_| Value::String(id.to_string()), Value::from)
}

#[async_trait]
impl NotificationSink for OneBotOutbound {
    async fn send_text(&self, to: &ReplyTarget, text: &str) -> Result<()> {
        let echo = self.next_echo();
        let frame = message_action(to, Value::String(text.to_string()), &echo)?;
        self.send_action(frame)?;
        debug!(user_id = %to.user_id, group_id = ?to.group_id, echo = %echo, len = text.len(), "text queued");
        Ok(())
    }

    async fn send_file(&self, to: &ReplyTarget, path: &Path) -> Result<()> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::file_not_deliverable(path.display(), e))?;
        if !metadata.is_file() {
            return Err(Error::file_not_deliverable(path.display(), "not a regular file"));
        }
        let absolute = std::path::absolute(path)
            .map_err(|e| Error::file_not_deliverable(path.display(), e))?;

        let echo = self.next_echo();
        let frame = message_action(to, file_segments(&absolute), &echo)?;
        self.send_action(frame)?;
        info!(
            user_id = %to.user_id,
            group_id = ?to.group_id,
            echo = %echo,
            file = ?absolute.file_name(),
            bytes = metadata.len(),
            "file queued"
        );
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn private_action_uses_numeric_user_id() {
        let frame = message_action(&ReplyTarget::private("42"), json!("hi"), "e1").unwrap();
        assert_eq!(
            frame,
            json!({
                "action": "send_private_msg",
                "params": { "user_id": 42, "message": "hi" },
                "echo": "e1",
            })
        );
    }

    #[test]
    fn group_action_targets_group() {
        let frame =
            message_action(&ReplyTarget::group("42", "g-room"), json!("hi"), "e2").unwrap();
        assert_eq!(frame["action"], "send_group_msg");
        assert_eq!(frame["params"]["group_id"], "g-room");
        assert!(frame["params"].get("user_id").is_none());
    }

    #[test]
    fn group_target_without_group_is_invalid() {
        let to = ReplyTarget {
            user_id: "1".into(),
            group_id: None,
            private: false,
        };
        assert!(matches!(
            message_action(&to, json!("x"), "e"),
            Err(Error::InvalidInput { .. })
        ));
    }

    #[test]
    fn file_segment_shape() {
        let segs = file_segments(&PathBuf::from("/srv/dl/350234-title.pdf"));
        assert_eq!(
            segs,
            json!([{
                "type": "file",
                "data": { "file": "/srv/dl/350234-title.pdf", "name": "350234-title.pdf" },
            }])
        );
    }

    #[tokio::test]
    async fn sending_while_disconnected_fails() {
        let out = OneBotOutbound::new();
        assert!(!out.is_connected());
        assert!(matches!(
            out.send_text(&ReplyTarget::private("1"), "hi").await,
            Err(Error::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn frames_go_to_attached_writer() {
        let out = OneBotOutbound::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        out.attach(tx);
        assert!(out.is_connected());

        out.send_text(&ReplyTarget::private("1"), "a").await.unwrap();
        out.send_text(&ReplyTarget::private("1"), "b").await.unwrap();
        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["params"]["message"], "a");
        assert_ne!(first["echo"], second["echo"]);

        out.detach();
        assert!(out.send_text(&ReplyTarget::private("1"), "c").await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_not_deliverable() {
        let out = OneBotOutbound::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        out.attach(tx);
        let dir = tempfile::tempdir().unwrap();

        let err = out
            .send_file(&ReplyTarget::private("1"), &dir.path().join("absent.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileNotDeliverable { .. }));
        assert!(rx.try_recv().is_err());

        let pdf = dir.path().join("9.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        out.send_file(&ReplyTarget::group("1", "2"), &pdf).await.unwrap();
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["params"]["group_id"], 2);
        assert_eq!(frame["params"]["message"][0]["data"]["name"], "9.pdf");
    }
}
