//! Inbound event routing and command handlers.
//!
//! Every event passes through [`EventRouter::handle_event`]: the self
//! identifier is learned, access is checked, group messages must mention the
//! bot, and the remaining text is parsed and dispatched. Nothing raised by a
//! handler escapes back into the transport: failures are logged and turned into
//! a best-effort reply.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use {
    async_trait::async_trait,
    mangabot_channels::{
        AccessPolicy, EventHandler, InboundEvent, MessageEvent, NotificationSink, ReplyTarget,
    },
    mangabot_downloads::{Artifact, ArtifactStorage, EnqueueOutcome, JobQueue},
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    grammar::{self, Command},
    mention::{SelfIdentity, strip_reply_markers},
    replies,
};

/// File written and delivered by the `test_file` diagnostic.
const TEST_FILE_NAME: &str = "mangabot-test-file.txt";

pub struct EventRouter {
    policy: AccessPolicy,
    queue: Arc<JobQueue>,
    storage: Arc<dyn ArtifactStorage>,
    sink: Arc<dyn NotificationSink>,
    identity: RwLock<Option<SelfIdentity>>,
    version: String,
    scratch_dir: PathBuf,
}

impl EventRouter {
    pub fn new(
        policy: AccessPolicy,
        queue: Arc<JobQueue>,
        storage: Arc<dyn ArtifactStorage>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            policy,
            queue,
            storage,
            sink,
            identity: RwLock::new(None),
            version: env!("CARGO_PKG_VERSION").to_string(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Version string shown by the version command.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Where diagnostics may write temporary files.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// The bot's own identifier, once learned from traffic.
    pub fn self_id(&self) -> Option<String> {
        self.identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|me| me.id().to_string())
    }

    fn learn_self_id(&self, id: &str) {
        if id.is_empty() {
            return;
        }
        {
            let current = self.identity.read().unwrap_or_else(|e| e.into_inner());
            if current.as_ref().is_some_and(|me| me.id() == id) {
                return;
            }
        }
        let mut current = self.identity.write().unwrap_or_else(|e| e.into_inner());
        if current.as_ref().is_some_and(|me| me.id() == id) {
            return;
        }
        info!(self_id = id, previous = ?current.as_ref().map(SelfIdentity::id), "learned self id");
        *current = Some(SelfIdentity::new(id));
    }

    async fn on_private(&self, msg: &MessageEvent) {
        if let Err(reason) = self.policy.check(&msg.sender_id, None, true) {
            warn!(user_id = %msg.sender_id, %reason, "private message denied");
            return;
        }
        info!(user_id = %msg.sender_id, text = %msg.raw_text, "private message");
        let to = ReplyTarget::private(&msg.sender_id);
        self.dispatch(&to, &msg.raw_text).await;
    }

    async fn on_group(&self, msg: &MessageEvent) {
        let group_id = msg.group_id.as_deref().unwrap_or_default();
        if let Err(reason) = self
            .policy
            .check(&msg.sender_id, msg.group_id.as_deref(), false)
        {
            warn!(user_id = %msg.sender_id, group_id, %reason, "group message denied");
            return;
        }

        let text = strip_reply_markers(&msg.raw_text);
        let command_text = {
            let identity = self.identity.read().unwrap_or_else(|e| e.into_inner());
            let Some(me) = identity.as_ref() else {
                warn!(group_id, "self id not learned yet, cannot detect mentions");
                return;
            };
            if !me.is_mentioned(&text) {
                debug!(group_id, self_id = me.id(), "not mentioned, ignoring");
                return;
            }
            me.strip_mentions(&text)
        };

        info!(user_id = %msg.sender_id, group_id, text = %command_text, "group message mentioning bot");
        let to = ReplyTarget::group(&msg.sender_id, group_id);
        self.dispatch(&to, &command_text).await;
    }

    /// Parse `text` and run the command it names, replying to `to`.
    pub async fn dispatch(&self, to: &ReplyTarget, text: &str) {
        let parsed = match grammar::parse(text) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                self.greet_or_ignore(to, text).await;
                return;
            },
            Err(e) => {
                warn!(user_id = %to.user_id, error = %e, "command parse failed");
                self.reply(to, replies::NOT_UNDERSTOOD).await;
                return;
            },
        };

        let kind = parsed.kind;
        let command = match parsed.into_command() {
            Ok(command) => command,
            Err(e) => {
                warn!(user_id = %to.user_id, command = %kind, error = %e, "command validation failed");
                self.reply(to, e.message).await;
                return;
            },
        };

        info!(user_id = %to.user_id, group_id = ?to.group_id, command = %kind, "handling command");
        if let Err(e) = self.run(to, &command).await {
            self.report_failure(to, &command, e).await;
        }
    }

    async fn greet_or_ignore(&self, to: &ReplyTarget, text: &str) {
        let lower = text.to_lowercase();
        if replies::GREETING_KEYWORDS
            .iter()
            .any(|keyword| lower.contains(keyword))
        {
            self.reply(to, replies::GREETING).await;
        } else {
            debug!(user_id = %to.user_id, "no command in message");
        }
    }

    async fn run(&self, to: &ReplyTarget, command: &Command) -> Result<()> {
        match command {
            Command::Help => self.send(to, replies::HELP).await,
            Command::Version => {
                let text = replies::version(&self.version, self.storage.root());
                self.send(to, &text).await
            },
            Command::List => self.list(to).await,
            Command::Exists { album_id } => self.exists(to, album_id).await,
            Command::Fetch { album_id } => self.fetch(to, album_id).await,
            Command::Deliver { album_id } => self.deliver(to, album_id).await,
            Command::Progress => {
                let text = replies::progress(&self.queue.snapshot());
                self.send(to, &text).await
            },
            Command::SelfId => {
                let text = replies::self_id(self.self_id().as_deref());
                self.send(to, &text).await
            },
            Command::TestFile => self.test_file(to).await,
        }
    }

    async fn list(&self, to: &ReplyTarget) -> Result<()> {
        let names = self.with_storage(|s| s.list_artifacts()).await?;
        debug!(count = names.len(), "listing artifacts");
        self.send(to, &replies::artifact_list(&names)).await
    }

    async fn exists(&self, to: &ReplyTarget, album_id: &str) -> Result<()> {
        if self.queue.is_in_flight(album_id) {
            return self.send(to, &replies::in_flight_wait_to_deliver(album_id)).await;
        }
        let found = self.find_artifacts(album_id).await?;
        let text = if found.is_empty() {
            replies::exists_missing(album_id)
        } else {
            replies::exists_found(album_id, &found)
        };
        self.send(to, &text).await
    }

    async fn fetch(&self, to: &ReplyTarget, album_id: &str) -> Result<()> {
        if self.queue.is_in_flight(album_id) {
            return self.send(to, &replies::in_flight(album_id)).await;
        }
        let found = self.find_artifacts(album_id).await?;
        if !found.is_empty() {
            return self.send(to, &replies::already_stored(album_id, &found)).await;
        }

        let text = match self.queue.enqueue(to.clone(), album_id) {
            EnqueueOutcome::Accepted {
                position,
                queued,
                in_flight,
            } => replies::accepted(album_id, position, queued, in_flight),
            EnqueueOutcome::AlreadyQueued { position } => replies::already_queued(album_id, position),
            EnqueueOutcome::AlreadyInFlight => replies::in_flight(album_id),
        };
        self.send(to, &text).await
    }

    async fn deliver(&self, to: &ReplyTarget, album_id: &str) -> Result<()> {
        if self.queue.is_in_flight(album_id) {
            return self.send(to, &replies::in_flight_wait_to_deliver(album_id)).await;
        }
        let id = album_id.to_string();
        let resolved = self
            .with_storage(move |s| {
                Ok(s.resolve_artifact(&id)?.map(|artifact| {
                    let size = artifact.size_bytes();
                    (artifact, size)
                }))
            })
            .await?;
        let Some((artifact, size)) = resolved else {
            return self.send(to, &replies::not_downloaded(album_id)).await;
        };

        self.send(to, &replies::preparing_delivery(album_id, size))
            .await?;
        info!(album_id, path = %artifact.path.display(), user_id = %to.user_id, "delivering artifact");
        self.sink.send_file(to, &artifact.path).await?;
        self.send(to, &replies::delivered(album_id)).await
    }

    async fn test_file(&self, to: &ReplyTarget) -> Result<()> {
        self.send(to, replies::TEST_FILE_START).await?;
        let path = self.scratch_dir.join(TEST_FILE_NAME);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let content = replies::test_file_content(self.self_id().as_deref(), now);
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), "diagnostic file written");
        self.send_file(to, &path).await
    }

    /// Run a storage operation on the blocking pool; directory scans must not
    /// stall the event tasks.
    async fn with_storage<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&dyn ArtifactStorage) -> mangabot_downloads::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        Ok(tokio::task::spawn_blocking(move || op(storage.as_ref())).await??)
    }

    async fn find_artifacts(&self, album_id: &str) -> Result<Vec<Artifact>> {
        let id = album_id.to_string();
        self.with_storage(move |s| s.find_artifacts(&id)).await
    }

    async fn report_failure(&self, to: &ReplyTarget, command: &Command, err: Error) {
        if let Error::Downloads(mangabot_downloads::Error::StorageUnavailable { path }) = &err {
            error!(path = %path.display(), user_id = %to.user_id, "download directory missing");
            self.reply(to, replies::STORAGE_MISSING).await;
            return;
        }
        error!(user_id = %to.user_id, ?command, error = %err, "command failed");
        let what = match command {
            Command::Fetch { .. } => "添加下载任务",
            Command::Deliver { .. } => "发送漫画",
            Command::Progress => "查询下载进度",
            Command::TestFile => "测试文件发送",
            _ => "查询",
        };
        self.reply(to, &replies::handler_failed(what, &err)).await;
    }

    async fn send(&self, to: &ReplyTarget, text: &str) -> Result<()> {
        self.sink.send_text(to, text).await?;
        Ok(())
    }

    async fn send_file(&self, to: &ReplyTarget, path: &Path) -> Result<()> {
        self.sink.send_file(to, path).await?;
        Ok(())
    }

    /// Send a reply, logging (never propagating) a delivery failure.
    async fn reply(&self, to: &ReplyTarget, text: &str) {
        if let Err(e) = self.sink.send_text(to, text).await {
            error!(user_id = %to.user_id, group_id = ?to.group_id, error = %e, "failed to send reply");
        }
    }
}

#[async_trait]
impl EventHandler for EventRouter {
    async fn handle_event(&self, event: InboundEvent) {
        if let Some(id) = event.self_id() {
            self.learn_self_id(id);
        }
        match &event {
            InboundEvent::Meta { detail, .. } => debug!(detail, "meta event"),
            InboundEvent::PrivateMessage(msg) => self.on_private(msg).await,
            InboundEvent::GroupMessage(msg) => self.on_group(msg).await,
        }
    }
}
