//! Tells requesters how their download ended.

use std::sync::Arc;

use {
    async_trait::async_trait,
    mangabot_channels::NotificationSink,
    mangabot_downloads::{Artifact, Error as DownloadError, Job, JobListener},
    tracing::{debug, warn},
};

use crate::replies;

/// [`JobListener`] that messages the original requester.
pub struct CompletionNotifier {
    sink: Arc<dyn NotificationSink>,
    on_completion: bool,
    on_failure: bool,
}

impl CompletionNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            on_completion: true,
            on_failure: true,
        }
    }

    pub fn on_completion(mut self, enabled: bool) -> Self {
        self.on_completion = enabled;
        self
    }

    pub fn on_failure(mut self, enabled: bool) -> Self {
        self.on_failure = enabled;
        self
    }

    async fn notify(&self, job: &Job, text: &str) {
        if let Err(e) = self.sink.send_text(&job.requester, text).await {
            warn!(
                album_id = %job.album_id,
                user_id = %job.requester.user_id,
                error = %e,
                "failed to notify requester"
            );
        }
    }
}

#[async_trait]
impl JobListener for CompletionNotifier {
    async fn job_completed(&self, job: &Job, artifacts: &[Artifact]) {
        debug!(album_id = %job.album_id, artifacts = artifacts.len(), "job completed");
        if self.on_completion {
            self.notify(job, &replies::download_ready(&job.album_id)).await;
        }
    }

    async fn job_failed(&self, job: &Job, error: &DownloadError) {
        debug!(album_id = %job.album_id, %error, "job failed");
        if self.on_failure {
            self.notify(job, &replies::download_failed(&job.album_id)).await;
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::Mutex,
    };

    use mangabot_channels::ReplyTarget;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        texts: Mutex<Vec<(ReplyTarget, String)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send_text(&self, to: &ReplyTarget, text: &str) -> mangabot_channels::Result<()> {
            self.texts
                .lock()
                .unwrap()
                .push((to.clone(), text.to_string()));
            Ok(())
        }

        async fn send_file(&self, _to: &ReplyTarget, _path: &Path) -> mangabot_channels::Result<()> {
            Ok(())
        }
    }

    fn job() -> Job {
        Job {
            album_id: "350234".into(),
            requester: ReplyTarget::group("7", "g1"),
            enqueued_at_ms: 0,
        }
    }

    fn artifact() -> Artifact {
        Artifact {
            name: "350234-title".into(),
            path: PathBuf::from("/dl/350234-title.pdf"),
        }
    }

    #[tokio::test]
    async fn notifies_requester_on_both_outcomes() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = CompletionNotifier::new(Arc::clone(&sink) as Arc<dyn NotificationSink>);

        notifier.job_completed(&job(), &[artifact()]).await;
        notifier
            .job_failed(&job(), &DownloadError::fetch("350234", "boom"))
            .await;

        let texts = sink.texts.lock().unwrap().clone();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].0, ReplyTarget::group("7", "g1"));
        assert!(texts[0].1.contains("下载完成"));
        assert!(texts[1].1.contains("下载失败"));
    }

    #[tokio::test]
    async fn notifications_can_be_disabled() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = CompletionNotifier::new(Arc::clone(&sink) as Arc<dyn NotificationSink>)
            .on_completion(false)
            .on_failure(false);

        notifier.job_completed(&job(), &[artifact()]).await;
        notifier
            .job_failed(&job(), &DownloadError::NoArtifact {
                album_id: "350234".into(),
            })
            .await;

        assert!(sink.texts.lock().unwrap().is_empty());
    }
}
