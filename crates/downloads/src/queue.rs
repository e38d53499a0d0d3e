//! Single-consumer FIFO of download jobs.
//!
//! The queue owns all scheduling state: the ordered list of waiting jobs and
//! the (at most one) job currently being fetched. An album id is never both
//! queued and in flight, and a second request for an id already present in
//! either place is rejected instead of queued twice.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    mangabot_channels::ReplyTarget,
    tokio::sync::Notify,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

/// A queued fetch request. The album id is the identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub album_id: String,
    /// Who asked for it, and where to report back.
    pub requester: ReplyTarget,
    pub enqueued_at_ms: u64,
}

/// Result of [`JobQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended to the tail. `position` is 1-based and computed once, at
    /// enqueue time; `queued` and `in_flight` are the counts right after the
    /// append.
    Accepted {
        position: usize,
        queued: usize,
        in_flight: usize,
    },
    AlreadyQueued {
        position: usize,
    },
    AlreadyInFlight,
}

/// Point-in-time view for progress reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub in_flight: Vec<String>,
    /// FIFO order.
    pub queued: Vec<String>,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty() && self.queued.is_empty()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    queued: VecDeque<Job>,
    in_flight: Option<Job>,
}

impl QueueState {
    fn position(&self, album_id: &str) -> Option<usize> {
        self.queued
            .iter()
            .position(|job| job.album_id == album_id)
            .map(|idx| idx + 1)
    }

    fn is_in_flight(&self, album_id: &str) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|job| job.album_id == album_id)
    }
}

/// Thread-safe FIFO shared by the router (producers) and the download worker
/// (single consumer).
pub struct JobQueue {
    state: Mutex<QueueState>,
    wake: Notify,
    shutdown: CancellationToken,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enqueue(&self, requester: ReplyTarget, album_id: &str) -> EnqueueOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.is_in_flight(album_id) {
                return EnqueueOutcome::AlreadyInFlight;
            }
            if let Some(position) = state.position(album_id) {
                return EnqueueOutcome::AlreadyQueued { position };
            }
            state.queued.push_back(Job {
                album_id: album_id.to_string(),
                requester,
                enqueued_at_ms: now_ms(),
            });
            let queued = state.queued.len();
            EnqueueOutcome::Accepted {
                position: queued,
                queued,
                in_flight: usize::from(state.in_flight.is_some()),
            }
        };
        info!(album_id, ?outcome, "download job queued");
        self.wake.notify_one();
        outcome
    }

    pub fn is_in_flight(&self, album_id: &str) -> bool {
        self.lock().is_in_flight(album_id)
    }

    /// 1-based FIFO position, or `None` if the id is not waiting.
    pub fn queue_position(&self, album_id: &str) -> Option<usize> {
        self.lock().position(album_id)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        QueueSnapshot {
            in_flight: state
                .in_flight
                .iter()
                .map(|job| job.album_id.clone())
                .collect(),
            queued: state.queued.iter().map(|job| job.album_id.clone()).collect(),
        }
    }

    /// Ask the consumer to stop after its current job. Never interrupts a
    /// fetch that is already running.
    pub fn stop(&self) {
        info!("download queue stopping");
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Pop the head of the queue and mark it in flight, atomically.
    ///
    /// Returns `None` if the queue is empty or a job is already in flight.
    /// Only the single consumer calls this; pair it with [`JobQueue::finish`].
    pub fn start_next(&self) -> Option<Job> {
        let mut state = self.lock();
        if state.in_flight.is_some() {
            return None;
        }
        let job = state.queued.pop_front()?;
        state.in_flight = Some(job.clone());
        Some(job)
    }

    /// Clear the in-flight mark for `album_id`.
    pub fn finish(&self, album_id: &str) {
        let mut state = self.lock();
        if state.is_in_flight(album_id) {
            state.in_flight = None;
        }
    }

    /// Wait for the next job, re-checking at least every `poll_interval` so a
    /// stop request is observed promptly. Returns `None` once stopped.
    pub(crate) async fn next_job(&self, poll_interval: Duration) -> Option<Job> {
        loop {
            if self.is_stopped() {
                return None;
            }
            if let Some(job) = self.start_next() {
                return Some(job);
            }
            tokio::select! {
                () = self.wake.notified() => {},
                () = tokio::time::sleep(poll_interval) => {},
                () = self.shutdown.cancelled() => {
                    debug!("queue wait interrupted by stop");
                },
            }
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn alice() -> ReplyTarget {
        ReplyTarget::private("alice")
    }

    #[test]
    fn accepted_reports_position_and_counts() {
        let queue = JobQueue::new();
        assert_eq!(
            queue.enqueue(alice(), "100"),
            EnqueueOutcome::Accepted {
                position: 1,
                queued: 1,
                in_flight: 0
            }
        );
        assert_eq!(
            queue.enqueue(alice(), "200"),
            EnqueueOutcome::Accepted {
                position: 2,
                queued: 2,
                in_flight: 0
            }
        );
    }

    #[test]
    fn duplicate_enqueue_is_rejected() {
        let queue = JobQueue::new();
        queue.enqueue(alice(), "350234");
        assert_eq!(
            queue.enqueue(ReplyTarget::group("bob", "g1"), "350234"),
            EnqueueOutcome::AlreadyQueued { position: 1 }
        );
        assert_eq!(queue.snapshot().queued.len(), 1);
    }

    #[test]
    fn in_flight_enqueue_is_rejected() {
        let queue = JobQueue::new();
        queue.enqueue(alice(), "1");
        let job = queue.start_next().unwrap();
        assert_eq!(job.album_id, "1");
        assert!(queue.is_in_flight("1"));
        assert_eq!(queue.queue_position("1"), None);
        assert_eq!(queue.enqueue(alice(), "1"), EnqueueOutcome::AlreadyInFlight);

        // A new id queued behind the running one sees one job in flight.
        assert_eq!(
            queue.enqueue(alice(), "2"),
            EnqueueOutcome::Accepted {
                position: 1,
                queued: 1,
                in_flight: 1
            }
        );
    }

    #[test]
    fn at_most_one_in_flight() {
        let queue = JobQueue::new();
        queue.enqueue(alice(), "1");
        queue.enqueue(alice(), "2");
        assert!(queue.start_next().is_some());
        assert!(queue.start_next().is_none());
        queue.finish("1");
        assert_eq!(queue.start_next().unwrap().album_id, "2");
    }

    #[test]
    fn finish_clears_in_flight() {
        let queue = JobQueue::new();
        queue.enqueue(alice(), "9");
        queue.start_next();
        queue.finish("9");
        assert!(!queue.is_in_flight("9"));
        assert!(queue.snapshot().is_empty());
        // Unknown ids are ignored.
        queue.finish("nope");
    }

    #[test]
    fn snapshot_is_fifo() {
        let queue = JobQueue::new();
        for id in ["3", "1", "2"] {
            queue.enqueue(alice(), id);
        }
        queue.start_next();
        let snap = queue.snapshot();
        assert_eq!(snap.in_flight, vec!["3"]);
        assert_eq!(snap.queued, vec!["1", "2"]);
        assert_eq!(queue.queue_position("2"), Some(2));
    }

    #[test]
    fn concurrent_enqueue_accepts_once() {
        let queue = JobQueue::new();
        let outcomes: Vec<EnqueueOutcome> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..16)
                .map(|n| {
                    let queue = &queue;
                    scope.spawn(move || queue.enqueue(ReplyTarget::private(n.to_string()), "5"))
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let accepted = outcomes
            .iter()
            .filter(|o| matches!(o, EnqueueOutcome::Accepted { .. }))
            .count();
        assert_eq!(accepted, 1);
        assert!(
            outcomes
                .iter()
                .all(|o| matches!(o, EnqueueOutcome::Accepted { .. } | EnqueueOutcome::AlreadyQueued { position: 1 }))
        );
        assert_eq!(queue.snapshot().queued, vec!["5"]);
    }

    #[tokio::test]
    async fn next_job_wakes_on_enqueue() {
        let queue = Arc::new(JobQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next_job(Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;
        queue.enqueue(alice(), "42");
        let job = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(job.album_id, "42");
        assert!(queue.is_in_flight("42"));
    }

    #[tokio::test]
    async fn next_job_returns_none_after_stop() {
        let queue = Arc::new(JobQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next_job(Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;
        queue.stop();
        let got = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(got.is_none());
        // Stopped queues do not hand out new jobs.
        queue.enqueue(alice(), "1");
        assert!(queue.next_job(Duration::from_millis(10)).await.is_none());
    }
}
