//! Bounded worker pool the reactor hands datagrams to, replacing a
//! per-datagram `tokio::spawn` (see `SPEC_FULL.md` REDESIGN FLAGS).
//!
//! Grounded in the teacher's `worker_pool.rs` channel-based job submission
//! and per-worker statistics, stripped of the master/sender thread split and
//! the `recvmmsg`/`sendmmsg` batch-syscall machinery; this framework's
//! reactor already does a plain single-datagram receive, so there's nothing
//! for a batching master thread to feed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, warn};

/// One datagram queued for a worker to process.
pub struct Job {
    pub data: Vec<u8>,
    pub peer: SocketAddr,
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub jobs_processed: AtomicU64,
    pub jobs_dropped: AtomicU64,
}

/// Fixed-size pool of worker tasks fed by a bounded `mpsc` channel. A slow
/// handler stalls at most one worker, never the reactor's receive loop; a
/// flood of datagrams backs up in the channel rather than spawning unbounded
/// tasks, and once the channel is full `submit` drops the newest datagram
/// rather than blocking the reactor.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    pub fn new<F, Fut>(worker_count: usize, channel_capacity: usize, handle: F) -> Self
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(channel_capacity);
        let stats = Arc::new(WorkerStats::default());
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let handle = Arc::new(handle);

        for worker_id in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let handle = handle.clone();
            let stats = stats.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    let Some(job) = job else {
                        break;
                    };
                    handle(job).await;
                    stats.jobs_processed.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!(worker_id, "worker pool task exiting");
            });
        }

        Self { sender, stats }
    }

    /// Enqueues a job without blocking the caller. Returns `false` (and
    /// bumps `jobs_dropped`) if the channel is saturated; the reactor's
    /// receive loop must never stall behind a backlog of slow handlers.
    pub fn try_submit(&self, job: Job) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("worker pool queue full, dropping datagram");
                self.stats.jobs_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("worker pool channel closed, dropping datagram");
                self.stats.jobs_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }
}
