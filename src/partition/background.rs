//! The three long-lived background worker loops (§4.F "Background task
//! model", §5, §9): a log appender, a flusher, and a compactor/GC task, each
//! consuming job descriptors off one bounded [`crossbeam::channel`].
//!
//! This crate's write path is synchronous (see [`super::RangePartition::write`]),
//! so "log appender" work happens inline on the caller's thread; the
//! channel here exists for the other two roles — flush and compact/GC —
//! which the partition schedules instead of running inline so a slow flush
//! or compaction never blocks a writer. Three workers (rather than one per
//! role) pull from the same queue, matching §9's "not ad-hoc spawns" intent
//! while keeping the dispatch simple: any worker can service any job kind.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, SendError, Sender, bounded};
use tracing::{debug, error};

use crate::wire::Range;

use super::RangePartition;

/// A unit of deferred work for the background workers.
#[derive(Debug, Clone)]
pub enum Job {
    Flush,
    Compact(Range),
    Gc(u64),
    Shutdown,
}

/// Owns the worker threads and the sending half of their shared job queue.
pub struct BackgroundWorkers {
    sender: Sender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundWorkers {
    /// Spawns three worker threads sharing one bounded job queue of
    /// `queue_capacity` pending jobs.
    pub fn spawn(partition: Arc<RangePartition>, queue_capacity: usize) -> Self {
        let (sender, receiver) = bounded(queue_capacity);
        let handles = (0..3)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let partition = Arc::clone(&partition);
                thread::Builder::new()
                    .name(format!("partition-bg-{worker_id}"))
                    .spawn(move || run_worker(worker_id, partition, receiver))
                    .expect("spawning a background worker thread")
            })
            .collect();
        Self { sender, handles }
    }

    /// Enqueues a job. Fails only if the queue is full or every worker has
    /// already exited.
    pub fn submit(&self, job: Job) -> Result<(), SendError<Job>> {
        self.sender.send(job)
    }

    /// Signals every worker to exit after finishing its current job, then
    /// joins all three threads.
    pub fn shutdown(self) {
        for _ in 0..self.handles.len() {
            let _ = self.sender.send(Job::Shutdown);
        }
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn run_worker(worker_id: usize, partition: Arc<RangePartition>, receiver: Receiver<Job>) {
    for job in receiver.iter() {
        match job {
            Job::Flush => {
                if let Err(err) = partition.flush_oldest_immutable() {
                    error!(worker_id, %err, "background flush failed");
                }
            }
            Job::Compact(range) => {
                if let Err(err) = partition.compact(&range) {
                    error!(worker_id, %err, "background compaction failed");
                }
            }
            Job::Gc(extent_id) => {
                if let Err(err) = partition.run_gc(extent_id) {
                    error!(worker_id, extent_id, %err, "background gc failed");
                }
            }
            Job::Shutdown => break,
        }
    }
    debug!(worker_id, "background worker exiting");
}
