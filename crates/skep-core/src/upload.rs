//! Tiered shard upload manager.
//!
//! Work flows through a bounded job queue into a fixed pool of worker
//! threads; per-shard outcomes flow back over an event channel that the
//! caller drains on its own thread in [`UploadManager::wait`]. All tallies
//! and manifest bookkeeping therefore happen single-threaded, on the
//! caller's side.
//!
//! Each shard starts on the tier its size asks for: small shards go up in
//! one request, large ones through the multipart path. Transient failures
//! retry with capped exponential backoff; a shard stuck on the single
//! tier escalates to multipart after repeated failures.

use std::io::Cursor;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use skep_store::retry::{backoff_delay, RetryPolicy};
use skep_store::RemoteStore;
use skep_types::{CancelFlag, Result, Sha1Hash, ShardId, SkepError, UploadId};

use crate::compress::Compression;
use crate::config::UploadConfig;
use crate::crypto::CryptoEngine;
use crate::sharder::ShardPlan;
use crate::vault::encode_shard_payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTier {
    /// One PUT per shard.
    Single,
    /// Multipart upload with parallel part connections.
    Multi,
}

impl std::fmt::Display for UploadTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadTier::Single => write!(f, "single"),
            UploadTier::Multi => write!(f, "multi"),
        }
    }
}

/// Per-shard lifecycle notifications, delivered in completion order to the
/// single consumer inside [`UploadManager::wait`].
#[derive(Debug)]
pub enum UploadEvent {
    Begin {
        upload_id: UploadId,
        file_name: String,
        piece_number: i64,
        length: u64,
        tier: UploadTier,
    },
    /// A shard moved to another tier between attempts.
    TierChanged {
        upload_id: UploadId,
        file_name: String,
        piece_number: i64,
        tier: UploadTier,
    },
    /// Terminal: the shard is durably stored.
    Finished {
        upload_id: UploadId,
        file_name: String,
        piece_number: i64,
        shard_id: ShardId,
        sha1: Sha1Hash,
        plaintext_length: u64,
        stored_length: u64,
    },
    /// Terminal: the shard gave up (permanent error, retries exhausted, or
    /// the run was cancelled).
    Failed {
        upload_id: UploadId,
        file_name: String,
        piece_number: i64,
        error: SkepError,
    },
}

/// Tally of one upload run, owned by the event consumer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadRunStats {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Plaintext bytes of successfully stored shards.
    pub plaintext_bytes: u64,
    /// Encoded bytes actually sent for successfully stored shards.
    pub stored_bytes: u64,
}

struct UploadJob {
    upload_id: UploadId,
    file_name: String,
    plan: ShardPlan,
}

/// Everything a worker needs, shared read-only across the pool.
struct UploadContext {
    store: Arc<dyn RemoteStore>,
    crypto: Arc<dyn CryptoEngine>,
    compression: Compression,
    config: UploadConfig,
    retry: RetryPolicy,
    cancel: CancelFlag,
}

pub struct UploadManager {
    ctx: Arc<UploadContext>,
    work_tx: Option<Sender<UploadJob>>,
    work_rx: Option<Receiver<UploadJob>>,
    event_rx: Receiver<UploadEvent>,
    event_tx: Option<Sender<UploadEvent>>,
    workers: Vec<JoinHandle<()>>,
    next_upload_id: u64,
}

impl UploadManager {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        crypto: Arc<dyn CryptoEngine>,
        compression: Compression,
        config: UploadConfig,
        cancel: CancelFlag,
    ) -> Self {
        let retry = config.retry_policy();
        let (work_tx, work_rx) = crossbeam_channel::bounded(config.effective_queue_depth());
        // Events are small and the consumer may not start draining until
        // the producer is done adding, so this channel must not apply
        // backpressure to workers.
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        UploadManager {
            ctx: Arc::new(UploadContext {
                store,
                crypto,
                compression,
                config,
                retry,
                cancel,
            }),
            work_tx: Some(work_tx),
            work_rx: Some(work_rx),
            event_rx,
            event_tx: Some(event_tx),
            workers: Vec::new(),
            next_upload_id: 0,
        }
    }

    /// Start the worker pool. Must be called before the bounded job queue
    /// can drain, so call it before adding more shards than the queue holds.
    pub fn execute(&mut self) {
        let (work_rx, event_tx) = match (self.work_rx.take(), self.event_tx.take()) {
            (Some(rx), Some(tx)) => (rx, tx),
            _ => return, // already started
        };
        for _ in 0..self.ctx.config.workers.max(1) {
            let ctx = Arc::clone(&self.ctx);
            let rx = work_rx.clone();
            let tx = event_tx.clone();
            self.workers.push(std::thread::spawn(move || {
                for job in rx {
                    run_job(&ctx, job, &tx);
                }
            }));
        }
        // Drop originals so both channels disconnect once the queue is
        // sealed and every worker has exited.
        drop(work_rx);
        drop(event_tx);
    }

    /// Queue one shard for upload. Blocks while the job queue is full;
    /// workers keep draining (and fast-failing) jobs after cancellation, so
    /// this never blocks indefinitely.
    pub fn add_lazy_shard(&mut self, file_name: &str, plan: ShardPlan) -> Result<UploadId> {
        let tx = self
            .work_tx
            .as_ref()
            .ok_or_else(|| SkepError::Other("upload queue already sealed".into()))?;
        let upload_id = UploadId(self.next_upload_id);
        self.next_upload_id += 1;
        tx.send(UploadJob {
            upload_id,
            file_name: file_name.to_string(),
            plan,
        })
        .map_err(|_| SkepError::Other("upload workers exited early".into()))?;
        Ok(upload_id)
    }

    /// No more shards will be added. Workers finish the queue and exit.
    pub fn seal(&mut self) {
        self.work_tx = None;
    }

    /// Drain events on the calling thread until every worker is done, then
    /// join the pool. `on_event` sees every event in delivery order; the
    /// returned stats are tallied here, on this single thread.
    pub fn wait(mut self, mut on_event: impl FnMut(&UploadEvent)) -> Result<UploadRunStats> {
        self.seal();
        if self.workers.is_empty() {
            self.execute();
        }
        let mut stats = UploadRunStats::default();
        for event in &self.event_rx {
            match &event {
                UploadEvent::Finished {
                    plaintext_length,
                    stored_length,
                    ..
                } => {
                    stats.succeeded += 1;
                    stats.plaintext_bytes += plaintext_length;
                    stats.stored_bytes += stored_length;
                }
                UploadEvent::Failed { error, .. } => {
                    if error.is_cancelled() {
                        stats.cancelled += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
                UploadEvent::Begin { .. } | UploadEvent::TierChanged { .. } => {}
            }
            on_event(&event);
        }
        for handle in self.workers.drain(..) {
            handle
                .join()
                .map_err(|_| SkepError::Other("upload worker panicked".into()))?;
        }
        Ok(stats)
    }
}

fn initial_tier(config: &UploadConfig, plaintext_length: u64) -> UploadTier {
    if plaintext_length >= config.multi_threshold_bytes() {
        UploadTier::Multi
    } else {
        UploadTier::Single
    }
}

fn upload_once(ctx: &UploadContext, tier: UploadTier, name: &str, encoded: &[u8]) -> Result<()> {
    match tier {
        UploadTier::Single => ctx.store.upload_single(name, encoded).map(|_| ()),
        UploadTier::Multi => {
            let mut reader = Cursor::new(encoded);
            ctx.store
                .upload_multipart(
                    name,
                    &mut reader,
                    encoded.len() as u64,
                    ctx.config.multi_part_size_bytes(),
                    ctx.config.multi_connections,
                )
                .map(|_| ())
        }
    }
}

fn run_job(ctx: &UploadContext, job: UploadJob, events: &Sender<UploadEvent>) {
    let fail = |error: SkepError| {
        let _ = events.send(UploadEvent::Failed {
            upload_id: job.upload_id,
            file_name: job.file_name.clone(),
            piece_number: job.plan.piece_number,
            error,
        });
    };

    if ctx.cancel.is_cancelled() {
        fail(SkepError::Cancelled);
        return;
    }

    let mut tier = initial_tier(&ctx.config, job.plan.length);
    let _ = events.send(UploadEvent::Begin {
        upload_id: job.upload_id,
        file_name: job.file_name.clone(),
        piece_number: job.plan.piece_number,
        length: job.plan.length,
        tier,
    });

    // Materialize once; retries reuse the payload. A read error means the
    // source changed under us and fails the shard outright.
    let shard = match job.plan.materialize() {
        Ok(shard) => shard,
        Err(err) => {
            fail(err);
            return;
        }
    };
    let encoded = match encode_shard_payload(ctx.compression, ctx.crypto.as_ref(), &shard.payload) {
        Ok(encoded) => encoded,
        Err(err) => {
            fail(err);
            return;
        }
    };
    let name = shard.id.as_object_name();

    let mut last_err: Option<SkepError> = None;
    for attempt in 0..ctx.retry.max_attempts {
        if attempt > 0 {
            if !ctx.cancel.sleep(backoff_delay(&ctx.retry, attempt - 1)) {
                fail(SkepError::Cancelled);
                return;
            }
            if tier == UploadTier::Single && attempt >= ctx.config.escalate_after {
                tier = UploadTier::Multi;
                debug!(
                    shard = %shard.id,
                    attempt,
                    "escalating shard to multipart tier"
                );
                let _ = events.send(UploadEvent::TierChanged {
                    upload_id: job.upload_id,
                    file_name: job.file_name.clone(),
                    piece_number: job.plan.piece_number,
                    tier,
                });
            }
        }
        if ctx.cancel.is_cancelled() {
            fail(SkepError::Cancelled);
            return;
        }
        match upload_once(ctx, tier, &name, &encoded) {
            Ok(()) => {
                let _ = events.send(UploadEvent::Finished {
                    upload_id: job.upload_id,
                    file_name: job.file_name.clone(),
                    piece_number: job.plan.piece_number,
                    shard_id: shard.id,
                    sha1: shard.sha1,
                    plaintext_length: shard.length as u64,
                    stored_length: encoded.len() as u64,
                });
                return;
            }
            Err(err) if err.is_transient() && attempt + 1 < ctx.retry.max_attempts => {
                warn!(
                    shard = %shard.id,
                    attempt = attempt + 1,
                    error = %err,
                    "shard upload failed; retrying"
                );
                last_err = Some(err);
            }
            Err(err) => {
                fail(err);
                return;
            }
        }
    }
    // Unreachable: the final attempt always returns above.
    fail(last_err.unwrap());
}
