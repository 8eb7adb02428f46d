use crate::clipmap::{ProbeLifecycleTable, UpdateRequest};
use crate::config::TraceServiceConfig;
use crate::error::ClipmapError;
use crate::integrator::{TraceIntegrator, TraceResult, TraceWorkItem};
use crate::scene::TraceScene;

use crossbeam::channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use lucent_core::{CancelToken, Cancelled};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Decides on a worker thread whether a dequeued request should still be traced. Usually
/// [`ProbeLifecycleTable::try_claim`].
pub type ClaimFn = Arc<dyn Fn(&UpdateRequest, u64) -> bool + Send + Sync>;

/// Claims through the scheduler's lifecycle table.
pub fn lifecycle_claim(lifecycle: Arc<ProbeLifecycleTable>) -> ClaimFn {
    Arc::new(move |request, _frame_index| lifecycle.try_claim(request))
}

#[derive(Default)]
struct ServiceCounters {
    enqueued: AtomicU64,
    rejected: AtomicU64,
    claimed: AtomicU64,
    claim_dropped: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TraceServiceStats {
    pub enqueued: u64,
    /// Items refused by [`TraceService::try_enqueue`] because the queue was full.
    pub rejected: u64,
    pub claimed: u64,
    /// Items dropped by a worker because their claim failed.
    pub claim_dropped: u64,
    pub completed: u64,
    /// Traces aborted by shutdown.
    pub cancelled: u64,
}

/// Runs probe traces on background threads.
///
/// The main thread submits [`TraceWorkItem`]s to a bounded queue and polls for [`TraceResult`]s; neither call blocks.
/// Workers claim every item before tracing it, so items for probes that were reset or reselected since they were queued
/// are dropped without doing any work.
pub struct TraceService {
    work_tx: Option<Sender<TraceWorkItem>>,
    result_rx: Receiver<TraceResult>,
    cancel: CancelToken,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<ServiceCounters>,
}

impl TraceService {
    pub fn new<S>(
        config: TraceServiceConfig,
        scene: Arc<S>,
        integrator: TraceIntegrator,
        claim: ClaimFn,
    ) -> Result<Self, ClipmapError>
    where
        S: TraceScene + ?Sized + 'static,
    {
        if config.queue_capacity == 0 {
            return Err(ClipmapError::ZeroQueueCapacity);
        }
        if config.worker_count == 0 {
            return Err(ClipmapError::NoWorkers);
        }

        let (work_tx, work_rx) = bounded(config.queue_capacity);
        let (result_tx, result_rx) = unbounded();
        let mut service = Self {
            work_tx: Some(work_tx),
            result_rx,
            cancel: CancelToken::new(),
            workers: Vec::with_capacity(config.worker_count),
            counters: Arc::new(ServiceCounters::default()),
        };

        for i in 0..config.worker_count {
            let worker = Worker {
                work_rx: work_rx.clone(),
                result_tx: result_tx.clone(),
                scene: Arc::clone(&scene),
                integrator: integrator.clone(),
                claim: Arc::clone(&claim),
                cancel: service.cancel.clone(),
                counters: Arc::clone(&service.counters),
            };
            // On error, dropping `service` stops the workers spawned so far.
            let handle = thread::Builder::new()
                .name(format!("probe-trace-{}", i))
                .spawn(move || worker.run())?;
            service.workers.push(handle);
        }

        log::info!(
            "Started {} probe trace workers with queue capacity {}",
            config.worker_count,
            config.queue_capacity
        );

        Ok(service)
    }

    /// Queues `item` unless the queue is full or the service is shut down. A rejected item's request must be released
    /// back to the scheduler by the caller.
    pub fn try_enqueue(&self, item: TraceWorkItem) -> bool {
        let tx = match &self.work_tx {
            Some(tx) => tx,
            None => return false,
        };
        match tx.try_send(item) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn try_dequeue_result(&self) -> Option<TraceResult> {
        self.result_rx.try_recv().ok()
    }

    /// Items waiting for a worker.
    pub fn pending(&self) -> usize {
        self.work_tx.as_ref().map_or(0, |tx| tx.len())
    }

    pub fn stats(&self) -> TraceServiceStats {
        let c = &self.counters;
        TraceServiceStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            claimed: c.claimed.load(Ordering::Relaxed),
            claim_dropped: c.claim_dropped.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.work_tx.is_none()
    }

    /// Cancels queued and running traces and waits for the workers to exit. Every trace checks for cancellation at each
    /// voxel step, so this returns promptly. Results that were already produced can still be dequeued.
    pub fn shutdown(&mut self) {
        if self.work_tx.is_none() {
            return;
        }
        self.cancel.cancel();
        self.work_tx = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("A probe trace worker panicked");
            }
        }
        log::info!("Probe trace service stopped: {:?}", self.stats());
    }
}

impl Drop for TraceService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker<S: ?Sized> {
    work_rx: Receiver<TraceWorkItem>,
    result_tx: Sender<TraceResult>,
    scene: Arc<S>,
    integrator: TraceIntegrator,
    claim: ClaimFn,
    cancel: CancelToken,
    counters: Arc<ServiceCounters>,
}

impl<S: TraceScene + ?Sized> Worker<S> {
    fn run(self) {
        while let Ok(item) = self.work_rx.recv() {
            if self.cancel.is_cancelled() {
                break;
            }
            if !(self.claim)(&item.request, item.frame_index) {
                log::debug!(
                    "Dropping trace of level {} slot {}: claim failed",
                    item.request.level,
                    item.request.storage_linear_index
                );
                self.counters.claim_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.counters.claimed.fetch_add(1, Ordering::Relaxed);

            match self.integrator.trace_probe(&*self.scene, &item, &self.cancel) {
                Ok(result) => {
                    if self.result_tx.send(result).is_err() {
                        break;
                    }
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(Cancelled) => {
                    self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
