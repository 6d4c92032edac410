//! Fixed-size worker pool over one bounded job queue.
//!
//! `workers` long-lived tasks share the receiving end of a bounded
//! `tokio::sync::mpsc` channel. Each dequeued job runs its whole chain on the
//! blocking thread pool and answers through its own one-shot channel, so no
//! state is shared between jobs.
//!
//! Job lifecycle: submitted → queued → running → completed | failed. There is
//! no cancellation: once a worker holds a job it runs to the end.

use super::PipelineError;
use crate::imaging::{Operation, TransformBackend};
use image::{DynamicImage, ImageFormat};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const DEFAULT_QUEUE_SIZE: usize = 64;

type Reply = Result<DynamicImage, PipelineError>;

/// Pool sizing, fixed for the lifetime of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

/// One unit of work: a decoded image and the chain to run on it.
pub struct Job {
    pub image: DynamicImage,
    pub format: ImageFormat,
    pub operations: Vec<Operation>,
    reply: oneshot::Sender<Reply>,
}

impl Job {
    /// Create a job and the handle its result will arrive on.
    pub fn new(
        image: DynamicImage,
        format: ImageFormat,
        operations: Vec<Operation>,
    ) -> (Self, JobHandle) {
        let (reply, rx) = oneshot::channel();
        let job = Self {
            image,
            format,
            operations,
            reply,
        };
        (job, JobHandle { rx })
    }
}

/// Receiving side of a job's single result.
pub struct JobHandle {
    rx: oneshot::Receiver<Reply>,
}

impl JobHandle {
    /// Wait for the job to complete or fail.
    pub async fn result(self) -> Reply {
        self.rx.await.map_err(|_| PipelineError::WorkerLost)?
    }
}

pub struct WorkerPool {
    config: PoolConfig,
    sender: StdMutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn the workers. Must be called from within a tokio runtime.
    ///
    /// Zero workers or a zero-length queue are raised to one.
    pub fn new(config: PoolConfig, backend: Arc<dyn TransformBackend>) -> Self {
        let config = PoolConfig {
            workers: config.workers.max(1),
            queue_size: config.queue_size.max(1),
        };
        let (tx, rx) = mpsc::channel(config.queue_size);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers)
            .map(|index| tokio::spawn(run_worker(index, rx.clone(), backend.clone())))
            .collect();

        info!(
            workers = config.workers,
            queue_size = config.queue_size,
            "worker pool started"
        );

        Self {
            config,
            sender: StdMutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// True once [`WorkerPool::wait`] has closed the queue.
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(mpsc::Sender::is_closed)
    }

    /// Queue a job, suspending while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<(), PipelineError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PipelineError::PoolClosed)?;
        sender
            .send(job)
            .await
            .map_err(|_| PipelineError::PoolClosed)
    }

    /// Close the queue, let the workers drain it, and join them.
    ///
    /// Submissions racing with `wait` either land before the queue closes and
    /// are processed, or fail with [`PipelineError::PoolClosed`].
    pub async fn wait(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handles = std::mem::take(&mut *self.workers.lock().await);
        if handles.is_empty() {
            return;
        }
        for (index, handle) in handles.into_iter().enumerate() {
            if let Err(err) = handle.await {
                warn!(worker = index, "worker exited abnormally: {}", err);
            }
        }
        info!("worker pool drained");
    }
}

async fn run_worker(
    index: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    backend: Arc<dyn TransformBackend>,
) {
    loop {
        // Lock only for the dequeue so other workers can pick up the next job
        let next = queue.lock().await.recv().await;
        let Some(job) = next else { break };

        let Job {
            image,
            format,
            operations,
            reply,
        } = job;
        debug!(worker = index, steps = operations.len(), ?format, "job started");

        let backend = backend.clone();
        let result =
            match tokio::task::spawn_blocking(move || backend.apply_chain(image, &operations))
                .await
            {
                Ok(outcome) => outcome.map_err(PipelineError::from),
                Err(err) => Err(PipelineError::WorkerPanicked(err.to_string())),
            };

        debug!(worker = index, ok = result.is_ok(), "job finished");
        if reply.send(result).is_err() {
            debug!(worker = index, "caller dropped before the result was delivered");
        }
    }
    debug!(worker = index, "queue closed, worker exiting");
}
