//! Worker pool adapting synchronous models to the asynchronous `Segmenter` contract
//!
//! Each worker thread owns one model instance and pulls requests from a
//! shared unbounded queue, so concurrent requests fan out across workers.
//! Results are reported from the worker thread that ran the request.

use super::types::{
    RequestId, SegmentationListener, SegmentationModel, Segmenter, ERROR_INFERENCE, ERROR_SHUTDOWN,
};
use crate::frame::PixelImage;
use anyhow::{Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct Job {
    key: RequestId,
    image: PixelImage,
    listener: Arc<dyn SegmentationListener>,
}

/// Runs segmentation requests on a pool of dedicated threads
pub struct ThreadedSegmenter {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    /// Bumped by `reset`; each worker resets its model when it sees a new value
    generation: Arc<AtomicU64>,
}

impl ThreadedSegmenter {
    /// Spawn one worker per model
    pub fn spawn(models: Vec<Box<dyn SegmentationModel + Send>>) -> Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let generation = Arc::new(AtomicU64::new(0));
        let mut workers = Vec::with_capacity(models.len());

        for (index, model) in models.into_iter().enumerate() {
            let rx = rx.clone();
            let generation = generation.clone();
            let handle = thread::Builder::new()
                .name(format!("segmenter-{}", index))
                .spawn(move || run_worker(index, model, rx, generation))
                .with_context(|| format!("Failed to spawn segmenter worker {}", index))?;
            workers.push(handle);
        }

        tracing::info!("Segmenter pool started with {} workers", workers.len());

        Ok(Self {
            jobs: Some(tx),
            workers,
            generation,
        })
    }

    /// Build `count` models with `factory` and spawn a worker for each
    pub fn with_factory<F>(count: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut() -> Result<Box<dyn SegmentationModel + Send>>,
    {
        let models = (0..count.max(1))
            .map(|_| factory())
            .collect::<Result<Vec<_>>>()?;
        Self::spawn(models)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

fn run_worker(
    index: usize,
    mut model: Box<dyn SegmentationModel + Send>,
    rx: Receiver<Job>,
    generation: Arc<AtomicU64>,
) {
    let (input_width, input_height) = model.input_size();
    tracing::debug!(
        "Segmenter worker {} started ({}x{} input)",
        index,
        input_width,
        input_height
    );
    let mut seen = generation.load(Ordering::Acquire);

    // Exits once every sender is gone
    for job in rx.iter() {
        let _span =
            tracing::debug_span!("segment_request", worker = index, key = job.key.get()).entered();

        let current = generation.load(Ordering::Acquire);
        if current != seen {
            model.reset_state();
            seen = current;
        }

        match model.segment(&job.image) {
            Ok(mask) => job.listener.on_result(job.key, mask),
            Err(e) => {
                tracing::warn!("Segmentation of {} failed: {:#}", job.key, e);
                job.listener.on_error(job.key, &format!("{:#}", e), ERROR_INFERENCE);
            }
        }
    }

    tracing::debug!("Segmenter worker {} stopped", index);
}

impl Segmenter for ThreadedSegmenter {
    fn submit(&self, key: RequestId, image: PixelImage, listener: Arc<dyn SegmentationListener>) {
        let Some(jobs) = &self.jobs else {
            listener.on_error(key, "segmenter is shut down", ERROR_SHUTDOWN);
            return;
        };

        if let Err(err) = jobs.send(Job {
            key,
            image,
            listener,
        }) {
            let job = err.into_inner();
            job.listener.on_error(job.key, "segmenter workers exited", ERROR_SHUTDOWN);
        }
    }

    fn reset(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for ThreadedSegmenter {
    fn drop(&mut self) {
        self.jobs.take();
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            // The last listener can be released on a worker, which must not join itself
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("Segmenter worker panicked");
            }
        }
    }
}
