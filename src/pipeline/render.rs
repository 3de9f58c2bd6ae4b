//! Dedicated emission thread.
//!
//! Composited images are uploaded into output frame buffers and handed to
//! the sink on one thread, in the order they were posted. Upload failures
//! fall back to emitting the captured frame untouched.

use crate::error::UploadError;
use crate::frame::{rgba_to_i420, FrameBuffer, PixelImage, VideoFrame};
use crate::output::FrameSink;
use anyhow::{Context, Result};
use crossbeam::channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Turns a composited raster into a buffer the output stream accepts
pub trait FrameUploader: Send {
    fn upload(&mut self, image: &PixelImage) -> Result<FrameBuffer, UploadError>;
}

/// CPU uploader producing I420 buffers
#[derive(Debug, Default)]
pub struct I420Uploader;

impl FrameUploader for I420Uploader {
    fn upload(&mut self, image: &PixelImage) -> Result<FrameBuffer, UploadError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(UploadError::EmptyImage);
        }
        rgba_to_i420(image)
            .map(FrameBuffer::I420)
            .map_err(|e| UploadError::Backend(e.to_string()))
    }
}

/// One composited frame ready for emission
pub struct RenderJob {
    pub image: PixelImage,
    pub original: VideoFrame,
    pub sink: Arc<dyn FrameSink>,
}

/// Owns the render thread; dropping it drains queued jobs and joins
pub struct RenderThread {
    jobs: Option<Sender<RenderJob>>,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn(mut uploader: Box<dyn FrameUploader>) -> Result<Self> {
        let (tx, rx) = unbounded::<RenderJob>();

        let handle = thread::Builder::new()
            .name("render".to_string())
            .spawn(move || {
                for job in rx.iter() {
                    render(uploader.as_mut(), job);
                }
                tracing::debug!("Render thread stopped");
            })
            .context("Failed to spawn render thread")?;

        Ok(Self {
            jobs: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue a job; returns it back if the thread has stopped
    pub fn post(&self, job: RenderJob) -> Result<(), RenderJob> {
        match &self.jobs {
            Some(jobs) => jobs.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    /// Stop accepting jobs, finish queued ones and join the thread
    pub fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("Render thread panicked");
            }
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn render(uploader: &mut dyn FrameUploader, job: RenderJob) {
    let _span = tracing::debug_span!("render", timestamp_ns = job.original.timestamp_ns).entered();

    let RenderJob {
        image,
        original,
        sink,
    } = job;

    match uploader.upload(&image) {
        Ok(buffer) => {
            sink.on_frame(VideoFrame::new(buffer, original.rotation, original.timestamp_ns))
        }
        Err(e) => {
            tracing::warn!("Upload failed, emitting original frame: {}", e);
            sink.on_frame(original);
        }
    }
}
