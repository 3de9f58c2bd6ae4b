use super::cache::{CacheEntry, InFlightCache};
use super::render::{FrameUploader, RenderJob, RenderThread};
use super::resize::resize_to_fit;
use super::settings::{PipelineSettings, DEFAULT_CONFIDENCE_THRESHOLD};
use super::throttle::FrameThrottle;
use super::VideoProcessor;
use crate::compose::{apply_mask, mean_filter, overlay_foreground, prepare_background};
use crate::error::PipelineError;
use crate::frame::{PixelImage, Rotation, VideoFrame};
use crate::output::FrameSink;
use crate::segmentation::{
    RequestId, RequestIdGenerator, SegmentationListener, SegmentationMask, Segmenter,
};
use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a `VirtualBackground`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Disposed,
}

impl PipelineState {
    fn name(self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Ready => "ready",
            PipelineState::Disposed => "disposed",
        }
    }
}

/// Caller-controlled compositing inputs
#[derive(Debug, Clone)]
struct BackgroundConfig {
    background: Option<Arc<PixelImage>>,
    confidence_threshold: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            background: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Background layer rendered for one canvas geometry
struct PreparedLayer {
    source: Arc<PixelImage>,
    width: u32,
    height: u32,
    rotation: Rotation,
    layer: Arc<PixelImage>,
}

impl PreparedLayer {
    fn matches(
        &self,
        source: &Arc<PixelImage>,
        width: u32,
        height: u32,
        rotation: Rotation,
    ) -> bool {
        Arc::ptr_eq(&self.source, source)
            && (self.width, self.height, self.rotation) == (width, height, rotation)
    }
}

/// What a finished mask is composited onto
enum Backdrop {
    Ready {
        layer: Arc<PixelImage>,
        threshold: f32,
    },
    /// Background removed since the frame was submitted
    Cleared,
    /// Background could not be laid out on the canvas
    Unavailable,
}

struct Shared {
    settings: PipelineSettings,
    state: Mutex<PipelineState>,
    config: RwLock<BackgroundConfig>,
    sink: RwLock<Option<Arc<dyn FrameSink>>>,
    throttle: Mutex<FrameThrottle>,
    cache: InFlightCache,
    ids: RequestIdGenerator,
    segmenter: Arc<dyn Segmenter>,
    render: Mutex<Option<RenderThread>>,
    layer: Mutex<Option<PreparedLayer>>,
}

/// Replaces the background of a live stream with a still image
///
/// Captured frames are throttled, downscaled and handed to an asynchronous
/// segmenter. When a mask comes back the foreground is cut out, laid over
/// the configured background and emitted on the render thread with the
/// captured frame's rotation and timestamp. Frames that are not segmented
/// pass through untouched.
pub struct VirtualBackground {
    shared: Arc<Shared>,
}

impl VirtualBackground {
    pub fn new(
        settings: PipelineSettings,
        segmenter: Arc<dyn Segmenter>,
        uploader: Box<dyn FrameUploader>,
    ) -> Result<Self> {
        let render = RenderThread::spawn(uploader)?;

        Ok(Self {
            shared: Arc::new(Shared {
                throttle: Mutex::new(FrameThrottle::new(settings.target_fps)),
                settings,
                state: Mutex::new(PipelineState::Uninitialized),
                config: RwLock::new(BackgroundConfig::default()),
                sink: RwLock::new(None),
                cache: InFlightCache::new(),
                ids: RequestIdGenerator::new(),
                segmenter,
                render: Mutex::new(Some(render)),
                layer: Mutex::new(None),
            }),
        })
    }

    /// Start accepting frames; valid once, before `dispose`
    pub fn initialize(&self) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        if *state != PipelineState::Uninitialized {
            return Err(PipelineError::InvalidState {
                expected: PipelineState::Uninitialized.name(),
                actual: state.name(),
            });
        }

        self.shared.throttle.lock().reset();
        self.shared.segmenter.reset();
        *state = PipelineState::Ready;

        tracing::info!(
            "Virtual background ready: {} fps, {} px working size",
            self.shared.settings.target_fps,
            self.shared.settings.max_dimension
        );
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    /// Replace background image and confidence threshold together
    pub fn configure(
        &self,
        background: PixelImage,
        confidence_threshold: f32,
    ) -> Result<(), PipelineError> {
        self.ensure_not_disposed()?;
        validate_threshold(confidence_threshold)?;
        validate_background(&background)?;

        let mut config = self.shared.config.write();
        config.background = Some(Arc::new(background));
        config.confidence_threshold = confidence_threshold;

        tracing::info!("Background configured (threshold {})", confidence_threshold);
        Ok(())
    }

    pub fn set_background(&self, background: PixelImage) -> Result<(), PipelineError> {
        self.ensure_not_disposed()?;
        validate_background(&background)?;

        let (width, height) = background.dimensions();
        self.shared.config.write().background = Some(Arc::new(background));

        tracing::info!("Background set ({}x{})", width, height);
        Ok(())
    }

    /// Stop compositing; in-flight results are dropped when they arrive
    pub fn clear_background(&self) {
        self.shared.config.write().background = None;
        self.shared.layer.lock().take();
        tracing::info!("Background cleared");
    }

    pub fn set_confidence_threshold(&self, value: f32) -> Result<(), PipelineError> {
        self.ensure_not_disposed()?;
        validate_threshold(value)?;
        self.shared.config.write().confidence_threshold = value;
        Ok(())
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.shared.config.read().confidence_threshold
    }

    pub fn has_background(&self) -> bool {
        self.shared.config.read().background.is_some()
    }

    /// Number of frames waiting for a segmentation result
    pub fn in_flight(&self) -> usize {
        self.shared.cache.len()
    }

    /// Tear down: forget configuration and sink, abandon in-flight frames
    ///
    /// Outstanding segmentation requests are not cancelled; their results
    /// become no-ops.
    pub fn dispose(&self) {
        let previous = std::mem::replace(&mut *self.shared.state.lock(), PipelineState::Disposed);
        if previous == PipelineState::Disposed {
            return;
        }

        *self.shared.config.write() = BackgroundConfig::default();
        self.shared.sink.write().take();
        self.shared.layer.lock().take();

        let abandoned = self.shared.cache.clear();
        let render = self.shared.render.lock().take();
        if let Some(mut render) = render {
            render.shutdown();
        }

        tracing::info!("Virtual background disposed ({} in-flight frames abandoned)", abandoned);
    }

    fn ensure_not_disposed(&self) -> Result<(), PipelineError> {
        match self.state() {
            PipelineState::Disposed => Err(PipelineError::InvalidState {
                expected: "not disposed",
                actual: PipelineState::Disposed.name(),
            }),
            _ => Ok(()),
        }
    }
}

fn validate_threshold(value: f32) -> Result<(), PipelineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidThreshold(value))
    }
}

fn validate_background(background: &PixelImage) -> Result<(), PipelineError> {
    if background.width() == 0 || background.height() == 0 {
        return Err(PipelineError::EmptyBackground);
    }
    Ok(())
}

impl VideoProcessor for VirtualBackground {
    fn on_frame_captured(&self, frame: VideoFrame) {
        Shared::on_frame_captured(&self.shared, frame);
    }

    fn set_sink(&self, sink: Option<Arc<dyn FrameSink>>) {
        if self.state() == PipelineState::Disposed {
            tracing::debug!("Ignoring sink for disposed pipeline");
            return;
        }
        *self.shared.sink.write() = sink;
    }
}

impl Shared {
    fn current_sink(&self) -> Option<Arc<dyn FrameSink>> {
        self.sink.read().clone()
    }

    fn on_frame_captured(this: &Arc<Self>, frame: VideoFrame) {
        let Some(sink) = this.current_sink() else {
            tracing::debug!("No sink bound, dropping frame {}", frame.timestamp_ns);
            return;
        };

        if *this.state.lock() != PipelineState::Ready || this.config.read().background.is_none() {
            sink.on_frame(frame);
            return;
        }

        let now = Duration::from_nanos(frame.timestamp_ns.max(0) as u64);
        if !this.throttle.lock().should_process(now) {
            tracing::trace!("Throttled frame {}", frame.timestamp_ns);
            sink.on_frame(frame);
            return;
        }

        let image = match frame.buffer.to_rgba() {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Convert video frame failed, passing through: {}", e);
                sink.on_frame(frame);
                return;
            }
        };

        let evicted = this.cache.evict_stale(now, this.settings.stale_after);
        if evicted > 0 {
            tracing::debug!("Abandoned {} stale in-flight frames", evicted);
        }

        let resized = resize_to_fit(image, this.settings.max_dimension);
        let key = this.ids.next_id();
        this.cache.insert(
            key,
            CacheEntry {
                resized: resized.clone(),
                original: frame,
                submitted_at: now,
            },
        );

        tracing::debug!("Submitting {} ({}x{})", key, resized.width(), resized.height());
        let listener: Arc<dyn SegmentationListener> = this.clone();
        this.segmenter.submit(key, resized, listener);
    }

    /// Configuration snapshot and its prepared layer for one canvas
    ///
    /// The configuration is read under the layer lock, so a layer built for a
    /// background that `clear_background` has removed is never cached again.
    fn backdrop(&self, width: u32, height: u32, rotation: Rotation) -> Backdrop {
        let mut cached = self.layer.lock();
        let (background, threshold) = {
            let config = self.config.read();
            (config.background.clone(), config.confidence_threshold)
        };
        let Some(background) = background else {
            return Backdrop::Cleared;
        };

        if let Some(prepared) = cached.as_ref() {
            if prepared.matches(&background, width, height, rotation) {
                return Backdrop::Ready {
                    layer: prepared.layer.clone(),
                    threshold,
                };
            }
        }

        let Some(layer) = prepare_background(&background, width, height, rotation) else {
            return Backdrop::Unavailable;
        };
        let layer = Arc::new(layer);
        *cached = Some(PreparedLayer {
            source: background,
            width,
            height,
            rotation,
            layer: layer.clone(),
        });
        Backdrop::Ready { layer, threshold }
    }

    fn post_original(&self, original: VideoFrame) {
        if let Some(sink) = self.current_sink() {
            sink.on_frame(original);
        }
    }

    fn post(&self, image: PixelImage, original: VideoFrame) {
        let Some(sink) = self.current_sink() else {
            tracing::debug!("Sink unbound, dropping frame {}", original.timestamp_ns);
            return;
        };

        let render = self.render.lock();
        let Some(render) = render.as_ref() else {
            tracing::debug!("Render thread stopped, dropping frame {}", original.timestamp_ns);
            return;
        };

        if let Err(job) = render.post(RenderJob {
            image,
            original,
            sink,
        }) {
            tracing::debug!("Render queue closed, dropping frame {}", job.original.timestamp_ns);
        }
    }
}

impl SegmentationListener for Shared {
    fn on_result(&self, key: RequestId, mask: SegmentationMask) {
        let Some(entry) = self.cache.take(key) else {
            tracing::debug!("Dropping result for unknown request {}", key);
            return;
        };

        let _span = tracing::debug_span!("composite", key = key.get()).entered();

        let CacheEntry {
            resized, original, ..
        } = entry;
        let (width, height) = resized.dimensions();

        let (layer, threshold) = match self.backdrop(width, height, original.rotation) {
            Backdrop::Ready { layer, threshold } => (layer, threshold),
            Backdrop::Cleared => {
                tracing::debug!("Background cleared, dropping {}", key);
                return;
            }
            Backdrop::Unavailable => {
                tracing::warn!("Nothing to composite for {}, emitting original", key);
                self.post_original(original);
                return;
            }
        };

        let foreground = apply_mask(&resized, &mask, threshold, self.settings.alpha_mode);
        let mut composited = (*layer).clone();
        overlay_foreground(&mut composited, &foreground);

        let output = match self.settings.smoothing_kernel {
            Some(kernel) => mean_filter(&composited, kernel),
            None => composited,
        };

        self.post(output, original);
    }

    fn on_error(&self, key: RequestId, message: &str, code: i32) {
        if self.cache.take(key).is_some() {
            tracing::warn!("Segmentation of {} failed ({}): {}", key, code, message);
        } else {
            tracing::debug!("Error for unknown request {} ({}): {}", key, code, message);
        }
    }
}
