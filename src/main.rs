use anyhow::{Context, Result};
use camola_vbg::capture::{CaptureSource, WebcamCapture};
use camola_vbg::compose::AlphaMode;
use camola_vbg::output::{FrameSink, OutputSink, SharedOutput, V4L2Output};
use camola_vbg::pipeline::{I420Uploader, PipelineSettings, VideoProcessor, VirtualBackground};
use camola_vbg::segmentation::{self, ThreadedSegmenter};
use camola_vbg::Rotation;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlphaArg {
    /// Keep or drop each pixel at the confidence threshold
    Hard,
    /// Scale kept pixels' alpha by confidence
    Linear,
}

impl From<AlphaArg> for AlphaMode {
    fn from(arg: AlphaArg) -> Self {
        match arg {
            AlphaArg::Hard => AlphaMode::Hard,
            AlphaArg::Linear => AlphaMode::Linear,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1920)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 1080)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target capture frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Segmentation submissions per second
    #[arg(long, default_value_t = 24.0)]
    segment_fps: f32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file)
    /// If not provided, runs in passthrough mode without segmentation
    #[arg(long)]
    model: Option<PathBuf>,

    /// Square model input size in pixels
    #[arg(long, default_value_t = 512)]
    model_input: u32,

    /// Background image replacing everything behind the subject
    #[arg(long)]
    background: Option<PathBuf>,

    /// Minimum foreground confidence (0-1)
    #[arg(long, default_value_t = 0.7)]
    confidence: f32,

    /// Longer side of the frame handed to the segmenter
    #[arg(long, default_value_t = 225)]
    max_dimension: u32,

    /// Number of segmentation workers (one model instance each)
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Sensor rotation stamped on captured frames (0, 90, 180, 270)
    #[arg(long, default_value_t = 0)]
    rotation: i32,

    /// How mask confidence maps to foreground alpha
    #[arg(long, value_enum, default_value_t = AlphaArg::Hard)]
    alpha: AlphaArg,

    /// Box-mean smoothing kernel for composited frames
    #[arg(long)]
    smooth: Option<u32>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Camola virtual background starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {} (segmentation {})", args.fps, args.segment_fps);

    let rotation = Rotation::try_from(args.rotation).context("Invalid --rotation")?;

    let mut capture = WebcamCapture::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
        rotation,
    )
    .context("Failed to initialize webcam capture")?;
    let (capture_width, capture_height) = capture.resolution();
    tracing::info!("Capturing at {}x{}", capture_width, capture_height);

    let output = V4L2Output::new(&args.output_device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;
    let (output_width, output_height) = output.resolution();
    tracing::info!("Writing {}x{} YUYV to {}", output_width, output_height, args.output_device);
    let sink: Arc<dyn FrameSink> = Arc::new(SharedOutput::new(output));

    let processor = match (&args.model, &args.background) {
        (Some(model_path), Some(background_path)) => {
            Some(build_pipeline(&args, model_path, background_path)?)
        }
        (Some(_), None) => {
            tracing::warn!("--model given without --background; running in passthrough mode");
            None
        }
        _ => {
            tracing::info!("Running in passthrough mode (no segmentation)");
            None
        }
    };

    let processor: Option<Arc<VirtualBackground>> = processor.map(Arc::new);
    if let Some(processor) = &processor {
        processor.set_sink(Some(sink.clone()));
    }

    run_pipeline(&mut capture, processor.as_deref(), sink.as_ref(), args.fps, args.max_frames)?;

    if let Some(processor) = processor {
        processor.dispose();
    }

    Ok(())
}

fn build_pipeline(
    args: &Args,
    model_path: &Path,
    background_path: &Path,
) -> Result<VirtualBackground> {
    tracing::info!("Loading segmentation model from {}", model_path.display());
    let segmenter = ThreadedSegmenter::with_factory(args.workers, || {
        segmentation::create_default_model(model_path, args.model_input)
    })
    .context("Failed to load segmentation model")?;
    tracing::info!("Segmentation model loaded successfully");

    let background = image::open(background_path)
        .with_context(|| format!("Failed to load background {}", background_path.display()))?
        .to_rgba8();

    let settings = PipelineSettings {
        target_fps: args.segment_fps,
        max_dimension: args.max_dimension,
        alpha_mode: args.alpha.into(),
        smoothing_kernel: args.smooth,
        ..PipelineSettings::default()
    };

    let pipeline = VirtualBackground::new(settings, Arc::new(segmenter), Box::new(I420Uploader))?;
    pipeline.configure(background, args.confidence)?;
    pipeline.initialize()?;

    Ok(pipeline)
}

fn run_pipeline<C>(
    capture: &mut C,
    processor: Option<&VirtualBackground>,
    sink: &dyn FrameSink,
    target_fps: u32,
    max_frames: Option<u64>,
) -> Result<()>
where
    C: CaptureSource,
{
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_submit_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    while max_frames.map_or(true, |max| frame_count < max) {
        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let frame = capture
            .capture_frame()
            .context("Failed to capture frame")?;
        total_capture_time += capture_start.elapsed();

        // Hand off; composited frames arrive at the sink asynchronously
        let submit_start = Instant::now();
        match processor {
            Some(processor) => processor.on_frame_captured(frame),
            None => sink.on_frame(frame),
        }
        total_submit_time += submit_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_submit_ms = total_submit_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let in_flight = processor.map_or(0, |p| p.in_flight());

            tracing::info!(
                "Frame {}: capture={:.1}ms, submit={:.1}ms, in_flight={}",
                frame_count,
                avg_capture_ms,
                avg_submit_ms,
                in_flight
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    tracing::info!("Stopped after {} frames", frame_count);
    Ok(())
}
