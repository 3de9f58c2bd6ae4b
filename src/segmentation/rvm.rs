use super::preprocess::Preprocessor;
use super::types::{SegmentationMask, SegmentationModel};
use crate::frame::PixelImage;
use anyhow::{bail, Context, Result};
use ndarray::{arr1, Array4, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// Recurrent hidden states carried between frames
struct HiddenState {
    r1: Array4<f32>,
    r2: Array4<f32>,
    r3: Array4<f32>,
    r4: Array4<f32>,
}

impl HiddenState {
    fn zeros(width: usize, height: usize) -> Self {
        tracing::debug!("Initializing hidden states to {}x{}", width, height);

        Self {
            r1: Array4::zeros((1, 16, height, width)),
            r2: Array4::zeros((1, 20, height / 2, width / 2)),
            r3: Array4::zeros((1, 24, height / 4, width / 4)),
            r4: Array4::zeros((1, 28, height / 8, width / 8)),
        }
    }
}

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
    state: Option<HiddenState>,

    // Downsample ratio for hidden states
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `input_size` - Square model input edge; 256-512 trades accuracy for latency
    ///
    /// Hidden states run at a quarter of the input resolution.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(input_size, input_size),
            width: input_size,
            height: input_size,
            state: None,
            downsample_ratio: 0.25,
        })
    }
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &PixelImage) -> Result<SegmentationMask> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let state_width = (self.width as f32 * self.downsample_ratio) as usize;
        let state_height = (self.height as f32 * self.downsample_ratio) as usize;
        let state = self
            .state
            .get_or_insert_with(|| HiddenState::zeros(state_width, state_height));

        let input_tensor = self.preprocessor.preprocess(frame)?;
        let ratio = arr1(&[self.downsample_ratio]);

        // RVM expects: src, r1i, r2i, r3i, r4i, downsample_ratio
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                TensorRef::from_array_view(input_tensor.view())?,
                TensorRef::from_array_view(state.r1.view())?,
                TensorRef::from_array_view(state.r2.view())?,
                TensorRef::from_array_view(state.r3.view())?,
                TensorRef::from_array_view(state.r4.view())?,
                TensorRef::from_array_view(ratio.view())?
            ])
            .context("Failed to run inference")?;
        drop(_infer_span);

        // Outputs: fgr, pha, r1o, r2o, r3o, r4o; only pha and the states are kept
        let (pha_shape, pha) = outputs[1]
            .try_extract_tensor::<f32>()
            .context("Failed to read alpha output")?;
        if pha_shape.len() != 4 {
            bail!("Unexpected alpha output rank {}", pha_shape.len());
        }
        let matte_height = pha_shape[2] as u32;
        let matte_width = pha_shape[3] as u32;
        let mask = SegmentationMask::new(matte_width, matte_height, pha.to_vec())?;

        state.r1 = outputs[2].try_extract_array::<f32>()?.to_owned().into_dimensionality::<Ix4>()?;
        state.r2 = outputs[3].try_extract_array::<f32>()?.to_owned().into_dimensionality::<Ix4>()?;
        state.r3 = outputs[4].try_extract_array::<f32>()?.to_owned().into_dimensionality::<Ix4>()?;
        state.r4 = outputs[5].try_extract_array::<f32>()?.to_owned().into_dimensionality::<Ix4>()?;

        Ok(mask)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.state = None;
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
