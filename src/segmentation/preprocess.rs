use crate::frame::PixelImage;
use anyhow::Result;
use image::imageops;
use ndarray::Array4;

/// Preprocessor for converting RGBA images to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGBA image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Drop alpha, convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &PixelImage) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            image
        };

        let (width, height) = source.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in source.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        Ok(tensor)
    }
}
