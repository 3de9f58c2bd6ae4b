use crate::frame::PixelImage;
use crate::segmentation::SegmentationMask;
use image::Rgba;

/// How mask confidence turns into foreground alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    /// Keep the pixel verbatim at or above the threshold, clear it below
    #[default]
    Hard,
    /// Like `Hard`, but kept pixels have their alpha scaled by confidence
    Linear,
}

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Cut the foreground out of `image` using a confidence mask
///
/// The mask is sampled nearest-neighbor onto the image grid. Pixels whose
/// mapped mask cell lies outside the mask are background.
pub fn apply_mask(
    image: &PixelImage,
    mask: &SegmentationMask,
    threshold: f32,
    mode: AlphaMode,
) -> PixelImage {
    let _span = tracing::debug_span!("apply_mask").entered();

    let (width, height) = image.dimensions();
    let (mask_width, mask_height) = (mask.width(), mask.height());

    if mask_width == 0 || mask_height == 0 {
        return PixelImage::from_pixel(width, height, CLEAR);
    }

    let scale_x = width as f32 / mask_width as f32;
    let scale_y = height as f32 / mask_height as f32;

    PixelImage::from_fn(width, height, |x, y| {
        let mask_x = (x as f32 / scale_x).floor() as i64;
        let mask_y = (y as f32 / scale_y).floor() as i64;

        if !(0..mask_width as i64).contains(&mask_x) || !(0..mask_height as i64).contains(&mask_y) {
            return CLEAR;
        }

        let confidence = mask.at(mask_x as u32, mask_y as u32);
        if confidence.is_nan() || confidence < threshold {
            return CLEAR;
        }

        let pixel = *image.get_pixel(x, y);
        match mode {
            AlphaMode::Hard => pixel,
            AlphaMode::Linear => {
                let alpha = (pixel[3] as f32 * confidence.clamp(0.0, 1.0)).round() as u8;
                Rgba([pixel[0], pixel[1], pixel[2], alpha])
            }
        }
    })
}
