use crate::frame::PixelImage;
use image::imageops;

/// Downscale so the longer side is at most `max_dimension`, keeping aspect
///
/// Images already within bounds are returned as-is.
pub fn resize_to_fit(image: PixelImage, max_dimension: u32) -> PixelImage {
    let (width, height) = image.dimensions();
    let longer = width.max(height);

    if longer <= max_dimension || max_dimension == 0 {
        return image;
    }

    let _span = tracing::debug_span!("resize", width, height, max_dimension).entered();

    let scale = max_dimension as f64 / longer as f64;
    let (new_width, new_height) = if width >= height {
        (max_dimension, ((height as f64 * scale).round() as u32).max(1))
    } else {
        (((width as f64 * scale).round() as u32).max(1), max_dimension)
    };

    imageops::resize(&image, new_width, new_height, imageops::FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn small_images_pass_through() {
        let image = PixelImage::from_fn(200, 120, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let out = resize_to_fit(image.clone(), 225);
        assert_eq!(out, image);
    }

    #[test]
    fn landscape_scales_to_max_width() {
        let out = resize_to_fit(PixelImage::new(1280, 720), 225);
        assert_eq!(out.dimensions(), (225, 127));
    }

    #[test]
    fn portrait_scales_to_max_height() {
        let out = resize_to_fit(PixelImage::new(720, 1280), 480);
        assert_eq!(out.dimensions(), (270, 480));
    }

    #[test]
    fn aspect_ratio_within_one_pixel() {
        for (width, height) in [(1920, 1080), (641, 479), (1000, 3), (333, 999)] {
            let out = resize_to_fit(PixelImage::new(width, height), 225);
            let (w, h) = out.dimensions();
            assert_eq!(w.max(h), 225);

            let expected_other = if width >= height {
                height as f64 * 225.0 / width as f64
            } else {
                width as f64 * 225.0 / height as f64
            };
            let other = w.min(h) as f64;
            assert!((other - expected_other).abs() <= 1.0, "{}x{} -> {}x{}", width, height, w, h);
        }
    }
}
