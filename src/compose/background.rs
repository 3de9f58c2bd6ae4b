//! Cover-fit background layer and foreground overlay.
//!
//! Rotation is kept as frame metadata: the composited frame declares the
//! capture rotation, so the background is counter-rotated into the frame's
//! sensor orientation before it is scaled. A consumer that applies the
//! declared rotation then sees both layers upright.

use crate::frame::{PixelImage, Rotation};
use image::{imageops, Rgba};

/// Scale and offset placing a background over a canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub scale: f32,
    pub width: u32,
    pub height: u32,
    pub offset_x: i64,
    pub offset_y: i64,
}

impl CoverFit {
    /// Fit a `source` sized image so it fills `canvas`, cropping the excess
    pub fn compute(source: (u32, u32), canvas: (u32, u32)) -> Self {
        let (source_width, source_height) = (source.0 as f32, source.1 as f32);
        let (canvas_width, canvas_height) = (canvas.0 as f32, canvas.1 as f32);

        let scale = (canvas_width / source_width).max(canvas_height / source_height);
        let width = ((source_width * scale).round() as u32).max(canvas.0);
        let height = ((source_height * scale).round() as u32).max(canvas.1);

        let offset_x = ((canvas_width - width as f32) / 2.0).round() as i64;
        let offset_y = ((canvas_height - height as f32) / 2.0).round() as i64;

        Self {
            scale,
            width,
            height,
            offset_x,
            offset_y,
        }
    }
}

/// Render `background` as an opaque `width` x `height` layer for a frame
/// captured with `rotation`
///
/// Returns `None` if the background or the canvas has zero area.
pub fn prepare_background(
    background: &PixelImage,
    width: u32,
    height: u32,
    rotation: Rotation,
) -> Option<PixelImage> {
    let _span = tracing::debug_span!("prepare_background").entered();

    if width == 0 || height == 0 || background.width() == 0 || background.height() == 0 {
        return None;
    }

    let oriented;
    let source = match rotation.inverse() {
        Rotation::Deg0 => background,
        inverse => {
            oriented = inverse.apply(background);
            &oriented
        }
    };

    let fit = CoverFit::compute(source.dimensions(), (width, height));

    let scaled;
    let layer = if (fit.width, fit.height) == source.dimensions() {
        source
    } else {
        scaled = imageops::resize(source, fit.width, fit.height, imageops::FilterType::Triangle);
        &scaled
    };

    let mut canvas = PixelImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    imageops::replace(&mut canvas, layer, fit.offset_x, fit.offset_y);

    // Background is drawn opaque regardless of its own alpha
    for pixel in canvas.pixels_mut() {
        pixel[3] = 255;
    }

    Some(canvas)
}

/// Draw `foreground` over `layer` with straight-alpha source-over blending
///
/// Both images must have the same dimensions.
pub fn overlay_foreground(layer: &mut PixelImage, foreground: &PixelImage) {
    let _span = tracing::debug_span!("overlay_foreground").entered();

    debug_assert_eq!(layer.dimensions(), foreground.dimensions());

    for (dst, src) in layer.pixels_mut().zip(foreground.pixels()) {
        match src[3] {
            0 => {}
            255 => *dst = *src,
            alpha => {
                let a = alpha as u32;
                let inv = 255 - a;
                for c in 0..3 {
                    dst[c] = ((src[c] as u32 * a + dst[c] as u32 * inv + 127) / 255) as u8;
                }
                dst[3] = (a + (dst[3] as u32 * inv + 127) / 255) as u8;
            }
        }
    }
}

/// Composite the alpha-masked `foreground` over a cover-fit `background`
///
/// The output has the foreground's dimensions. Returns `None` if either
/// image has zero area.
pub fn composite(
    foreground: &PixelImage,
    background: &PixelImage,
    rotation: Rotation,
) -> Option<PixelImage> {
    let (width, height) = foreground.dimensions();
    let mut layer = prepare_background(background, width, height, rotation)?;
    overlay_foreground(&mut layer, foreground);
    Some(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn is_near(pixel: &Rgba<u8>, expected: Rgba<u8>) -> bool {
        pixel.0.iter().zip(expected.0.iter()).all(|(a, b)| (*a as i32 - *b as i32).abs() <= 2)
    }

    #[test]
    fn cover_fit_fills_and_centers() {
        let fit = CoverFit::compute((50, 50), (200, 100));
        assert_eq!(fit.scale, 4.0);
        assert_eq!((fit.width, fit.height), (200, 200));
        assert_eq!((fit.offset_x, fit.offset_y), (0, -50));

        let fit = CoverFit::compute((400, 100), (100, 100));
        assert_eq!((fit.width, fit.height), (400, 100));
        assert_eq!((fit.offset_x, fit.offset_y), (-150, 0));
    }

    #[test]
    fn small_background_covers_whole_canvas() {
        let foreground = PixelImage::new(64, 48);
        let background = PixelImage::from_pixel(10, 7, Rgba([20, 200, 40, 255]));

        let out = composite(&foreground, &background, Rotation::Deg0).unwrap();

        assert_eq!(out.dimensions(), (64, 48));
        assert!(out.pixels().all(|p| p[3] == 255));
        assert!(out.pixels().all(|p| is_near(p, Rgba([20, 200, 40, 255]))));
    }

    #[test]
    fn transparent_left_half_shows_background() {
        let foreground = PixelImage::from_fn(200, 100, |x, y| {
            if x < 100 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([x as u8, y as u8, 9, 255])
            }
        });
        let background = PixelImage::from_pixel(50, 50, RED);

        let out = composite(&foreground, &background, Rotation::Deg0).unwrap();

        assert_eq!(out.dimensions(), (200, 100));
        for (x, y, pixel) in out.enumerate_pixels() {
            if x < 100 {
                assert!(is_near(pixel, RED), "({}, {}) = {:?}", x, y, pixel);
            } else {
                assert_eq!(*pixel, Rgba([x as u8, y as u8, 9, 255]));
            }
        }
    }

    #[test]
    fn background_is_counter_rotated_for_metadata_rotation() {
        // Upright background: left half red, right half blue
        let background = PixelImage::from_fn(20, 10, |x, _| if x < 10 { RED } else { BLUE });
        // Sensor-oriented canvas for a frame that must be turned 90 degrees clockwise
        let foreground = PixelImage::new(10, 20);

        let out = composite(&foreground, &background, Rotation::Deg90).unwrap();

        assert_eq!(out.dimensions(), (10, 20));
        assert!(is_near(out.get_pixel(5, 2), BLUE));
        assert!(is_near(out.get_pixel(5, 17), RED));

        // Turning the output as the metadata says restores the upright layout
        let upright = Rotation::Deg90.apply(&out);
        assert!(is_near(upright.get_pixel(2, 5), RED));
        assert!(is_near(upright.get_pixel(17, 5), BLUE));
    }

    #[test]
    fn partial_alpha_blends() {
        let mut layer = PixelImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let foreground = PixelImage::from_pixel(1, 1, Rgba([255, 255, 255, 128]));

        overlay_foreground(&mut layer, &foreground);

        assert_eq!(layer.get_pixel(0, 0).0, [128, 128, 128, 255]);
    }

    #[test]
    fn empty_inputs_yield_none() {
        let background = PixelImage::from_pixel(4, 4, RED);
        assert!(composite(&PixelImage::new(0, 0), &background, Rotation::Deg0).is_none());
        let empty = PixelImage::new(0, 3);
        assert!(composite(&PixelImage::new(4, 4), &empty, Rotation::Deg0).is_none());
    }
}
