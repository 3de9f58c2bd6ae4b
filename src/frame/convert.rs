//! Direct planar <-> packed color conversion (BT.601, limited range).

use super::{chroma_size, I420Buffer, PixelImage};
use crate::error::FrameError;
use image::Rgba;

/// Convert an I420 buffer to an opaque RGBA raster
pub fn i420_to_rgba(buffer: &I420Buffer) -> Result<PixelImage, FrameError> {
    let _span = tracing::debug_span!("i420_to_rgba").entered();

    buffer.validate()?;

    let width = buffer.width;
    let height = buffer.height;

    let image = PixelImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let luma = buffer.y[y * buffer.stride_y + x];
        let u = buffer.u[(y / 2) * buffer.stride_u + x / 2];
        let v = buffer.v[(y / 2) * buffer.stride_v + x / 2];

        let (r, g, b) = yuv_to_rgb(luma, u, v);
        Rgba([r, g, b, 255])
    });

    Ok(image)
}

/// Convert an RGBA raster to a tightly packed I420 buffer
///
/// Alpha is ignored; chroma is averaged over each 2x2 block.
pub fn rgba_to_i420(image: &PixelImage) -> Result<I420Buffer, FrameError> {
    let _span = tracing::debug_span!("rgba_to_i420").entered();

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(FrameError::Empty { width, height });
    }

    let (chroma_width, chroma_height) = chroma_size(width, height);
    let mut y_plane = Vec::with_capacity((width * height) as usize);
    let mut u_plane = vec![0u8; chroma_width * chroma_height];
    let mut v_plane = vec![0u8; chroma_width * chroma_height];

    for pixel in image.pixels() {
        y_plane.push(rgb_to_luma(pixel[0], pixel[1], pixel[2]));
    }

    for cy in 0..chroma_height {
        for cx in 0..chroma_width {
            let mut sum_u = 0i32;
            let mut sum_v = 0i32;
            let mut count = 0i32;

            for y in (cy * 2)..((cy * 2 + 2).min(height as usize)) {
                for x in (cx * 2)..((cx * 2 + 2).min(width as usize)) {
                    let pixel = image.get_pixel(x as u32, y as u32);
                    let (u, v) = rgb_to_chroma(pixel[0], pixel[1], pixel[2]);
                    sum_u += u as i32;
                    sum_v += v as i32;
                    count += 1;
                }
            }

            u_plane[cy * chroma_width + cx] = ((sum_u + count / 2) / count) as u8;
            v_plane[cy * chroma_width + cx] = ((sum_v + count / 2) / count) as u8;
        }
    }

    I420Buffer::new(width, height, y_plane, u_plane, v_plane)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = (y as i32 - 16) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (c + 409 * e + 128) >> 8;
    let g = (c - 100 * d - 208 * e + 128) >> 8;
    let b = (c + 516 * d + 128) >> 8;

    (clamp_u8(r), clamp_u8(g), clamp_u8(b))
}

pub(crate) fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    clamp_u8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16)
}

pub(crate) fn rgb_to_chroma(r: u8, g: u8, b: u8) -> (u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clamp_u8(u), clamp_u8(v))
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
