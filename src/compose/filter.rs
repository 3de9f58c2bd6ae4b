use crate::frame::PixelImage;
use image::Rgba;

/// Box-mean smoothing over a square `kernel_size` neighborhood
///
/// Neighbors outside the image are skipped rather than clamped. The output
/// is opaque. Kernel sizes below 2 return a copy.
pub fn mean_filter(image: &PixelImage, kernel_size: u32) -> PixelImage {
    let _span = tracing::debug_span!("mean_filter", kernel_size).entered();

    if kernel_size < 2 {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let radius = (kernel_size / 2) as i64;

    // Summed-area table, one extra row and column of zeros
    let stride = width as usize + 1;
    let mut table = vec![[0u64; 3]; stride * (height as usize + 1)];
    for y in 0..height as usize {
        let mut row = [0u64; 3];
        for x in 0..width as usize {
            let pixel = image.get_pixel(x as u32, y as u32);
            for c in 0..3 {
                row[c] += pixel[c] as u64;
                table[(y + 1) * stride + x + 1][c] = table[y * stride + x + 1][c] + row[c];
            }
        }
    }

    PixelImage::from_fn(width, height, |x, y| {
        let x0 = (x as i64 - radius).max(0) as usize;
        let y0 = (y as i64 - radius).max(0) as usize;
        let x1 = (x as i64 + radius + 1).min(width as i64) as usize;
        let y1 = (y as i64 + radius + 1).min(height as i64) as usize;
        let count = ((x1 - x0) * (y1 - y0)) as u64;

        let mut out = [0u8; 4];
        for c in 0..3 {
            let sum = table[y1 * stride + x1][c] + table[y0 * stride + x0][c]
                - table[y0 * stride + x1][c]
                - table[y1 * stride + x0][c];
            out[c] = (sum / count) as u8;
        }
        out[3] = 255;
        Rgba(out)
    })
}
