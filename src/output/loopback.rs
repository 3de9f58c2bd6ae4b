use super::OutputSink;
use crate::frame::{rgb_to_chroma, rgb_to_luma, Rotation, VideoFrame};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// Writes frames to a v4l2loopback device as YUYV
///
/// Loopback consumers have no rotation metadata, so each frame's declared
/// rotation is applied to the pixels before writing.
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let format = Output::set_format(&device, &Format::new(width, height, FourCC::new(b"YUYV")))
            .context("Failed to set YUYV output format")?;
        tracing::debug!("Loopback format negotiated: {}x{}", format.width, format.height);

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
        })
    }

    /// Decode, turn upright and scale a frame to the device resolution
    fn prepare(&self, frame: &VideoFrame) -> Result<RgbImage> {
        let rgb = frame.buffer.to_rgb().context("Failed to decode frame")?;

        let upright = match frame.rotation {
            Rotation::Deg0 => rgb,
            rotation => rotation.apply(&rgb),
        };

        if upright.dimensions() == (self.width, self.height) {
            return Ok(upright);
        }

        Ok(image::imageops::resize(
            &upright,
            self.width,
            self.height,
            image::imageops::FilterType::Triangle,
        ))
    }
}

/// Pack an RGB raster as YUYV (4:2:2), sharing chroma between horizontal pairs
///
/// Odd widths repeat the last pixel of each row.
fn pack_yuyv(image: &RgbImage) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let mut packed = Vec::with_capacity(width.div_ceil(2) as usize * height as usize * 4);

    for row in image.rows() {
        let pixels: Vec<&Rgb<u8>> = row.collect();
        for pair in pixels.chunks(2) {
            let left = pair[0];
            let right = pair.get(1).copied().unwrap_or(left);

            let (u0, v0) = rgb_to_chroma(left[0], left[1], left[2]);
            let (u1, v1) = rgb_to_chroma(right[0], right[1], right[2]);

            packed.extend_from_slice(&[
                rgb_to_luma(left[0], left[1], left[2]),
                ((u0 as u16 + u1 as u16 + 1) / 2) as u8,
                rgb_to_luma(right[0], right[1], right[2]),
                ((v0 as u16 + v1 as u16 + 1) / 2) as u8,
            ]);
        }
    }

    packed
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        let _span = tracing::debug_span!("loopback_write").entered();

        let upright = self.prepare(frame)?;
        self.file
            .write_all(&pack_yuyv(&upright))
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
