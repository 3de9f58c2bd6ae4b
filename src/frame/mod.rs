mod convert;

pub use convert::{i420_to_rgba, rgba_to_i420};
pub(crate) use convert::{rgb_to_chroma, rgb_to_luma};

use crate::error::FrameError;
use image::{DynamicImage, RgbImage, RgbaImage};

/// Decoded RGBA raster handed between pipeline stages
pub type PixelImage = RgbaImage;

/// Clockwise rotation a consumer must apply to display a frame upright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Rotation that undoes this one
    pub fn inverse(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg0,
            Rotation::Deg90 => Rotation::Deg270,
            Rotation::Deg180 => Rotation::Deg180,
            Rotation::Deg270 => Rotation::Deg90,
        }
    }

    /// Rotate an image clockwise by this amount
    pub fn apply<I>(
        self,
        image: &I,
    ) -> image::ImageBuffer<I::Pixel, Vec<<I::Pixel as image::Pixel>::Subpixel>>
    where
        I: image::GenericImageView,
        I::Pixel: 'static,
    {
        match self {
            Rotation::Deg0 => {
                let mut out = image::ImageBuffer::new(image.width(), image.height());
                for (x, y, pixel) in image.pixels() {
                    out.put_pixel(x, y, pixel);
                }
                out
            }
            Rotation::Deg90 => image::imageops::rotate90(image),
            Rotation::Deg180 => image::imageops::rotate180(image),
            Rotation::Deg270 => image::imageops::rotate270(image),
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = FrameError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            _ => Err(FrameError::InvalidRotation(degrees)),
        }
    }
}

/// Planar 4:2:0 buffer with independent strides per plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Buffer {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub stride_y: usize,
    pub stride_u: usize,
    pub stride_v: usize,
}

impl I420Buffer {
    /// Build a tightly packed buffer, checking plane sizes
    pub fn new(
        width: u32,
        height: u32,
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let (chroma_width, _) = chroma_size(width, height);
        let buffer = Self {
            width,
            height,
            y,
            u,
            v,
            stride_y: width as usize,
            stride_u: chroma_width,
            stride_v: chroma_width,
        };
        buffer.validate()?;
        Ok(buffer)
    }

    /// Check that every plane can hold its rows at the declared stride
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty {
                width: self.width,
                height: self.height,
            });
        }

        let (chroma_width, chroma_height) = chroma_size(self.width, self.height);
        let planes = [
            ("Y", &self.y, self.stride_y, self.width as usize, self.height as usize),
            ("U", &self.u, self.stride_u, chroma_width, chroma_height),
            ("V", &self.v, self.stride_v, chroma_width, chroma_height),
        ];

        for (plane, data, stride, width, rows) in planes {
            if stride < width {
                return Err(FrameError::StrideTooSmall { plane, stride, width });
            }
            let needed = stride
                .checked_mul(rows - 1)
                .and_then(|n| n.checked_add(width))
                .ok_or(FrameError::PlaneOverflow { plane, stride, rows })?;
            if data.len() < needed {
                return Err(FrameError::PlaneTooSmall {
                    plane,
                    needed,
                    actual: data.len(),
                });
            }
        }

        Ok(())
    }
}

/// Chroma plane dimensions for a 4:2:0 frame
pub fn chroma_size(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

/// Pixel storage of a captured or emitted frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBuffer {
    I420(I420Buffer),
    Rgb(RgbImage),
}

impl FrameBuffer {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            FrameBuffer::I420(buffer) => (buffer.width, buffer.height),
            FrameBuffer::Rgb(image) => image.dimensions(),
        }
    }

    /// Decode into an RGBA raster
    pub fn to_rgba(&self) -> Result<PixelImage, FrameError> {
        match self {
            FrameBuffer::I420(buffer) => i420_to_rgba(buffer),
            FrameBuffer::Rgb(image) => {
                let (width, height) = image.dimensions();
                if width == 0 || height == 0 {
                    return Err(FrameError::Empty { width, height });
                }
                Ok(DynamicImage::ImageRgb8(image.clone()).to_rgba8())
            }
        }
    }

    /// Decode into a packed RGB raster
    pub fn to_rgb(&self) -> Result<RgbImage, FrameError> {
        match self {
            FrameBuffer::Rgb(image) => Ok(image.clone()),
            FrameBuffer::I420(_) => Ok(DynamicImage::ImageRgba8(self.to_rgba()?).to_rgb8()),
        }
    }
}

/// A frame travelling through the stream with its timing metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub buffer: FrameBuffer,
    pub rotation: Rotation,
    /// Monotonic capture time, strictly increasing per stream
    pub timestamp_ns: i64,
}

impl VideoFrame {
    pub fn new(buffer: FrameBuffer, rotation: Rotation, timestamp_ns: i64) -> Self {
        Self {
            buffer,
            rotation,
            timestamp_ns,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }
}
