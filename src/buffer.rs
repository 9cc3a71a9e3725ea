//! Caller-owned frame buffers and pixel format descriptions.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Four-character pixel format code as used by capture drivers (e.g. `YUYV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// 8-bit greyscale.
    pub const GREY: Self = Self::new(b"GREY");
    /// 16-bit greyscale.
    pub const Y16: Self = Self::new(b"Y16 ");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
    /// 8-bit Bayer, BGGR order.
    pub const BA81: Self = Self::new(b"BA81");
    /// 8-bit Bayer, GBRG order.
    pub const GBRG: Self = Self::new(b"GBRG");
    /// 8-bit Bayer, GRBG order.
    pub const GRBG: Self = Self::new(b"GRBG");
    /// 8-bit Bayer, RGGB order.
    pub const RGGB: Self = Self::new(b"RGGB");
    /// 16-bit Bayer, BGGR order.
    pub const BYR2: Self = Self::new(b"BYR2");
    /// 16-bit Bayer, RGGB order.
    pub const RG16: Self = Self::new(b"RG16");
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

/// Pixel layout of frame data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit single channel.
    Mono8,
    /// 16-bit little-endian single channel.
    Mono16,
    /// 8-bit raw sensor data behind a color filter array.
    Bayer8,
    /// 16-bit little-endian raw sensor data behind a color filter array.
    Bayer16,
    /// YUYV 4:2:2 packed.
    Yuyv,
    /// 24-bit packed RGB.
    Rgb8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel.
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Mono8 | Self::Bayer8 => 1,
            Self::Mono16 | Self::Bayer16 | Self::Yuyv => 2,
            Self::Rgb8 => 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Frame geometry and layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per line, including any padding.
    pub stride: u32,
    /// Pixel layout.
    pub pixel_format: PixelFormat,
}

impl FrameFormat {
    /// Create a tightly packed format specification.
    #[must_use]
    pub const fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            stride: width * pixel_format.bytes_per_pixel(),
            pixel_format,
        }
    }

    /// Same format with a padded line stride.
    #[must_use]
    pub const fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    /// Bytes of pixel data in one line, excluding padding.
    pub const fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_format.bytes_per_pixel() as usize
    }

    /// Total bytes needed to hold one frame.
    pub const fn size(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Whether a frame in `other` can be written into a buffer of this format.
    ///
    /// Width, height and pixel layout must be identical; the line stride may differ.
    pub fn accepts(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.pixel_format == other.pixel_format
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} (stride {})",
            self.width, self.height, self.pixel_format, self.stride
        )
    }
}

/// A buffer could not be constructed from the given memory.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidBuffer {
    /// The stride cannot hold one line of pixels.
    #[error("stride {stride} is smaller than a line of {row_bytes} bytes")]
    StrideTooSmall {
        /// Declared stride.
        stride: u32,
        /// Bytes one line needs.
        row_bytes: usize,
    },
    /// The memory is not the size the format describes.
    #[error("buffer holds {actual} bytes but the format needs {expected}")]
    SizeMismatch {
        /// Bytes the format needs.
        expected: usize,
        /// Bytes provided.
        actual: usize,
    },
}

/// Caller-owned, pre-allocated frame memory that captures are written into.
///
/// The driver never resizes or frees the memory; a frame whose format does
/// not match is reported as an error instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    format: FrameFormat,
    data: Box<[u8]>,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer for the given format.
    pub fn new(format: FrameFormat) -> Result<Self, InvalidBuffer> {
        Self::from_vec(format, vec![0u8; format.size()])
    }

    /// Wrap existing memory. The length must equal `format.size()`.
    pub fn from_vec(format: FrameFormat, data: Vec<u8>) -> Result<Self, InvalidBuffer> {
        let row_bytes = format.row_bytes();
        if (format.stride as usize) < row_bytes {
            return Err(InvalidBuffer::StrideTooSmall {
                stride: format.stride,
                row_bytes,
            });
        }
        if data.len() != format.size() {
            return Err(InvalidBuffer::SizeMismatch {
                expected: format.size(),
                actual: data.len(),
            });
        }
        Ok(Self {
            format,
            data: data.into_boxed_slice(),
        })
    }

    /// Declared format.
    pub const fn format(&self) -> &FrameFormat {
        &self.format
    }

    /// Frame bytes, including line padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel bytes of line `y`, excluding padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let start = y as usize * self.format.stride as usize;
        self.data.get(start..start + self.format.row_bytes())
    }

    /// Copy a frame laid out with `src_stride` into this buffer.
    ///
    /// Nothing is written unless `src` holds every line; returns the number of
    /// pixel bytes written.
    pub fn copy_from(&mut self, src: &[u8], src_stride: usize) -> Option<usize> {
        let row_bytes = self.format.row_bytes();
        let height = self.format.height as usize;
        if row_bytes == 0 || src_stride < row_bytes || height == 0 {
            return None;
        }
        let needed = src_stride * (height - 1) + row_bytes;
        if src.len() < needed {
            return None;
        }

        let stride = self.format.stride as usize;
        for (dst_row, src_row) in self
            .data
            .chunks_mut(stride)
            .zip(src.chunks(src_stride))
            .take(height)
        {
            dst_row.get_mut(..row_bytes)?.copy_from_slice(src_row.get(..row_bytes)?);
        }
        Some(row_bytes * height)
    }

    /// Fill every line by calling `fill(y, line)`; padding is left untouched.
    pub fn fill_rows<F: FnMut(u32, &mut [u8])>(&mut self, mut fill: F) -> usize {
        let row_bytes = self.format.row_bytes();
        let stride = self.format.stride as usize;
        if row_bytes == 0 {
            return 0;
        }
        let mut written = 0;
        for (y, line) in (0..self.format.height).zip(self.data.chunks_mut(stride)) {
            if let Some(pixels) = line.get_mut(..row_bytes) {
                fill(y, pixels);
                written += row_bytes;
            }
        }
        written
    }

    /// Mean sample intensity normalized to `0.0..=1.0`.
    ///
    /// For YUYV only the luma samples are counted.
    pub fn mean_intensity(&self) -> f32 {
        let mut sum = 0f64;
        let mut count = 0u64;
        for y in 0..self.format.height {
            let Some(row) = self.row(y) else { break };
            match self.format.pixel_format {
                PixelFormat::Mono8 | PixelFormat::Bayer8 | PixelFormat::Rgb8 => {
                    sum += row.iter().map(|&v| f64::from(v)).sum::<f64>() / 255.0;
                    count += row.len() as u64;
                }
                PixelFormat::Mono16 | PixelFormat::Bayer16 => {
                    for pair in row.chunks_exact(2) {
                        if let [lo, hi] = pair {
                            sum += f64::from(u16::from_le_bytes([*lo, *hi])) / 65535.0;
                            count += 1;
                        }
                    }
                }
                PixelFormat::Yuyv => {
                    for luma in row.iter().step_by(2) {
                        sum += f64::from(*luma) / 255.0;
                        count += 1;
                    }
                }
            }
        }
        if count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        {
            (sum / count as f64) as f32
        }
    }
}

/// Metadata for a delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Per-camera frame sequence number, increasing in acquisition order.
    pub sequence: u64,
    /// Capture timestamp relative to the start of acquisition.
    pub timestamp: Duration,
    /// Pixel bytes written into the buffer.
    pub bytes_written: usize,
}
