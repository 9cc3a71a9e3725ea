//! Camera identity and capability records.

use std::fmt;

use crate::buffer::{FourCC, FrameFormat};

/// Color filter array arrangement over the sensor's photosites.
///
/// Named by the colors of the top-left 2x2 block, read row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BayerPattern {
    /// Red, green / green, blue.
    Rggb,
    /// Blue, green / green, red.
    Bggr,
    /// Green, red / blue, green.
    Grbg,
    /// Green, blue / red, green.
    Gbrg,
    /// No color filter array (monochrome or already-demosaiced output).
    None,
}

impl BayerPattern {
    /// Pattern implied by a raw capture `FourCC`, if it is a Bayer code.
    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.0 {
            b"RGGB" | b"RG16" | b"RG10" | b"RG12" => Some(Self::Rggb),
            b"BA81" | b"BYR2" | b"BG10" | b"BG12" => Some(Self::Bggr),
            b"GRBG" | b"GR16" | b"BA10" | b"BA12" => Some(Self::Grbg),
            b"GBRG" | b"GB16" | b"GB10" | b"GB12" => Some(Self::Gbrg),
            _ => None,
        }
    }
}

impl fmt::Display for BayerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rggb => "RGGB",
            Self::Bggr => "BGGR",
            Self::Grbg => "GRBG",
            Self::Gbrg => "GBRG",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Inclusive range of values a sensor supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange<T> {
    /// Smallest supported value.
    pub min: T,
    /// Largest supported value.
    pub max: T,
}

impl<T: PartialOrd + Copy> ValueRange<T> {
    /// Create a new range.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies within the range.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }

    /// Nearest value within the range.
    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

impl<T: fmt::Display> fmt::Display for ValueRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// A device a backend found during enumeration, before it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Backend-specific address (device node, SDK index, ...).
    pub address: String,
    /// Serial number or other unique ID.
    pub serial: String,
    /// Model name, if known before opening.
    pub model: String,
}

/// Identity and capability record for one camera in the array.
///
/// Immutable between `init` and `release`.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    /// Name of the backend driving the camera.
    pub backend: String,
    /// Manufacturer.
    pub vendor: String,
    /// Model name.
    pub model: String,
    /// Serial number or other unique ID.
    pub serial: String,
    /// Color filter array layout of the sensor.
    pub bayer_pattern: BayerPattern,
    /// Format frames are delivered in.
    pub format: FrameFormat,
    /// Supported frame rates in frames per second.
    pub fps_range: ValueRange<f32>,
    /// Supported exposure times in microseconds.
    pub exposure_range: ValueRange<u32>,
    /// Supported analog gain in dB.
    pub gain_range: ValueRange<f32>,
    /// Whether the camera can be triggered by a shared hardware signal.
    pub hardware_trigger: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bayer_from_fourcc() {
        assert_eq!(BayerPattern::from_fourcc(FourCC::RGGB), Some(BayerPattern::Rggb));
        assert_eq!(BayerPattern::from_fourcc(FourCC::BA81), Some(BayerPattern::Bggr));
        assert_eq!(BayerPattern::from_fourcc(FourCC::YUYV), None);
    }

    #[test]
    fn test_range_clamp() {
        let range = ValueRange::new(10u32, 100);
        assert!(range.contains(10));
        assert!(range.contains(100));
        assert!(!range.contains(101));
        assert_eq!(range.clamp(5), 10);
        assert_eq!(range.clamp(500), 100);
        assert_eq!(range.clamp(42), 42);
    }
}
