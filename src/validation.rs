//! Frame validation utilities for test pattern verification.
//!
//! These check that captured frames carry the pattern a simulated or virtual
//! camera is known to produce, and that a camera's frames arrive in order.

use thiserror::Error;

use crate::buffer::{FrameBuffer, FrameMetadata, PixelFormat};

/// Minimum rise in luma, left to right, for a frame to count as a gradient.
const GRADIENT_MIN_RISE: i32 = 50;

/// A captured frame or sequence does not look as expected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The sample position lies outside the frame.
    #[error("no pixel at ({x}, {y})")]
    OutOfBounds {
        /// Column.
        x: u32,
        /// Row.
        y: u32,
    },
    /// Luma fell where it should rise.
    #[error("gradient falls at x={x}: {luma} after {previous}")]
    NotMonotonic {
        /// Column of the offending sample.
        x: u32,
        /// Luma there.
        luma: u8,
        /// Luma of the previous sample.
        previous: u8,
    },
    /// Luma barely changes across the frame.
    #[error("gradient rises by {rise}, expected at least {GRADIENT_MIN_RISE}")]
    Flat {
        /// Total rise from first to last sample.
        rise: i32,
    },
    /// A sample differs from the expected level.
    #[error("level {actual} at x={x}, expected {expected}±{tolerance}")]
    Level {
        /// Column of the offending sample.
        x: u32,
        /// Luma found.
        actual: u8,
        /// Luma expected.
        expected: u8,
        /// Allowed difference.
        tolerance: u8,
    },
    /// No frames to check.
    #[error("empty frame sequence")]
    Empty,
    /// Sequence numbers skip or repeat.
    #[error("sequence gap at frame {position}: expected {expected}, got {actual}")]
    SequenceGap {
        /// Position in the checked slice.
        position: usize,
        /// Sequence number that should follow.
        expected: u64,
        /// Sequence number found.
        actual: u64,
    },
    /// A timestamp is earlier than its predecessor.
    #[error("timestamp goes backwards at frame {position}")]
    TimestampRegression {
        /// Position in the checked slice.
        position: usize,
    },
}

/// 8-bit luma of the pixel at `(x, y)`.
///
/// 16-bit samples are reduced to their high byte; RGB is weighted per Rec. 601.
pub fn luma_at(buffer: &FrameBuffer, x: u32, y: u32) -> Option<u8> {
    let format = buffer.format();
    if x >= format.width {
        return None;
    }
    let bytes_per_pixel = format.pixel_format.bytes_per_pixel() as usize;
    let start = usize::try_from(x).ok()?.checked_mul(bytes_per_pixel)?;
    let pixel = buffer.row(y)?.get(start..start + bytes_per_pixel)?;

    match (format.pixel_format, pixel) {
        (PixelFormat::Mono8 | PixelFormat::Bayer8, [value]) => Some(*value),
        (PixelFormat::Mono16 | PixelFormat::Bayer16, [_, high]) => Some(*high),
        (PixelFormat::Yuyv, [luma, _]) => Some(*luma),
        (PixelFormat::Rgb8, [r, g, b]) => {
            let luma = 0.114f32.mul_add(
                f32::from(*b),
                0.587f32.mul_add(f32::from(*g), 0.299 * f32::from(*r)),
            );
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some(luma.round().clamp(0.0, 255.0) as u8)
        }
        _ => None,
    }
}

fn center_row_samples(buffer: &FrameBuffer) -> impl Iterator<Item = u32> {
    let width = buffer.format().width;
    let step = (width / 64).max(1) as usize;
    (0..width).step_by(step)
}

/// Validates that a frame contains a horizontal gradient.
///
/// Samples the center row and requires luma to rise left to right, allowing
/// one step of rounding noise, by at least a clearly visible amount.
///
/// # Errors
///
/// Returns an error if luma falls along the row or barely changes.
pub fn validate_gradient(buffer: &FrameBuffer) -> Result<(), ValidationError> {
    let y = buffer.format().height / 2;
    let mut first = None;
    let mut previous: Option<u8> = None;

    for x in center_row_samples(buffer) {
        let luma = luma_at(buffer, x, y).ok_or(ValidationError::OutOfBounds { x, y })?;
        if let Some(previous) = previous {
            if luma.saturating_add(1) < previous {
                return Err(ValidationError::NotMonotonic { x, luma, previous });
            }
        }
        first.get_or_insert(luma);
        previous = Some(luma);
    }

    let rise = i32::from(previous.unwrap_or(0)) - i32::from(first.unwrap_or(0));
    if rise < GRADIENT_MIN_RISE {
        return Err(ValidationError::Flat { rise });
    }
    Ok(())
}

/// Validates that a frame is a flat field at `expected` luma.
///
/// # Errors
///
/// Returns [`ValidationError::Level`] for the first center-row sample more
/// than `tolerance` away from `expected`.
pub fn validate_solid(buffer: &FrameBuffer, expected: u8, tolerance: u8) -> Result<(), ValidationError> {
    let y = buffer.format().height / 2;
    for x in center_row_samples(buffer) {
        let actual = luma_at(buffer, x, y).ok_or(ValidationError::OutOfBounds { x, y })?;
        if actual.abs_diff(expected) > tolerance {
            return Err(ValidationError::Level {
                x,
                actual,
                expected,
                tolerance,
            });
        }
    }
    Ok(())
}

/// Validates that one camera's frames are consecutive and in time order.
///
/// # Errors
///
/// Returns an error if `frames` is empty, a sequence number does not follow
/// its predecessor by exactly one, or a timestamp goes backwards.
pub fn validate_frame_sequence(frames: &[FrameMetadata]) -> Result<(), ValidationError> {
    if frames.is_empty() {
        return Err(ValidationError::Empty);
    }

    for (offset, pair) in frames.windows(2).enumerate() {
        let [previous, current] = pair else {
            continue;
        };
        let position = offset + 1;
        let expected = previous.sequence + 1;
        if current.sequence != expected {
            return Err(ValidationError::SequenceGap {
                position,
                expected,
                actual: current.sequence,
            });
        }
        if current.timestamp < previous.timestamp {
            return Err(ValidationError::TimestampRegression { position });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::buffer::FrameFormat;
    use crate::lifecycle::StopSignal;
    use crate::mock::{MockCameraSpec, MockRig, TestPattern};
    use crate::traits::{Backend, BackendAdapter};

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn capture(format: FrameFormat, pattern: TestPattern, frames: usize) -> (FrameBuffer, Vec<FrameMetadata>) {
        let rig = MockRig::with_specs(vec![MockCameraSpec::default()
            .with_format(format)
            .with_pattern(pattern)]);
        let devices = rig.enumerate().expect("enumerate failed");
        let mut adapter = rig.open(&devices[0]).expect("open failed");
        let stop = StopSignal::new();
        adapter.start_acquisition(&stop, 2).expect("start failed");

        let mut buffer = FrameBuffer::new(format).expect("valid buffer");
        let metadata = (0..frames)
            .map(|_| adapter.deliver_frame(&mut buffer, TIMEOUT).expect("frame failed"))
            .collect();
        (buffer, metadata)
    }

    #[test]
    fn test_validate_gradient_success() {
        for pixel_format in [PixelFormat::Mono8, PixelFormat::Yuyv, PixelFormat::Rgb8, PixelFormat::Bayer16] {
            let (buffer, _) = capture(FrameFormat::new(640, 480, pixel_format), TestPattern::Gradient, 1);
            let result = validate_gradient(&buffer);
            assert!(result.is_ok(), "{pixel_format}: {result:?}");
        }
    }

    #[test]
    fn test_validate_gradient_wrong_pattern() {
        let (buffer, _) = capture(FrameFormat::new(640, 480, PixelFormat::Mono8), TestPattern::Solid(128), 1);
        assert_eq!(validate_gradient(&buffer), Err(ValidationError::Flat { rise: 0 }));
    }

    #[test]
    fn test_validate_solid() {
        let (buffer, _) = capture(FrameFormat::new(64, 48, PixelFormat::Mono8), TestPattern::Solid(200), 1);
        assert!(validate_solid(&buffer, 200, 0).is_ok());
        assert!(validate_solid(&buffer, 198, 2).is_ok());
        assert!(matches!(
            validate_solid(&buffer, 100, 10),
            Err(ValidationError::Level { actual: 200, .. })
        ));
    }

    #[test]
    fn test_luma_at_bounds() {
        let buffer = FrameBuffer::new(FrameFormat::new(4, 2, PixelFormat::Mono8)).expect("valid buffer");
        assert_eq!(luma_at(&buffer, 3, 1), Some(0));
        assert_eq!(luma_at(&buffer, 4, 0), None);
        assert_eq!(luma_at(&buffer, 0, 2), None);
    }

    #[test]
    fn test_validate_frame_sequence_success() {
        let (_, frames) = capture(FrameFormat::new(64, 48, PixelFormat::Bayer8), TestPattern::Scene, 5);
        assert_eq!(validate_frame_sequence(&frames), Ok(()));
    }

    #[test]
    fn test_validate_frame_sequence_empty() {
        assert_eq!(validate_frame_sequence(&[]), Err(ValidationError::Empty));
    }

    #[test]
    fn test_validate_frame_sequence_with_gap() {
        let (_, mut frames) = capture(FrameFormat::new(64, 48, PixelFormat::Bayer8), TestPattern::Scene, 4);
        frames.remove(2);
        assert_eq!(
            validate_frame_sequence(&frames),
            Err(ValidationError::SequenceGap {
                position: 2,
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn test_validate_frame_sequence_timestamp_regression() {
        let frame = |sequence, millis| FrameMetadata {
            sequence,
            timestamp: Duration::from_millis(millis),
            bytes_written: 0,
        };
        assert_eq!(
            validate_frame_sequence(&[frame(0, 10), frame(1, 5)]),
            Err(ValidationError::TimestampRegression { position: 1 })
        );
    }
}
