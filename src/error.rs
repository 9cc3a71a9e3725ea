//! Error taxonomy for the capture driver and the backend translation boundary.
//!
//! Backends report failures as [`BackendError`], which records the vendor call
//! that failed and the source location of that call. The driver translates
//! these into [`CameraError`], scoping each one to the camera index it
//! concerns.

use std::fmt;
use std::panic::Location;
use std::time::Duration;

use thiserror::Error;

use crate::buffer::FrameFormat;
use crate::lifecycle::LifecycleState;
use crate::settings::SettingKind;

/// Source location of a backend call, captured with `#[track_caller]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Source file of the call.
    pub file: &'static str,
    /// Line of the call.
    pub line: u32,
}

impl CallSite {
    /// Capture the location of the caller.
    #[track_caller]
    #[must_use]
    pub fn here() -> Self {
        Self::from(Location::caller())
    }
}

impl From<&'static Location<'static>> for CallSite {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Category of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The device is missing or vanished.
    NotFound,
    /// The device is held by another process or handle.
    Busy,
    /// The device refused a value.
    Rejected,
    /// The operation is not supported by this device.
    Unsupported,
    /// No frame arrived within the timeout.
    Timeout,
    /// The frame was dropped or arrived corrupt.
    Dropped,
    /// Acquisition was stopped while waiting.
    Stopped,
    /// Underlying I/O or SDK failure.
    Io,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Busy => "busy",
            Self::Rejected => "rejected",
            Self::Unsupported => "unsupported",
            Self::Timeout => "timeout",
            Self::Dropped => "dropped",
            Self::Stopped => "stopped",
            Self::Io => "i/o",
        };
        f.write_str(name)
    }
}

/// Failure reported by a backend adapter.
#[derive(Debug, Clone, Error)]
#[error("{call} failed ({kind}) at {site}: {message}")]
pub struct BackendError {
    /// Failure category.
    pub kind: BackendErrorKind,
    /// Name of the vendor call that failed.
    pub call: &'static str,
    /// Human-readable detail from the backend.
    pub message: String,
    /// Where the vendor call was made.
    pub site: CallSite,
}

impl BackendError {
    /// Create a new error, recording the caller's location.
    #[track_caller]
    pub fn new<M: Into<String>>(kind: BackendErrorKind, call: &'static str, message: M) -> Self {
        Self {
            kind,
            call,
            message: message.into(),
            site: CallSite::here(),
        }
    }

    /// Wrap an I/O error from the named call.
    #[track_caller]
    pub fn io(call: &'static str, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => BackendErrorKind::NotFound,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                BackendErrorKind::Timeout
            }
            std::io::ErrorKind::InvalidInput => BackendErrorKind::Rejected,
            std::io::ErrorKind::Unsupported => BackendErrorKind::Unsupported,
            _ if err.raw_os_error() == Some(EBUSY) => BackendErrorKind::Busy,
            _ => BackendErrorKind::Io,
        };
        Self::new(kind, call, err.to_string())
    }

    /// Turn a vendor status code into a result; zero means success.
    #[track_caller]
    pub fn check(code: i32, call: &'static str) -> std::result::Result<(), Self> {
        if code == 0 {
            Ok(())
        } else {
            Err(Self::new(
                BackendErrorKind::Io,
                call,
                format!("status code {code}"),
            ))
        }
    }
}

const EBUSY: i32 = 16;

/// Error type for driver operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No devices were found, or the rig could not be assembled.
    #[error("device enumeration failed: {reason}")]
    DeviceEnumeration {
        /// Why enumeration failed.
        reason: String,
        /// Backend failure, if one caused it.
        #[source]
        source: Option<BackendError>,
    },

    /// A device could not be opened; the whole array was aborted.
    #[error("failed to open camera {index}")]
    DeviceOpen {
        /// Array position of the device.
        index: usize,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// The operation is not allowed in the current lifecycle state.
    #[error("{operation} is not allowed in state {state}")]
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// State the driver was in.
        state: LifecycleState,
    },

    /// The camera index is out of range.
    #[error("camera index {index} out of range (array has {count} cameras)")]
    InvalidIndex {
        /// Requested index.
        index: usize,
        /// Number of cameras in the array.
        count: usize,
    },

    /// A camera failed to start; every started camera was stopped again.
    #[error("failed to start capture on camera {index}")]
    CaptureStart {
        /// Camera that failed to start.
        index: usize,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// One or more cameras failed to stop cleanly. Non-fatal.
    #[error("failed to stop capture on {} camera(s)", .failures.len())]
    CaptureStop {
        /// Each camera that failed, with its backend failure.
        failures: Vec<(usize, BackendError)>,
    },

    /// The buffer does not match the camera's frame format. Nothing was written.
    #[error("buffer format {actual} does not match camera {index} format {expected}")]
    BufferFormat {
        /// Target camera.
        index: usize,
        /// Format the camera delivers.
        expected: FrameFormat,
        /// Format the buffer declares.
        actual: FrameFormat,
    },

    /// The backend dropped or corrupted a frame. Retryable.
    #[error("frame dropped on camera {index}")]
    FrameDropped {
        /// Camera that dropped the frame.
        index: usize,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// No frame arrived within the configured timeout. Retryable.
    #[error("no frame from camera {index} within {timeout:?}")]
    CaptureTimeout {
        /// Camera that timed out.
        index: usize,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// Acquisition was stopped while waiting for a frame.
    #[error("capture on camera {index} stopped")]
    CaptureStopped {
        /// Camera whose wait was interrupted.
        index: usize,
    },

    /// Auto-exposure did not converge within the frame budget.
    #[error("camera {index} did not converge within {frames} frames")]
    ConvergenceTimeout {
        /// Camera that did not converge.
        index: usize,
        /// Frames discarded before giving up.
        frames: u32,
    },

    /// A setting value is outside what the sensor supports.
    #[error("{setting} rejected on camera {index}: {reason}")]
    SettingRejected {
        /// Target camera.
        index: usize,
        /// Which setting was rejected.
        setting: SettingKind,
        /// Why it was rejected.
        reason: String,
        /// Backend failure, if the device itself refused the value.
        #[source]
        source: Option<BackendError>,
    },

    /// Backend failure outside the other categories.
    #[error("backend failure on camera {index}")]
    Backend {
        /// Camera the failure concerns.
        index: usize,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// Driver configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl CameraError {
    /// Whether retrying the same call may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::FrameDropped { .. } | Self::CaptureTimeout { .. })
    }

    /// Camera index the error is scoped to, if any.
    pub const fn camera_index(&self) -> Option<usize> {
        match self {
            Self::DeviceOpen { index, .. }
            | Self::InvalidIndex { index, .. }
            | Self::CaptureStart { index, .. }
            | Self::BufferFormat { index, .. }
            | Self::FrameDropped { index, .. }
            | Self::CaptureTimeout { index, .. }
            | Self::CaptureStopped { index }
            | Self::ConvergenceTimeout { index, .. }
            | Self::SettingRejected { index, .. }
            | Self::Backend { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Translate a backend failure during frame delivery.
    pub(crate) fn from_capture(index: usize, timeout: Duration, source: BackendError) -> Self {
        match source.kind {
            BackendErrorKind::Dropped => Self::FrameDropped { index, source },
            BackendErrorKind::Timeout => Self::CaptureTimeout { index, timeout },
            BackendErrorKind::Stopped => Self::CaptureStopped { index },
            _ => Self::Backend { index, source },
        }
    }

    /// Translate a backend failure while applying a setting.
    pub(crate) fn from_setting(index: usize, setting: SettingKind, source: BackendError) -> Self {
        match source.kind {
            BackendErrorKind::Rejected | BackendErrorKind::Unsupported => Self::SettingRejected {
                index,
                setting,
                reason: source.message.clone(),
                source: Some(source),
            },
            _ => Self::Backend { index, source },
        }
    }
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, CameraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_records_call_site() {
        let line = line!() + 1;
        let err = BackendError::new(BackendErrorKind::Busy, "OpenDevice", "in use");
        assert_eq!(err.site.line, line);
        assert!(err.site.file.ends_with("error.rs"));
        assert!(err.to_string().contains("OpenDevice"));
    }

    #[test]
    fn test_check_status_code() {
        assert!(BackendError::check(0, "Init").is_ok());
        let err = BackendError::check(-1010, "Init").expect_err("non-zero must fail");
        assert_eq!(err.kind, BackendErrorKind::Io);
        assert!(err.message.contains("-1010"));
    }

    #[test]
    fn test_io_error_mapping() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "poll");
        assert_eq!(BackendError::io("poll", &err).kind, BackendErrorKind::Timeout);

        let err = std::io::Error::from_raw_os_error(EBUSY);
        assert_eq!(BackendError::io("open", &err).kind, BackendErrorKind::Busy);
    }

    #[test]
    fn test_capture_translation() {
        let timeout = Duration::from_millis(5);
        let dropped = BackendError::new(BackendErrorKind::Dropped, "GetNextImage", "incomplete");
        let err = CameraError::from_capture(2, timeout, dropped);
        assert!(matches!(err, CameraError::FrameDropped { index: 2, .. }));
        assert!(err.is_retryable());

        let stopped = BackendError::new(BackendErrorKind::Stopped, "GetNextImage", "");
        let err = CameraError::from_capture(1, timeout, stopped);
        assert!(matches!(err, CameraError::CaptureStopped { index: 1 }));
        assert!(!err.is_retryable());
        assert_eq!(err.camera_index(), Some(1));
    }

    #[test]
    fn test_setting_translation() {
        let rejected = BackendError::new(BackendErrorKind::Rejected, "SetExposure", "too long");
        let err = CameraError::from_setting(0, SettingKind::Exposure, rejected);
        match err {
            CameraError::SettingRejected { reason, source, .. } => {
                assert_eq!(reason, "too long");
                assert!(source.is_some());
            }
            other => panic!("Expected SettingRejected, got {other:?}"),
        }

        let io = BackendError::new(BackendErrorKind::Io, "SetExposure", "bus reset");
        let err = CameraError::from_setting(0, SettingKind::Exposure, io);
        assert!(matches!(err, CameraError::Backend { index: 0, .. }));
    }
}
