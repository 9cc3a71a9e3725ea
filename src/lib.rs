//! Gencam: a generic multi-camera capture driver
//!
//! This library drives arrays of cameras from different vendors through one
//! lifecycle: `init → start_capture → capture_frame* → stop_capture → release`.
//! Each camera family plugs in as a [`Backend`]; a simulated backend supports
//! testing without hardware, and a V4L2 backend is available with the `v4l2`
//! feature.

pub mod auto_exposure;
pub mod buffer;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod info;
pub mod lifecycle;
pub mod mock;
pub mod registry;
pub mod settings;
pub mod traits;
#[cfg(feature = "v4l2")]
pub mod v4l2;
pub mod validation;

pub use auto_exposure::{AutoExposure, Convergence};
pub use buffer::{FourCC, FrameBuffer, FrameFormat, FrameMetadata, InvalidBuffer, PixelFormat};
pub use config::{ConfigError, DriverConfig};
pub use context::SdkContext;
pub use driver::{CameraTarget, GenericCameraDriver};
pub use error::{BackendError, BackendErrorKind, CallSite, CameraError, Result};
pub use info::{BayerPattern, CameraInfo, DeviceDescriptor, ValueRange};
pub use lifecycle::{LifecycleState, StopHandle};
pub use registry::BackendRegistry;
pub use settings::{CameraSettings, Setting, SettingKind, WhiteBalance};
pub use traits::{Backend, BackendAdapter, BackendResult};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Backend;
