//! Backend contracts every camera family implements.
//!
//! A [`Backend`] stands for one vendor SDK: it owns the SDK's process-wide
//! setup, enumerates the devices it can drive, and opens them. Each opened
//! device is a [`BackendAdapter`], exclusively owned by the driver.

use std::time::Duration;

use crate::auto_exposure::Convergence;
use crate::buffer::{FrameBuffer, FrameMetadata};
use crate::error::BackendError;
use crate::info::{CameraInfo, DeviceDescriptor};
use crate::lifecycle::StopSignal;
use crate::settings::{CameraSettings, Setting};

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// One camera family (vendor SDK).
pub trait Backend: Send + Sync {
    /// Unique backend name; also keys the process-wide SDK context.
    fn name(&self) -> &str;

    /// Initialize the SDK. Called once before the first device is enumerated
    /// and not again until after [`Backend::shutdown`].
    fn startup(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Tear the SDK down once no driver uses it any more.
    fn shutdown(&self) {}

    /// List attached devices, in a stable order.
    fn enumerate(&self) -> BackendResult<Vec<DeviceDescriptor>>;

    /// Open one enumerated device.
    fn open(&self, device: &DeviceDescriptor) -> BackendResult<Box<dyn BackendAdapter>>;
}

/// An open device translating generic calls into vendor calls.
///
/// Adapters own their vendor resources and must release them in `close` even
/// when earlier calls failed; dropping an adapter that was not closed must
/// release them too.
pub trait BackendAdapter: Send {
    /// Identity and capabilities of the device.
    fn info(&self) -> BackendResult<CameraInfo>;

    /// Settings currently in effect on the device.
    fn read_settings(&self) -> BackendResult<CameraSettings>;

    /// Apply one setting; returns the value the device actually uses.
    fn apply_setting(&mut self, setting: &Setting) -> BackendResult<Setting>;

    /// Begin acquisition with `buffers` queued frame buffers.
    ///
    /// `stop` is raised to interrupt waits in [`BackendAdapter::deliver_frame`].
    fn start_acquisition(&mut self, stop: &StopSignal, buffers: u32) -> BackendResult<()>;

    /// End acquisition.
    fn stop_acquisition(&mut self) -> BackendResult<()>;

    /// Block until the next frame arrives and write it into `buffer`.
    ///
    /// Frames are delivered in acquisition order. The buffer format has
    /// already been checked against [`CameraInfo::format`]. On any error the
    /// buffer must be left untouched. Fails with
    /// [`BackendErrorKind::Timeout`](crate::error::BackendErrorKind::Timeout)
    /// after `timeout`, and with
    /// [`BackendErrorKind::Stopped`](crate::error::BackendErrorKind::Stopped)
    /// once the stop signal is raised.
    fn deliver_frame(
        &mut self,
        buffer: &mut FrameBuffer,
        timeout: Duration,
    ) -> BackendResult<FrameMetadata>;

    /// State of the auto-exposure loop.
    fn convergence(&self) -> Convergence {
        Convergence::Converged
    }

    /// Release vendor resources. Called once; must not fail to release.
    fn close(&mut self) -> BackendResult<()>;
}
