//! Generic camera driver: one lifecycle over an array of backend adapters.
//!
//! The driver enumerates every registered backend, opens each camera it
//! finds and keeps them as an array whose indices stay stable until
//! [`GenericCameraDriver::release`]. Settings fan out to one camera or to the
//! whole array; frames are written into caller-owned [`FrameBuffer`]s.
//!
//! Across cameras, frames share an exposure instant only when every camera
//! declares hardware trigger support (see
//! [`GenericCameraDriver::is_hardware_synchronized`]). Otherwise captures on
//! different indices are unrelated in time.

use std::ops::Range;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auto_exposure::Convergence;
use crate::buffer::{FrameBuffer, FrameMetadata};
use crate::config::DriverConfig;
use crate::context::SdkContext;
use crate::error::{BackendError, BackendErrorKind, CameraError, Result};
use crate::info::{BayerPattern, CameraInfo, DeviceDescriptor};
use crate::lifecycle::{LifecycleState, Operation, StopHandle, StopSignal};
use crate::registry::BackendRegistry;
use crate::settings::{CameraSettings, Setting, SettingKind, WhiteBalance};
use crate::traits::{Backend, BackendAdapter};

/// Cameras addressed by a settings call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraTarget {
    /// Every camera in the array, in index order.
    All,
    /// One camera.
    Index(usize),
}

impl CameraTarget {
    /// Interpret a raw index where `-1` means every camera.
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw == -1 {
            Some(Self::All)
        } else if raw >= 0 {
            #[allow(clippy::cast_sign_loss)]
            Some(Self::Index(raw as usize))
        } else {
            None
        }
    }
}

impl From<usize> for CameraTarget {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

struct CameraSlot {
    settings: CameraSettings,
    adapter: Box<dyn BackendAdapter>,
    capturing: bool,
}

impl CameraSlot {
    /// Replace the cached settings with what the device reports.
    fn refresh(&mut self) {
        if let Ok(settings) = self.adapter.read_settings() {
            self.settings = settings;
        }
    }

    /// Put back the values `applied` replaced, newest first.
    fn restore(&mut self, index: usize, before: &CameraSettings, applied: &[Setting]) {
        for step in applied.iter().rev() {
            let previous = before.get(step.kind());
            match self.adapter.apply_setting(&previous) {
                Ok(effective) => self.settings.record(&effective),
                Err(err) => warn!(index, ?previous, error = %err, "setting rollback failed"),
            }
        }
        self.refresh();
    }
}

struct CameraArray {
    infos: Vec<CameraInfo>,
    slots: Vec<CameraSlot>,
    // Released after the adapters, which may still need the SDK to close.
    contexts: Vec<SdkContext>,
}

/// Drives an array of cameras through
/// `init → start_capture → capture_frame* → stop_capture → release`.
pub struct GenericCameraDriver {
    registry: BackendRegistry,
    config: DriverConfig,
    state: LifecycleState,
    array: Option<CameraArray>,
    stop: StopSignal,
}

impl GenericCameraDriver {
    /// Create an uninitialized driver over the given backends.
    pub fn new(registry: BackendRegistry, config: DriverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            config,
            state: LifecycleState::Uninitialized,
            array: None,
            stop: StopSignal::new(),
        })
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Driver configuration.
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Number of cameras in the array; zero unless initialized.
    pub fn len(&self) -> usize {
        self.array.as_ref().map_or(0, |array| array.slots.len())
    }

    /// Whether the array holds no cameras.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle that interrupts frame waits from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.stop.clone())
    }

    /// Whether frames captured in index order share one exposure instant.
    pub fn is_hardware_synchronized(&self) -> bool {
        self.array.as_ref().is_some_and(|array| {
            !array.infos.is_empty() && array.infos.iter().all(|info| info.hardware_trigger)
        })
    }

    fn require(&self, op: Operation) -> Result<()> {
        if self.state.permits(op) {
            Ok(())
        } else {
            Err(CameraError::InvalidState {
                operation: op.name(),
                state: self.state,
            })
        }
    }

    fn array(&self, op: Operation) -> Result<&CameraArray> {
        self.require(op)?;
        self.array.as_ref().ok_or(CameraError::InvalidState {
            operation: op.name(),
            state: self.state,
        })
    }

    fn array_mut(&mut self, op: Operation) -> Result<&mut CameraArray> {
        self.require(op)?;
        let state = self.state;
        self.array.as_mut().ok_or(CameraError::InvalidState {
            operation: op.name(),
            state,
        })
    }

    /// Enumerate and open every camera of every registered backend.
    ///
    /// Fails without opening anything if no camera is found; if any camera
    /// fails to open, every camera opened so far is closed again and the
    /// driver stays uninitialized.
    pub fn init(&mut self) -> Result<()> {
        self.require(Operation::Init)?;

        let mut contexts = Vec::new();
        let mut found = Vec::new();
        for backend in self.registry.iter() {
            let context = SdkContext::acquire(backend).map_err(|source| {
                CameraError::DeviceEnumeration {
                    reason: format!("{} SDK failed to start", backend.name()),
                    source: Some(source),
                }
            })?;
            let devices = backend
                .enumerate()
                .map_err(|source| CameraError::DeviceEnumeration {
                    reason: format!("{} enumeration failed", backend.name()),
                    source: Some(source),
                })?;
            debug!(backend = backend.name(), devices = devices.len(), "enumerated");
            if devices.is_empty() {
                continue;
            }
            contexts.push(context);
            found.extend(devices.into_iter().map(|device| (Arc::clone(backend), device)));
        }
        if found.is_empty() {
            return Err(CameraError::DeviceEnumeration {
                reason: "no cameras found".to_owned(),
                source: None,
            });
        }

        let ordered = arrange(found, &self.config.rig_order)?;
        let (infos, slots) = open_all(&ordered)?;

        if self.config.require_hardware_sync {
            if let Some(index) = infos.iter().position(|info| !info.hardware_trigger) {
                close_all(slots);
                return Err(CameraError::DeviceEnumeration {
                    reason: format!("camera {index} does not support hardware triggering"),
                    source: None,
                });
            }
        }

        for (index, info) in infos.iter().enumerate() {
            info!(
                index,
                backend = %info.backend,
                model = %info.model,
                serial = %info.serial,
                format = %info.format,
                "camera opened"
            );
        }
        info!(cameras = slots.len(), "camera array initialized");

        self.array = Some(CameraArray {
            infos,
            slots,
            contexts,
        });
        self.state = LifecycleState::Initialized;
        Ok(())
    }

    /// Start acquisition on every camera.
    ///
    /// If any camera fails to start, the cameras already started are stopped
    /// again and the driver stays in its previous state.
    pub fn start_capture(&mut self) -> Result<()> {
        let buffers = self.config.stream_buffers;
        let stop = self.stop.clone();
        let array = self.array_mut(Operation::StartCapture)?;
        stop.clear();

        let mut failure = None;
        for (index, slot) in array.slots.iter_mut().enumerate() {
            match slot.adapter.start_acquisition(&stop, buffers) {
                Ok(()) => slot.capturing = true,
                Err(source) => {
                    failure = Some((index, source));
                    break;
                }
            }
        }

        if let Some((index, source)) = failure {
            warn!(index, error = %source, "capture start failed, rolling back");
            for (started, slot) in array
                .slots
                .iter_mut()
                .enumerate()
                .filter(|(_, slot)| slot.capturing)
            {
                if let Err(err) = slot.adapter.stop_acquisition() {
                    warn!(index = started, error = %err, "rollback stop failed");
                }
                slot.capturing = false;
            }
            return Err(CameraError::CaptureStart { index, source });
        }

        info!(cameras = array.slots.len(), "capture started");
        self.state = LifecycleState::Capturing;
        Ok(())
    }

    /// Stop acquisition on every camera.
    ///
    /// Every camera is stopped even if some fail; the failures are returned
    /// together and the driver is `Stopped` either way.
    pub fn stop_capture(&mut self) -> Result<()> {
        let stop = self.stop.clone();
        let array = self.array_mut(Operation::StopCapture)?;
        stop.raise();

        let failures: Vec<(usize, BackendError)> = array
            .slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.capturing = false;
                slot.adapter.stop_acquisition().err().map(|err| (index, err))
            })
            .collect();

        self.state = LifecycleState::Stopped;
        if failures.is_empty() {
            info!("capture stopped");
            Ok(())
        } else {
            for (index, err) in &failures {
                warn!(index, error = %err, "camera failed to stop cleanly");
            }
            Err(CameraError::CaptureStop { failures })
        }
    }

    /// Close every camera and release backend SDKs. Idempotent.
    ///
    /// Adapters are closed regardless of earlier failures; close failures
    /// are logged.
    pub fn release(&mut self) -> Result<()> {
        if self.state == LifecycleState::Released {
            return Ok(());
        }
        self.stop.raise();
        if let Some(array) = self.array.take() {
            let CameraArray {
                mut slots, contexts, ..
            } = array;
            for (index, slot) in slots.iter_mut().enumerate().filter(|(_, slot)| slot.capturing) {
                if let Err(err) = slot.adapter.stop_acquisition() {
                    warn!(index, error = %err, "stop during release failed");
                }
                slot.capturing = false;
            }
            close_all(slots);
            drop(contexts);
        }
        self.state = LifecycleState::Released;
        info!("camera array released");
        Ok(())
    }

    /// Identity and capability records of every camera, in index order.
    pub fn cam_infos(&self) -> Result<&[CameraInfo]> {
        Ok(&self.array(Operation::Query)?.infos)
    }

    /// Identity and capability record of one camera.
    pub fn cam_info(&self, index: usize) -> Result<&CameraInfo> {
        let array = self.array(Operation::Query)?;
        array.infos.get(index).ok_or(CameraError::InvalidIndex {
            index,
            count: array.infos.len(),
        })
    }

    /// Settings in effect on one camera, as reported by its backend.
    pub fn settings(&self, index: usize) -> Result<&CameraSettings> {
        let array = self.array(Operation::Query)?;
        array
            .slots
            .get(index)
            .map(|slot| &slot.settings)
            .ok_or(CameraError::InvalidIndex {
                index,
                count: array.slots.len(),
            })
    }

    /// Sensor color filter layout of one camera.
    pub fn bayer_pattern(&self, index: usize) -> Result<BayerPattern> {
        self.cam_info(index).map(|info| info.bayer_pattern)
    }

    /// Set the frame rate. A manual exposure longer than the new frame
    /// period is shortened to fit.
    pub fn set_fps(&mut self, target: CameraTarget, fps: f32) -> Result<()> {
        self.apply(target, Setting::FrameRate(fps))
    }

    /// Set a manual exposure time in microseconds; switches auto-exposure
    /// off. The frame rate is lowered if the exposure does not fit a frame.
    pub fn set_exposure(&mut self, target: CameraTarget, exposure_us: u32) -> Result<()> {
        self.apply(target, Setting::Exposure(exposure_us))
    }

    /// Hand exposure control to the camera's auto-exposure loop, or take it back.
    pub fn set_auto_exposure(&mut self, target: CameraTarget, enabled: bool) -> Result<()> {
        self.apply(target, Setting::AutoExposure(enabled))
    }

    /// Set the mean output intensity, `0.0..=1.0`, auto-exposure aims for.
    pub fn set_auto_exposure_level(&mut self, target: CameraTarget, level: f32) -> Result<()> {
        self.apply(target, Setting::AutoExposureLevel(level))
    }

    /// Enable continuous automatic white balance.
    pub fn set_white_balance(&mut self, target: CameraTarget) -> Result<()> {
        self.apply(target, Setting::WhiteBalance(WhiteBalance::Auto))
    }

    /// Select a white balance mode.
    pub fn set_white_balance_mode(&mut self, target: CameraTarget, mode: WhiteBalance) -> Result<()> {
        self.apply(target, Setting::WhiteBalance(mode))
    }

    /// Set the analog gain in dB.
    pub fn set_gain(&mut self, target: CameraTarget, gain_db: f32) -> Result<()> {
        self.apply(target, Setting::Gain(gain_db))
    }

    fn apply(&mut self, target: CameraTarget, requested: Setting) -> Result<()> {
        let array = self.array_mut(Operation::Configure)?;
        for index in resolve(target, array.slots.len())? {
            apply_one(array, index, requested)?;
        }
        Ok(())
    }

    /// Discard `frames` frames on every camera so recent settings take hold.
    ///
    /// Cameras settle concurrently. Dropped frames count towards the budget;
    /// timeouts abort. A stop aborts with `CaptureStopped` for the lowest
    /// index whose settling it interrupted; cameras that had already settled
    /// are not reported. Afterwards every camera under auto-exposure must
    /// report convergence, otherwise `ConvergenceTimeout` names the first
    /// camera that did not converge.
    pub fn make_set_effective(&mut self, frames: u32) -> Result<()> {
        let timeout = self.config.capture_timeout();
        let stop = self.stop.clone();
        let array = self.array_mut(Operation::Capture)?;

        let mut scratch = array
            .infos
            .iter()
            .enumerate()
            .map(|(index, info)| {
                FrameBuffer::new(info.format).map_err(|err| CameraError::Backend {
                    index,
                    source: BackendError::new(
                        BackendErrorKind::Unsupported,
                        "FrameBuffer::new",
                        err.to_string(),
                    ),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let outcomes: Vec<Result<()>> = thread::scope(|scope| {
            let handles: Vec<_> = array
                .slots
                .iter_mut()
                .zip(scratch.iter_mut())
                .enumerate()
                .map(|(index, (slot, buffer))| {
                    let stop = &stop;
                    scope.spawn(move || settle(index, slot, buffer, stop, frames, timeout))
                })
                .collect();
            handles.into_iter().map(join).collect()
        });

        for slot in &mut array.slots {
            slot.refresh();
        }
        outcomes.into_iter().collect::<Result<Vec<()>>>()?;
        debug!(frames, "settings effective");
        Ok(())
    }

    /// [`make_set_effective`](Self::make_set_effective) with the configured
    /// default frame count.
    pub fn make_set_effective_default(&mut self) -> Result<()> {
        self.make_set_effective(self.config.settle_frames)
    }

    /// Block until camera `index` delivers a frame and write it into `buffer`.
    ///
    /// The buffer's width, height and pixel format must match the camera's
    /// exactly; otherwise nothing is written. On a dropped frame, timeout or
    /// stop the buffer is left untouched.
    pub fn capture_frame(&mut self, index: usize, buffer: &mut FrameBuffer) -> Result<FrameMetadata> {
        let timeout = self.config.capture_timeout();
        let stop = self.stop.clone();
        let array = self.array_mut(Operation::Capture)?;
        let count = array.slots.len();
        let (Some(info), Some(slot)) = (array.infos.get(index), array.slots.get_mut(index)) else {
            return Err(CameraError::InvalidIndex { index, count });
        };
        if stop.is_raised() {
            return Err(CameraError::CaptureStopped { index });
        }
        check_format(index, info, buffer)?;

        let metadata = slot
            .adapter
            .deliver_frame(buffer, timeout)
            .map_err(|source| CameraError::from_capture(index, timeout, source))?;
        slot.refresh();
        debug!(index, sequence = metadata.sequence, "frame delivered");
        Ok(metadata)
    }

    /// Capture one frame from every camera concurrently, `buffers[i]` for
    /// camera `i`.
    ///
    /// The outer result reports state errors and a buffer count that differs
    /// from the camera count; each camera's own outcome is in the returned
    /// vector.
    pub fn capture_all(&mut self, buffers: &mut [FrameBuffer]) -> Result<Vec<Result<FrameMetadata>>> {
        let timeout = self.config.capture_timeout();
        let stop = self.stop.clone();
        let array = self.array_mut(Operation::Capture)?;
        let count = array.slots.len();
        if buffers.len() != count {
            return Err(CameraError::InvalidIndex {
                index: buffers.len().min(count),
                count,
            });
        }

        let infos = &array.infos;
        let results = thread::scope(|scope| {
            let handles: Vec<_> = array
                .slots
                .iter_mut()
                .zip(buffers.iter_mut())
                .enumerate()
                .map(|(index, (slot, buffer))| {
                    let info = infos.get(index);
                    let stop = &stop;
                    scope.spawn(move || {
                        if stop.is_raised() {
                            return Err(CameraError::CaptureStopped { index });
                        }
                        let info = info.ok_or(CameraError::InvalidIndex { index, count })?;
                        check_format(index, info, buffer)?;
                        let metadata = slot
                            .adapter
                            .deliver_frame(buffer, timeout)
                            .map_err(|source| CameraError::from_capture(index, timeout, source))?;
                        slot.refresh();
                        Ok(metadata)
                    })
                })
                .collect();
            handles.into_iter().map(join).collect::<Vec<_>>()
        });
        debug!(cameras = count, "array capture finished");
        Ok(results)
    }
}

impl Drop for GenericCameraDriver {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl std::fmt::Debug for GenericCameraDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericCameraDriver")
            .field("registry", &self.registry)
            .field("state", &self.state)
            .field("cameras", &self.len())
            .finish_non_exhaustive()
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
}

fn resolve(target: CameraTarget, count: usize) -> Result<Range<usize>> {
    match target {
        CameraTarget::All => Ok(0..count),
        CameraTarget::Index(index) if index < count => Ok(index..index + 1),
        CameraTarget::Index(index) => Err(CameraError::InvalidIndex { index, count }),
    }
}

fn check_format(index: usize, info: &CameraInfo, buffer: &FrameBuffer) -> Result<()> {
    if info.format.accepts(buffer.format()) {
        Ok(())
    } else {
        Err(CameraError::BufferFormat {
            index,
            expected: info.format,
            actual: *buffer.format(),
        })
    }
}

fn apply_one(array: &mut CameraArray, index: usize, requested: Setting) -> Result<()> {
    let count = array.slots.len();
    let (Some(info), Some(slot)) = (array.infos.get(index), array.slots.get_mut(index)) else {
        return Err(CameraError::InvalidIndex { index, count });
    };

    // Auto-exposure moves exposure behind the driver's back.
    slot.refresh();
    let before = slot.settings;
    let plan = before
        .negotiate(info, requested)
        .map_err(|rejection| CameraError::SettingRejected {
            index,
            setting: rejection.setting,
            reason: rejection.reason,
            source: None,
        })?;
    if plan.len() > 1 {
        info!(index, ?requested, ?plan, "setting renegotiated");
    }

    for (applied, step) in plan.iter().enumerate() {
        match slot.adapter.apply_setting(step) {
            Ok(effective) => {
                if effective != *step {
                    debug!(index, ?step, ?effective, "device adjusted setting");
                }
                slot.settings.record(&effective);
            }
            Err(source) => {
                slot.restore(index, &before, plan.get(..applied).unwrap_or_default());
                return Err(CameraError::from_setting(index, step.kind(), source));
            }
        }
    }
    slot.refresh();

    // The device may round the frame rate up past what the exposure needs.
    if let Some(fitted) = slot.settings.fitted_exposure() {
        debug!(index, exposure_us = slot.settings.exposure_us, fitted, "clamping exposure to frame period");
        let effective = slot
            .adapter
            .apply_setting(&Setting::Exposure(fitted))
            .map_err(|source| CameraError::from_setting(index, SettingKind::Exposure, source))?;
        slot.settings.record(&effective);
        slot.refresh();
    }
    debug!(index, ?requested, "setting applied");
    Ok(())
}

fn settle(
    index: usize,
    slot: &mut CameraSlot,
    scratch: &mut FrameBuffer,
    stop: &StopSignal,
    frames: u32,
    timeout: Duration,
) -> Result<()> {
    for _ in 0..frames {
        if stop.is_raised() {
            return Err(CameraError::CaptureStopped { index });
        }
        match slot.adapter.deliver_frame(scratch, timeout) {
            Ok(_) => {}
            Err(err) if err.kind == BackendErrorKind::Dropped => {
                debug!(index, "dropped frame while settling");
            }
            Err(err) => return Err(CameraError::from_capture(index, timeout, err)),
        }
    }
    match slot.adapter.convergence() {
        Convergence::Converged => Ok(()),
        state => {
            warn!(index, frames, ?state, "auto-exposure did not converge");
            Err(CameraError::ConvergenceTimeout { index, frames })
        }
    }
}

/// Put cameras listed in `rig_order` first, in that order; the rest follow
/// in enumeration order.
fn arrange(
    mut found: Vec<(Arc<dyn Backend>, DeviceDescriptor)>,
    rig_order: &[String],
) -> Result<Vec<(Arc<dyn Backend>, DeviceDescriptor)>> {
    let mut ordered = Vec::with_capacity(found.len());
    for serial in rig_order {
        let position = found
            .iter()
            .position(|(_, device)| &device.serial == serial)
            .ok_or_else(|| CameraError::DeviceEnumeration {
                reason: format!("camera {serial} listed in rig_order was not found"),
                source: None,
            })?;
        ordered.push(found.remove(position));
    }
    ordered.append(&mut found);
    Ok(ordered)
}

fn open_all(
    devices: &[(Arc<dyn Backend>, DeviceDescriptor)],
) -> Result<(Vec<CameraInfo>, Vec<CameraSlot>)> {
    let mut infos = Vec::with_capacity(devices.len());
    let mut slots = Vec::with_capacity(devices.len());
    for (index, (backend, device)) in devices.iter().enumerate() {
        match open_one(backend.as_ref(), device) {
            Ok((info, slot)) => {
                infos.push(info);
                slots.push(slot);
            }
            Err(source) => {
                warn!(index, address = %device.address, error = %source, "open failed, closing array");
                close_all(slots);
                return Err(CameraError::DeviceOpen { index, source });
            }
        }
    }
    Ok((infos, slots))
}

fn open_one(
    backend: &dyn Backend,
    device: &DeviceDescriptor,
) -> std::result::Result<(CameraInfo, CameraSlot), BackendError> {
    let mut adapter = backend.open(device)?;
    let described = adapter
        .info()
        .and_then(|info| adapter.read_settings().map(|settings| (info, settings)));
    match described {
        Ok((info, settings)) => {
            if let Err(rejection) = settings.validate(&info) {
                warn!(serial = %info.serial, reason = %rejection.reason, "camera opened with inconsistent settings");
            }
            Ok((
                info,
                CameraSlot {
                    settings,
                    adapter,
                    capturing: false,
                },
            ))
        }
        Err(err) => {
            let _ = adapter.close();
            Err(err)
        }
    }
}

fn close_all(slots: Vec<CameraSlot>) {
    for (index, mut slot) in slots.into_iter().enumerate() {
        if let Err(err) = slot.adapter.close() {
            warn!(index, error = %err, "close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCameraSpec, MockRig};

    #[test]
    fn test_target_from_raw() {
        assert_eq!(CameraTarget::from_raw(-1), Some(CameraTarget::All));
        assert_eq!(CameraTarget::from_raw(3), Some(CameraTarget::Index(3)));
        assert_eq!(CameraTarget::from_raw(-2), None);
        assert_eq!(CameraTarget::from(2), CameraTarget::Index(2));
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve(CameraTarget::All, 3).expect("all"), 0..3);
        assert_eq!(resolve(CameraTarget::Index(1), 3).expect("one"), 1..2);
        assert!(matches!(
            resolve(CameraTarget::Index(3), 3),
            Err(CameraError::InvalidIndex { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_arrange_by_rig_order() {
        let rig: Arc<dyn Backend> = Arc::new(MockRig::named(
            "order",
            vec![
                MockCameraSpec::default().with_serial("A"),
                MockCameraSpec::default().with_serial("B"),
                MockCameraSpec::default().with_serial("C"),
            ],
        ));
        let found: Vec<_> = rig
            .enumerate()
            .expect("enumerate")
            .into_iter()
            .map(|device| (Arc::clone(&rig), device))
            .collect();

        let ordered = arrange(found.clone(), &["C".to_owned(), "A".to_owned()]).expect("arranged");
        let serials: Vec<&str> = ordered.iter().map(|(_, device)| device.serial.as_str()).collect();
        assert_eq!(serials, ["C", "A", "B"]);

        let missing = arrange(found, &["Z".to_owned()]);
        assert!(matches!(missing, Err(CameraError::DeviceEnumeration { .. })));
    }

    #[test]
    fn test_operations_before_init_fail() {
        let rig = MockRig::new(1);
        let mut driver = GenericCameraDriver::new(BackendRegistry::new().with(rig), DriverConfig::default())
            .expect("valid config");

        assert!(matches!(
            driver.start_capture(),
            Err(CameraError::InvalidState { operation: "start_capture", .. })
        ));
        assert!(matches!(driver.cam_infos(), Err(CameraError::InvalidState { .. })));
        assert!(matches!(
            driver.set_fps(CameraTarget::All, 30.0),
            Err(CameraError::InvalidState { .. })
        ));
        assert!(driver.is_empty());
    }

    #[test]
    fn test_empty_registry_fails_enumeration() {
        let mut driver =
            GenericCameraDriver::new(BackendRegistry::new(), DriverConfig::default()).expect("valid config");
        assert!(matches!(
            driver.init(),
            Err(CameraError::DeviceEnumeration { source: None, .. })
        ));
        assert_eq!(driver.state(), LifecycleState::Uninitialized);
    }
}
