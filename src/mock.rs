//! Simulated camera backend for testing without hardware.
//!
//! A [`MockRig`] is a backend with a fixed set of cameras. It counts SDK,
//! open and acquisition calls, records them in order, and lets tests inject
//! faults per camera after the driver has taken ownership of the adapters.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::auto_exposure::{AutoExposure, Convergence};
use crate::buffer::{FrameBuffer, FrameFormat, FrameMetadata, PixelFormat};
use crate::error::{BackendError, BackendErrorKind};
use crate::info::{BayerPattern, CameraInfo, DeviceDescriptor, ValueRange};
use crate::lifecycle::StopSignal;
use crate::settings::{frame_period_us, CameraSettings, Setting, SettingKind};
use crate::traits::{Backend, BackendAdapter, BackendResult};

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// Flat field whose brightness follows exposure, gain and scene radiance.
    Scene,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Every sample set to the given 8-bit level.
    Solid(u8),
}

/// Static description of one simulated camera.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCameraSpec {
    /// Model name.
    pub model: String,
    /// Serial number; generated from the rig name when empty.
    pub serial: String,
    /// Sensor color filter layout.
    pub bayer_pattern: BayerPattern,
    /// Delivered frame format.
    pub format: FrameFormat,
    /// Supported frame rates.
    pub fps_range: ValueRange<f32>,
    /// Frame rate quantization step.
    pub fps_step: f32,
    /// Supported exposure times in microseconds.
    pub exposure_range: ValueRange<u32>,
    /// Supported gain in dB.
    pub gain_range: ValueRange<f32>,
    /// Whether the camera accepts a hardware trigger.
    pub hardware_trigger: bool,
    /// Content of delivered frames.
    pub pattern: TestPattern,
    /// Normalized intensity gathered per microsecond of exposure at 0 dB.
    pub radiance: f32,
    /// Real time between frames; `None` delivers immediately.
    pub frame_interval: Option<Duration>,
    /// Settings in effect when the device is opened.
    pub initial: CameraSettings,
}

impl Default for MockCameraSpec {
    fn default() -> Self {
        Self {
            model: "Mock Camera".to_owned(),
            serial: String::new(),
            bayer_pattern: BayerPattern::Rggb,
            format: FrameFormat::new(64, 48, PixelFormat::Bayer8),
            fps_range: ValueRange::new(1.0, 120.0),
            fps_step: 0.01,
            exposure_range: ValueRange::new(20, 1_000_000),
            gain_range: ValueRange::new(0.0, 24.0),
            hardware_trigger: false,
            pattern: TestPattern::Scene,
            radiance: 0.5 / 10_000.0,
            frame_interval: None,
            initial: CameraSettings::default(),
        }
    }
}

impl MockCameraSpec {
    /// Set the frame format.
    #[must_use]
    pub const fn with_format(mut self, format: FrameFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the frame content.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set the serial number.
    #[must_use]
    pub fn with_serial(mut self, serial: &str) -> Self {
        serial.clone_into(&mut self.serial);
        self
    }

    /// Declare hardware trigger support.
    #[must_use]
    pub const fn with_hardware_trigger(mut self, supported: bool) -> Self {
        self.hardware_trigger = supported;
        self
    }

    /// Pace frames in real time.
    #[must_use]
    pub const fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }
}

/// One call made against the rig, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEvent {
    /// SDK started.
    Startup,
    /// Camera opened.
    Open(usize),
    /// Acquisition started on a camera.
    Start(usize),
    /// Acquisition stopped on a camera.
    Stop(usize),
    /// Camera closed.
    Close(usize),
    /// SDK shut down.
    Shutdown,
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    fail_open: bool,
    fail_start: bool,
    fail_stop: bool,
    fail_close: bool,
    reject_settings: bool,
    reject_kind: Option<SettingKind>,
    stall: bool,
    drop_frames: u32,
    radiance: Option<f32>,
}

#[derive(Debug)]
struct MockCamera {
    spec: MockCameraSpec,
    faults: Mutex<Faults>,
    open: AtomicBool,
    acquiring: AtomicBool,
}

impl MockCamera {
    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct MockStats {
    startups: AtomicUsize,
    shutdowns: AtomicUsize,
    events: Mutex<Vec<MockEvent>>,
}

impl MockStats {
    fn record(&self, event: MockEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[derive(Debug)]
struct RigShared {
    name: String,
    cameras: Vec<Arc<MockCamera>>,
    stats: Arc<MockStats>,
}

/// Simulated backend with a fixed set of cameras.
///
/// Clones share state, so a test can keep one clone for inspection and fault
/// injection while the driver's registry holds another.
#[derive(Debug, Clone)]
pub struct MockRig {
    shared: Arc<RigShared>,
}

impl MockRig {
    /// Rig of `count` default cameras with a unique backend name.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self::with_specs(vec![MockCameraSpec::default(); count])
    }

    /// Rig with the given backend name and cameras.
    #[must_use]
    pub fn named(name: &str, specs: Vec<MockCameraSpec>) -> Self {
        let cameras = specs
            .into_iter()
            .enumerate()
            .map(|(index, mut spec)| {
                if spec.serial.is_empty() {
                    spec.serial = format!("{name}-{index:04}");
                }
                Arc::new(MockCamera {
                    spec,
                    faults: Mutex::default(),
                    open: AtomicBool::new(false),
                    acquiring: AtomicBool::new(false),
                })
            })
            .collect();
        Self {
            shared: Arc::new(RigShared {
                name: name.to_owned(),
                cameras,
                stats: Arc::default(),
            }),
        }
    }

    /// Rig with a unique backend name and the given cameras.
    #[must_use]
    pub fn with_specs(specs: Vec<MockCameraSpec>) -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        Self::named(&format!("mock-{id}"), specs)
    }

    fn camera(&self, index: usize) -> Option<&Arc<MockCamera>> {
        self.shared.cameras.get(index)
    }

    fn set_fault<F: FnOnce(&mut Faults)>(&self, index: usize, apply: F) {
        if let Some(camera) = self.camera(index) {
            apply(&mut camera.faults());
        }
    }

    /// Make opening camera `index` fail.
    pub fn fail_open(&self, index: usize) {
        self.set_fault(index, |faults| faults.fail_open = true);
    }

    /// Make starting acquisition on camera `index` fail.
    pub fn fail_start(&self, index: usize) {
        self.set_fault(index, |faults| faults.fail_start = true);
    }

    /// Make stopping acquisition on camera `index` report a failure.
    pub fn fail_stop(&self, index: usize) {
        self.set_fault(index, |faults| faults.fail_stop = true);
    }

    /// Make closing camera `index` report a failure; resources are still released.
    pub fn fail_close(&self, index: usize) {
        self.set_fault(index, |faults| faults.fail_close = true);
    }

    /// Make camera `index` refuse every setting.
    pub fn reject_settings(&self, index: usize, reject: bool) {
        self.set_fault(index, |faults| faults.reject_settings = reject);
    }

    /// Make camera `index` refuse one kind of setting, or none.
    pub fn reject_setting(&self, index: usize, kind: Option<SettingKind>) {
        self.set_fault(index, |faults| faults.reject_kind = kind);
    }

    /// Make camera `index` stop delivering frames.
    pub fn stall(&self, index: usize, stalled: bool) {
        self.set_fault(index, |faults| faults.stall = stalled);
    }

    /// Drop the next `frames` frames of camera `index`.
    pub fn drop_frames(&self, index: usize, frames: u32) {
        self.set_fault(index, |faults| faults.drop_frames = frames);
    }

    /// Change the scene brightness seen by camera `index`.
    pub fn set_radiance(&self, index: usize, radiance: f32) {
        self.set_fault(index, |faults| faults.radiance = Some(radiance));
    }

    /// Cameras currently open.
    pub fn open_handles(&self) -> usize {
        self.shared
            .cameras
            .iter()
            .filter(|camera| camera.open.load(Ordering::SeqCst))
            .count()
    }

    /// Cameras currently acquiring.
    pub fn running(&self) -> usize {
        self.shared
            .cameras
            .iter()
            .filter(|camera| camera.acquiring.load(Ordering::SeqCst))
            .count()
    }

    /// Number of SDK startups so far.
    pub fn startups(&self) -> usize {
        self.shared.stats.startups.load(Ordering::SeqCst)
    }

    /// Number of SDK shutdowns so far.
    pub fn shutdowns(&self) -> usize {
        self.shared.stats.shutdowns.load(Ordering::SeqCst)
    }

    /// Every call made against the rig, in order.
    pub fn events(&self) -> Vec<MockEvent> {
        self.shared
            .stats
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Backend for MockRig {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn startup(&self) -> BackendResult<()> {
        self.shared.stats.startups.fetch_add(1, Ordering::SeqCst);
        self.shared.stats.record(MockEvent::Startup);
        Ok(())
    }

    fn shutdown(&self) {
        self.shared.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.shared.stats.record(MockEvent::Shutdown);
    }

    fn enumerate(&self) -> BackendResult<Vec<DeviceDescriptor>> {
        Ok(self
            .shared
            .cameras
            .iter()
            .enumerate()
            .map(|(index, camera)| DeviceDescriptor {
                address: format!("mock:{index}"),
                serial: camera.spec.serial.clone(),
                model: camera.spec.model.clone(),
            })
            .collect())
    }

    fn open(&self, device: &DeviceDescriptor) -> BackendResult<Box<dyn BackendAdapter>> {
        let index = device
            .address
            .strip_prefix("mock:")
            .and_then(|index| index.parse::<usize>().ok())
            .ok_or_else(|| {
                BackendError::new(BackendErrorKind::NotFound, "MockOpen", device.address.clone())
            })?;
        let camera = self.camera(index).ok_or_else(|| {
            BackendError::new(BackendErrorKind::NotFound, "MockOpen", device.address.clone())
        })?;

        if camera.faults().fail_open {
            return Err(BackendError::new(
                BackendErrorKind::Io,
                "MockOpen",
                "injected open failure",
            ));
        }
        if camera.open.swap(true, Ordering::SeqCst) {
            return Err(BackendError::new(
                BackendErrorKind::Busy,
                "MockOpen",
                format!("{} already open", device.address),
            ));
        }
        self.shared.stats.record(MockEvent::Open(index));

        Ok(Box::new(MockAdapter::new(
            self.shared.name.clone(),
            index,
            Arc::clone(camera),
            Arc::clone(&self.shared.stats),
        )))
    }
}

/// Open handle on a simulated camera.
#[derive(Debug)]
pub struct MockAdapter {
    backend: String,
    index: usize,
    camera: Arc<MockCamera>,
    stats: Arc<MockStats>,
    settings: CameraSettings,
    auto_exposure: AutoExposure,
    stop: Option<StopSignal>,
    sequence: u64,
    clock: Duration,
    closed: bool,
}

impl MockAdapter {
    fn new(backend: String, index: usize, camera: Arc<MockCamera>, stats: Arc<MockStats>) -> Self {
        let settings = camera.spec.initial;
        let limits = exposure_limits(&camera.spec, settings.fps);
        Self {
            backend,
            index,
            auto_exposure: AutoExposure::new(settings.auto_exposure_level, limits),
            camera,
            stats,
            settings,
            stop: None,
            sequence: 0,
            clock: Duration::ZERO,
            closed: false,
        }
    }

    #[track_caller]
    fn error(kind: BackendErrorKind, call: &'static str, message: &str) -> BackendError {
        BackendError::new(kind, call, message)
    }

    fn scene_level(&self, radiance: f32) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let exposure = self.settings.exposure_us as f32;
        let gain = 10f32.powf(self.settings.gain_db / 20.0);
        (radiance * exposure * gain).clamp(0.0, 1.0)
    }

    fn render(&self, buffer: &mut FrameBuffer, radiance: f32) -> usize {
        let format = *buffer.format();
        let width = format.width.max(1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scene = (self.scene_level(radiance) * 255.0).round() as u8;
        let pattern = self.camera.spec.pattern;

        buffer.fill_rows(|_, line| {
            let bytes_per_pixel = format.pixel_format.bytes_per_pixel() as usize;
            for (x, pixel) in (0u32..).zip(line.chunks_exact_mut(bytes_per_pixel)) {
                #[allow(clippy::cast_possible_truncation)]
                let level = match pattern {
                    TestPattern::Scene => scene,
                    TestPattern::Gradient => ((x * 255) / width) as u8,
                    TestPattern::Solid(level) => level,
                };
                write_sample(format.pixel_format, pixel, level);
            }
        })
    }
}

fn exposure_limits(spec: &MockCameraSpec, fps: f32) -> ValueRange<u32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let period = frame_period_us(fps).floor() as u32;
    let max = spec.exposure_range.max.min(period).max(spec.exposure_range.min);
    ValueRange::new(spec.exposure_range.min, max)
}

fn write_sample(format: PixelFormat, pixel: &mut [u8], level: u8) {
    match (format, pixel) {
        (PixelFormat::Mono8 | PixelFormat::Bayer8, [value]) => *value = level,
        (PixelFormat::Mono16 | PixelFormat::Bayer16, [lo, hi]) => {
            *lo = level;
            *hi = level;
        }
        (PixelFormat::Yuyv, [luma, chroma]) => {
            *luma = level;
            *chroma = 128;
        }
        (PixelFormat::Rgb8, [r, g, b]) => {
            *r = level;
            *g = level;
            *b = level;
        }
        _ => {}
    }
}

impl BackendAdapter for MockAdapter {
    fn info(&self) -> BackendResult<CameraInfo> {
        let spec = &self.camera.spec;
        Ok(CameraInfo {
            backend: self.backend.clone(),
            vendor: "Simulated".to_owned(),
            model: spec.model.clone(),
            serial: spec.serial.clone(),
            bayer_pattern: spec.bayer_pattern,
            format: spec.format,
            fps_range: spec.fps_range,
            exposure_range: spec.exposure_range,
            gain_range: spec.gain_range,
            hardware_trigger: spec.hardware_trigger,
        })
    }

    fn read_settings(&self) -> BackendResult<CameraSettings> {
        Ok(self.settings)
    }

    fn apply_setting(&mut self, setting: &Setting) -> BackendResult<Setting> {
        let faults = *self.camera.faults();
        if faults.reject_settings || faults.reject_kind == Some(setting.kind()) {
            return Err(Self::error(
                BackendErrorKind::Rejected,
                "MockSetNode",
                "injected setting rejection",
            ));
        }

        let spec = &self.camera.spec;
        let effective = match *setting {
            Setting::FrameRate(fps) => {
                let step = spec.fps_step.max(f32::EPSILON);
                let quantized = spec.fps_range.clamp((fps / step).round() * step);
                self.auto_exposure
                    .set_limits(exposure_limits(spec, quantized));
                Setting::FrameRate(quantized)
            }
            Setting::Exposure(us) => Setting::Exposure(spec.exposure_range.clamp(us)),
            Setting::AutoExposure(on) => {
                if on {
                    self.auto_exposure.reset();
                }
                Setting::AutoExposure(on)
            }
            Setting::AutoExposureLevel(level) => {
                self.auto_exposure.set_target(level);
                Setting::AutoExposureLevel(self.auto_exposure.target())
            }
            Setting::WhiteBalance(mode) => Setting::WhiteBalance(mode),
            Setting::Gain(db) => Setting::Gain(spec.gain_range.clamp((db * 10.0).round() / 10.0)),
        };
        self.settings.record(&effective);
        Ok(effective)
    }

    fn start_acquisition(&mut self, stop: &StopSignal, _buffers: u32) -> BackendResult<()> {
        if self.camera.faults().fail_start {
            return Err(Self::error(
                BackendErrorKind::Io,
                "MockBeginAcquisition",
                "injected start failure",
            ));
        }
        self.stop = Some(stop.clone());
        self.camera.acquiring.store(true, Ordering::SeqCst);
        self.stats.record(MockEvent::Start(self.index));
        Ok(())
    }

    fn stop_acquisition(&mut self) -> BackendResult<()> {
        let was_acquiring = self.camera.acquiring.swap(false, Ordering::SeqCst);
        self.stop = None;
        if was_acquiring {
            self.stats.record(MockEvent::Stop(self.index));
        }
        if self.camera.faults().fail_stop {
            return Err(Self::error(
                BackendErrorKind::Io,
                "MockEndAcquisition",
                "injected stop failure",
            ));
        }
        Ok(())
    }

    fn deliver_frame(
        &mut self,
        buffer: &mut FrameBuffer,
        timeout: Duration,
    ) -> BackendResult<FrameMetadata> {
        let Some(stop) = self.stop.clone() else {
            return Err(Self::error(
                BackendErrorKind::Stopped,
                "MockGetNextImage",
                "not acquiring",
            ));
        };
        if stop.is_raised() {
            return Err(Self::error(
                BackendErrorKind::Stopped,
                "MockGetNextImage",
                "acquisition stopped",
            ));
        }

        let faults = *self.camera.faults();
        if faults.stall {
            return Err(if stop.wait(timeout) {
                Self::error(BackendErrorKind::Stopped, "MockGetNextImage", "acquisition stopped")
            } else {
                Self::error(BackendErrorKind::Timeout, "MockGetNextImage", "no frame")
            });
        }
        if let Some(interval) = self.camera.spec.frame_interval {
            if stop.wait(interval.min(timeout)) {
                return Err(Self::error(
                    BackendErrorKind::Stopped,
                    "MockGetNextImage",
                    "acquisition stopped",
                ));
            }
            if interval > timeout {
                return Err(Self::error(
                    BackendErrorKind::Timeout,
                    "MockGetNextImage",
                    "no frame",
                ));
            }
        }

        let sequence = self.sequence;
        let timestamp = self.clock;
        self.sequence += 1;
        self.clock += Duration::from_secs_f64(1.0 / f64::from(self.settings.fps));
        if faults.drop_frames > 0 {
            self.camera.faults().drop_frames = faults.drop_frames - 1;
            return Err(Self::error(
                BackendErrorKind::Dropped,
                "MockGetNextImage",
                "incomplete image",
            ));
        }

        let radiance = faults.radiance.unwrap_or(self.camera.spec.radiance);
        let bytes_written = self.render(buffer, radiance);

        if self.settings.auto_exposure {
            let measured = buffer.mean_intensity();
            self.settings.exposure_us = self
                .auto_exposure
                .update(self.settings.exposure_us, measured);
        }

        Ok(FrameMetadata {
            sequence,
            timestamp,
            bytes_written,
        })
    }

    fn convergence(&self) -> Convergence {
        if self.settings.auto_exposure {
            self.auto_exposure.convergence()
        } else {
            Convergence::Converged
        }
    }

    fn close(&mut self) -> BackendResult<()> {
        if self.closed {
            return Ok(());
        }
        if self.camera.acquiring.load(Ordering::SeqCst) {
            let _ = self.stop_acquisition();
        }
        self.closed = true;
        self.camera.open.store(false, Ordering::SeqCst);
        self.stats.record(MockEvent::Close(self.index));

        if self.camera.faults().fail_close {
            return Err(Self::error(
                BackendErrorKind::Io,
                "MockDeInit",
                "injected close failure",
            ));
        }
        Ok(())
    }
}

impl Drop for MockAdapter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_first(rig: &MockRig) -> Box<dyn BackendAdapter> {
        let devices = rig.enumerate().expect("enumerate should succeed");
        let first = devices.first().expect("rig has a camera");
        rig.open(first).expect("open should succeed")
    }

    #[test]
    fn test_mock_rig_enumeration() {
        let rig = MockRig::named("bench", vec![MockCameraSpec::default(); 2]);
        let devices = rig.enumerate().expect("enumerate should succeed");

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "bench-0000");
        assert_eq!(devices[1].address, "mock:1");
    }

    #[test]
    fn test_open_close_tracks_handles() {
        let rig = MockRig::new(1);
        let mut adapter = open_first(&rig);
        assert_eq!(rig.open_handles(), 1);

        let devices = rig.enumerate().expect("enumerate should succeed");
        let again = rig.open(&devices[0]).map(|_| ()).expect_err("already open");
        assert_eq!(again.kind, BackendErrorKind::Busy);

        adapter.close().expect("close should succeed");
        adapter.close().expect("second close is a no-op");
        assert_eq!(rig.open_handles(), 0);
        assert_eq!(rig.events(), [MockEvent::Open(0), MockEvent::Close(0)]);
    }

    #[test]
    fn test_drop_releases_handle() {
        let rig = MockRig::new(1);
        let adapter = open_first(&rig);
        drop(adapter);
        assert_eq!(rig.open_handles(), 0);
    }

    #[test]
    fn test_frames_are_sequenced() {
        let rig = MockRig::new(1);
        let mut adapter = open_first(&rig);
        let stop = StopSignal::new();
        adapter.start_acquisition(&stop, 4).expect("start should succeed");

        let format = adapter.info().expect("info").format;
        let mut buffer = FrameBuffer::new(format).expect("valid buffer");
        let timeout = Duration::from_millis(100);

        let first = adapter.deliver_frame(&mut buffer, timeout).expect("frame");
        let second = adapter.deliver_frame(&mut buffer, timeout).expect("frame");
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert!(second.timestamp > first.timestamp);
        assert_eq!(first.bytes_written, format.size());
    }

    #[test]
    fn test_scene_brightness_follows_exposure() {
        let rig = MockRig::new(1);
        let mut adapter = open_first(&rig);
        let stop = StopSignal::new();
        adapter.start_acquisition(&stop, 4).expect("start should succeed");
        let format = adapter.info().expect("info").format;
        let mut buffer = FrameBuffer::new(format).expect("valid buffer");
        let timeout = Duration::from_millis(100);

        adapter.deliver_frame(&mut buffer, timeout).expect("frame");
        let default_level = buffer.mean_intensity();
        assert!((default_level - 0.5).abs() < 0.01, "level {default_level}");

        adapter
            .apply_setting(&Setting::Exposure(5_000))
            .expect("setting should apply");
        adapter.deliver_frame(&mut buffer, timeout).expect("frame");
        assert!((buffer.mean_intensity() - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_dropped_frame_leaves_buffer() {
        let rig = MockRig::new(1);
        let mut adapter = open_first(&rig);
        let stop = StopSignal::new();
        adapter.start_acquisition(&stop, 4).expect("start should succeed");
        let format = adapter.info().expect("info").format;
        let mut buffer = FrameBuffer::from_vec(format, vec![7; format.size()]).expect("valid buffer");

        rig.drop_frames(0, 1);
        let err = adapter
            .deliver_frame(&mut buffer, Duration::from_millis(10))
            .expect_err("frame should drop");
        assert_eq!(err.kind, BackendErrorKind::Dropped);
        assert!(buffer.data().iter().all(|&byte| byte == 7));

        let next = adapter
            .deliver_frame(&mut buffer, Duration::from_millis(10))
            .expect("next frame arrives");
        assert_eq!(next.sequence, 1);
    }

    #[test]
    fn test_stalled_camera_times_out() {
        let rig = MockRig::new(1);
        let mut adapter = open_first(&rig);
        let stop = StopSignal::new();
        adapter.start_acquisition(&stop, 4).expect("start should succeed");
        let format = adapter.info().expect("info").format;
        let mut buffer = FrameBuffer::new(format).expect("valid buffer");

        rig.stall(0, true);
        let err = adapter
            .deliver_frame(&mut buffer, Duration::from_millis(10))
            .expect_err("stalled");
        assert_eq!(err.kind, BackendErrorKind::Timeout);

        stop.raise();
        let err = adapter
            .deliver_frame(&mut buffer, Duration::from_secs(10))
            .expect_err("stopped");
        assert_eq!(err.kind, BackendErrorKind::Stopped);
    }

    #[test]
    fn test_fps_is_quantized() {
        let rig = MockRig::new(1);
        let mut adapter = open_first(&rig);
        let effective = adapter
            .apply_setting(&Setting::FrameRate(29.971))
            .expect("setting should apply");
        let Setting::FrameRate(fps) = effective else {
            panic!("Expected FrameRate, got {effective:?}");
        };
        assert!((fps - 29.97).abs() < 1e-3);
    }

    #[test]
    fn test_gradient_pattern() {
        let spec = MockCameraSpec::default()
            .with_format(FrameFormat::new(640, 480, PixelFormat::Mono8))
            .with_pattern(TestPattern::Gradient);
        let rig = MockRig::with_specs(vec![spec]);
        let mut adapter = open_first(&rig);
        let stop = StopSignal::new();
        adapter.start_acquisition(&stop, 1).expect("start should succeed");
        let mut buffer = FrameBuffer::new(FrameFormat::new(640, 480, PixelFormat::Mono8))
            .expect("valid buffer");
        adapter
            .deliver_frame(&mut buffer, Duration::from_millis(10))
            .expect("frame");

        let last_row = buffer.row(479).expect("row exists");
        assert!(last_row[0] < 10);
        assert!(last_row[639] > 200);
    }
}
