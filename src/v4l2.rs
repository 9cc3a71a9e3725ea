//! V4L2 backend implementation using the v4l crate.

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;
use v4l::buffer::{Flags as BufferFlags, Type};
use v4l::capability::Flags as CapabilityFlags;
use v4l::control::{Control, Description, Value};
use v4l::frameinterval::FrameIntervalEnum;
use v4l::fraction::Fraction;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::auto_exposure::Convergence;
use crate::buffer::{FourCC, FrameBuffer, FrameFormat, FrameMetadata, PixelFormat};
use crate::error::{BackendError, BackendErrorKind};
use crate::info::{BayerPattern, CameraInfo, DeviceDescriptor, ValueRange};
use crate::lifecycle::StopSignal;
use crate::settings::{CameraSettings, Setting, WhiteBalance};
use crate::traits::{Backend, BackendAdapter, BackendResult};

const CID_AUTO_WHITE_BALANCE: u32 = 0x0098_090c;
const CID_DO_WHITE_BALANCE: u32 = 0x0098_090d;
const CID_GAIN: u32 = 0x0098_0913;
const CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;

/// `V4L2_EXPOSURE_MANUAL` menu entry.
const EXPOSURE_MANUAL: i64 = 1;
/// `V4L2_EXPOSURE_APERTURE_PRIORITY`: automatic exposure time, the usual UVC auto mode.
const EXPOSURE_APERTURE_PRIORITY: i64 = 3;
/// Absolute exposure is specified in units of 100 µs.
const EXPOSURE_UNIT_US: u32 = 100;

/// Longest single wait on the stream, so stop requests are seen promptly.
const POLL_SLICE: Duration = Duration::from_millis(50);

const EINVAL: i32 = 22;
const ERANGE: i32 = 34;

/// Backend for Video4Linux2 capture devices (`/dev/video*`).
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Backend {
    format: Option<(u32, u32, FourCC)>,
}

impl V4l2Backend {
    /// Backend that keeps each device's current format.
    #[must_use]
    pub const fn new() -> Self {
        Self { format: None }
    }

    /// Backend that requests this format on every device it opens.
    #[must_use]
    pub const fn with_format(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            format: Some((width, height, fourcc)),
        }
    }
}

fn io_error(call: &'static str) -> impl FnOnce(io::Error) -> BackendError {
    move |err| BackendError::io(call, &err)
}

fn control_error(call: &'static str) -> impl FnOnce(io::Error) -> BackendError {
    move |err| match err.raw_os_error() {
        Some(EINVAL | ERANGE) => BackendError::new(BackendErrorKind::Rejected, call, err.to_string()),
        _ => BackendError::io(call, &err),
    }
}

fn pixel_format(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.0 {
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"GREY" => Some(PixelFormat::Mono8),
        b"Y16 " => Some(PixelFormat::Mono16),
        b"RGB3" => Some(PixelFormat::Rgb8),
        b"BA81" | b"GBRG" | b"GRBG" | b"RGGB" => Some(PixelFormat::Bayer8),
        b"BYR2" | b"GB16" | b"GR16" | b"RG16" => Some(PixelFormat::Bayer16),
        _ => None,
    }
}

fn fps_of(interval: Fraction) -> f32 {
    if interval.numerator == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let fps = interval.denominator as f32 / interval.numerator as f32;
    fps
}

impl Backend for V4l2Backend {
    fn name(&self) -> &str {
        "v4l2"
    }

    fn enumerate(&self) -> BackendResult<Vec<DeviceDescriptor>> {
        let mut nodes = v4l::context::enum_devices();
        nodes.sort_by_key(|node| node.index());

        let mut devices = Vec::new();
        for node in nodes {
            let Ok(device) = Device::new(node.index()) else {
                continue;
            };
            let Ok(caps) = device.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(CapabilityFlags::VIDEO_CAPTURE)
                || !caps.capabilities.contains(CapabilityFlags::STREAMING)
            {
                continue;
            }
            devices.push(DeviceDescriptor {
                address: node.path().display().to_string(),
                serial: caps.bus,
                model: caps.card,
            });
        }
        Ok(devices)
    }

    fn open(&self, device: &DeviceDescriptor) -> BackendResult<Box<dyn BackendAdapter>> {
        let adapter = V4l2Adapter::open(Path::new(&device.address), self.format)?;
        Ok(Box::new(adapter))
    }
}

/// Open V4L2 capture device.
pub struct V4l2Adapter {
    device: Device,
    stream: Option<Stream<'static>>,
    stop: Option<StopSignal>,
    info: CameraInfo,
    controls: Vec<Description>,
    settings: CameraSettings,
}

impl V4l2Adapter {
    fn open(path: &Path, requested: Option<(u32, u32, FourCC)>) -> BackendResult<Self> {
        let device = Device::with_path(path).map_err(io_error("open"))?;
        let caps = device.query_caps().map_err(io_error("VIDIOC_QUERYCAP"))?;

        let mut fmt = device.format().map_err(io_error("VIDIOC_G_FMT"))?;
        if let Some((width, height, fourcc)) = requested {
            fmt.width = width;
            fmt.height = height;
            fmt.fourcc = v4l::FourCC::new(&fourcc.0);
            fmt = device.set_format(&fmt).map_err(io_error("VIDIOC_S_FMT"))?;
        }
        let fourcc = FourCC(fmt.fourcc.repr);
        let pixel_format = pixel_format(fourcc).ok_or_else(|| {
            BackendError::new(
                BackendErrorKind::Unsupported,
                "VIDIOC_G_FMT",
                format!("pixel format {fourcc} is not supported"),
            )
        })?;
        let format = FrameFormat::new(fmt.width, fmt.height, pixel_format).with_stride(fmt.stride);

        let params = device.params().map_err(io_error("VIDIOC_G_PARM"))?;
        let fps = fps_of(params.interval);
        let fps_range = device
            .enum_frameintervals(fmt.fourcc, fmt.width, fmt.height)
            .ok()
            .and_then(|intervals| {
                let rates = intervals.iter().flat_map(|interval| match &interval.interval {
                    FrameIntervalEnum::Discrete(fraction) => [fps_of(*fraction), fps_of(*fraction)],
                    FrameIntervalEnum::Stepwise(stepwise) => [fps_of(stepwise.max), fps_of(stepwise.min)],
                });
                rates
                    .filter(|rate| *rate > 0.0)
                    .fold(None, |range: Option<ValueRange<f32>>, rate| {
                        Some(range.map_or(ValueRange::new(rate, rate), |range| {
                            ValueRange::new(range.min.min(rate), range.max.max(rate))
                        }))
                    })
            })
            .unwrap_or(ValueRange::new(fps, fps));

        let controls = device.query_controls().unwrap_or_else(|err| {
            debug!(path = %path.display(), error = %err, "no controls");
            Vec::new()
        });
        let describe = |id| controls.iter().find(|control| control.id == id);

        let exposure_range = describe(CID_EXPOSURE_ABSOLUTE).map_or_else(
            || {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let period = (1_000_000.0 / fps.max(1.0)) as u32;
                ValueRange::new(period, period)
            },
            |control| {
                ValueRange::new(
                    to_exposure_us(control.minimum),
                    to_exposure_us(control.maximum),
                )
            },
        );
        #[allow(clippy::cast_precision_loss)]
        let gain_range = describe(CID_GAIN).map_or(ValueRange::new(0.0, 0.0), |control| {
            ValueRange::new(control.minimum as f32, control.maximum as f32)
        });

        let info = CameraInfo {
            backend: "v4l2".to_owned(),
            vendor: caps.driver,
            model: caps.card,
            serial: caps.bus,
            bayer_pattern: BayerPattern::from_fourcc(fourcc).unwrap_or(BayerPattern::None),
            format,
            fps_range,
            exposure_range,
            gain_range,
            hardware_trigger: false,
        };

        let mut adapter = Self {
            device,
            stream: None,
            stop: None,
            info,
            controls,
            settings: CameraSettings {
                fps,
                ..CameraSettings::default()
            },
        };
        adapter.refresh_settings();
        Ok(adapter)
    }

    fn refresh_settings(&mut self) {
        if let Some(value) = self.read_integer(CID_EXPOSURE_ABSOLUTE) {
            self.settings.exposure_us = to_exposure_us(value);
        }
        if let Some(mode) = self.read_integer(CID_EXPOSURE_AUTO) {
            self.settings.auto_exposure = mode != EXPOSURE_MANUAL;
        }
        if let Some(auto) = self.read_integer(CID_AUTO_WHITE_BALANCE) {
            self.settings.white_balance = if auto == 0 {
                WhiteBalance::Manual
            } else {
                WhiteBalance::Auto
            };
        }
        if let Some(gain) = self.read_integer(CID_GAIN) {
            #[allow(clippy::cast_precision_loss)]
            let gain = gain as f32;
            self.settings.gain_db = gain;
        }
    }

    fn control(&self, id: u32, call: &'static str) -> BackendResult<&Description> {
        self.controls
            .iter()
            .find(|control| control.id == id)
            .ok_or_else(|| {
                BackendError::new(
                    BackendErrorKind::Unsupported,
                    call,
                    format!("control {id:#010x} not available"),
                )
            })
    }

    fn read_integer(&self, id: u32) -> Option<i64> {
        self.control(id, "VIDIOC_G_CTRL").ok()?;
        match self.device.control(id).ok()?.value {
            Value::Integer(value) => Some(value),
            Value::Boolean(value) => Some(i64::from(value)),
            _ => None,
        }
    }

    fn write(&self, id: u32, value: Value, call: &'static str) -> BackendResult<()> {
        self.control(id, call)?;
        self.device
            .set_control(Control { id, value })
            .map_err(control_error(call))
    }

    fn apply_frame_rate(&self, fps: f32) -> BackendResult<f32> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millihertz = (fps * 1000.0).round() as u32;
        let params = self
            .device
            .set_params(&Parameters::new(Fraction::new(1000, millihertz)))
            .map_err(control_error("VIDIOC_S_PARM"))?;
        Ok(fps_of(params.interval))
    }
}

fn to_exposure_us(value: i64) -> u32 {
    u32::try_from(value.max(0))
        .unwrap_or(u32::MAX)
        .saturating_mul(EXPOSURE_UNIT_US)
}

impl BackendAdapter for V4l2Adapter {
    fn info(&self) -> BackendResult<CameraInfo> {
        Ok(self.info.clone())
    }

    fn read_settings(&self) -> BackendResult<CameraSettings> {
        Ok(self.settings)
    }

    fn apply_setting(&mut self, setting: &Setting) -> BackendResult<Setting> {
        let effective = match *setting {
            Setting::FrameRate(fps) => Setting::FrameRate(self.apply_frame_rate(fps)?),
            Setting::Exposure(us) => {
                let units = i64::from(us / EXPOSURE_UNIT_US);
                self.write(CID_EXPOSURE_ABSOLUTE, Value::Integer(units), "VIDIOC_S_CTRL")?;
                let actual = self.read_integer(CID_EXPOSURE_ABSOLUTE).unwrap_or(units);
                Setting::Exposure(to_exposure_us(actual))
            }
            Setting::AutoExposure(on) => {
                let mode = if on {
                    let auto = self.control(CID_EXPOSURE_AUTO, "VIDIOC_S_CTRL")?;
                    if auto.maximum >= EXPOSURE_APERTURE_PRIORITY {
                        EXPOSURE_APERTURE_PRIORITY
                    } else {
                        0
                    }
                } else {
                    EXPOSURE_MANUAL
                };
                self.write(CID_EXPOSURE_AUTO, Value::Integer(mode), "VIDIOC_S_CTRL")?;
                Setting::AutoExposure(on)
            }
            Setting::AutoExposureLevel(_) => {
                return Err(BackendError::new(
                    BackendErrorKind::Unsupported,
                    "VIDIOC_S_CTRL",
                    "auto-exposure target level has no V4L2 control",
                ));
            }
            Setting::WhiteBalance(mode) => {
                let auto = mode == WhiteBalance::Auto;
                self.write(CID_AUTO_WHITE_BALANCE, Value::Boolean(auto), "VIDIOC_S_CTRL")?;
                if mode == WhiteBalance::Once {
                    self.write(CID_DO_WHITE_BALANCE, Value::Integer(1), "VIDIOC_S_CTRL")?;
                }
                Setting::WhiteBalance(mode)
            }
            Setting::Gain(db) => {
                #[allow(clippy::cast_possible_truncation)]
                let raw = db.round() as i64;
                self.write(CID_GAIN, Value::Integer(raw), "VIDIOC_S_CTRL")?;
                #[allow(clippy::cast_precision_loss)]
                let actual = self.read_integer(CID_GAIN).unwrap_or(raw) as f32;
                Setting::Gain(actual)
            }
        };
        self.settings.record(&effective);
        Ok(effective)
    }

    fn start_acquisition(&mut self, stop: &StopSignal, buffers: u32) -> BackendResult<()> {
        let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, buffers)
            .map_err(io_error("VIDIOC_REQBUFS"))?;
        stream.set_timeout(POLL_SLICE);
        self.stream = Some(stream);
        self.stop = Some(stop.clone());
        debug!(card = %self.info.model, buffers, "stream created");
        Ok(())
    }

    fn stop_acquisition(&mut self) -> BackendResult<()> {
        // Dropping the stream turns streaming off and unmaps the buffers.
        self.stream = None;
        self.stop = None;
        Ok(())
    }

    fn deliver_frame(
        &mut self,
        buffer: &mut FrameBuffer,
        timeout: Duration,
    ) -> BackendResult<FrameMetadata> {
        let (Some(stream), Some(stop)) = (self.stream.as_mut(), self.stop.as_ref()) else {
            return Err(BackendError::new(
                BackendErrorKind::Stopped,
                "VIDIOC_DQBUF",
                "not streaming",
            ));
        };
        let stride = self.info.format.stride as usize;
        let deadline = Instant::now() + timeout;

        loop {
            if stop.is_raised() {
                return Err(BackendError::new(
                    BackendErrorKind::Stopped,
                    "VIDIOC_DQBUF",
                    "acquisition stopped",
                ));
            }
            match stream.next() {
                Ok((data, meta)) => {
                    if meta.flags.contains(BufferFlags::ERROR) {
                        return Err(BackendError::new(
                            BackendErrorKind::Dropped,
                            "VIDIOC_DQBUF",
                            format!("frame {} flagged as corrupt", meta.sequence),
                        ));
                    }
                    let used = data.get(..meta.bytesused as usize).unwrap_or(data);
                    let bytes_written = buffer.copy_from(used, stride).ok_or_else(|| {
                        BackendError::new(
                            BackendErrorKind::Dropped,
                            "VIDIOC_DQBUF",
                            format!("short frame {}: {} bytes", meta.sequence, used.len()),
                        )
                    })?;

                    // V4L2 timestamps are always non-negative in practice
                    #[allow(clippy::cast_sign_loss)]
                    let secs = meta.timestamp.sec.max(0) as u64;
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

                    return Ok(FrameMetadata {
                        sequence: u64::from(meta.sequence),
                        timestamp: Duration::new(secs, nanos),
                        bytes_written,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        return Err(BackendError::new(
                            BackendErrorKind::Timeout,
                            "VIDIOC_DQBUF",
                            "no frame",
                        ));
                    }
                }
                Err(err) => return Err(BackendError::io("VIDIOC_DQBUF", &err)),
            }
        }
    }

    fn convergence(&self) -> Convergence {
        // Hardware auto-exposure reports no state over V4L2.
        Convergence::Converged
    }

    fn close(&mut self) -> BackendResult<()> {
        self.stop_acquisition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_mapping() {
        assert_eq!(pixel_format(FourCC::YUYV), Some(PixelFormat::Yuyv));
        assert_eq!(pixel_format(FourCC::RGGB), Some(PixelFormat::Bayer8));
        assert_eq!(pixel_format(FourCC::BYR2), Some(PixelFormat::Bayer16));
        assert_eq!(pixel_format(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_fps_of_interval() {
        assert!((fps_of(Fraction::new(1, 30)) - 30.0).abs() < f32::EPSILON);
        assert!((fps_of(Fraction::new(1001, 30_000)) - 29.97).abs() < 0.01);
        assert!(fps_of(Fraction::new(0, 30)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_exposure_units() {
        assert_eq!(to_exposure_us(3), 300);
        assert_eq!(to_exposure_us(-1), 0);
    }
}
