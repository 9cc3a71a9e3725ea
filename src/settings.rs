//! Per-camera settings and the rules for applying changes to them.
//!
//! A requested change is first negotiated against the camera's capabilities
//! and current settings. Negotiation either rejects the request or produces
//! the ordered list of device settings that realizes it, renegotiating frame
//! rate and exposure so that the exposure always fits in one frame period.

use std::fmt;

use crate::info::CameraInfo;

/// White balance control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhiteBalance {
    /// Gains are fixed.
    Manual,
    /// The camera adjusts white balance continuously.
    Auto,
    /// The camera balances once, then holds the result.
    Once,
}

/// One device setting with its value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    /// Frames per second.
    FrameRate(f32),
    /// Exposure time in microseconds.
    Exposure(u32),
    /// Whether the auto-exposure loop controls exposure.
    AutoExposure(bool),
    /// Auto-exposure target mean intensity, `0.0..=1.0`.
    AutoExposureLevel(f32),
    /// White balance mode.
    WhiteBalance(WhiteBalance),
    /// Analog gain in dB.
    Gain(f32),
}

impl Setting {
    /// Which setting this is, without its value.
    pub const fn kind(&self) -> SettingKind {
        match self {
            Self::FrameRate(_) => SettingKind::FrameRate,
            Self::Exposure(_) => SettingKind::Exposure,
            Self::AutoExposure(_) => SettingKind::AutoExposure,
            Self::AutoExposureLevel(_) => SettingKind::AutoExposureLevel,
            Self::WhiteBalance(_) => SettingKind::WhiteBalance,
            Self::Gain(_) => SettingKind::Gain,
        }
    }
}

/// Setting identity, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKind {
    /// Frames per second.
    FrameRate,
    /// Exposure time.
    Exposure,
    /// Auto-exposure on/off.
    AutoExposure,
    /// Auto-exposure target level.
    AutoExposureLevel,
    /// White balance mode.
    WhiteBalance,
    /// Analog gain.
    Gain,
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FrameRate => "frame rate",
            Self::Exposure => "exposure",
            Self::AutoExposure => "auto exposure",
            Self::AutoExposureLevel => "auto exposure level",
            Self::WhiteBalance => "white balance",
            Self::Gain => "gain",
        };
        f.write_str(name)
    }
}

/// A requested setting the camera cannot satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Setting that was requested.
    pub setting: SettingKind,
    /// Why it cannot be applied.
    pub reason: String,
}

impl Rejection {
    fn new(setting: SettingKind, reason: String) -> Self {
        Self { setting, reason }
    }
}

/// Effective configuration of one camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    /// Frames per second.
    pub fps: f32,
    /// Exposure time in microseconds.
    pub exposure_us: u32,
    /// Whether the auto-exposure loop controls exposure.
    pub auto_exposure: bool,
    /// Auto-exposure target mean intensity, `0.0..=1.0`.
    pub auto_exposure_level: f32,
    /// White balance mode.
    pub white_balance: WhiteBalance,
    /// Analog gain in dB.
    pub gain_db: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fps: 30.0,
            exposure_us: 10_000,
            auto_exposure: false,
            auto_exposure_level: 0.5,
            white_balance: WhiteBalance::Auto,
            gain_db: 0.0,
        }
    }
}

/// Length of one frame at `fps`, in microseconds.
pub fn frame_period_us(fps: f32) -> f32 {
    1_000_000.0 / fps
}

impl CameraSettings {
    /// Length of one frame at the current frame rate, in microseconds.
    pub fn frame_period_us(&self) -> f32 {
        frame_period_us(self.fps)
    }

    /// Record a value the device reported as effective.
    pub fn record(&mut self, effective: &Setting) {
        match *effective {
            Setting::FrameRate(fps) => self.fps = fps,
            Setting::Exposure(us) => self.exposure_us = us,
            Setting::AutoExposure(on) => self.auto_exposure = on,
            Setting::AutoExposureLevel(level) => self.auto_exposure_level = level,
            Setting::WhiteBalance(mode) => self.white_balance = mode,
            Setting::Gain(db) => self.gain_db = db,
        }
    }

    /// Current value of one setting.
    pub const fn get(&self, kind: SettingKind) -> Setting {
        match kind {
            SettingKind::FrameRate => Setting::FrameRate(self.fps),
            SettingKind::Exposure => Setting::Exposure(self.exposure_us),
            SettingKind::AutoExposure => Setting::AutoExposure(self.auto_exposure),
            SettingKind::AutoExposureLevel => Setting::AutoExposureLevel(self.auto_exposure_level),
            SettingKind::WhiteBalance => Setting::WhiteBalance(self.white_balance),
            SettingKind::Gain => Setting::Gain(self.gain_db),
        }
    }

    /// Longest exposure that fits the current frame period, if the manual
    /// exposure in effect does not.
    pub fn fitted_exposure(&self) -> Option<u32> {
        if self.auto_exposure || !exceeds_period(self.exposure_us, self.fps) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let period = self.frame_period_us().floor() as u32;
        Some(period)
    }

    /// Check every field against the camera's capabilities.
    pub fn validate(&self, info: &CameraInfo) -> Result<(), Rejection> {
        check_fps(self.fps, info)?;
        check_exposure(self.exposure_us, info)?;
        check_level(self.auto_exposure_level)?;
        check_gain(self.gain_db, info)?;
        if !self.auto_exposure && exceeds_period(self.exposure_us, self.fps) {
            return Err(Rejection::new(
                SettingKind::Exposure,
                format!(
                    "exposure {}us exceeds the {:.0}us frame period",
                    self.exposure_us,
                    self.frame_period_us()
                ),
            ));
        }
        Ok(())
    }

    /// Work out the device settings that realize `requested`, in the order
    /// they must be applied.
    ///
    /// Nothing is mutated; a rejection leaves the camera as it was.
    pub fn negotiate(&self, info: &CameraInfo, requested: Setting) -> Result<Vec<Setting>, Rejection> {
        match requested {
            Setting::FrameRate(fps) => self.negotiate_fps(info, fps),
            Setting::Exposure(us) => self.negotiate_exposure(info, us),
            Setting::AutoExposureLevel(level) => {
                check_level(level)?;
                Ok(vec![requested])
            }
            Setting::Gain(db) => {
                check_gain(db, info)?;
                Ok(vec![requested])
            }
            Setting::AutoExposure(_) | Setting::WhiteBalance(_) => Ok(vec![requested]),
        }
    }

    fn negotiate_fps(&self, info: &CameraInfo, fps: f32) -> Result<Vec<Setting>, Rejection> {
        check_fps(fps, info)?;
        if self.auto_exposure || !exceeds_period(self.exposure_us, fps) {
            return Ok(vec![Setting::FrameRate(fps)]);
        }

        // Shorten the manual exposure first so the faster rate is accepted.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let period = frame_period_us(fps).floor() as u32;
        if period < info.exposure_range.min {
            return Err(Rejection::new(
                SettingKind::FrameRate,
                format!(
                    "{fps} fps leaves a {period}us frame, below the minimum exposure of {}us",
                    info.exposure_range.min
                ),
            ));
        }
        Ok(vec![Setting::Exposure(period), Setting::FrameRate(fps)])
    }

    fn negotiate_exposure(&self, info: &CameraInfo, us: u32) -> Result<Vec<Setting>, Rejection> {
        check_exposure(us, info)?;

        let mut plan = Vec::with_capacity(3);
        if self.auto_exposure {
            plan.push(Setting::AutoExposure(false));
        }
        if exceeds_period(us, self.fps) {
            // Lengthen the frame so the exposure fits.
            #[allow(clippy::cast_precision_loss)]
            let fps = 1_000_000.0 / us as f32;
            if fps < info.fps_range.min {
                return Err(Rejection::new(
                    SettingKind::Exposure,
                    format!(
                        "exposure {us}us needs {fps:.3} fps, below the minimum of {} fps",
                        info.fps_range.min
                    ),
                ));
            }
            plan.push(Setting::FrameRate(fps));
        }
        plan.push(Setting::Exposure(us));
        Ok(plan)
    }
}

#[allow(clippy::cast_precision_loss)]
fn exceeds_period(exposure_us: u32, fps: f32) -> bool {
    exposure_us as f32 > frame_period_us(fps)
}

fn check_fps(fps: f32, info: &CameraInfo) -> Result<(), Rejection> {
    if !fps.is_finite() || fps <= 0.0 {
        return Err(Rejection::new(
            SettingKind::FrameRate,
            format!("{fps} fps is not a positive frame rate"),
        ));
    }
    if !info.fps_range.contains(fps) {
        return Err(Rejection::new(
            SettingKind::FrameRate,
            format!("{fps} fps outside supported range {}", info.fps_range),
        ));
    }
    Ok(())
}

fn check_exposure(us: u32, info: &CameraInfo) -> Result<(), Rejection> {
    if info.exposure_range.contains(us) {
        Ok(())
    } else {
        Err(Rejection::new(
            SettingKind::Exposure,
            format!("{us}us outside supported range {}", info.exposure_range),
        ))
    }
}

fn check_level(level: f32) -> Result<(), Rejection> {
    if level.is_finite() && (0.0..=1.0).contains(&level) {
        Ok(())
    } else {
        Err(Rejection::new(
            SettingKind::AutoExposureLevel,
            format!("level {level} outside [0, 1]"),
        ))
    }
}

fn check_gain(db: f32, info: &CameraInfo) -> Result<(), Rejection> {
    if db.is_finite() && info.gain_range.contains(db) {
        Ok(())
    } else {
        Err(Rejection::new(
            SettingKind::Gain,
            format!("{db} dB outside supported range {}", info.gain_range),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{FrameFormat, PixelFormat};
    use crate::info::{BayerPattern, ValueRange};

    fn info() -> CameraInfo {
        CameraInfo {
            backend: "test".to_owned(),
            vendor: "Test".to_owned(),
            model: "T-1".to_owned(),
            serial: "0001".to_owned(),
            bayer_pattern: BayerPattern::Rggb,
            format: FrameFormat::new(64, 48, PixelFormat::Bayer8),
            fps_range: ValueRange::new(1.0, 120.0),
            exposure_range: ValueRange::new(20, 500_000),
            gain_range: ValueRange::new(0.0, 24.0),
            hardware_trigger: false,
        }
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(CameraSettings::default().validate(&info()).is_ok());
    }

    #[test]
    fn test_fps_outside_range_rejected() {
        let settings = CameraSettings::default();
        let err = settings
            .negotiate(&info(), Setting::FrameRate(240.0))
            .expect_err("above max");
        assert_eq!(err.setting, SettingKind::FrameRate);

        assert!(settings.negotiate(&info(), Setting::FrameRate(0.0)).is_err());
        assert!(settings.negotiate(&info(), Setting::FrameRate(f32::NAN)).is_err());
    }

    #[test]
    fn test_faster_fps_clamps_manual_exposure() {
        let settings = CameraSettings {
            exposure_us: 30_000,
            ..CameraSettings::default()
        };
        let plan = settings
            .negotiate(&info(), Setting::FrameRate(100.0))
            .expect("renegotiated");
        assert_eq!(plan, vec![Setting::Exposure(10_000), Setting::FrameRate(100.0)]);
    }

    #[test]
    fn test_faster_fps_leaves_auto_exposure_alone() {
        let settings = CameraSettings {
            exposure_us: 30_000,
            auto_exposure: true,
            ..CameraSettings::default()
        };
        let plan = settings
            .negotiate(&info(), Setting::FrameRate(100.0))
            .expect("accepted");
        assert_eq!(plan, vec![Setting::FrameRate(100.0)]);
    }

    #[test]
    fn test_long_exposure_lowers_fps() {
        let settings = CameraSettings::default();
        let plan = settings
            .negotiate(&info(), Setting::Exposure(100_000))
            .expect("renegotiated");
        assert_eq!(plan, vec![Setting::FrameRate(10.0), Setting::Exposure(100_000)]);
    }

    #[test]
    fn test_exposure_needing_too_low_fps_rejected() {
        let narrow = CameraInfo {
            fps_range: ValueRange::new(15.0, 120.0),
            ..info()
        };
        let err = CameraSettings::default()
            .negotiate(&narrow, Setting::Exposure(100_000))
            .expect_err("would need 10 fps");
        assert_eq!(err.setting, SettingKind::Exposure);
    }

    #[test]
    fn test_manual_exposure_disables_auto() {
        let settings = CameraSettings {
            auto_exposure: true,
            ..CameraSettings::default()
        };
        let plan = settings
            .negotiate(&info(), Setting::Exposure(5_000))
            .expect("accepted");
        assert_eq!(plan, vec![Setting::AutoExposure(false), Setting::Exposure(5_000)]);
    }

    #[test]
    fn test_exposure_above_max_rejected() {
        let err = CameraSettings::default()
            .negotiate(&info(), Setting::Exposure(600_000))
            .expect_err("above max");
        assert_eq!(err.setting, SettingKind::Exposure);
    }

    #[test]
    fn test_level_and_gain_bounds() {
        let settings = CameraSettings::default();
        assert!(settings.negotiate(&info(), Setting::AutoExposureLevel(1.5)).is_err());
        assert!(settings.negotiate(&info(), Setting::AutoExposureLevel(0.3)).is_ok());
        assert!(settings.negotiate(&info(), Setting::Gain(30.0)).is_err());
        assert!(settings.negotiate(&info(), Setting::Gain(6.0)).is_ok());
    }

    #[test]
    fn test_fitted_exposure() {
        let settings = CameraSettings {
            fps: 14.29,
            exposure_us: 70_001,
            ..CameraSettings::default()
        };
        assert_eq!(settings.fitted_exposure(), Some(69_979));
        assert!(settings.validate(&info()).is_err());

        let fitted = CameraSettings {
            exposure_us: 69_979,
            ..settings
        };
        assert_eq!(fitted.fitted_exposure(), None);
        assert!(fitted.validate(&info()).is_ok());

        let auto = CameraSettings {
            auto_exposure: true,
            ..settings
        };
        assert_eq!(auto.fitted_exposure(), None);
    }

    #[test]
    fn test_get_returns_recorded_value() {
        let mut settings = CameraSettings::default();
        settings.record(&Setting::Gain(3.5));
        assert_eq!(settings.get(SettingKind::Gain), Setting::Gain(3.5));
        assert_eq!(settings.get(SettingKind::FrameRate), Setting::FrameRate(30.0));
    }

    #[test]
    fn test_record_updates_field() {
        let mut settings = CameraSettings::default();
        settings.record(&Setting::FrameRate(59.94));
        settings.record(&Setting::WhiteBalance(WhiteBalance::Once));
        assert!((settings.fps - 59.94).abs() < f32::EPSILON);
        assert_eq!(settings.white_balance, WhiteBalance::Once);
    }
}
