//! Integration tests using vivid virtual cameras through the V4L2 backend.
//!
//! These tests require:
//! - The `integration` feature flag: `cargo test --features integration`
//! - The vivid kernel module loaded with two instances
//!   (`modprobe vivid n_devs=2 test_pattern=20,1`)
//! - Access to /dev/video* devices (may require sudo or video group membership)
//!
//! Expected vivid configuration:
//! - First instance: Gray Ramp pattern (gradient) - `test_pattern=20`
//! - Second instance: 100% Colorbar pattern - `test_pattern=1`
//!
//! The backend requests 640x480 YUYV on every device it opens.
//! Tests will fail if vivid is not available or not configured correctly.

#![cfg(feature = "integration")]

use std::fs;
use std::path::Path;
use std::time::Duration;

use gencam::validation::{validate_frame_sequence, validate_gradient};
use gencam::{
    BackendRegistry, BayerPattern, CameraError, CameraTarget, DriverConfig, FourCC, FrameBuffer,
    FrameFormat, FrameMetadata, GenericCameraDriver, PixelFormat, V4l2Backend,
};
use serial_test::serial;

/// Count vivid capture nodes via sysfs, without opening any device.
fn count_vivid_nodes() -> usize {
    let video4linux = Path::new("/sys/class/video4linux");
    let Ok(entries) = fs::read_dir(video4linux) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| fs::read_to_string(entry.path().join("name")).ok())
        .filter(|name| name.to_lowercase().contains("vivid"))
        .count()
}

/// Initialize a driver over every V4L2 capture device and return it with
/// the array indices of the vivid cameras, in device order.
fn vivid_driver() -> (GenericCameraDriver, Vec<usize>) {
    let registry = BackendRegistry::new().with(V4l2Backend::with_format(640, 480, FourCC::YUYV));
    let config = DriverConfig::default().with_capture_timeout(Duration::from_secs(2));
    let mut driver = GenericCameraDriver::new(registry, config).expect("valid config");
    driver.init().expect("Failed to initialize V4L2 cameras");

    let vivid = driver
        .cam_infos()
        .expect("infos")
        .iter()
        .enumerate()
        .filter(|(_, info)| info.vendor.contains("vivid"))
        .map(|(index, _)| index)
        .collect();
    (driver, vivid)
}

/// Macro to fail test if vivid is not available.
///
/// Returns the driver and the first vivid camera index.
/// Integration tests MUST have vivid loaded - they should fail, not silently skip.
macro_rules! require_vivid {
    () => {{
        assert!(
            count_vivid_nodes() > 0,
            "vivid virtual camera not available.\n\
             Load vivid with: sudo modprobe vivid n_devs=2 test_pattern=20,1\n\
             Or run unit tests only: cargo test --lib"
        );
        let (driver, vivid) = vivid_driver();
        let first = *vivid.first().expect("no vivid capture device in the array");
        (driver, first)
    }};
}

/// Macro to get both vivid cameras (for pattern-specific tests).
///
/// Returns the driver and a tuple of (gradient index, colorbar index).
macro_rules! require_vivid_pair {
    () => {{
        let (driver, vivid) = vivid_driver();
        assert!(
            vivid.len() >= 2,
            "Two vivid devices required but found {}.\n\
             Load vivid with: sudo modprobe vivid n_devs=2 test_pattern=20,1",
            vivid.len()
        );
        (driver, (vivid[0], vivid[1]))
    }};
}

fn capture(driver: &mut GenericCameraDriver, index: usize) -> (FrameBuffer, FrameMetadata) {
    let format = driver.cam_info(index).expect("camera exists").format;
    let mut buffer = FrameBuffer::new(format).expect("valid buffer");
    let metadata = driver
        .capture_frame(index, &mut buffer)
        .expect("Failed to capture frame");
    (buffer, metadata)
}

#[test]
#[serial]
fn test_vivid_camera_info() {
    let (driver, index) = require_vivid!();
    let info = driver.cam_info(index).expect("camera exists");

    println!("Opened vivid camera:");
    println!("  Driver: {}", info.vendor);
    println!("  Card: {}", info.model);
    println!("  Bus: {}", info.serial);
    println!("  Format: {}", info.format);
    println!("  Frame rates: {}", info.fps_range);

    assert_eq!(info.backend, "v4l2");
    assert_eq!(info.format.width, 640, "Width mismatch");
    assert_eq!(info.format.height, 480, "Height mismatch");
    assert_eq!(info.format.pixel_format, PixelFormat::Yuyv);
    assert_eq!(info.bayer_pattern, BayerPattern::None);
    assert!(!driver.is_hardware_synchronized());
}

#[test]
#[serial]
fn test_vivid_capture_single_frame() {
    let (mut driver, index) = require_vivid!();
    driver.start_capture().expect("Failed to start capture");

    let (buffer, metadata) = capture(&mut driver, index);
    println!("Captured frame:");
    println!("  Sequence: {}", metadata.sequence);
    println!("  Timestamp: {:?}", metadata.timestamp);
    println!("  Bytes written: {}", metadata.bytes_written);

    assert_eq!(metadata.bytes_written, buffer.format().row_bytes() * 480);
    driver.stop_capture().expect("Failed to stop capture");
    driver.release().expect("Failed to release");
}

#[test]
#[serial]
fn test_vivid_capture_multiple_frames() {
    let (mut driver, index) = require_vivid!();
    driver.start_capture().expect("Failed to start capture");

    let frames: Vec<FrameMetadata> = (0..10).map(|_| capture(&mut driver, index).1).collect();
    for (i, frame) in frames.iter().enumerate() {
        println!("Frame {i}: seq={}, ts={:?}", frame.sequence, frame.timestamp);
    }

    let result = validate_frame_sequence(&frames);
    assert!(result.is_ok(), "Frame sequence validation failed: {result:?}");
}

#[test]
#[serial]
fn test_vivid_gradient_pattern() {
    let (mut driver, (gradient, _)) = require_vivid_pair!();
    driver.start_capture().expect("Failed to start capture");

    let (buffer, _) = capture(&mut driver, gradient);
    let result = validate_gradient(&buffer);
    assert!(
        result.is_ok(),
        "Gradient validation failed on first vivid device.\n\
         Expected Gray Ramp pattern (test_pattern=20).\n\
         Error: {result:?}"
    );
}

#[test]
#[serial]
fn test_vivid_colorbar_is_not_gradient() {
    let (mut driver, (_, colorbar)) = require_vivid_pair!();
    driver.start_capture().expect("Failed to start capture");

    let (buffer, _) = capture(&mut driver, colorbar);
    assert!(
        validate_gradient(&buffer).is_err(),
        "Second vivid device should show color bars (test_pattern=1)"
    );
}

#[test]
#[serial]
fn test_vivid_frame_rate() {
    let (mut driver, index) = require_vivid!();
    let range = driver.cam_info(index).expect("camera exists").fps_range;
    let fps = range.clamp(25.0);

    driver
        .set_fps(CameraTarget::Index(index), fps)
        .expect("Failed to set frame rate");
    let actual = driver.settings(index).expect("settings").fps;
    println!("Requested {fps} fps, device uses {actual} fps");
    assert!((actual - fps).abs() < 1.0, "Frame rate mismatch");
}

#[test]
#[serial]
fn test_vivid_wrong_buffer_rejected() {
    let (mut driver, index) = require_vivid!();
    driver.start_capture().expect("Failed to start capture");

    let format = FrameFormat::new(320, 240, PixelFormat::Yuyv);
    let mut buffer = FrameBuffer::from_vec(format, vec![1; format.size()]).expect("valid buffer");
    let err = driver
        .capture_frame(index, &mut buffer)
        .expect_err("format should mismatch");
    assert!(matches!(err, CameraError::BufferFormat { .. }));
    assert!(buffer.data().iter().all(|&byte| byte == 1));
}

#[test]
#[serial]
fn test_vivid_stop_handle() {
    let (mut driver, index) = require_vivid!();
    driver.start_capture().expect("Failed to start capture");
    capture(&mut driver, index);

    driver.stop_handle().request_stop();
    let format = driver.cam_info(index).expect("camera exists").format;
    let mut buffer = FrameBuffer::new(format).expect("valid buffer");
    assert!(matches!(
        driver.capture_frame(index, &mut buffer),
        Err(CameraError::CaptureStopped { .. })
    ));
    driver.stop_capture().expect("Failed to stop capture");
}
