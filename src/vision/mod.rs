//! Frame acquisition and the snapshot cache.
//!
//! This module owns the camera device and publishes frames for everything
//! else in the kernel:
//! - pilots poll [`Camera::read`] at the drive-loop rate
//! - remote viewers poll [`Camera::capture_jpeg`] at whatever rate they like
//!
//! One background acquisition thread fills the shared frame slot at the
//! device's native rate. The JPEG snapshot is derived lazily and memoized:
//! it is re-encoded only when the current frame is strictly newer than the
//! cached snapshot, so slow consumers never pay for frames they skip.
//!
//! Device locators follow the bus convention: `stub://name` selects a
//! deterministic synthetic camera, anything else is a V4L2 device node
//! (requires the `camera-v4l2` feature).

mod camera;
mod frame;

pub use camera::Camera;
pub use frame::{Frame, Snapshot};
