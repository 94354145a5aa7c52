use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::config::CameraSettings;
use crate::now_ts;
use crate::vision::{Frame, Snapshot};

const STUB_PREFIX: &str = "stub://";

/// State shared between the acquisition thread and consumers.
///
/// Discipline: `frame` has a single writer (the acquisition thread) and any
/// number of readers; `snapshot` is written by whichever consumer thread
/// finds it stale inside `capture_jpeg`. Both are individually locked, and
/// a publication is a whole-`Arc` swap, so readers never observe a torn
/// frame.
struct Shared {
    frame: Mutex<Arc<Frame>>,
    snapshot: Mutex<Snapshot>,
    stop: AtomicBool,
    running: AtomicBool,
    /// Device-open failure reported by the acquisition thread, harvested by
    /// `start` after the warm-up interval.
    fault: Mutex<Option<String>>,
}

impl Shared {
    fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        *self
            .frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = frame;
    }
}

/// The camera producer: runs the acquisition loop on a dedicated
/// background thread that owns the capture device for its entire lifetime.
///
/// Lifecycle is `new` -> `start` -> (`read` / `capture_jpeg` from any
/// thread) -> `stop`. `start` may be called once; a second call is refused
/// rather than spawning a second producer. `stop` is cooperative and
/// asynchronous: it raises a flag that the loop observes at the next
/// iteration boundary, and the capture device is released on the thread's
/// exit path (including panic unwind, since the thread owns the backend).
pub struct Camera {
    settings: CameraSettings,
    shared: Arc<Shared>,
    started: bool,
}

impl Camera {
    /// Validate the device locator and prepare the shared slots. The device
    /// itself is opened by the acquisition thread in `start`, which is the
    /// only owner it ever has.
    pub fn new(settings: CameraSettings) -> Result<Self> {
        CaptureBackend::validate(&settings)?;
        let shared = Arc::new(Shared {
            frame: Mutex::new(Arc::new(Frame::placeholder(
                settings.width,
                settings.height,
            ))),
            snapshot: Mutex::new(Snapshot::empty()),
            stop: AtomicBool::new(false),
            running: AtomicBool::new(false),
            fault: Mutex::new(None),
        });
        Ok(Self {
            settings,
            shared,
            started: false,
        })
    }

    /// Spawn the acquisition thread, then block for the configured warm-up
    /// so the first `read` after `start` is likely to see real data. A
    /// device that failed to open inside the thread is reported here.
    ///
    /// Calling `start` twice is an error: exactly one producer may own the
    /// capture device.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(anyhow!("camera already started"));
        }
        self.started = true;
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let settings = self.settings.clone();
        std::thread::spawn(move || acquisition_loop(settings, shared));

        log::info!(
            "camera: acquisition started on {} ({}x{} @{}fps, rotation {}), warming up {}ms",
            self.settings.device,
            self.settings.width,
            self.settings.height,
            self.settings.fps,
            self.settings.rotation,
            self.settings.warmup_ms
        );
        std::thread::sleep(self.settings.warmup());

        let fault = self
            .shared
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(fault) = fault {
            return Err(anyhow!("camera failed to start: {fault}"));
        }
        Ok(())
    }

    /// Ask the acquisition thread to finish the current frame and exit.
    /// Best-effort: there is no join; the device is released by the thread.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Whether the acquisition thread is alive.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// The most recently published frame, without blocking. Before the
    /// first capture this is the zero-filled placeholder.
    pub fn read(&self) -> Arc<Frame> {
        self.shared
            .frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The latest frame as JPEG, re-encoded only when a newer frame has
    /// been published since the cached snapshot. Safe to call from any
    /// number of consumer threads.
    pub fn capture_jpeg(&self) -> Result<Snapshot> {
        let frame = self.read();
        let mut cache = self
            .shared
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if frame.timestamp_s > cache.timestamp_s {
            let jpeg = frame.encode_jpeg()?;
            *cache = Snapshot {
                jpeg: Arc::new(jpeg),
                timestamp_s: frame.timestamp_s,
            };
        }
        Ok(cache.clone())
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    #[cfg(test)]
    pub(crate) fn publish_for_test(&self, frame: Frame) {
        self.shared.publish(frame);
    }
}

fn acquisition_loop(settings: CameraSettings, shared: Arc<Shared>) {
    let rotation = settings.rotation;
    let mut backend = match CaptureBackend::open(&settings) {
        Ok(backend) => backend,
        Err(err) => {
            log::error!("camera: failed to open {}: {err}", settings.device);
            *shared
                .fault
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
            shared.running.store(false, Ordering::SeqCst);
            return;
        }
    };
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            log::info!("camera: stop requested, acquisition ending");
            break;
        }
        match backend.next_frame() {
            Ok((pixels, width, height)) => {
                let (pixels, width, height) = rotate_rgb(pixels, width, height, rotation);
                shared.publish(Frame {
                    pixels,
                    width,
                    height,
                    timestamp_s: now_ts(),
                });
            }
            Err(err) => {
                // Leave the last published frame in place rather than
                // publishing garbage; recovery policy lives with the operator.
                log::error!("camera: capture failed, acquisition ending: {err}");
                break;
            }
        }
    }
    shared.running.store(false, Ordering::SeqCst);
    // `backend` drops here, releasing the capture device on every exit path.
}

/// Rotate a packed RGB buffer by the mounting rotation (degrees clockwise).
fn rotate_rgb(pixels: Vec<u8>, width: u32, height: u32, rotation: u32) -> (Vec<u8>, u32, u32) {
    let (w, h) = (width as usize, height as usize);
    match rotation {
        90 => {
            let mut out = vec![0u8; pixels.len()];
            for y in 0..h {
                for x in 0..w {
                    let src = (y * w + x) * 3;
                    let dst = (x * h + (h - 1 - y)) * 3;
                    out[dst..dst + 3].copy_from_slice(&pixels[src..src + 3]);
                }
            }
            (out, height, width)
        }
        180 => {
            let mut out = vec![0u8; pixels.len()];
            for y in 0..h {
                for x in 0..w {
                    let src = (y * w + x) * 3;
                    let dst = ((h - 1 - y) * w + (w - 1 - x)) * 3;
                    out[dst..dst + 3].copy_from_slice(&pixels[src..src + 3]);
                }
            }
            (out, width, height)
        }
        270 => {
            let mut out = vec![0u8; pixels.len()];
            for y in 0..h {
                for x in 0..w {
                    let src = (y * w + x) * 3;
                    let dst = (((w - 1 - x) * h) + y) * 3;
                    out[dst..dst + 3].copy_from_slice(&pixels[src..src + 3]);
                }
            }
            (out, height, width)
        }
        _ => (pixels, width, height),
    }
}

// ----------------------------------------------------------------------------
// Capture backends
// ----------------------------------------------------------------------------

enum CaptureBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "camera-v4l2")]
    V4l2(DeviceCamera),
}

impl CaptureBackend {
    /// Fail composition early when the locator cannot possibly be served by
    /// this build. Actual device-open errors surface from `start`.
    fn validate(settings: &CameraSettings) -> Result<()> {
        if settings.device.starts_with(STUB_PREFIX) || cfg!(feature = "camera-v4l2") {
            Ok(())
        } else {
            anyhow::bail!(
                "camera device {} requires the camera-v4l2 feature",
                settings.device
            )
        }
    }

    fn open(settings: &CameraSettings) -> Result<Self> {
        if settings.device.starts_with(STUB_PREFIX) {
            return Ok(Self::Synthetic(SyntheticCamera::new(settings)));
        }
        #[cfg(feature = "camera-v4l2")]
        {
            Ok(Self::V4l2(DeviceCamera::open(settings)?))
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            anyhow::bail!(
                "camera device {} requires the camera-v4l2 feature",
                settings.device
            )
        }
    }

    /// Block until the device yields the next frame; returns packed RGB.
    fn next_frame(&mut self) -> Result<(Vec<u8>, u32, u32)> {
        match self {
            Self::Synthetic(camera) => camera.next_frame(),
            #[cfg(feature = "camera-v4l2")]
            Self::V4l2(camera) => camera.next_frame(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for benches and tests
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_interval: Duration,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(settings: &CameraSettings) -> Self {
        let fps = settings.fps.max(1);
        Self {
            width: settings.width,
            height: settings.height,
            frame_interval: Duration::from_micros(1_000_000 / fps as u64),
            frame_count: 0,
        }
    }

    fn next_frame(&mut self) -> Result<(Vec<u8>, u32, u32)> {
        // Pace like real hardware: one frame per interval.
        std::thread::sleep(self.frame_interval);
        self.frame_count += 1;

        let pixel_count = (self.width as usize) * (self.height as usize) * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        Ok((pixels, self.width, self.height))
    }
}

// ----------------------------------------------------------------------------
// V4L2 device camera
// ----------------------------------------------------------------------------

#[cfg(feature = "camera-v4l2")]
struct DeviceCamera {
    state: CaptureState,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "camera-v4l2")]
#[ouroboros::self_referencing]
struct CaptureState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "camera-v4l2")]
impl DeviceCamera {
    fn open(settings: &CameraSettings) -> Result<Self> {
        use anyhow::Context;
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&settings.device)
            .with_context(|| format!("open camera device {}", settings.device))?;

        let mut format = device.format().context("read camera format")?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "camera: failed to set format on {}: {}",
                    settings.device,
                    err
                );
                device
                    .format()
                    .context("read camera format after set failure")?
            }
        };

        if settings.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(settings.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("camera: failed to set fps on {}: {}", settings.device, err);
            }
        }

        let active_width = format.width;
        let active_height = format.height;

        let state = CaptureStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create camera buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "camera: opened {} ({}x{})",
            settings.device,
            active_width,
            active_height
        );
        Ok(Self {
            state,
            active_width,
            active_height,
        })
    }

    fn next_frame(&mut self) -> Result<(Vec<u8>, u32, u32)> {
        use anyhow::Context;
        use v4l::io::traits::CaptureStream;

        let (buf, _meta) = self
            .state
            .with_stream_mut(|stream| stream.next())
            .context("capture camera frame")?;
        Ok((buf.to_vec(), self.active_width, self.active_height))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_settings() -> CameraSettings {
        CameraSettings {
            device: "stub://bench".to_string(),
            fps: 100,
            width: 32,
            height: 24,
            rotation: 0,
            warmup_ms: 100,
        }
    }

    fn frame_with(ts: f64, fill: u8) -> Frame {
        let mut frame = Frame::placeholder(8, 8);
        frame.pixels.iter_mut().for_each(|p| *p = fill);
        frame.timestamp_s = ts;
        frame
    }

    #[cfg(not(feature = "camera-v4l2"))]
    #[test]
    fn device_camera_requires_the_v4l2_feature() {
        let mut settings = stub_settings();
        settings.device = "/dev/video0".to_string();
        assert!(Camera::new(settings).is_err());
    }

    #[test]
    fn read_before_start_returns_placeholder() -> Result<()> {
        let camera = Camera::new(stub_settings())?;
        let frame = camera.read();
        assert!(frame.is_placeholder());
        assert_eq!(frame.width, 32);
        assert_eq!(frame.height, 24);
        Ok(())
    }

    #[test]
    fn read_after_warmup_returns_real_frame() -> Result<()> {
        let mut camera = Camera::new(stub_settings())?;
        camera.start()?;
        let frame = camera.read();
        assert!(frame.timestamp_s > 0.0, "expected a published frame after warm-up");
        camera.stop();
        Ok(())
    }

    #[test]
    fn second_start_is_refused() -> Result<()> {
        let mut camera = Camera::new(stub_settings())?;
        camera.start()?;
        assert!(camera.start().is_err());
        camera.stop();
        Ok(())
    }

    #[test]
    fn stop_ends_the_acquisition_thread() -> Result<()> {
        let mut camera = Camera::new(stub_settings())?;
        camera.start()?;
        assert!(camera.is_running());
        camera.stop();
        std::thread::sleep(Duration::from_millis(300));
        assert!(!camera.is_running());
        Ok(())
    }

    #[test]
    fn snapshot_is_cached_until_a_newer_frame_arrives() -> Result<()> {
        let camera = Camera::new(stub_settings())?;
        camera.publish_for_test(frame_with(1.0, 10));

        let first = camera.capture_jpeg()?;
        let second = camera.capture_jpeg()?;
        assert!(Arc::ptr_eq(&first.jpeg, &second.jpeg), "cache must not recompute");
        assert_eq!(first.timestamp_s, 1.0);
        Ok(())
    }

    #[test]
    fn snapshot_recomputes_for_newer_frame() -> Result<()> {
        let camera = Camera::new(stub_settings())?;
        camera.publish_for_test(frame_with(1.0, 10));
        let first = camera.capture_jpeg()?;

        // Same pixels, newer timestamp: recomputed but byte-identical.
        camera.publish_for_test(frame_with(2.0, 10));
        let same = camera.capture_jpeg()?;
        assert_eq!(*first.jpeg, *same.jpeg);
        assert_eq!(same.timestamp_s, 2.0);

        // Different pixels, newer timestamp: bytes change.
        camera.publish_for_test(frame_with(3.0, 200));
        let changed = camera.capture_jpeg()?;
        assert_ne!(*same.jpeg, *changed.jpeg);
        Ok(())
    }

    #[test]
    fn concurrent_readers_never_observe_torn_frames() -> Result<()> {
        let mut camera = Camera::new(stub_settings())?;
        camera.start()?;
        let camera = Arc::new(camera);

        let mut readers = Vec::new();
        for _ in 0..4 {
            let camera = camera.clone();
            readers.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let frame = camera.read();
                    assert_eq!(frame.width, 32);
                    assert_eq!(frame.height, 24);
                    assert_eq!(frame.pixels.len(), 32 * 24 * 3);
                }
            }));
        }
        for reader in readers {
            reader.join().expect("reader thread");
        }
        camera.stop();
        Ok(())
    }

    #[test]
    fn rotation_90_transposes_dimensions() {
        // 2x1 row [A, B] becomes a 1x2 column [A; B] under clockwise 90.
        let pixels = vec![1, 1, 1, 2, 2, 2];
        let (out, w, h) = rotate_rgb(pixels, 2, 1, 90);
        assert_eq!((w, h), (1, 2));
        assert_eq!(out, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn rotation_270_transposes_the_other_way() {
        // 2x1 row [A, B] becomes [B; A] under counter-clockwise 90.
        let pixels = vec![1, 1, 1, 2, 2, 2];
        let (out, w, h) = rotate_rgb(pixels, 2, 1, 270);
        assert_eq!((w, h), (1, 2));
        assert_eq!(out, vec![2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn rotation_180_reverses_rows_and_columns() {
        let pixels = vec![1, 1, 1, 2, 2, 2];
        let (out, w, h) = rotate_rgb(pixels, 2, 1, 180);
        assert_eq!((w, h), (2, 1));
        assert_eq!(out, vec![2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn rotated_producer_publishes_rotated_dimensions() -> Result<()> {
        let mut settings = stub_settings();
        settings.rotation = 90;
        let mut camera = Camera::new(settings)?;
        camera.start()?;
        let frame = camera.read();
        assert_eq!((frame.width, frame.height), (24, 32));
        camera.stop();
        Ok(())
    }
}
