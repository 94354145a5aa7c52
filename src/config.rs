use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUS: &str = "/dev/i2c-1";
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_ROTATION: u32 = 90;
const DEFAULT_CAMERA_WARMUP_MS: u64 = 1_000;
const DEFAULT_MODELS_DIR: &str = "models";
const DEFAULT_RECORD_DIR: &str = "sessions";
const DEFAULT_REMOTE_ADDR: &str = "127.0.0.1:8886";
const DEFAULT_LED_PATH: &str = "/sys/class/leds/rover-status";
const DEFAULT_RC_ROOT: &str = "/sys/kernel/rcio/rcin";
const DEFAULT_PWM_CHIP: &str = "/sys/class/pwm/pwmchip0";
const DEFAULT_DRIVE_HZ: u32 = 30;

// Drivetrain signatures and channel/terminal bindings. These are defaults,
// not magic constants: the selector only ever sees the configured values.
const DEFAULT_THROTTLE_HAT_ADDR: &str = "0x48";
const DEFAULT_STEERING_HAT_ADDR: &str = "0x77";
const DEFAULT_MOTOR_HAT_ADDR: &str = "0x60";
const DEFAULT_STEERING_CHANNEL: u8 = 0;
const DEFAULT_THROTTLE_CHANNEL: u8 = 2;
const DEFAULT_LEFT_TERMINAL: u8 = 1;
const DEFAULT_RIGHT_TERMINAL: u8 = 2;

#[derive(Debug, Deserialize, Default)]
struct RoverConfigFile {
    models_dir: Option<PathBuf>,
    record_dir: Option<PathBuf>,
    drive_hz: Option<u32>,
    camera: Option<CameraConfigFile>,
    hardware: Option<HardwareConfigFile>,
    remote: Option<RemoteConfigFile>,
    indicator: Option<IndicatorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    rotation: Option<u32>,
    warmup_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct HardwareConfigFile {
    bus: Option<String>,
    throttle_hat_addr: Option<String>,
    steering_hat_addr: Option<String>,
    motor_hat_addr: Option<String>,
    steering_channel: Option<u8>,
    throttle_channel: Option<u8>,
    left_terminal: Option<u8>,
    right_terminal: Option<u8>,
    pwm_chip: Option<String>,
    rc_root: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RemoteConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct IndicatorConfigFile {
    led_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoverConfig {
    pub models_dir: PathBuf,
    pub record_dir: PathBuf,
    pub drive_hz: u32,
    pub camera: CameraSettings,
    pub hardware: HardwareSettings,
    pub remote_addr: String,
    pub led_path: String,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Mounting rotation in degrees; one of 0, 90, 180, 270.
    pub rotation: u32,
    pub warmup_ms: u64,
}

impl CameraSettings {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Resolution of published frames, accounting for mounting rotation
    /// (90/270 swap the axes). Model inputs are sized against this.
    pub fn effective_resolution(&self) -> (u32, u32) {
        match self.rotation {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

/// Recognized hardware signatures and their channel/terminal bindings.
///
/// The drivetrain selector is a pure function of the probed address set and
/// this structure; adding a new hardware profile means adding fields here,
/// not editing selection logic.
#[derive(Debug, Clone)]
pub struct HardwareSettings {
    /// Control bus locator: "/dev/i2c-1" or "stub://0x48,0x77".
    pub bus: String,
    pub throttle_hat_addr: String,
    pub steering_hat_addr: String,
    pub motor_hat_addr: String,
    pub steering_channel: u8,
    pub throttle_channel: u8,
    pub left_terminal: u8,
    pub right_terminal: u8,
    /// PWM chip sysfs root for the servo rail, or "stub://" for simulation.
    pub pwm_chip: String,
    /// RC receiver input root (per-channel pulse-width files).
    pub rc_root: String,
}

impl RoverConfig {
    /// Load configuration: defaults, then the JSON file named by
    /// `ROVER_CONFIG` (if set), then `ROVER_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROVER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RoverConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let hardware = file.hardware.unwrap_or_default();
        Self {
            models_dir: file
                .models_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR)),
            record_dir: file
                .record_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORD_DIR)),
            drive_hz: file.drive_hz.unwrap_or(DEFAULT_DRIVE_HZ),
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                rotation: camera.rotation.unwrap_or(DEFAULT_CAMERA_ROTATION),
                warmup_ms: camera.warmup_ms.unwrap_or(DEFAULT_CAMERA_WARMUP_MS),
            },
            hardware: HardwareSettings {
                bus: hardware.bus.unwrap_or_else(|| DEFAULT_BUS.to_string()),
                throttle_hat_addr: hardware
                    .throttle_hat_addr
                    .unwrap_or_else(|| DEFAULT_THROTTLE_HAT_ADDR.to_string()),
                steering_hat_addr: hardware
                    .steering_hat_addr
                    .unwrap_or_else(|| DEFAULT_STEERING_HAT_ADDR.to_string()),
                motor_hat_addr: hardware
                    .motor_hat_addr
                    .unwrap_or_else(|| DEFAULT_MOTOR_HAT_ADDR.to_string()),
                steering_channel: hardware.steering_channel.unwrap_or(DEFAULT_STEERING_CHANNEL),
                throttle_channel: hardware.throttle_channel.unwrap_or(DEFAULT_THROTTLE_CHANNEL),
                left_terminal: hardware.left_terminal.unwrap_or(DEFAULT_LEFT_TERMINAL),
                right_terminal: hardware.right_terminal.unwrap_or(DEFAULT_RIGHT_TERMINAL),
                pwm_chip: hardware
                    .pwm_chip
                    .unwrap_or_else(|| DEFAULT_PWM_CHIP.to_string()),
                rc_root: hardware
                    .rc_root
                    .unwrap_or_else(|| DEFAULT_RC_ROOT.to_string()),
            },
            remote_addr: file
                .remote
                .and_then(|remote| remote.addr)
                .unwrap_or_else(|| DEFAULT_REMOTE_ADDR.to_string()),
            led_path: file
                .indicator
                .and_then(|indicator| indicator.led_path)
                .unwrap_or_else(|| DEFAULT_LED_PATH.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(bus) = std::env::var("ROVER_BUS") {
            if !bus.trim().is_empty() {
                self.hardware.bus = bus;
            }
        }
        if let Ok(device) = std::env::var("ROVER_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(dir) = std::env::var("ROVER_MODELS_DIR") {
            if !dir.trim().is_empty() {
                self.models_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var("ROVER_RECORD_DIR") {
            if !dir.trim().is_empty() {
                self.record_dir = PathBuf::from(dir);
            }
        }
        if let Ok(addr) = std::env::var("ROVER_REMOTE_ADDR") {
            if !addr.trim().is_empty() {
                self.remote_addr = addr;
            }
        }
        if let Ok(hz) = std::env::var("ROVER_DRIVE_HZ") {
            let hz: u32 = hz
                .parse()
                .map_err(|_| anyhow!("ROVER_DRIVE_HZ must be an integer frequency"))?;
            self.drive_hz = hz;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.camera.fps == 0 {
            return Err(anyhow!("camera fps must be greater than zero"));
        }
        if !matches!(self.camera.rotation, 0 | 90 | 180 | 270) {
            return Err(anyhow!(
                "camera rotation must be one of 0, 90, 180, 270 (got {})",
                self.camera.rotation
            ));
        }
        if self.drive_hz == 0 {
            return Err(anyhow!("drive_hz must be greater than zero"));
        }
        for (name, addr) in [
            ("throttle_hat_addr", &self.hardware.throttle_hat_addr),
            ("steering_hat_addr", &self.hardware.steering_hat_addr),
            ("motor_hat_addr", &self.hardware.motor_hat_addr),
        ] {
            if crate::probe::PeripheralAddressSet::from_addresses([addr.as_str()]).is_empty() {
                return Err(anyhow!("{name} '{addr}' is not a valid bus address"));
            }
        }
        if self.hardware.steering_channel == self.hardware.throttle_channel {
            return Err(anyhow!("steering and throttle PWM channels must differ"));
        }
        if self.hardware.left_terminal == self.hardware.right_terminal {
            return Err(anyhow!("left and right motor terminals must differ"));
        }
        Ok(())
    }
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self::from_file(RoverConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<RoverConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
