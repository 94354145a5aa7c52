//! Rover Control Kernel
//!
//! This crate assembles and operates a small autonomous-vehicle control stack:
//! it detects which motor/steering hardware is attached, wires the pilot,
//! mixer, sensor, indicator and recorder subsystems into one runnable vehicle,
//! and continuously acquires camera frames on a background thread for pilots
//! and remote viewers.
//!
//! # Architecture
//!
//! Composition runs once at startup, leaf-first:
//!
//! 1. `probe` scans the control bus for responding peripheral addresses.
//! 2. `drive` maps the address set to a concrete drivetrain: an Ackermann
//!    mixer over PWM servo channels, or a differential mixer over motor-HAT
//!    terminals. No recognized hardware is fatal.
//! 3. `pilot` builds the ordered pilot list: optional manual pilots
//!    (gamepad, RC receiver) plus, per trained model, blended manual+model
//!    pilots. Missing manual devices are skipped; broken model files abort.
//! 4. `compose` wires the above together with the recorder, remote endpoint,
//!    indicator and camera into a [`Vehicle`].
//!
//! The camera producer (`vision`) runs its own acquisition thread from the
//! moment composition finishes, independent of the drive loop.
//!
//! # Module Structure
//!
//! - `probe`: control-bus capability probe
//! - `drive`: actuation drivers, steering mixers, drivetrain selection
//! - `pilot`: manual/model/blended pilots and pilot assembly
//! - `vision`: frame producer and memoized JPEG snapshot cache
//! - `indicate` / `record` / `remote`: indicator, session recorder, viewer endpoint
//! - `compose` / `vehicle`: vehicle composition and the assembled aggregate

use std::time::{SystemTime, UNIX_EPOCH};

pub mod compose;
pub mod config;
pub mod drive;
pub mod indicate;
pub mod pilot;
pub mod probe;
pub mod record;
pub mod remote;
pub mod vehicle;
pub mod vision;

pub use compose::Composer;
pub use config::RoverConfig;
pub use drive::{select_mixer, ActuationDriver, Mixer};
pub use indicate::{Indicator, LedIndicator, NoopIndicator, VehicleState};
pub use pilot::{assemble_pilots, BlendedPilot, ModelPilot, Pilot, RcPilot};
pub use probe::{probe_addresses, PeripheralAddressSet};
pub use record::FileRecorder;
pub use remote::{RemoteServer, RemoteStatus};
pub use vehicle::Vehicle;
pub use vision::{Camera, Frame, Snapshot};

// -------------------- Decisions --------------------

/// A steering/throttle decision produced by a pilot.
///
/// Both components are normalized to -1.0..=1.0: steering -1.0 is full left,
/// throttle -1.0 is full reverse. Values outside the range are clamped at
/// construction so mixers and drivers never see out-of-range input.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Decision {
    pub steering: f32,
    pub throttle: f32,
}

impl Decision {
    pub fn new(steering: f32, throttle: f32) -> Self {
        Self {
            steering: steering.clamp(-1.0, 1.0),
            throttle: throttle.clamp(-1.0, 1.0),
        }
    }

    /// A decision that keeps the vehicle stationary.
    pub fn neutral() -> Self {
        Self::default()
    }
}

// -------------------- Timestamps --------------------

/// Seconds since the Unix epoch as a float.
///
/// Frame timestamps use this scale; the zero-initialized placeholder frame
/// carries timestamp 0.0, so any published frame compares strictly newer.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// -------------------- Fatal composition errors --------------------

/// No recognized actuation hardware responded on the control bus.
///
/// Composition must not proceed without an actuation path; callers are
/// expected to log this and exit non-zero rather than run a vehicle that
/// cannot steer or drive.
#[derive(Clone, Debug)]
pub struct NoHardwareDetected {
    /// Addresses that did respond, for the operator's log line.
    pub probed: PeripheralAddressSet,
}

impl std::fmt::Display for NoHardwareDetected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.probed.is_empty() {
            write!(f, "no recognized drive hardware detected (bus scan found no peripherals)")
        } else {
            write!(
                f,
                "no recognized drive hardware detected (bus scan found {})",
                self.probed
            )
        }
    }
}

impl std::error::Error for NoHardwareDetected {}

/// Pilot assembly produced an empty pilot list.
///
/// With no gamepad, no RC receiver and no trained models there is nothing
/// that can produce a steering decision, and the composer refuses to build
/// the vehicle.
#[derive(Clone, Copy, Debug)]
pub struct NoPilotsAvailable;

impl std::fmt::Display for NoPilotsAvailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "no pilots available: no manual input devices and no trained models"
        )
    }
}

impl std::error::Error for NoPilotsAvailable {}
