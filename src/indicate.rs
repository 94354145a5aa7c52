//! Status indicators.
//!
//! The vehicle signals coarse state through an LED when one is fitted.
//! Indicators are strictly optional equipment: the composer tries the
//! hardware-backed indicator and falls back to a no-op, so nothing else in
//! the kernel needs to care whether an LED exists.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

const STUB_PREFIX: &str = "stub://";

/// Coarse vehicle state, mapped by indicators onto whatever they drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleState {
    Warmup,
    Standby,
    Driving,
    Error,
}

impl VehicleState {
    /// LED-class brightness for each state: off / dim / full / blinking is
    /// out of scope for a plain brightness file, so error re-uses dim.
    fn brightness(self) -> u8 {
        match self {
            VehicleState::Warmup => 64,
            VehicleState::Standby => 16,
            VehicleState::Driving => 255,
            VehicleState::Error => 64,
        }
    }
}

pub trait Indicator {
    fn show(&mut self, state: VehicleState) -> Result<()>;
}

/// Fallback indicator when no LED hardware is available.
pub struct NoopIndicator;

impl Indicator for NoopIndicator {
    fn show(&mut self, _state: VehicleState) -> Result<()> {
        Ok(())
    }
}

/// LED-class indicator writing the brightness file under a sysfs LED path
/// (e.g. `/sys/class/leds/rover-status`). `stub://` paths yield an
/// in-memory LED for the bench.
pub struct LedIndicator {
    backend: LedBackend,
}

enum LedBackend {
    Simulation { last: Option<VehicleState> },
    Sysfs { brightness_path: PathBuf },
}

impl LedIndicator {
    pub fn new(led_path: &str) -> Result<Self> {
        if led_path.starts_with(STUB_PREFIX) {
            return Ok(Self {
                backend: LedBackend::Simulation { last: None },
            });
        }
        let brightness_path = PathBuf::from(led_path).join("brightness");
        if !brightness_path.is_file() {
            return Err(anyhow!("no LED at {led_path}"));
        }
        Ok(Self {
            backend: LedBackend::Sysfs { brightness_path },
        })
    }

    #[cfg(test)]
    pub(crate) fn last_shown(&self) -> Option<VehicleState> {
        match &self.backend {
            LedBackend::Simulation { last } => *last,
            LedBackend::Sysfs { .. } => None,
        }
    }
}

impl Indicator for LedIndicator {
    fn show(&mut self, state: VehicleState) -> Result<()> {
        match &mut self.backend {
            LedBackend::Simulation { last } => {
                *last = Some(state);
                Ok(())
            }
            LedBackend::Sysfs { brightness_path } => {
                std::fs::write(&*brightness_path, state.brightness().to_string())
                    .with_context(|| format!("write LED {}", brightness_path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_led_fails_construction() {
        assert!(LedIndicator::new("/nonexistent/led").is_err());
    }

    #[test]
    fn simulation_led_records_state() -> Result<()> {
        let mut led = LedIndicator::new("stub://bench")?;
        assert_eq!(led.last_shown(), None);
        led.show(VehicleState::Driving)?;
        assert_eq!(led.last_shown(), Some(VehicleState::Driving));
        Ok(())
    }

    #[test]
    fn sysfs_led_writes_brightness() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("brightness"), "0")?;
        let mut led = LedIndicator::new(dir.path().to_str().unwrap())?;
        led.show(VehicleState::Standby)?;
        assert_eq!(
            std::fs::read_to_string(dir.path().join("brightness"))?,
            "16"
        );
        Ok(())
    }

    #[test]
    fn noop_indicator_always_succeeds() -> Result<()> {
        let mut indicator = NoopIndicator;
        indicator.show(VehicleState::Error)?;
        Ok(())
    }
}
