use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::pilot::Pilot;
use crate::vision::Frame;
use crate::Decision;

// RC receiver channel conventions: channel 0 carries steering, channel 2
// throttle; pulse widths are microseconds centered on 1500.
const RC_STEERING_CHANNEL: u8 = 0;
const RC_THROTTLE_CHANNEL: u8 = 2;
const RC_CENTER_US: f32 = 1_500.0;
const RC_RANGE_US: f32 = 500.0;

/// Manual pilot reading an RC receiver through per-channel pulse-width
/// files (one file per channel under the receiver root, e.g.
/// `/sys/kernel/rcio/rcin/ch0`).
///
/// Construction fails when the receiver is not present; assembly treats
/// that as absent equipment.
pub struct RcPilot {
    steering_path: PathBuf,
    throttle_path: PathBuf,
}

impl RcPilot {
    pub fn new(root: &str) -> Result<Self> {
        let root = Path::new(root);
        let steering_path = root.join(format!("ch{RC_STEERING_CHANNEL}"));
        let throttle_path = root.join(format!("ch{RC_THROTTLE_CHANNEL}"));
        for path in [&steering_path, &throttle_path] {
            if !path.is_file() {
                return Err(anyhow!("rc receiver channel {} not present", path.display()));
            }
        }
        Ok(Self {
            steering_path,
            throttle_path,
        })
    }

    fn read_channel(path: &Path) -> Result<f32> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read rc channel {}", path.display()))?;
        let pulse_us: f32 = raw
            .trim()
            .parse()
            .with_context(|| format!("parse rc channel {}", path.display()))?;
        Ok((pulse_us - RC_CENTER_US) / RC_RANGE_US)
    }
}

impl Pilot for RcPilot {
    fn name(&self) -> String {
        "rc".to_string()
    }

    fn decide(&mut self, _frame: &Frame) -> Result<Decision> {
        let steering = Self::read_channel(&self.steering_path)?;
        let throttle = Self::read_channel(&self.throttle_path)?;
        Ok(Decision::new(steering, throttle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver_fixture(steering_us: &str, throttle_us: &str) -> Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("ch0"), steering_us)?;
        std::fs::write(dir.path().join("ch2"), throttle_us)?;
        Ok(dir)
    }

    #[test]
    fn missing_receiver_fails_construction() {
        assert!(RcPilot::new("/nonexistent/rcin").is_err());
    }

    #[test]
    fn pulse_widths_normalize_around_center() -> Result<()> {
        let dir = receiver_fixture("2000\n", "1250\n")?;
        let mut pilot = RcPilot::new(dir.path().to_str().unwrap())?;
        let decision = pilot.decide(&Frame::placeholder(4, 4))?;
        assert_eq!(decision.steering, 1.0);
        assert_eq!(decision.throttle, -0.5);
        Ok(())
    }

    #[test]
    fn out_of_band_pulses_clamp() -> Result<()> {
        let dir = receiver_fixture("2400", "600")?;
        let mut pilot = RcPilot::new(dir.path().to_str().unwrap())?;
        let decision = pilot.decide(&Frame::placeholder(4, 4))?;
        assert_eq!(decision.steering, 1.0);
        assert_eq!(decision.throttle, -1.0);
        Ok(())
    }

    #[test]
    fn garbage_channel_data_is_an_error() -> Result<()> {
        let dir = receiver_fixture("not-a-pulse", "1500")?;
        let mut pilot = RcPilot::new(dir.path().to_str().unwrap())?;
        assert!(pilot.decide(&Frame::placeholder(4, 4)).is_err());
        Ok(())
    }
}
