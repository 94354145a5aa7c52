use anyhow::Result;

use crate::config::HardwareSettings;
use crate::drive::{AckermannMixer, DifferentialMixer, Mixer, MotorHatDriver, PwmChannelDriver};
use crate::probe::PeripheralAddressSet;
use crate::NoHardwareDetected;

/// Drivetrain geometry the probed hardware supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Drivetrain {
    Ackermann,
    Differential,
}

impl std::fmt::Display for Drivetrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Drivetrain::Ackermann => write!(f, "ackermann"),
            Drivetrain::Differential => write!(f, "differential"),
        }
    }
}

/// Pure selection decision, shared by [`select_mixer`] and dry-run tools.
///
/// The Ackermann signature is checked first: a board exposing both the HAT
/// pair and the motor HAT resolves to Ackermann.
pub fn detect_drivetrain(
    addresses: &PeripheralAddressSet,
    hw: &HardwareSettings,
) -> Option<Drivetrain> {
    if addresses.contains(&hw.throttle_hat_addr) && addresses.contains(&hw.steering_hat_addr) {
        return Some(Drivetrain::Ackermann);
    }
    if addresses.contains(&hw.motor_hat_addr) {
        return Some(Drivetrain::Differential);
    }
    None
}

/// Map the probed address set to a concrete drivetrain.
///
/// Deterministic over `(addresses, settings)`:
/// - steering HAT and throttle HAT both present -> Ackermann over two PWM
///   servo channels
/// - otherwise motor HAT present -> Differential over two motor terminals
/// - otherwise [`NoHardwareDetected`]; there is no safe actuation fallback,
///   so composition must not proceed.
pub fn select_mixer(addresses: &PeripheralAddressSet, hw: &HardwareSettings) -> Result<Mixer> {
    match detect_drivetrain(addresses, hw) {
        Some(Drivetrain::Ackermann) => {
            log::info!(
                "drive: steering/throttle HATs at {}/{} - ackermann drivetrain",
                hw.steering_hat_addr,
                hw.throttle_hat_addr
            );
            let steering = PwmChannelDriver::new(&hw.pwm_chip, hw.steering_channel)?;
            let throttle = PwmChannelDriver::new(&hw.pwm_chip, hw.throttle_channel)?;
            Ok(Mixer::Ackermann(AckermannMixer::new(
                Box::new(steering),
                Box::new(throttle),
            )))
        }
        Some(Drivetrain::Differential) => {
            log::info!(
                "drive: motor HAT at {} - differential drivetrain",
                hw.motor_hat_addr
            );
            let left = MotorHatDriver::new(&hw.bus, &hw.motor_hat_addr, hw.left_terminal)?;
            let right = MotorHatDriver::new(&hw.bus, &hw.motor_hat_addr, hw.right_terminal)?;
            Ok(Mixer::Differential(DifferentialMixer::new(
                Box::new(left),
                Box::new(right),
            )))
        }
        None => Err(NoHardwareDetected {
            probed: addresses.clone(),
        }
        .into()),
    }
}
