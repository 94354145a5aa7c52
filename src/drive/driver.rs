use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

const STUB_PREFIX: &str = "stub://";

// Servo rail timing: 50 Hz period, 1.5 ms center pulse, +/- 0.5 ms swing.
const SERVO_PERIOD_NS: u64 = 20_000_000;
const SERVO_CENTER_NS: i64 = 1_500_000;
const SERVO_RANGE_NS: f32 = 500_000.0;

/// One physical actuation channel.
///
/// Implementations accept a normalized value in -1.0..=1.0 (clamped here,
/// so hardware code never sees out-of-range input) and translate it into
/// whatever the channel speaks: a servo pulse width or a motor duty cycle
/// plus direction pins.
pub trait ActuationDriver {
    fn name(&self) -> String;
    fn set(&mut self, value: f32) -> Result<()>;
}

// ----------------------------------------------------------------------------
// PWM servo channel (steering / throttle on an Ackermann car)
// ----------------------------------------------------------------------------

/// A single sysfs PWM channel on the servo rail.
///
/// `stub://` chip locators yield an in-memory simulation channel, so the
/// whole drivetrain can be exercised on a bench machine.
pub struct PwmChannelDriver {
    channel: u8,
    backend: PwmBackend,
}

enum PwmBackend {
    Simulation,
    Sysfs { channel_dir: PathBuf },
}

impl PwmChannelDriver {
    pub fn new(chip: &str, channel: u8) -> Result<Self> {
        if chip.starts_with(STUB_PREFIX) {
            log::info!("drive: pwm channel {channel} on {chip} (simulation)");
            return Ok(Self {
                channel,
                backend: PwmBackend::Simulation,
            });
        }

        let chip_dir = PathBuf::from(chip);
        let channel_dir = chip_dir.join(format!("pwm{channel}"));
        if !channel_dir.exists() {
            std::fs::write(chip_dir.join("export"), channel.to_string())
                .with_context(|| format!("export pwm channel {channel} on {chip}"))?;
        }
        std::fs::write(channel_dir.join("period"), SERVO_PERIOD_NS.to_string())
            .with_context(|| format!("set period on pwm channel {channel}"))?;
        std::fs::write(channel_dir.join("duty_cycle"), SERVO_CENTER_NS.to_string())
            .with_context(|| format!("center pwm channel {channel}"))?;
        std::fs::write(channel_dir.join("enable"), "1")
            .with_context(|| format!("enable pwm channel {channel}"))?;

        log::info!("drive: pwm channel {channel} on {chip}");
        Ok(Self {
            channel,
            backend: PwmBackend::Sysfs { channel_dir },
        })
    }
}

impl ActuationDriver for PwmChannelDriver {
    fn name(&self) -> String {
        format!("pwm{}", self.channel)
    }

    fn set(&mut self, value: f32) -> Result<()> {
        let value = value.clamp(-1.0, 1.0);
        let duty_ns = SERVO_CENTER_NS + (value * SERVO_RANGE_NS) as i64;
        match &self.backend {
            PwmBackend::Simulation => {
                log::debug!("drive: pwm{} <- {value:.3} ({duty_ns}ns)", self.channel);
                Ok(())
            }
            PwmBackend::Sysfs { channel_dir } => {
                std::fs::write(channel_dir.join("duty_cycle"), duty_ns.to_string())
                    .with_context(|| format!("write duty cycle on pwm{}", self.channel))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Motor HAT terminal (left / right on a differential car)
// ----------------------------------------------------------------------------

/// One motor terminal on a PCA9685-based motor HAT.
///
/// The HAT drives each terminal with a speed PWM channel and two direction
/// pins; `set` maps the signed value onto direction plus duty cycle.
/// `stub://` bus locators yield a simulation terminal.
pub struct MotorHatDriver {
    terminal: u8,
    backend: MotorBackend,
}

enum MotorBackend {
    Simulation,
    #[cfg(feature = "hardware-i2c")]
    I2c {
        dev: i2cdev::linux::LinuxI2CDevice,
        pwm: u8,
        in1: u8,
        in2: u8,
    },
}

/// Terminal to (speed, in2, in1) PCA9685 channel bindings used by the HAT.
fn terminal_channels(terminal: u8) -> Result<(u8, u8, u8)> {
    match terminal {
        1 => Ok((8, 9, 10)),
        2 => Ok((13, 12, 11)),
        3 => Ok((2, 3, 4)),
        4 => Ok((7, 6, 5)),
        _ => Err(anyhow!("motor terminal {terminal} out of range (1..=4)")),
    }
}

impl MotorHatDriver {
    pub fn new(bus: &str, hat_addr: &str, terminal: u8) -> Result<Self> {
        // Validate the binding even in simulation, so a bad config fails
        // identically on bench and vehicle.
        let (_pwm, _in2, _in1) = terminal_channels(terminal)?;

        if bus.starts_with(STUB_PREFIX) {
            log::info!("drive: motor terminal {terminal} at {hat_addr} on {bus} (simulation)");
            return Ok(Self {
                terminal,
                backend: MotorBackend::Simulation,
            });
        }

        #[cfg(feature = "hardware-i2c")]
        {
            let addr = crate::probe::parse_address(hat_addr)
                .ok_or_else(|| anyhow!("invalid motor HAT address '{hat_addr}'"))?;
            let backend = Self::open_i2c(bus, addr, terminal)?;
            log::info!("drive: motor terminal {terminal} at {hat_addr} on {bus}");
            Ok(Self { terminal, backend })
        }
        #[cfg(not(feature = "hardware-i2c"))]
        {
            Err(anyhow!(
                "motor HAT on {bus} requires the hardware-i2c feature"
            ))
        }
    }

    #[cfg(feature = "hardware-i2c")]
    fn open_i2c(bus: &str, addr: u16, terminal: u8) -> Result<MotorBackend> {
        use i2cdev::core::I2CDevice;
        use i2cdev::linux::LinuxI2CDevice;

        const MODE1: u8 = 0x00;
        const PRESCALE: u8 = 0xfe;
        // ~1.6 kHz motor PWM: round(25MHz / (4096 * 1600)) - 1
        const MOTOR_PRESCALE: u8 = 0x03;

        let (pwm, in2, in1) = terminal_channels(terminal)?;
        let mut dev = LinuxI2CDevice::new(bus, addr)
            .with_context(|| format!("open motor HAT {addr:#04x} on {bus}"))?;

        // Sleep, set prescale, wake. Prescale writes only latch in sleep mode.
        dev.smbus_write_byte_data(MODE1, 0x10)
            .context("sleep motor HAT controller")?;
        dev.smbus_write_byte_data(PRESCALE, MOTOR_PRESCALE)
            .context("set motor HAT prescale")?;
        dev.smbus_write_byte_data(MODE1, 0x00)
            .context("wake motor HAT controller")?;

        Ok(MotorBackend::I2c { dev, pwm, in1, in2 })
    }

    #[cfg(feature = "hardware-i2c")]
    fn write_channel(
        dev: &mut i2cdev::linux::LinuxI2CDevice,
        channel: u8,
        off_count: u16,
    ) -> Result<()> {
        use i2cdev::core::I2CDevice;

        // LED{n} register block: ON_L, ON_H, OFF_L, OFF_H.
        let base = 0x06 + 4 * channel;
        dev.smbus_write_byte_data(base, 0)
            .context("write channel on low")?;
        dev.smbus_write_byte_data(base + 1, 0)
            .context("write channel on high")?;
        dev.smbus_write_byte_data(base + 2, (off_count & 0xff) as u8)
            .context("write channel off low")?;
        dev.smbus_write_byte_data(base + 3, (off_count >> 8) as u8)
            .context("write channel off high")?;
        Ok(())
    }
}

impl ActuationDriver for MotorHatDriver {
    fn name(&self) -> String {
        format!("motor{}", self.terminal)
    }

    fn set(&mut self, value: f32) -> Result<()> {
        let value = value.clamp(-1.0, 1.0);
        match &mut self.backend {
            MotorBackend::Simulation => {
                log::debug!("drive: motor{} <- {value:.3}", self.terminal);
                Ok(())
            }
            #[cfg(feature = "hardware-i2c")]
            MotorBackend::I2c { dev, pwm, in1, in2 } => {
                let duty = (value.abs() * 4095.0).round() as u16;
                let (fwd, rev) = if value >= 0.0 { (4095, 0) } else { (0, 4095) };
                Self::write_channel(dev, *in1, fwd)?;
                Self::write_channel(dev, *in2, rev)?;
                Self::write_channel(dev, *pwm, duty)?;
                Ok(())
            }
        }
    }
}
