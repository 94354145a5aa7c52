//! hwscan - probe the control bus and report the drivetrain decision
//!
//! Dry-run diagnostic: scans the bus exactly as composition would, prints
//! the responding addresses and which drivetrain the selector would pick.
//! No drivers are constructed and nothing is actuated.

use anyhow::Result;
use clap::Parser;

use rover_kernel::drive::{detect_drivetrain, Drivetrain};
use rover_kernel::{probe_addresses, NoHardwareDetected, RoverConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Control bus to scan ("/dev/i2c-1" or "stub://0x48,0x77").
    #[arg(long, env = "ROVER_BUS")]
    bus: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut cfg = RoverConfig::load()?;
    if let Some(bus) = args.bus {
        cfg.hardware.bus = bus;
    }

    let addresses = probe_addresses(&cfg.hardware.bus);
    if addresses.is_empty() {
        println!("probed {}: no peripherals responded", cfg.hardware.bus);
    } else {
        println!("probed {}: [{}]", cfg.hardware.bus, addresses);
    }

    match detect_drivetrain(&addresses, &cfg.hardware) {
        Some(Drivetrain::Ackermann) => {
            println!(
                "drivetrain: ackermann (steering hat {}, throttle hat {})",
                cfg.hardware.steering_hat_addr, cfg.hardware.throttle_hat_addr
            );
            Ok(())
        }
        Some(Drivetrain::Differential) => {
            println!(
                "drivetrain: differential (motor hat {}, terminals {}/{})",
                cfg.hardware.motor_hat_addr,
                cfg.hardware.left_terminal,
                cfg.hardware.right_terminal
            );
            Ok(())
        }
        None => Err(NoHardwareDetected { probed: addresses }.into()),
    }
}
