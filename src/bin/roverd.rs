//! roverd - the vehicle daemon
//!
//! Composes the vehicle from configuration and probed hardware, then runs
//! the drive loop at the configured cadence until interrupted:
//! read frame -> active pilot decides -> mixer actuates -> recorder logs.
//!
//! Composition failures (no recognized drive hardware, no pilots, broken
//! model files) are logged and exit non-zero; the daemon never runs a
//! half-wired vehicle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use rover_kernel::{Composer, RoverConfig, VehicleState};

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = RoverConfig::load()?;
    log::info!(
        "roverd {} starting (bus {}, camera {})",
        env!("CARGO_PKG_VERSION"),
        cfg.hardware.bus,
        cfg.camera.device
    );

    let mut vehicle = match Composer::new(cfg.clone()).compose() {
        Ok(vehicle) => vehicle,
        Err(err) => {
            log::error!("roverd: composition failed: {err}");
            return Err(err);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("roverd: interrupt received, stopping");
        stop_handler.store(true, Ordering::SeqCst);
    })
    .context("install interrupt handler")?;

    vehicle.indicate(VehicleState::Driving);
    let period = Duration::from_micros(1_000_000 / cfg.drive_hz as u64);
    let mut last_status = Instant::now();
    let mut steps = 0u64;

    while !stop.load(Ordering::SeqCst) {
        let started = Instant::now();

        if let Err(err) = vehicle.step() {
            log::error!("roverd: drive step failed: {err}");
            vehicle.indicate(VehicleState::Error);
            vehicle.shutdown()?;
            return Err(err);
        }
        steps += 1;

        if last_status.elapsed() >= STATUS_LOG_INTERVAL {
            log::info!(
                "roverd: pilot={} steps={} frame_ts={:.3} camera_running={}",
                vehicle.active_pilot_name(),
                steps,
                vehicle.camera().read().timestamp_s,
                vehicle.camera().is_running()
            );
            last_status = Instant::now();
        }

        if let Some(remaining) = period.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    vehicle.shutdown()?;
    log::info!("roverd: stopped after {steps} steps");
    Ok(())
}
