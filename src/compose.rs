//! Vehicle composition.
//!
//! The composer runs once at startup and either returns a fully wired
//! [`Vehicle`] or an error; there is no partially wired mode. Order:
//! bus probe, drivetrain selection, pilot assembly, then recorder,
//! indicator, camera and remote endpoint. Only optional equipment
//! (indicator hardware, manual pilots inside assembly) is fault tolerant;
//! every other failure aborts composition.

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::config::RoverConfig;
use crate::drive::select_mixer;
use crate::indicate::{Indicator, LedIndicator, NoopIndicator, VehicleState};
use crate::pilot::assemble_pilots;
use crate::probe::probe_addresses;
use crate::record::FileRecorder;
use crate::remote::{RemoteServer, RemoteStatus};
use crate::vehicle::Vehicle;
use crate::vision::Camera;
use crate::NoPilotsAvailable;

pub struct Composer {
    cfg: RoverConfig,
}

impl Composer {
    pub fn new(cfg: RoverConfig) -> Self {
        Self { cfg }
    }

    /// Probe, select, assemble and wire. Returns a vehicle whose camera
    /// producer is already running.
    pub fn compose(&self) -> Result<Vehicle> {
        let cfg = &self.cfg;

        let addresses = probe_addresses(&cfg.hardware.bus);
        let mixer = match select_mixer(&addresses, &cfg.hardware) {
            Ok(mixer) => mixer,
            Err(err) => {
                log::error!("compose: {err}");
                return Err(err);
            }
        };

        let (pilots, default_index) = assemble_pilots(cfg)?;
        if pilots.is_empty() {
            log::error!("compose: {}", NoPilotsAvailable);
            return Err(NoPilotsAvailable.into());
        }

        let recorder = FileRecorder::new(&cfg.record_dir)?;

        let mut indicator: Box<dyn Indicator> = match LedIndicator::new(&cfg.led_path) {
            Ok(led) => {
                log::info!("indicator: led at {}", cfg.led_path);
                Box::new(led)
            }
            Err(err) => {
                log::info!("indicator: none available ({err}); using noop");
                Box::new(NoopIndicator)
            }
        };
        if let Err(err) = indicator.show(VehicleState::Warmup) {
            log::warn!("indicator: failed to show warm-up: {err}");
        }

        let mut camera = Camera::new(cfg.camera.clone())?;
        camera.start()?;
        let camera = Arc::new(camera);

        let status = Arc::new(Mutex::new(RemoteStatus {
            active_pilot: String::new(),
            drivetrain: mixer.drivetrain().to_string(),
        }));
        let remote = RemoteServer::new(cfg.remote_addr.clone())
            .spawn(camera.clone(), status.clone())?;

        let mut vehicle = Vehicle {
            pilots,
            active_pilot: default_index,
            mixer,
            camera,
            indicator,
            recorder,
            remote,
            status,
        };
        vehicle.set_pilot(default_index)?;
        log::info!(
            "compose: vehicle ready - {} pilot(s), {} drivetrain, session {}",
            vehicle.pilot_count(),
            vehicle.mixer.drivetrain(),
            vehicle.recorder.session_dir().display()
        );
        Ok(vehicle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoHardwareDetected, NoPilotsAvailable};

    const VALID_LINEAR: &str =
        r#"{ "kind": "linear", "steering_gain": 1.0, "throttle": 0.3 }"#;

    struct BenchFixture {
        cfg: RoverConfig,
        _rcin: tempfile::TempDir,
        _models: tempfile::TempDir,
        _sessions: tempfile::TempDir,
    }

    fn bench_fixture() -> Result<BenchFixture> {
        let rcin = tempfile::tempdir()?;
        std::fs::write(rcin.path().join("ch0"), "1500")?;
        std::fs::write(rcin.path().join("ch2"), "1500")?;
        let models = tempfile::tempdir()?;
        std::fs::write(models.path().join("track.json"), VALID_LINEAR)?;
        let sessions = tempfile::tempdir()?;

        let mut cfg = RoverConfig::default();
        cfg.hardware.bus = "stub://0x48,0x77".to_string();
        cfg.hardware.pwm_chip = "stub://".to_string();
        cfg.hardware.rc_root = rcin.path().to_str().unwrap().to_string();
        cfg.models_dir = models.path().to_path_buf();
        cfg.record_dir = sessions.path().to_path_buf();
        cfg.remote_addr = "127.0.0.1:0".to_string();
        cfg.led_path = "stub://bench".to_string();
        cfg.camera.device = "stub://bench".to_string();
        cfg.camera.width = 16;
        cfg.camera.height = 16;
        cfg.camera.warmup_ms = 50;
        Ok(BenchFixture {
            cfg,
            _rcin: rcin,
            _models: models,
            _sessions: sessions,
        })
    }

    #[test]
    fn composes_a_running_vehicle_on_the_bench() -> Result<()> {
        let fixture = bench_fixture()?;
        let vehicle = Composer::new(fixture.cfg.clone()).compose()?;

        assert_eq!(vehicle.pilot_count(), 2); // rc + rc+model:track
        assert_eq!(vehicle.active_pilot_name(), "rc");
        assert!(vehicle.camera().is_running());

        let mut vehicle = vehicle;
        vehicle.step()?;
        vehicle.shutdown()?;
        Ok(())
    }

    #[test]
    fn no_recognized_hardware_aborts_composition() -> Result<()> {
        let mut fixture = bench_fixture()?;
        fixture.cfg.hardware.bus = "stub://0x29".to_string();
        let err = Composer::new(fixture.cfg.clone()).compose().unwrap_err();
        assert!(err.downcast_ref::<NoHardwareDetected>().is_some());
        Ok(())
    }

    #[test]
    fn zero_pilots_aborts_composition() -> Result<()> {
        let mut fixture = bench_fixture()?;
        fixture.cfg.hardware.rc_root = "/nonexistent/rcin".to_string();
        fixture.cfg.models_dir = "/nonexistent/models".into();
        let err = Composer::new(fixture.cfg.clone()).compose().unwrap_err();
        assert!(err.downcast_ref::<NoPilotsAvailable>().is_some());
        Ok(())
    }

    #[test]
    fn motor_hat_bus_composes_a_differential_vehicle() -> Result<()> {
        let mut fixture = bench_fixture()?;
        fixture.cfg.hardware.bus = "stub://0x60".to_string();
        let vehicle = Composer::new(fixture.cfg.clone()).compose()?;
        assert_eq!(vehicle.mixer.drivetrain(), "differential");
        vehicle.shutdown()?;
        Ok(())
    }
}
