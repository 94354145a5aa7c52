//! End-to-end composition on stub hardware: probe a synthetic bus, compose
//! a vehicle, drive a few steps and poll the remote endpoint the way an
//! operator's browser would.

use std::io::{Read, Write};
use std::net::TcpStream;

use anyhow::Result;

use rover_kernel::{Composer, NoHardwareDetected, RoverConfig};

const VALID_LINEAR: &str = r#"{ "kind": "linear", "steering_gain": 1.0, "throttle": 0.3 }"#;

struct Bench {
    cfg: RoverConfig,
    _rcin: tempfile::TempDir,
    _models: tempfile::TempDir,
    _sessions: tempfile::TempDir,
}

fn bench(bus: &str, model_names: &[&str]) -> Result<Bench> {
    let rcin = tempfile::tempdir()?;
    std::fs::write(rcin.path().join("ch0"), "1600")?;
    std::fs::write(rcin.path().join("ch2"), "1400")?;
    let models = tempfile::tempdir()?;
    for name in model_names {
        std::fs::write(models.path().join(format!("{name}.json")), VALID_LINEAR)?;
    }
    let sessions = tempfile::tempdir()?;

    let mut cfg = RoverConfig::default();
    cfg.hardware.bus = bus.to_string();
    cfg.hardware.pwm_chip = "stub://".to_string();
    cfg.hardware.rc_root = rcin.path().to_str().unwrap().to_string();
    cfg.models_dir = models.path().to_path_buf();
    cfg.record_dir = sessions.path().to_path_buf();
    cfg.remote_addr = "127.0.0.1:0".to_string();
    cfg.led_path = "stub://bench".to_string();
    cfg.camera.device = "stub://bench".to_string();
    cfg.camera.width = 32;
    cfg.camera.height = 24;
    cfg.camera.rotation = 0;
    cfg.camera.fps = 60;
    cfg.camera.warmup_ms = 100;
    Ok(Bench {
        cfg,
        _rcin: rcin,
        _models: models,
        _sessions: sessions,
    })
}

fn http_get(addr: std::net::SocketAddr, path: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr)?;
    write!(stream, "GET {path} HTTP/1.1\r\nHost: rover\r\n\r\n")?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

#[test]
fn composed_vehicle_drives_and_serves_remote_viewers() -> Result<()> {
    let bench = bench("stub://0x48,0x77", &["track"])?;
    let mut vehicle = Composer::new(bench.cfg.clone()).compose()?;

    // [rc, rc+model:track], default manual.
    assert_eq!(vehicle.pilot_count(), 2);
    assert_eq!(vehicle.active_pilot_name(), "rc");

    for _ in 0..5 {
        vehicle.step()?;
    }

    // The camera warmed up during composition, so frames are flowing.
    assert!(vehicle.camera().read().timestamp_s > 0.0);

    // Switch to the blended pilot and keep driving.
    vehicle.set_pilot(1)?;
    assert_eq!(vehicle.active_pilot_name(), "rc+model:track");
    vehicle.step()?;

    // Remote viewers see status and the latest frame.
    let status = http_get(vehicle.remote_addr(), "/status")?;
    assert!(status.contains(r#""active_pilot":"rc+model:track""#));
    assert!(status.contains(r#""drivetrain":"ackermann""#));

    let frame = http_get(vehicle.remote_addr(), "/camera")?;
    assert!(frame.starts_with("HTTP/1.1 200"));
    assert!(frame.contains("image/jpeg"));

    vehicle.shutdown()?;
    Ok(())
}

#[test]
fn session_log_grows_while_driving() -> Result<()> {
    let bench = bench("stub://0x60", &[])?;
    let mut vehicle = Composer::new(bench.cfg.clone()).compose()?;

    for _ in 0..3 {
        vehicle.step()?;
    }

    let sessions: Vec<_> = std::fs::read_dir(&bench.cfg.record_dir)?
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(sessions.len(), 1);
    let log = std::fs::read_to_string(sessions[0].path().join("drive.jsonl"))?;
    assert_eq!(log.lines().count(), 3);

    vehicle.shutdown()?;
    Ok(())
}

#[test]
fn unrecognized_bus_aborts_with_no_hardware_detected() -> Result<()> {
    let bench = bench("stub://0x29,0x1e", &[])?;
    let err = Composer::new(bench.cfg.clone()).compose().unwrap_err();
    assert!(err.downcast_ref::<NoHardwareDetected>().is_some());
    Ok(())
}
