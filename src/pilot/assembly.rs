use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::config::RoverConfig;
use crate::pilot::{list_models, BlendedPilot, GamepadPilot, ModelPilot, Pilot, RcPilot};

/// Build the ordered pilot list and the default active index.
///
/// Each step is independently fault tolerant for optional equipment:
/// 1. gamepad - construction failure is logged and skipped
/// 2. RC receiver - same policy
/// 3. every discovered model is loaded (failure propagates) and blended
///    with whichever manual pilots exist
///
/// Final order: [gamepad?, rc?, blended-gamepad x N, blended-rc x N] with
/// models in discovery order; the default active pilot is index 0. With no
/// manual inputs and no models the list is empty - the composer decides
/// whether that is fatal (it is).
pub fn assemble_pilots(cfg: &RoverConfig) -> Result<(Vec<Arc<Mutex<dyn Pilot>>>, usize)> {
    let mut pilots: Vec<Arc<Mutex<dyn Pilot>>> = Vec::new();

    let gamepad: Option<Arc<Mutex<dyn Pilot>>> = match GamepadPilot::new() {
        Ok(pilot) => {
            log::info!("pilot: gamepad ready");
            let pilot: Arc<Mutex<dyn Pilot>> = Arc::new(Mutex::new(pilot));
            pilots.push(pilot.clone());
            Some(pilot)
        }
        Err(err) => {
            log::info!("pilot: gamepad unavailable: {err}");
            None
        }
    };

    let rc: Option<Arc<Mutex<dyn Pilot>>> = match RcPilot::new(&cfg.hardware.rc_root) {
        Ok(pilot) => {
            log::info!("pilot: rc receiver ready");
            let pilot: Arc<Mutex<dyn Pilot>> = Arc::new(Mutex::new(pilot));
            pilots.push(pilot.clone());
            Some(pilot)
        }
        Err(err) => {
            log::info!("pilot: rc receiver unavailable: {err}");
            None
        }
    };

    let (width, height) = cfg.camera.effective_resolution();
    let mut blended_gamepad: Vec<Arc<Mutex<dyn Pilot>>> = Vec::new();
    let mut blended_rc: Vec<Arc<Mutex<dyn Pilot>>> = Vec::new();
    for (path, name) in list_models(&cfg.models_dir) {
        // Model load failures are configuration errors and abort assembly.
        let model = Arc::new(Mutex::new(ModelPilot::load(&path, &name, width, height)?));
        log::info!("pilot: loaded model {name} from {}", path.display());
        if let Some(gamepad) = &gamepad {
            blended_gamepad.push(Arc::new(Mutex::new(BlendedPilot::new(
                model.clone(),
                gamepad.clone(),
            )?)));
        }
        if let Some(rc) = &rc {
            blended_rc.push(Arc::new(Mutex::new(BlendedPilot::new(
                model.clone(),
                rc.clone(),
            )?)));
        }
    }
    pilots.extend(blended_gamepad);
    pilots.extend(blended_rc);

    Ok((pilots, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_LINEAR: &str =
        r#"{ "kind": "linear", "steering_gain": 1.0, "throttle": 0.3 }"#;

    fn bench_config() -> RoverConfig {
        let mut cfg = RoverConfig::default();
        cfg.hardware.rc_root = "/nonexistent/rcin".to_string();
        cfg.models_dir = "/nonexistent/models".into();
        cfg
    }

    fn pilot_names(pilots: &[Arc<Mutex<dyn Pilot>>]) -> Vec<String> {
        pilots
            .iter()
            .map(|p| p.lock().unwrap().name())
            .collect()
    }

    // These tests run without a gamepad (no input-gamepad feature in CI, no
    // pad attached either way), so the manual slot is exercised via RC.

    #[test]
    fn no_inputs_and_no_models_yields_an_empty_list() -> Result<()> {
        let cfg = bench_config();
        let (pilots, default_index) = assemble_pilots(&cfg)?;
        assert!(pilots.is_empty());
        assert_eq!(default_index, 0);
        Ok(())
    }

    #[test]
    fn models_without_manual_inputs_yield_no_blends() -> Result<()> {
        let models = tempfile::tempdir()?;
        std::fs::write(models.path().join("track.json"), VALID_LINEAR)?;
        let mut cfg = bench_config();
        cfg.models_dir = models.path().to_path_buf();

        let (pilots, _) = assemble_pilots(&cfg)?;
        assert!(pilots.is_empty(), "blends require a manual pilot to pair with");
        Ok(())
    }

    #[test]
    fn rc_plus_models_yields_rc_first_then_blends_in_order() -> Result<()> {
        let rcin = tempfile::tempdir()?;
        std::fs::write(rcin.path().join("ch0"), "1500")?;
        std::fs::write(rcin.path().join("ch2"), "1500")?;
        let models = tempfile::tempdir()?;
        std::fs::write(models.path().join("beta.json"), VALID_LINEAR)?;
        std::fs::write(models.path().join("alpha.json"), VALID_LINEAR)?;

        let mut cfg = bench_config();
        cfg.hardware.rc_root = rcin.path().to_str().unwrap().to_string();
        cfg.models_dir = models.path().to_path_buf();

        let (pilots, default_index) = assemble_pilots(&cfg)?;
        assert_eq!(default_index, 0);
        assert_eq!(
            pilot_names(&pilots),
            vec!["rc", "rc+model:alpha", "rc+model:beta"]
        );
        Ok(())
    }

    #[test]
    fn broken_model_aborts_assembly() -> Result<()> {
        let rcin = tempfile::tempdir()?;
        std::fs::write(rcin.path().join("ch0"), "1500")?;
        std::fs::write(rcin.path().join("ch2"), "1500")?;
        let models = tempfile::tempdir()?;
        std::fs::write(models.path().join("broken.json"), "{ not json")?;

        let mut cfg = bench_config();
        cfg.hardware.rc_root = rcin.path().to_str().unwrap().to_string();
        cfg.models_dir = models.path().to_path_buf();

        assert!(assemble_pilots(&cfg).is_err());
        Ok(())
    }
}
