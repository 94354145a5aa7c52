use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::pilot::Pilot;
use crate::vision::Frame;
use crate::Decision;

/// Prediction backend behind a model pilot.
///
/// Backends receive the published frame and return a decision; how they get
/// there (a linear brightness-centroid fit, an ONNX network) is their
/// business. Backends run stateful inference, hence `&mut self`.
pub trait DrivePolicy {
    fn kind(&self) -> &'static str;
    fn predict(&mut self, frame: &Frame) -> Result<Decision>;
}

/// Autonomous pilot: a named, loaded drive policy.
pub struct ModelPilot {
    name: String,
    policy: Box<dyn DrivePolicy>,
}

impl ModelPilot {
    /// Load a model file. The backend is picked by extension: `.json` is a
    /// linear policy, `.onnx` an ONNX network (feature `policy-tract`).
    ///
    /// Load failures propagate: an unloadable model is a broken deployment
    /// the operator must fix, not something to skip quietly.
    pub fn load(path: &Path, name: &str, width: u32, height: u32) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let policy: Box<dyn DrivePolicy> = match extension {
            "json" => Box::new(LinearPolicy::load(path)?),
            #[cfg(feature = "policy-tract")]
            "onnx" => Box::new(TractPolicy::load(path, width, height)?),
            #[cfg(not(feature = "policy-tract"))]
            "onnx" => {
                return Err(anyhow!(
                    "model {} requires the policy-tract feature",
                    path.display()
                ))
            }
            other => {
                return Err(anyhow!(
                    "unsupported model format '{other}' for {}",
                    path.display()
                ))
            }
        };
        // Width/height bind the ONNX input shape; the linear policy adapts
        // to whatever frame it is given.
        let _ = (width, height);
        Ok(Self {
            name: name.to_string(),
            policy,
        })
    }

    pub fn policy_kind(&self) -> &'static str {
        self.policy.kind()
    }
}

impl Pilot for ModelPilot {
    fn name(&self) -> String {
        format!("model:{}", self.name)
    }

    fn decide(&mut self, frame: &Frame) -> Result<Decision> {
        self.policy.predict(frame)
    }
}

// ----------------------------------------------------------------------------
// Model discovery
// ----------------------------------------------------------------------------

/// A conforming model name is the file stem: lowercase alphanumeric with
/// interior `_`/`-`, so names are safe in log lines and remote status.
fn valid_model_name(name: &str) -> bool {
    static MODEL_NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = MODEL_NAME_RE
        .get_or_init(|| regex::Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").unwrap());
    re.is_match(name)
}

/// Enumerate trained models as (path, name) pairs, sorted by name.
///
/// Infallible by contract: a missing or unreadable directory means "no
/// models", logged and collapsed to an empty listing. Files with unknown
/// extensions or non-conforming names are skipped with a warning.
pub fn list_models(dir: &Path) -> Vec<(PathBuf, String)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::info!("pilot: no models directory at {} ({err})", dir.display());
            return Vec::new();
        }
    };

    let mut models = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !matches!(extension, "json" | "onnx") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !valid_model_name(name) {
            log::warn!(
                "pilot: skipping model with non-conforming name: {}",
                path.display()
            );
            continue;
        }
        models.push((path.clone(), name.to_string()));
    }
    models.sort_by(|a, b| a.1.cmp(&b.1));
    models
}

// ----------------------------------------------------------------------------
// Linear policy (always available)
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LinearPolicyFile {
    kind: String,
    steering_gain: f32,
    #[serde(default)]
    steering_bias: f32,
    throttle: f32,
}

/// Brightness-centroid line follower: steer toward the horizontal centroid
/// of image brightness at a fixed throttle. The classic bench policy - small
/// enough to write by hand, real enough to drive a track.
pub struct LinearPolicy {
    gain: f32,
    bias: f32,
    throttle: f32,
}

impl LinearPolicy {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read model file {}", path.display()))?;
        let file: LinearPolicyFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse model file {}", path.display()))?;
        if file.kind != "linear" {
            return Err(anyhow!(
                "model {} has unsupported kind '{}'",
                path.display(),
                file.kind
            ));
        }
        if !(-1.0..=1.0).contains(&file.throttle) {
            return Err(anyhow!(
                "model {} throttle {} out of -1.0..=1.0",
                path.display(),
                file.throttle
            ));
        }
        Ok(Self {
            gain: file.steering_gain,
            bias: file.steering_bias,
            throttle: file.throttle,
        })
    }
}

impl DrivePolicy for LinearPolicy {
    fn kind(&self) -> &'static str {
        "linear"
    }

    fn predict(&mut self, frame: &Frame) -> Result<Decision> {
        let width = frame.width.max(1) as usize;
        let mut total = 0f64;
        let mut weighted = 0f64;
        for (i, chunk) in frame.pixels.chunks_exact(3).enumerate() {
            let x = (i % width) as f64;
            let lum = chunk[0] as f64 + chunk[1] as f64 + chunk[2] as f64;
            total += lum;
            weighted += lum * x;
        }
        if total == 0.0 {
            // All-dark frame (or the placeholder): hold the line.
            return Ok(Decision::new(self.bias, self.throttle));
        }
        let centroid = weighted / total / (width.max(2) - 1) as f64;
        let steering = self.gain * (2.0 * centroid as f32 - 1.0) + self.bias;
        Ok(Decision::new(steering, self.throttle))
    }
}

// ----------------------------------------------------------------------------
// ONNX policy via tract
// ----------------------------------------------------------------------------

#[cfg(feature = "policy-tract")]
pub use tract_policy::TractPolicy;

#[cfg(feature = "policy-tract")]
mod tract_policy {
    use super::*;
    use tract_onnx::prelude::*;

    /// ONNX drive policy. The network takes one normalized CHW RGB frame
    /// and yields at least two outputs: steering, throttle.
    pub struct TractPolicy {
        model: TypedRunnableModel<TypedModel>,
        width: u32,
        height: u32,
    }

    impl TractPolicy {
        pub fn load(path: &Path, width: u32, height: u32) -> Result<Self> {
            let model = tract_onnx::onnx()
                .model_for_path(path)
                .with_context(|| format!("load ONNX model from {}", path.display()))?
                .with_input_fact(
                    0,
                    InferenceFact::dt_shape(
                        f32::datum_type(),
                        tvec!(1, 3, height as usize, width as usize),
                    ),
                )
                .context("set ONNX input fact")?
                .into_optimized()
                .context("optimize ONNX model")?
                .into_runnable()
                .context("build runnable ONNX model")?;
            Ok(Self {
                model,
                width,
                height,
            })
        }

        fn build_input(&self, frame: &Frame) -> Result<Tensor> {
            if frame.width != self.width || frame.height != self.height {
                return Err(anyhow!(
                    "frame size {}x{} does not match model input {}x{}",
                    frame.width,
                    frame.height,
                    self.width,
                    self.height
                ));
            }
            let width = self.width as usize;
            let input = tract_ndarray::Array4::from_shape_fn(
                (1, 3, self.height as usize, width),
                |(_, channel, y, x)| {
                    let idx = (y * width + x) * 3 + channel;
                    frame.pixels[idx] as f32 / 255.0
                },
            );
            Ok(input.into_tensor())
        }
    }

    impl DrivePolicy for TractPolicy {
        fn kind(&self) -> &'static str {
            "tract"
        }

        fn predict(&mut self, frame: &Frame) -> Result<Decision> {
            let input = self.build_input(frame)?;
            let outputs = self.model.run(tvec!(input)).context("ONNX inference")?;
            let output = outputs
                .first()
                .ok_or_else(|| anyhow!("model produced no outputs"))?;
            let values = output
                .to_array_view::<f32>()
                .context("model output tensor was not f32")?;
            let mut values = values.iter();
            let steering = *values.next().ok_or_else(|| anyhow!("model output empty"))?;
            let throttle = *values
                .next()
                .ok_or_else(|| anyhow!("model output has no throttle component"))?;
            Ok(Decision::new(steering, throttle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_model(dir: &Path, name: &str, json: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, json).expect("write model fixture");
        path
    }

    const VALID_LINEAR: &str =
        r#"{ "kind": "linear", "steering_gain": 1.0, "throttle": 0.3 }"#;

    #[test]
    fn linear_model_loads_and_steers_toward_brightness() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_model(dir.path(), "track.json", VALID_LINEAR);
        let mut pilot = ModelPilot::load(&path, "track", 8, 4)?;
        assert_eq!(pilot.name(), "model:track");
        assert_eq!(pilot.policy_kind(), "linear");

        // Light on the right edge: steer right.
        let mut frame = Frame::placeholder(8, 4);
        for y in 0..4usize {
            let idx = (y * 8 + 7) * 3;
            frame.pixels[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
        }
        let decision = pilot.decide(&frame)?;
        assert!(decision.steering > 0.9);
        assert_eq!(decision.throttle, 0.3);

        // Light on the left edge: steer left.
        let mut frame = Frame::placeholder(8, 4);
        for y in 0..4usize {
            let idx = (y * 8) * 3;
            frame.pixels[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
        }
        let decision = pilot.decide(&frame)?;
        assert!(decision.steering < -0.9);
        Ok(())
    }

    #[test]
    fn placeholder_frame_holds_the_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_model(dir.path(), "track.json", VALID_LINEAR);
        let mut pilot = ModelPilot::load(&path, "track", 8, 4)?;
        let decision = pilot.decide(&Frame::placeholder(8, 4))?;
        assert_eq!(decision.steering, 0.0);
        Ok(())
    }

    #[test]
    fn corrupt_model_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(dir.path(), "broken.json", "{ not json");
        assert!(ModelPilot::load(&path, "broken", 8, 4).is_err());
    }

    #[test]
    fn wrong_kind_and_bad_throttle_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let wrong = write_model(
            dir.path(),
            "wrong.json",
            r#"{ "kind": "quadratic", "steering_gain": 1.0, "throttle": 0.3 }"#,
        );
        assert!(ModelPilot::load(&wrong, "wrong", 8, 4).is_err());

        let hot = write_model(
            dir.path(),
            "hot.json",
            r#"{ "kind": "linear", "steering_gain": 1.0, "throttle": 2.0 }"#,
        );
        assert!(ModelPilot::load(&hot, "hot", 8, 4).is_err());
    }

    #[cfg(not(feature = "policy-tract"))]
    #[test]
    fn onnx_model_requires_tract_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(dir.path(), "net.onnx", "");
        assert!(ModelPilot::load(&path, "net", 8, 4).is_err());
    }

    #[test]
    fn list_models_sorts_and_filters() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_model(dir.path(), "zulu.json", VALID_LINEAR);
        write_model(dir.path(), "alpha.json", VALID_LINEAR);
        write_model(dir.path(), "Bad Name.json", VALID_LINEAR);
        write_model(dir.path(), "notes.txt", "ignored");

        let models = list_models(dir.path());
        let names: Vec<&str> = models.iter().map(|(_, name)| name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zulu"]);
        Ok(())
    }

    #[test]
    fn missing_models_dir_is_empty_not_an_error() {
        assert!(list_models(Path::new("/nonexistent/models")).is_empty());
    }
}
