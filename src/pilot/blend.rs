use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::pilot::{ModelPilot, Pilot};
use crate::vision::Frame;
use crate::Decision;

/// Blended pilot: the model steers, the human throttles.
///
/// The inner pilots are shared - the same physical gamepad backs both the
/// standalone manual pilot and every blend that uses it - so they are held
/// through `Arc<Mutex<_>>` rather than owned.
pub struct BlendedPilot {
    name: String,
    model: Arc<Mutex<ModelPilot>>,
    manual: Arc<Mutex<dyn Pilot>>,
}

impl BlendedPilot {
    pub fn new(model: Arc<Mutex<ModelPilot>>, manual: Arc<Mutex<dyn Pilot>>) -> Result<Self> {
        let model_name = model
            .lock()
            .map_err(|_| anyhow!("model pilot lock poisoned"))?
            .name();
        let manual_name = manual
            .lock()
            .map_err(|_| anyhow!("manual pilot lock poisoned"))?
            .name();
        Ok(Self {
            name: format!("{manual_name}+{model_name}"),
            model,
            manual,
        })
    }
}

impl Pilot for BlendedPilot {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn decide(&mut self, frame: &Frame) -> Result<Decision> {
        let steering = self
            .model
            .lock()
            .map_err(|_| anyhow!("model pilot lock poisoned"))?
            .decide(frame)?
            .steering;
        let throttle = self
            .manual
            .lock()
            .map_err(|_| anyhow!("manual pilot lock poisoned"))?
            .decide(frame)?
            .throttle;
        Ok(Decision::new(steering, throttle))
    }
}
