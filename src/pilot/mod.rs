//! Pilots: everything that can produce a steering/throttle decision.
//!
//! Variants:
//! - manual: gamepad (feature `input-gamepad`), RC receiver
//! - autonomous: trained model behind a [`DrivePolicy`] backend
//! - blended: model steering with manual throttle
//!
//! [`assemble_pilots`] builds the ordered pilot list the vehicle runs with.
//! Manual pilots are optional equipment: a missing gamepad or RC receiver is
//! logged and skipped. Model files are configuration: a model that fails to
//! load aborts assembly so the operator fixes the deployment instead of
//! silently driving without it.

mod assembly;
mod blend;
mod gamepad;
mod model;
mod rc;

use anyhow::Result;

use crate::vision::Frame;
use crate::Decision;

pub use assembly::assemble_pilots;
pub use blend::BlendedPilot;
pub use gamepad::GamepadPilot;
pub use model::{list_models, DrivePolicy, LinearPolicy, ModelPilot};
pub use rc::RcPilot;

#[cfg(feature = "policy-tract")]
pub use model::TractPolicy;

/// A pilot: given the current frame, produce a steering/throttle decision.
///
/// `decide` takes `&mut self` because manual pilots drain device event
/// queues and model pilots run stateful inference. Pilots live on the drive
/// thread; blended pilots share their inner pilots through `Arc<Mutex<_>>`.
pub trait Pilot {
    fn name(&self) -> String;
    fn decide(&mut self, frame: &Frame) -> Result<Decision>;
}
