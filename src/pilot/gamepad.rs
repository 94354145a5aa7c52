use anyhow::Result;

use crate::pilot::Pilot;
use crate::vision::Frame;
use crate::Decision;

/// Manual pilot reading a connected gamepad.
///
/// Left stick X steers, right stick Y throttles. Construction fails when the
/// build has no gamepad support or no pad is connected; assembly treats that
/// as "equipment absent", not an error.
#[cfg(feature = "input-gamepad")]
pub struct GamepadPilot {
    gilrs: gilrs::Gilrs,
    active: Option<gilrs::GamepadId>,
}

#[cfg(feature = "input-gamepad")]
impl GamepadPilot {
    pub fn new() -> Result<Self> {
        let gilrs = gilrs::Gilrs::new()
            .map_err(|e| anyhow::anyhow!("gamepad subsystem unavailable: {e}"))?;
        let active = gilrs.gamepads().next().map(|(id, pad)| {
            log::info!("pilot: gamepad '{}' connected", pad.name());
            id
        });
        if active.is_none() {
            anyhow::bail!("no gamepad connected");
        }
        Ok(Self { gilrs, active })
    }

    fn drain_events(&mut self) {
        while let Some(gilrs::Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                gilrs::EventType::Connected => {
                    if self.active.is_none() {
                        self.active = Some(id);
                    }
                }
                gilrs::EventType::Disconnected => {
                    if self.active == Some(id) {
                        self.active = None;
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(feature = "input-gamepad")]
impl Pilot for GamepadPilot {
    fn name(&self) -> String {
        "gamepad".to_string()
    }

    fn decide(&mut self, _frame: &Frame) -> Result<Decision> {
        self.drain_events();
        let id = self
            .active
            .ok_or_else(|| anyhow::anyhow!("gamepad disconnected"))?;
        let pad = self.gilrs.gamepad(id);
        let steering = pad.value(gilrs::Axis::LeftStickX);
        let throttle = pad.value(gilrs::Axis::RightStickY);
        Ok(Decision::new(steering, throttle))
    }
}

/// Placeholder for builds without gamepad support; construction always
/// fails, which assembly logs and skips.
#[cfg(not(feature = "input-gamepad"))]
pub struct GamepadPilot;

#[cfg(not(feature = "input-gamepad"))]
impl GamepadPilot {
    pub fn new() -> Result<Self> {
        anyhow::bail!("built without the input-gamepad feature")
    }
}

#[cfg(not(feature = "input-gamepad"))]
impl Pilot for GamepadPilot {
    fn name(&self) -> String {
        "gamepad".to_string()
    }

    fn decide(&mut self, _frame: &Frame) -> Result<Decision> {
        anyhow::bail!("built without the input-gamepad feature")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "input-gamepad"))]
    #[test]
    fn construction_fails_without_gamepad_support() {
        assert!(GamepadPilot::new().is_err());
    }
}
