use anyhow::Result;

use crate::drive::ActuationDriver;
use crate::Decision;

/// The closed set of drivetrain geometries.
///
/// A variant per geometry keeps selection exhaustive: adding a drivetrain
/// forces every match in the kernel to handle it.
pub enum Mixer {
    Ackermann(AckermannMixer),
    Differential(DifferentialMixer),
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("drivetrain", &self.drivetrain())
            .finish_non_exhaustive()
    }
}

impl Mixer {
    /// Translate a decision into actuation on every channel of this
    /// drivetrain.
    pub fn update(&mut self, decision: Decision) -> Result<()> {
        match self {
            Mixer::Ackermann(mixer) => mixer.update(decision),
            Mixer::Differential(mixer) => mixer.update(decision),
        }
    }

    pub fn drivetrain(&self) -> &'static str {
        match self {
            Mixer::Ackermann(_) => "ackermann",
            Mixer::Differential(_) => "differential",
        }
    }
}

/// Shared front-axle steering geometry: steering and throttle actuate
/// independent channels.
pub struct AckermannMixer {
    steering: Box<dyn ActuationDriver>,
    throttle: Box<dyn ActuationDriver>,
}

impl AckermannMixer {
    pub fn new(steering: Box<dyn ActuationDriver>, throttle: Box<dyn ActuationDriver>) -> Self {
        Self { steering, throttle }
    }

    fn update(&mut self, decision: Decision) -> Result<()> {
        self.steering.set(decision.steering)?;
        self.throttle.set(decision.throttle)?;
        Ok(())
    }
}

/// Skid-steer geometry: no steering actuator, steering is a speed
/// difference between the left and right terminals.
pub struct DifferentialMixer {
    left: Box<dyn ActuationDriver>,
    right: Box<dyn ActuationDriver>,
}

impl DifferentialMixer {
    pub fn new(left: Box<dyn ActuationDriver>, right: Box<dyn ActuationDriver>) -> Self {
        Self { left, right }
    }

    fn update(&mut self, decision: Decision) -> Result<()> {
        let (left, right) = arcade_mix(decision);
        self.left.set(left)?;
        self.right.set(right)?;
        Ok(())
    }
}

/// Arcade mix: sum/difference of throttle and steering, renormalized so
/// neither wheel exceeds full scale while the ratio between them holds.
fn arcade_mix(decision: Decision) -> (f32, f32) {
    let left = decision.throttle + decision.steering;
    let right = decision.throttle - decision.steering;
    let magnitude = left.abs().max(right.abs());
    if magnitude > 1.0 {
        (left / magnitude, right / magnitude)
    } else {
        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct RecordingDriver {
        label: &'static str,
        last: Rc<Cell<f32>>,
    }

    impl RecordingDriver {
        fn new(label: &'static str) -> (Box<dyn ActuationDriver>, Rc<Cell<f32>>) {
            let last = Rc::new(Cell::new(0.0));
            (
                Box::new(Self {
                    label,
                    last: last.clone(),
                }),
                last,
            )
        }
    }

    impl ActuationDriver for RecordingDriver {
        fn name(&self) -> String {
            self.label.to_string()
        }

        fn set(&mut self, value: f32) -> Result<()> {
            self.last.set(value);
            Ok(())
        }
    }

    #[test]
    fn ackermann_forwards_channels_independently() -> Result<()> {
        let (steering, steering_out) = RecordingDriver::new("steering");
        let (throttle, throttle_out) = RecordingDriver::new("throttle");
        let mut mixer = Mixer::Ackermann(AckermannMixer::new(steering, throttle));

        mixer.update(Decision::new(-0.4, 0.9))?;
        assert_eq!(steering_out.get(), -0.4);
        assert_eq!(throttle_out.get(), 0.9);
        assert_eq!(mixer.drivetrain(), "ackermann");
        Ok(())
    }

    #[test]
    fn differential_splits_steering_across_wheels() -> Result<()> {
        let (left, left_out) = RecordingDriver::new("left");
        let (right, right_out) = RecordingDriver::new("right");
        let mut mixer = Mixer::Differential(DifferentialMixer::new(left, right));

        // Gentle right turn at half throttle: left wheel leads.
        mixer.update(Decision::new(0.25, 0.5))?;
        assert_eq!(left_out.get(), 0.75);
        assert_eq!(right_out.get(), 0.25);
        assert_eq!(mixer.drivetrain(), "differential");
        Ok(())
    }

    #[test]
    fn arcade_mix_renormalizes_saturated_output() {
        // Full throttle, full right: would be (2.0, 0.0) unscaled.
        let (left, right) = arcade_mix(Decision::new(1.0, 1.0));
        assert_eq!(left, 1.0);
        assert_eq!(right, 0.0);

        // Spin in place stays at full scale.
        let (left, right) = arcade_mix(Decision::new(1.0, 0.0));
        assert_eq!(left, 1.0);
        assert_eq!(right, -1.0);
    }

    #[test]
    fn neutral_decision_stops_both_wheels() {
        let (left, right) = arcade_mix(Decision::neutral());
        assert_eq!(left, 0.0);
        assert_eq!(right, 0.0);
    }
}
