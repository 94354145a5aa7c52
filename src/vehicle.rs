//! The assembled vehicle.
//!
//! A [`Vehicle`] is the output of composition: the ordered pilot list with
//! one active pilot, one mixer, the running camera, the indicator, the
//! session recorder and the remote endpoint. The drive loop calls
//! [`Vehicle::step`] at a fixed cadence; everything else is bookkeeping.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};

use crate::drive::Mixer;
use crate::indicate::{Indicator, VehicleState};
use crate::pilot::Pilot;
use crate::record::FileRecorder;
use crate::remote::{RemoteHandle, RemoteStatus};
use crate::vision::Camera;
use crate::Decision;

impl std::fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vehicle")
            .field("pilot_count", &self.pilots.len())
            .field("active_pilot", &self.active_pilot)
            .finish_non_exhaustive()
    }
}

pub struct Vehicle {
    pub(crate) pilots: Vec<Arc<Mutex<dyn Pilot>>>,
    pub(crate) active_pilot: usize,
    pub(crate) mixer: Mixer,
    pub(crate) camera: Arc<Camera>,
    pub(crate) indicator: Box<dyn Indicator>,
    pub(crate) recorder: FileRecorder,
    pub(crate) remote: RemoteHandle,
    pub(crate) status: Arc<Mutex<RemoteStatus>>,
}

impl Vehicle {
    pub fn pilot_count(&self) -> usize {
        self.pilots.len()
    }

    pub fn active_pilot_name(&self) -> String {
        self.pilots[self.active_pilot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Bound address of the remote viewer endpoint.
    pub fn remote_addr(&self) -> std::net::SocketAddr {
        self.remote.addr
    }

    /// Switch the active pilot. The remote status mirror follows.
    pub fn set_pilot(&mut self, index: usize) -> Result<()> {
        if index >= self.pilots.len() {
            return Err(anyhow!(
                "pilot index {index} out of range (have {})",
                self.pilots.len()
            ));
        }
        self.active_pilot = index;
        let name = self.active_pilot_name();
        log::info!("vehicle: active pilot is {name}");
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active_pilot = name;
        Ok(())
    }

    /// One drive-loop iteration: latest frame, active pilot's decision,
    /// actuate, record.
    ///
    /// A pilot that fails to decide (a dropped gamepad, a stalled RC
    /// channel) degrades to neutral for this step; actuation and recording
    /// failures are real faults and propagate.
    pub fn step(&mut self) -> Result<()> {
        let frame = self.camera.read();
        let decision = {
            let mut pilot = self.pilots[self.active_pilot]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match pilot.decide(&frame) {
                Ok(decision) => decision,
                Err(err) => {
                    log::warn!("vehicle: pilot {} failed: {err}; holding neutral", pilot.name());
                    Decision::neutral()
                }
            }
        };
        self.mixer.update(decision)?;
        self.recorder.record(&frame, &decision)?;
        Ok(())
    }

    /// Show a state on the indicator; indicator trouble at runtime is
    /// logged, never fatal.
    pub fn indicate(&mut self, state: VehicleState) {
        if let Err(err) = self.indicator.show(state) {
            log::warn!("vehicle: indicator failed: {err}");
        }
    }

    /// Orderly shutdown: neutral actuation, stop the camera producer, stop
    /// the remote endpoint.
    pub fn shutdown(mut self) -> Result<()> {
        let neutral = self.mixer.update(Decision::neutral());
        self.indicate(VehicleState::Standby);
        self.camera.stop();
        self.remote.stop()?;
        neutral
    }
}
