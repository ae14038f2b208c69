use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::phase::{AircraftKind, Direction, Phase};
use crate::error::{SimError, SimResult};
use crate::runway::RunwayId;

/// Probability per ground-phase check that a simulated fault fires.
const GROUND_FAULT_PROBABILITY: f64 = 0.05;
/// Per-second fault rate applied during continuous updates on the ground.
const GROUND_FAULT_RATE: f64 = 0.001;
/// Standard deviation of the per-update speed jitter in km/h.
const SPEED_JITTER_SD: f64 = 2.0;

/// A single airframe. Owned by its Flight for the flight's lifetime;
/// the airline is referenced by name only.
#[derive(Debug, Clone)]
pub struct Aircraft {
    pub id: String,
    pub airline: String,
    pub kind: AircraftKind,
    pub direction: Direction,
    pub phase: Phase,
    pub speed: f64,
    pub assigned_runway: Option<RunwayId>,
    pub ground_fault: bool,
    pub avns: Vec<String>,
}

impl Aircraft {
    pub fn new(
        id: String,
        airline: String,
        kind: AircraftKind,
        direction: Direction,
        rng: &mut impl Rng,
    ) -> Self {
        let phase = Phase::initial(direction);
        let (min, max) = phase.speed_bounds();
        Self {
            id,
            airline,
            kind,
            direction,
            phase,
            speed: rng.gen_range(min..=max),
            assigned_runway: None,
            ground_fault: false,
            avns: Vec::new(),
        }
    }

    /// Move to the statically-defined next phase and sample a fresh
    /// speed from the new phase's band. Fails on terminal phases.
    pub fn advance_phase(&mut self, rng: &mut impl Rng) -> SimResult<Phase> {
        let next = self.phase.next().ok_or_else(|| {
            SimError::precondition(format!(
                "aircraft {} has no phase after {}",
                self.id, self.phase
            ))
        })?;
        self.phase = next;
        let (min, max) = next.speed_bounds();
        self.speed = rng.gen_range(min..=max);
        Ok(next)
    }

    /// Overwrite the current speed without validation. The monitor and
    /// plan-injected violations both go through here.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.max(0.0);
    }

    pub fn issue_avn(&mut self, reason: String) {
        self.avns.push(reason);
    }

    /// Roll for a ground fault. Only effective while taxiing or at a
    /// gate; returns whether the fault flag is now set.
    pub fn simulate_ground_fault(&mut self, rng: &mut impl Rng) -> bool {
        if !self.phase.is_ground() {
            return false;
        }
        if !self.ground_fault && rng.gen_bool(GROUND_FAULT_PROBABILITY) {
            self.ground_fault = true;
        }
        self.ground_fault
    }

    /// Continuous per-tick update: small Gaussian speed jitter, plus a
    /// rate-based fault roll while on the ground.
    pub fn update(&mut self, dt: f64, rng: &mut impl Rng) {
        let jitter = Normal::new(0.0, SPEED_JITTER_SD)
            .map(|n| n.sample(rng))
            .unwrap_or(0.0);
        self.speed = (self.speed + jitter).max(0.0);

        if self.phase.is_ground() && !self.ground_fault {
            let p = (GROUND_FAULT_RATE * dt).clamp(0.0, 1.0);
            if rng.gen_bool(p) {
                self.ground_fault = true;
            }
        }
    }

    /// Whether the current speed sits inside the phase's permitted band.
    pub fn speed_in_bounds(&self) -> bool {
        self.check_speed_compliance().is_ok()
    }

    /// Err(Compliance) when the current speed is outside the phase
    /// band. The monitor turns this into an AVN.
    pub fn check_speed_compliance(&self) -> SimResult<()> {
        let (min, max) = self.phase.speed_bounds();
        if self.speed < min || self.speed > max {
            return Err(SimError::Compliance(format!(
                "{} at {:.0} km/h outside [{:.0}, {:.0}] in {}",
                self.id, self.speed, min, max, self.phase
            )));
        }
        Ok(())
    }

    /// Err(ExternalFault) once the ground-fault flag is set. The
    /// owning flight cancels on this.
    pub fn check_ground_fault(&self) -> SimResult<()> {
        if self.ground_fault {
            Err(SimError::ExternalFault(self.id.clone()))
        } else {
            Ok(())
        }
    }
}
