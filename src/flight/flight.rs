use rand::Rng;

use super::plan::{FlightPlan, PlanAction};
use crate::aircraft::Aircraft;
use crate::error::{SimError, SimResult};
use crate::runway::RunwayId;

/// Flight lifecycle states.
///
/// Legal transitions:
///   Scheduled -> Active | Emergency | Canceled
///   Active    -> Emergency | Completed | Canceled | Diverted
///   Emergency -> Completed | Canceled | Diverted
/// Completed, Canceled and Diverted are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightStatus {
    Scheduled,
    Active,
    Emergency,
    Completed,
    Canceled,
    Diverted,
}

impl FlightStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlightStatus::Completed | FlightStatus::Canceled | FlightStatus::Diverted
        )
    }

    pub fn can_transition_to(&self, to: FlightStatus) -> bool {
        use FlightStatus::*;
        matches!(
            (self, to),
            (Scheduled, Active)
                | (Scheduled, Emergency)
                | (Scheduled, Canceled)
                | (Active, Emergency)
                | (Active, Completed)
                | (Active, Canceled)
                | (Active, Diverted)
                | (Emergency, Completed)
                | (Emergency, Canceled)
                | (Emergency, Diverted)
                | (Emergency, Active)
        )
    }
}

impl std::fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FlightStatus::Scheduled => "Scheduled",
            FlightStatus::Active => "Active",
            FlightStatus::Emergency => "Emergency",
            FlightStatus::Completed => "Completed",
            FlightStatus::Canceled => "Canceled",
            FlightStatus::Diverted => "Diverted",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one update tick, consumed by the controller to keep the
/// runway entities in sync without holding the flight lock.
#[derive(Debug, Default, Clone)]
pub struct FlightUpdate {
    pub released_runway: Option<RunwayId>,
    pub phase_advanced: bool,
    pub completed: bool,
    pub canceled: bool,
    /// Set when plan execution hit an unrecoverable inconsistency;
    /// the controller aborts the simulation on it.
    pub fatal: Option<String>,
}

/// A scheduled movement of one aircraft. The flight owns its airframe;
/// the runway is referenced by id and resolved through the controller.
#[derive(Debug, Clone)]
pub struct Flight {
    pub id: String,
    pub aircraft: Aircraft,
    pub scheduled_at: f64,
    pub activated_at: Option<f64>,
    pub estimated_completion: Option<f64>,
    pub is_emergency: bool,
    pub status: FlightStatus,
    pub runway: Option<RunwayId>,
    pub plan: FlightPlan,
    pub step_index: usize,
    pub status_reason: Option<String>,
}

impl Flight {
    pub fn new(aircraft: Aircraft, scheduled_at: f64, emergency: bool) -> Self {
        let plan = FlightPlan::build(aircraft.direction, emergency);
        Self {
            id: aircraft.id.clone(),
            aircraft,
            scheduled_at,
            activated_at: None,
            estimated_completion: None,
            is_emergency: emergency,
            status: FlightStatus::Scheduled,
            runway: None,
            plan,
            step_index: 0,
            status_reason: None,
        }
    }

    /// Scheduling priority: 3 emergency, 2 cargo, 1 commercial.
    pub fn priority_class(&self) -> u8 {
        if self.is_emergency {
            3
        } else {
            self.aircraft.kind.priority_class()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: FlightStatus) -> SimResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(SimError::precondition(format!(
                "flight {}: {} -> {} is not a legal transition",
                self.id, self.status, to
            )));
        }
        self.status = to;
        Ok(())
    }

    /// Begin executing the plan. Valid from Scheduled, or for a flight
    /// already escalated to Emergency before it got a runway.
    pub fn activate(&mut self, now: f64) -> SimResult<()> {
        match self.status {
            FlightStatus::Scheduled => {
                let to = if self.is_emergency {
                    FlightStatus::Emergency
                } else {
                    FlightStatus::Active
                };
                self.transition(to)?;
            }
            FlightStatus::Emergency if self.activated_at.is_none() => {}
            other => {
                return Err(SimError::precondition(format!(
                    "flight {} cannot activate from {}",
                    self.id, other
                )));
            }
        }
        self.activated_at = Some(now);
        self.estimated_completion = Some(now + self.plan.estimated_duration());
        Ok(())
    }

    /// Record the runway granted by the arbiter. A flight holds at
    /// most one runway.
    pub fn assign_runway(&mut self, runway: RunwayId) -> SimResult<()> {
        if let Some(current) = self.runway {
            return Err(SimError::precondition(format!(
                "flight {} already holds {}",
                self.id, current
            )));
        }
        self.runway = Some(runway);
        self.aircraft.assigned_runway = Some(runway);
        Ok(())
    }

    /// Drop the runway reference, returning the id so the caller can
    /// release the entity after this flight's lock is gone.
    pub fn release_runway(&mut self) -> Option<RunwayId> {
        self.aircraft.assigned_runway = None;
        self.runway.take()
    }

    pub fn complete(&mut self) -> SimResult<Option<RunwayId>> {
        self.transition(FlightStatus::Completed)?;
        Ok(self.release_runway())
    }

    pub fn cancel(&mut self, reason: &str) -> SimResult<Option<RunwayId>> {
        self.transition(FlightStatus::Canceled)?;
        self.status_reason = Some(reason.to_string());
        Ok(self.release_runway())
    }

    pub fn divert(&mut self, reason: &str) -> SimResult<Option<RunwayId>> {
        self.transition(FlightStatus::Diverted)?;
        self.status_reason = Some(reason.to_string());
        Ok(self.release_runway())
    }

    /// Escalate to or stand down from emergency handling. Escalation
    /// regenerates the plan with half offsets; reverting restores the
    /// regular timetable.
    pub fn set_emergency(&mut self, flag: bool) -> SimResult<()> {
        if flag == self.is_emergency {
            return Ok(());
        }
        if flag {
            if !matches!(self.status, FlightStatus::Scheduled | FlightStatus::Active) {
                return Err(SimError::precondition(format!(
                    "flight {} cannot escalate from {}",
                    self.id, self.status
                )));
            }
            self.transition(FlightStatus::Emergency)?;
            self.is_emergency = true;
            self.plan = FlightPlan::emergency(self.aircraft.direction);
        } else {
            self.transition(FlightStatus::Active)?;
            self.is_emergency = false;
            self.plan = FlightPlan::regular(self.aircraft.direction);
        }
        if let Some(activated_at) = self.activated_at {
            self.estimated_completion = Some(activated_at + self.plan.estimated_duration());
        }
        Ok(())
    }

    /// Per-tick update. No-op unless Active or Emergency: ticks the
    /// airframe, cancels on ground fault, and fires the next due plan
    /// step.
    pub fn update(&mut self, dt: f64, now: f64, rng: &mut impl Rng) -> FlightUpdate {
        let mut outcome = FlightUpdate::default();
        if !matches!(self.status, FlightStatus::Active | FlightStatus::Emergency) {
            return outcome;
        }

        self.aircraft.update(dt, rng);

        if let Err(fault) = self.aircraft.check_ground_fault() {
            tracing::warn!("[FLIGHT] {}", fault);
            if let Ok(released) = self.cancel("ground fault") {
                outcome.canceled = true;
                outcome.released_runway = released;
            }
            return outcome;
        }

        let Some(activated_at) = self.activated_at else {
            return outcome;
        };

        if let Some(step) = self.plan.step(self.step_index) {
            if now - activated_at >= step.offset_secs {
                match self.execute_next_plan_step(rng) {
                    Ok(step_outcome) => {
                        outcome.phase_advanced |= step_outcome.phase_advanced;
                        outcome.completed |= step_outcome.completed;
                        if step_outcome.released_runway.is_some() {
                            outcome.released_runway = step_outcome.released_runway;
                        }
                    }
                    Err(SimError::Fatal(detail)) => {
                        outcome.fatal = Some(detail);
                    }
                    Err(err) => {
                        tracing::warn!("[FLIGHT] {} plan step failed: {}", self.id, err);
                    }
                }
            }
        }

        outcome
    }

    /// Run the current plan step and advance the step index.
    pub fn execute_next_plan_step(&mut self, rng: &mut impl Rng) -> SimResult<FlightUpdate> {
        let mut outcome = FlightUpdate::default();
        let step = *self.plan.step(self.step_index).ok_or_else(|| {
            SimError::precondition(format!("flight {} has no plan steps left", self.id))
        })?;

        match step.action {
            PlanAction::Advance { release_runway } => {
                if release_runway {
                    outcome.released_runway = self.release_runway();
                }
                // A plan step past a terminal phase means the plan and
                // the phase chain disagree; nothing can recover that.
                self.aircraft.advance_phase(rng).map_err(|err| {
                    SimError::Fatal(format!("flight {} plan desync: {}", self.id, err))
                })?;
                outcome.phase_advanced = true;
            }
            PlanAction::Complete => {
                outcome.released_runway = self.complete()?;
                outcome.completed = true;
            }
        }

        self.step_index += 1;
        Ok(outcome)
    }
}
