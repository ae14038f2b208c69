use crate::aircraft::Direction;

/// Arrival plans walk Holding -> AtGateArrival, departure plans walk
/// AtGateDeparture -> Cruise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Arrival,
    Departure,
}

/// What a plan step does when its time comes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    /// Advance the aircraft one phase; optionally hand the runway back
    /// first (the landing/climb boundary step).
    Advance { release_runway: bool },
    /// Final step: the flight is done.
    Complete,
}

/// One timed step, offset relative to flight activation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightPlanStep {
    pub offset_secs: f64,
    pub action: PlanAction,
}

/// Ordered timetable of phase transitions for one flight. Emergency
/// plans use the same steps at exactly half the offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightPlan {
    pub kind: PlanKind,
    pub emergency: bool,
    pub steps: Vec<FlightPlanStep>,
}

/// Regular arrival step offsets; the t=90 step frees the runway as the
/// aircraft turns off onto the taxiway.
const ARRIVAL_OFFSETS: [f64; 5] = [30.0, 60.0, 90.0, 120.0, 150.0];
/// Regular departure step offsets; the t=75 step frees the runway as
/// the aircraft establishes its climb.
const DEPARTURE_OFFSETS: [f64; 5] = [30.0, 60.0, 75.0, 90.0, 120.0];

const ARRIVAL_RELEASE_STEP: usize = 2;
const DEPARTURE_RELEASE_STEP: usize = 2;

impl FlightPlan {
    pub fn regular(direction: Direction) -> Self {
        Self::build(direction, false)
    }

    pub fn emergency(direction: Direction) -> Self {
        Self::build(direction, true)
    }

    pub fn build(direction: Direction, emergency: bool) -> Self {
        let (kind, offsets, release_step) = if direction.is_arrival() {
            (PlanKind::Arrival, ARRIVAL_OFFSETS, ARRIVAL_RELEASE_STEP)
        } else {
            (PlanKind::Departure, DEPARTURE_OFFSETS, DEPARTURE_RELEASE_STEP)
        };

        let scale = if emergency { 0.5 } else { 1.0 };
        let last = offsets.len() - 1;
        let steps = offsets
            .iter()
            .enumerate()
            .map(|(i, offset)| FlightPlanStep {
                offset_secs: offset * scale,
                action: if i == last {
                    PlanAction::Complete
                } else {
                    PlanAction::Advance {
                        release_runway: i == release_step,
                    }
                },
            })
            .collect();

        Self {
            kind,
            emergency,
            steps,
        }
    }

    /// Total plan duration from activation to the completing step.
    pub fn estimated_duration(&self) -> f64 {
        self.steps.last().map(|s| s.offset_secs).unwrap_or(0.0)
    }

    pub fn step(&self, index: usize) -> Option<&FlightPlanStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
