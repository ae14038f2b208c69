use serde::{Deserialize, Serialize};

use crate::aircraft::{AircraftKind, Direction};
use crate::error::{SimError, SimResult};

/// The three physical runways. A is aligned North-South (arrivals), B
/// East-West (departures), C serves any direction but only Cargo and
/// Emergency traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunwayId {
    A,
    B,
    C,
}

impl RunwayId {
    pub const ALL: [RunwayId; 3] = [RunwayId::A, RunwayId::B, RunwayId::C];

    pub fn permits_direction(&self, direction: Direction) -> bool {
        match self {
            RunwayId::A => direction.is_arrival(),
            RunwayId::B => !direction.is_arrival(),
            RunwayId::C => true,
        }
    }

    pub fn permits_kind(&self, kind: AircraftKind) -> bool {
        match self {
            RunwayId::A | RunwayId::B => true,
            RunwayId::C => matches!(kind, AircraftKind::Cargo | AircraftKind::Emergency),
        }
    }

    /// The runway a flight heads for when nothing special applies:
    /// arrivals use A, departures use B.
    pub fn preferred_for(direction: Direction) -> RunwayId {
        if direction.is_arrival() {
            RunwayId::A
        } else {
            RunwayId::B
        }
    }
}

impl std::fmt::Display for RunwayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunwayId::A => "RWY-A",
            RunwayId::B => "RWY-B",
            RunwayId::C => "RWY-C",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunwayStatus {
    Available,
    InUse,
    Maintenance,
    WeatherClosed,
}

impl std::fmt::Display for RunwayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunwayStatus::Available => "Available",
            RunwayStatus::InUse => "InUse",
            RunwayStatus::Maintenance => "Maintenance",
            RunwayStatus::WeatherClosed => "WeatherClosed",
        };
        write!(f, "{}", s)
    }
}

/// Single-writer shared resource. The occupant is tracked by aircraft
/// id; ownership of the airframe stays with its flight.
///
/// Invariant: `status == InUse` exactly when `occupant.is_some()`.
#[derive(Debug, Clone)]
pub struct Runway {
    pub id: RunwayId,
    pub status: RunwayStatus,
    pub occupant: Option<String>,
    pub usage_count: u64,
    pub total_occupancy_secs: f64,
    /// Sim time of the most recent assignment, while occupied.
    last_assigned_at: Option<f64>,
    /// Seconds the current occupant has held the runway, for reporting.
    pub current_occupancy_secs: f64,
}

impl Runway {
    pub fn new(id: RunwayId) -> Self {
        Self {
            id,
            status: RunwayStatus::Available,
            occupant: None,
            usage_count: 0,
            total_occupancy_secs: 0.0,
            last_assigned_at: None,
            current_occupancy_secs: 0.0,
        }
    }

    /// Whether an aircraft of this kind heading this direction may use
    /// the runway at all, regardless of current status.
    pub fn eligible(&self, kind: AircraftKind, direction: Direction) -> bool {
        self.id.permits_direction(direction) && self.id.permits_kind(kind)
    }

    /// Claim the runway for an aircraft. Fails unless Available and
    /// both eligibility predicates hold; no state changes on failure.
    pub fn assign(
        &mut self,
        aircraft_id: &str,
        kind: AircraftKind,
        direction: Direction,
        now: f64,
    ) -> SimResult<()> {
        if aircraft_id.is_empty() {
            return Err(SimError::precondition("assign with empty aircraft id"));
        }
        if self.status != RunwayStatus::Available {
            return Err(SimError::precondition(format!(
                "{} is {}, not Available",
                self.id, self.status
            )));
        }
        if !self.id.permits_direction(direction) {
            return Err(SimError::precondition(format!(
                "{} does not serve direction {}",
                self.id, direction
            )));
        }
        if !self.id.permits_kind(kind) {
            return Err(SimError::precondition(format!(
                "{} does not serve {} traffic",
                self.id, kind
            )));
        }

        self.status = RunwayStatus::InUse;
        self.occupant = Some(aircraft_id.to_string());
        self.usage_count += 1;
        self.last_assigned_at = Some(now);
        self.current_occupancy_secs = 0.0;
        Ok(())
    }

    /// Release the runway. Only the current occupant may release;
    /// occupancy time is accrued before the runway reopens.
    pub fn release(&mut self, aircraft_id: &str, now: f64) -> SimResult<()> {
        match &self.occupant {
            Some(current) if current == aircraft_id => {}
            Some(current) => {
                return Err(SimError::precondition(format!(
                    "{} occupied by {}, not {}",
                    self.id, current, aircraft_id
                )));
            }
            None => {
                return Err(SimError::precondition(format!(
                    "{} is not occupied",
                    self.id
                )));
            }
        }

        self.accrue_occupancy(now);
        self.occupant = None;
        self.status = RunwayStatus::Available;
        self.current_occupancy_secs = 0.0;
        Ok(())
    }

    /// Administrative status change. Closing an InUse runway force-
    /// evicts the occupant after accruing its usage time.
    pub fn set_status(&mut self, new_status: RunwayStatus, now: f64) -> SimResult<()> {
        match new_status {
            RunwayStatus::InUse => {
                return Err(SimError::precondition(
                    "InUse is only entered through assign",
                ));
            }
            RunwayStatus::Maintenance | RunwayStatus::WeatherClosed => {
                if self.status == RunwayStatus::InUse {
                    self.accrue_occupancy(now);
                    self.occupant = None;
                }
                self.status = new_status;
            }
            RunwayStatus::Available => {
                if self.status == RunwayStatus::InUse {
                    return Err(SimError::precondition(format!(
                        "{} still occupied; release it instead",
                        self.id
                    )));
                }
                self.status = RunwayStatus::Available;
            }
        }
        Ok(())
    }

    /// Per-tick bookkeeping: tracks how long the current occupant has
    /// been holding the runway.
    pub fn update(&mut self, dt: f64) {
        if self.status == RunwayStatus::InUse {
            self.current_occupancy_secs += dt;
        }
    }

    fn accrue_occupancy(&mut self, now: f64) {
        if let Some(assigned_at) = self.last_assigned_at.take() {
            self.total_occupancy_secs += (now - assigned_at).max(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_use_iff_occupied() {
        let mut rwy = Runway::new(RunwayId::A);
        assert_eq!(rwy.status, RunwayStatus::Available);
        assert!(rwy.occupant.is_none());

        rwy.assign("P100", AircraftKind::Commercial, Direction::North, 10.0)
            .unwrap();
        assert_eq!(rwy.status, RunwayStatus::InUse);
        assert!(rwy.occupant.is_some());

        rwy.release("P100", 40.0).unwrap();
        assert_eq!(rwy.status, RunwayStatus::Available);
        assert!(rwy.occupant.is_none());
    }

    #[test]
    fn assign_release_round_trip_accrues_usage() {
        let mut rwy = Runway::new(RunwayId::A);
        let prev_time = rwy.total_occupancy_secs;

        rwy.assign("P100", AircraftKind::Commercial, Direction::North, 10.0)
            .unwrap();
        assert_eq!(rwy.usage_count, 1);
        rwy.release("P100", 100.0).unwrap();

        assert_eq!(rwy.usage_count, 1);
        assert!(rwy.total_occupancy_secs >= prev_time);
        assert_eq!(rwy.total_occupancy_secs, 90.0);
    }

    #[test]
    fn assign_rejects_wrong_direction() {
        let mut rwy = Runway::new(RunwayId::A);
        let err = rwy.assign("F200", AircraftKind::Cargo, Direction::East, 0.0);
        assert!(err.is_err());
        assert_eq!(rwy.status, RunwayStatus::Available);

        let mut rwy_b = Runway::new(RunwayId::B);
        assert!(rwy_b
            .assign("F200", AircraftKind::Cargo, Direction::North, 0.0)
            .is_err());
    }

    #[test]
    fn rwy_c_excludes_commercial() {
        let mut rwy = Runway::new(RunwayId::C);
        assert!(rwy
            .assign("P100", AircraftKind::Commercial, Direction::North, 0.0)
            .is_err());
        assert_eq!(rwy.status, RunwayStatus::Available);

        // Cargo and Emergency are valid for any direction on C.
        rwy.assign("F200", AircraftKind::Cargo, Direction::East, 0.0)
            .unwrap();
        rwy.release("F200", 5.0).unwrap();
        rwy.assign("PA300", AircraftKind::Emergency, Direction::North, 6.0)
            .unwrap();
    }

    #[test]
    fn double_assign_fails() {
        let mut rwy = Runway::new(RunwayId::A);
        rwy.assign("P100", AircraftKind::Commercial, Direction::North, 0.0)
            .unwrap();
        assert!(rwy
            .assign("P200", AircraftKind::Commercial, Direction::South, 1.0)
            .is_err());
        assert_eq!(rwy.occupant.as_deref(), Some("P100"));
        assert_eq!(rwy.usage_count, 1);
    }

    #[test]
    fn release_by_non_occupant_fails() {
        let mut rwy = Runway::new(RunwayId::A);
        rwy.assign("P100", AircraftKind::Commercial, Direction::North, 0.0)
            .unwrap();
        assert!(rwy.release("P999", 1.0).is_err());
        assert_eq!(rwy.status, RunwayStatus::InUse);

        let mut empty = Runway::new(RunwayId::B);
        assert!(empty.release("P100", 1.0).is_err());
    }

    #[test]
    fn force_close_while_in_use_accrues_then_evicts() {
        let mut rwy = Runway::new(RunwayId::B);
        rwy.assign("A500", AircraftKind::Commercial, Direction::West, 20.0)
            .unwrap();
        rwy.set_status(RunwayStatus::WeatherClosed, 50.0).unwrap();

        assert_eq!(rwy.status, RunwayStatus::WeatherClosed);
        assert!(rwy.occupant.is_none());
        assert_eq!(rwy.total_occupancy_secs, 30.0);

        // Reopen is allowed once unoccupied.
        rwy.set_status(RunwayStatus::Available, 60.0).unwrap();
        assert_eq!(rwy.status, RunwayStatus::Available);
    }

    #[test]
    fn set_status_cannot_enter_in_use() {
        let mut rwy = Runway::new(RunwayId::A);
        assert!(rwy.set_status(RunwayStatus::InUse, 0.0).is_err());
    }

    #[test]
    fn assign_fails_while_closed() {
        let mut rwy = Runway::new(RunwayId::A);
        rwy.set_status(RunwayStatus::Maintenance, 0.0).unwrap();
        assert!(rwy
            .assign("P100", AircraftKind::Commercial, Direction::North, 1.0)
            .is_err());
    }

    #[test]
    fn update_tracks_current_occupancy() {
        let mut rwy = Runway::new(RunwayId::A);
        rwy.assign("P100", AircraftKind::Commercial, Direction::South, 0.0)
            .unwrap();
        rwy.update(0.1);
        rwy.update(0.1);
        assert!((rwy.current_occupancy_secs - 0.2).abs() < 1e-9);
        rwy.release("P100", 0.2).unwrap();
        assert_eq!(rwy.current_occupancy_secs, 0.0);
    }
}
