use rand::Rng;
use std::collections::HashMap;

use crate::aircraft::{Aircraft, AircraftKind, Direction};
use crate::config::{AirlineSpec, EmergencyOdds, ScheduleCadence};
use crate::error::{SimError, SimResult};

/// Chance that a commercial-primary airline fields a cargo aircraft.
const CARGO_OVERRIDE_PROBABILITY: f64 = 0.05;

/// A carrier operating out of the airport. Created once at
/// initialization and alive for the whole simulation; its aircraft
/// are owned by their flights and tracked here by id.
#[derive(Debug)]
pub struct Airline {
    pub name: String,
    pub primary_kind: AircraftKind,
    pub fleet_size: u32,
    pub capacity: u32,
    pub active_aircraft: u32,
    pub violation_count: u64,
    /// Flight id -> aircraft id, for portal queries.
    pub aircraft_by_flight: HashMap<String, String>,
    last_scheduled: [Option<f64>; 4],
}

impl Airline {
    pub fn from_spec(spec: &AirlineSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            primary_kind: spec.kind,
            fleet_size: spec.fleet_size,
            capacity: spec.capacity,
            active_aircraft: 0,
            violation_count: 0,
            aircraft_by_flight: HashMap::new(),
            last_scheduled: [None; 4],
        }
    }

    /// Uppercase initials of the airline name, used as the flight-id
    /// prefix ("Blue Dart" -> "BD").
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// Fire at most once per direction interval, and only below the
    /// concurrency cap. Returns the freshly built aircraft together
    /// with the sampled emergency flag so the flight it becomes
    /// inherits the roll, not the airframe kind.
    pub fn schedule_if_needed(
        &mut self,
        now: f64,
        direction: Direction,
        cadence: &ScheduleCadence,
        odds: &EmergencyOdds,
        rng: &mut impl Rng,
    ) -> Option<(Aircraft, bool)> {
        let slot = direction.index();
        let due = match self.last_scheduled[slot] {
            Some(last) => now - last >= cadence.interval(direction),
            None => true,
        };
        if !due || self.active_aircraft >= self.capacity {
            return None;
        }

        self.last_scheduled[slot] = Some(now);
        let force_emergency = rng.gen_bool(odds.probability(direction).clamp(0.0, 1.0));
        self.create_aircraft(direction, force_emergency, rng)
            .ok()
            .map(|aircraft| (aircraft, force_emergency))
    }

    /// Build an aircraft of the derived kind. Over-capacity requests
    /// are precondition failures with no state change.
    pub fn create_aircraft(
        &mut self,
        direction: Direction,
        force_emergency: bool,
        rng: &mut impl Rng,
    ) -> SimResult<Aircraft> {
        if self.active_aircraft >= self.capacity {
            return Err(SimError::precondition(format!(
                "{} is at capacity ({})",
                self.name, self.capacity
            )));
        }

        let kind = if force_emergency {
            AircraftKind::Emergency
        } else {
            match self.primary_kind {
                AircraftKind::Cargo | AircraftKind::Emergency => self.primary_kind,
                AircraftKind::Commercial => {
                    if rng.gen_bool(CARGO_OVERRIDE_PROBABILITY) {
                        AircraftKind::Cargo
                    } else {
                        AircraftKind::Commercial
                    }
                }
            }
        };
        Ok(self.build_aircraft(kind, direction, rng))
    }

    /// Build a cargo airframe regardless of primary kind. Used by the
    /// cargo-presence backfill, which may draft a commercial carrier.
    pub fn create_cargo_aircraft(
        &mut self,
        direction: Direction,
        rng: &mut impl Rng,
    ) -> SimResult<Aircraft> {
        self.create_aircraft_of_kind(AircraftKind::Cargo, direction, rng)
    }

    /// Build an airframe of an exact kind, bypassing kind derivation.
    /// Scenario setup and the cargo backfill go through here.
    pub fn create_aircraft_of_kind(
        &mut self,
        kind: AircraftKind,
        direction: Direction,
        rng: &mut impl Rng,
    ) -> SimResult<Aircraft> {
        if self.active_aircraft >= self.capacity {
            return Err(SimError::precondition(format!(
                "{} is at capacity ({})",
                self.name, self.capacity
            )));
        }
        Ok(self.build_aircraft(kind, direction, rng))
    }

    fn build_aircraft(
        &mut self,
        kind: AircraftKind,
        direction: Direction,
        rng: &mut impl Rng,
    ) -> Aircraft {
        let id = format!("{}{}", self.initials(), rng.gen_range(100..=9999));
        let aircraft = Aircraft::new(id.clone(), self.name.clone(), kind, direction, rng);
        self.active_aircraft += 1;
        self.aircraft_by_flight.insert(id, aircraft.id.clone());
        aircraft
    }

    /// Drop all runtime state, keeping the roster identity.
    pub fn reset(&mut self) {
        self.active_aircraft = 0;
        self.violation_count = 0;
        self.aircraft_by_flight.clear();
        self.last_scheduled = [None; 4];
    }

    /// Called when a flight reaches a terminal status.
    pub fn release_aircraft(&mut self, flight_id: &str) {
        if self.aircraft_by_flight.remove(flight_id).is_some() {
            self.active_aircraft = self.active_aircraft.saturating_sub(1);
        }
    }

    pub fn record_violation(&mut self) {
        self.violation_count += 1;
    }
}
