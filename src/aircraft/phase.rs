use serde::{Deserialize, Serialize};

/// Category an aircraft belongs to, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AircraftKind {
    Commercial,
    Cargo,
    Emergency,
}

impl AircraftKind {
    /// Scheduling priority class: emergencies beat cargo beat commercial.
    pub fn priority_class(&self) -> u8 {
        match self {
            AircraftKind::Emergency => 3,
            AircraftKind::Cargo => 2,
            AircraftKind::Commercial => 1,
        }
    }
}

impl std::fmt::Display for AircraftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AircraftKind::Commercial => "COMMERCIAL",
            AircraftKind::Cargo => "CARGO",
            AircraftKind::Emergency => "EMERGENCY",
        };
        write!(f, "{}", s)
    }
}

/// Compass direction a flight enters the airspace from (arrivals) or
/// leaves towards (departures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// North and South feed arrivals; East and West feed departures.
    pub fn is_arrival(&self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }

    pub fn index(&self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Direction::North => "N",
            Direction::South => "S",
            Direction::East => "E",
            Direction::West => "W",
        };
        write!(f, "{}", s)
    }
}

/// Flight phases. Arrivals run Holding through AtGateArrival, departures
/// run AtGateDeparture through Cruise. The two chains never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Holding,
    Approach,
    Landing,
    TaxiIn,
    AtGateArrival,
    AtGateDeparture,
    TaxiOut,
    TakeoffRoll,
    Climb,
    Cruise,
}

impl Phase {
    /// First phase for a flight in the given direction.
    pub fn initial(direction: Direction) -> Phase {
        if direction.is_arrival() {
            Phase::Holding
        } else {
            Phase::AtGateDeparture
        }
    }

    /// Statically-defined successor phase, None at chain ends.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Holding => Some(Phase::Approach),
            Phase::Approach => Some(Phase::Landing),
            Phase::Landing => Some(Phase::TaxiIn),
            Phase::TaxiIn => Some(Phase::AtGateArrival),
            Phase::AtGateArrival => None,
            Phase::AtGateDeparture => Some(Phase::TaxiOut),
            Phase::TaxiOut => Some(Phase::TakeoffRoll),
            Phase::TakeoffRoll => Some(Phase::Climb),
            Phase::Climb => Some(Phase::Cruise),
            Phase::Cruise => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::AtGateArrival | Phase::Cruise)
    }

    /// Phases during which the aircraft is on the ground and ground
    /// faults can occur.
    pub fn is_ground(&self) -> bool {
        matches!(
            self,
            Phase::TaxiIn | Phase::AtGateArrival | Phase::AtGateDeparture | Phase::TaxiOut
        )
    }

    /// Permitted speed band [min, max] in km/h for this phase.
    pub fn speed_bounds(&self) -> (f64, f64) {
        match self {
            Phase::Holding => (400.0, 600.0),
            Phase::Approach => (240.0, 290.0),
            Phase::Landing => (30.0, 240.0),
            Phase::TaxiIn | Phase::TaxiOut => (15.0, 30.0),
            Phase::AtGateArrival | Phase::AtGateDeparture => (0.0, 5.0),
            Phase::TakeoffRoll => (0.0, 290.0),
            Phase::Climb => (250.0, 463.0),
            Phase::Cruise => (800.0, 900.0),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Holding => "Holding",
            Phase::Approach => "Approach",
            Phase::Landing => "Landing",
            Phase::TaxiIn => "TaxiIn",
            Phase::AtGateArrival => "AtGateArrival",
            Phase::AtGateDeparture => "AtGateDeparture",
            Phase::TaxiOut => "TaxiOut",
            Phase::TakeoffRoll => "TakeoffRoll",
            Phase::Climb => "Climb",
            Phase::Cruise => "Cruise",
        };
        write!(f, "{}", s)
    }
}
