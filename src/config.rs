use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::aircraft::{AircraftKind, Direction};

/// Seconds between scheduling attempts per inbound/outbound direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleCadence {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Default for ScheduleCadence {
    fn default() -> Self {
        Self {
            north: 180.0,
            south: 120.0,
            east: 150.0,
            west: 240.0,
        }
    }
}

impl ScheduleCadence {
    pub fn interval(&self, direction: Direction) -> f64 {
        match direction {
            Direction::North => self.north,
            Direction::South => self.south,
            Direction::East => self.east,
            Direction::West => self.west,
        }
    }
}

/// Probability that a newly scheduled flight is an emergency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyOdds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Default for EmergencyOdds {
    fn default() -> Self {
        Self {
            north: 0.10,
            south: 0.05,
            east: 0.15,
            west: 0.20,
        }
    }
}

impl EmergencyOdds {
    pub fn probability(&self, direction: Direction) -> f64 {
        match direction {
            Direction::North => self.north,
            Direction::South => self.south,
            Direction::East => self.east,
            Direction::West => self.west,
        }
    }
}

/// Top-level simulation settings. Compiled-in defaults match the
/// standard scenario; a JSON file can override any field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimConfig {
    /// Total wall-clock duration of one run, in simulated seconds.
    pub duration_secs: f64,
    /// Master seed; every worker derives its own RNG from this.
    pub master_seed: u64,
    /// Simulation tick period in milliseconds (dt cap).
    pub tick_ms: u64,
    /// Flight-generator cycle period in milliseconds.
    pub generator_ms: u64,
    /// Monitoring cycle period in milliseconds.
    pub monitor_ms: u64,
    /// Denied-flight retry cycle period in milliseconds.
    pub retry_ms: u64,
    /// Max denied flights retried per cycle.
    pub max_denied_retries: usize,
    pub cadence: ScheduleCadence,
    pub emergency_odds: EmergencyOdds,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            duration_secs: 300.0,
            master_seed: 0x41544353, // "ATCS"
            tick_ms: 100,
            generator_ms: 100,
            monitor_ms: 200,
            retry_ms: 500,
            max_denied_retries: 5,
            cadence: ScheduleCadence::default(),
            emergency_odds: EmergencyOdds::default(),
        }
    }
}

impl SimConfig {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path))?;
        let config: SimConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config JSON: {}", path))?;
        Ok(config)
    }
}

/// One roster entry: airline name, primary kind, total airframes,
/// max concurrently active aircraft.
#[derive(Debug, Clone)]
pub struct AirlineSpec {
    pub name: &'static str,
    pub kind: AircraftKind,
    pub fleet_size: u32,
    pub capacity: u32,
}

/// The fixed airline roster. Order matters: the cargo-presence check
/// walks this list front to back.
pub fn default_roster() -> Vec<AirlineSpec> {
    vec![
        AirlineSpec {
            name: "PIA",
            kind: AircraftKind::Commercial,
            fleet_size: 6,
            capacity: 4,
        },
        AirlineSpec {
            name: "AirBlue",
            kind: AircraftKind::Commercial,
            fleet_size: 4,
            capacity: 4,
        },
        AirlineSpec {
            name: "FedEx",
            kind: AircraftKind::Cargo,
            fleet_size: 3,
            capacity: 2,
        },
        AirlineSpec {
            name: "Pakistan Airforce",
            kind: AircraftKind::Emergency,
            fleet_size: 2,
            capacity: 1,
        },
        AirlineSpec {
            name: "Blue Dart",
            kind: AircraftKind::Cargo,
            fleet_size: 2,
            capacity: 2,
        },
        AirlineSpec {
            name: "AghaKhan Air",
            kind: AircraftKind::Emergency,
            fleet_size: 2,
            capacity: 1,
        },
    ]
}
