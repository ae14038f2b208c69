use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::aircraft::{Aircraft, AircraftKind, Phase};

/// Samples kept per aircraft for the rapid-change check.
const HISTORY_LEN: usize = 10;
/// Mean absolute step-to-step delta above this fires a violation, km/h.
const RAPID_CHANGE_THRESHOLD: f64 = 50.0;
/// First AVN id handed out.
const AVN_ID_BASE: u32 = 1000;
/// Billing fine per notice, by billed class.
const FINE_COMMERCIAL: f64 = 500_000.0;
const FINE_CARGO: f64 = 700_000.0;
/// Service fee fraction added on top of the fine.
const SERVICE_FEE_RATE: f64 = 0.15;
/// Days until an unpaid notice goes overdue.
const DUE_DAYS: i64 = 3;

/// Analytics fine schedule (separate from the billed amounts above).
const ANALYTICS_BASE_FINE: f64 = 1_000.0;
const ANALYTICS_ESCALATED_FINE: f64 = 5_000.0;
const ANALYTICS_ESCALATION_MARGIN: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Overdue,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Unpaid => "Unpaid",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Overdue => "Overdue",
        };
        write!(f, "{}", s)
    }
}

/// An Airspace Violation Notice: one billing record per detected
/// speed violation.
#[derive(Debug, Clone)]
pub struct ViolationRecord {
    pub avn_id: u32,
    pub airline: String,
    pub flight_id: String,
    pub kind: AircraftKind,
    pub phase: Phase,
    pub recorded_speed: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub issued_at: DateTime<Utc>,
    pub due_by: DateTime<Utc>,
    pub fine: f64,
    pub service_fee: f64,
    pub total: f64,
    pub status: PaymentStatus,
}

impl ViolationRecord {
    fn new(aircraft: &Aircraft, avn_id: u32, issued_at: DateTime<Utc>) -> Self {
        let (min_speed, max_speed) = aircraft.phase.speed_bounds();
        // Emergencies are billed at the cargo rate.
        let fine = match aircraft.kind {
            AircraftKind::Commercial => FINE_COMMERCIAL,
            AircraftKind::Cargo | AircraftKind::Emergency => FINE_CARGO,
        };
        let service_fee = fine * SERVICE_FEE_RATE;
        Self {
            avn_id,
            airline: aircraft.airline.clone(),
            flight_id: aircraft.id.clone(),
            kind: aircraft.kind,
            phase: aircraft.phase,
            recorded_speed: aircraft.speed,
            min_speed,
            max_speed,
            issued_at,
            due_by: issued_at + Duration::days(DUE_DAYS),
            fine,
            service_fee,
            total: fine + service_fee,
            status: PaymentStatus::Unpaid,
        }
    }

    /// How far outside the band the recorded speed sits (0 if inside).
    pub fn excursion(&self) -> f64 {
        let over = (self.recorded_speed - self.max_speed).max(0.0);
        let under = (self.min_speed - self.recorded_speed).max(0.0);
        over.max(under)
    }

    /// Effective status: unpaid notices past their due date report as
    /// overdue; a confirmed payment always wins.
    pub fn effective_status(&self, now: DateTime<Utc>) -> PaymentStatus {
        match self.status {
            PaymentStatus::Paid => PaymentStatus::Paid,
            _ if now > self.due_by => PaymentStatus::Overdue,
            other => other,
        }
    }

    /// Billed class label used on the wire and in operator text.
    pub fn billed_class(&self) -> &'static str {
        match self.kind {
            AircraftKind::Commercial => "COMMERCIAL",
            AircraftKind::Cargo | AircraftKind::Emergency => "CARGO",
        }
    }
}

/// Watches every aircraft's speed against its phase band and a
/// rapid-fluctuation heuristic, and turns breaches into AVNs.
#[derive(Debug, Default)]
pub struct SpeedMonitor {
    next_avn_id: u32,
    histories: HashMap<String, VecDeque<f64>>,
    /// Phases an aircraft has already been cited in; suppresses
    /// duplicate notices until the next phase transition.
    violated_phases: HashMap<String, HashSet<Phase>>,
    pub records: Vec<ViolationRecord>,
    pub violations_per_airline: HashMap<String, u64>,
    pub violations_per_phase: HashMap<Phase, u64>,
}

impl SpeedMonitor {
    pub fn new() -> Self {
        Self {
            next_avn_id: AVN_ID_BASE,
            ..Default::default()
        }
    }

    /// Observe one aircraft. Returns the freshly issued record when a
    /// violation fires, for the caller to push over the bridge.
    pub fn monitor(&mut self, aircraft: &mut Aircraft) -> Option<ViolationRecord> {
        let history = self.histories.entry(aircraft.id.clone()).or_default();
        history.push_back(aircraft.speed);
        while history.len() > HISTORY_LEN {
            history.pop_front();
        }

        let out_of_bounds = aircraft.check_speed_compliance().is_err();
        let fluctuating = mean_abs_delta(history) > RAPID_CHANGE_THRESHOLD;
        if !out_of_bounds && !fluctuating {
            return None;
        }

        let already_cited = self
            .violated_phases
            .get(&aircraft.id)
            .map(|phases| phases.contains(&aircraft.phase))
            .unwrap_or(false);
        if already_cited {
            return None;
        }

        let record = ViolationRecord::new(aircraft, self.next_avn_id, Utc::now());
        self.next_avn_id += 1;

        self.violated_phases
            .entry(aircraft.id.clone())
            .or_default()
            .insert(aircraft.phase);
        *self
            .violations_per_airline
            .entry(record.airline.clone())
            .or_insert(0) += 1;
        *self
            .violations_per_phase
            .entry(record.phase)
            .or_insert(0) += 1;

        aircraft.issue_avn(format!(
            "AVN #{}: {} at {:.0} km/h in {} (permitted {:.0}-{:.0})",
            record.avn_id,
            record.flight_id,
            record.recorded_speed,
            record.phase,
            record.min_speed,
            record.max_speed
        ));

        self.records.push(record.clone());
        Some(record)
    }

    /// Drop an aircraft's history once its flight is over.
    pub fn forget(&mut self, aircraft_id: &str) {
        self.histories.remove(aircraft_id);
        self.violated_phases.remove(aircraft_id);
    }

    /// Mark the AVN paid on a payment confirmation. Returns false for
    /// an unknown id.
    pub fn mark_paid(&mut self, avn_id: u32) -> bool {
        match self.records.iter_mut().find(|r| r.avn_id == avn_id) {
            Some(record) => {
                record.status = PaymentStatus::Paid;
                true
            }
            None => false,
        }
    }

    pub fn record(&self, avn_id: u32) -> Option<&ViolationRecord> {
        self.records.iter().find(|r| r.avn_id == avn_id)
    }

    /// All notices not yet confirmed paid.
    pub fn unpaid(&self) -> Vec<&ViolationRecord> {
        self.records
            .iter()
            .filter(|r| r.status != PaymentStatus::Paid)
            .collect()
    }

    pub fn for_airline(&self, airline: &str) -> Vec<&ViolationRecord> {
        self.records
            .iter()
            .filter(|r| r.airline == airline)
            .collect()
    }

    /// Analytics helper: per-airline sum of the internal fine
    /// schedule. Excursions beyond 100 km/h escalate fivefold.
    pub fn calculate_fines(&self) -> HashMap<String, f64> {
        let mut fines: HashMap<String, f64> = HashMap::new();
        for record in &self.records {
            let amount = if record.excursion() > ANALYTICS_ESCALATION_MARGIN {
                ANALYTICS_ESCALATED_FINE
            } else {
                ANALYTICS_BASE_FINE
            };
            *fines.entry(record.airline.clone()).or_insert(0.0) += amount;
        }
        fines
    }
}

fn mean_abs_delta(history: &VecDeque<f64>) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }
    let deltas: f64 = history
        .iter()
        .zip(history.iter().skip(1))
        .map(|(a, b)| (b - a).abs())
        .sum();
    deltas / (history.len() - 1) as f64
}
