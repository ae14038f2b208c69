use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use crate::aircraft::{AircraftKind, Direction};
use crate::error::{SimError, SimResult};
use crate::runway::{Runway, RunwayId};

/// A flight waiting for a runway. Carries enough of the flight's
/// identity that the assignment pass never needs the flight lock to
/// pick candidates.
#[derive(Debug, Clone)]
pub struct PendingFlight {
    pub flight_id: String,
    pub kind: AircraftKind,
    pub direction: Direction,
    pub is_emergency: bool,
    pub scheduled_at: f64,
}

impl PendingFlight {
    pub fn priority_class(&self) -> u8 {
        if self.is_emergency {
            3
        } else {
            self.kind.priority_class()
        }
    }
}

impl PartialEq for PendingFlight {
    fn eq(&self, other: &Self) -> bool {
        self.priority_class() == other.priority_class()
            && self.scheduled_at == other.scheduled_at
    }
}

impl Eq for PendingFlight {}

impl PartialOrd for PendingFlight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingFlight {
    /// Max-heap order: higher priority class first, earlier scheduled
    /// time breaking ties.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority_class()
            .cmp(&other.priority_class())
            .then_with(|| other.scheduled_at.total_cmp(&self.scheduled_at))
    }
}

/// Priority scheduler for the three shared runways: one queue per
/// runway plus a bounded-retry queue for flights nothing could serve.
#[derive(Debug, Default)]
pub struct RunwayArbiter {
    queues: HashMap<RunwayId, BinaryHeap<PendingFlight>>,
    pub denied: VecDeque<PendingFlight>,
    pub denied_total: u64,
}

impl RunwayArbiter {
    pub fn new() -> Self {
        let mut queues = HashMap::new();
        for id in RunwayId::ALL {
            queues.insert(id, BinaryHeap::new());
        }
        Self {
            queues,
            denied: VecDeque::new(),
            denied_total: 0,
        }
    }

    /// Runways to try for this flight, in order. Cargo and emergency
    /// traffic heads for RWY-C first and falls back to the
    /// direction-preferred runway; everyone else gets exactly the
    /// runway their direction allows. RWY-C never appears for plain
    /// commercial traffic.
    pub fn candidates_for(pending: &PendingFlight) -> Vec<RunwayId> {
        let preferred = RunwayId::preferred_for(pending.direction);
        if pending.is_emergency || pending.kind != AircraftKind::Commercial {
            vec![RunwayId::C, preferred]
        } else {
            vec![preferred]
        }
    }

    /// Queue a flight on the runway it will try first.
    pub fn enqueue(&mut self, pending: PendingFlight) {
        let home = Self::candidates_for(&pending)[0];
        if let Some(queue) = self.queues.get_mut(&home) {
            queue.push(pending);
        }
    }

    pub fn pop(&mut self, runway: RunwayId) -> Option<PendingFlight> {
        self.queues.get_mut(&runway).and_then(|q| q.pop())
    }

    pub fn queue_depth(&self, runway: RunwayId) -> usize {
        self.queues.get(&runway).map(|q| q.len()).unwrap_or(0)
    }

    pub fn total_queued(&self) -> usize {
        self.queues.values().map(|q| q.len()).sum()
    }

    /// Record a flight no runway could take; it will be retried by the
    /// rescheduling task.
    pub fn push_denied(&mut self, pending: PendingFlight) {
        self.denied_total += 1;
        self.denied.push_back(pending);
    }

    /// Take up to `max` denied flights for a retry cycle.
    pub fn take_denied(&mut self, max: usize) -> Vec<PendingFlight> {
        let n = max.min(self.denied.len());
        self.denied.drain(..n).collect()
    }

    /// Escalate a queued flight to emergency priority. Rebuilds the
    /// queue it sits in; no-op if the flight is not queued.
    pub fn promote_to_emergency(&mut self, flight_id: &str) -> bool {
        for queue in self.queues.values_mut() {
            if queue.iter().any(|p| p.flight_id == flight_id) {
                let mut entries: Vec<PendingFlight> = std::mem::take(queue).into_vec();
                for entry in &mut entries {
                    if entry.flight_id == flight_id {
                        entry.is_emergency = true;
                    }
                }
                *queue = entries.into_iter().collect();
                return true;
            }
        }
        false
    }

    /// Drop a flight from whichever queue holds it (canceled before
    /// assignment).
    pub fn remove(&mut self, flight_id: &str) -> bool {
        for queue in self.queues.values_mut() {
            if queue.iter().any(|p| p.flight_id == flight_id) {
                let entries: Vec<PendingFlight> = std::mem::take(queue)
                    .into_vec()
                    .into_iter()
                    .filter(|p| p.flight_id != flight_id)
                    .collect();
                *queue = entries.into_iter().collect();
                return true;
            }
        }
        self.denied
            .iter()
            .position(|p| p.flight_id == flight_id)
            .map(|i| self.denied.remove(i))
            .is_some()
    }

    /// Try to place one pending flight on the given runway array,
    /// walking its candidate list. Err(ResourceUnavailable) when no
    /// eligible runway is free. The live assignment pass locks
    /// runways one at a time and calls `Runway::assign` itself.
    pub fn try_place(
        pending: &PendingFlight,
        runways: &mut [Runway],
        now: f64,
    ) -> SimResult<RunwayId> {
        for candidate in Self::candidates_for(pending) {
            if let Some(runway) = runways.iter_mut().find(|r| r.id == candidate) {
                if runway
                    .assign(&pending.flight_id, pending.kind, pending.direction, now)
                    .is_ok()
                {
                    return Ok(candidate);
                }
            }
        }
        Err(SimError::ResourceUnavailable {
            flight: pending.flight_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(
        id: &str,
        kind: AircraftKind,
        direction: Direction,
        emergency: bool,
        at: f64,
    ) -> PendingFlight {
        PendingFlight {
            flight_id: id.into(),
            kind,
            direction,
            is_emergency: emergency,
            scheduled_at: at,
        }
    }

    fn all_runways() -> Vec<Runway> {
        RunwayId::ALL.iter().map(|id| Runway::new(*id)).collect()
    }

    #[test]
    fn emergency_pops_before_earlier_commercials() {
        let mut arbiter = RunwayArbiter::new();
        arbiter.enqueue(pending("P1", AircraftKind::Commercial, Direction::North, false, 0.0));
        arbiter.enqueue(pending("P2", AircraftKind::Commercial, Direction::North, false, 1.0));
        arbiter.enqueue(pending("P3", AircraftKind::Commercial, Direction::North, false, 2.0));
        // Later scheduled time, higher class. Emergencies queue on C
        // first, so place it on the A queue by direction to compare.
        let mut emergency = pending("PA9", AircraftKind::Commercial, Direction::North, true, 50.0);
        emergency.kind = AircraftKind::Commercial;
        // Enqueue manually onto the A queue to test pure ordering.
        arbiter
            .queues
            .get_mut(&RunwayId::A)
            .unwrap()
            .push(emergency);

        let first = arbiter.pop(RunwayId::A).unwrap();
        assert_eq!(first.flight_id, "PA9");
        // Remaining pop in scheduled order.
        assert_eq!(arbiter.pop(RunwayId::A).unwrap().flight_id, "P1");
        assert_eq!(arbiter.pop(RunwayId::A).unwrap().flight_id, "P2");
    }

    #[test]
    fn cargo_beats_commercial_ties_break_on_time() {
        let a = pending("C1", AircraftKind::Cargo, Direction::North, false, 10.0);
        let b = pending("P1", AircraftKind::Commercial, Direction::North, false, 0.0);
        assert!(a > b);

        // Equal class: the earlier scheduled flight wins the heap.
        let c = pending("P2", AircraftKind::Commercial, Direction::North, false, 5.0);
        assert!(b > c);
    }

    #[test]
    fn candidates_respect_exclusivity() {
        let commercial = pending("P1", AircraftKind::Commercial, Direction::North, false, 0.0);
        assert_eq!(RunwayArbiter::candidates_for(&commercial), vec![RunwayId::A]);

        let departure = pending("P2", AircraftKind::Commercial, Direction::East, false, 0.0);
        assert_eq!(RunwayArbiter::candidates_for(&departure), vec![RunwayId::B]);

        let cargo = pending("F1", AircraftKind::Cargo, Direction::North, false, 0.0);
        assert_eq!(
            RunwayArbiter::candidates_for(&cargo),
            vec![RunwayId::C, RunwayId::A]
        );

        let emergency = pending("PA1", AircraftKind::Emergency, Direction::West, true, 0.0);
        assert_eq!(
            RunwayArbiter::candidates_for(&emergency),
            vec![RunwayId::C, RunwayId::B]
        );
    }

    #[test]
    fn cargo_placed_on_c_first_then_falls_back() {
        let mut runways = all_runways();
        let cargo = pending("F1", AircraftKind::Cargo, Direction::North, false, 0.0);

        let placed = RunwayArbiter::try_place(&cargo, &mut runways, 0.0).unwrap();
        assert_eq!(placed, RunwayId::C);

        // C now busy: next cargo falls back to A.
        let cargo2 = pending("F2", AircraftKind::Cargo, Direction::North, false, 1.0);
        let placed = RunwayArbiter::try_place(&cargo2, &mut runways, 1.0).unwrap();
        assert_eq!(placed, RunwayId::A);
    }

    #[test]
    fn commercial_never_lands_on_c() {
        let mut runways = all_runways();
        // Occupy A so the only physically free arrival-capable strip
        // would be C.
        runways[0]
            .assign("X1", AircraftKind::Commercial, Direction::North, 0.0)
            .unwrap();

        let commercial = pending("P1", AircraftKind::Commercial, Direction::South, false, 0.0);
        assert!(RunwayArbiter::try_place(&commercial, &mut runways, 0.0).is_err());
        assert!(runways[2].occupant.is_none());
    }

    #[test]
    fn denied_queue_is_bounded_per_cycle() {
        let mut arbiter = RunwayArbiter::new();
        for i in 0..8 {
            arbiter.push_denied(pending(
                &format!("P{}", i),
                AircraftKind::Commercial,
                Direction::North,
                false,
                i as f64,
            ));
        }
        assert_eq!(arbiter.denied_total, 8);

        let batch = arbiter.take_denied(5);
        assert_eq!(batch.len(), 5);
        assert_eq!(arbiter.denied.len(), 3);
        assert_eq!(batch[0].flight_id, "P0");
    }

    #[test]
    fn promote_to_emergency_reorders_queue() {
        let mut arbiter = RunwayArbiter::new();
        arbiter.enqueue(pending("P1", AircraftKind::Commercial, Direction::North, false, 0.0));
        arbiter.enqueue(pending("P2", AircraftKind::Commercial, Direction::North, false, 1.0));

        assert!(arbiter.promote_to_emergency("P2"));
        let first = arbiter.pop(RunwayId::A).unwrap();
        assert_eq!(first.flight_id, "P2");
        assert!(first.is_emergency);
    }

    #[test]
    fn remove_drops_from_queue_or_denied() {
        let mut arbiter = RunwayArbiter::new();
        arbiter.enqueue(pending("P1", AircraftKind::Commercial, Direction::North, false, 0.0));
        assert!(arbiter.remove("P1"));
        assert_eq!(arbiter.total_queued(), 0);

        arbiter.push_denied(pending("P2", AircraftKind::Commercial, Direction::North, false, 0.0));
        assert!(arbiter.remove("P2"));
        assert!(arbiter.denied.is_empty());
        assert!(!arbiter.remove("P3"));
    }
}
