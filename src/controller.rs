use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use crate::aircraft::{AircraftKind, Direction};
use crate::airline::Airline;
use crate::arbiter::{PendingFlight, RunwayArbiter};
use crate::config::{default_roster, SimConfig};
use crate::error::{SimError, SimResult};
use crate::events::{EventSink, SimEvent};
use crate::flight::{Flight, FlightStatus};
use crate::ipc::{IpcBridge, IpcRecord};
use crate::monitor::SpeedMonitor;
use crate::runway::{Runway, RunwayId, RunwayStatus};

/// Simulated wall clock: seconds since start, capped by the configured
/// run duration.
#[derive(Debug)]
struct SimClock {
    elapsed: f64,
    duration: f64,
}

impl SimClock {
    fn new(duration: f64) -> Self {
        Self {
            elapsed: 0.0,
            duration,
        }
    }

    /// Advance by dt; returns (now, expired).
    fn advance(&mut self, dt: f64) -> (f64, bool) {
        self.elapsed += dt;
        (self.elapsed, self.elapsed >= self.duration)
    }

    fn remaining(&self) -> f64 {
        (self.duration - self.elapsed).max(0.0)
    }
}

/// Per-task deterministic RNGs, all derived from the master seed.
struct TaskRngs {
    sim: Mutex<StdRng>,
    generator: Mutex<StdRng>,
}

impl TaskRngs {
    fn new(master_seed: u64) -> Self {
        Self {
            sim: Mutex::new(derive_rng(master_seed, 1)),
            generator: Mutex::new(derive_rng(master_seed, 2)),
        }
    }
}

fn derive_rng(master: u64, salt: u64) -> StdRng {
    StdRng::seed_from_u64(master.wrapping_add(salt.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
}

#[derive(Debug, Default)]
struct FlightCounters {
    completed: u64,
    canceled: u64,
    diverted: u64,
}

/// Orchestrates the whole simulation: owns the clock, the entity maps,
/// the arbiter, the generator, and the worker tasks. All cross-entity
/// references go through here by id.
///
/// Lock order, outermost first: controller collections < runway <
/// flight (aircraft rides inside) < monitor. Airline locks are taken
/// with nothing else held.
pub struct SimulationController {
    config: SimConfig,
    clock: Mutex<SimClock>,
    runways: HashMap<RunwayId, Arc<Mutex<Runway>>>,
    flights: Mutex<HashMap<String, Arc<Mutex<Flight>>>>,
    airlines: Vec<(String, Arc<Mutex<Airline>>)>,
    monitor: Arc<Mutex<SpeedMonitor>>,
    arbiter: Mutex<RunwayArbiter>,
    bridge: Mutex<Option<IpcBridge>>,
    sink: Arc<dyn EventSink>,
    shutdown: broadcast::Sender<()>,
    pause: watch::Sender<bool>,
    running: AtomicBool,
    /// Non-terminal cargo flights, reconciled by the monitoring task.
    active_cargo: AtomicI64,
    counters: Mutex<FlightCounters>,
    rngs: TaskRngs,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulationController {
    pub fn new(config: SimConfig, sink: Arc<dyn EventSink>) -> Self {
        let (shutdown, _) = broadcast::channel(8);
        let (pause, _) = watch::channel(false);

        let mut runways = HashMap::new();
        for id in RunwayId::ALL {
            runways.insert(id, Arc::new(Mutex::new(Runway::new(id))));
        }

        let airlines = default_roster()
            .iter()
            .map(|spec| {
                (
                    spec.name.to_string(),
                    Arc::new(Mutex::new(Airline::from_spec(spec))),
                )
            })
            .collect();

        let master_seed = config.master_seed;
        Self {
            config,
            clock: Mutex::new(SimClock::new(0.0)),
            runways,
            flights: Mutex::new(HashMap::new()),
            airlines,
            monitor: Arc::new(Mutex::new(SpeedMonitor::new())),
            arbiter: Mutex::new(RunwayArbiter::new()),
            bridge: Mutex::new(None),
            sink,
            shutdown,
            pause,
            running: AtomicBool::new(false),
            active_cargo: AtomicI64::new(0),
            counters: Mutex::new(FlightCounters::default()),
            rngs: TaskRngs::new(master_seed),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Validate configuration and arm the clock. Must run before
    /// `start`; a failure here is fatal to the process.
    pub async fn initialize(&self) -> Result<()> {
        if self.config.duration_secs <= 0.0 {
            anyhow::bail!("simulation duration must be positive");
        }
        for direction in Direction::ALL {
            let p = self.config.emergency_odds.probability(direction);
            if !(0.0..=1.0).contains(&p) {
                anyhow::bail!("emergency probability for {} out of range: {}", direction, p);
            }
        }

        *self.clock.lock().await = SimClock::new(self.config.duration_secs);
        info!(
            "[CONTROLLER] Initialized: {} airlines, {} runways, {}s horizon",
            self.airlines.len(),
            self.runways.len(),
            self.config.duration_secs
        );
        Ok(())
    }

    /// Wire the billing collaborator streams in before `start`.
    pub async fn attach_bridge<W, R>(&self, writer: W, reader: R)
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (bridge, writer_handle, reader_handle) = IpcBridge::spawn(
            writer,
            reader,
            self.monitor.clone(),
            self.sink.clone(),
            self.shutdown.clone(),
        );
        *self.bridge.lock().await = Some(bridge);
        let mut workers = self.workers.lock().await;
        workers.push(writer_handle);
        workers.push(reader_handle);
    }

    /// Spawn the four long-lived worker tasks.
    pub async fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sink.emit(&SimEvent::SimulationStarted {
            duration_secs: self.config.duration_secs,
        });

        let mut workers = self.workers.lock().await;
        workers.push(tokio::spawn(Self::simulation_task(self.clone())));
        workers.push(tokio::spawn(Self::generator_task(self.clone())));
        workers.push(tokio::spawn(Self::monitoring_task(self.clone())));
        workers.push(tokio::spawn(Self::retry_task(self.clone())));
    }

    pub fn pause(&self) {
        if self.running.load(Ordering::SeqCst) && !*self.pause.borrow() {
            self.pause.send_replace(true);
            self.sink.emit(&SimEvent::SimulationPaused);
        }
    }

    pub fn resume(&self) {
        if *self.pause.borrow() {
            self.pause.send_replace(false);
            self.sink.emit(&SimEvent::SimulationResumed);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        *self.pause.borrow()
    }

    pub async fn current_time(&self) -> f64 {
        self.clock.lock().await.elapsed
    }

    pub async fn remaining_time(&self) -> f64 {
        self.clock.lock().await.remaining()
    }

    /// Terminate and join every worker. Also releases any task parked
    /// on the pause gate so it can observe the shutdown flag.
    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let at = self.clock.lock().await.elapsed;
            self.sink.emit(&SimEvent::SimulationStopped { at });
        }
        let _ = self.shutdown.send(());
        self.pause.send_replace(false);

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }

    /// Reset to a cold state. Only valid once stopped.
    pub async fn reset(&self) -> SimResult<()> {
        if self.is_running() {
            return Err(SimError::precondition("cannot reset while running"));
        }
        *self.clock.lock().await = SimClock::new(self.config.duration_secs);
        self.flights.lock().await.clear();
        *self.arbiter.lock().await = RunwayArbiter::new();
        *self.monitor.lock().await = SpeedMonitor::new();
        for (id, runway) in &self.runways {
            *runway.lock().await = Runway::new(*id);
        }
        for (_, airline) in &self.airlines {
            airline.lock().await.reset();
        }
        self.active_cargo.store(0, Ordering::SeqCst);
        *self.counters.lock().await = FlightCounters::default();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Worker bodies. Each loop is one `tokio::select!` over shutdown
    // and its interval, with a pause gate at the top of the cycle.
    // ------------------------------------------------------------------

    async fn simulation_task(controller: Arc<Self>) {
        let mut shutdown = controller.shutdown.subscribe();
        let mut ticker = interval(Duration::from_millis(controller.config.tick_ms));
        // dt is capped at 100 ms regardless of the configured tick.
        let dt = (controller.config.tick_ms as f64 / 1000.0).min(0.1);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if controller.wait_if_paused().await {
                        break;
                    }
                    if controller.tick(dt).await {
                        break;
                    }
                }
            }
        }
        debug!("[CONTROLLER] Simulation task drained");
    }

    async fn generator_task(controller: Arc<Self>) {
        let mut shutdown = controller.shutdown.subscribe();
        let mut ticker = interval(Duration::from_millis(controller.config.generator_ms));

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if controller.wait_if_paused().await {
                        break;
                    }
                    controller.generator_cycle().await;
                }
            }
        }
        debug!("[CONTROLLER] Generator task drained");
    }

    async fn monitoring_task(controller: Arc<Self>) {
        let mut shutdown = controller.shutdown.subscribe();
        let mut ticker = interval(Duration::from_millis(controller.config.monitor_ms));

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if controller.wait_if_paused().await {
                        break;
                    }
                    controller.monitor_cycle().await;
                }
            }
        }
        debug!("[CONTROLLER] Monitoring task drained");
    }

    async fn retry_task(controller: Arc<Self>) {
        let mut shutdown = controller.shutdown.subscribe();
        let mut ticker = interval(Duration::from_millis(controller.config.retry_ms));

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if controller.wait_if_paused().await {
                        break;
                    }
                    controller.retry_cycle().await;
                }
            }
        }
        debug!("[CONTROLLER] Retry task drained");
    }

    /// Block while paused. Returns true if shutdown arrived meanwhile.
    async fn wait_if_paused(&self) -> bool {
        let mut rx = self.pause.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        while *rx.borrow() {
            tokio::select! {
                _ = shutdown.recv() => return true,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
            }
        }
        !self.running.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Cycle bodies, public so tests can drive them deterministically.
    // ------------------------------------------------------------------

    /// One fixed-timestep update: clock, runways, flights, monitor.
    /// Returns true once the configured duration has elapsed.
    pub async fn tick(&self, dt: f64) -> bool {
        let dt = dt.min(0.1);
        let (now, expired) = self.clock.lock().await.advance(dt);

        for runway in self.runways.values() {
            runway.lock().await.update(dt);
        }

        let handles: Vec<Arc<Mutex<Flight>>> =
            self.flights.lock().await.values().cloned().collect();

        for handle in handles {
            self.update_flight(&handle, dt, now).await;
        }

        if expired {
            info!("[CONTROLLER] Simulation duration elapsed");
            self.running.store(false, Ordering::SeqCst);
            self.sink.emit(&SimEvent::SimulationStopped { at: now });
            let _ = self.shutdown.send(());
        }
        expired
    }

    async fn update_flight(&self, handle: &Arc<Mutex<Flight>>, dt: f64, now: f64) {
        let mut rng = self.rngs.sim.lock().await;

        // Flight lock: run the update, then observe speed under the
        // monitor lock (flight < monitor in the lock order).
        let (outcome, flight_id, airline_name, kind, reason, violation) = {
            let mut flight = handle.lock().await;
            if flight.is_terminal() {
                return;
            }
            let outcome = flight.update(dt, now, &mut *rng);

            let violation = if matches!(
                flight.status,
                FlightStatus::Active | FlightStatus::Emergency
            ) {
                let mut monitor = self.monitor.lock().await;
                monitor.monitor(&mut flight.aircraft)
            } else {
                None
            };

            (
                outcome,
                flight.id.clone(),
                flight.aircraft.airline.clone(),
                flight.aircraft.kind,
                flight.status_reason.clone(),
                violation,
            )
        };

        // Everything below runs with the flight lock released.
        if let Some(record) = violation {
            self.sink.emit(&SimEvent::ViolationIssued {
                avn_id: record.avn_id,
                flight_id: flight_id.clone(),
                speed: record.recorded_speed,
            });
            if let Some(airline) = self.airline_by_name(&airline_name) {
                airline.lock().await.record_violation();
            }
            if let Some(bridge) = self.bridge.lock().await.as_ref() {
                bridge.send(IpcRecord::avn_created(&record));
            }
        }

        if let Some(runway_id) = outcome.released_runway {
            self.release_runway_entity(runway_id, &flight_id, now).await;
        }

        if outcome.phase_advanced {
            let phase = handle.lock().await.aircraft.phase;
            self.sink.emit(&SimEvent::PhaseAdvanced {
                flight_id: flight_id.clone(),
                phase,
            });
        }

        if outcome.completed {
            self.counters.lock().await.completed += 1;
            self.sink.emit(&SimEvent::FlightCompleted {
                flight_id: flight_id.clone(),
            });
            self.retire_flight(&flight_id, &airline_name, kind).await;
        } else if outcome.canceled {
            self.counters.lock().await.canceled += 1;
            self.sink.emit(&SimEvent::FlightCanceled {
                flight_id: flight_id.clone(),
                reason: reason.unwrap_or_else(|| "unspecified".into()),
            });
            self.retire_flight(&flight_id, &airline_name, kind).await;
        }

        // A fatal plan inconsistency aborts the whole simulation.
        if let Some(detail) = &outcome.fatal {
            error!("[CONTROLLER] {}", detail);
            self.running.store(false, Ordering::SeqCst);
            let _ = self.shutdown.send(());
        }
    }

    /// Bookkeeping shared by every terminal transition.
    async fn retire_flight(&self, flight_id: &str, airline_name: &str, kind: AircraftKind) {
        if let Some(airline) = self.airline_by_name(airline_name) {
            airline.lock().await.release_aircraft(flight_id);
        }
        self.monitor.lock().await.forget(flight_id);
        self.arbiter.lock().await.remove(flight_id);
        if kind == AircraftKind::Cargo {
            self.active_cargo.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn release_runway_entity(&self, runway_id: RunwayId, flight_id: &str, now: f64) {
        if let Some(runway) = self.runways.get(&runway_id) {
            match runway.lock().await.release(flight_id, now) {
                Ok(()) => {
                    self.sink.emit(&SimEvent::RunwayReleased {
                        flight_id: flight_id.to_string(),
                        runway: runway_id,
                    });
                }
                Err(err) => warn!("[ARBITER] Release failed: {}", err),
            }
        }
        // A freed runway immediately pulls the next queued flight.
        self.assign_from_queue(runway_id, now).await;
    }

    /// Walk every airline x direction pair, then run the assignment
    /// pass and the cargo-presence check.
    pub async fn generator_cycle(&self) {
        let now = self.clock.lock().await.elapsed;

        for (_, airline) in &self.airlines {
            for direction in Direction::ALL {
                let scheduled = {
                    let mut rng = self.rngs.generator.lock().await;
                    let mut guard = airline.lock().await;
                    guard.schedule_if_needed(
                        now,
                        direction,
                        &self.config.cadence,
                        &self.config.emergency_odds,
                        &mut *rng,
                    )
                };
                if let Some((aircraft, emergency)) = scheduled {
                    self.admit_flight(Flight::new(aircraft, now, emergency), now)
                        .await;
                }
            }
        }

        self.assignment_pass(now).await;
        self.ensure_cargo_presence(now).await;
    }

    /// Register a new flight and queue it with the arbiter. The
    /// emergency flag comes from the caller: the generator's sampled
    /// roll, never the airframe kind.
    async fn admit_flight(&self, flight: Flight, now: f64) {
        let pending = PendingFlight {
            flight_id: flight.id.clone(),
            kind: flight.aircraft.kind,
            direction: flight.aircraft.direction,
            is_emergency: flight.is_emergency,
            scheduled_at: now,
        };
        self.sink.emit(&SimEvent::FlightScheduled {
            flight_id: flight.id.clone(),
            airline: flight.aircraft.airline.clone(),
            emergency: flight.is_emergency,
        });
        if flight.aircraft.kind == AircraftKind::Cargo {
            self.active_cargo.fetch_add(1, Ordering::SeqCst);
        }

        self.flights
            .lock()
            .await
            .insert(flight.id.clone(), Arc::new(Mutex::new(flight)));
        self.arbiter.lock().await.enqueue(pending);
    }

    /// One scheduler pass: for each runway queue, pop the best pending
    /// flight and try its candidate runways, locking one runway at a
    /// time. Unplaceable flights land in the denied queue.
    pub async fn assignment_pass(&self, now: f64) {
        for queue_id in RunwayId::ALL {
            let pending = self.arbiter.lock().await.pop(queue_id);
            let Some(pending) = pending else { continue };
            self.place_or_deny(pending, now).await;
        }
    }

    async fn place_or_deny(&self, pending: PendingFlight, now: f64) {
        // The flight may have been canceled while queued.
        let Some(handle) = self.flights.lock().await.get(&pending.flight_id).cloned() else {
            return;
        };
        if handle.lock().await.is_terminal() {
            return;
        }

        for candidate in RunwayArbiter::candidates_for(&pending) {
            let Some(runway) = self.runways.get(&candidate) else {
                continue;
            };
            let assigned = runway
                .lock()
                .await
                .assign(&pending.flight_id, pending.kind, pending.direction, now)
                .is_ok();
            if !assigned {
                continue;
            }

            let mut flight = handle.lock().await;
            if flight.assign_runway(candidate).is_err() {
                // Shouldn't happen; hand the runway straight back.
                drop(flight);
                let _ = runway.lock().await.release(&pending.flight_id, now);
                return;
            }
            if matches!(flight.status, FlightStatus::Scheduled)
                || (flight.status == FlightStatus::Emergency && flight.activated_at.is_none())
            {
                if let Err(err) = flight.activate(now) {
                    warn!("[ARBITER] Activation failed for {}: {}", flight.id, err);
                }
            }
            drop(flight);

            self.sink.emit(&SimEvent::RunwayAssigned {
                flight_id: pending.flight_id.clone(),
                runway: candidate,
            });
            return;
        }

        let denial = SimError::ResourceUnavailable {
            flight: pending.flight_id.clone(),
        };
        debug!("[ARBITER] {}", denial);
        self.sink.emit(&SimEvent::RunwayDenied {
            flight_id: pending.flight_id.clone(),
        });
        self.arbiter.lock().await.push_denied(pending);
    }

    /// Pull the next queued flight for a runway that just freed up.
    async fn assign_from_queue(&self, runway_id: RunwayId, now: f64) {
        let pending = self.arbiter.lock().await.pop(runway_id);
        if let Some(pending) = pending {
            self.place_or_deny(pending, now).await;
        }
    }

    /// Keep at least one non-terminal cargo flight alive: first cargo
    /// airline with room wins, commercial carriers are drafted with a
    /// forced cargo airframe if none has.
    async fn ensure_cargo_presence(&self, now: f64) {
        if self.active_cargo.load(Ordering::SeqCst) > 0 {
            return;
        }

        let mut created: Option<Flight> = None;
        for (_, airline) in &self.airlines {
            let mut rng = self.rngs.generator.lock().await;
            let mut guard = airline.lock().await;
            if guard.primary_kind != AircraftKind::Cargo {
                continue;
            }
            let direction = Direction::ALL[rng.gen_range(0..Direction::ALL.len())];
            if let Ok(aircraft) = guard.create_cargo_aircraft(direction, &mut *rng) {
                created = Some(Flight::new(aircraft, now, false));
                break;
            }
        }
        if created.is_none() {
            for (_, airline) in &self.airlines {
                let mut rng = self.rngs.generator.lock().await;
                let mut guard = airline.lock().await;
                if guard.primary_kind != AircraftKind::Commercial {
                    continue;
                }
                let direction = Direction::ALL[rng.gen_range(0..Direction::ALL.len())];
                if let Ok(aircraft) = guard.create_cargo_aircraft(direction, &mut *rng) {
                    created = Some(Flight::new(aircraft, now, false));
                    break;
                }
            }
        }

        let Some(flight) = created else {
            debug!("[GENERATOR] No airline has room for a cargo backfill");
            return;
        };
        let flight_id = flight.id.clone();
        let kind = flight.aircraft.kind;
        let direction = flight.aircraft.direction;
        self.admit_flight(flight, now).await;
        self.sink.emit(&SimEvent::CargoBackfilled {
            flight_id: flight_id.clone(),
        });

        // Try RWY-C immediately; if it's busy the queued entry will be
        // picked up by a later pass.
        let assigned = self.runways[&RunwayId::C]
            .lock()
            .await
            .assign(&flight_id, kind, direction, now)
            .is_ok();
        if assigned {
            let handle = self.flights.lock().await.get(&flight_id).cloned();
            if let Some(handle) = handle {
                let mut flight = handle.lock().await;
                if flight.assign_runway(RunwayId::C).is_ok() {
                    let _ = flight.activate(now);
                }
            }
            self.arbiter.lock().await.remove(&flight_id);
            self.sink.emit(&SimEvent::RunwayAssigned {
                flight_id,
                runway: RunwayId::C,
            });
        }
    }

    /// Monitoring cycle: promote escalated flights in the queues,
    /// reconcile the cargo counter, and log statistics.
    pub async fn monitor_cycle(&self) {
        // Emergency prioritization for flights escalated after they
        // were queued.
        let escalated: Vec<String> = {
            let flights = self.flights.lock().await;
            let mut ids = Vec::new();
            for (id, handle) in flights.iter() {
                let flight = handle.lock().await;
                if flight.is_emergency && !flight.is_terminal() && flight.runway.is_none() {
                    ids.push(id.clone());
                }
            }
            ids
        };
        {
            let mut arbiter = self.arbiter.lock().await;
            for id in escalated {
                arbiter.promote_to_emergency(&id);
            }
        }

        // Reconcile the cargo counter against the flight list.
        let actual = {
            let flights = self.flights.lock().await;
            let mut count: i64 = 0;
            for handle in flights.values() {
                let flight = handle.lock().await;
                if flight.aircraft.kind == AircraftKind::Cargo && !flight.is_terminal() {
                    count += 1;
                }
            }
            count
        };
        let tracked = self.active_cargo.swap(actual, Ordering::SeqCst);
        if tracked != actual {
            warn!(
                "[MONITOR] Cargo counter drifted: tracked {} actual {}",
                tracked, actual
            );
        }

        let queued = self.arbiter.lock().await.total_queued();
        debug!(
            "[MONITOR] t={:.1}s cargo={} queued={}",
            self.clock.lock().await.elapsed,
            actual,
            queued
        );
    }

    /// Retry up to the configured number of denied flights.
    pub async fn retry_cycle(&self) {
        let now = self.clock.lock().await.elapsed;
        let batch = self
            .arbiter
            .lock()
            .await
            .take_denied(self.config.max_denied_retries);
        for pending in batch {
            self.place_or_deny(pending, now).await;
        }
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    pub async fn control(self: Arc<Self>, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Start => {
                self.clone().start().await;
                ControlResponse::Ok
            }
            ControlRequest::Pause => {
                self.pause();
                ControlResponse::Ok
            }
            ControlRequest::Resume => {
                self.resume();
                ControlResponse::Ok
            }
            ControlRequest::Stop => {
                self.stop().await;
                ControlResponse::Ok
            }
            ControlRequest::Status => ControlResponse::Status(Box::new(self.status().await)),
            ControlRequest::ListAvns => {
                let monitor = self.monitor.lock().await;
                let now = chrono::Utc::now();
                ControlResponse::Avns(
                    monitor
                        .unpaid()
                        .into_iter()
                        .map(|r| AvnSummary::from_record(r, now))
                        .collect(),
                )
            }
            ControlRequest::PayAvn { avn_id, amount } => match self.pay_avn(avn_id, amount).await {
                Ok(()) => ControlResponse::Ok,
                Err(err) => ControlResponse::Error(err.to_string()),
            },
            ControlRequest::QueryAirline { name } => {
                let monitor = self.monitor.lock().await;
                let now = chrono::Utc::now();
                ControlResponse::Avns(
                    monitor
                        .for_airline(&name)
                        .into_iter()
                        .map(|r| AvnSummary::from_record(r, now))
                        .collect(),
                )
            }
            ControlRequest::CloseRunway { runway, status } => {
                let now = self.clock.lock().await.elapsed;
                match self.runways.get(&runway) {
                    Some(handle) => match handle.lock().await.set_status(status, now) {
                        Ok(()) => ControlResponse::Ok,
                        Err(err) => ControlResponse::Error(err.to_string()),
                    },
                    None => ControlResponse::Error(format!("unknown runway {}", runway)),
                }
            }
            ControlRequest::ReopenRunway { runway } => {
                let now = self.clock.lock().await.elapsed;
                match self.runways.get(&runway) {
                    Some(handle) => {
                        match handle.lock().await.set_status(RunwayStatus::Available, now) {
                            Ok(()) => ControlResponse::Ok,
                            Err(err) => ControlResponse::Error(err.to_string()),
                        }
                    }
                    None => ControlResponse::Error(format!("unknown runway {}", runway)),
                }
            }
        }
    }

    /// Divert an active or emergency flight, releasing its runway.
    pub async fn divert_flight(&self, flight_id: &str, reason: &str) -> SimResult<()> {
        let handle = self.flight(flight_id).await.ok_or_else(|| {
            SimError::precondition(format!("unknown flight {}", flight_id))
        })?;

        let (released, airline_name, kind) = {
            let mut flight = handle.lock().await;
            let released = flight.divert(reason)?;
            (
                released,
                flight.aircraft.airline.clone(),
                flight.aircraft.kind,
            )
        };

        let now = self.clock.lock().await.elapsed;
        if let Some(runway_id) = released {
            self.release_runway_entity(runway_id, flight_id, now).await;
        }
        self.counters.lock().await.diverted += 1;
        self.sink.emit(&SimEvent::FlightDiverted {
            flight_id: flight_id.to_string(),
            reason: reason.to_string(),
        });
        self.retire_flight(flight_id, &airline_name, kind).await;
        Ok(())
    }

    /// Submit a payment request for an unpaid AVN over the bridge.
    pub async fn pay_avn(&self, avn_id: u32, amount: f64) -> SimResult<()> {
        let (airline, flight) = {
            let monitor = self.monitor.lock().await;
            let record = monitor.record(avn_id).ok_or_else(|| {
                SimError::precondition(format!("unknown AVN #{}", avn_id))
            })?;
            if record.status == crate::monitor::PaymentStatus::Paid {
                return Err(SimError::precondition(format!(
                    "AVN #{} is already paid",
                    avn_id
                )));
            }
            (record.airline.clone(), record.flight_id.clone())
        };

        let bridge = self.bridge.lock().await;
        let bridge = bridge
            .as_ref()
            .ok_or_else(|| SimError::precondition("no billing collaborator attached"))?;
        bridge.send(IpcRecord::payment_request(avn_id, &airline, &flight, amount));
        Ok(())
    }

    /// Snapshot for the status report. Takes each lock briefly, one at
    /// a time.
    pub async fn status(&self) -> StatusReport {
        let (sim_time, remaining) = {
            let clock = self.clock.lock().await;
            (clock.elapsed, clock.remaining())
        };

        let mut runway_reports = Vec::new();
        for id in RunwayId::ALL {
            let runway = self.runways[&id].lock().await;
            runway_reports.push(RunwayReport {
                id,
                status: runway.status,
                occupant: runway.occupant.clone(),
                usage_count: runway.usage_count,
                total_occupancy_secs: runway.total_occupancy_secs,
            });
        }

        let (active_flights, scheduled_flights) = {
            let flights = self.flights.lock().await;
            let mut active = 0;
            let mut scheduled = 0;
            for handle in flights.values() {
                match handle.lock().await.status {
                    FlightStatus::Active | FlightStatus::Emergency => active += 1,
                    FlightStatus::Scheduled => scheduled += 1,
                    _ => {}
                }
            }
            (active, scheduled)
        };

        let counters = self.counters.lock().await;
        let (completed, canceled, diverted) =
            (counters.completed, counters.canceled, counters.diverted);
        drop(counters);

        let (queued, denied_waiting, denied_total) = {
            let arbiter = self.arbiter.lock().await;
            (
                arbiter.total_queued(),
                arbiter.denied.len(),
                arbiter.denied_total,
            )
        };

        let monitor = self.monitor.lock().await;
        let violations_total = monitor.records.len() as u64;
        let unpaid_avns = monitor.unpaid().len() as u64;
        let mut violations_per_airline: Vec<(String, u64)> = monitor
            .violations_per_airline
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        violations_per_airline.sort();
        let mut fines_per_airline: Vec<(String, f64)> =
            monitor.calculate_fines().into_iter().collect();
        fines_per_airline.sort_by(|a, b| a.0.cmp(&b.0));
        drop(monitor);

        StatusReport {
            sim_time,
            remaining,
            running: self.is_running(),
            paused: self.is_paused(),
            active_flights,
            scheduled_flights,
            completed,
            canceled,
            diverted,
            queued,
            denied_waiting,
            denied_total,
            active_cargo: self.active_cargo.load(Ordering::SeqCst).max(0) as u64,
            violations_total,
            unpaid_avns,
            runways: runway_reports,
            violations_per_airline,
            fines_per_airline,
        }
    }

    fn airline_by_name(&self, name: &str) -> Option<Arc<Mutex<Airline>>> {
        self.airlines
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a.clone())
    }

    /// Test and scenario hook: direct handle to a flight.
    pub async fn flight(&self, flight_id: &str) -> Option<Arc<Mutex<Flight>>> {
        self.flights.lock().await.get(flight_id).cloned()
    }

    /// Test and scenario hook: direct handle to a runway.
    pub fn runway(&self, id: RunwayId) -> Arc<Mutex<Runway>> {
        self.runways[&id].clone()
    }

    pub fn monitor_handle(&self) -> Arc<Mutex<SpeedMonitor>> {
        self.monitor.clone()
    }

    /// Schedule one concrete flight (scenario setup and tests).
    pub async fn schedule_flight(
        &self,
        airline_name: &str,
        kind: AircraftKind,
        direction: Direction,
        emergency: bool,
    ) -> SimResult<String> {
        let now = self.clock.lock().await.elapsed;
        let airline = self.airline_by_name(airline_name).ok_or_else(|| {
            SimError::precondition(format!("unknown airline {}", airline_name))
        })?;

        let aircraft = {
            let mut rng = self.rngs.generator.lock().await;
            let mut guard = airline.lock().await;
            guard.create_aircraft_of_kind(kind, direction, &mut *rng)?
        };
        let flight = Flight::new(aircraft, now, emergency);
        let id = flight.id.clone();
        self.admit_flight(flight, now).await;
        Ok(id)
    }
}

// ----------------------------------------------------------------------
// Control surface types
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    Start,
    Pause,
    Resume,
    Stop,
    Status,
    ListAvns,
    PayAvn { avn_id: u32, amount: f64 },
    QueryAirline { name: String },
    CloseRunway { runway: RunwayId, status: RunwayStatus },
    ReopenRunway { runway: RunwayId },
}

impl ControlRequest {
    /// Parse one operator line, e.g. `pay-avn 1000 575000`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let command = parts.next()?;
        match command {
            "start" => Some(ControlRequest::Start),
            "pause" => Some(ControlRequest::Pause),
            "resume" => Some(ControlRequest::Resume),
            "stop" => Some(ControlRequest::Stop),
            "status" => Some(ControlRequest::Status),
            "list-avns" => Some(ControlRequest::ListAvns),
            "pay-avn" => {
                let avn_id = parts.next()?.parse().ok()?;
                let amount = parts.next()?.parse().ok()?;
                Some(ControlRequest::PayAvn { avn_id, amount })
            }
            "query-airline" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                if name.is_empty() {
                    None
                } else {
                    Some(ControlRequest::QueryAirline { name })
                }
            }
            "close-runway" => {
                let runway = parse_runway(parts.next()?)?;
                let status = match parts.next() {
                    Some("weather") => RunwayStatus::WeatherClosed,
                    _ => RunwayStatus::Maintenance,
                };
                Some(ControlRequest::CloseRunway { runway, status })
            }
            "reopen-runway" => {
                let runway = parse_runway(parts.next()?)?;
                Some(ControlRequest::ReopenRunway { runway })
            }
            _ => None,
        }
    }
}

fn parse_runway(token: &str) -> Option<RunwayId> {
    match token.to_ascii_uppercase().as_str() {
        "A" | "RWY-A" => Some(RunwayId::A),
        "B" | "RWY-B" => Some(RunwayId::B),
        "C" | "RWY-C" => Some(RunwayId::C),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ControlResponse {
    Ok,
    Status(Box<StatusReport>),
    Avns(Vec<AvnSummary>),
    Error(String),
}

/// One row of `list-avns` / `query-airline` output.
#[derive(Debug, Clone)]
pub struct AvnSummary {
    pub avn_id: u32,
    pub flight_id: String,
    pub airline: String,
    pub total: f64,
    pub status: crate::monitor::PaymentStatus,
    pub due_by: chrono::DateTime<chrono::Utc>,
}

impl AvnSummary {
    fn from_record(
        record: &crate::monitor::ViolationRecord,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            avn_id: record.avn_id,
            flight_id: record.flight_id.clone(),
            airline: record.airline.clone(),
            total: record.total,
            status: record.effective_status(now),
            due_by: record.due_by,
        }
    }
}

impl std::fmt::Display for AvnSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AVN #{} {} ({}) total {:.0} [{}] due {}",
            self.avn_id,
            self.flight_id,
            self.airline,
            self.total,
            self.status,
            self.due_by.format("%Y-%m-%d")
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunwayReport {
    pub id: RunwayId,
    pub status: RunwayStatus,
    pub occupant: Option<String>,
    pub usage_count: u64,
    pub total_occupancy_secs: f64,
}

/// Point-in-time snapshot returned by the `status` request.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub sim_time: f64,
    pub remaining: f64,
    pub running: bool,
    pub paused: bool,
    pub active_flights: u64,
    pub scheduled_flights: u64,
    pub completed: u64,
    pub canceled: u64,
    pub diverted: u64,
    pub queued: usize,
    pub denied_waiting: usize,
    pub denied_total: u64,
    pub active_cargo: u64,
    pub violations_total: u64,
    pub unpaid_avns: u64,
    pub runways: Vec<RunwayReport>,
    pub violations_per_airline: Vec<(String, u64)>,
    pub fines_per_airline: Vec<(String, f64)>,
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Simulation t={:.1}s (remaining {:.1}s) running={} paused={}",
            self.sim_time, self.remaining, self.running, self.paused
        )?;
        writeln!(
            f,
            "Flights: {} active, {} scheduled, {} completed, {} canceled, {} diverted",
            self.active_flights, self.scheduled_flights, self.completed, self.canceled,
            self.diverted
        )?;
        writeln!(
            f,
            "Queues: {} waiting, {} denied-waiting ({} denials total), cargo active {}",
            self.queued, self.denied_waiting, self.denied_total, self.active_cargo
        )?;
        for runway in &self.runways {
            writeln!(
                f,
                "  {}: {} occupant={} uses={} occupied={:.1}s",
                runway.id,
                runway.status,
                runway.occupant.as_deref().unwrap_or("-"),
                runway.usage_count,
                runway.total_occupancy_secs
            )?;
        }
        writeln!(
            f,
            "Violations: {} total, {} unpaid",
            self.violations_total, self.unpaid_avns
        )?;
        for (airline, count) in &self.violations_per_airline {
            let fines = self
                .fines_per_airline
                .iter()
                .find(|(name, _)| name == airline)
                .map(|(_, f)| *f)
                .unwrap_or(0.0);
            writeln!(f, "  {}: {} violations, fines {:.0}", airline, count, fines)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingSink;

    #[test]
    fn parse_control_lines() {
        assert_eq!(ControlRequest::parse("start"), Some(ControlRequest::Start));
        assert_eq!(ControlRequest::parse("pause"), Some(ControlRequest::Pause));
        assert_eq!(
            ControlRequest::parse("pay-avn 1000 575000"),
            Some(ControlRequest::PayAvn {
                avn_id: 1000,
                amount: 575_000.0
            })
        );
        assert_eq!(
            ControlRequest::parse("query-airline Pakistan Airforce"),
            Some(ControlRequest::QueryAirline {
                name: "Pakistan Airforce".into()
            })
        );
        assert_eq!(
            ControlRequest::parse("close-runway C weather"),
            Some(ControlRequest::CloseRunway {
                runway: RunwayId::C,
                status: RunwayStatus::WeatherClosed
            })
        );
        assert_eq!(
            ControlRequest::parse("reopen-runway rwy-b"),
            Some(ControlRequest::ReopenRunway {
                runway: RunwayId::B
            })
        );
        assert_eq!(ControlRequest::parse("pay-avn"), None);
        assert_eq!(ControlRequest::parse("query-airline"), None);
        assert_eq!(ControlRequest::parse("bogus"), None);
        assert_eq!(ControlRequest::parse(""), None);
    }

    async fn test_controller() -> Arc<SimulationController> {
        let controller = Arc::new(SimulationController::new(
            SimConfig {
                master_seed: 7,
                ..SimConfig::default()
            },
            Arc::new(CollectingSink::new()),
        ));
        controller.initialize().await.unwrap();
        controller
    }

    #[tokio::test]
    async fn pay_avn_rejects_unknown_and_missing_bridge() {
        let controller = test_controller().await;
        assert!(controller.pay_avn(4242, 100.0).await.is_err());

        // Known AVN but no collaborator attached.
        let flight_id = controller
            .schedule_flight(
                "PIA",
                AircraftKind::Commercial,
                Direction::North,
                false,
            )
            .await
            .unwrap();
        controller.assignment_pass(0.0).await;
        let handle = controller.flight(&flight_id).await.unwrap();
        handle.lock().await.aircraft.set_speed(700.0);
        controller.tick(0.1).await;

        let avn_id = {
            let monitor = controller.monitor.lock().await;
            monitor.records[0].avn_id
        };
        assert!(controller.pay_avn(avn_id, 575_000.0).await.is_err());
    }

    #[tokio::test]
    async fn divert_releases_runway_and_counts() {
        let controller = test_controller().await;
        let flight_id = controller
            .schedule_flight(
                "Blue Dart",
                AircraftKind::Cargo,
                Direction::North,
                false,
            )
            .await
            .unwrap();
        controller.assignment_pass(0.0).await;

        controller
            .divert_flight(&flight_id, "weather below minima")
            .await
            .unwrap();

        let status = controller.status().await;
        assert_eq!(status.diverted, 1);
        let runway_c = controller.runway(RunwayId::C);
        assert_eq!(runway_c.lock().await.status, RunwayStatus::Available);

        // Terminal flights cannot be diverted again.
        assert!(controller
            .divert_flight(&flight_id, "again")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn emergency_status_follows_sampled_odds_not_kind() {
        use crate::config::EmergencyOdds;

        // Odds pinned to zero: even the emergency-primary carriers
        // fly regular plans.
        let controller = Arc::new(SimulationController::new(
            SimConfig {
                master_seed: 11,
                emergency_odds: EmergencyOdds {
                    north: 0.0,
                    south: 0.0,
                    east: 0.0,
                    west: 0.0,
                },
                ..SimConfig::default()
            },
            Arc::new(CollectingSink::new()),
        ));
        controller.initialize().await.unwrap();
        controller.generator_cycle().await;

        let flights = controller.flights.lock().await;
        assert!(!flights.is_empty());
        let mut saw_emergency_kind = false;
        for handle in flights.values() {
            let flight = handle.lock().await;
            assert!(!flight.is_emergency, "flight {} escalated", flight.id);
            assert!(!flight.plan.emergency);
            saw_emergency_kind |= flight.aircraft.kind == AircraftKind::Emergency;
        }
        assert!(saw_emergency_kind);
    }

    #[tokio::test]
    async fn certain_odds_escalate_every_scheduled_flight() {
        use crate::config::EmergencyOdds;

        let controller = Arc::new(SimulationController::new(
            SimConfig {
                master_seed: 12,
                emergency_odds: EmergencyOdds {
                    north: 1.0,
                    south: 1.0,
                    east: 1.0,
                    west: 1.0,
                },
                ..SimConfig::default()
            },
            Arc::new(CollectingSink::new()),
        ));
        controller.initialize().await.unwrap();
        controller.generator_cycle().await;

        let flights = controller.flights.lock().await;
        assert!(!flights.is_empty());
        for handle in flights.values() {
            let flight = handle.lock().await;
            // The cargo-presence backfill is the one non-sampled
            // admission path.
            if flight.aircraft.kind == AircraftKind::Cargo {
                continue;
            }
            assert!(flight.is_emergency, "flight {} not escalated", flight.id);
            assert!(flight.plan.emergency);
        }
    }

    #[tokio::test]
    async fn initialize_rejects_bad_duration() {
        let controller = Arc::new(SimulationController::new(
            SimConfig {
                duration_secs: 0.0,
                ..SimConfig::default()
            },
            Arc::new(CollectingSink::new()),
        ));
        assert!(controller.initialize().await.is_err());
    }
}
