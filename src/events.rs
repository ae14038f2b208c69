use tracing::{info, warn};

use crate::aircraft::Phase;
use crate::runway::RunwayId;

/// Structured happenings the core emits instead of printing to the
/// terminal. The operator UI is an external collaborator; it consumes
/// these through whatever sink it plugs in.
#[derive(Debug, Clone)]
pub enum SimEvent {
    SimulationStarted { duration_secs: f64 },
    SimulationPaused,
    SimulationResumed,
    SimulationStopped { at: f64 },
    FlightScheduled { flight_id: String, airline: String, emergency: bool },
    RunwayAssigned { flight_id: String, runway: RunwayId },
    RunwayReleased { flight_id: String, runway: RunwayId },
    RunwayDenied { flight_id: String },
    PhaseAdvanced { flight_id: String, phase: Phase },
    FlightCompleted { flight_id: String },
    FlightCanceled { flight_id: String, reason: String },
    FlightDiverted { flight_id: String, reason: String },
    ViolationIssued { avn_id: u32, flight_id: String, speed: f64 },
    PaymentConfirmed { avn_id: u32 },
    CargoBackfilled { flight_id: String },
    IpcError { detail: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SimEvent);
}

/// Default sink: forwards everything to `tracing` with the usual
/// bracket tags.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SimEvent) {
        match event {
            SimEvent::SimulationStarted { duration_secs } => {
                info!("[CONTROLLER] Simulation started ({}s)", duration_secs)
            }
            SimEvent::SimulationPaused => info!("[CONTROLLER] Paused"),
            SimEvent::SimulationResumed => info!("[CONTROLLER] Resumed"),
            SimEvent::SimulationStopped { at } => {
                info!("[CONTROLLER] Stopped at t={:.1}s", at)
            }
            SimEvent::FlightScheduled {
                flight_id,
                airline,
                emergency,
            } => {
                if *emergency {
                    info!("[GENERATOR] Scheduled EMERGENCY flight {} ({})", flight_id, airline)
                } else {
                    info!("[GENERATOR] Scheduled flight {} ({})", flight_id, airline)
                }
            }
            SimEvent::RunwayAssigned { flight_id, runway } => {
                info!("[ARBITER] {} assigned to {}", flight_id, runway)
            }
            SimEvent::RunwayReleased { flight_id, runway } => {
                info!("[ARBITER] {} released {}", flight_id, runway)
            }
            SimEvent::RunwayDenied { flight_id } => {
                warn!("[ARBITER] No runway for {}, queued for retry", flight_id)
            }
            SimEvent::PhaseAdvanced { flight_id, phase } => {
                info!("[FLIGHT] {} entered {}", flight_id, phase)
            }
            SimEvent::FlightCompleted { flight_id } => {
                info!("[FLIGHT] {} completed", flight_id)
            }
            SimEvent::FlightCanceled { flight_id, reason } => {
                warn!("[FLIGHT] {} canceled: {}", flight_id, reason)
            }
            SimEvent::FlightDiverted { flight_id, reason } => {
                warn!("[FLIGHT] {} diverted: {}", flight_id, reason)
            }
            SimEvent::ViolationIssued {
                avn_id,
                flight_id,
                speed,
            } => {
                warn!("[MONITOR] AVN #{} issued to {} at {:.0} km/h", avn_id, flight_id, speed)
            }
            SimEvent::PaymentConfirmed { avn_id } => {
                info!("[IPC] Payment confirmed for AVN #{}", avn_id)
            }
            SimEvent::CargoBackfilled { flight_id } => {
                info!("[GENERATOR] Cargo presence restored with {}", flight_id)
            }
            SimEvent::IpcError { detail } => warn!("[IPC] {}", detail),
        }
    }
}

/// Test sink that records everything it sees.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: std::sync::Mutex<Vec<SimEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock().expect("sink poisoned").clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &SimEvent) {
        self.events.lock().expect("sink poisoned").push(event.clone());
    }
}
