pub mod aircraft;
pub mod airline;
pub mod arbiter;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod flight;
pub mod ipc;
pub mod monitor;
pub mod runway;

pub use config::SimConfig;
pub use controller::{ControlRequest, ControlResponse, SimulationController};
pub use error::{SimError, SimResult};
