pub mod runway;

pub use runway::{Runway, RunwayId, RunwayStatus};
