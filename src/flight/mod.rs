pub mod flight;
pub mod plan;

pub use flight::{Flight, FlightStatus, FlightUpdate};
pub use plan::{FlightPlan, FlightPlanStep, PlanAction, PlanKind};
