pub mod aircraft;
pub mod phase;

pub use aircraft::Aircraft;
pub use phase::{AircraftKind, Direction, Phase};
