//! Tectonic plates
//!
//! - [`generation`]: seeds plates from thresholded noise and grows them to
//!   cover the sphere
//! - [`movement`]: rotates plates step by step and resolves the overlaps
//!   and gaps the motion creates

pub mod expansion;
pub mod generation;
pub mod movement;
pub mod overlap;
pub mod types;

pub use generation::generate_plates;
pub use movement::{move_plates, step, StepReport};
pub use types::{BoundaryHistory, Crust, Plate, PlateId, PlateKinematics, PlatePoint};
