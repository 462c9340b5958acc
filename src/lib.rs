//! Tectonic planet generation library
//!
//! Re-exports modules for use by the binary and by collaborators that drive
//! the stages themselves.

pub mod climate;
pub mod erosion;
pub mod error;
pub mod heightmap;
pub mod planet;
pub mod plates;
pub mod rules;
pub mod seeds;
pub mod sphere;
pub mod tilemap;
pub mod world;

pub use climate::{simulate_rainfall, SeasonalRainfall};
pub use erosion::{route_water, ErosionResult};
pub use error::{PlanetError, Result};
pub use heightmap::synthesize_altitude;
pub use planet::{generate_planet, Planet, PlanetRules, PlanetStats};
pub use plates::{generate_plates, move_plates};
pub use rules::{AltitudeRules, BaseRules, ErosionRules, GenerateRules, MoveRules, RainfallRules};
pub use seeds::WorldSeeds;
pub use sphere::{GridCoordinate, SphereGrid};
pub use tilemap::Tilemap;
pub use world::PlateWorld;
