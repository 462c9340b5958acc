//! Spherical grid geometry
//!
//! The planet surface is an equirectangular grid of `2 * half_width` columns
//! by `height` rows. Columns wrap at the date line and rows wrap over the
//! poles onto the antipodal longitude, so every cell has exactly four
//! neighbours.
//!
//! - [`GridCoordinate`]: the canonical integer cell address
//! - [`AngularPoint`]: cached spherical angles for a cell or a rotated position
//! - [`Rotation`]: rigid rotations about an arbitrary axis
//! - [`SphereGrid`]: the geometry context shared by every stage

pub mod angular;
pub mod coord;
pub mod grid;

pub use angular::{small_angle_cos, AngularPoint, Rotation, RotationAngles, SMALL_ANGLE_EPSILON};
pub use coord::GridCoordinate;
pub use grid::{CellBounds, SphereGrid};
