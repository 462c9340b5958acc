use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};
use std::ops::{Add, AddAssign};

use crate::sphere::{GridCoordinate, RotationAngles};

/// Unique identifier for a tectonic plate; also its index in the plate list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PlateId(pub u16);

impl PlateId {
    pub const MAX_PLATES: usize = u16::MAX as usize;

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < Self::MAX_PLATES);
        PlateId(index as u16)
    }
}

impl std::fmt::Display for PlateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "plate {}", self.0)
    }
}

/// Rigid motion of a plate: a rotation axis and an angular speed per unit
/// time step.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateKinematics {
    pub axis_theta: f64,
    pub axis_phi: f64,
    /// Radians per unit time step.
    pub speed: f64,
}

impl PlateKinematics {
    pub fn new(axis_theta: f64, axis_phi: f64, speed: f64) -> Self {
        Self { axis_theta, axis_phi, speed }
    }

    /// Axis uniform on the sphere, speed up to `max_speed`.
    pub fn random(rng: &mut ChaCha8Rng, max_speed: f64) -> Self {
        let axis_theta = rng.gen_range(0.0..TAU);
        let axis_phi = rng.gen_range(-1.0f64..=1.0).asin();
        let speed = rng.gen_range(0.0..=max_speed);
        Self { axis_theta, axis_phi: axis_phi.clamp(-FRAC_PI_2, FRAC_PI_2), speed }
    }

    /// Rotation for one step of length `time_step`.
    pub fn step_angles(&self, time_step: f64) -> RotationAngles {
        RotationAngles::new(self.axis_theta, self.axis_phi, self.speed * time_step)
    }
}

/// Crust state of a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crust {
    /// Present since generation, not yet finalized. Counts as continental.
    Primordial,
    Continental,
    /// Created by re-expansion into a gap.
    Oceanic,
}

impl Crust {
    pub fn is_continental(self) -> bool {
        matches!(self, Crust::Primordial | Crust::Continental)
    }
}

/// Subduction events recorded at a point: how many it absorbed of each crust
/// type and the step of the latest one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoundaryHistory {
    pub continental_buildup: u32,
    pub continental_recency: u32,
    pub oceanic_buildup: u32,
    pub oceanic_recency: u32,
}

impl BoundaryHistory {
    pub fn record_subduction(&mut self, continental: bool, time: u32) {
        if continental {
            self.continental_buildup += 1;
            self.continental_recency = time;
        } else {
            self.oceanic_buildup += 1;
            self.oceanic_recency = time;
        }
    }

    /// Integer division of every field.
    pub fn divided_by(self, count: u32) -> Self {
        let count = count.max(1);
        Self {
            continental_buildup: self.continental_buildup / count,
            continental_recency: self.continental_recency / count,
            oceanic_buildup: self.oceanic_buildup / count,
            oceanic_recency: self.oceanic_recency / count,
        }
    }

    /// Weighted average, rounded to the nearest integer.
    pub fn weighted_mean(samples: &[(f64, BoundaryHistory)]) -> Self {
        let total: f64 = samples.iter().map(|(w, _)| w).sum();
        if samples.is_empty() || total <= 0.0 {
            return Self::default();
        }
        let mean = |field: fn(&BoundaryHistory) -> u32| -> u32 {
            let sum: f64 = samples.iter().map(|(w, h)| w * field(h) as f64).sum();
            (sum / total).round() as u32
        };
        Self {
            continental_buildup: mean(|h| h.continental_buildup),
            continental_recency: mean(|h| h.continental_recency),
            oceanic_buildup: mean(|h| h.oceanic_buildup),
            oceanic_recency: mean(|h| h.oceanic_recency),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.continental_buildup == 0 && self.oceanic_buildup == 0
    }
}

impl Add for BoundaryHistory {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            continental_buildup: self.continental_buildup + rhs.continental_buildup,
            continental_recency: self.continental_recency + rhs.continental_recency,
            oceanic_buildup: self.oceanic_buildup + rhs.oceanic_buildup,
            oceanic_recency: self.oceanic_recency + rhs.oceanic_recency,
        }
    }
}

impl AddAssign for BoundaryHistory {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// One cell's worth of plate material.
///
/// Points are values: moving or merging produces a new point rather than
/// editing one in place.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatePoint {
    pub position: GridCoordinate,
    /// Where the material was created.
    pub birthplace: GridCoordinate,
    /// Step at which the material was created.
    pub birth_time: u32,
    pub plate: PlateId,
    pub crust: Crust,
    pub history: BoundaryHistory,
}

impl PlatePoint {
    /// Material present since generation.
    pub fn primordial(position: GridCoordinate, plate: PlateId) -> Self {
        Self {
            position,
            birthplace: position,
            birth_time: 0,
            plate,
            crust: Crust::Primordial,
            history: BoundaryHistory::default(),
        }
    }

    /// Fresh oceanic crust filling a gap at step `time`.
    pub fn oceanic(position: GridCoordinate, plate: PlateId, time: u32) -> Self {
        Self {
            position,
            birthplace: position,
            birth_time: time,
            plate,
            crust: Crust::Oceanic,
            history: BoundaryHistory::default(),
        }
    }

    /// Same material at a new cell.
    pub fn relocated(&self, position: GridCoordinate) -> Self {
        Self { position, ..*self }
    }

    pub fn is_continental(&self) -> bool {
        self.crust.is_continental()
    }
}

/// A plate: its motion and the points it owns, kept in raster order.
#[derive(Clone, Debug, PartialEq)]
pub struct Plate {
    pub id: PlateId,
    pub kinematics: PlateKinematics,
    pub points: Vec<PlatePoint>,
}

impl Plate {
    pub fn new(id: PlateId) -> Self {
        Self {
            id,
            kinematics: PlateKinematics::default(),
            points: Vec::new(),
        }
    }

    pub fn area(&self) -> usize {
        self.points.len()
    }

    pub fn continental_area(&self) -> usize {
        self.points.iter().filter(|p| p.is_continental()).count()
    }

    pub fn owns(&self, c: GridCoordinate) -> bool {
        self.points.binary_search_by(|p| p.position.cmp(&c)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_primordial_counts_as_continental() {
        assert!(Crust::Primordial.is_continental());
        assert!(Crust::Continental.is_continental());
        assert!(!Crust::Oceanic.is_continental());
    }

    #[test]
    fn test_record_subduction() {
        let mut history = BoundaryHistory::default();
        history.record_subduction(true, 3);
        history.record_subduction(false, 5);
        history.record_subduction(true, 7);
        assert_eq!(history.continental_buildup, 2);
        assert_eq!(history.continental_recency, 7);
        assert_eq!(history.oceanic_buildup, 1);
        assert_eq!(history.oceanic_recency, 5);
    }

    #[test]
    fn test_history_sum_and_division() {
        let a = BoundaryHistory { continental_buildup: 3, continental_recency: 4, ..Default::default() };
        let b = BoundaryHistory { continental_buildup: 2, oceanic_buildup: 5, ..Default::default() };
        let mean = (a + b).divided_by(2);
        assert_eq!(mean.continental_buildup, 2);
        assert_eq!(mean.continental_recency, 2);
        assert_eq!(mean.oceanic_buildup, 2);
    }

    #[test]
    fn test_weighted_mean_leans_toward_heavier_sample() {
        let light = BoundaryHistory { oceanic_buildup: 0, ..Default::default() };
        let heavy = BoundaryHistory { oceanic_buildup: 10, ..Default::default() };
        let mean = BoundaryHistory::weighted_mean(&[(1.0, light), (3.0, heavy)]);
        assert_eq!(mean.oceanic_buildup, 8);
        assert_eq!(BoundaryHistory::weighted_mean(&[]), BoundaryHistory::default());
    }

    #[test]
    fn test_random_kinematics_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            let k = PlateKinematics::random(&mut rng, 0.05);
            assert!(k.axis_phi.abs() <= FRAC_PI_2);
            assert!((0.0..TAU).contains(&k.axis_theta));
            assert!((0.0..=0.05).contains(&k.speed));
        }
    }

    #[test]
    fn test_plate_owns_uses_raster_order() {
        let mut plate = Plate::new(PlateId(0));
        plate.points = [(1, 0), (3, 0), (0, 2)]
            .iter()
            .map(|&(x, y)| PlatePoint::primordial(GridCoordinate::new(x, y), PlateId(0)))
            .collect();
        assert!(plate.owns(GridCoordinate::new(0, 2)));
        assert!(!plate.owns(GridCoordinate::new(0, 1)));
    }
}
