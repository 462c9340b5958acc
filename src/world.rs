//! Plate world container
//!
//! Bundles the grid, the plates and the simulation clock so the stages can
//! pass a single value around.

use log::warn;

use crate::error::{invalid_input, invariant, Result};
use crate::plates::{Crust, Plate, PlateId, PlateKinematics, PlatePoint};
use crate::sphere::{GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;

/// All plates on one grid at one point in simulated time.
#[derive(Clone, Debug)]
pub struct PlateWorld {
    pub(crate) grid: SphereGrid,
    pub(crate) plates: Vec<Plate>,
    /// Completed mover steps.
    pub(crate) time: u32,
}

impl PlateWorld {
    /// Distribute points to their plates. Points must carry valid plate ids.
    pub(crate) fn from_points(grid: SphereGrid, plate_count: usize, points: Vec<PlatePoint>) -> Result<Self> {
        let mut plates: Vec<Plate> = (0..plate_count).map(|i| Plate::new(PlateId::from_index(i))).collect();
        for p in points {
            let plate = plates
                .get_mut(p.plate.index())
                .ok_or_else(|| invariant(format!("point at {} names missing {}", p.position, p.plate)))?;
            plate.points.push(p);
        }
        for plate in &mut plates {
            plate.points.sort_by(|a, b| a.position.cmp(&b.position));
        }
        Ok(Self { grid, plates, time: 0 })
    }

    /// Build a world from a collaborator-supplied plate id grid. Every cell
    /// becomes primordial material of its plate.
    pub fn from_ownership(grid: SphereGrid, ownership: &Tilemap<PlateId>, plate_count: usize) -> Result<Self> {
        if ownership.width != grid.width() || ownership.height != grid.height() {
            return Err(invalid_input(format!(
                "plate grid is {}x{}, expected {}x{}",
                ownership.width,
                ownership.height,
                grid.width(),
                grid.height()
            )));
        }
        if plate_count == 0 || plate_count > PlateId::MAX_PLATES {
            return Err(invalid_input(format!("unsupported plate count {}", plate_count)));
        }
        let mut points = Vec::with_capacity(grid.cell_count());
        for c in grid.cells() {
            let id = *ownership.at(c);
            if id.index() >= plate_count {
                return Err(invalid_input(format!(
                    "cell {} names {} but only {} plates exist",
                    c, id, plate_count
                )));
            }
            points.push(PlatePoint::primordial(c, id));
        }
        Self::from_points(grid, plate_count, points)
    }

    pub fn grid(&self) -> &SphereGrid {
        &self.grid
    }

    pub fn plates(&self) -> &[Plate] {
        &self.plates
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn plate_count(&self) -> usize {
        self.plates.len()
    }

    pub fn set_kinematics(&mut self, kinematics: &[PlateKinematics]) -> Result<()> {
        if kinematics.len() != self.plates.len() {
            return Err(invalid_input(format!(
                "{} kinematics for {} plates",
                kinematics.len(),
                self.plates.len()
            )));
        }
        for (plate, k) in self.plates.iter_mut().zip(kinematics) {
            plate.kinematics = *k;
        }
        Ok(())
    }

    /// Owning plate per cell. `None` only if coverage is broken.
    pub fn ownership(&self) -> Tilemap<Option<PlateId>> {
        let mut owner = Tilemap::new_with(self.grid.width(), self.grid.height(), None);
        for plate in &self.plates {
            for p in &plate.points {
                owner.put(p.position, Some(plate.id));
            }
        }
        owner
    }

    /// The point covering each cell.
    pub fn layout(&self) -> Tilemap<Option<PlatePoint>> {
        let mut layout = Tilemap::new_with(self.grid.width(), self.grid.height(), None);
        for plate in &self.plates {
            for p in &plate.points {
                layout.put(p.position, Some(*p));
            }
        }
        layout
    }

    /// Every cell owned by exactly one point of exactly one plate.
    pub fn check_coverage(&self) -> Result<()> {
        let mut counts = Tilemap::new_with(self.grid.width(), self.grid.height(), 0u32);
        for plate in &self.plates {
            for p in &plate.points {
                if !self.grid.contains(p.position) {
                    return Err(invariant(format!("{} has a point off the grid at {}", plate.id, p.position)));
                }
                if p.plate != plate.id {
                    return Err(invariant(format!(
                        "point at {} on {} is tagged {}",
                        p.position, plate.id, p.plate
                    )));
                }
                *counts.at_mut(p.position) += 1;
            }
        }
        if let Some((x, y, n)) = counts.iter().find(|(_, _, &n)| n != 1) {
            return Err(invariant(format!(
                "cell {} is covered {} times",
                GridCoordinate::new(x, y),
                n
            )));
        }
        Ok(())
    }

    pub fn plate_areas(&self) -> Vec<usize> {
        self.plates.iter().map(|p| p.area()).collect()
    }

    /// Share of cells carrying continental crust.
    pub fn continental_fraction(&self) -> f64 {
        let continental: usize = self.plates.iter().map(|p| p.continental_area()).sum();
        continental as f64 / self.grid.cell_count() as f64
    }

    /// Turn remaining primordial material into continental crust.
    pub fn finalize(&mut self) {
        for plate in &mut self.plates {
            for p in &mut plate.points {
                if p.crust == Crust::Primordial {
                    p.crust = Crust::Continental;
                }
            }
        }
        if self.continental_fraction() == 0.0 {
            warn!("no continental crust survived");
        }
    }
}
