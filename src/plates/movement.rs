//! Rigid plate motion on the grid.
//!
//! One step rotates every plate, patches the holes the rotation tears open,
//! resolves cells claimed more than once and refills whatever is still
//! empty with fresh oceanic crust.

use std::collections::{BTreeSet, HashSet};

use log::{debug, info};
use rayon::prelude::*;

use crate::error::{invalid_input, invariant, Result};
use crate::rules::MoveRules;
use crate::sphere::{GridCoordinate, Rotation, SphereGrid};
use crate::tilemap::Tilemap;
use crate::world::PlateWorld;

use super::expansion::expand_wavefront;
use super::overlap::{interlace, merge_same_plate, resolve_cross_plate};
use super::types::{Plate, PlatePoint};

/// Counters for one step, mostly for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Clock value the step's events were stamped with.
    pub time: u32,
    /// Interlaced points filling gaps between forward images.
    pub bonus_points: usize,
    /// Interlaced points recovered for cells no forward image reached.
    pub recovered_points: usize,
    /// Cells where one plate had more than one candidate.
    pub same_plate_merges: usize,
    pub subductions: usize,
    /// Cells refilled with oceanic crust.
    pub new_crust: usize,
}

impl StepReport {
    fn absorb(&mut self, other: &StepReport) {
        self.bonus_points += other.bonus_points;
        self.recovered_points += other.recovered_points;
        self.same_plate_merges += other.same_plate_merges;
        self.subductions += other.subductions;
        self.new_crust += other.new_crust;
        self.time = other.time;
    }
}

/// Advance the world by `rules.number_steps` steps, then finalize the crust.
///
/// The world is only replaced once every step succeeded.
pub fn move_plates(world: &mut PlateWorld, rules: &MoveRules) -> Result<StepReport> {
    rules.validate()?;
    rules.base.check_grid(world.grid())?;
    if world.plate_count() != rules.base.plate_count {
        return Err(invalid_input(format!(
            "world has {} plates, rules describe {}",
            world.plate_count(),
            rules.base.plate_count
        )));
    }
    world.check_coverage()?;

    let mut next = world.clone();
    next.set_kinematics(&rules.kinematics)?;
    info!("Moving {} plates for {} steps", next.plate_count(), rules.number_steps);

    let mut total = StepReport::default();
    for _ in 0..rules.number_steps {
        let report = step(&mut next, rules.time_step)?;
        debug!("step {}: {:?}", report.time, report);
        total.absorb(&report);
    }
    next.finalize();
    next.check_coverage()?;
    info!(
        "Plates moved: {} subductions, {} cells of new crust, {:.1}% continental",
        total.subductions,
        total.new_crust,
        100.0 * next.continental_fraction()
    );

    *world = next;
    Ok(total)
}

/// One mover step. Events are stamped with the clock value before the step;
/// the clock advances by one at the end.
pub fn step(world: &mut PlateWorld, time_step: f64) -> Result<StepReport> {
    let previous = world.layout();
    let PlateWorld { grid, plates, time } = world;
    let grid: &SphereGrid = grid;
    let now = *time;
    let mut report = StepReport { time: now, ..Default::default() };

    let mut forward_rotations = Vec::with_capacity(plates.len());
    let mut backward_rotations = Vec::with_capacity(plates.len());
    for plate in plates.iter() {
        let angles = plate.kinematics.step_angles(time_step);
        if !angles.is_finite() {
            return Err(invariant(format!("{} has a non-finite rotation {:?}", plate.id, angles)));
        }
        forward_rotations.push(Rotation::from_angles(&angles));
        backward_rotations.push(Rotation::from_angles(&angles.inverse()));
    }

    // Forward images plus gap fill, one plate per task.
    let images: Vec<(Vec<PlatePoint>, usize)> = plates
        .par_iter()
        .map(|plate| {
            let i = plate.id.index();
            forward_images(grid, plate, &forward_rotations[i], &backward_rotations[i], &previous)
        })
        .collect();

    let mut candidates: Tilemap<Vec<PlatePoint>> = Tilemap::new(grid.width(), grid.height());
    for (points, bonus) in images {
        report.bonus_points += bonus;
        for p in points {
            candidates.at_mut(p.position).push(p);
        }
    }

    // Reverse pass for cells no forward image reached.
    let empty: Vec<GridCoordinate> = grid.cells().filter(|&c| candidates.at(c).is_empty()).collect();
    let recovered: Vec<Vec<PlatePoint>> = empty
        .par_iter()
        .map(|&c| {
            plates
                .iter()
                .filter_map(|plate| {
                    let source = grid.rotate_exact(c, &backward_rotations[plate.id.index()]);
                    let origin = grid.snap(&source);
                    match previous.at(origin) {
                        Some(p) if p.plate == plate.id => interlace(grid, c, plate.id, &source, &previous),
                        _ => None,
                    }
                })
                .collect()
        })
        .collect();
    for points in recovered {
        for p in points {
            report.recovered_points += 1;
            candidates.at_mut(p.position).push(p);
        }
    }

    // Merge, single-threaded in raster order.
    let mut resolved: Tilemap<Option<PlatePoint>> = Tilemap::new_with(grid.width(), grid.height(), None);
    for c in grid.cells() {
        let cell = candidates.at_mut(c);
        if cell.is_empty() {
            continue;
        }
        cell.sort_by_key(|p| p.plate);
        let mut contenders = Vec::new();
        for group in cell.chunk_by(|a, b| a.plate == b.plate) {
            if group.len() > 1 {
                report.same_plate_merges += 1;
            }
            if let Some(merged) = merge_same_plate(grid, group) {
                contenders.push(merged);
            }
        }
        if let Some((survivor, lost)) = resolve_cross_plate(&contenders, now) {
            report.subductions += lost;
            resolved.put(c, Some(survivor));
        }
    }

    // Refill gaps with new oceanic crust.
    let mut owner = resolved.map(|p| p.map(|p| p.plate));
    for (c, id) in expand_wavefront(grid, &mut owner, plates.len())? {
        resolved.put(c, Some(PlatePoint::oceanic(c, id, now)));
        report.new_crust += 1;
    }

    for plate in plates.iter_mut() {
        plate.points.clear();
    }
    for c in grid.cells() {
        let p = resolved
            .at(c)
            .ok_or_else(|| invariant(format!("cell {} left without a plate after step {}", c, now)))?;
        plates[p.plate.index()].points.push(p);
    }

    *time += 1;
    Ok(report)
}

/// Rotate every point of a plate, then add interlaced points between
/// images that spread apart on their destination row. Returns the points
/// and how many of them were gap fill.
fn forward_images(
    grid: &SphereGrid,
    plate: &Plate,
    forward: &Rotation,
    backward: &Rotation,
    previous: &Tilemap<Option<PlatePoint>>,
) -> (Vec<PlatePoint>, usize) {
    let mut images = Vec::with_capacity(plate.points.len());
    let mut spreads = Vec::new();
    for p in &plate.points {
        let source = p.position;
        let dest = grid.rotate(source, forward);
        images.push(p.relocated(dest));

        // Moving poleward stretches a row of points; check the right-hand
        // neighbour's image for a gap.
        if dest.y == source.y || grid.phi(dest.y).abs() < grid.phi(source.y).abs() {
            continue;
        }
        let [_, _, _, right] = grid.neighbors(source);
        let right_dest = grid.rotate(right, forward);
        if right_dest.y == dest.y {
            spreads.push((dest, right_dest));
        }
    }
    if spreads.is_empty() {
        return (images, 0);
    }

    let claimed: HashSet<GridCoordinate> = images.iter().map(|p| p.position).collect();
    let mut gaps = BTreeSet::new();
    for (from, to) in spreads {
        for c in cells_between(grid, from, to) {
            if !claimed.contains(&c) {
                gaps.insert(c);
            }
        }
    }

    let mut bonus = 0;
    for c in gaps {
        let source = grid.rotate_exact(c, backward);
        if let Some(p) = interlace(grid, c, plate.id, &source, previous) {
            images.push(p);
            bonus += 1;
        }
    }
    (images, bonus)
}

/// Cells strictly between two cells of the same row, going the short way
/// round. Gaps wider than a quarter of the row are ignored.
fn cells_between(grid: &SphereGrid, from: GridCoordinate, to: GridCoordinate) -> Vec<GridCoordinate> {
    let width = grid.width();
    let ahead = (to.x + width - from.x) % width;
    let (gap, step_right) = if ahead <= grid.half_width() {
        (ahead.saturating_sub(1), true)
    } else {
        (width - ahead - 1, false)
    };
    if gap == 0 || gap > width / 4 {
        return Vec::new();
    }
    (1..=gap)
        .map(|i| {
            let x = if step_right {
                (from.x + i) % width
            } else {
                (from.x + width - i) % width
            };
            GridCoordinate::new(x, from.y)
        })
        .collect()
}
