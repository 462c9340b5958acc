use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::error::{invariant, Result};
use crate::rules::GenerateRules;
use crate::sphere::{CellBounds, GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;
use crate::world::PlateWorld;

use super::expansion::{expand_wavefront, flood_fill};
use super::types::{PlateId, PlatePoint};

/// One noise center and the box that bounds its influence.
struct Splat {
    center: GridCoordinate,
    bounds: CellBounds,
    limit: f64,
    magnitude: f64,
}

/// Generate the initial plate layout.
///
/// Noise octaves scatter weighted discs over the sphere; cells whose summed
/// magnitude beats the `cut_off` order statistic are active. Connected active
/// regions become plate seeds (largest regions win when there are more
/// regions than plates), and a breadth-first wavefront hands every remaining
/// cell to the nearest seed.
pub fn generate_plates(rules: &GenerateRules) -> Result<PlateWorld> {
    rules.validate()?;
    let grid = SphereGrid::from_rules(&rules.base)?;
    let plate_count = rules.base.plate_count;
    info!(
        "Generating {} plates on a {}x{} grid",
        plate_count,
        grid.width(),
        grid.height()
    );

    let mut rng = ChaCha8Rng::seed_from_u64(rules.seed);
    let field = accumulate_noise(&grid, rules, &mut rng);
    let threshold = activity_threshold(&field, rules.cut_off);
    let active = field.map(|&m| m > threshold);
    debug!(
        "activity threshold {:.3}, {} active cells",
        threshold,
        active.values().filter(|&&a| a).count()
    );

    let mut slots = seed_regions(&grid, &active, plate_count);
    fill_empty_slots(&grid, &mut slots)?;
    let mut owner: Tilemap<Option<PlateId>> = Tilemap::new_with(grid.width(), grid.height(), None);
    for (index, cells) in slots.iter().enumerate() {
        for &c in cells {
            owner.put(c, Some(PlateId::from_index(index)));
        }
    }

    let claims = expand_wavefront(&grid, &mut owner, plate_count)?;
    debug!("wavefront claimed {} cells", claims.len());

    let mut points = Vec::with_capacity(grid.cell_count());
    for c in grid.cells() {
        if let Some(id) = *owner.at(c) {
            points.push(PlatePoint::primordial(c, id));
        }
    }
    let world = PlateWorld::from_points(grid, plate_count, points)?;
    world.check_coverage()?;
    if let Some(empty) = world.plate_areas().iter().position(|&a| a == 0) {
        return Err(invariant(format!("{} ended up without cells", PlateId::from_index(empty))));
    }
    info!("Plate areas: {:?}", world.plate_areas());
    Ok(world)
}

/// Sum of all octave discs per cell.
///
/// Centers are drawn with one uniform per cell per octave in raster order,
/// so the draw sequence depends only on the seed and the grid size.
pub fn accumulate_noise(grid: &SphereGrid, rules: &GenerateRules, rng: &mut ChaCha8Rng) -> Tilemap<f64> {
    let mut splats = Vec::new();
    for octave in 0..rules.octave_count() {
        let radius = rules.radius[octave] * grid.d_phi();
        let limit = SphereGrid::chord_squared_for(radius);
        let concentration = rules.concentration[octave];
        let before = splats.len();
        for c in grid.cells() {
            let u: f64 = rng.gen();
            if grid.test_momentum(c, u, concentration) {
                splats.push(Splat {
                    center: c,
                    bounds: grid.range_bounds(c, radius),
                    limit,
                    magnitude: rules.magnitude[octave],
                });
            }
        }
        debug!("octave {}: {} centers", octave, splats.len() - before);
    }

    let width = grid.width();
    let mut field = Tilemap::new_with(width, grid.height(), 0.0f64);
    field
        .as_mut_slice()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for splat in splats.iter().filter(|s| s.bounds.contains_row(y)) {
                for x in splat.bounds.columns() {
                    if grid.distance(splat.center, GridCoordinate::new(x, y)) <= splat.limit {
                        row[x] += splat.magnitude;
                    }
                }
            }
        });
    field
}

/// The `cut_off`-th smallest value (0-based).
pub fn activity_threshold(field: &Tilemap<f64>, cut_off: usize) -> f64 {
    let mut values = field.as_slice().to_vec();
    let cut_off = cut_off.min(values.len().saturating_sub(1));
    let (_, value, _) = values.select_nth_unstable_by(cut_off, |a, b| a.total_cmp(b));
    *value
}

/// Connected active regions assigned to plate slots.
///
/// Regions are found in raster scan order. A region takes the lowest empty
/// slot; once all slots are full it replaces the smallest seeded region if
/// it is strictly larger, and is discarded otherwise. Replaced cells simply
/// become unclaimed.
pub fn seed_regions(grid: &SphereGrid, active: &Tilemap<bool>, plate_count: usize) -> Vec<Vec<GridCoordinate>> {
    let mut visited = Tilemap::new_with(grid.width(), grid.height(), false);
    let mut slots: Vec<Vec<GridCoordinate>> = vec![Vec::new(); plate_count];

    for c in grid.cells() {
        if !*active.at(c) || *visited.at(c) {
            continue;
        }
        let mut region = flood_fill(grid, active, &mut visited, c);
        region.sort();

        if let Some(empty) = slots.iter().position(|s| s.is_empty()) {
            slots[empty] = region;
        } else if let Some((smallest, _)) = slots.iter().enumerate().min_by_key(|(_, s)| s.len()) {
            if region.len() > slots[smallest].len() {
                debug!(
                    "region of {} cells at {} replaces one of {}",
                    region.len(),
                    c,
                    slots[smallest].len()
                );
                slots[smallest] = region;
            }
        }
    }
    slots
}

/// Give every empty slot a single seed cell: the first unclaimed cell in
/// raster order, or, once none is left, the last cell of the largest slot.
fn fill_empty_slots(grid: &SphereGrid, slots: &mut [Vec<GridCoordinate>]) -> Result<()> {
    let mut claimed = Tilemap::new_with(grid.width(), grid.height(), false);
    for &c in slots.iter().flatten() {
        claimed.put(c, true);
    }
    for index in 0..slots.len() {
        if !slots[index].is_empty() {
            continue;
        }
        let seed = match grid.cells().find(|&c| !*claimed.at(c)) {
            Some(c) => c,
            None => {
                let donor = slots
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.len() > 1)
                    .max_by(|(a, sa), (b, sb)| sa.len().cmp(&sb.len()).then(b.cmp(a)))
                    .map(|(i, _)| i)
                    .ok_or_else(|| invariant(format!("no cell left to seed {}", PlateId::from_index(index))))?;
                slots[donor]
                    .pop()
                    .ok_or_else(|| invariant(format!("{} has no cell to give", PlateId::from_index(donor))))?
            }
        };
        warn!("{} has no active region, seeding it at {}", PlateId::from_index(index), seed);
        claimed.put(seed, true);
        slots[index].push(seed);
    }
    Ok(())
}
