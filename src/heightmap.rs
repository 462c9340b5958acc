//! Altitude synthesis from plate state.
//!
//! Oceanic crust sits at zero. Continental crust starts at a base height,
//! gets a little jitter, and is lifted by every subduction it absorbed,
//! recent ones more than old ones.

use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{invalid_input, invariant, Result};
use crate::plates::PlatePoint;
use crate::rules::AltitudeRules;
use crate::tilemap::Tilemap;
use crate::world::PlateWorld;

/// Uplift per subduction event, before the recency factor.
const UPLIFT_PER_EVENT: f32 = 10.0;

/// Height of a single point. `uniform` is in `[0, 1)` and `time` is the
/// world clock clamped to at least one.
pub fn point_altitude(point: &PlatePoint, rules: &AltitudeRules, uniform: f32, time: f32) -> f32 {
    if !point.is_continental() {
        return 0.0;
    }
    let h = &point.history;
    let continental = UPLIFT_PER_EVENT * h.continental_buildup as f32 * (h.continental_recency as f32 + 1.0) / time;
    let oceanic = UPLIFT_PER_EVENT * h.oceanic_buildup as f32 * (h.oceanic_recency as f32 + 1.0) / time;
    rules.base_height + rules.jitter * uniform + continental + oceanic
}

/// Height per cell for the whole world.
///
/// One uniform is drawn per cell in raster order, oceanic cells included,
/// so a cell's jitter does not depend on the crust of the cells before it.
pub fn synthesize_altitude(world: &PlateWorld, rules: &AltitudeRules) -> Result<Tilemap<f32>> {
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

    let layout = world.layout();
    let time = world.time().max(1) as f32;
    let mut rng = ChaCha8Rng::seed_from_u64(rules.seed);
    let mut heights = Tilemap::new_with(layout.width, layout.height, 0.0f32);

    for (x, y, point) in layout.iter() {
        let uniform: f32 = rng.gen();
        let point = point
            .as_ref()
            .ok_or_else(|| invariant(format!("cell ({}, {}) has no plate", x, y)))?;
        heights.set(x, y, point_altitude(point, rules, uniform, time));
    }

    if !heights.all_finite() {
        return Err(invariant("altitude produced non-finite heights"));
    }
    let (lo, hi) = heights.range();
    info!("Altitude range: {:.1} to {:.1}", lo, hi);
    Ok(heights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plates::{Crust, PlateId};
    use crate::rules::BaseRules;
    use crate::sphere::{GridCoordinate, SphereGrid};

    fn rules() -> AltitudeRules {
        AltitudeRules {
            base: BaseRules::new(2, 4, 4),
            seed: 8,
            base_height: 5.0,
            jitter: 2.0,
        }
    }

    #[test]
    fn test_oceanic_points_are_sea_level() {
        let p = PlatePoint::oceanic(GridCoordinate::new(0, 0), PlateId(0), 3);
        assert_eq!(point_altitude(&p, &rules(), 0.9, 4.0), 0.0);
    }

    #[test]
    fn test_continental_uplift_formula() {
        let mut p = PlatePoint::primordial(GridCoordinate::new(0, 0), PlateId(0));
        p.crust = Crust::Continental;
        p.history.continental_buildup = 2;
        p.history.continental_recency = 3;
        p.history.oceanic_buildup = 1;
        p.history.oceanic_recency = 1;
        // 5 + 2*0.5 + 10*2*4/4 + 10*1*2/4
        assert!((point_altitude(&p, &rules(), 0.5, 4.0) - 31.0).abs() < 1e-5);
    }

    #[test]
    fn test_synthesized_heights_match_crust() {
        let grid = SphereGrid::new(4, 4).unwrap();
        let mut ownership = Tilemap::new_with(8, 4, PlateId(0));
        ownership.set(3, 2, PlateId(1));
        let mut world = PlateWorld::from_ownership(grid, &ownership, 2).unwrap();
        world.plates[0].points[0].crust = Crust::Oceanic;
        world.finalize();

        let heights = synthesize_altitude(&world, &rules()).unwrap();
        assert_eq!(*heights.get(0, 0), 0.0);
        for (x, y, &h) in heights.iter() {
            if (x, y) != (0, 0) {
                assert!((5.0..7.0).contains(&h), "({}, {}) = {}", x, y, h);
            }
        }
        assert_eq!(heights, synthesize_altitude(&world, &rules()).unwrap());
    }

    #[test]
    fn test_rejects_mismatched_world() {
        let grid = SphereGrid::new(4, 5).unwrap();
        let ownership = Tilemap::new_with(8, 5, PlateId(0));
        let world = PlateWorld::from_ownership(grid, &ownership, 2).unwrap();
        assert!(synthesize_altitude(&world, &rules()).is_err());
    }
}
