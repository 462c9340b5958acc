//! Erosion and water routing
//!
//! Rain is routed downhill over the height field, filling pits into lakes
//! until they spill. Moving water cuts into the land it crosses, and cells
//! end up classified as water where the sea, a river or a lake covers them.
//!
//! - [`flow`]: steepest-descent targets and flow accumulation
//! - [`routing`]: the band-parallel worklist that moves the water

pub mod flow;
pub mod routing;

use flow::raise_above;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::climate::SeasonalRainfall;
use crate::error::{invalid_input, Result};
use crate::rules::ErosionRules;
use crate::sphere::{GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;

pub use flow::{lowest_neighbor, FlowGraph};
pub use routing::{band_ranges, Band, RoutingField, RoutingLimits};

/// Everything routing produces.
#[derive(Clone, Debug)]
pub struct ErosionResult {
    /// Heights after lake filling and erosion.
    pub heights: Tilemap<f32>,
    /// Depth cut into each cell.
    pub erosion: Tilemap<f32>,
    /// Water that passed through each cell.
    pub flow: Tilemap<f32>,
    /// Water left standing in each cell.
    pub water: Tilemap<f32>,
    /// Cells raised while filling a basin.
    pub lakes: Tilemap<bool>,
    pub is_water: Tilemap<bool>,
    /// Drainage over the lake-filled surface.
    pub flow_graph: FlowGraph,
    pub lake_raises: usize,
    /// Basins that hit the fill ceiling with water still in them.
    pub stalled_basins: usize,
}

impl ErosionResult {
    pub fn water_fraction(&self) -> f64 {
        let wet = self.is_water.values().filter(|&&w| w).count();
        wet as f64 / self.is_water.len().max(1) as f64
    }

    pub fn lake_cells(&self) -> usize {
        self.lakes.values().filter(|&&l| l).count()
    }
}

fn check_shape<T: Clone>(grid: &SphereGrid, map: &Tilemap<T>, what: &str) -> Result<()> {
    if map.width != grid.width() || map.height != grid.height() {
        return Err(invalid_input(format!(
            "{} is {}x{}, expected {}x{}",
            what,
            map.width,
            map.height,
            grid.width(),
            grid.height()
        )));
    }
    Ok(())
}

/// Route rain over `heights`.
///
/// Each cell starts with the annual mean of `rainfall` (or the uniform rain
/// from the rules) scaled by its area weight.
pub fn route_water(
    grid: &SphereGrid,
    heights: &Tilemap<f32>,
    rainfall: Option<&SeasonalRainfall>,
    rules: &ErosionRules,
) -> Result<ErosionResult> {
    rules.validate()?;
    rules.base.check_grid(grid)?;
    check_shape(grid, heights, "height map")?;
    if !heights.all_finite() {
        return Err(invalid_input("height map holds non-finite values"));
    }

    let rain = match rainfall.and_then(|r| r.annual_mean()) {
        Some(mean) => {
            check_shape(grid, &mean, "rainfall")?;
            if rainfall.is_some_and(|r| r.seasons.iter().any(|s| !s.same_shape(&mean))) {
                return Err(invalid_input("rainfall seasons differ in shape"));
            }
            if mean.values().any(|r| !r.is_finite() || *r < 0.0) {
                return Err(invalid_input("rainfall holds negative or non-finite values"));
            }
            mean
        }
        None => Tilemap::new_with(grid.width(), grid.height(), rules.uniform_rain),
    };
    let mut water = rain;
    for (_, y, w) in water.iter_mut() {
        *w *= grid.area_weight(y) as f32;
    }

    let (lowest, highest) = heights.range();
    let ceiling = raise_above(highest);
    let raise_span = (ceiling - lowest.max(0.0)).ceil() as usize + 2;
    let limits = RoutingLimits {
        ceiling,
        raise_budget: grid.cell_count().saturating_mul(raise_span),
        water_threshold: rules.water_threshold,
        erosion_rate: rules.erosion_rate,
    };

    let ranges = band_ranges(grid.width(), rules.bands);
    info!("Routing water over {} bands", ranges.len());
    let mut field = RoutingField::new(heights.clone(), water);

    let bands: Vec<Band> = ranges
        .into_par_iter()
        .map(|range| {
            let mut band = Band::extract(&field, range);
            let seeds = band.wet_cells();
            band.run(grid, heights, &seeds, &limits)?;
            Ok(band)
        })
        .collect::<Result<_>>()?;

    let mut raises = 0;
    let mut stalled = 0;
    let mut parked = Vec::new();
    for band in bands {
        raises += band.raises;
        stalled += band.stalled;
        parked.extend(band.write_back(&mut field));
    }
    debug!("{} transfers crossed band edges", parked.len());

    // Deliver the crossings and route them on the whole grid.
    let mut targets: Vec<GridCoordinate> = Vec::with_capacity(parked.len());
    for (c, amount) in parked {
        *field.water.at_mut(c) += amount;
        targets.push(c);
    }
    targets.sort_by(|a, b| field.heights.at(*b).total_cmp(field.heights.at(*a)).then(a.cmp(b)));
    targets.dedup();

    let mut whole = Band::extract(&field, 0..grid.width());
    whole.raises = raises;
    let snapshot = field.heights.clone();
    whole.run(grid, &snapshot, &targets, &limits)?;
    let raises = whole.raises;
    stalled += whole.stalled;
    whole.write_back(&mut field);

    if stalled > 0 {
        warn!("{} basins reached the fill ceiling {:.1} and keep their water", stalled, ceiling);
    }

    let result = finish(grid, field, rules, raises, stalled);
    info!(
        "Water routing: {} lake raises, {} lake cells, {:.1}% water",
        result.lake_raises,
        result.lake_cells(),
        100.0 * result.water_fraction()
    );
    Ok(result)
}

/// Cap erosion so no cell is cut below its downhill target, apply it, and
/// classify water cells.
fn finish(grid: &SphereGrid, field: RoutingField, rules: &ErosionRules, raises: usize, stalled: usize) -> ErosionResult {
    let RoutingField { heights: filled, water, flow, erosion: raw, lakes } = field;
    let flow_graph = FlowGraph::build(grid, &filled);

    let mut erosion = Tilemap::new_with(grid.width(), grid.height(), 0.0f32);
    let mut heights = filled.clone();
    let mut is_water = Tilemap::new_with(grid.width(), grid.height(), false);
    for c in grid.cells() {
        let h = *filled.at(c);
        let cut = match flow_graph.target(c) {
            Some(t) if h > 0.0 => raw.at(c).min(h - filled.at(t)).max(0.0),
            _ => 0.0,
        };
        erosion.put(c, cut);
        heights.put(c, h - cut);

        let area = grid.area_weight(c.y) as f32;
        let wet = h <= 0.0 || *flow.at(c) > rules.flow_threshold * area || *water.at(c) > rules.lake_threshold * area;
        is_water.put(c, wet);
    }

    ErosionResult {
        heights,
        erosion,
        flow,
        water,
        lakes,
        is_water,
        flow_graph,
        lake_raises: raises,
        stalled_basins: stalled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::BaseRules;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn rules(half_width: usize, height: usize, bands: usize) -> ErosionRules {
        ErosionRules {
            base: BaseRules::new(1, half_width, height),
            bands,
            uniform_rain: 1.0,
            water_threshold: 0.2,
            flow_threshold: 3.0,
            lake_threshold: 2.0,
            erosion_rate: 0.05,
        }
    }

    fn total_water(grid: &SphereGrid, rain: f32) -> f32 {
        (0..grid.height()).map(|y| grid.area_weight(y) as f32 * rain).sum::<f32>() * grid.width() as f32
    }

    #[test]
    fn test_flat_sea_is_all_water_without_erosion() {
        let grid = SphereGrid::new(6, 6).unwrap();
        let heights = Tilemap::new_with(12, 6, 0.0f32);
        let result = route_water(&grid, &heights, None, &rules(6, 6, 3)).unwrap();
        assert!(result.is_water.values().all(|&w| w));
        assert!(result.erosion.values().all(|&e| e == 0.0));
        assert_eq!(result.heights, heights);
        assert_eq!(result.lake_raises, 0);
    }

    #[test]
    fn test_random_terrain_terminates_and_conserves_water() {
        let grid = SphereGrid::new(16, 16).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let mut heights = Tilemap::new_with(32, 16, 0.0f32);
        for h in heights.as_mut_slice() {
            *h = if rng.gen::<f32>() < 0.3 { 0.0 } else { rng.gen_range(0.5..20.0) };
        }
        for bands in [1, 4, 7] {
            let result = route_water(&grid, &heights, None, &rules(16, 16, bands)).unwrap();
            let remaining: f32 = result.water.values().sum();
            let supplied = total_water(&grid, 1.0);
            assert!((remaining - supplied).abs() < 1e-2 * supplied, "{} vs {}", remaining, supplied);
            assert!(result.erosion.values().all(|&e| e >= 0.0));
            assert!(result.heights.all_finite());
        }
    }

    #[test]
    fn test_erosion_never_cuts_below_target() {
        let grid = SphereGrid::new(8, 8).unwrap();
        let mut heights = Tilemap::new_with(16, 8, 0.0f32);
        for (x, _, h) in heights.iter_mut() {
            *h = 2.0 * grid.column_distance(x, 0) as f32;
        }
        let mut r = rules(8, 8, 2);
        r.erosion_rate = 50.0;
        let result = route_water(&grid, &heights, None, &r).unwrap();
        for c in grid.cells() {
            if let Some(t) = result.flow_graph.target(c) {
                assert!(*result.heights.at(c) >= *heights.at(t) - 1e-4, "{} cut below {}", c, t);
            }
        }
        assert!(result.erosion.values().any(|&e| e > 0.0));
    }

    #[test]
    fn test_closed_basin_fills_into_lake() {
        let grid = SphereGrid::new(6, 6).unwrap();
        let mut heights = Tilemap::new_with(12, 6, 8.0f32);
        heights.set(3, 3, 2.0);
        heights.set(9, 0, 0.0);
        let mut r = rules(6, 6, 1);
        r.uniform_rain = 4.0;
        let result = route_water(&grid, &heights, None, &r).unwrap();
        assert!(*result.lakes.get(3, 3));
        assert!(result.lake_raises > 0);
        assert!(*result.heights.get(3, 3) > 2.0);
    }

    #[test]
    fn test_basin_on_coarse_heights_terminates() {
        let grid = SphereGrid::new(4, 4).unwrap();
        let mut heights = Tilemap::new_with(8, 4, 16_777_216.0f32);
        heights.set(2, 2, 16_777_000.0);
        let mut r = rules(4, 4, 1);
        r.uniform_rain = 4.0;
        let result = route_water(&grid, &heights, None, &r).unwrap();
        assert!(*result.lakes.get(2, 2));
        assert!(result.stalled_basins > 0);
        assert!(result.heights.all_finite());
        let remaining: f32 = result.water.values().sum();
        let supplied = total_water(&grid, 4.0);
        assert!((remaining - supplied).abs() < 1e-2 * supplied);
    }

    #[test]
    fn test_rivers_marked_as_water() {
        let grid = SphereGrid::new(8, 8).unwrap();
        let mut heights = Tilemap::new_with(16, 8, 0.0f32);
        for (x, _, h) in heights.iter_mut() {
            *h = grid.column_distance(x, 0) as f32;
        }
        let result = route_water(&grid, &heights, None, &rules(8, 8, 2)).unwrap();
        // Column 1 collects the whole side of the slope before the sea.
        assert!(*result.is_water.get(1, 4));
        assert!(!*result.is_water.get(8, 4));
    }

    #[test]
    fn test_rejects_mismatched_rainfall() {
        let grid = SphereGrid::new(4, 4).unwrap();
        let heights = Tilemap::new_with(8, 4, 1.0f32);
        let rainfall = SeasonalRainfall {
            seasons: vec![Tilemap::new_with(8, 3, 1.0f32)],
        };
        assert!(route_water(&grid, &heights, Some(&rainfall), &rules(4, 4, 2)).is_err());

        let negative = SeasonalRainfall {
            seasons: vec![Tilemap::new_with(8, 4, -1.0f32)],
        };
        assert!(route_water(&grid, &heights, Some(&negative), &rules(4, 4, 2)).is_err());
    }
}
