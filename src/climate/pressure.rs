//! Seasonal pressure field: ITC placement, latitude belts and smoothing.

use std::f64::consts::PI;

use rayon::prelude::*;

use crate::rules::RainfallRules;
use crate::sphere::{GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;

const POLAR_LOW_LATITUDE: f64 = PI / 3.0;
const SUBTROPICAL_HIGH_LATITUDE: f64 = PI / 6.0;

/// Latitude of the intertropical convergence per column.
///
/// Each column walks rows away from the equator toward the subsolar
/// hemisphere, adding the ocean or land weight per row, and stops at the
/// first row where the score reaches `|declination| / d_phi`. Land scores
/// less per row, so the ITC drifts further over continents.
pub fn itc_latitudes(grid: &SphereGrid, land: &Tilemap<bool>, declination: f64, rules: &RainfallRules) -> Vec<f64> {
    let target = declination.abs() / grid.d_phi();
    if target == 0.0 {
        return vec![0.0; grid.width()];
    }
    let height = grid.height();
    let rows: Vec<usize> = if declination > 0.0 {
        (height / 2..height).collect()
    } else {
        (0..=(height - 1) / 2).rev().collect()
    };

    (0..grid.width())
        .into_par_iter()
        .map(|x| {
            let mut score = 0.0;
            let mut itc = 0.0;
            for &y in &rows {
                score += if *land.get(x, y) {
                    rules.land_itc_weight
                } else {
                    rules.ocean_itc_weight
                };
                itc = grid.phi(y);
                if score >= target {
                    break;
                }
            }
            itc
        })
        .collect()
}

fn belt(distance: f64, width: f64) -> f64 {
    (-(distance / width).powi(2)).exp()
}

/// Unsmoothed pressure for one season.
///
/// Starts from 1 with a polar low near 60°, a subtropical high near 30° and
/// an ITC low at each column's ITC latitude. `summer` is positive in the
/// hemisphere tilted toward the sun; summer land deepens the ITC low and
/// sits lower than the ocean beside it.
pub fn base_pressure(
    grid: &SphereGrid,
    land: &Tilemap<bool>,
    itc: &[f64],
    season_sin: f64,
    rules: &RainfallRules,
) -> Tilemap<f64> {
    let width = grid.width();
    let mut field = Tilemap::new_with(width, grid.height(), 0.0f64);
    field
        .as_mut_slice()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let phi = grid.phi(y);
            let summer = if phi == 0.0 { 0.0 } else { season_sin * phi.signum() };
            let zonal = 1.0 - rules.polar_low * belt(phi.abs() - POLAR_LOW_LATITUDE, rules.belt_width)
                + rules.subtropical_high * belt(phi.abs() - SUBTROPICAL_HIGH_LATITUDE, rules.belt_width);
            for (x, value) in row.iter_mut().enumerate() {
                let itc_low = rules.itc_low * belt(phi - itc[x], rules.belt_width);
                *value = if *land.get(x, y) {
                    zonal - itc_low * (1.0 + rules.land_contrast * summer.max(0.0)) - rules.land_deviation * summer
                } else {
                    zonal - itc_low + rules.land_deviation * summer
                };
            }
        });
    field
}

/// Neighbour averaging: `(w * p + sum of the four neighbours) / (w + 4)`,
/// double-buffered.
pub fn smooth_pressure(grid: &SphereGrid, field: &mut Tilemap<f64>, passes: usize, weight: f64) {
    let width = grid.width();
    let mut next = field.clone();
    for _ in 0..passes {
        let current: &Tilemap<f64> = field;
        next.as_mut_slice()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, value) in row.iter_mut().enumerate() {
                    let c = GridCoordinate::new(x, y);
                    let around: f64 = grid.neighbors(c).iter().map(|&n| *current.at(n)).sum();
                    *value = (weight * current.at(c) + around) / (weight + 4.0);
                }
            });
        std::mem::swap(field, &mut next);
    }
}
