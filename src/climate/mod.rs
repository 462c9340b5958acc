//! Seasonal rainfall
//!
//! For each season the sub-solar declination places the intertropical
//! convergence (ITC), a pressure field is built from latitude belts and the
//! land/ocean contrast, winds follow the smoothed pressure gradient, and
//! ocean moisture is advected over the surface until it rains out.

pub mod pressure;
pub mod rainfall;
pub mod wind;

use std::f64::consts::TAU;

use log::{debug, info};

use crate::error::{invalid_input, Result};
use crate::rules::RainfallRules;
use crate::sphere::SphereGrid;
use crate::tilemap::Tilemap;

pub use pressure::{base_pressure, itc_latitudes, smooth_pressure};
pub use rainfall::{advect_moisture, split_moisture, MoistureSplit};
pub use wind::{wind_transport, Transport};

/// Smoothing passes over each season's pressure field.
pub const SMOOTHING_PASSES: usize = 10;
/// Moisture substeps per season.
pub const ADVECTION_SUBSTEPS: usize = 10;

/// Rain deposited per cell, one map per season.
#[derive(Clone, Debug, PartialEq)]
pub struct SeasonalRainfall {
    pub seasons: Vec<Tilemap<f32>>,
}

impl SeasonalRainfall {
    pub fn season_count(&self) -> usize {
        self.seasons.len()
    }

    /// Mean over all seasons per cell.
    pub fn annual_mean(&self) -> Option<Tilemap<f32>> {
        let first = self.seasons.first()?;
        let mut mean = Tilemap::new_with(first.width, first.height, 0.0f32);
        for season in &self.seasons {
            for (m, &r) in mean.as_mut_slice().iter_mut().zip(season.as_slice()) {
                *m += r;
            }
        }
        let n = self.seasons.len() as f32;
        for m in mean.as_mut_slice() {
            *m /= n;
        }
        Some(mean)
    }

    /// Export as `[season][x][y]`.
    pub fn to_columns(&self) -> Vec<Vec<Vec<f32>>> {
        self.seasons.iter().map(|s| s.to_columns()).collect()
    }
}

/// Sub-solar declination for season `s` of `count`.
pub fn declination(season: usize, count: usize, axial_tilt: f64) -> f64 {
    axial_tilt * season_phase(season, count).sin()
}

fn season_phase(season: usize, count: usize) -> f64 {
    TAU * season as f64 / count as f64
}

/// Seasonal rainfall over a height field. Cells at or below zero are ocean.
pub fn simulate_rainfall(grid: &SphereGrid, heights: &Tilemap<f32>, rules: &RainfallRules) -> Result<SeasonalRainfall> {
    rules.validate()?;
    rules.base.check_grid(grid)?;
    if heights.width != grid.width() || heights.height != grid.height() {
        return Err(invalid_input(format!(
            "height map is {}x{}, expected {}x{}",
            heights.width,
            heights.height,
            grid.width(),
            grid.height()
        )));
    }
    if !heights.all_finite() {
        return Err(invalid_input("height map holds non-finite values"));
    }

    info!("Simulating rainfall over {} seasons", rules.seasons);
    let land = heights.map(|&h| h > 0.0);
    let mut seasons = Vec::with_capacity(rules.seasons);
    for s in 0..rules.seasons {
        let phase = season_phase(s, rules.seasons);
        let delta = declination(s, rules.seasons, rules.axial_tilt);
        let itc = itc_latitudes(grid, &land, delta, rules);
        let mut field = base_pressure(grid, &land, &itc, phase.sin(), rules);
        smooth_pressure(grid, &mut field, SMOOTHING_PASSES, rules.smoothing_weight);
        let transport = wind_transport(grid, &field, rules);
        let rain = advect_moisture(grid, heights, &transport, ADVECTION_SUBSTEPS, rules);

        let total: f64 = rain.values().sum();
        debug!("season {}: declination {:.3}, total rain {:.2}", s, delta, total);
        seasons.push(rain.map(|&r| r as f32));
    }
    Ok(SeasonalRainfall { seasons })
}
