//! Moisture advection and deposition.

use rayon::prelude::*;

use crate::rules::RainfallRules;
use crate::sphere::{GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;

use super::wind::Transport;

/// Where one cell's moisture goes in a substep.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoistureSplit {
    pub deposit: f64,
    /// Handed to `[above, below, left, right]`.
    pub outflow: [f64; 4],
    pub retained: f64,
}

/// Deposit first, then carry the remainder off by the transport fractions.
/// Nothing is created: `deposit + outflow + retained == moisture`.
pub fn split_moisture(moisture: f64, deposit_fraction: f64, transport: &Transport) -> MoistureSplit {
    let deposit = moisture * deposit_fraction.clamp(0.0, 1.0);
    let remainder = moisture - deposit;
    let outflow = transport.map(|f| remainder * f);
    let retained = (remainder - outflow.iter().sum::<f64>()).max(0.0);
    MoistureSplit { deposit, outflow, retained }
}

/// Deposit fraction for a cell; higher land wrings out more rain.
pub fn deposit_fraction(height: f32, max_height: f32, rules: &RainfallRules) -> f64 {
    let relief = if height > 0.0 && max_height > 0.0 {
        (height / max_height) as f64
    } else {
        0.0
    };
    (rules.rain_base + rules.rain_height * relief).min(1.0)
}

/// Run the moisture substeps for one season and return the rain deposited
/// per cell.
///
/// Each substep adds evaporation over the ocean, splits every cell's
/// moisture, and gathers the outflows into the neighbours. A neighbour that
/// appears twice in a cell's list (the polar rows on narrow grids) receives
/// every share addressed to it.
pub fn advect_moisture(
    grid: &SphereGrid,
    heights: &Tilemap<f32>,
    transport: &Tilemap<Transport>,
    substeps: usize,
    rules: &RainfallRules,
) -> Tilemap<f64> {
    let width = grid.width();
    let (_, max_height) = heights.range();
    let fractions = heights.map(|&h| deposit_fraction(h, max_height, rules));

    let mut moisture = Tilemap::new_with(width, grid.height(), 0.0f64);
    let mut rain = Tilemap::new_with(width, grid.height(), 0.0f64);
    let mut splits = Tilemap::new_with(width, grid.height(), MoistureSplit::default());

    for _ in 0..substeps {
        for (m, &h) in moisture.as_mut_slice().iter_mut().zip(heights.as_slice()) {
            if h <= 0.0 {
                *m += rules.evaporation;
            }
        }

        splits
            .as_mut_slice()
            .par_chunks_mut(width)
            .zip(moisture.as_slice().par_chunks(width))
            .zip(fractions.as_slice().par_chunks(width))
            .enumerate()
            .for_each(|(y, ((row, m_row), f_row))| {
                for x in 0..width {
                    row[x] = split_moisture(m_row[x], f_row[x], transport.get(x, y));
                }
            });

        let current_splits = &splits;
        moisture
            .as_mut_slice()
            .par_chunks_mut(width)
            .zip(rain.as_mut_slice().par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (m_row, r_row))| {
                for x in 0..width {
                    let c = GridCoordinate::new(x, y);
                    let own = current_splits.at(c);
                    let mut incoming = 0.0;
                    let neighbors = grid.neighbors(c);
                    for (i, &n) in neighbors.iter().enumerate() {
                        if neighbors[..i].contains(&n) {
                            continue;
                        }
                        let from = current_splits.at(n);
                        for (k, &back) in grid.neighbors(n).iter().enumerate() {
                            if back == c {
                                incoming += from.outflow[k];
                            }
                        }
                    }
                    m_row[x] = own.retained + incoming;
                    r_row[x] += own.deposit;
                }
            });
    }
    rain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_never_creates_moisture() {
        let transport = [0.2, 0.1, 0.3, 0.2];
        for m in [0.0, 0.5, 3.0] {
            for f in [0.0, 0.3, 1.0] {
                let s = split_moisture(m, f, &transport);
                let total = s.deposit + s.outflow.iter().sum::<f64>() + s.retained;
                assert!((total - m).abs() < 1e-12);
                assert!(s.deposit + s.outflow.iter().sum::<f64>() <= m + 1e-12);
            }
        }
    }

    #[test]
    fn test_deposit_fraction_rises_with_height() {
        let rules = RainfallRules::default();
        assert_eq!(deposit_fraction(0.0, 10.0, &rules), rules.rain_base);
        assert!(deposit_fraction(10.0, 10.0, &rules) > deposit_fraction(2.0, 10.0, &rules));
        assert!(deposit_fraction(10.0, 10.0, &rules) <= 1.0);
    }

    #[test]
    fn test_moisture_is_conserved_between_rain_and_air() {
        let grid = SphereGrid::new(3, 4).unwrap();
        let mut heights = Tilemap::new_with(6, 4, 0.0f32);
        heights.set(1, 1, 5.0);
        heights.set(2, 1, 2.0);
        heights.set(4, 3, 1.0);
        let mut transport = Tilemap::new_with(6, 4, [0.0; 4]);
        for (x, y, t) in transport.iter_mut() {
            *t = [0.1 * (x % 3) as f64, 0.05 * y as f64, 0.2, 0.1];
        }
        let rules = RainfallRules::default();
        let ocean_cells = heights.values().filter(|&&h| h <= 0.0).count() as f64;

        for substeps in [1, 4, 10] {
            let rain = advect_moisture(&grid, &heights, &transport, substeps, &rules);
            let fallen: f64 = rain.values().sum();
            let supplied = ocean_cells * rules.evaporation * substeps as f64;
            assert!(rain.values().all(|&r| r >= 0.0));
            assert!(fallen <= supplied + 1e-9);
            assert!(fallen > 0.0);
        }
    }

    #[test]
    fn test_duplicate_neighbours_receive_each_share_once() {
        // Width 2, height 1: all four neighbours of a cell are the other cell.
        let grid = SphereGrid::new(1, 1).unwrap();
        let heights = Tilemap::new_with(2, 1, 0.0f32);
        let transport = Tilemap::new_with(2, 1, [0.1; 4]);
        let rules = RainfallRules {
            rain_base: 0.5,
            evaporation: 1.0,
            ..Default::default()
        };
        // Substep 1: rain 0.5, retained 0.3, receives 0.2 -> 0.5 airborne.
        // Substep 2: 1.5 airborne, rain 0.75.
        let rain = advect_moisture(&grid, &heights, &transport, 2, &rules);
        assert!(rain.values().all(|&r| (r - 1.25).abs() < 1e-12), "{:?}", rain);
    }
}
