//! Wind as per-cell transport fractions.

use rayon::prelude::*;

use crate::rules::RainfallRules;
use crate::sphere::{GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;

/// Keeps the longitude gradient finite on the polar rows.
const MIN_COS_PHI: f64 = 1e-3;

/// Fraction of a cell's moisture handed to each neighbour per substep,
/// in neighbour order `[above, below, left, right]`.
pub type Transport = [f64; 4];

/// Wind vector toward low pressure, turned by the Coriolis deflection
/// (clockwise in the north, counter-clockwise in the south) and split over
/// the four neighbours. The total fraction grows with the gradient up to
/// `max_transport`.
pub fn wind_transport(grid: &SphereGrid, pressure: &Tilemap<f64>, rules: &RainfallRules) -> Tilemap<Transport> {
    let width = grid.width();
    let mut transport = Tilemap::new_with(width, grid.height(), [0.0; 4]);
    transport
        .as_mut_slice()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let phi = grid.phi(y);
            let cos_phi = grid.area_weight(y).max(MIN_COS_PHI);
            let deflection = if phi > 0.0 {
                -rules.coriolis_deflection
            } else if phi < 0.0 {
                rules.coriolis_deflection
            } else {
                0.0
            };
            for (x, fractions) in row.iter_mut().enumerate() {
                let [above, below, left, right] = grid.neighbors(GridCoordinate::new(x, y));
                let gx = (pressure.at(right) - pressure.at(left)) / (2.0 * grid.d_theta() * cos_phi);
                let gy = (pressure.at(above) - pressure.at(below)) / (2.0 * grid.d_phi());
                *fractions = split_transport(gx, gy, deflection, rules);
            }
        });
    transport
}

/// Fractions for one cell from its pressure gradient.
pub fn split_transport(gx: f64, gy: f64, deflection: f64, rules: &RainfallRules) -> Transport {
    let magnitude = gx.hypot(gy);
    if magnitude == 0.0 || !magnitude.is_finite() {
        return [0.0; 4];
    }
    let angle = (-gy).atan2(-gx) + deflection;
    let (north, east) = angle.sin_cos();
    let spread = north.abs() + east.abs();
    let total = rules.max_transport * (magnitude * rules.wind_scale).min(1.0);
    [
        total * north.max(0.0) / spread,
        total * (-north).max(0.0) / spread,
        total * (-east).max(0.0) / spread,
        total * east.max(0.0) / spread,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_pressure_is_calm() {
        let grid = SphereGrid::new(4, 6).unwrap();
        let pressure = Tilemap::new_with(8, 6, 1.0);
        let transport = wind_transport(&grid, &pressure, &RainfallRules::default());
        assert!(transport.values().all(|t| t.iter().all(|&f| f == 0.0)));
    }

    #[test]
    fn test_wind_blows_toward_low_pressure() {
        let rules = RainfallRules { coriolis_deflection: 0.0, ..Default::default() };
        // Pressure rising eastward: wind goes west (left).
        let t = split_transport(0.5, 0.0, 0.0, &rules);
        assert!(t[2] > 0.0);
        assert_eq!(t[3], 0.0);
        assert!(t[0].abs() < 1e-12 && t[1].abs() < 1e-12);
    }

    #[test]
    fn test_fractions_bounded_by_max_transport() {
        let rules = RainfallRules::default();
        for (gx, gy) in [(3.0, 1.0), (-0.2, 0.7), (100.0, -50.0), (0.01, 0.0)] {
            for deflection in [-0.5, 0.0, 0.5] {
                let t = split_transport(gx, gy, deflection, &rules);
                let sum: f64 = t.iter().sum();
                assert!(t.iter().all(|&f| f >= 0.0));
                assert!(sum <= rules.max_transport + 1e-12);
            }
        }
    }

    #[test]
    fn test_coriolis_turns_northern_wind_clockwise() {
        let rules = RainfallRules::default();
        // Low pressure to the north, northern hemisphere: deflected to the east.
        let t = split_transport(0.0, -1.0, -0.5, &rules);
        assert!(t[0] > 0.0);
        assert!(t[3] > 0.0);
        assert_eq!(t[2], 0.0);
    }
}
