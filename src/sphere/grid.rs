//! The grid context: resolution, cached row trigonometry and the geometric
//! primitives every stage builds on.

use std::f64::consts::{FRAC_PI_2, PI};

use crate::error::{invalid_config, Result};
use crate::rules::BaseRules;

use super::angular::{small_angle_cos, AngularPoint, Rotation, RotationAngles};
use super::coord::GridCoordinate;

/// Per-row latitude cache.
#[derive(Clone, Copy, Debug)]
struct RowAngles {
    phi: f64,
    cos_phi: f64,
    sin_phi: f64,
}

/// Longitude/latitude grid with date-line and pole wraparound.
#[derive(Clone, Debug)]
pub struct SphereGrid {
    half_width: usize,
    width: usize,
    height: usize,
    d_theta: f64,
    d_phi: f64,
    phi_shift: f64,
    /// Column distance below which the polynomial cosine is used.
    small_angle_limit: f64,
    rows: Vec<RowAngles>,
}

impl SphereGrid {
    pub fn new(half_width: usize, height: usize) -> Result<Self> {
        if half_width == 0 || height == 0 {
            return Err(invalid_config(format!(
                "grid dimensions must be at least 1 (half_width = {}, height = {})",
                half_width, height
            )));
        }

        let d_theta = PI / half_width as f64;
        let d_phi = PI / height as f64;
        let phi_shift = -FRAC_PI_2 + d_phi / 2.0;
        let rows = (0..height)
            .map(|y| {
                let phi = phi_shift + y as f64 * d_phi;
                RowAngles { phi, cos_phi: phi.cos(), sin_phi: phi.sin() }
            })
            .collect();

        Ok(Self {
            half_width,
            width: 2 * half_width,
            height,
            d_theta,
            d_phi,
            phi_shift,
            small_angle_limit: half_width as f64 / 6.0,
            rows,
        })
    }

    pub fn from_rules(base: &BaseRules) -> Result<Self> {
        Self::new(base.grid_half_width, base.grid_height)
    }

    pub fn half_width(&self) -> usize {
        self.half_width
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    pub fn d_theta(&self) -> f64 {
        self.d_theta
    }

    pub fn d_phi(&self) -> f64 {
        self.d_phi
    }

    pub fn theta(&self, x: usize) -> f64 {
        x as f64 * self.d_theta
    }

    pub fn phi(&self, y: usize) -> f64 {
        self.rows[y].phi
    }

    /// Relative solid angle of a cell in row `y` (1 at the equator).
    pub fn area_weight(&self, y: usize) -> f64 {
        self.rows[y].cos_phi
    }

    pub fn contains(&self, c: GridCoordinate) -> bool {
        c.x < self.width && c.y < self.height
    }

    #[inline]
    pub fn index(&self, c: GridCoordinate) -> usize {
        c.y * self.width + c.x
    }

    #[inline]
    pub fn coordinate(&self, index: usize) -> GridCoordinate {
        GridCoordinate::new(index % self.width, index / self.width)
    }

    /// All cells in raster order.
    pub fn cells(&self) -> impl Iterator<Item = GridCoordinate> + '_ {
        (0..self.cell_count()).map(move |i| self.coordinate(i))
    }

    pub fn angular(&self, c: GridCoordinate) -> AngularPoint {
        let row = &self.rows[c.y];
        AngularPoint {
            theta: self.theta(c.x),
            phi: row.phi,
            cos_phi: row.cos_phi,
            sin_phi: row.sin_phi,
        }
    }

    #[inline]
    fn antipodal_x(&self, x: usize) -> usize {
        (x + self.half_width) % self.width
    }

    /// `[above, below, left, right]`. Stepping past a pole lands on the same
    /// row at the antipodal longitude.
    pub fn neighbors(&self, c: GridCoordinate) -> [GridCoordinate; 4] {
        let above = if c.y + 1 == self.height {
            GridCoordinate::new(self.antipodal_x(c.x), c.y)
        } else {
            GridCoordinate::new(c.x, c.y + 1)
        };
        let below = if c.y == 0 {
            GridCoordinate::new(self.antipodal_x(c.x), c.y)
        } else {
            GridCoordinate::new(c.x, c.y - 1)
        };
        let left = GridCoordinate::new((c.x + self.width - 1) % self.width, c.y);
        let right = GridCoordinate::new((c.x + 1) % self.width, c.y);
        [above, below, left, right]
    }

    /// Column distance wrapped to at most `half_width`.
    #[inline]
    pub fn column_distance(&self, a: usize, b: usize) -> usize {
        let dx = a.abs_diff(b) % self.width;
        if dx > self.half_width {
            self.width - dx
        } else {
            dx
        }
    }

    /// Chord-squared distance between two cells.
    pub fn distance(&self, a: GridCoordinate, b: GridCoordinate) -> f64 {
        if a == b {
            return 0.0;
        }
        let ra = &self.rows[a.y];
        let rb = &self.rows[b.y];
        let dx = self.column_distance(a.x, b.x) as f64;
        let angle = dx * self.d_theta;
        let cos_dx = if dx < self.small_angle_limit {
            small_angle_cos(angle)
        } else {
            angle.cos()
        };
        (2.0 * (1.0 - ra.sin_phi * rb.sin_phi - ra.cos_phi * rb.cos_phi * cos_dx)).abs()
    }

    /// Chord-squared value matching an angular radius.
    pub fn chord_squared_for(angle: f64) -> f64 {
        2.0 * (1.0 - angle.cos())
    }

    /// Conservative box around the cells within angular `radius` of `center`.
    pub fn range_bounds(&self, center: GridCoordinate, radius: f64) -> CellBounds {
        let radius = radius.max(0.0);
        let phi_c = self.rows[center.y].phi;
        let lo = phi_c - radius;
        let hi = phi_c + radius;

        let max_row = self.height as i64 - 1;
        let y_min = (((lo - self.phi_shift) / self.d_phi).floor() as i64).clamp(0, max_row) as usize;
        let y_max = (((hi - self.phi_shift) / self.d_phi).ceil() as i64).clamp(0, max_row) as usize;

        let full = CellBounds {
            x_min: 0,
            x_max: self.width as i64 - 1,
            y_min,
            y_max,
            width: self.width,
        };
        if lo <= -FRAC_PI_2 || hi >= FRAC_PI_2 {
            return full;
        }

        let spread = radius.sin() / phi_c.cos();
        if spread >= 1.0 {
            return full;
        }
        let extent = (spread.asin() / self.d_theta).ceil() as i64 + 1;
        if 2 * extent + 1 >= self.width as i64 {
            return full;
        }
        let cx = center.x as i64;
        CellBounds {
            x_min: cx - extent,
            x_max: cx + extent,
            y_min,
            y_max,
            width: self.width,
        }
    }

    /// Nearest cell to a continuous position.
    pub fn snap(&self, p: &AngularPoint) -> GridCoordinate {
        let row = ((p.phi - self.phi_shift) / self.d_phi).round() as i64;
        let col = (p.theta / self.d_theta).round() as i64;
        GridCoordinate::new(
            col.rem_euclid(self.width as i64) as usize,
            row.clamp(0, self.height as i64 - 1) as usize,
        )
    }

    pub fn rotate_exact(&self, c: GridCoordinate, rotation: &Rotation) -> AngularPoint {
        rotation.rotate_point(&self.angular(c))
    }

    pub fn rotate(&self, c: GridCoordinate, rotation: &Rotation) -> GridCoordinate {
        self.snap(&self.rotate_exact(c, rotation))
    }

    /// Convenience for a one-off rotation from its three angles.
    pub fn rotate_by(&self, c: GridCoordinate, angles: &RotationAngles) -> GridCoordinate {
        self.rotate(c, &Rotation::from_angles(angles))
    }

    pub fn test_momentum(&self, c: GridCoordinate, uniform: f64, threshold: f64) -> bool {
        self.angular(c).test_momentum(uniform, threshold)
    }
}

/// Rectangular cell range. Columns are a signed span that may run past
/// either edge of the grid; [`CellBounds::columns`] reduces them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellBounds {
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: usize,
    pub y_max: usize,
    width: usize,
}

impl CellBounds {
    pub fn wraps_seam(&self) -> bool {
        self.x_min < 0 || self.x_max >= self.width as i64
    }

    pub fn contains_row(&self, y: usize) -> bool {
        y >= self.y_min && y <= self.y_max
    }

    /// Wrapped columns, each at most once.
    pub fn columns(&self) -> impl Iterator<Item = usize> {
        let width = self.width as i64;
        (self.x_min..=self.x_max).map(move |x| x.rem_euclid(width) as usize)
    }

    pub fn cells(&self) -> impl Iterator<Item = GridCoordinate> + '_ {
        (self.y_min..=self.y_max)
            .flat_map(move |y| self.columns().map(move |x| GridCoordinate::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(half_width: usize, height: usize) -> SphereGrid {
        SphereGrid::new(half_width, height).unwrap()
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(SphereGrid::new(0, 4).is_err());
        assert!(SphereGrid::new(4, 0).is_err());
    }

    #[test]
    fn test_neighbor_reciprocity_everywhere() {
        for (hw, h) in [(1, 1), (1, 3), (2, 4), (5, 7), (8, 2)] {
            let g = grid(hw, h);
            for c in g.cells() {
                let ns = g.neighbors(c);
                assert_eq!(ns.len(), 4);
                for n in ns {
                    assert!(g.contains(n));
                    assert!(
                        g.neighbors(n).contains(&c),
                        "{} is not a neighbour of its neighbour {} ({}x{})",
                        c, n, hw, h
                    );
                }
            }
        }
    }

    #[test]
    fn test_pole_wrap_goes_antipodal() {
        let g = grid(4, 6);
        let [above, _, _, _] = g.neighbors(GridCoordinate::new(1, 5));
        assert_eq!(above, GridCoordinate::new(5, 5));
        let [_, below, _, _] = g.neighbors(GridCoordinate::new(6, 0));
        assert_eq!(below, GridCoordinate::new(2, 0));
        let [_, _, left, right] = g.neighbors(GridCoordinate::new(0, 3));
        assert_eq!(left, GridCoordinate::new(7, 3));
        assert_eq!(right, GridCoordinate::new(1, 3));
    }

    #[test]
    fn test_distance_symmetric_and_zero_on_self() {
        let g = grid(12, 9);
        let cells: Vec<_> = g.cells().collect();
        for &a in cells.iter().step_by(7) {
            assert_eq!(g.distance(a, a), 0.0);
            for &b in cells.iter().step_by(5) {
                assert_eq!(g.distance(a, b), g.distance(b, a));
            }
        }
    }

    #[test]
    fn test_small_angle_distance_matches_exact() {
        let g = grid(60, 30);
        let a = GridCoordinate::new(10, 12);
        for dx in 0..10 {
            for y in [0, 7, 15, 29] {
                let b = GridCoordinate::new(10 + dx, y);
                let exact = g.angular(a).chord_squared(&g.angular(b));
                assert!((g.distance(a, b) - exact).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_distance_wraps_seam() {
        let g = grid(8, 8);
        let a = GridCoordinate::new(0, 4);
        let b = GridCoordinate::new(15, 4);
        let c = GridCoordinate::new(1, 4);
        assert!((g.distance(a, b) - g.distance(a, c)).abs() < 1e-12);
    }

    #[test]
    fn test_range_bounds_contains_every_cell_in_radius() {
        let g = grid(18, 18);
        for center in [
            GridCoordinate::new(0, 9),
            GridCoordinate::new(35, 3),
            GridCoordinate::new(17, 16),
            GridCoordinate::new(5, 0),
        ] {
            for radius in [0.05, 0.3, 0.8, 1.7] {
                let bounds = g.range_bounds(center, radius);
                let limit = SphereGrid::chord_squared_for(radius);
                let inside: std::collections::HashSet<_> = bounds.cells().collect();
                for c in g.cells() {
                    if g.distance(center, c) <= limit {
                        assert!(inside.contains(&c), "{} missing around {} r={}", c, center, radius);
                    }
                }
            }
        }
    }

    #[test]
    fn test_range_bounds_signals_seam_wrap() {
        let g = grid(18, 18);
        let bounds = g.range_bounds(GridCoordinate::new(0, 9), 0.3);
        assert!(bounds.wraps_seam());
        let columns: Vec<_> = bounds.columns().collect();
        let unique: std::collections::HashSet<_> = columns.iter().collect();
        assert_eq!(columns.len(), unique.len());
        assert!(columns.contains(&35));
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let g = grid(6, 5);
        let angles = RotationAngles::new(1.0, 0.3, 0.0);
        for c in g.cells() {
            assert_eq!(g.rotate_by(c, &angles), c);
        }
    }

    #[test]
    fn test_polar_axis_rotation_shifts_columns() {
        let g = grid(6, 5);
        // Two columns per step: 2 * d_theta
        let angles = RotationAngles::new(0.0, FRAC_PI_2, 2.0 * g.d_theta());
        let moved = g.rotate_by(GridCoordinate::new(11, 2), &angles);
        assert_eq!(moved, GridCoordinate::new(1, 2));

        let back = g.rotate_by(moved, &angles.inverse());
        assert_eq!(back, GridCoordinate::new(11, 2));
    }

    #[test]
    fn test_area_weight_peaks_at_equator() {
        let g = grid(4, 8);
        assert!(g.area_weight(3) > g.area_weight(0));
        assert!((g.area_weight(3) - g.area_weight(4)).abs() < 1e-12);
    }
}
