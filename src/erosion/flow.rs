//! Steepest-descent flow directions on the four-neighbour sphere grid.

use rayon::prelude::*;

use crate::sphere::{GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;

/// The strictly lowest neighbour below `height`, first in neighbour order
/// on ties. `None` for a local minimum or a flat.
pub fn lowest_neighbor<F>(grid: &SphereGrid, c: GridCoordinate, height: f32, height_of: F) -> Option<(GridCoordinate, f32)>
where
    F: Fn(GridCoordinate) -> f32,
{
    let mut best: Option<(GridCoordinate, f32)> = None;
    for n in grid.neighbors(c) {
        let h = height_of(n);
        if h < height && best.map_or(true, |(_, b)| h < b) {
            best = Some((n, h));
        }
    }
    best
}

/// Lowest of the four neighbour heights.
pub fn min_neighbor_height<F>(grid: &SphereGrid, c: GridCoordinate, height_of: F) -> f32
where
    F: Fn(GridCoordinate) -> f32,
{
    grid.neighbors(c)
        .iter()
        .map(|&n| height_of(n))
        .fold(f32::INFINITY, f32::min)
}

/// Height one unit above `h`, or the next representable value when a unit
/// step is lost to rounding.
pub fn raise_above(h: f32) -> f32 {
    let unit = h + 1.0;
    if unit > h || !h.is_finite() {
        return unit;
    }
    let bits = h.to_bits();
    if h == 0.0 {
        f32::from_bits(1)
    } else if h > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

/// Downhill target per cell.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowGraph {
    targets: Tilemap<Option<GridCoordinate>>,
}

impl FlowGraph {
    pub fn build(grid: &SphereGrid, heights: &Tilemap<f32>) -> Self {
        let width = grid.width();
        let mut targets = Tilemap::new_with(width, grid.height(), None);
        targets
            .as_mut_slice()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, target) in row.iter_mut().enumerate() {
                    let c = GridCoordinate::new(x, y);
                    *target = lowest_neighbor(grid, c, *heights.at(c), |n| *heights.at(n)).map(|(n, _)| n);
                }
            });
        Self { targets }
    }

    pub fn target(&self, c: GridCoordinate) -> Option<GridCoordinate> {
        *self.targets.at(c)
    }

    pub fn targets(&self) -> &Tilemap<Option<GridCoordinate>> {
        &self.targets
    }

    /// Cells draining through each cell, itself included, following targets
    /// from the highest cell down.
    pub fn accumulation(&self, heights: &Tilemap<f32>) -> Tilemap<u32> {
        let mut order: Vec<(usize, usize, f32)> = heights.iter().map(|(x, y, &h)| (x, y, h)).collect();
        order.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut count = Tilemap::new_with(heights.width, heights.height, 1u32);
        for (x, y, _) in order {
            if let Some(t) = self.target(GridCoordinate::new(x, y)) {
                let upstream = *count.get(x, y);
                *count.at_mut(t) += upstream;
            }
        }
        count
    }
}
