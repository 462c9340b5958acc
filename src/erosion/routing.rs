//! Water routing worklist.
//!
//! Water always moves to the strictly lowest neighbour. A wet local minimum
//! is raised one unit above its lowest neighbour, which turns it into a lake
//! cell and lets its water spill on the next visit. Raises stop at a fixed
//! ceiling, so routing always terminates.
//!
//! The grid is cut into longitude bands that are routed in parallel. Each
//! band only writes its own columns; water leaving a band is parked and
//! delivered by a final pass over the whole grid.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;

use crate::error::{invariant, Result};
use crate::sphere::{GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;

use super::flow::{lowest_neighbor, min_neighbor_height, raise_above};

/// Limits shared by every band.
#[derive(Clone, Copy, Debug)]
pub struct RoutingLimits {
    /// No lake is raised above this height.
    pub ceiling: f32,
    /// Total lake raises allowed before routing is declared stuck.
    pub raise_budget: usize,
    pub water_threshold: f32,
    pub erosion_rate: f32,
}

/// Whole-grid routing state.
#[derive(Clone, Debug)]
pub struct RoutingField {
    pub heights: Tilemap<f32>,
    pub water: Tilemap<f32>,
    pub flow: Tilemap<f32>,
    pub erosion: Tilemap<f32>,
    pub lakes: Tilemap<bool>,
}

impl RoutingField {
    pub fn new(heights: Tilemap<f32>, water: Tilemap<f32>) -> Self {
        let (w, h) = (heights.width, heights.height);
        Self {
            heights,
            water,
            flow: Tilemap::new_with(w, h, 0.0),
            erosion: Tilemap::new_with(w, h, 0.0),
            lakes: Tilemap::new_with(w, h, false),
        }
    }
}

/// Entry in the worklist: highest cell first, earlier rank first on ties.
#[derive(Clone, Copy)]
struct QueuedCell {
    cell: GridCoordinate,
    height: f32,
    rank: usize,
}

impl PartialEq for QueuedCell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedCell {}

impl PartialOrd for QueuedCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedCell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.height
            .partial_cmp(&other.height)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.rank.cmp(&self.rank))
    }
}

/// Routing state for a contiguous range of columns.
pub struct Band {
    x0: usize,
    columns: usize,
    heights: Vec<f32>,
    water: Vec<f32>,
    flow: Vec<f32>,
    erosion: Vec<f32>,
    lakes: Vec<bool>,
    queued: Vec<bool>,
    worklist: BinaryHeap<QueuedCell>,
    next_rank: usize,
    /// Water addressed to cells outside the band.
    parked: Vec<(GridCoordinate, f32)>,
    pub raises: usize,
    /// Local minima that could not be raised further.
    pub stalled: usize,
}

impl Band {
    pub fn extract(field: &RoutingField, range: Range<usize>) -> Self {
        let x0 = range.start;
        let columns = range.len();
        let rows = field.heights.height;
        let take = |map: &Tilemap<f32>| -> Vec<f32> {
            (0..rows).flat_map(|y| range.clone().map(move |x| (x, y))).map(|(x, y)| *map.get(x, y)).collect()
        };
        let lakes = (0..rows)
            .flat_map(|y| range.clone().map(move |x| (x, y)))
            .map(|(x, y)| *field.lakes.get(x, y))
            .collect();
        Self {
            x0,
            columns,
            heights: take(&field.heights),
            water: take(&field.water),
            flow: take(&field.flow),
            erosion: take(&field.erosion),
            lakes,
            queued: vec![false; columns * rows],
            worklist: BinaryHeap::new(),
            next_rank: 0,
            parked: Vec::new(),
            raises: 0,
            stalled: 0,
        }
    }

    fn owns(&self, c: GridCoordinate) -> bool {
        c.x >= self.x0 && c.x < self.x0 + self.columns
    }

    fn local(&self, c: GridCoordinate) -> usize {
        c.y * self.columns + (c.x - self.x0)
    }

    fn height_at(&self, c: GridCoordinate, outside: &Tilemap<f32>) -> f32 {
        if self.owns(c) {
            self.heights[self.local(c)]
        } else {
            *outside.at(c)
        }
    }

    fn push(&mut self, c: GridCoordinate) {
        let i = self.local(c);
        if self.queued[i] {
            return;
        }
        self.queued[i] = true;
        self.worklist.push(QueuedCell {
            cell: c,
            height: self.heights[i],
            rank: self.next_rank,
        });
        self.next_rank += 1;
    }

    /// Every wet land cell of the band, highest first.
    pub fn wet_cells(&self) -> Vec<GridCoordinate> {
        let rows = self.heights.len() / self.columns.max(1);
        let mut cells: Vec<GridCoordinate> = (0..rows)
            .flat_map(|y| (self.x0..self.x0 + self.columns).map(move |x| GridCoordinate::new(x, y)))
            .filter(|&c| {
                let i = self.local(c);
                self.water[i] > 0.0 && self.heights[i] > 0.0
            })
            .collect();
        cells.sort_by(|a, b| {
            let ha = self.heights[self.local(*a)];
            let hb = self.heights[self.local(*b)];
            hb.total_cmp(&ha).then(a.cmp(b))
        });
        cells
    }

    /// Drain the worklist seeded with `seeds` (in the given order).
    pub fn run(
        &mut self,
        grid: &SphereGrid,
        outside: &Tilemap<f32>,
        seeds: &[GridCoordinate],
        limits: &RoutingLimits,
    ) -> Result<()> {
        for &c in seeds {
            if self.owns(c) {
                self.push(c);
            }
        }

        while let Some(entry) = self.worklist.pop() {
            let c = entry.cell;
            let i = self.local(c);
            self.queued[i] = false;

            let water = self.water[i];
            let h = self.heights[i];
            // The ocean keeps whatever reaches it.
            if water <= 0.0 || h <= 0.0 {
                continue;
            }

            match lowest_neighbor(grid, c, h, |n| self.height_at(n, outside)) {
                Some((target, target_height)) => {
                    self.water[i] = 0.0;
                    self.flow[i] += water;
                    self.erosion[i] += limits.erosion_rate * water * (h - target_height);
                    if self.owns(target) {
                        let t = self.local(target);
                        self.water[t] += water;
                        self.push(target);
                    } else {
                        self.parked.push((target, water));
                    }
                }
                None => {
                    let area = grid.area_weight(c.y) as f32;
                    if water <= limits.water_threshold * area {
                        continue;
                    }
                    let raised = raise_above(min_neighbor_height(grid, c, |n| self.height_at(n, outside)));
                    if raised <= h || raised > limits.ceiling {
                        self.stalled += 1;
                        continue;
                    }
                    self.heights[i] = raised;
                    self.lakes[i] = true;
                    self.raises += 1;
                    if self.raises > limits.raise_budget {
                        return Err(invariant(format!(
                            "lake filling exceeded {} raises near {}",
                            limits.raise_budget, c
                        )));
                    }
                    self.push(c);
                }
            }
        }
        Ok(())
    }

    /// Copy the band back into the field and hand over the parked water.
    pub fn write_back(self, field: &mut RoutingField) -> Vec<(GridCoordinate, f32)> {
        let rows = field.heights.height;
        for y in 0..rows {
            for dx in 0..self.columns {
                let i = y * self.columns + dx;
                let x = self.x0 + dx;
                field.heights.set(x, y, self.heights[i]);
                field.water.set(x, y, self.water[i]);
                field.flow.set(x, y, self.flow[i]);
                field.erosion.set(x, y, self.erosion[i]);
                field.lakes.set(x, y, self.lakes[i]);
            }
        }
        self.parked
    }
}

/// Contiguous column ranges, as even as possible.
pub fn band_ranges(width: usize, bands: usize) -> Vec<Range<usize>> {
    let bands = bands.clamp(1, width.max(1));
    (0..bands).map(|b| (b * width / bands)..((b + 1) * width / bands)).collect()
}
