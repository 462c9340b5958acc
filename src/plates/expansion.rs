//! Region growth on the plate ownership map.
//!
//! [`flood_fill`] collects one connected region of active cells.
//! [`expand_wavefront`] grows existing plates breadth-first until every
//! cell has an owner; generation and the mover both finish with it.

use std::collections::VecDeque;

use crate::error::{invariant, Result};
use crate::sphere::{GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;

use super::types::PlateId;

/// Connected active cells reachable from `start`, marking each as visited.
/// Cells come out in discovery order, `start` first.
pub fn flood_fill(
    grid: &SphereGrid,
    active: &Tilemap<bool>,
    visited: &mut Tilemap<bool>,
    start: GridCoordinate,
) -> Vec<GridCoordinate> {
    let mut region = Vec::new();
    let mut stack = vec![start];
    visited.put(start, true);

    while let Some(c) = stack.pop() {
        region.push(c);
        for n in grid.neighbors(c) {
            if *active.at(n) && !*visited.at(n) {
                visited.put(n, true);
                stack.push(n);
            }
        }
    }
    region
}

/// Claim every unowned cell for the plate whose frontier reaches it first.
///
/// The queue is seeded plate by plate in id order, each plate's cells in
/// raster order. A cell goes to the first plate that dequeues it; later
/// entries for the same cell are dropped. Returns the claims in the order
/// they were made.
pub fn expand_wavefront(
    grid: &SphereGrid,
    owner: &mut Tilemap<Option<PlateId>>,
    plate_count: usize,
) -> Result<Vec<(GridCoordinate, PlateId)>> {
    let mut by_plate: Vec<Vec<GridCoordinate>> = vec![Vec::new(); plate_count];
    let mut unclaimed = 0;
    for c in grid.cells() {
        match owner.at(c) {
            Some(id) if id.index() < plate_count => by_plate[id.index()].push(c),
            Some(id) => return Err(invariant(format!("{} at {} is out of range", id, c))),
            None => unclaimed += 1,
        }
    }
    if unclaimed == 0 {
        return Ok(Vec::new());
    }

    let mut queue = VecDeque::new();
    for (index, cells) in by_plate.iter().enumerate() {
        let id = PlateId::from_index(index);
        for &c in cells {
            for n in grid.neighbors(c) {
                if owner.at(n).is_none() {
                    queue.push_back((n, id));
                }
            }
        }
    }

    let mut claims = Vec::with_capacity(unclaimed);
    while let Some((c, id)) = queue.pop_front() {
        if owner.at(c).is_some() {
            continue;
        }
        owner.put(c, Some(id));
        claims.push((c, id));
        for n in grid.neighbors(c) {
            if owner.at(n).is_none() {
                queue.push_back((n, id));
            }
        }
    }

    if claims.len() != unclaimed {
        return Err(invariant(format!(
            "wavefront left {} of {} cells unclaimed",
            unclaimed - claims.len(),
            unclaimed
        )));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flood_fill_follows_pole_wrap() {
        let grid = SphereGrid::new(2, 3).unwrap();
        let mut active = Tilemap::new_with(4, 3, false);
        // Top row cells 0 and 2 are antipodal, so they touch over the pole.
        active.set(0, 2, true);
        active.set(2, 2, true);
        let mut visited = Tilemap::new_with(4, 3, false);
        let region = flood_fill(&grid, &active, &mut visited, GridCoordinate::new(0, 2));
        assert_eq!(region.len(), 2);
        assert!(*visited.get(2, 2));
    }

    #[test]
    fn test_wavefront_claims_everything() {
        let grid = SphereGrid::new(6, 5).unwrap();
        let mut owner = Tilemap::new_with(12, 5, None);
        owner.set(0, 0, Some(PlateId(0)));
        owner.set(6, 3, Some(PlateId(1)));
        owner.set(9, 4, Some(PlateId(2)));
        let claims = expand_wavefront(&grid, &mut owner, 3).unwrap();
        assert_eq!(claims.len(), 60 - 3);
        assert!(owner.values().all(|o| o.is_some()));
    }

    #[test]
    fn test_wavefront_lower_id_wins_ties() {
        // Both plates sit two columns from (2, 0); plate 0 is enqueued first.
        let grid = SphereGrid::new(4, 1).unwrap();
        let mut owner = Tilemap::new_with(8, 1, None);
        owner.set(0, 0, Some(PlateId(0)));
        owner.set(4, 0, Some(PlateId(1)));
        expand_wavefront(&grid, &mut owner, 2).unwrap();
        assert_eq!(*owner.get(2, 0), Some(PlateId(0)));
        assert_eq!(*owner.get(6, 0), Some(PlateId(0)));
    }

    #[test]
    fn test_wavefront_without_plates_is_invariant_error() {
        let grid = SphereGrid::new(2, 2).unwrap();
        let mut owner = Tilemap::new_with(4, 2, None);
        assert!(expand_wavefront(&grid, &mut owner, 1).is_err());
    }
}
