//! Combining plate material that lands on the same cell.
//!
//! Interlacing builds a point for a cell no forward image reached by
//! sampling the previous layout around the exact back-rotated position.
//! Same-plate merging collapses one plate's candidates into one point, and
//! cross-plate resolution picks the surviving plate and records the
//! subduction on it.

use crate::sphere::{AngularPoint, GridCoordinate, SphereGrid};
use crate::tilemap::Tilemap;

use super::types::{BoundaryHistory, Crust, PlateId, PlatePoint};

/// Keeps inverse-distance weights finite when a sample sits on a cell center.
const INTERLACE_EPSILON: f64 = 1e-9;

/// Shortest signed column offset from `from` to `to`.
fn wrapped_offset(grid: &SphereGrid, from: usize, to: usize) -> i64 {
    let width = grid.width() as i64;
    let d = (to as i64 - from as i64).rem_euclid(width);
    if d > grid.half_width() as i64 {
        d - width
    } else {
        d
    }
}

/// Interpolate a point for `cell` from the previous layout.
///
/// Samples are the cell nearest `source` (the exact back-rotated position)
/// and its four neighbours, restricted to points of `plate`. Each sample is
/// weighted by inverse distance to `source`. Crust comes from the closest
/// sample; birthplace, birth time and history are weighted averages.
pub fn interlace(
    grid: &SphereGrid,
    cell: GridCoordinate,
    plate: PlateId,
    source: &AngularPoint,
    previous: &Tilemap<Option<PlatePoint>>,
) -> Option<PlatePoint> {
    let anchor = grid.snap(source);
    let mut samples: Vec<(f64, PlatePoint)> = Vec::with_capacity(5);
    let mut seen: Vec<GridCoordinate> = Vec::with_capacity(5);
    for c in std::iter::once(anchor).chain(grid.neighbors(anchor)) {
        if seen.contains(&c) {
            continue;
        }
        seen.push(c);
        if let Some(p) = previous.at(c) {
            if p.plate == plate {
                let d = source.chord_squared(&grid.angular(c)).sqrt();
                samples.push((1.0 / (d + INTERLACE_EPSILON), *p));
            }
        }
    }

    let closest = samples
        .iter()
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, p)| *p)?;
    let total: f64 = samples.iter().map(|(w, _)| w).sum();

    let birth_time = samples.iter().map(|(w, p)| w * p.birth_time as f64).sum::<f64>() / total;
    let reference = closest.birthplace;
    let dx = samples
        .iter()
        .map(|(w, p)| w * wrapped_offset(grid, reference.x, p.birthplace.x) as f64)
        .sum::<f64>()
        / total;
    let y = samples.iter().map(|(w, p)| w * p.birthplace.y as f64).sum::<f64>() / total;
    let x = (reference.x as i64 + dx.round() as i64).rem_euclid(grid.width() as i64) as usize;
    let y = (y.round() as usize).min(grid.height() - 1);

    let history_samples: Vec<(f64, BoundaryHistory)> = samples.iter().map(|(w, p)| (*w, p.history)).collect();

    Some(PlatePoint {
        position: cell,
        birthplace: GridCoordinate::new(x, y),
        birth_time: birth_time.round() as u32,
        plate,
        crust: closest.crust,
        history: BoundaryHistory::weighted_mean(&history_samples),
    })
}

/// Collapse one plate's candidates for a cell.
///
/// Any continental contributor makes the result continental, with birth
/// time, birthplace and history averaged over the continental
/// contributors. All-oceanic candidates keep the first one.
pub fn merge_same_plate(grid: &SphereGrid, candidates: &[PlatePoint]) -> Option<PlatePoint> {
    let first = *candidates.first()?;
    if candidates.len() == 1 {
        return Some(first);
    }
    let continental: Vec<&PlatePoint> = candidates.iter().filter(|p| p.is_continental()).collect();
    let Some(anchor) = continental.first() else {
        return Some(first);
    };

    let count = continental.len() as i64;
    let reference = anchor.birthplace;
    let mut birth_time: u64 = 0;
    let mut dx: i64 = 0;
    let mut y: usize = 0;
    let mut history = BoundaryHistory::default();
    for p in &continental {
        birth_time += p.birth_time as u64;
        dx += wrapped_offset(grid, reference.x, p.birthplace.x);
        y += p.birthplace.y;
        history += p.history;
    }
    let x = (reference.x as i64 + dx.div_euclid(count)).rem_euclid(grid.width() as i64) as usize;
    let crust = if continental.iter().any(|p| p.crust == Crust::Continental) {
        Crust::Continental
    } else {
        Crust::Primordial
    };

    Some(PlatePoint {
        position: first.position,
        birthplace: GridCoordinate::new(x, y / count as usize),
        birth_time: (birth_time / count as u64) as u32,
        plate: first.plate,
        crust,
        history: history.divided_by(count as u32),
    })
}

/// Pick the survivor among one merged point per plate, in plate id order.
///
/// The first continental contender survives, or the first contender when
/// none is continental. Every other contender is subducted under it at
/// step `now`. Returns the survivor and the number of subductions.
pub fn resolve_cross_plate(contenders: &[PlatePoint], now: u32) -> Option<(PlatePoint, usize)> {
    let index = contenders.iter().position(|p| p.is_continental()).unwrap_or(0);
    let mut survivor = *contenders.get(index)?;
    for (i, loser) in contenders.iter().enumerate() {
        if i != index {
            survivor.history.record_subduction(loser.is_continental(), now);
        }
    }
    Some((survivor, contenders.len() - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: usize, y: usize, plate: u16, crust: Crust) -> PlatePoint {
        PlatePoint {
            crust,
            ..PlatePoint::primordial(GridCoordinate::new(x, y), PlateId(plate))
        }
    }

    #[test]
    fn test_interlace_on_cell_center_copies_that_point() {
        let grid = SphereGrid::new(6, 6).unwrap();
        let mut previous = Tilemap::new_with(12, 6, None);
        for c in grid.cells() {
            let mut p = point(c.x, c.y, 0, Crust::Oceanic);
            p.birth_time = 4;
            previous.put(c, Some(p));
        }
        let source = grid.angular(GridCoordinate::new(3, 2));
        let p = interlace(&grid, GridCoordinate::new(4, 2), PlateId(0), &source, &previous).unwrap();
        assert_eq!(p.position, GridCoordinate::new(4, 2));
        assert_eq!(p.birthplace, GridCoordinate::new(3, 2));
        assert_eq!(p.birth_time, 4);
        assert_eq!(p.crust, Crust::Oceanic);
    }

    #[test]
    fn test_interlace_ignores_other_plates() {
        let grid = SphereGrid::new(4, 4).unwrap();
        let mut previous = Tilemap::new_with(8, 4, None);
        for c in grid.cells() {
            previous.put(c, Some(point(c.x, c.y, 1, Crust::Continental)));
        }
        let source = grid.angular(GridCoordinate::new(2, 2));
        assert!(interlace(&grid, GridCoordinate::new(2, 2), PlateId(0), &source, &previous).is_none());
    }

    #[test]
    fn test_interlace_birthplace_wraps_seam() {
        let grid = SphereGrid::new(4, 3).unwrap();
        let mut previous = Tilemap::new_with(8, 3, None);
        for c in grid.cells() {
            previous.put(c, Some(point(c.x, c.y, 0, Crust::Continental)));
        }
        // Halfway between columns 7 and 0: the average must not land mid-grid.
        let source = AngularPoint::new(7.5 * grid.d_theta(), grid.phi(1));
        let p = interlace(&grid, GridCoordinate::new(0, 1), PlateId(0), &source, &previous).unwrap();
        assert!(p.birthplace.x == 7 || p.birthplace.x == 0, "got {}", p.birthplace);
    }

    #[test]
    fn test_merge_prefers_continental_mean() {
        let grid = SphereGrid::new(8, 8).unwrap();
        let mut a = point(2, 2, 0, Crust::Continental);
        a.birthplace = GridCoordinate::new(2, 2);
        a.birth_time = 2;
        a.history.continental_buildup = 4;
        let mut b = point(2, 2, 0, Crust::Continental);
        b.birthplace = GridCoordinate::new(4, 6);
        b.birth_time = 6;
        b.history.continental_buildup = 2;
        let ocean = point(2, 2, 0, Crust::Oceanic);

        let merged = merge_same_plate(&grid, &[ocean, a, b]).unwrap();
        assert_eq!(merged.crust, Crust::Continental);
        assert_eq!(merged.birth_time, 4);
        assert_eq!(merged.birthplace, GridCoordinate::new(3, 4));
        assert_eq!(merged.history.continental_buildup, 3);
    }

    #[test]
    fn test_merge_all_oceanic_keeps_first() {
        let grid = SphereGrid::new(4, 4).unwrap();
        let mut a = point(1, 1, 0, Crust::Oceanic);
        a.birth_time = 9;
        let b = point(1, 1, 0, Crust::Oceanic);
        assert_eq!(merge_same_plate(&grid, &[a, b]), Some(a));
        assert_eq!(merge_same_plate(&grid, &[]), None);
    }

    #[test]
    fn test_cross_plate_continental_survives() {
        let ocean = point(0, 0, 0, Crust::Oceanic);
        let land = point(0, 0, 1, Crust::Continental);
        let other = point(0, 0, 2, Crust::Oceanic);
        let (survivor, lost) = resolve_cross_plate(&[ocean, land, other], 5).unwrap();
        assert_eq!(survivor.plate, PlateId(1));
        assert_eq!(lost, 2);
        assert_eq!(survivor.history.oceanic_buildup, 2);
        assert_eq!(survivor.history.oceanic_recency, 5);
        assert_eq!(survivor.history.continental_buildup, 0);
    }

    #[test]
    fn test_cross_plate_first_wins_among_oceanic() {
        let a = point(0, 0, 0, Crust::Oceanic);
        let b = point(0, 0, 3, Crust::Oceanic);
        let (survivor, _) = resolve_cross_plate(&[a, b], 1).unwrap();
        assert_eq!(survivor.plate, PlateId(0));

        let land_a = point(0, 0, 0, Crust::Continental);
        let land_b = point(0, 0, 1, Crust::Primordial);
        let (survivor, _) = resolve_cross_plate(&[land_a, land_b], 2).unwrap();
        assert_eq!(survivor.plate, PlateId(0));
        assert_eq!(survivor.history.continental_buildup, 1);
        assert_eq!(survivor.history.continental_recency, 2);
    }
}
