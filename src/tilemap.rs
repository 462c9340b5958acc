//! Dense row-major grid over the longitude/latitude cells of the planet.

use crate::error::{PlanetError, Result};
use crate::sphere::GridCoordinate;

/// A 2D grid with one value per cell, wrapping horizontally.
///
/// Storage is row-major (`y` outer). Collaborators that exchange grids as
/// `[x][y]` column arrays go through [`Tilemap::to_columns`] and
/// [`Tilemap::from_columns`].
#[derive(Clone, Debug, PartialEq)]
pub struct Tilemap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Tilemap<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self::new_with(width, height, T::default())
    }
}

impl<T: Clone> Tilemap<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Build a tilemap from an `[x][y]` column array.
    pub fn from_columns(columns: &[Vec<T>]) -> Result<Self> {
        let width = columns.len();
        let height = columns.first().map(|c| c.len()).unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(PlanetError::InvalidInput("grid must not be empty".into()));
        }
        if let Some(x) = columns.iter().position(|c| c.len() != height) {
            return Err(PlanetError::InvalidInput(format!(
                "column {} has {} rows, expected {}",
                x,
                columns[x].len(),
                height
            )));
        }

        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for column in columns {
                data.push(column[y].clone());
            }
        }
        Ok(Self { width, height, data })
    }

    /// Export as an `[x][y]` column array.
    pub fn to_columns(&self) -> Vec<Vec<T>> {
        (0..self.width)
            .map(|x| (0..self.height).map(|y| self.get(x, y).clone()).collect())
            .collect()
    }

    /// Index into the data array; x wraps around the date line.
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x % self.width
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = self.index(x, y);
        &mut self.data[idx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    #[inline]
    pub fn at(&self, c: GridCoordinate) -> &T {
        self.get(c.x, c.y)
    }

    #[inline]
    pub fn at_mut(&mut self, c: GridCoordinate) -> &mut T {
        self.get_mut(c.x, c.y)
    }

    #[inline]
    pub fn put(&mut self, c: GridCoordinate, value: T) {
        self.set(c.x, c.y, value);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn same_shape<U>(&self, other: &Tilemap<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Same-shaped tilemap with every value mapped.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Tilemap<U> {
        Tilemap {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Iterate over all cells with their coordinates, raster order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(idx, val)| (idx % width, idx / width, val))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut T)> {
        let width = self.width;
        self.data
            .iter_mut()
            .enumerate()
            .map(move |(idx, val)| (idx % width, idx / width, val))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

impl Tilemap<f32> {
    /// (min, max) over all cells.
    pub fn range(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}
