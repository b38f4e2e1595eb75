use std::{
    fmt,
    ops::{Index, IndexMut},
};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({row}, {col}) are out of bounds for grid size ({rows}, {cols})")]
    OutOfBounds {
        row: i64,
        col: i64,
        rows: usize,
        cols: usize,
    },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Provides methods for accessing and modifying elements via (row, col) coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, every cell set to `value`.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self
    where
        T: Clone,
    {
        let size = rows.checked_mul(cols).expect("Grid size overflow");
        Grid {
            rows,
            cols,
            cells: vec![value; size],
        }
    }

    /// Returns the number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Converts (row, col) coordinates to a flat vector index.
    ///
    /// Returns `None` if the coordinates are out of bounds.
    #[inline]
    pub fn coords_to_index(&self, row: usize, col: usize) -> Option<usize> {
        if self.is_valid(row, col) {
            Some(row * self.cols + col)
        } else {
            None
        }
    }

    /// Converts a signed position to a flat vector index, rejecting negatives.
    #[inline]
    fn position_to_index(&self, position: Position) -> Option<usize> {
        let row = usize::try_from(position.row).ok()?;
        let col = usize::try_from(position.col).ok()?;
        self.coords_to_index(row, col)
    }

    /// Checks if the given coordinates are within the grid boundaries.
    #[inline]
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    /// Checks if a (possibly negative) position lies on the grid.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        self.position_to_index(position).is_some()
    }

    /// Gets an immutable reference to the cell at the given coordinates.
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        let index = self.coords_to_index(row, col)?;
        self.cells.get(index)
    }

    /// Gets a mutable reference to the cell at `position`, `None` when off the grid.
    pub fn get_mut(&mut self, position: Position) -> Option<&mut T> {
        let index = self.position_to_index(position)?;
        self.cells.get_mut(index)
    }

    /// Sets the value of the cell at `position`.
    ///
    /// Returns `Err(GridError::OutOfBounds)` if the position is off the grid.
    pub fn set(&mut self, position: Position, value: T) -> Result<(), GridError> {
        let index = self
            .position_to_index(position)
            .ok_or(GridError::OutOfBounds {
                row: position.row,
                col: position.col,
                rows: self.rows,
                cols: self.cols,
            })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns an iterator over the rows of the grid, each as a slice.
    pub fn rows_iter(&self) -> impl Iterator<Item = &[T]> {
        self.cells.chunks(self.cols.max(1))
    }

    /// Returns a slice containing all cells in the grid.
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }
}

/// Allows indexing the grid using `(row, col)` coordinates for immutable access.
impl<T> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: (usize, usize)) -> &Self::Output {
        let (row, col) = index;
        match self.coords_to_index(row, col) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                row, col, self.rows, self.cols
            ),
        }
    }
}

/// Indexing using Position coordinates for access
impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Position) -> &Self::Output {
        match self.position_to_index(index) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                index, self.rows, self.cols
            ),
        }
    }
}

/// Indexing using Position coordinates for mutable access
impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: Position) -> &mut Self::Output {
        let (rows, cols) = (self.rows, self.cols);
        match self.position_to_index(index) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                index, rows, cols
            ),
        }
    }
}

/// One text line per row; handy for logs and plain-terminal drivers.
impl fmt::Display for Grid<char> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows_iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for glyph in row {
                write!(f, "{glyph}")?;
            }
        }
        Ok(())
    }
}
