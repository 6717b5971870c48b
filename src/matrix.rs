//! The dense 2-D matrix container.
//!
//! A [`Matrix`] owns its elements in one flat row-major buffer. The shape
//! is fixed at construction and `data.len() == rows * columns` always
//! holds; a ragged row-grouped source is rejected before anything is
//! committed. Indexing is bounds-checked — an out-of-range access panics
//! with the offending coordinates rather than touching memory it must not.
//!
//! Matrices compare equal when their shapes match and every element
//! pairwise matches, and hashing combines shape and all elements, so the
//! two stay consistent.

use std::fmt;

use crate::error::ShapeError;

/// A dense 2-D value container with row-major storage.
///
/// # Example
///
/// ```rust
/// use densemat::matrix::Matrix;
///
/// let m = Matrix::from_rows(&[vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
/// assert_eq!(m.rows(), 2);
/// assert_eq!(m.columns(), 3);
/// assert_eq!(m[(1, 2)], 6);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Matrix<T> {
    rows: usize,
    columns: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Matrix<T> {
    /// Creates a matrix of the given dimensions filled with `T::default()`.
    pub fn new(rows: usize, columns: usize) -> Self {
        Matrix {
            rows,
            columns,
            data: vec![T::default(); rows * columns],
        }
    }
}

impl<T> Matrix<T> {
    /// Creates a matrix from a flat row-major buffer.
    ///
    /// Fails with [`ShapeError::DataLength`] if the buffer does not hold
    /// exactly `rows * columns` elements.
    pub fn from_vec(rows: usize, columns: usize, data: Vec<T>) -> Result<Self, ShapeError> {
        if data.len() != rows * columns {
            return Err(ShapeError::DataLength {
                rows,
                columns,
                actual: data.len(),
            });
        }
        Ok(Matrix {
            rows,
            columns,
            data,
        })
    }

    /// Creates a matrix from row-grouped data.
    ///
    /// Every row must have the same length as row 0. On the first mismatch
    /// this fails with [`ShapeError::Ragged`] naming the offending row and
    /// both lengths; nothing is allocated for the matrix in that case.
    ///
    /// # Example
    ///
    /// ```rust
    /// use densemat::error::ShapeError;
    /// use densemat::matrix::Matrix;
    ///
    /// let err = Matrix::from_rows(&[vec![1, 2], vec![3]]).unwrap_err();
    /// assert_eq!(err, ShapeError::Ragged { expected: 2, actual: 1, row: 1 });
    /// ```
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self, ShapeError>
    where
        T: Clone,
    {
        let columns = rows.first().map_or(0, Vec::len);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns {
                return Err(ShapeError::Ragged {
                    expected: columns,
                    actual: row.len(),
                    row: i,
                });
            }
        }
        let mut data = Vec::with_capacity(rows.len() * columns);
        for row in rows {
            data.extend_from_slice(row);
        }
        Ok(Matrix {
            rows: rows.len(),
            columns,
            data,
        })
    }

    /// Builds a matrix from parts already known to be consistent.
    pub(crate) fn from_raw(rows: usize, columns: usize, data: Vec<T>) -> Self {
        debug_assert_eq!(rows * columns, data.len());
        Matrix {
            rows,
            columns,
            data,
        }
    }

    /// The number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The number of columns.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Total number of elements (`rows * columns`).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the matrix holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The elements in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns a reference to the element at (`row`, `column`).
    ///
    /// # Panics
    /// Panics if either coordinate is out of range.
    pub fn get(&self, row: usize, column: usize) -> &T {
        self.check_bounds(row, column);
        &self.data[row * self.columns + column]
    }

    /// Overwrites the element at (`row`, `column`).
    ///
    /// # Panics
    /// Panics if either coordinate is out of range.
    pub fn set(&mut self, row: usize, column: usize, value: T) {
        self.check_bounds(row, column);
        self.data[row * self.columns + column] = value;
    }

    /// Copies out a single row.
    ///
    /// # Panics
    /// Panics if `row` is out of range.
    pub fn row(&self, row: usize) -> Vec<T>
    where
        T: Clone,
    {
        assert!(row < self.rows, "row {row} out of range for {} rows", self.rows);
        self.data[row * self.columns..(row + 1) * self.columns].to_vec()
    }

    /// Copies out a single column.
    ///
    /// # Panics
    /// Panics if `column` is out of range.
    pub fn column(&self, column: usize) -> Vec<T>
    where
        T: Clone,
    {
        assert!(
            column < self.columns,
            "column {column} out of range for {} columns",
            self.columns
        );
        (0..self.rows)
            .map(|i| self.data[i * self.columns + column].clone())
            .collect()
    }

    fn check_bounds(&self, row: usize, column: usize) {
        assert!(
            row < self.rows && column < self.columns,
            "index ({row}, {column}) out of range for a {}x{} matrix",
            self.rows,
            self.columns
        );
    }
}

impl<T> std::ops::Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, (row, column): (usize, usize)) -> &T {
        self.get(row, column)
    }
}

impl<T> std::ops::IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, (row, column): (usize, usize)) -> &mut T {
        self.check_bounds(row, column);
        &mut self.data[row * self.columns + column]
    }
}

impl<T: fmt::Display> fmt::Display for Matrix<T> {
    /// Formats the matrix as bracketed rows, one per line:
    /// `[v00, v01, ...]` then `[v10, ...]` and so on.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.rows {
            write!(f, "[")?;
            for j in 0..self.columns {
                if j == self.columns - 1 {
                    write!(f, "{}", self.data[i * self.columns + j])?;
                } else {
                    write!(f, "{}, ", self.data[i * self.columns + j])?;
                }
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}
