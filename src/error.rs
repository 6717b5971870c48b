//! Shape and construction errors.
//!
//! Every backend validates operand shapes through the same routines in
//! [`crate::ops::shape`] before computing or allocating anything, so these
//! errors are always raised ahead of any partial result.

use std::fmt;

/// The operation a shape check was performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Elementwise addition.
    Add,
    /// Elementwise subtraction.
    Subtract,
    /// Matrix multiplication.
    Multiply,
    /// Transposition.
    Transpose,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Add => write!(f, "add"),
            OpKind::Subtract => write!(f, "subtract"),
            OpKind::Multiply => write!(f, "multiply"),
            OpKind::Transpose => write!(f, "transpose"),
        }
    }
}

/// Errors raised by matrix construction and shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// A row-grouped source had rows of differing lengths.
    Ragged {
        /// Length of row 0, the baseline every other row must match.
        expected: usize,
        /// Length of the first offending row.
        actual: usize,
        /// Index of the first offending row.
        row: usize,
    },
    /// A flat data buffer did not match the requested dimensions.
    DataLength {
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        columns: usize,
        /// Number of elements actually supplied.
        actual: usize,
    },
    /// Operand shapes are incompatible for the requested operation.
    Mismatch {
        /// The operation that was attempted.
        op: OpKind,
        /// Rows of the first operand.
        a_rows: usize,
        /// Columns of the first operand.
        a_cols: usize,
        /// Rows of the second operand.
        b_rows: usize,
        /// Columns of the second operand.
        b_cols: usize,
    },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::Ragged {
                expected,
                actual,
                row,
            } => write!(
                f,
                "ragged source: expected {expected} elements but got {actual} on row {row}"
            ),
            ShapeError::DataLength {
                rows,
                columns,
                actual,
            } => write!(
                f,
                "data length {actual} does not fill a {rows}x{columns} matrix"
            ),
            ShapeError::Mismatch {
                op,
                a_rows,
                a_cols,
                b_rows,
                b_cols,
            } => write!(
                f,
                "wrong dimensions for {op}: left is {a_rows}x{a_cols}, right is {b_rows}x{b_cols}"
            ),
        }
    }
}

impl std::error::Error for ShapeError {}
