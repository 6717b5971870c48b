//! Routed operation entry points.
//!
//! One-call versions of the four operations that consult the global
//! [`Backend`] selector instead of requiring an operator instance. Each
//! function routes to the corresponding backend:
//!
//! - `Backend::Cpu` → [`SingleThreadedOperator`]
//! - `Backend::Parallel` → [`ParallelOperator`]
//! - `Backend::Gpu` → the accelerated operator over the process-wide
//!   device context, falling back to the parallel host backend when no
//!   device can be bound or the device fails
//!
//! The fallback is deterministic and total: a device failure re-runs the
//! whole operation on the host. Shape errors are never part of the
//! fallback — they surface unchanged no matter which backend raised them.
//!
//! # Example
//! ```rust
//! use densemat::matrix::Matrix;
//! use densemat::ops::dispatch;
//!
//! let a = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
//! let b = Matrix::from_rows(&[vec![10, 20], vec![30, 40]]).unwrap();
//! let sum = dispatch::add(&a, &b).unwrap();
//! assert_eq!(sum[(0, 1)], 22);
//! ```

use crate::backend::{Backend, get_backend};
use crate::element::ElementOps;
use crate::error::ShapeError;
use crate::matrix::Matrix;
use crate::ops::CpuOperator;
use crate::ops::parallel::ParallelOperator;
use crate::ops::single::SingleThreadedOperator;

#[cfg(feature = "wgpu")]
use crate::element::DeviceElement;
#[cfg(feature = "wgpu")]
use crate::ops::wgpu::{GpuOpError, operator as gpu};

/// Element bound of the routed entry points: everything any backend
/// might need. With the `wgpu` feature enabled that includes the device
/// capability, since the GPU route must be able to specialize a kernel.
#[cfg(feature = "wgpu")]
pub trait DispatchElement: ElementOps + DeviceElement + Send + Sync {}
#[cfg(feature = "wgpu")]
impl<T: ElementOps + DeviceElement + Send + Sync> DispatchElement for T {}

/// Element bound of the routed entry points.
#[cfg(not(feature = "wgpu"))]
pub trait DispatchElement: ElementOps + Send + Sync {}
#[cfg(not(feature = "wgpu"))]
impl<T: ElementOps + Send + Sync> DispatchElement for T {}

/// Adds two matrices on the active backend.
pub fn add<T: DispatchElement>(a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError> {
    match get_backend() {
        Backend::Gpu => {
            #[cfg(feature = "wgpu")]
            match gpu::routed_add(a, b) {
                Ok(out) => return Ok(out),
                Err(GpuOpError::Shape(err)) => return Err(err),
                Err(GpuOpError::Device(_)) => {}
            }
            ParallelOperator.add(a, b)
        }
        Backend::Parallel => ParallelOperator.add(a, b),
        Backend::Cpu => SingleThreadedOperator.add(a, b),
    }
}

/// Subtracts `b` from `a` on the active backend.
pub fn subtract<T: DispatchElement>(a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError> {
    match get_backend() {
        Backend::Gpu => {
            #[cfg(feature = "wgpu")]
            match gpu::routed_subtract(a, b) {
                Ok(out) => return Ok(out),
                Err(GpuOpError::Shape(err)) => return Err(err),
                Err(GpuOpError::Device(_)) => {}
            }
            ParallelOperator.subtract(a, b)
        }
        Backend::Parallel => ParallelOperator.subtract(a, b),
        Backend::Cpu => SingleThreadedOperator.subtract(a, b),
    }
}

/// Multiplies two matrices on the active backend.
pub fn multiply<T: DispatchElement>(a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError> {
    match get_backend() {
        Backend::Gpu => {
            #[cfg(feature = "wgpu")]
            match gpu::routed_multiply(a, b) {
                Ok(out) => return Ok(out),
                Err(GpuOpError::Shape(err)) => return Err(err),
                Err(GpuOpError::Device(_)) => {}
            }
            ParallelOperator.multiply(a, b)
        }
        Backend::Parallel => ParallelOperator.multiply(a, b),
        Backend::Cpu => SingleThreadedOperator.multiply(a, b),
    }
}

/// Transposes a matrix on the active backend.
pub fn transpose<T: DispatchElement>(a: &Matrix<T>) -> Matrix<T> {
    match get_backend() {
        Backend::Gpu => {
            #[cfg(feature = "wgpu")]
            if let Ok(out) = gpu::routed_transpose(a) {
                return out;
            }
            ParallelOperator.transpose(a)
        }
        Backend::Parallel => ParallelOperator.transpose(a),
        Backend::Cpu => SingleThreadedOperator.transpose(a),
    }
}
