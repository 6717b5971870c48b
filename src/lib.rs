//! densemat: dense-matrix arithmetic with interchangeable execution backends.
//!
//! Every operation — add, subtract, multiply, transpose — is available on
//! three backends behind one contract: a single-threaded host loop, a
//! rayon-parallel host loop, and a GPU compute backend built on `wgpu`.
//!
//! # Features
//!
//! - Dense row-major matrices over any element type implementing the
//!   [`element::ElementOps`] capability.
//! - A device-side capability ([`element::DeviceElement`]) that lets the
//!   same operation compile to a type-specialized GPU kernel, with no
//!   runtime dispatch inside kernels.
//! - Asynchronous host→device uploads with a per-matrix copy-state machine,
//!   so transfers of both operands can overlap other work.
//! - A routed one-call surface ([`ops::dispatch`]) switched by a global
//!   [`backend::Backend`] selector, with deterministic host fallback.
//!
//! # Goals
//!
//! - Identical observable results regardless of the backend chosen; the
//!   parallel backend is bit-identical to the single-threaded one.
//! - Explicit, injectable device context — no hidden global device state
//!   unless the process-wide convenience context is asked for.
//! - Errors surface synchronously and before any partial result exists.
//!
//! # Modules
//!
//! - [`matrix`] — The dense 2-D container and its constructors.
//! - [`element`] — Host and device arithmetic capabilities.
//! - [`ops`] — The three backend operators, shared validation, dispatch.
//! - [`backend`] — The process-global backend selector.
//! - [`error`] — Shape and construction errors.
//!
//! # Example
//!
//! ```rust
//! use densemat::matrix::Matrix;
//! use densemat::ops::CpuOperator;
//! use densemat::ops::single::SingleThreadedOperator;
//!
//! let a = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
//! let b = Matrix::from_rows(&[vec![5, 6], vec![7, 8]]).unwrap();
//! let sum = SingleThreadedOperator.add(&a, &b).unwrap();
//! assert_eq!(sum[(1, 1)], 12);
//! ```

pub mod backend;
pub mod element;
pub mod error;
pub mod matrix;
pub mod ops;
