//! Device-resident matrices and the host→device copy protocol.
//!
//! A [`DeviceMatrix`] pairs a host [`Matrix`] with an optional
//! device-resident mirror of its data and a small per-matrix state
//! machine:
//!
//! ```text
//! NoBuffer ──upload()──► UploadPending ──await_upload()──► Synced
//! ```
//!
//! `upload` schedules the copy and returns immediately, so both operands
//! of an operation can be in flight while the caller does other work;
//! `await_upload` is the single blocking point before a kernel may read
//! the buffer. Host-side mutation drops the mirror and resets the machine
//! to `NoBuffer`, so stale device data can never be read. The buffer
//! itself is released when the matrix drops or on [`DeviceMatrix::release`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::element::DeviceElement;
use crate::error::ShapeError;
use crate::matrix::Matrix;

use super::{DeviceContext, DeviceError, as_bytes};

/// Progress of a matrix's host→device copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStage {
    /// No device buffer exists (initial state, and after any mutation).
    NoBuffer,
    /// A copy has been scheduled on the queue but not awaited.
    UploadPending,
    /// The device mirror matches the host data.
    Synced,
}

#[derive(Debug)]
struct Mirror {
    buffer: Option<Arc<wgpu::Buffer>>,
    stage: CopyStage,
}

/// A dense matrix that can mirror its data into device memory.
///
/// Constructed against an explicit [`DeviceContext`]; all accelerated
/// operands and results are of this type. The host data stays
/// authoritative — reading the matrix never requires the device.
#[derive(Debug)]
pub struct DeviceMatrix<T: DeviceElement> {
    host: Matrix<T>,
    ctx: Arc<DeviceContext>,
    mirror: Mutex<Mirror>,
}

impl<T: DeviceElement> DeviceMatrix<T> {
    /// Creates a zero-filled accelerated matrix of the given dimensions.
    pub fn new(ctx: &Arc<DeviceContext>, rows: usize, columns: usize) -> Self {
        Self::from_matrix(ctx, Matrix::new(rows, columns))
    }

    /// Wraps an existing host matrix. The device mirror starts absent.
    pub fn from_matrix(ctx: &Arc<DeviceContext>, host: Matrix<T>) -> Self {
        DeviceMatrix {
            host,
            ctx: Arc::clone(ctx),
            mirror: Mutex::new(Mirror {
                buffer: None,
                stage: CopyStage::NoBuffer,
            }),
        }
    }

    /// Creates an accelerated matrix from a flat row-major buffer.
    pub fn from_vec(
        ctx: &Arc<DeviceContext>,
        rows: usize,
        columns: usize,
        data: Vec<T>,
    ) -> Result<Self, ShapeError> {
        Ok(Self::from_matrix(ctx, Matrix::from_vec(rows, columns, data)?))
    }

    /// Creates an accelerated matrix from row-grouped data, rejecting
    /// ragged input exactly like [`Matrix::from_rows`].
    pub fn from_rows(ctx: &Arc<DeviceContext>, rows: &[Vec<T>]) -> Result<Self, ShapeError> {
        Ok(Self::from_matrix(ctx, Matrix::from_rows(rows)?))
    }

    /// The host view of the data.
    pub fn host(&self) -> &Matrix<T> {
        &self.host
    }

    /// Consumes the wrapper, returning the host matrix. The device buffer,
    /// if any, is released.
    pub fn into_host(self) -> Matrix<T> {
        self.host
    }

    /// The number of rows.
    pub fn rows(&self) -> usize {
        self.host.rows()
    }

    /// The number of columns.
    pub fn columns(&self) -> usize {
        self.host.columns()
    }

    /// Returns a reference to the element at (`row`, `column`).
    ///
    /// # Panics
    /// Panics if either coordinate is out of range.
    pub fn get(&self, row: usize, column: usize) -> &T {
        self.host.get(row, column)
    }

    /// Overwrites the element at (`row`, `column`), invalidating any
    /// device mirror: the copy state returns to [`CopyStage::NoBuffer`]
    /// and the next accelerated use re-uploads.
    ///
    /// # Panics
    /// Panics if either coordinate is out of range.
    pub fn set(&mut self, row: usize, column: usize, value: T) {
        self.release();
        self.host.set(row, column, value);
    }

    /// Drops the device mirror without touching the host data.
    pub fn release(&mut self) {
        let mirror = self.mirror.get_mut().unwrap();
        mirror.buffer = None;
        mirror.stage = CopyStage::NoBuffer;
    }

    /// The current copy state.
    pub fn copy_stage(&self) -> CopyStage {
        self.mirror.lock().unwrap().stage
    }

    /// Schedules the host→device copy and returns without blocking.
    ///
    /// Allocates the device buffer on first call; while a copy is pending
    /// or once synced this is a no-op, so it can be called any number of
    /// times and at most one transfer happens per host-side mutation.
    /// The buffer capacity is checked against the device limit before
    /// anything is allocated.
    pub fn upload(&self) -> Result<(), DeviceError> {
        let mut mirror = self.mirror.lock().unwrap();
        if mirror.stage != CopyStage::NoBuffer {
            return Ok(());
        }
        self.ctx.ensure_live()?;

        if self.host.is_empty() {
            // Nothing to mirror; kernels never bind empty operands.
            mirror.stage = CopyStage::Synced;
            return Ok(());
        }

        let bytes = (self.host.len() * size_of::<T::Repr>()) as u64;
        self.ctx.check_allocation(bytes)?;

        let staged: Vec<T::Repr> = self.host.as_slice().iter().map(|v| v.to_repr()).collect();
        let buffer = self.ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("matrix"),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.ctx.queue().write_buffer(&buffer, 0, as_bytes(&staged));
        self.ctx.queue().submit(std::iter::empty());

        mirror.buffer = Some(Arc::new(buffer));
        mirror.stage = CopyStage::UploadPending;
        Ok(())
    }

    /// Blocks until the scheduled copy has drained from the queue.
    ///
    /// A no-op unless a copy is pending. Kernels must not read the buffer
    /// before this has returned.
    pub fn await_upload(&self) -> Result<(), DeviceError> {
        let mut mirror = self.mirror.lock().unwrap();
        if mirror.stage == CopyStage::UploadPending {
            self.ctx.ensure_live()?;
            self.ctx
                .device()
                .poll(wgpu::PollType::Wait)
                .map_err(|_| DeviceError::Unavailable)?;
            mirror.stage = CopyStage::Synced;
        }
        Ok(())
    }

    pub(crate) fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    pub(crate) fn device_buffer(&self) -> Option<Arc<wgpu::Buffer>> {
        self.mirror.lock().unwrap().buffer.clone()
    }
}

impl<T: DeviceElement + PartialEq> PartialEq for DeviceMatrix<T> {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
    }
}

impl<T: DeviceElement + Eq> Eq for DeviceMatrix<T> {}

impl<T: DeviceElement + Hash> Hash for DeviceMatrix<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
    }
}

impl<T: DeviceElement + fmt::Display> fmt::Display for DeviceMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.host.fmt(f)
    }
}
