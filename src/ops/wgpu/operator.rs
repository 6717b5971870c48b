//! The accelerated operator: kernel selection, launch, and readback.
//!
//! Every operation follows the same sequence: validate shapes, schedule
//! both operand uploads (no-ops when already in flight or synced),
//! allocate the result buffer, await the uploads, fetch or compile the
//! kernel for the element type, dispatch a 2-D grid that covers every
//! output element exactly once, synchronize, and copy the result back
//! into a fresh matrix. Operands are never mutated.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::element::DeviceElement;
use crate::error::OpKind;
use crate::matrix::Matrix;
use crate::ops::shape;

use super::matrix::DeviceMatrix;
use super::{DeviceContext, DeviceError, GpuOpError, KernelKind, bytes_to_slice};

/// Runs operations on the device bound by a [`DeviceContext`].
///
/// Elementwise kernels assign one thread per output element; the multiply
/// kernel assigns one thread per output cell and computes the full dot
/// product. When the device's workgroup storage fits the staging tiles,
/// elementwise operations use the shared-memory kernel variant, otherwise
/// the naive one — correctness-equivalent either way.
///
/// # Example
/// ```no_run
/// use densemat::matrix::Matrix;
/// use densemat::ops::wgpu::{DeviceConfig, DeviceContext, DeviceMatrix, GpuOperator};
///
/// let ctx = DeviceContext::new(DeviceConfig::default()).unwrap();
/// let op = GpuOperator::new(ctx.clone());
/// let a = DeviceMatrix::from_rows(&ctx, &[vec![1.0f32, 2.0], vec![3.0, 4.0]]).unwrap();
/// let b = DeviceMatrix::from_rows(&ctx, &[vec![5.0f32, 6.0], vec![7.0, 8.0]]).unwrap();
/// let sum = op.add(&a, &b).unwrap();
/// assert_eq!(*sum.get(1, 1), 12.0);
/// ```
#[derive(Debug)]
pub struct GpuOperator {
    ctx: Arc<DeviceContext>,
}

impl GpuOperator {
    /// Creates an operator over the given context.
    pub fn new(ctx: Arc<DeviceContext>) -> Self {
        GpuOperator { ctx }
    }

    /// Creates an operator over the process-wide context.
    pub fn from_global() -> Result<Self, DeviceError> {
        Ok(Self::new(DeviceContext::global()?))
    }

    /// The context this operator launches on.
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    /// Adds two matrices on the device.
    pub fn add<T: DeviceElement>(
        &self,
        a: &DeviceMatrix<T>,
        b: &DeviceMatrix<T>,
    ) -> Result<DeviceMatrix<T>, GpuOpError> {
        shape::check_same_shape(OpKind::Add, a.host(), b.host())?;
        self.elementwise(KernelKind::Add, KernelKind::AddShared, a, b)
    }

    /// Subtracts `b` from `a` on the device.
    pub fn subtract<T: DeviceElement>(
        &self,
        a: &DeviceMatrix<T>,
        b: &DeviceMatrix<T>,
    ) -> Result<DeviceMatrix<T>, GpuOpError> {
        shape::check_same_shape(OpKind::Subtract, a.host(), b.host())?;
        self.elementwise(KernelKind::Sub, KernelKind::SubShared, a, b)
    }

    /// Multiplies two matrices on the device.
    pub fn multiply<T: DeviceElement>(
        &self,
        a: &DeviceMatrix<T>,
        b: &DeviceMatrix<T>,
    ) -> Result<DeviceMatrix<T>, GpuOpError> {
        shape::check_multipliable(a.host(), b.host())?;
        self.check_operand_contexts(&[a, b]);
        self.ctx.ensure_live()?;

        let (rows, inner, cols) = (a.rows(), a.columns(), b.columns());
        if rows == 0 || cols == 0 {
            return Ok(self.wrap(Matrix::from_raw(rows, cols, Vec::new())));
        }
        if inner == 0 {
            // No dot-product terms to launch over.
            let data = vec![T::default(); rows * cols];
            return Ok(self.wrap(Matrix::from_raw(rows, cols, data)));
        }

        a.upload()?;
        b.upload()?;
        a.await_upload()?;
        b.await_upload()?;
        let lhs = operand_buffer(a)?;
        let rhs = operand_buffer(b)?;

        let out = self.launch::<T>(
            KernelKind::Multiply,
            [rows as u32, cols as u32, inner as u32, 0],
            &[&*lhs, &*rhs],
            rows,
            cols,
        )?;
        Ok(self.wrap(out))
    }

    /// Transposes a matrix on the device.
    pub fn transpose<T: DeviceElement>(
        &self,
        a: &DeviceMatrix<T>,
    ) -> Result<DeviceMatrix<T>, GpuOpError> {
        self.check_operand_contexts(&[a]);
        self.ctx.ensure_live()?;

        let (rows, cols) = (a.rows(), a.columns());
        if rows == 0 || cols == 0 {
            return Ok(self.wrap(Matrix::from_raw(cols, rows, Vec::new())));
        }

        a.upload()?;
        a.await_upload()?;
        let src = operand_buffer(a)?;

        // The grid covers the source; each thread writes its transposed
        // destination, so the output is still covered exactly once.
        let out = self.launch::<T>(
            KernelKind::Transpose,
            [rows as u32, cols as u32, 0, 0],
            &[&*src],
            cols,
            rows,
        )?;
        Ok(self.wrap(out))
    }

    fn elementwise<T: DeviceElement>(
        &self,
        naive: KernelKind,
        shared: KernelKind,
        a: &DeviceMatrix<T>,
        b: &DeviceMatrix<T>,
    ) -> Result<DeviceMatrix<T>, GpuOpError> {
        self.check_operand_contexts(&[a, b]);
        self.ctx.ensure_live()?;

        let (rows, cols) = (a.rows(), a.columns());
        if rows == 0 || cols == 0 {
            return Ok(self.wrap(Matrix::from_raw(rows, cols, Vec::new())));
        }

        let kind = if self.ctx.use_shared_tiles::<T>() {
            shared
        } else {
            naive
        };

        a.upload()?;
        b.upload()?;
        a.await_upload()?;
        b.await_upload()?;
        let lhs = operand_buffer(a)?;
        let rhs = operand_buffer(b)?;

        let out = self.launch::<T>(
            kind,
            [rows as u32, cols as u32, 0, 0],
            &[&*lhs, &*rhs],
            rows,
            cols,
        )?;
        Ok(self.wrap(out))
    }

    /// Builds the bind group, dispatches the kernel over a grid covering
    /// `dims`, synchronizes, and reads the result buffer back into a
    /// fresh `out_rows` × `out_cols` host matrix.
    ///
    /// `dims[0]`/`dims[1]` are the grid domain (rows/columns the threads
    /// range over); for transpose that is the source shape, for everything
    /// else the output shape.
    fn launch<T: DeviceElement>(
        &self,
        kind: KernelKind,
        dims: [u32; 4],
        inputs: &[&wgpu::Buffer],
        out_rows: usize,
        out_cols: usize,
    ) -> Result<Matrix<T>, DeviceError> {
        let device = self.ctx.device();
        let queue = self.ctx.queue();

        let out_len = out_rows * out_cols;
        let out_bytes = (out_len * size_of::<T::Repr>()) as u64;
        self.ctx.check_allocation(out_bytes)?;

        let pipeline = self.ctx.pipeline_for::<T>(kind)?;

        let dims_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dims"),
            contents: super::as_bytes(&dims),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let out_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("result"),
            size: out_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: out_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: dims_buffer.as_entire_binding(),
        }];
        for (i, input) in inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (i + 1) as u32,
                resource: input.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: (inputs.len() + 1) as u32,
            resource: out_buffer.as_entire_binding(),
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kind.label()),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let wg = self.ctx.workgroup_dim();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(kind.label()),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kind.label()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dims[1].div_ceil(wg), dims[0].div_ceil(wg), 1);
        }
        encoder.copy_buffer_to_buffer(&out_buffer, 0, &staging, 0, out_bytes);
        queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|_| DeviceError::Unavailable)?;

        let view = slice.get_mapped_range();
        let staged: &[T::Repr] = bytes_to_slice(&view)?;
        let data: Vec<T> = staged.iter().map(|&repr| T::from_repr(repr)).collect();
        drop(view);
        staging.unmap();

        Ok(Matrix::from_raw(out_rows, out_cols, data))
    }

    fn wrap<T: DeviceElement>(&self, host: Matrix<T>) -> DeviceMatrix<T> {
        DeviceMatrix::from_matrix(&self.ctx, host)
    }

    fn check_operand_contexts<T: DeviceElement>(&self, operands: &[&DeviceMatrix<T>]) {
        for operand in operands {
            assert!(
                Arc::ptr_eq(operand.context(), &self.ctx),
                "operand was created against a different device context"
            );
        }
    }
}

fn operand_buffer<T: DeviceElement>(m: &DeviceMatrix<T>) -> Result<Arc<wgpu::Buffer>, DeviceError> {
    m.device_buffer()
        .ok_or(DeviceError::Transfer("operand has no device buffer"))
}

/// One-shot helpers for the routed entry points: wrap host matrices
/// against the process-wide context, run on the device, unwrap.
pub(crate) fn routed_add<T: DeviceElement>(
    a: &Matrix<T>,
    b: &Matrix<T>,
) -> Result<Matrix<T>, GpuOpError> {
    let op = GpuOperator::from_global()?;
    let da = DeviceMatrix::from_matrix(op.context(), a.clone());
    let db = DeviceMatrix::from_matrix(op.context(), b.clone());
    Ok(op.add(&da, &db)?.into_host())
}

pub(crate) fn routed_subtract<T: DeviceElement>(
    a: &Matrix<T>,
    b: &Matrix<T>,
) -> Result<Matrix<T>, GpuOpError> {
    let op = GpuOperator::from_global()?;
    let da = DeviceMatrix::from_matrix(op.context(), a.clone());
    let db = DeviceMatrix::from_matrix(op.context(), b.clone());
    Ok(op.subtract(&da, &db)?.into_host())
}

pub(crate) fn routed_multiply<T: DeviceElement>(
    a: &Matrix<T>,
    b: &Matrix<T>,
) -> Result<Matrix<T>, GpuOpError> {
    let op = GpuOperator::from_global()?;
    let da = DeviceMatrix::from_matrix(op.context(), a.clone());
    let db = DeviceMatrix::from_matrix(op.context(), b.clone());
    Ok(op.multiply(&da, &db)?.into_host())
}

pub(crate) fn routed_transpose<T: DeviceElement>(a: &Matrix<T>) -> Result<Matrix<T>, GpuOpError> {
    let op = GpuOperator::from_global()?;
    let da = DeviceMatrix::from_matrix(op.context(), a.clone());
    Ok(op.transpose(&da)?.into_host())
}
