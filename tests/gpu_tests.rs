#![cfg(feature = "wgpu")]

//! Accelerated backend tests. Every test binds its own context and
//! returns early when no adapter (not even the host-emulated fallback)
//! exists on the machine, so the suite passes on GPU-less runners.

use std::sync::Arc;

use densemat::element::{DeviceElement, ElementOps};
use densemat::matrix::Matrix;
use densemat::ops::CpuOperator;
use densemat::ops::single::SingleThreadedOperator;
use densemat::ops::wgpu::{
    CopyStage, DeviceConfig, DeviceContext, DeviceError, DeviceMatrix, GpuOpError, GpuOperator,
};
use rand::Rng;

fn context() -> Option<Arc<DeviceContext>> {
    DeviceContext::new(DeviceConfig::default()).ok()
}

fn random_matrix(rows: usize, columns: usize) -> Matrix<i32> {
    let mut rng = rand::rng();
    let data = (0..rows * columns)
        .map(|_| rng.random_range(-100..100))
        .collect();
    Matrix::from_vec(rows, columns, data).unwrap()
}

fn on_device(ctx: &Arc<DeviceContext>, m: &Matrix<i32>) -> DeviceMatrix<i32> {
    DeviceMatrix::from_matrix(ctx, m.clone())
}

#[test]
fn test_gpu_matches_host_backends() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));

    let a = random_matrix(9, 14);
    let b = random_matrix(9, 14);
    let c = random_matrix(14, 6);

    let sum = op.add(&on_device(&ctx, &a), &on_device(&ctx, &b)).unwrap();
    assert_eq!(*sum.host(), SingleThreadedOperator.add(&a, &b).unwrap());

    let diff = op
        .subtract(&on_device(&ctx, &a), &on_device(&ctx, &b))
        .unwrap();
    assert_eq!(*diff.host(), SingleThreadedOperator.subtract(&a, &b).unwrap());

    let product = op
        .multiply(&on_device(&ctx, &a), &on_device(&ctx, &c))
        .unwrap();
    assert_eq!(*product.host(), SingleThreadedOperator.multiply(&a, &c).unwrap());

    let transposed = op.transpose(&on_device(&ctx, &a)).unwrap();
    assert_eq!(*transposed.host(), SingleThreadedOperator.transpose(&a));
}

#[test]
fn test_gpu_fixed_scenarios() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));

    let fifteen = Matrix::from_vec(5, 5, vec![15; 25]).unwrap();
    let five = Matrix::from_vec(5, 5, vec![5; 25]).unwrap();

    let sum = op
        .add(&on_device(&ctx, &fifteen), &on_device(&ctx, &five))
        .unwrap();
    assert!(sum.host().as_slice().iter().all(|&v| v == 20));

    let product = op
        .multiply(&on_device(&ctx, &fifteen), &on_device(&ctx, &five))
        .unwrap();
    assert!(product.host().as_slice().iter().all(|&v| v == 375));

    let mut source = Matrix::from_vec(5, 3, vec![10; 15]).unwrap();
    source.set(0, 2, 5);
    let transposed = op.transpose(&on_device(&ctx, &source)).unwrap();
    assert_eq!(transposed.rows(), 3);
    assert_eq!(transposed.columns(), 5);
    assert_eq!(*transposed.get(2, 0), 5);
    assert_eq!(*transposed.get(1, 3), 10);
}

#[test]
fn test_upload_state_machine() {
    let Some(ctx) = context() else { return };

    let m = DeviceMatrix::from_matrix(&ctx, random_matrix(4, 4));
    assert_eq!(m.copy_stage(), CopyStage::NoBuffer);

    m.upload().unwrap();
    assert_eq!(m.copy_stage(), CopyStage::UploadPending);

    // Repeated uploads collapse into the pending transfer.
    m.upload().unwrap();
    assert_eq!(m.copy_stage(), CopyStage::UploadPending);

    m.await_upload().unwrap();
    assert_eq!(m.copy_stage(), CopyStage::Synced);

    // Synced is terminal until a mutation; more uploads are no-ops.
    m.upload().unwrap();
    assert_eq!(m.copy_stage(), CopyStage::Synced);
    m.await_upload().unwrap();
    assert_eq!(m.copy_stage(), CopyStage::Synced);
}

#[test]
fn test_overlapped_uploads() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));

    let a_host = random_matrix(32, 32);
    let b_host = random_matrix(32, 32);
    let a = on_device(&ctx, &a_host);
    let b = on_device(&ctx, &b_host);

    // Start both transfers before either is awaited.
    a.upload().unwrap();
    b.upload().unwrap();

    let sum = op.add(&a, &b).unwrap();
    assert_eq!(*sum.host(), SingleThreadedOperator.add(&a_host, &b_host).unwrap());
}

#[test]
fn test_mutation_invalidates_device_mirror() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));

    let mut a = DeviceMatrix::from_matrix(&ctx, Matrix::from_vec(2, 2, vec![1; 4]).unwrap());
    let b = DeviceMatrix::from_matrix(&ctx, Matrix::from_vec(2, 2, vec![10; 4]).unwrap());

    a.upload().unwrap();
    a.await_upload().unwrap();
    assert_eq!(a.copy_stage(), CopyStage::Synced);

    // Host-side mutation drops the mirror; the next operation must see
    // the new value, not stale device data.
    a.set(0, 0, 100);
    assert_eq!(a.copy_stage(), CopyStage::NoBuffer);

    let sum = op.add(&a, &b).unwrap();
    assert_eq!(*sum.get(0, 0), 110);
    assert_eq!(*sum.get(1, 1), 11);
}

#[test]
fn test_gpu_shape_mismatch() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));

    let a = on_device(&ctx, &random_matrix(2, 3));
    let b = on_device(&ctx, &random_matrix(3, 3));
    let err = op.add(&a, &b).unwrap_err();
    assert!(matches!(err, GpuOpError::Shape(_)));

    // Nothing was uploaded for a rejected operation.
    assert_eq!(a.copy_stage(), CopyStage::NoBuffer);
    assert_eq!(b.copy_stage(), CopyStage::NoBuffer);
}

#[test]
fn test_naive_and_shared_kernels_agree() {
    let Some(shared_ctx) = context() else { return };
    let Some(naive_ctx) = DeviceContext::new(DeviceConfig {
        force_naive_kernels: true,
        ..DeviceConfig::default()
    })
    .ok() else {
        return;
    };

    let a = random_matrix(33, 17);
    let b = random_matrix(33, 17);
    let expected = SingleThreadedOperator.add(&a, &b).unwrap();

    let shared_op = GpuOperator::new(Arc::clone(&shared_ctx));
    let shared = shared_op
        .add(&on_device(&shared_ctx, &a), &on_device(&shared_ctx, &b))
        .unwrap();
    assert_eq!(*shared.host(), expected);

    let naive_op = GpuOperator::new(Arc::clone(&naive_ctx));
    let naive = naive_op
        .add(&on_device(&naive_ctx, &a), &on_device(&naive_ctx, &b))
        .unwrap();
    assert_eq!(*naive.host(), expected);
}

#[test]
fn test_forced_fallback_adapter() {
    // Pinning the host-emulated adapter must not change results. Skipped
    // when the platform ships no fallback adapter at all.
    let Some(ctx) = DeviceContext::new(DeviceConfig {
        force_fallback: true,
        ..DeviceConfig::default()
    })
    .ok() else {
        return;
    };
    assert!(!ctx.is_accelerated());

    let op = GpuOperator::new(Arc::clone(&ctx));
    let a = random_matrix(6, 6);
    let b = random_matrix(6, 6);
    let sum = op.add(&on_device(&ctx, &a), &on_device(&ctx, &b)).unwrap();
    assert_eq!(*sum.host(), SingleThreadedOperator.add(&a, &b).unwrap());
}

#[test]
fn test_disposed_context_is_unusable() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));
    let a = on_device(&ctx, &random_matrix(2, 2));
    let b = on_device(&ctx, &random_matrix(2, 2));

    ctx.dispose();

    let err = op.add(&a, &b).unwrap_err();
    assert!(matches!(err, GpuOpError::Device(DeviceError::Unavailable)));

    let err = a.upload().unwrap_err();
    assert!(matches!(err, DeviceError::Unavailable));
}

#[test]
fn test_empty_matrices_stay_off_device() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));

    let a = DeviceMatrix::<i32>::new(&ctx, 0, 3);
    let b = DeviceMatrix::<i32>::new(&ctx, 0, 3);
    let sum = op.add(&a, &b).unwrap();
    assert_eq!(sum.rows(), 0);
    assert_eq!(sum.columns(), 3);

    let transposed = op.transpose(&a).unwrap();
    assert_eq!(transposed.rows(), 3);
    assert_eq!(transposed.columns(), 0);
}

#[test]
fn test_f32_elementwise_exact_and_multiply_tolerant() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));

    let mut rng = rand::rng();
    let mut data = |n: usize| -> Vec<f32> { (0..n).map(|_| rng.random_range(-1.0..1.0)).collect() };
    let a = Matrix::from_vec(8, 12, data(96)).unwrap();
    let b = Matrix::from_vec(8, 12, data(96)).unwrap();
    let c = Matrix::from_vec(12, 5, data(60)).unwrap();

    let sum = op
        .add(
            &DeviceMatrix::from_matrix(&ctx, a.clone()),
            &DeviceMatrix::from_matrix(&ctx, b.clone()),
        )
        .unwrap();
    assert_eq!(*sum.host(), SingleThreadedOperator.add(&a, &b).unwrap());

    // Multiplication may contract differently on the device; compare up
    // to summation-order tolerance.
    let product = op
        .multiply(
            &DeviceMatrix::from_matrix(&ctx, a.clone()),
            &DeviceMatrix::from_matrix(&ctx, c.clone()),
        )
        .unwrap();
    let host = SingleThreadedOperator.multiply(&a, &c).unwrap();
    for (gpu, cpu) in product.host().as_slice().iter().zip(host.as_slice()) {
        assert!((gpu - cpu).abs() < 1e-4, "{gpu} vs {cpu}");
    }
}

#[test]
fn test_f64_participates_via_lossy_repr() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));

    // Small integers survive the f64 -> f32 device representation exactly.
    let a = Matrix::from_vec(3, 3, (1..=9).map(f64::from).collect()).unwrap();
    let b = Matrix::from_vec(3, 3, vec![10.0f64; 9]).unwrap();
    let sum = op
        .add(
            &DeviceMatrix::from_matrix(&ctx, a.clone()),
            &DeviceMatrix::from_matrix(&ctx, b.clone()),
        )
        .unwrap();
    assert_eq!(*sum.host(), SingleThreadedOperator.add(&a, &b).unwrap());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
struct Vec3 {
    x: i32,
    y: i32,
    z: i32,
}

impl Vec3 {
    fn new(x: i32, y: i32, z: i32) -> Self {
        Vec3 { x, y, z }
    }
}

impl ElementOps for Vec3 {
    fn add(self, rhs: Self) -> Self {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
    fn sub(self, rhs: Self) -> Self {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
    fn mul(self, rhs: Self) -> Self {
        Vec3::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }
}

unsafe impl DeviceElement for Vec3 {
    type Repr = Vec3;

    const WGSL_PRELUDE: &'static str = "\
struct Elem {
    x: i32,
    y: i32,
    z: i32,
}

fn elem_zero() -> Elem { return Elem(0, 0, 0); }
fn elem_add(a: Elem, b: Elem) -> Elem { return Elem(a.x + b.x, a.y + b.y, a.z + b.z); }
fn elem_sub(a: Elem, b: Elem) -> Elem { return Elem(a.x - b.x, a.y - b.y, a.z - b.z); }
fn elem_mul(a: Elem, b: Elem) -> Elem { return Elem(a.x * b.x, a.y * b.y, a.z * b.z); }
";

    fn to_repr(self) -> Vec3 {
        self
    }

    fn from_repr(repr: Vec3) -> Self {
        repr
    }
}

#[test]
fn test_custom_struct_element_on_device() {
    let Some(ctx) = context() else { return };
    let op = GpuOperator::new(Arc::clone(&ctx));

    let a = Matrix::from_vec(3, 4, vec![Vec3::new(1, 2, 3); 12]).unwrap();
    let b = Matrix::from_vec(3, 4, vec![Vec3::new(4, 5, 6); 12]).unwrap();

    let sum = op
        .add(
            &DeviceMatrix::from_matrix(&ctx, a.clone()),
            &DeviceMatrix::from_matrix(&ctx, b.clone()),
        )
        .unwrap();
    assert_eq!(*sum.host(), SingleThreadedOperator.add(&a, &b).unwrap());
    assert_eq!(*sum.get(0, 0), Vec3::new(5, 7, 9));

    let diff = op
        .subtract(
            &DeviceMatrix::from_matrix(&ctx, a.clone()),
            &DeviceMatrix::from_matrix(&ctx, b.clone()),
        )
        .unwrap();
    assert_eq!(*diff.host(), SingleThreadedOperator.subtract(&a, &b).unwrap());
}
