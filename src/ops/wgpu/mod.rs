//! GPU compute backend using `wgpu`.
//!
//! This module owns the device context (adapter probing, device and queue
//! acquisition, capability limits, disposal), the per-type kernel pipeline
//! cache, and WGSL source validation. Device-resident matrices live in
//! [`matrix`], the operator itself in [`operator`].
//!
//! Kernels are WGSL compute shaders generated from templates: the element
//! type's capability prelude and the launch workgroup size are spliced in,
//! the result is validated, compiled once, and cached per
//! (operation, element type) pair. Dispatch inside a kernel is therefore
//! fully resolved at pipeline-build time.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use briny::prelude::*;

use crate::element::DeviceElement;
use crate::error::ShapeError;

pub mod matrix;
pub mod operator;

pub use matrix::{CopyStage, DeviceMatrix};
pub use operator::GpuOperator;

const ELEMENTWISE: &str = include_str!("../shaders/elementwise.wgsl");
const ELEMENTWISE_SHARED: &str = include_str!("../shaders/elementwise_shared.wgsl");
const MULTIPLY: &str = include_str!("../shaders/multiply.wgsl");
const TRANSPOSE: &str = include_str!("../shaders/transpose.wgsl");

/// Errors raised by the device context and the copy/launch machinery.
#[derive(Debug)]
pub enum DeviceError {
    /// No adapter — not even the host-emulated fallback — could be bound.
    Adapter(wgpu::RequestAdapterError),
    /// The adapter was found but device acquisition failed.
    Device(wgpu::RequestDeviceError),
    /// The context has been disposed, or the process-wide context failed
    /// to initialize; no device work is possible through it.
    Unavailable,
    /// A buffer allocation would exceed what the device can hold. Detected
    /// before anything is allocated or copied.
    OutOfMemory {
        /// Bytes the allocation would need.
        requested: u64,
        /// Largest buffer the device supports.
        capacity: u64,
    },
    /// A WGSL capability prelude or kernel source failed validation.
    Shader(ValidationError),
    /// A readback buffer came back misaligned or mis-sized.
    Transfer(&'static str),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Adapter(e) => write!(f, "adapter error: {e}"),
            DeviceError::Device(e) => write!(f, "device error: {e}"),
            DeviceError::Unavailable => {
                write!(f, "no usable compute device (context disposed or never bound)")
            }
            DeviceError::OutOfMemory {
                requested,
                capacity,
            } => write!(
                f,
                "buffer of {requested} bytes exceeds device capacity of {capacity} bytes"
            ),
            DeviceError::Shader(_) => write!(f, "shader source failed validation"),
            DeviceError::Transfer(msg) => write!(f, "transfer error: {msg}"),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<ValidationError> for DeviceError {
    fn from(err: ValidationError) -> Self {
        DeviceError::Shader(err)
    }
}

/// Error type of accelerated operations: either the operands were the
/// wrong shape, or the device side failed.
#[derive(Debug)]
pub enum GpuOpError {
    /// Operand shapes incompatible for the operation.
    Shape(ShapeError),
    /// The device context or a transfer/launch failed.
    Device(DeviceError),
}

impl fmt::Display for GpuOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuOpError::Shape(e) => write!(f, "{e}"),
            GpuOpError::Device(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for GpuOpError {}

impl From<ShapeError> for GpuOpError {
    fn from(err: ShapeError) -> Self {
        GpuOpError::Shape(err)
    }
}

impl From<DeviceError> for GpuOpError {
    fn from(err: DeviceError) -> Self {
        GpuOpError::Device(err)
    }
}

/// Construction options for a [`DeviceContext`].
///
/// Probing order and kernel choice are policy, so both can be overridden
/// here instead of being hard-coded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceConfig {
    /// Bind the host-emulated fallback adapter even if a real GPU is
    /// present. Useful for exercising the fallback path in tests.
    pub force_fallback: bool,
    /// Never select the workgroup-shared-memory kernel variants.
    pub force_naive_kernels: bool,
}

/// The compiled kernels a context can cache, one per element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KernelKind {
    Add,
    AddShared,
    Sub,
    SubShared,
    Multiply,
    Transpose,
}

impl KernelKind {
    fn label(self) -> &'static str {
        match self {
            KernelKind::Add => "add",
            KernelKind::AddShared => "add_shared",
            KernelKind::Sub => "sub",
            KernelKind::SubShared => "sub_shared",
            KernelKind::Multiply => "multiply",
            KernelKind::Transpose => "transpose",
        }
    }

    fn template(self) -> &'static str {
        match self {
            KernelKind::Add | KernelKind::Sub => ELEMENTWISE,
            KernelKind::AddShared | KernelKind::SubShared => ELEMENTWISE_SHARED,
            KernelKind::Multiply => MULTIPLY,
            KernelKind::Transpose => TRANSPOSE,
        }
    }

    fn elem_fn(self) -> Option<&'static str> {
        match self {
            KernelKind::Add | KernelKind::AddShared => Some("elem_add"),
            KernelKind::Sub | KernelKind::SubShared => Some("elem_sub"),
            KernelKind::Multiply | KernelKind::Transpose => None,
        }
    }
}

/// WGSL source wrapper checked before anything reaches the shader
/// compiler.
///
/// Applies to the fully spliced kernel source, so user-supplied capability
/// preludes pass through the same checks as the built-in ones.
pub(crate) struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 {
            return Err(ValidationError);
        }

        if !src.contains("fn main") {
            return Err(ValidationError);
        }

        // The capability contract: the prelude must define all four
        // element functions.
        let required = ["fn elem_zero", "fn elem_add", "fn elem_sub", "fn elem_mul"];
        if required.iter().any(|func| !src.contains(func)) {
            return Err(ValidationError);
        }

        if src.contains("import") || src.contains("#include") {
            return Err(ValidationError); // no source inclusion
        }

        let forbidden = ["asm", "unsafe", "ptr", "std::"];
        if forbidden.iter().any(|bad| src.contains(bad)) {
            return Err(ValidationError);
        }

        Ok(())
    }
}

/// Handle to the selected compute device.
///
/// Owns the `wgpu` device and queue, the adapter's capability limits, and
/// the kernel pipeline cache. Constructed explicitly and shared via `Arc`
/// into every [`DeviceMatrix`] and [`GpuOperator`]; call sites that do not
/// need multiple contexts can use the process-wide [`DeviceContext::global`]
/// instance instead.
pub struct DeviceContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: wgpu::Limits,
    adapter_info: wgpu::AdapterInfo,
    config: DeviceConfig,
    pipelines: Mutex<HashMap<(KernelKind, TypeId), Arc<wgpu::ComputePipeline>>>,
    disposed: AtomicBool,
}

impl DeviceContext {
    /// Probes for a device and binds it.
    ///
    /// Selection order: a discrete GPU first, then an integrated or
    /// virtual GPU, then whatever the platform's default adapter request
    /// yields, and finally the host-emulated fallback adapter. Probing is
    /// side-effect-free; only the selected adapter gets a device created
    /// for it.
    ///
    /// # Example
    /// ```no_run
    /// use densemat::ops::wgpu::{DeviceConfig, DeviceContext};
    ///
    /// let ctx = DeviceContext::new(DeviceConfig::default()).unwrap();
    /// println!("bound: {}", ctx.adapter_name());
    /// ```
    pub fn new(config: DeviceConfig) -> Result<Arc<Self>, DeviceError> {
        let instance = wgpu::Instance::default();
        let adapter = Self::select_adapter(&instance, &config).map_err(DeviceError::Adapter)?;
        let adapter_info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(DeviceError::Device)?;
        let limits = device.limits();

        Ok(Arc::new(DeviceContext {
            device,
            queue,
            limits,
            adapter_info,
            config,
            pipelines: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }))
    }

    fn select_adapter(
        instance: &wgpu::Instance,
        config: &DeviceConfig,
    ) -> Result<wgpu::Adapter, wgpu::RequestAdapterError> {
        if config.force_fallback {
            return pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: true,
                compatible_surface: None,
            }));
        }

        let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
        for class in [
            wgpu::DeviceType::DiscreteGpu,
            wgpu::DeviceType::IntegratedGpu,
            wgpu::DeviceType::VirtualGpu,
        ] {
            if let Some(pos) = adapters
                .iter()
                .position(|a| a.get_info().device_type == class)
            {
                return Ok(adapters.swap_remove(pos));
            }
        }

        // No GPU-class adapter enumerated; degrade to whatever the default
        // request yields, then to the explicit fallback adapter.
        match pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
        {
            Ok(adapter) => Ok(adapter),
            Err(_) => pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: true,
                compatible_surface: None,
            })),
        }
    }

    /// The process-wide context, created on first call with default
    /// configuration. Concurrent first callers observe exactly one
    /// initialization and every caller gets the same instance.
    pub fn global() -> Result<Arc<DeviceContext>, DeviceError> {
        lazy_static::lazy_static! {
            static ref GLOBAL_CONTEXT: Result<Arc<DeviceContext>, DeviceError> =
                DeviceContext::new(DeviceConfig::default());
        }
        match &*GLOBAL_CONTEXT {
            Ok(ctx) => Ok(Arc::clone(ctx)),
            Err(_) => Err(DeviceError::Unavailable),
        }
    }

    /// Initializes the process-wide context on a background thread so the
    /// first real operation does not pay for adapter probing.
    pub fn prewarm() -> thread::JoinHandle<()> {
        thread::spawn(|| {
            let _ = DeviceContext::global();
        })
    }

    /// Whether the bound adapter is anything beyond the host-emulated
    /// fallback.
    pub fn is_accelerated(&self) -> bool {
        self.adapter_info.device_type != wgpu::DeviceType::Cpu
    }

    /// A human-readable name for the bound adapter.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_info.name
    }

    /// Releases the device. Afterwards every operation through this
    /// context fails with [`DeviceError::Unavailable`].
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.device.destroy();
        }
    }

    pub(crate) fn ensure_live(&self) -> Result<(), DeviceError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(DeviceError::Unavailable)
        } else {
            Ok(())
        }
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Fails before allocation if `requested` bytes cannot fit in a single
    /// device buffer.
    pub(crate) fn check_allocation(&self, requested: u64) -> Result<(), DeviceError> {
        let capacity = self.limits.max_buffer_size;
        if requested > capacity {
            return Err(DeviceError::OutOfMemory {
                requested,
                capacity,
            });
        }
        Ok(())
    }

    /// Side length of the square launch workgroup: the largest power of
    /// two whose square stays within the device's invocation limit.
    pub(crate) fn workgroup_dim(&self) -> u32 {
        let max = self.limits.max_compute_invocations_per_workgroup.max(1);
        let mut dim = 1u32;
        while (dim * 2) * (dim * 2) <= max
            && dim * 2 <= self.limits.max_compute_workgroup_size_x
            && dim * 2 <= self.limits.max_compute_workgroup_size_y
        {
            dim *= 2;
        }
        dim
    }

    /// Whether the shared-memory kernel variants fit this device for the
    /// given element type: both staging tiles must fit in workgroup
    /// storage, and the configuration must not force the naive variants.
    pub(crate) fn use_shared_tiles<T: DeviceElement>(&self) -> bool {
        if self.config.force_naive_kernels {
            return false;
        }
        let dim = self.workgroup_dim() as u64;
        let tile_bytes = 2 * dim * dim * size_of::<T::Repr>() as u64;
        tile_bytes <= u64::from(self.limits.max_compute_workgroup_storage_size)
    }

    /// Fetches the pipeline for `(kind, T)`, compiling and caching it on
    /// first use. Safe under concurrent first population.
    fn pipeline_for<T: DeviceElement>(
        &self,
        kind: KernelKind,
    ) -> Result<Arc<wgpu::ComputePipeline>, DeviceError> {
        self.ensure_live()?;
        let key = (kind, TypeId::of::<T>());
        let mut cache = self.pipelines.lock().unwrap();
        if let Some(pipeline) = cache.get(&key) {
            return Ok(Arc::clone(pipeline));
        }

        let source = self.kernel_source::<T>(kind);
        WgslSource(&source).validate()?;

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kind.label()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let pipeline = Arc::new(self.device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(kind.label()),
                layout: None,
                module: &module,
                entry_point: Some("main"),
                cache: None,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
        ));
        cache.insert(key, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    fn kernel_source<T: DeviceElement>(&self, kind: KernelKind) -> String {
        let wg = self.workgroup_dim();
        let mut source = kind
            .template()
            .replace("//__ELEM_IMPL__", T::WGSL_PRELUDE)
            .replace("__TILE__", &(wg * wg).to_string())
            .replace("__WG__", &wg.to_string());
        if let Some(func) = kind.elem_fn() {
            source = source.replace("__ELEM_OP__", func);
        }
        source
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("adapter", &self.adapter_info.name)
            .field("device_type", &self.adapter_info.device_type)
            .field("disposed", &self.disposed.load(Ordering::Acquire))
            .finish()
    }
}

/// Whether the process-wide context is bound to a device beyond the
/// host-emulated fallback.
pub fn gpu_available() -> bool {
    DeviceContext::global().map_or(false, |ctx| ctx.is_accelerated())
}

pub(crate) fn as_bytes<T: Copy>(data: &[T]) -> &[u8] {
    let len = std::mem::size_of_val(data);
    unsafe { std::slice::from_raw_parts(data.as_ptr() as *const u8, len) }
}

pub(crate) fn bytes_to_slice<T: Copy>(data: &[u8]) -> Result<&[T], DeviceError> {
    if data.as_ptr() as usize % align_of::<T>() != 0 {
        return Err(DeviceError::Transfer("unaligned readback buffer"));
    }

    if data.len() % size_of::<T>() != 0 {
        return Err(DeviceError::Transfer(
            "readback length is not a multiple of the element size",
        ));
    }

    let len = data.len() / size_of::<T>();
    let ptr = data.as_ptr() as *const T;
    unsafe { Ok(std::slice::from_raw_parts(ptr, len)) }
}

#[cfg(test)]
mod tests {
    use briny::prelude::*;

    use super::*;
    use crate::element::DeviceElement;

    fn splice(template: &str, prelude: &str, op: &str) -> String {
        template
            .replace("//__ELEM_IMPL__", prelude)
            .replace("__TILE__", "256")
            .replace("__WG__", "16")
            .replace("__ELEM_OP__", op)
    }

    #[test]
    fn test_spliced_kernel_sources_validate() {
        for template in [ELEMENTWISE, ELEMENTWISE_SHARED, MULTIPLY, TRANSPOSE] {
            let source = splice(template, <f32 as DeviceElement>::WGSL_PRELUDE, "elem_add");
            assert!(WgslSource(&source).validate().is_ok());
        }
    }

    #[test]
    fn test_prelude_missing_capability_fn_is_rejected() {
        let incomplete = "\
alias Elem = f32;
fn elem_zero() -> Elem { return 0.0; }
fn elem_add(a: Elem, b: Elem) -> Elem { return a + b; }
";
        let source = splice(ELEMENTWISE, incomplete, "elem_add");
        assert!(WgslSource(&source).validate().is_err());
    }

    #[test]
    fn test_forbidden_tokens_are_rejected() {
        let hostile = format!(
            "{}\n// #include \"other.wgsl\"\n",
            splice(ELEMENTWISE, <f32 as DeviceElement>::WGSL_PRELUDE, "elem_add")
        );
        assert!(WgslSource(&hostile).validate().is_err());
    }
}
