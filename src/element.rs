//! Host and device arithmetic capabilities.
//!
//! Backend operators never assume anything about their element type beyond
//! these two traits. [`ElementOps`] is the host-side capability: plain
//! value-type arithmetic, monomorphized into the host loops. GPU kernels
//! cannot call back into host code at all, so [`DeviceElement`] carries the
//! same three operations a second time — as WGSL source spliced into the
//! kernel template when the pipeline for a given (operation, type) pair is
//! first compiled. Dispatch is resolved entirely at compile/specialization
//! time on both sides; there is no virtual call anywhere.

/// Value-type arithmetic usable by every host backend.
///
/// Implemented for the built-in numeric types below; user-defined value
/// types implement it directly to become operable.
///
/// # Example
///
/// ```rust
/// use densemat::element::ElementOps;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Default)]
/// struct Complex {
///     re: f64,
///     im: f64,
/// }
///
/// impl ElementOps for Complex {
///     fn add(self, rhs: Self) -> Self {
///         Complex { re: self.re + rhs.re, im: self.im + rhs.im }
///     }
///     fn sub(self, rhs: Self) -> Self {
///         Complex { re: self.re - rhs.re, im: self.im - rhs.im }
///     }
///     fn mul(self, rhs: Self) -> Self {
///         Complex {
///             re: self.re * rhs.re - self.im * rhs.im,
///             im: self.re * rhs.im + self.im * rhs.re,
///         }
///     }
/// }
/// ```
pub trait ElementOps: Copy + Default {
    /// Returns `self + rhs`.
    fn add(self, rhs: Self) -> Self;
    /// Returns `self - rhs`.
    fn sub(self, rhs: Self) -> Self;
    /// Returns `self * rhs`.
    fn mul(self, rhs: Self) -> Self;
}

macro_rules! impl_element_ops {
    ($($t:ty),*) => {
        $(
            impl ElementOps for $t {
                fn add(self, rhs: Self) -> Self {
                    self + rhs
                }
                fn sub(self, rhs: Self) -> Self {
                    self - rhs
                }
                fn mul(self, rhs: Self) -> Self {
                    self * rhs
                }
            }
        )*
    };
}

impl_element_ops!(i32, i64, u32, f32, f64);

/// Device-side arithmetic capability.
///
/// A type implementing this trait can live in GPU storage buffers and have
/// kernels generated for it. The WGSL prelude must declare the device-side
/// type under the name `Elem` and define four functions over it:
///
/// ```wgsl
/// fn elem_zero() -> Elem
/// fn elem_add(a: Elem, b: Elem) -> Elem
/// fn elem_sub(a: Elem, b: Elem) -> Elem
/// fn elem_mul(a: Elem, b: Elem) -> Elem
/// ```
///
/// The prelude is validated and then spliced into each kernel template; the
/// resulting pipeline is cached per (operation, element type).
///
/// # Safety
///
/// `Repr` must be trivially copyable with a fixed `#[repr(C)]`-compatible
/// layout that matches the WGSL `Elem` declaration byte for byte (size,
/// alignment, and field order), and must contain no padding whose value is
/// observed. Raw bytes of `Repr` values are copied across the host/device
/// boundary.
pub unsafe trait DeviceElement: ElementOps + 'static {
    /// The device-side representation. For WGSL-native scalars this is
    /// `Self`; wider host types downconvert at the copy boundary.
    type Repr: Copy + 'static;

    /// WGSL declaring `Elem` and the `elem_*` capability functions.
    const WGSL_PRELUDE: &'static str;

    /// Converts a host value to its device representation.
    fn to_repr(self) -> Self::Repr;

    /// Converts a device representation back to a host value.
    fn from_repr(repr: Self::Repr) -> Self;
}

unsafe impl DeviceElement for f32 {
    type Repr = f32;

    const WGSL_PRELUDE: &'static str = "\
alias Elem = f32;

fn elem_zero() -> Elem { return 0.0; }
fn elem_add(a: Elem, b: Elem) -> Elem { return a + b; }
fn elem_sub(a: Elem, b: Elem) -> Elem { return a - b; }
fn elem_mul(a: Elem, b: Elem) -> Elem { return a * b; }
";

    fn to_repr(self) -> f32 {
        self
    }

    fn from_repr(repr: f32) -> Self {
        repr
    }
}

unsafe impl DeviceElement for i32 {
    type Repr = i32;

    const WGSL_PRELUDE: &'static str = "\
alias Elem = i32;

fn elem_zero() -> Elem { return 0; }
fn elem_add(a: Elem, b: Elem) -> Elem { return a + b; }
fn elem_sub(a: Elem, b: Elem) -> Elem { return a - b; }
fn elem_mul(a: Elem, b: Elem) -> Elem { return a * b; }
";

    fn to_repr(self) -> i32 {
        self
    }

    fn from_repr(repr: i32) -> Self {
        repr
    }
}

unsafe impl DeviceElement for u32 {
    type Repr = u32;

    const WGSL_PRELUDE: &'static str = "\
alias Elem = u32;

fn elem_zero() -> Elem { return 0u; }
fn elem_add(a: Elem, b: Elem) -> Elem { return a + b; }
fn elem_sub(a: Elem, b: Elem) -> Elem { return a - b; }
fn elem_mul(a: Elem, b: Elem) -> Elem { return a * b; }
";

    fn to_repr(self) -> u32 {
        self
    }

    fn from_repr(repr: u32) -> Self {
        repr
    }
}

// WGSL has no 64-bit scalars. `f64` and `i64` participate in accelerated
// operations through lossy 32-bit device representations, converted at the
// upload/download boundary; exact 64-bit arithmetic stays on the host
// backends.

unsafe impl DeviceElement for f64 {
    type Repr = f32;

    const WGSL_PRELUDE: &'static str = <f32 as DeviceElement>::WGSL_PRELUDE;

    fn to_repr(self) -> f32 {
        self as f32
    }

    fn from_repr(repr: f32) -> Self {
        f64::from(repr)
    }
}

unsafe impl DeviceElement for i64 {
    type Repr = i32;

    const WGSL_PRELUDE: &'static str = <i32 as DeviceElement>::WGSL_PRELUDE;

    fn to_repr(self) -> i32 {
        self as i32
    }

    fn from_repr(repr: i32) -> Self {
        i64::from(repr)
    }
}
