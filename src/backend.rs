//! Backend selection module.
//!
//! This module defines the available execution backends for the routed
//! operation entry points and provides functions to set and get the
//! current backend.
//!
//! # Supported Backends
//!
//! - `Cpu` — Single-threaded host loops (default).
//! - `Parallel` — Multi-threaded host loops on the rayon pool.
//! - `Gpu` — GPU compute backend using `wgpu` (if available).
//!
//! The backend is stored globally using an `AtomicU8`, enabling fast
//! switching between modes at runtime. Only the routed entry points in
//! [`crate::ops::dispatch`] consult it; the operator types can always be
//! used directly regardless of this setting.

use core::convert::TryFrom;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of the execution backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Backend {
    /// Single-threaded host backend (default).
    #[default]
    Cpu = 0,
    /// Multi-threaded host backend using rayon.
    Parallel,
    /// GPU backend using `wgpu`.
    Gpu,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Parallel),
            2 => Ok(Self::Gpu),
            _ => Err(()),
        }
    }
}

/// Internal global state for the active backend.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the active backend used by the routed entry points.
///
/// # Example
///
/// ```
/// use densemat::backend::{set_backend, Backend};
/// set_backend(Backend::Parallel);
/// # set_backend(Backend::Cpu);
/// ```
pub fn set_backend(b: Backend) {
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the currently active backend.
///
/// If the stored value is invalid, defaults to [`Backend::Cpu`].
///
/// # Example
///
/// ```
/// use densemat::backend::get_backend;
/// let backend = get_backend();
/// ```
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}
