//! # Built-in Operators
//!
//! Every operator shipped with the crate lives here, together with the
//! backend kernels it registers.
//!
//! ## Submodules
//!
//! - [`momentum`]: the momentum optimizer step (schema, shape inference, registration)
//! - [`cpu`]: multi-threaded CPU kernels, with optional SIMD lanes
//! - [`wgpu`] *(opt-in)*: GPU compute shader pipelines using `wgpu`
//!
//! ## Adding an operator
//!
//! 1. Implement its kernels in one or more backends (e.g. `cpu::my_op`, `wgpu::my_op`)
//! 2. Write a module with its schema, shape inference and a `register` function
//! 3. Call that `register` from [`register_builtin`]
//!
//! ## Notes
//!
//! - SIMD and GPU acceleration are only compiled in when their feature flags are enabled
//! - A kernel is selected per `(device, dtype)` pair; there is no implicit fallback

use crate::error::Result;
use crate::registry::OpRegistryBuilder;

pub mod cpu;
pub mod momentum;

#[cfg(feature = "wgpu")]
pub mod wgpu;

/// Registers every built-in operator into `builder`.
///
/// # Errors
/// Propagates conflicting registrations.
pub fn register_builtin(builder: &mut OpRegistryBuilder) -> Result<()> {
    momentum::register(builder)
}
