//! momentum_op: the Momentum optimizer step as a registered tensor operator.
//!
//! The crate carries everything a graph executor needs to validate and run
//! one momentum update:
//!
//! ```text
//! velocity_out = mu * velocity - learning_rate * grad
//! param_out    = param + velocity_out
//! ```
//!
//! # Features
//!
//! - Declarative operator schemas with attribute checking at construction.
//! - Shape inference over a symbolic context, before any data is touched.
//! - A write-once, process-wide registry keyed by operator name, with kernels
//!   selected per `(device, element type)`.
//! - Multi-threaded CPU kernels for `f32` and `f64`, optional AVX2 lanes
//!   (`simd`) and an optional WGSL compute kernel (`wgpu`).
//!
//! # Modules
//!
//! - [`tensors`]: dense tensors and the type-erased [`AnyTensor`](tensors::AnyTensor).
//! - [`schema`]: operator schemas and attributes.
//! - [`infer`]: the shape inference context.
//! - [`registry`]: operator and kernel registration.
//! - [`operator`]: building, inferring and running operator instances.
//! - [`ops`]: the built-in operators and their kernels.
//!
//! # Example
//!
//! ```rust
//! use momentum_op::ops::cpu::momentum;
//! use momentum_op::tensor;
//!
//! let param = tensor!([1.0f32, 2.0]);
//! let grad = tensor!([0.1f32, 0.2]);
//! let velocity = tensor!([0.0f32, 0.0]);
//! let (param, velocity) = momentum(&param, &grad, &velocity, 0.01, 0.9);
//! assert!((velocity.data[0] + 0.001).abs() < 1e-7);
//! assert!((param.data[1] - 1.998).abs() < 1e-6);
//! ```

pub mod backend;
pub mod dtype;
pub mod error;
pub mod infer;
pub mod kernel;
pub mod operator;
pub mod ops;
pub mod registry;
pub mod schema;
pub mod shape;
pub mod tensors;

pub use backend::Device;
pub use dtype::{DataType, Element};
pub use error::{Error, ErrorKind, Result};
pub use operator::{OpDesc, Operator, Scope};
pub use registry::registry;
pub use shape::Shape;
pub use tensors::{AnyTensor, Tensor};
