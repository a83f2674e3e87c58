//! Process-wide operator registry.
//!
//! The registry binds a stable operator name to its [`OpSchema`], its shape
//! inference function and its table of kernels. It has two phases:
//!
//! 1. **Startup**: an [`OpRegistryBuilder`] collects registrations. Duplicate
//!    operator names and duplicate kernel keys are rejected here.
//! 2. **Serving**: [`OpRegistryBuilder::build`] freezes everything into an
//!    immutable [`OpRegistry`] that any number of threads can read without
//!    locking.
//!
//! The global registry returned by [`registry`] is built exactly once, on
//! first use, from every built-in registration in [`crate::ops`].
//!
//! # Example
//!
//! ```rust
//! use momentum_op::backend::Device;
//! use momentum_op::kernel::KernelKey;
//! use momentum_op::registry::registry;
//!
//! let info = registry().get("momentum").unwrap();
//! assert!(info.kernel(KernelKey::of::<f32>(Device::Cpu)).is_ok());
//! assert!(!info.has_gradient());
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::debug;

use crate::error::{Error, Result};
use crate::infer::InferShapeFn;
use crate::kernel::{KernelFn, KernelKey};
use crate::schema::OpSchema;

/// Everything registered under one operator name.
pub struct OpInfo {
    schema: OpSchema,
    infer_shape: InferShapeFn,
    kernels: HashMap<KernelKey, KernelFn>,
}

impl OpInfo {
    pub fn schema(&self) -> &OpSchema {
        &self.schema
    }

    pub fn infer_shape_fn(&self) -> InferShapeFn {
        self.infer_shape
    }

    /// Selects the kernel registered under `key`.
    ///
    /// # Errors
    /// [`Error::NoKernel`] if no kernel matches.
    pub fn kernel(&self, key: KernelKey) -> Result<KernelFn> {
        self.kernels
            .get(&key)
            .copied()
            .ok_or_else(|| Error::NoKernel {
                op: self.schema.name.clone(),
                device: key.device,
                dtype: key.dtype,
            })
    }

    /// The keys of all registered kernels, in no particular order.
    pub fn kernel_keys(&self) -> impl Iterator<Item = KernelKey> + '_ {
        self.kernels.keys().copied()
    }

    /// Whether a gradient operator is registered for this operator.
    pub fn has_gradient(&self) -> bool {
        self.schema.differentiable
    }
}

impl core::fmt::Debug for OpInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpInfo")
            .field("schema", &self.schema.name)
            .field("kernels", &self.kernels.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Startup-phase registry under construction.
#[derive(Debug, Default)]
pub struct OpRegistryBuilder {
    ops: HashMap<String, OpInfo>,
}

impl OpRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operator with its schema and shape inference function.
    ///
    /// # Errors
    /// [`Error::DuplicateOperator`] if the name is already taken.
    pub fn register_op(&mut self, schema: OpSchema, infer_shape: InferShapeFn) -> Result<()> {
        match self.ops.entry(schema.name.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateOperator { name: schema.name }),
            Entry::Vacant(slot) => {
                debug!(op = %schema.name, "registered operator");
                slot.insert(OpInfo {
                    schema,
                    infer_shape,
                    kernels: HashMap::new(),
                });
                Ok(())
            }
        }
    }

    /// Adds a kernel for an already registered operator.
    ///
    /// # Errors
    /// [`Error::UnknownOperator`] if `op` is not registered,
    /// [`Error::DuplicateKernel`] if `key` already has a kernel.
    pub fn register_kernel(&mut self, op: &str, key: KernelKey, kernel: KernelFn) -> Result<()> {
        let info = self.ops.get_mut(op).ok_or_else(|| Error::UnknownOperator {
            name: op.to_owned(),
        })?;
        match info.kernels.entry(key) {
            Entry::Occupied(_) => Err(Error::DuplicateKernel {
                op: op.to_owned(),
                device: key.device,
                dtype: key.dtype,
            }),
            Entry::Vacant(slot) => {
                debug!(op, %key, "registered kernel");
                slot.insert(kernel);
                Ok(())
            }
        }
    }

    /// Freezes the registrations.
    pub fn build(self) -> OpRegistry {
        OpRegistry { ops: self.ops }
    }
}

/// Immutable, name-keyed operator table.
#[derive(Debug)]
pub struct OpRegistry {
    ops: HashMap<String, OpInfo>,
}

impl OpRegistry {
    pub fn builder() -> OpRegistryBuilder {
        OpRegistryBuilder::new()
    }

    /// Looks an operator up by name.
    ///
    /// # Errors
    /// [`Error::UnknownOperator`] if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<&OpInfo> {
        self.ops.get(name).ok_or_else(|| Error::UnknownOperator {
            name: name.to_owned(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Names of all registered operators, sorted.
    pub fn op_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn builtin_registry() -> Result<OpRegistry> {
    let mut builder = OpRegistryBuilder::new();
    crate::ops::register_builtin(&mut builder)?;
    Ok(builder.build())
}

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: OpRegistry =
        builtin_registry().expect("built-in operator registrations conflict");
}

/// The process-wide registry holding every built-in operator.
///
/// # Panics
/// Panics on first use if two built-in registrations conflict; that is a
/// configuration error of the crate itself.
pub fn registry() -> &'static OpRegistry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Device;
    use crate::error::ErrorKind;
    use crate::infer::InferShapeContext;
    use crate::kernel::ExecutionContext;

    fn noop_infer(_: &mut dyn InferShapeContext) -> Result<()> {
        Ok(())
    }

    fn noop_kernel(_: &mut ExecutionContext<'_>) -> Result<()> {
        Ok(())
    }

    fn identity_schema() -> OpSchema {
        OpSchema::builder("identity")
            .input("X", "")
            .output("Out", "")
            .build()
    }

    #[test]
    fn duplicate_operator_is_rejected() {
        let mut builder = OpRegistry::builder();
        builder.register_op(identity_schema(), noop_infer).unwrap();
        let err = builder
            .register_op(identity_schema(), noop_infer)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateOperator { ref name } if name == "identity"));
        assert_eq!(err.kind(), ErrorKind::Registration);
    }

    #[test]
    fn kernels_need_a_registered_operator_and_a_fresh_key() {
        let key = KernelKey::of::<f32>(Device::Cpu);
        let mut builder = OpRegistry::builder();
        assert!(matches!(
            builder.register_kernel("identity", key, noop_kernel),
            Err(Error::UnknownOperator { .. })
        ));

        builder.register_op(identity_schema(), noop_infer).unwrap();
        builder.register_kernel("identity", key, noop_kernel).unwrap();
        assert!(matches!(
            builder.register_kernel("identity", key, noop_kernel),
            Err(Error::DuplicateKernel { .. })
        ));
    }

    #[test]
    fn lookup_and_dispatch_miss() {
        let mut builder = OpRegistry::builder();
        builder.register_op(identity_schema(), noop_infer).unwrap();
        builder
            .register_kernel("identity", KernelKey::of::<f32>(Device::Cpu), noop_kernel)
            .unwrap();
        let reg = builder.build();

        assert!(reg.contains("identity"));
        assert!(matches!(reg.get("nope"), Err(Error::UnknownOperator { .. })));

        let info = reg.get("identity").unwrap();
        assert!(info.kernel(KernelKey::of::<f32>(Device::Cpu)).is_ok());
        let miss = info.kernel(KernelKey::of::<f64>(Device::Wgpu)).unwrap_err();
        assert_eq!(miss.kind(), ErrorKind::DispatchFailure);
    }

    #[test]
    fn global_registry_is_shared() {
        assert!(core::ptr::eq(registry(), registry()));
        assert!(registry().op_types().contains(&"momentum"));
    }
}
