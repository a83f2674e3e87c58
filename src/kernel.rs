//! Kernel dispatch keys and the execution context kernels run against.
//!
//! A kernel is a plain function specialized for one device and one element
//! type. The dispatcher picks it by [`KernelKey`] and hands it an
//! [`ExecutionContext`] holding the concrete tensors bound to the operator's
//! slots. Kernels trust that shape inference already succeeded and do not
//! re-validate shapes.

use core::fmt;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::Device;
use crate::dtype::{DataType, Element};
use crate::error::{Error, Result};
use crate::schema::{AttrValue, Attributes};
use crate::tensors::{AnyTensor, Tensor};

/// The `(device, element type)` pair a kernel is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelKey {
    pub device: Device,
    pub dtype: DataType,
}

impl KernelKey {
    pub const fn new(device: Device, dtype: DataType) -> Self {
        Self { device, dtype }
    }

    /// Key of the `T` kernel on `device`.
    pub const fn of<T: Element>(device: Device) -> Self {
        Self::new(device, T::DTYPE)
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.dtype)
    }
}

/// Kernel entry stored in the registry.
pub type KernelFn = fn(&mut ExecutionContext<'_>) -> Result<()>;

/// Concrete, per-run view of one operator instance.
pub struct ExecutionContext<'a> {
    op_type: &'a str,
    key: KernelKey,
    attrs: &'a Attributes,
    inputs: HashMap<&'a str, &'a AnyTensor>,
    outputs: HashMap<String, AnyTensor>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(op_type: &'a str, key: KernelKey, attrs: &'a Attributes) -> Self {
        Self {
            op_type,
            key,
            attrs,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    /// Binds input `slot` to `tensor`.
    pub fn bind_input(&mut self, slot: &'a str, tensor: &'a AnyTensor) {
        self.inputs.insert(slot, tensor);
    }

    /// Builder-style [`bind_input`](Self::bind_input).
    #[must_use]
    pub fn with_input(mut self, slot: &'a str, tensor: &'a AnyTensor) -> Self {
        self.bind_input(slot, tensor);
        self
    }

    pub fn op_type(&self) -> &str {
        self.op_type
    }

    /// The key this context was dispatched with.
    pub fn key(&self) -> KernelKey {
        self.key
    }

    /// The type-erased tensor bound to input `slot`.
    ///
    /// # Errors
    /// [`Error::MissingInput`] if nothing is bound to `slot`.
    pub fn input_any(&self, slot: &str) -> Result<&'a AnyTensor> {
        self.inputs
            .get(slot)
            .copied()
            .ok_or_else(|| Error::MissingInput {
                op: self.op_type.to_owned(),
                slot: slot.to_owned(),
            })
    }

    /// The tensor bound to input `slot`, typed as `T`.
    ///
    /// # Errors
    /// [`Error::MissingInput`] if unbound, [`Error::DtypeMismatch`] if the
    /// bound tensor does not hold `T` elements.
    pub fn input<T: Element>(&self, slot: &str) -> Result<&'a Tensor<T>> {
        let any = self.input_any(slot)?;
        any.as_typed::<T>().ok_or_else(|| Error::DtypeMismatch {
            op: self.op_type.to_owned(),
            slot: slot.to_owned(),
            expected: T::DTYPE,
            got: any.dtype(),
        })
    }

    /// The value of float attribute `name`.
    ///
    /// # Errors
    /// [`Error::MissingAttribute`] or [`Error::AttributeType`].
    pub fn attr_f32(&self, name: &str) -> Result<f32> {
        match self.attrs.get(name) {
            Some(AttrValue::Float(v)) => Ok(*v),
            Some(other) => Err(Error::AttributeType {
                op: self.op_type.to_owned(),
                name: name.to_owned(),
                expected: crate::schema::AttrType::Float,
                got: other.attr_type(),
            }),
            None => Err(Error::MissingAttribute {
                op: self.op_type.to_owned(),
                name: name.to_owned(),
            }),
        }
    }

    /// Stores the result for output `slot`.
    pub fn set_output<T: Element>(&mut self, slot: &str, tensor: Tensor<T>) {
        self.outputs.insert(slot.to_owned(), T::wrap(tensor));
    }

    pub fn output(&self, slot: &str) -> Option<&AnyTensor> {
        self.outputs.get(slot)
    }

    /// Consumes the context, returning the outputs by slot.
    pub fn into_outputs(self) -> HashMap<String, AnyTensor> {
        self.outputs
    }
}
