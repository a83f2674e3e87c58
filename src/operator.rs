//! Operator instances and the minimal run surface.
//!
//! An [`OpDesc`] is what a graph author writes: an operator type, the
//! variables bound to each input and output slot, and attribute values.
//! [`Operator::create`] checks it against the registered schema, after which
//! the instance can be shape-inferred against a [`BlockShapes`] table and run
//! against a [`Scope`] of materialized tensors.
//!
//! # Example
//!
//! ```rust
//! use momentum_op::infer::BlockShapes;
//! use momentum_op::operator::{OpDesc, Operator, Scope};
//! use momentum_op::tensors::Tensor;
//!
//! let desc = OpDesc::new("momentum")
//!     .input("Param", "w")
//!     .input("Grad", "w@GRAD")
//!     .input("Velocity", "w@VEL")
//!     .input("LearningRate", "lr")
//!     .output("ParamOut", "w")
//!     .output("VelocityOut", "w@VEL")
//!     .attr("mu", 0.9f32);
//! let op = Operator::new(desc).unwrap();
//!
//! let mut scope = Scope::new();
//! scope.set("w", Tensor::new(vec![2], vec![1.0f32, 2.0]));
//! scope.set("w@GRAD", Tensor::new(vec![2], vec![0.1f32, 0.2]));
//! scope.set("w@VEL", Tensor::new(vec![2], vec![0.0f32, 0.0]));
//! scope.set("lr", Tensor::scalar(0.01f32));
//!
//! let mut shapes = scope.shapes();
//! op.infer_shape(&mut shapes).unwrap();
//! op.run(&mut scope).unwrap();
//! ```

use std::collections::{BTreeMap, HashMap};

use tracing::{trace, warn};

use crate::backend::{Device, default_device};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::infer::{BlockShapes, OpShapeContext};
use crate::kernel::{ExecutionContext, KernelKey};
use crate::registry::{OpInfo, OpRegistry, registry};
use crate::schema::{AttrValue, Attributes};
use crate::tensors::{AnyTensor, Tensor};

/// Graph-level description of one operator instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpDesc {
    pub op_type: String,
    /// Input slot name -> variable name.
    pub inputs: BTreeMap<String, String>,
    /// Output slot name -> variable name.
    pub outputs: BTreeMap<String, String>,
    pub attrs: Attributes,
}

impl OpDesc {
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            ..Self::default()
        }
    }

    /// Binds input `slot` to variable `var`.
    #[must_use]
    pub fn input(mut self, slot: impl Into<String>, var: impl Into<String>) -> Self {
        self.inputs.insert(slot.into(), var.into());
        self
    }

    /// Binds output `slot` to variable `var`.
    #[must_use]
    pub fn output(mut self, slot: impl Into<String>, var: impl Into<String>) -> Self {
        self.outputs.insert(slot.into(), var.into());
        self
    }

    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.set(name, value);
        self
    }

    pub fn input_var(&self, slot: &str) -> Option<&str> {
        self.inputs.get(slot).map(String::as_str)
    }

    pub fn output_var(&self, slot: &str) -> Option<&str> {
        self.outputs.get(slot).map(String::as_str)
    }
}

/// Materialized variables, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    vars: HashMap<String, AnyTensor>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, tensor: impl Into<AnyTensor>) {
        self.vars.insert(name.into(), tensor.into());
    }

    pub fn get(&self, name: &str) -> Option<&AnyTensor> {
        self.vars.get(name)
    }

    /// The variable `name`, typed as `T`.
    pub fn get_typed<T: Element>(&self, name: &str) -> Option<&Tensor<T>> {
        self.vars.get(name).and_then(AnyTensor::as_typed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Shapes of every variable, for shape inference over this scope.
    pub fn shapes(&self) -> BlockShapes {
        let mut shapes = BlockShapes::new();
        for (name, tensor) in &self.vars {
            shapes.set(name.clone(), tensor.shape().clone());
        }
        shapes
    }
}

/// A schema-checked operator instance.
#[derive(Debug)]
pub struct Operator<'r> {
    desc: OpDesc,
    info: &'r OpInfo,
}

impl Operator<'static> {
    /// Creates an instance against the global [`registry`].
    ///
    /// # Errors
    /// See [`Operator::create`].
    pub fn new(desc: OpDesc) -> Result<Self> {
        Self::create(registry(), desc)
    }
}

impl<'r> Operator<'r> {
    /// Looks the operator type up in `registry` and checks `desc` against
    /// its schema. Declared attribute defaults are filled in.
    ///
    /// # Errors
    /// [`Error::UnknownOperator`], or a schema violation naming the slot or
    /// attribute at fault.
    pub fn create(registry: &'r OpRegistry, mut desc: OpDesc) -> Result<Self> {
        let info = registry.get(&desc.op_type)?;
        let schema = info.schema();
        schema.check_slots(
            desc.inputs.keys().map(String::as_str),
            desc.outputs.keys().map(String::as_str),
        )?;
        desc.attrs = schema.check_attrs(&desc.attrs)?;
        Ok(Self { desc, info })
    }

    pub fn desc(&self) -> &OpDesc {
        &self.desc
    }

    pub fn info(&self) -> &'r OpInfo {
        self.info
    }

    /// Runs shape inference, writing output shapes into `shapes`.
    ///
    /// # Errors
    /// Whatever the operator's inference function rejects; the graph must
    /// not be run after a failure.
    pub fn infer_shape(&self, shapes: &mut BlockShapes) -> Result<()> {
        let mut ctx = OpShapeContext::new(&self.desc, shapes);
        (self.info.infer_shape_fn())(&mut ctx).inspect_err(|err| {
            warn!(op = %self.desc.op_type, %err, "shape inference failed");
        })
    }

    /// Runs on the process-wide default device.
    ///
    /// # Errors
    /// See [`Operator::run_on`].
    pub fn run(&self, scope: &mut Scope) -> Result<()> {
        self.run_on(default_device(), scope)
    }

    /// Dispatches the kernel matching `device` and the element type of the
    /// first declared input, then stores the outputs in their bound
    /// variables. Outputs may be bound to the same variables as inputs.
    ///
    /// # Errors
    /// [`Error::MissingVariable`] for an unbound variable,
    /// [`Error::NoKernel`] if nothing is registered for the key, or any
    /// error the kernel itself reports.
    pub fn run_on(&self, device: Device, scope: &mut Scope) -> Result<()> {
        let outputs = {
            let scope: &Scope = scope;
            let mut bound = Vec::with_capacity(self.desc.inputs.len());
            for (slot, var) in &self.desc.inputs {
                let tensor = scope.get(var).ok_or_else(|| Error::MissingVariable {
                    name: var.clone(),
                })?;
                bound.push((slot.as_str(), tensor));
            }

            let lead = self.info.schema().inputs.first().map(|s| s.name.as_str());
            let dtype = bound
                .iter()
                .find(|(slot, _)| Some(*slot) == lead)
                .or_else(|| bound.first())
                .map(|(_, t)| t.dtype())
                .ok_or_else(|| Error::MissingInput {
                    op: self.desc.op_type.clone(),
                    slot: lead.unwrap_or_default().to_owned(),
                })?;

            let key = KernelKey::new(device, dtype);
            let kernel = self.info.kernel(key)?;
            trace!(op = %self.desc.op_type, %key, "dispatching kernel");

            let mut ctx = ExecutionContext::new(&self.desc.op_type, key, &self.desc.attrs);
            for (slot, tensor) in bound {
                ctx.bind_input(slot, tensor);
            }
            kernel(&mut ctx)?;
            ctx.into_outputs()
        };

        let mut outputs = outputs;
        for (slot, var) in &self.desc.outputs {
            if let Some(tensor) = outputs.remove(slot) {
                scope.set(var.clone(), tensor);
            }
        }
        Ok(())
    }
}
