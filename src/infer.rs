//! Shape inference.
//!
//! Shape inference runs once per graph compile, before any tensor memory
//! exists. An operator's inference function sees its instance only through
//! [`InferShapeContext`]: which slots are bound, the shapes of its inputs,
//! and a way to publish the shapes of its outputs.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::operator::OpDesc;
use crate::shape::Shape;

/// Symbolic, pre-execution view of one operator instance.
pub trait InferShapeContext {
    /// Type name of the operator being inferred, used in error messages.
    fn op_type(&self) -> &str;

    /// Whether input `slot` is bound to a variable with a known shape.
    fn has_input(&self, slot: &str) -> bool;

    /// Whether output `slot` is declared on this instance.
    fn has_output(&self, slot: &str) -> bool;

    /// The shape of input `slot`.
    ///
    /// # Errors
    /// [`Error::MissingInput`] if the slot is not bound.
    fn input_dim(&self, slot: &str) -> Result<Shape>;

    /// Publishes the shape of output `slot`.
    ///
    /// # Errors
    /// [`Error::MissingOutput`] if the slot is not declared.
    fn set_output_dim(&mut self, slot: &str, shape: Shape) -> Result<()>;
}

/// Shape inference function stored in the registry.
pub type InferShapeFn = fn(&mut dyn InferShapeContext) -> Result<()>;

/// Known shapes of the variables of one graph block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockShapes {
    vars: HashMap<String, Shape>,
}

impl BlockShapes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the shape of variable `name`.
    pub fn set(&mut self, name: impl Into<String>, shape: impl Into<Shape>) {
        self.vars.insert(name.into(), shape.into());
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        self.set(name, shape);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

/// [`InferShapeContext`] resolving an [`OpDesc`]'s slot bindings against a
/// [`BlockShapes`] table.
pub struct OpShapeContext<'a> {
    desc: &'a OpDesc,
    shapes: &'a mut BlockShapes,
}

impl<'a> OpShapeContext<'a> {
    pub fn new(desc: &'a OpDesc, shapes: &'a mut BlockShapes) -> Self {
        Self { desc, shapes }
    }
}

impl InferShapeContext for OpShapeContext<'_> {
    fn op_type(&self) -> &str {
        &self.desc.op_type
    }

    fn has_input(&self, slot: &str) -> bool {
        self.desc
            .input_var(slot)
            .is_some_and(|var| self.shapes.contains(var))
    }

    fn has_output(&self, slot: &str) -> bool {
        self.desc.output_var(slot).is_some()
    }

    fn input_dim(&self, slot: &str) -> Result<Shape> {
        self.desc
            .input_var(slot)
            .and_then(|var| self.shapes.get(var))
            .cloned()
            .ok_or_else(|| Error::MissingInput {
                op: self.desc.op_type.clone(),
                slot: slot.to_owned(),
            })
    }

    fn set_output_dim(&mut self, slot: &str, shape: Shape) -> Result<()> {
        let var = self
            .desc
            .output_var(slot)
            .ok_or_else(|| Error::MissingOutput {
                op: self.desc.op_type.clone(),
                slot: slot.to_owned(),
            })?;
        self.shapes.set(var, shape);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_without_known_shape_is_absent() {
        let desc = OpDesc::new("scale").input("X", "x").output("Out", "y");
        let mut shapes = BlockShapes::new();
        let ctx = OpShapeContext::new(&desc, &mut shapes);
        assert!(!ctx.has_input("X"));
        assert!(ctx.has_output("Out"));
        assert!(matches!(ctx.input_dim("X"), Err(Error::MissingInput { .. })));
    }

    #[test]
    fn set_output_dim_writes_bound_variable() {
        let desc = OpDesc::new("scale").input("X", "x").output("Out", "y");
        let mut shapes = BlockShapes::new().with("x", [2, 3]);
        {
            let mut ctx = OpShapeContext::new(&desc, &mut shapes);
            let dim = ctx.input_dim("X").unwrap();
            ctx.set_output_dim("Out", dim).unwrap();
            assert!(ctx.set_output_dim("Missing", Shape::scalar()).is_err());
        }
        assert_eq!(shapes.get("y"), Some(&Shape::from([2, 3])));
    }
}
