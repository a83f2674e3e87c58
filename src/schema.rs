//! Declarative operator schemas.
//!
//! An [`OpSchema`] lists an operator's named input slots, output slots and
//! typed attributes together with their documentation. It is built once,
//! when the operator is registered, and read by generic tooling (graph
//! validation, serialization, UIs) without that tooling knowing anything
//! about what the operator computes.
//!
//! # Example
//!
//! ```rust
//! use momentum_op::schema::{AttrType, OpSchema};
//!
//! let schema = OpSchema::builder("scale")
//!     .input("X", "Input tensor")
//!     .output("Out", "Scaled tensor")
//!     .attr("factor", AttrType::Float, "Multiplier")
//!     .doc("Out = factor * X")
//!     .build();
//! assert_eq!(schema.input_names().collect::<Vec<_>>(), ["X"]);
//! ```

use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named input or output slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDef {
    pub name: String,
    pub doc: String,
}

/// Type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    Float,
    Int,
    Bool,
    Str,
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float => f.write_str("float"),
            Self::Int => f.write_str("int"),
            Self::Bool => f.write_str("bool"),
            Self::Str => f.write_str("string"),
        }
    }
}

/// A typed attribute value bound to one operator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Float(f32),
    Int(i64),
    Bool(bool),
    Str(String),
}

impl AttrValue {
    /// The type tag of this value.
    pub fn attr_type(&self) -> AttrType {
        match self {
            Self::Float(_) => AttrType::Float,
            Self::Int(_) => AttrType::Int,
            Self::Bool(_) => AttrType::Bool,
            Self::Str(_) => AttrType::Str,
        }
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

/// A declared attribute. Attributes without a default are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrDef {
    pub name: String,
    pub ty: AttrType,
    pub doc: String,
    pub default: Option<AttrValue>,
}

impl AttrDef {
    /// Whether the caller has to supply this attribute.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Attribute values of one operator instance, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes(BTreeMap<String, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.get(name)
    }

    /// The value of a float attribute.
    pub fn get_f32(&self, name: &str) -> Option<f32> {
        match self.0.get(name) {
            Some(AttrValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Self-description of an operator's interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpSchema {
    pub name: String,
    pub inputs: Vec<SlotDef>,
    pub outputs: Vec<SlotDef>,
    pub attrs: Vec<AttrDef>,
    pub doc: String,
    /// Whether a gradient operator exists for this operator.
    pub differentiable: bool,
}

impl OpSchema {
    /// Starts building the schema of operator `name`.
    pub fn builder(name: impl Into<String>) -> OpSchemaBuilder {
        OpSchemaBuilder {
            schema: Self {
                name: name.into(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                attrs: Vec::new(),
                doc: String::new(),
                differentiable: false,
            },
        }
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|s| s.name.as_str())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|s| s.name.as_str())
    }

    pub fn attr(&self, name: &str) -> Option<&AttrDef> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub fn has_input(&self, slot: &str) -> bool {
        self.inputs.iter().any(|s| s.name == slot)
    }

    pub fn has_output(&self, slot: &str) -> bool {
        self.outputs.iter().any(|s| s.name == slot)
    }

    /// Checks that every declared slot is bound and every bound slot is
    /// declared.
    ///
    /// # Errors
    /// [`Error::MissingInput`] / [`Error::MissingOutput`] for the first
    /// declared slot left unbound, [`Error::UnknownSlot`] for a bound slot
    /// the schema does not know.
    pub fn check_slots<'a>(
        &self,
        inputs: impl IntoIterator<Item = &'a str>,
        outputs: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        let inputs: Vec<&str> = inputs.into_iter().collect();
        let outputs: Vec<&str> = outputs.into_iter().collect();

        for slot in &inputs {
            if !self.has_input(slot) {
                return Err(self.unknown_slot(slot));
            }
        }
        for slot in &outputs {
            if !self.has_output(slot) {
                return Err(self.unknown_slot(slot));
            }
        }

        if let Some(missing) = self.input_names().find(|s| !inputs.contains(s)) {
            return Err(Error::MissingInput {
                op: self.name.clone(),
                slot: missing.to_owned(),
            });
        }
        if let Some(missing) = self.output_names().find(|s| !outputs.contains(s)) {
            return Err(Error::MissingOutput {
                op: self.name.clone(),
                slot: missing.to_owned(),
            });
        }
        Ok(())
    }

    /// The attribute checker: validates `given` against the declared
    /// attributes and returns the complete set with defaults filled in.
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`], [`Error::AttributeType`] or
    /// [`Error::MissingAttribute`].
    pub fn check_attrs(&self, given: &Attributes) -> Result<Attributes> {
        for (name, value) in given.iter() {
            let Some(def) = self.attr(name) else {
                return Err(Error::UnknownAttribute {
                    op: self.name.clone(),
                    name: name.to_owned(),
                });
            };
            if value.attr_type() != def.ty {
                return Err(Error::AttributeType {
                    op: self.name.clone(),
                    name: name.to_owned(),
                    expected: def.ty,
                    got: value.attr_type(),
                });
            }
        }

        let mut checked = given.clone();
        for def in &self.attrs {
            if checked.get(&def.name).is_some() {
                continue;
            }
            match &def.default {
                Some(default) => checked.set(def.name.clone(), default.clone()),
                None => {
                    return Err(Error::MissingAttribute {
                        op: self.name.clone(),
                        name: def.name.clone(),
                    });
                }
            }
        }
        Ok(checked)
    }

    fn unknown_slot(&self, slot: &str) -> Error {
        Error::UnknownSlot {
            op: self.name.clone(),
            slot: slot.to_owned(),
        }
    }
}

/// Builder for [`OpSchema`].
#[derive(Debug)]
pub struct OpSchemaBuilder {
    schema: OpSchema,
}

impl OpSchemaBuilder {
    #[must_use]
    pub fn input(mut self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.schema.inputs.push(SlotDef {
            name: name.into(),
            doc: doc.into(),
        });
        self
    }

    #[must_use]
    pub fn output(mut self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.schema.outputs.push(SlotDef {
            name: name.into(),
            doc: doc.into(),
        });
        self
    }

    /// Declares a required attribute.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, ty: AttrType, doc: impl Into<String>) -> Self {
        self.schema.attrs.push(AttrDef {
            name: name.into(),
            ty,
            doc: doc.into(),
            default: None,
        });
        self
    }

    /// Declares an optional attribute; the default decides its type.
    #[must_use]
    pub fn attr_with_default(
        mut self,
        name: impl Into<String>,
        default: impl Into<AttrValue>,
        doc: impl Into<String>,
    ) -> Self {
        let default = default.into();
        self.schema.attrs.push(AttrDef {
            name: name.into(),
            ty: default.attr_type(),
            doc: doc.into(),
            default: Some(default),
        });
        self
    }

    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.schema.doc = doc.into();
        self
    }

    #[must_use]
    pub fn differentiable(mut self, yes: bool) -> Self {
        self.schema.differentiable = yes;
        self
    }

    pub fn build(self) -> OpSchema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn scale_schema() -> OpSchema {
        OpSchema::builder("scale")
            .input("X", "Input tensor")
            .output("Out", "Scaled tensor")
            .attr("factor", AttrType::Float, "Multiplier")
            .attr_with_default("bias", 0.0f32, "Added after scaling")
            .build()
    }

    #[test]
    fn check_attrs_fills_defaults() {
        let given = Attributes::new().with("factor", 2.0f32);
        let checked = scale_schema().check_attrs(&given).unwrap();
        assert_eq!(checked.get_f32("factor"), Some(2.0));
        assert_eq!(checked.get_f32("bias"), Some(0.0));
    }

    #[test]
    fn check_attrs_requires_attrs_without_default() {
        let err = scale_schema().check_attrs(&Attributes::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert_eq!(err.culprit(), Some("factor"));
    }

    #[test]
    fn check_attrs_rejects_wrong_type_and_unknown_names() {
        let wrong = Attributes::new().with("factor", 2i64);
        assert!(matches!(
            scale_schema().check_attrs(&wrong),
            Err(Error::AttributeType {
                expected: AttrType::Float,
                got: AttrType::Int,
                ..
            })
        ));

        let unknown = Attributes::new().with("factor", 2.0f32).with("alpha", true);
        assert!(matches!(
            scale_schema().check_attrs(&unknown),
            Err(Error::UnknownAttribute { name, .. }) if name == "alpha"
        ));
    }

    #[test]
    fn check_slots_names_the_missing_slot() {
        let schema = scale_schema();
        assert!(schema.check_slots(["X"], ["Out"]).is_ok());
        assert!(matches!(
            schema.check_slots(std::iter::empty(), ["Out"]),
            Err(Error::MissingInput { slot, .. }) if slot == "X"
        ));
        assert!(matches!(
            schema.check_slots(["X"], std::iter::empty()),
            Err(Error::MissingOutput { slot, .. }) if slot == "Out"
        ));
        assert!(matches!(
            schema.check_slots(["X", "Y"], ["Out"]),
            Err(Error::UnknownSlot { slot, .. }) if slot == "Y"
        ));
    }
}
