//! Errors raised while building, validating and dispatching operators.
//!
//! Every failure names the operator and the slot or attribute at fault so a
//! graph-building tool can report it to the model author as-is. None of them
//! is retried at this layer.

use briny::prelude::ValidationError;

use crate::backend::Device;
use crate::dtype::DataType;
use crate::schema::AttrType;
use crate::shape::Shape;

/// Broad class of an [`Error`], following the point in an operator's life
/// at which it is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or undeclared slot, missing or ill-typed attribute.
    SchemaViolation,
    /// Shape inference rejected the operator's input shapes.
    ShapeMismatch,
    /// No kernel, or not the right data, for a run.
    DispatchFailure,
    /// The registry was misused: unknown or duplicate names.
    Registration,
    /// Tensor parts that do not describe a valid tensor.
    Tensor,
}

/// All errors this crate can return.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Input({slot}) of {op} should not be null.")]
    MissingInput { op: String, slot: String },

    #[error("Output({slot}) of {op} should not be null.")]
    MissingOutput { op: String, slot: String },

    #[error("{slot} is not a declared input or output of {op}")]
    UnknownSlot { op: String, slot: String },

    #[error("required attribute `{name}` of {op} is not set")]
    MissingAttribute { op: String, name: String },

    #[error("attribute `{name}` of {op} should be {expected}, got {got}")]
    AttributeType {
        op: String,
        name: String,
        expected: AttrType,
        got: AttrType,
    },

    #[error("{name} is not a declared attribute of {op}")]
    UnknownAttribute { op: String, name: String },

    #[error(
        "{reference} and {slot} input of {op} should have the same dimension: {expected} vs {got}"
    )]
    ShapeMismatch {
        op: String,
        reference: String,
        slot: String,
        expected: Shape,
        got: Shape,
    },

    #[error("{slot} of {op} should be a scalar, got shape {shape}")]
    NotScalar {
        op: String,
        slot: String,
        shape: Shape,
    },

    #[error("no {device}/{dtype} kernel is registered for {op}")]
    NoKernel {
        op: String,
        device: Device,
        dtype: DataType,
    },

    #[error("input {slot} of {op} holds {got} elements, the {expected} kernel was selected")]
    DtypeMismatch {
        op: String,
        slot: String,
        expected: DataType,
        got: DataType,
    },

    #[error("variable `{name}` is not in scope")]
    MissingVariable { name: String },

    #[error("operator `{name}` is not registered")]
    UnknownOperator { name: String },

    #[error("operator `{name}` is registered twice")]
    DuplicateOperator { name: String },

    #[error("{device}/{dtype} kernel of {op} is registered twice")]
    DuplicateKernel {
        op: String,
        device: Device,
        dtype: DataType,
    },

    #[error("tensor data does not match its shape: {0}")]
    InvalidTensor(#[from] ValidationError),

    #[cfg(feature = "wgpu")]
    #[error("GPU failure: {0}")]
    Gpu(String),
}

impl Error {
    /// The broad class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput { .. }
            | Self::MissingOutput { .. }
            | Self::UnknownSlot { .. }
            | Self::MissingAttribute { .. }
            | Self::AttributeType { .. }
            | Self::UnknownAttribute { .. } => ErrorKind::SchemaViolation,
            Self::ShapeMismatch { .. } | Self::NotScalar { .. } => ErrorKind::ShapeMismatch,
            Self::NoKernel { .. } | Self::DtypeMismatch { .. } | Self::MissingVariable { .. } => {
                ErrorKind::DispatchFailure
            }
            #[cfg(feature = "wgpu")]
            Self::Gpu(_) => ErrorKind::DispatchFailure,
            Self::UnknownOperator { .. }
            | Self::DuplicateOperator { .. }
            | Self::DuplicateKernel { .. } => ErrorKind::Registration,
            Self::InvalidTensor(_) => ErrorKind::Tensor,
        }
    }

    /// The slot, attribute or variable name this error points at, if any.
    pub fn culprit(&self) -> Option<&str> {
        match self {
            Self::MissingInput { slot, .. }
            | Self::MissingOutput { slot, .. }
            | Self::UnknownSlot { slot, .. }
            | Self::ShapeMismatch { slot, .. }
            | Self::NotScalar { slot, .. }
            | Self::DtypeMismatch { slot, .. } => Some(slot),
            Self::MissingAttribute { name, .. }
            | Self::AttributeType { name, .. }
            | Self::UnknownAttribute { name, .. }
            | Self::MissingVariable { name } => Some(name),
            _ => None,
        }
    }
}

/// Shorthand for results carrying this crate's [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
