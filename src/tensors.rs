//! Core tensor data structures.
//!
//! # Materialized Tensors
//!
//! Tensors here are the concrete arrays a kernel reads and writes once a
//! graph has passed shape inference. Storage and allocation policy belong to
//! the surrounding framework; this module only provides the minimal
//! row-major container the kernels are written against.
//!
//! ## Design Highlights
//! - `Tensor<T>` is strongly typed over its element type (`f32` or `f64`)
//! - `AnyTensor` erases the element type so the dispatcher can read the
//!   runtime [`DataType`] tag
//! - `Tensor::try_new` validates untrusted parts through `briny`
//! - The `tensor!` macro supports ergonomic creation from nested arrays
//!
//! ## Example
//!
//! ```rust
//! use momentum_op::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape.dims(), &[2, 3]);
//! ```

use briny::prelude::{TrustedData, Validate, ValidationError};

use crate::dtype::{DataType, Element};
use crate::error::Result;
use crate::shape::Shape;

/// Represents an N-dimensional tensor with a shape and flat row-major data.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Shape,
    pub data: Vec<T>,
}

impl<T> Validate for Tensor<T> {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        if self.shape.elem_count() != self.data.len() {
            return Err(ValidationError);
        }
        Ok(())
    }
}

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Shape>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.elem_count(),
            data.len(),
            "shape {} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Creates a tensor from untrusted parts.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTensor`](crate::error::Error::InvalidTensor)
    /// if `data` does not hold exactly `shape.elem_count()` elements.
    pub fn try_new(shape: impl Into<Shape>, data: Vec<T>) -> Result<Self> {
        let trusted = TrustedData::new(Self {
            shape: shape.into(),
            data,
        })?;
        Ok(trusted.into_inner())
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: Copy> Tensor<T> {
    /// A rank-0 tensor holding `value`.
    pub fn scalar(value: T) -> Self {
        Self {
            shape: Shape::scalar(),
            data: vec![value],
        }
    }

    /// The single element of a one-element tensor, whatever its rank.
    pub fn item(&self) -> Option<T> {
        match self.data.as_slice() {
            [x] => Some(*x),
            _ => None,
        }
    }
}

impl<T: Element> Tensor<T> {
    /// A tensor of the given shape filled with zeros.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let data = vec![T::default(); shape.elem_count()];
        Self { shape, data }
    }

    /// The runtime element-type tag.
    pub fn dtype(&self) -> DataType {
        T::DTYPE
    }
}

/// A tensor with its element type erased.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyTensor {
    F32(Tensor<f32>),
    F64(Tensor<f64>),
}

impl AnyTensor {
    /// The runtime element-type tag.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::F32(_) => DataType::F32,
            Self::F64(_) => DataType::F64,
        }
    }

    /// The tensor's shape.
    pub fn shape(&self) -> &Shape {
        match self {
            Self::F32(t) => &t.shape,
            Self::F64(t) => &t.shape,
        }
    }

    /// Borrows the typed tensor when the element type is `T`.
    pub fn as_typed<T: Element>(&self) -> Option<&Tensor<T>> {
        T::unwrap_ref(self)
    }
}

impl From<Tensor<f32>> for AnyTensor {
    fn from(t: Tensor<f32>) -> Self {
        Self::F32(t)
    }
}

impl From<Tensor<f64>> for AnyTensor {
    fn from(t: Tensor<f64>) -> Self {
        Self::F64(t)
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use momentum_op::tensor;
/// let t = tensor!([[1.0f32, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape.dims(), &[2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::scalar($lit)
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!($inner) ),+ ];
        let first_shape = children[0].shape.clone();
        assert!(children.iter().all(|c| c.shape == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut dims = vec![children.len()];
        dims.extend_from_slice(first_shape.dims());
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(dims, data)
    }};
}
