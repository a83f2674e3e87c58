//! Element types a kernel can be specialized for.
//!
//! Every tensor carries a [`DataType`] tag so the dispatcher can pick the
//! matching kernel at runtime. The [`Element`] trait ties each tag to the
//! Rust scalar it stands for.

use core::fmt;
use core::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::tensors::{AnyTensor, Tensor};

/// Runtime tag of a tensor's element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Single-precision float (`f32`).
    F32,
    /// Double-precision float (`f64`).
    F64,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
        }
    }
}

/// A scalar type kernels can be instantiated for.
///
/// Kernels compute in the element type itself; there is no promotion.
pub trait Element:
    Copy
    + Send
    + Sync
    + PartialEq
    + fmt::Debug
    + Default
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + 'static
{
    /// The runtime tag of this type.
    const DTYPE: DataType;

    /// Converts an `f32` attribute value into this type.
    ///
    /// Float attributes are stored as `f32`, so a wider type receives the
    /// already rounded value: `0.9` arrives in `f64` as `0.8999999761581421`.
    fn from_f32(x: f32) -> Self;

    /// Wraps a typed tensor into the type-erased form.
    fn wrap(tensor: Tensor<Self>) -> AnyTensor;

    /// Borrows the typed tensor out of `any` when the element types agree.
    fn unwrap_ref(any: &AnyTensor) -> Option<&Tensor<Self>>;
}

impl Element for f32 {
    const DTYPE: DataType = DataType::F32;

    fn from_f32(x: f32) -> Self {
        x
    }

    fn wrap(tensor: Tensor<Self>) -> AnyTensor {
        AnyTensor::F32(tensor)
    }

    fn unwrap_ref(any: &AnyTensor) -> Option<&Tensor<Self>> {
        match any {
            AnyTensor::F32(t) => Some(t),
            AnyTensor::F64(_) => None,
        }
    }
}

impl Element for f64 {
    const DTYPE: DataType = DataType::F64;

    fn from_f32(x: f32) -> Self {
        Self::from(x)
    }

    fn wrap(tensor: Tensor<Self>) -> AnyTensor {
        AnyTensor::F64(tensor)
    }

    fn unwrap_ref(any: &AnyTensor) -> Option<&Tensor<Self>> {
        match any {
            AnyTensor::F64(t) => Some(t),
            AnyTensor::F32(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_size_matches_rust_type() {
        assert_eq!(DataType::F32.size_in_bytes(), size_of::<f32>());
        assert_eq!(DataType::F64.size_in_bytes(), size_of::<f64>());
        assert_eq!(<f64 as Element>::DTYPE.to_string(), "f64");
    }
}
