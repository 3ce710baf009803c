//! Element types of tensors.
//!
//! The set is deliberately small: booleans from comparisons, 32-bit integers
//! from integer literals, 32-bit floats for everything else. Promotion follows
//! the lattice `Bool < Int32 < Float32`.

use crate::buffer::Storage;
use crate::uop::ConstValue;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DType {
    Bool,
    Int32,
    Float32,
}

impl DType {
    /// Least upper bound of two dtypes.
    pub fn promote(a: DType, b: DType) -> DType {
        a.max(b)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32)
    }

    pub fn is_int(self) -> bool {
        matches!(self, DType::Int32)
    }

    /// Size of one element in bytes.
    pub fn itemsize(self) -> usize {
        match self {
            DType::Bool => 1,
            DType::Int32 | DType::Float32 => 4,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::Int32 => "int",
            DType::Float32 => "float",
        };
        write!(f, "dtypes.{}", name)
    }
}

/// Rust scalar types that can live inside a tensor.
pub trait Element: Copy + fmt::Debug + PartialEq + 'static {
    const DTYPE: DType;

    fn into_storage(array: ArrayD<Self>) -> Storage;

    fn view_storage(storage: &Storage) -> Option<&ArrayD<Self>>;

    fn into_const(self) -> ConstValue;
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn into_storage(array: ArrayD<Self>) -> Storage {
        Storage::Bool(array)
    }

    fn view_storage(storage: &Storage) -> Option<&ArrayD<Self>> {
        match storage {
            Storage::Bool(a) => Some(a),
            _ => None,
        }
    }

    fn into_const(self) -> ConstValue {
        ConstValue::Bool(self)
    }
}

impl Element for i32 {
    const DTYPE: DType = DType::Int32;

    fn into_storage(array: ArrayD<Self>) -> Storage {
        Storage::Int32(array)
    }

    fn view_storage(storage: &Storage) -> Option<&ArrayD<Self>> {
        match storage {
            Storage::Int32(a) => Some(a),
            _ => None,
        }
    }

    fn into_const(self) -> ConstValue {
        ConstValue::Int(self)
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::Float32;

    fn into_storage(array: ArrayD<Self>) -> Storage {
        Storage::Float32(array)
    }

    fn view_storage(storage: &Storage) -> Option<&ArrayD<Self>> {
        match storage {
            Storage::Float32(a) => Some(a),
            _ => None,
        }
    }

    fn into_const(self) -> ConstValue {
        ConstValue::Float(self)
    }
}
