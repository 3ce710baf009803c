//! Materialized tensor data.
//!
//! Realized nodes point at a `Buffer` in the `BufferStore`. Each buffer owns a
//! dense `ndarray` array of its dtype.

use crate::device::Device;
use crate::dtype::DType;
use crate::runtime::backend::RuntimeError;
use crate::uop::ConstValue;
use ndarray::{arr0, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferId(usize);

impl BufferId {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Bool(ArrayD<bool>),
    Int32(ArrayD<i32>),
    Float32(ArrayD<f32>),
}

/// Applies the same expression to the array inside any `Storage` variant,
/// re-wrapping the result in the same variant.
macro_rules! map_storage {
    ($storage:expr, $a:ident => $body:expr) => {
        match $storage {
            Storage::Bool($a) => Storage::Bool($body),
            Storage::Int32($a) => Storage::Int32($body),
            Storage::Float32($a) => Storage::Float32($body),
        }
    };
}

impl Storage {
    /// Rank-0 array holding `value` converted to `dtype`.
    pub fn from_const(value: ConstValue, dtype: DType) -> Storage {
        match value.cast(dtype) {
            ConstValue::Bool(b) => Storage::Bool(arr0(b).into_dyn()),
            ConstValue::Int(i) => Storage::Int32(arr0(i).into_dyn()),
            ConstValue::Float(x) => Storage::Float32(arr0(x).into_dyn()),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Storage::Bool(_) => DType::Bool,
            Storage::Int32(_) => DType::Int32,
            Storage::Float32(_) => DType::Float32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Storage::Bool(a) => a.shape(),
            Storage::Int32(a) => a.shape(),
            Storage::Float32(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nbytes(&self) -> usize {
        self.len() * self.dtype().itemsize()
    }

    /// Row-major reshape. Works for any memory layout.
    pub fn reshape(&self, shape: &[usize]) -> Result<Storage, RuntimeError> {
        if self.len() != shape.iter().product::<usize>() {
            return Err(RuntimeError::ShapeError(format!(
                "cannot reshape {:?} into {:?}",
                self.shape(),
                shape
            )));
        }
        let reshaped = map_storage!(self, a => {
            ArrayD::from_shape_vec(IxDyn(shape), a.iter().cloned().collect())
                .map_err(|e| RuntimeError::ShapeError(e.to_string()))?
        });
        Ok(reshaped)
    }

    /// Broadcasts size-1 dimensions to `shape` and materializes the result.
    pub fn expand(&self, shape: &[usize]) -> Result<Storage, RuntimeError> {
        let expanded = map_storage!(self, a => {
            a.broadcast(IxDyn(shape))
                .ok_or_else(|| {
                    RuntimeError::ShapeError(format!("cannot expand {:?} to {:?}", a.shape(), shape))
                })?
                .to_owned()
        });
        Ok(expanded)
    }

    pub fn cast(&self, dtype: DType) -> Storage {
        match (self, dtype) {
            (s, d) if s.dtype() == d => s.clone(),
            (Storage::Bool(a), DType::Int32) => Storage::Int32(a.mapv(|b| b as i32)),
            (Storage::Bool(a), DType::Float32) => Storage::Float32(a.mapv(|b| if b { 1.0 } else { 0.0 })),
            (Storage::Int32(a), DType::Bool) => Storage::Bool(a.mapv(|i| i != 0)),
            (Storage::Int32(a), DType::Float32) => Storage::Float32(a.mapv(|i| i as f32)),
            (Storage::Float32(a), DType::Bool) => Storage::Bool(a.mapv(|x| x != 0.0)),
            (Storage::Float32(a), DType::Int32) => Storage::Int32(a.mapv(|x| x as i32)),
            (s, _) => s.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Buffer {
    pub id: BufferId,
    pub device: Device,
    pub storage: Storage,
}

/// Owner of every materialized buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferStore {
    buffers: HashMap<BufferId, Buffer>,
    next_id: usize,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, device: Device, storage: Storage) -> BufferId {
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.buffers.insert(id, Buffer { id, device, storage });
        id
    }

    pub fn get(&self, id: BufferId) -> Result<&Buffer, RuntimeError> {
        self.buffers.get(&id).ok_or(RuntimeError::BufferNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.buffers.values().map(|b| b.storage.nbytes()).sum()
    }
}
