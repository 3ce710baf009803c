//! UOp: nodes of the lazy computation graph.
//!
//! A `UOp` describes one pending operation and the nodes it reads. Nodes live
//! in a `UOpGraph` arena and are interned: building a node that is structurally
//! identical to an existing one (same op and arguments, dtype, shape, device and
//! operand ids) returns the existing id. Two tensors computing the same thing
//! therefore hold the same node, and realizing one of them realizes both.
//!
//! Nodes are immutable with a single exception: realization rewrites a node in
//! place into a `Buffer` node (see [`UOpGraph::become_buffer`]).

pub mod render;

use crate::buffer::BufferId;
use crate::device::Device;
use crate::dtype::DType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tracing::trace;

/// Tensor shape.
pub type Shape = Vec<usize>;

/// Identity of a node in a `UOpGraph`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UOpId(usize);

impl UOpId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for UOpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("UOp {0} not found in the graph. Check that the id comes from this context.")]
    NodeNotFound(UOpId),

    #[error("Cannot broadcast shapes {0:?} and {1:?} to a common shape. Trailing dimensions must match or be 1.")]
    IncompatibleShapes(Shape, Shape),

    #[error("Cannot reshape {from:?} into {to:?}: element counts differ")]
    InvalidReshape { from: Shape, to: Shape },

    #[error("Cannot expand {from:?} to {to:?}: only size-1 dimensions can grow")]
    InvalidExpand { from: Shape, to: Shape },

    #[error("Axis {axis} is out of range for a tensor of rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    #[error("Operands live on different devices: {0} and {1}. Move one of them with .to() first.")]
    DeviceMismatch(Device, Device),

    #[error("Operands belong to different graph contexts. Create both tensors from the same GraphContext.")]
    ContextMismatch,

    #[error("Graph contains a cycle through UOp {0}")]
    Cycle(UOpId),
}

/// Scalar payload of a `Const` node.
///
/// Floats compare and hash by bit pattern so that constants can be interned.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub enum ConstValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

impl ConstValue {
    /// Natural dtype of the scalar.
    pub fn dtype(self) -> DType {
        match self {
            ConstValue::Bool(_) => DType::Bool,
            ConstValue::Int(_) => DType::Int32,
            ConstValue::Float(_) => DType::Float32,
        }
    }

    /// Converts the value to another dtype the way a cast would.
    pub fn cast(self, dtype: DType) -> ConstValue {
        match (self, dtype) {
            (ConstValue::Bool(b), DType::Bool) => ConstValue::Bool(b),
            (ConstValue::Bool(b), DType::Int32) => ConstValue::Int(b as i32),
            (ConstValue::Bool(b), DType::Float32) => ConstValue::Float(if b { 1.0 } else { 0.0 }),
            (ConstValue::Int(i), DType::Bool) => ConstValue::Bool(i != 0),
            (ConstValue::Int(i), DType::Int32) => ConstValue::Int(i),
            (ConstValue::Int(i), DType::Float32) => ConstValue::Float(i as f32),
            (ConstValue::Float(x), DType::Bool) => ConstValue::Bool(x != 0.0),
            (ConstValue::Float(x), DType::Int32) => ConstValue::Int(x as i32),
            (ConstValue::Float(x), DType::Float32) => ConstValue::Float(x),
        }
    }
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ConstValue::Bool(b) => b.hash(state),
            ConstValue::Int(i) => i.hash(state),
            ConstValue::Float(x) => x.to_bits().hash(state),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            ConstValue::Int(i) => write!(f, "{}", i),
            ConstValue::Float(x) => write!(f, "{:?}", x),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Exp,
    Log,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    CmpLt,
    CmpEq,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::CmpLt | BinaryOp::CmpEq)
    }
}

/// Operation of a node. Target shapes and dtypes are carried by the node itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    /// Terminal node backed by a materialized buffer.
    Buffer(BufferId),
    /// Scalar constant of rank 0.
    Const(ConstValue),
    /// Transfer of the single operand to the node's device.
    Copy,
    Reshape,
    /// Broadcast of size-1 dimensions to the node's shape.
    Expand,
    Cast,
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Sum over the listed axes of the operand; the axes are removed.
    ReduceSum(Vec<usize>),
}

impl Op {
    /// Name in the `Ops.X` notation used when printing graphs.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Buffer(_) => "BUFFER",
            Op::Const(_) => "CONST",
            Op::Copy => "COPY",
            Op::Reshape => "RESHAPE",
            Op::Expand => "EXPAND",
            Op::Cast => "CAST",
            Op::Unary(UnaryOp::Neg) => "NEG",
            Op::Unary(UnaryOp::Sqrt) => "SQRT",
            Op::Unary(UnaryOp::Exp) => "EXP",
            Op::Unary(UnaryOp::Log) => "LOG",
            Op::Binary(BinaryOp::Add) => "ADD",
            Op::Binary(BinaryOp::Sub) => "SUB",
            Op::Binary(BinaryOp::Mul) => "MUL",
            Op::Binary(BinaryOp::Div) => "DIV",
            Op::Binary(BinaryOp::Max) => "MAX",
            Op::Binary(BinaryOp::CmpLt) => "CMPLT",
            Op::Binary(BinaryOp::CmpEq) => "CMPEQ",
            Op::ReduceSum(_) => "REDUCE_SUM",
        }
    }

    /// Movement ops only rearrange or repeat elements.
    pub fn is_movement(&self) -> bool {
        matches!(self, Op::Reshape | Op::Expand)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ops.{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UOp {
    pub id: UOpId,
    pub op: Op,
    pub dtype: DType,
    pub shape: Shape,
    pub device: Device,
    pub src: Vec<UOpId>,
}

impl UOp {
    pub fn is_realized(&self) -> bool {
        matches!(self.op, Op::Buffer(_))
    }

    pub fn buffer(&self) -> Option<BufferId> {
        match self.op {
            Op::Buffer(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UOpKey {
    op: Op,
    dtype: DType,
    shape: Shape,
    device: Device,
    src: Vec<UOpId>,
}

/// Arena of interned nodes.
#[derive(Debug, Clone, Default)]
pub struct UOpGraph {
    nodes: Vec<UOp>,
    cache: HashMap<UOpKey, UOpId>,
    cache_hits: usize,
}

impl UOpGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the node for this exact structure, creating it on first use.
    pub fn intern(
        &mut self,
        op: Op,
        dtype: DType,
        shape: Shape,
        device: Device,
        src: Vec<UOpId>,
    ) -> UOpId {
        let key = UOpKey { op, dtype, shape, device, src };
        if let Some(&id) = self.cache.get(&key) {
            self.cache_hits += 1;
            trace!(uop = %id, op = %key.op, "uop cache hit");
            return id;
        }

        let id = UOpId(self.nodes.len());
        self.nodes.push(UOp {
            id,
            op: key.op.clone(),
            dtype: key.dtype,
            shape: key.shape.clone(),
            device: key.device,
            src: key.src.clone(),
        });
        self.cache.insert(key, id);
        id
    }

    pub fn get(&self, id: UOpId) -> Result<&UOp, GraphError> {
        self.nodes.get(id.0).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn is_realized(&self, id: UOpId) -> Result<bool, GraphError> {
        Ok(self.get(id)?.is_realized())
    }

    /// Rewrites a node in place into a terminal `Buffer` node.
    ///
    /// The id, dtype, shape and device are kept, operands are dropped. Every
    /// handle holding `id` observes the change, and the interning entry of the
    /// original structure keeps pointing at it.
    pub fn become_buffer(&mut self, id: UOpId, buffer: BufferId) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(id.0).ok_or(GraphError::NodeNotFound(id))?;
        node.op = Op::Buffer(buffer);
        node.src.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of `intern` calls answered from the cache.
    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    pub fn iter(&self) -> impl Iterator<Item = &UOp> {
        self.nodes.iter()
    }
}
