//! `Tensor` and `GraphContext`.
//!
//! A `Tensor` holds no data. It is a lightweight handle: the id of a node in
//! the UOp graph plus a reference to the `GraphContext` that owns the graph.
//! Every operation on tensors appends (or reuses) nodes; nothing is computed
//! until [`Tensor::realize`] or one of the reading methods forces it.
//!
//! `GraphContext` is the central object. It owns the interned graph, the
//! materialized buffers, the device registry, the configuration and the
//! execution counters, and is shared between handles through
//! `Rc<RefCell<GraphContext>>`.

use crate::analysis::shape;
use crate::buffer::{BufferStore, Storage};
use crate::config::Config;
use crate::device::{Device, DeviceRegistry};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::backend::RuntimeError;
use crate::runtime::realize::{ExecStats, Realizer};
use crate::uop::render::format_shape;
use crate::uop::{BinaryOp, ConstValue, GraphError, Op, Shape, UOp, UOpGraph, UOpId, UnaryOp};
use ndarray::{Array1, ArrayD, IxDyn};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;
use tracing::debug;

/// Owner of one lazy graph and everything needed to realize it.
#[derive(Debug)]
pub struct GraphContext {
    graph: UOpGraph,
    buffers: BufferStore,
    devices: DeviceRegistry,
    config: Config,
    default_device: Device,
    stats: ExecStats,
}

impl GraphContext {
    /// Context with the CPU backend and default configuration.
    pub fn new() -> Self {
        Self {
            graph: UOpGraph::new(),
            buffers: BufferStore::new(),
            devices: DeviceRegistry::new(),
            config: Config::default(),
            default_device: Device::Cpu,
            stats: ExecStats::default(),
        }
    }

    /// Context whose default device follows `config`.
    pub fn with_config(config: Config) -> Result<Self> {
        Self::with_registry(config, DeviceRegistry::new())
    }

    pub fn with_registry(config: Config, devices: DeviceRegistry) -> Result<Self> {
        let default_device = devices.resolve_default(config.device)?;
        debug!(device = %default_device, "default device resolved");
        Ok(Self {
            graph: UOpGraph::new(),
            buffers: BufferStore::new(),
            devices,
            config,
            default_device,
            stats: ExecStats::default(),
        })
    }

    /// Convenience for `Rc::new(RefCell::new(GraphContext::new()))`.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn graph(&self) -> &UOpGraph {
        &self.graph
    }

    pub fn buffers(&self) -> &BufferStore {
        &self.buffers
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> ExecStats {
        self.stats
    }

    pub fn default_device(&self) -> Device {
        self.default_device
    }

    /// Realizes the given nodes and everything pending behind them.
    pub fn realize(&mut self, targets: &[UOpId]) -> std::result::Result<(), RuntimeError> {
        Realizer::new(&mut self.graph, &mut self.buffers, &self.devices, &mut self.stats)
            .realize(targets)
    }

    /// Storage of a realized node.
    pub fn storage(&self, id: UOpId) -> std::result::Result<&Storage, RuntimeError> {
        let buffer = self.graph.get(id)?.buffer().ok_or(RuntimeError::NotRealized(id))?;
        Ok(&self.buffers.get(buffer)?.storage)
    }

    fn new_literal(&mut self, storage: Storage) -> UOpId {
        let dtype = storage.dtype();
        let shape = storage.shape().to_vec();
        let buffer = self.buffers.allocate(Device::Host, storage);
        let host = self.graph.intern(Op::Buffer(buffer), dtype, shape.clone(), Device::Host, vec![]);
        self.graph.intern(Op::Copy, dtype, shape, self.default_device, vec![host])
    }
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a node in the lazy graph.
///
/// Cloning a tensor clones the handle: both clones refer to the same node.
#[derive(Debug, Clone)]
pub struct Tensor {
    uop: UOpId,
    context: Rc<RefCell<GraphContext>>,
}

impl Tensor {
    /// 1-D tensor from a slice of values.
    ///
    /// The values are placed in a `Host` buffer and the returned tensor is a
    /// pending copy of that buffer to the default device.
    pub fn new<T: Element>(context: &Rc<RefCell<GraphContext>>, data: &[T]) -> Self {
        Self::from_array(context, Array1::from(data.to_vec()).into_dyn())
    }

    /// Tensor of any rank from an `ndarray` array.
    pub fn from_array<T: Element>(context: &Rc<RefCell<GraphContext>>, data: ArrayD<T>) -> Self {
        let uop = context.borrow_mut().new_literal(T::into_storage(data));
        Self { uop, context: Rc::clone(context) }
    }

    /// Tensor filled with one value, built from a constant. No buffer is created.
    pub fn full<T: Element>(context: &Rc<RefCell<GraphContext>>, shape: &[usize], value: T) -> Self {
        let scalar = Self::constant(context, value.into_const(), T::DTYPE);
        scalar
            .broadcast_to(shape)
            .unwrap_or_else(|_| unreachable!("a scalar broadcasts to any shape"))
    }

    pub fn zeros(context: &Rc<RefCell<GraphContext>>, shape: &[usize]) -> Self {
        Self::full(context, shape, 0.0f32)
    }

    pub fn ones(context: &Rc<RefCell<GraphContext>>, shape: &[usize]) -> Self {
        Self::full(context, shape, 1.0f32)
    }

    /// Uniform samples in `[0, 1)`. A seed makes the values reproducible.
    pub fn rand(context: &Rc<RefCell<GraphContext>>, shape: &[usize], seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let data = ArrayD::random_using(IxDyn(shape), Uniform::new(0.0f32, 1.0), &mut rng);
        Self::from_array(context, data)
    }

    fn constant(context: &Rc<RefCell<GraphContext>>, value: ConstValue, dtype: DType) -> Self {
        let mut ctx = context.borrow_mut();
        let device = ctx.default_device;
        let uop = ctx
            .graph
            .intern(Op::Const(value.cast(dtype)), dtype, vec![], device, vec![]);
        Self { uop, context: Rc::clone(context) }
    }

    // --- Accessors ---

    /// Id of the graph node. Equal ids mean a shared node.
    pub fn uop(&self) -> UOpId {
        self.uop
    }

    /// Snapshot of the graph node.
    pub fn uop_node(&self) -> Result<UOp> {
        Ok(self.context.borrow().graph.get(self.uop)?.clone())
    }

    /// The node and its operands rendered as a tree.
    pub fn uop_repr(&self) -> Result<String> {
        Ok(self.context.borrow().graph.render(self.uop)?)
    }

    pub fn context(&self) -> &Rc<RefCell<GraphContext>> {
        &self.context
    }

    pub fn device(&self) -> Device {
        self.with_node(|n| n.device)
    }

    pub fn dtype(&self) -> DType {
        self.with_node(|n| n.dtype)
    }

    pub fn shape(&self) -> Shape {
        self.with_node(|n| n.shape.clone())
    }

    pub fn numel(&self) -> usize {
        shape::numel(&self.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn is_realized(&self) -> bool {
        self.with_node(|n| n.is_realized())
    }

    fn with_node<R>(&self, f: impl FnOnce(&UOp) -> R) -> R {
        let ctx = self.context.borrow();
        // Handles are only created by this module, always for an interned node.
        match ctx.graph.get(self.uop) {
            Ok(node) => f(node),
            Err(_) => unreachable!("tensor handle without a graph node"),
        }
    }

    fn derive(&self, op: Op, dtype: DType, shape: Shape, src: Vec<UOpId>) -> Tensor {
        let device = self.device();
        let uop = self
            .context
            .borrow_mut()
            .graph
            .intern(op, dtype, shape, device, src);
        Tensor { uop, context: Rc::clone(&self.context) }
    }

    fn check_compatible(&self, other: &Tensor) -> Result<()> {
        if !Rc::ptr_eq(&self.context, &other.context) {
            return Err(GraphError::ContextMismatch.into());
        }
        let (a, b) = (self.device(), other.device());
        if a != b {
            return Err(GraphError::DeviceMismatch(a, b).into());
        }
        Ok(())
    }

    // --- Movement and casts ---

    pub fn reshape(&self, new_shape: &[usize]) -> Result<Tensor> {
        let current = self.shape();
        if current == new_shape {
            return Ok(self.clone());
        }
        shape::validate_reshape(&current, new_shape)?;
        Ok(self.derive(Op::Reshape, self.dtype(), new_shape.to_vec(), vec![self.uop]))
    }

    /// Repeats size-1 dimensions up to `new_shape`. Ranks must match.
    pub fn expand(&self, new_shape: &[usize]) -> Result<Tensor> {
        let current = self.shape();
        if current == new_shape {
            return Ok(self.clone());
        }
        shape::validate_expand(&current, new_shape)?;
        Ok(self.derive(Op::Expand, self.dtype(), new_shape.to_vec(), vec![self.uop]))
    }

    /// Numpy broadcasting as explicit graph nodes: a reshape that prepends
    /// size-1 dimensions, then an expand.
    pub fn broadcast_to(&self, target: &[usize]) -> Result<Tensor> {
        let current = self.shape();
        if current == target {
            return Ok(self.clone());
        }
        if shape::broadcast_shapes(&current, target)? != target {
            return Err(GraphError::InvalidExpand { from: current, to: target.to_vec() }.into());
        }
        self.reshape(&shape::pad_rank(&current, target.len()))?
            .expand(target)
    }

    pub fn cast(&self, dtype: DType) -> Tensor {
        if self.dtype() == dtype {
            return self.clone();
        }
        self.derive(Op::Cast, dtype, self.shape(), vec![self.uop])
    }

    /// Pending copy to another device. Same device is a no-op.
    pub fn to(&self, device: Device) -> Tensor {
        if self.device() == device {
            return self.clone();
        }
        let (dtype, shape) = (self.dtype(), self.shape());
        let uop = self
            .context
            .borrow_mut()
            .graph
            .intern(Op::Copy, dtype, shape, device, vec![self.uop]);
        Tensor { uop, context: Rc::clone(&self.context) }
    }

    // --- Elementwise ---

    fn unary(&self, op: UnaryOp) -> Tensor {
        let input = match op {
            UnaryOp::Neg => self.clone(),
            _ => self.cast(DType::Float32),
        };
        input.derive(Op::Unary(op), input.dtype(), input.shape(), vec![input.uop])
    }

    pub fn neg(&self) -> Tensor {
        self.unary(UnaryOp::Neg)
    }

    pub fn sqrt(&self) -> Tensor {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn exp(&self) -> Tensor {
        self.unary(UnaryOp::Exp)
    }

    pub fn log(&self) -> Tensor {
        self.unary(UnaryOp::Log)
    }

    /// Builds a binary node: promote dtypes, broadcast shapes, intern.
    pub fn binary<R: IntoOperand>(&self, op: BinaryOp, rhs: R) -> Result<Tensor> {
        let rhs = rhs.into_operand(self);
        self.check_compatible(&rhs)?;

        let mut dtype = DType::promote(self.dtype(), rhs.dtype());
        if op == BinaryOp::Div {
            dtype = DType::promote(dtype, DType::Float32);
        }
        let out_shape = shape::broadcast_shapes(&self.shape(), &rhs.shape())?;
        let lhs = self.cast(dtype).broadcast_to(&out_shape)?;
        let rhs = rhs.cast(dtype).broadcast_to(&out_shape)?;

        let out_dtype = if op.is_comparison() { DType::Bool } else { dtype };
        Ok(lhs.derive(Op::Binary(op), out_dtype, out_shape, vec![lhs.uop, rhs.uop]))
    }

    pub fn try_add<R: IntoOperand>(&self, rhs: R) -> Result<Tensor> {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn try_sub<R: IntoOperand>(&self, rhs: R) -> Result<Tensor> {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn try_mul<R: IntoOperand>(&self, rhs: R) -> Result<Tensor> {
        self.binary(BinaryOp::Mul, rhs)
    }

    /// True division; the result is always float.
    pub fn try_div<R: IntoOperand>(&self, rhs: R) -> Result<Tensor> {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn maximum<R: IntoOperand>(&self, rhs: R) -> Result<Tensor> {
        self.binary(BinaryOp::Max, rhs)
    }

    pub fn lt<R: IntoOperand>(&self, rhs: R) -> Result<Tensor> {
        self.binary(BinaryOp::CmpLt, rhs)
    }

    pub fn gt<R: IntoOperand>(&self, rhs: R) -> Result<Tensor> {
        rhs.into_operand(self).binary(BinaryOp::CmpLt, self)
    }

    /// Elementwise equality (not handle identity).
    pub fn eq_elem<R: IntoOperand>(&self, rhs: R) -> Result<Tensor> {
        self.binary(BinaryOp::CmpEq, rhs)
    }

    // --- Reductions ---

    /// Sums over `axes` (all axes for `None`), removing them. Bool and int
    /// tensors sum as int.
    pub fn sum(&self, axes: Option<&[usize]>) -> Result<Tensor> {
        let input = if self.dtype() == DType::Bool { self.cast(DType::Int32) } else { self.clone() };
        let (axes, out_shape) = shape::reduce_shape(&input.shape(), axes)?;
        if axes.is_empty() {
            return Ok(input);
        }
        Ok(input.derive(Op::ReduceSum(axes), input.dtype(), out_shape, vec![input.uop]))
    }

    // --- Forcing ---

    /// Executes everything this tensor depends on and turns its node into a
    /// buffer. Every tensor sharing the node is realized too.
    pub fn realize(&self) -> Result<&Self> {
        self.context.borrow_mut().realize(&[self.uop])?;
        Ok(self)
    }

    /// Realizes several tensors in one schedule.
    pub fn realize_all(tensors: &[&Tensor]) -> Result<()> {
        let Some(first) = tensors.first() else {
            return Ok(());
        };
        for t in &tensors[1..] {
            if !Rc::ptr_eq(&first.context, &t.context) {
                return Err(GraphError::ContextMismatch.into());
            }
        }
        let targets: Vec<UOpId> = tensors.iter().map(|t| t.uop).collect();
        first.context.borrow_mut().realize(&targets)?;
        Ok(())
    }

    /// Realizes and returns the elements as an n-d array.
    pub fn to_array<T: Element>(&self) -> Result<ArrayD<T>> {
        self.realize()?;
        let ctx = self.context.borrow();
        let storage = ctx.storage(self.uop)?;
        T::view_storage(storage)
            .cloned()
            .ok_or(Error::DTypeMismatch { requested: T::DTYPE, actual: storage.dtype() })
    }

    /// Realizes and returns the elements flattened in row-major order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        Ok(self.to_array::<T>()?.iter().copied().collect())
    }

    /// The single element of a one-element tensor.
    pub fn item<T: Element>(&self) -> Result<T> {
        let values = self.to_vec::<T>()?;
        match values.as_slice() {
            [value] => Ok(*value),
            _ => Err(Error::NotScalar(values.len())),
        }
    }
}

impl fmt::Display for Tensor {
    /// `<Tensor <UOp CPU (4,) dtypes.int Ops.COPY> on CPU>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = self.context.borrow();
        match ctx.graph.get(self.uop) {
            Ok(node) => write!(
                f,
                "<Tensor <UOp {} {} {} {}> on {}>",
                node.device,
                format_shape(&node.shape),
                node.dtype,
                node.op,
                node.device
            ),
            Err(_) => write!(f, "<Tensor <missing UOp {}>>", self.uop),
        }
    }
}

/// Values usable as the right operand of a tensor operation.
pub trait IntoOperand {
    fn into_operand(self, like: &Tensor) -> Tensor;
}

impl IntoOperand for Tensor {
    fn into_operand(self, _like: &Tensor) -> Tensor {
        self
    }
}

impl IntoOperand for &Tensor {
    fn into_operand(self, _like: &Tensor) -> Tensor {
        self.clone()
    }
}

/// A scalar takes the tensor's dtype, unless its own dtype is higher in the
/// promotion lattice (`int_tensor * 2.5` is float).
fn scalar_operand(value: ConstValue, like: &Tensor) -> Tensor {
    let like_dtype = like.dtype();
    let dtype = if value.dtype() <= like_dtype { like_dtype } else { value.dtype() };
    let device = like.device();
    let uop = like
        .context
        .borrow_mut()
        .graph
        .intern(Op::Const(value.cast(dtype)), dtype, vec![], device, vec![]);
    Tensor { uop, context: Rc::clone(&like.context) }
}

macro_rules! impl_scalar_operand {
    ($($t:ty),*) => {
        $(
            impl IntoOperand for $t {
                fn into_operand(self, like: &Tensor) -> Tensor {
                    scalar_operand(self.into_const(), like)
                }
            }
        )*
    };
}

impl_scalar_operand!(bool, i32, f32);

// Operators for `a * b` syntax. Like ndarray's arithmetic operators they panic
// on incompatible shapes; the `try_*` methods return the error instead.
macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: IntoOperand> $trait<R> for &Tensor {
            type Output = Tensor;

            fn $method(self, rhs: R) -> Tensor {
                self.binary($op, rhs)
                    .unwrap_or_else(|err| panic!("{} failed: {}", stringify!($method), err))
            }
        }

        impl<R: IntoOperand> $trait<R> for Tensor {
            type Output = Tensor;

            fn $method(self, rhs: R) -> Tensor {
                (&self).$method(rhs)
            }
        }
    };
}

impl_binary_operator!(Add, add, BinaryOp::Add);
impl_binary_operator!(Sub, sub, BinaryOp::Sub);
impl_binary_operator!(Mul, mul, BinaryOp::Mul);
impl_binary_operator!(Div, div, BinaryOp::Div);

impl Neg for &Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        self.unary(UnaryOp::Neg)
    }
}

impl Neg for Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        self.unary(UnaryOp::Neg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_copy_of_host_buffer() {
        let ctx = GraphContext::shared();
        let t = Tensor::new(&ctx, &[1, 2, 3, 4]);

        let node = t.uop_node().unwrap();
        assert_eq!(node.op, Op::Copy);
        assert_eq!(node.device, Device::Cpu);
        let src = ctx.borrow().graph().get(node.src[0]).unwrap().clone();
        assert!(matches!(src.op, Op::Buffer(_)));
        assert_eq!(src.device, Device::Host);
        assert_eq!(ctx.borrow().stats(), ExecStats::default());
    }

    #[test]
    fn test_scalar_mul_builds_broadcast_nodes() {
        let ctx = GraphContext::shared();
        let t = Tensor::new(&ctx, &[1, 2, 3, 4]);
        let y = &t * 2;

        let node = y.uop_node().unwrap();
        assert_eq!(node.op, Op::Binary(BinaryOp::Mul));
        assert_eq!(node.src[0], t.uop());

        let graph = ctx.borrow();
        let expand = graph.graph().get(node.src[1]).unwrap();
        assert_eq!(expand.op, Op::Expand);
        assert_eq!(expand.shape, vec![4]);
        let reshape = graph.graph().get(expand.src[0]).unwrap();
        assert_eq!(reshape.op, Op::Reshape);
        assert_eq!(reshape.shape, vec![1]);
        let konst = graph.graph().get(reshape.src[0]).unwrap();
        assert_eq!(konst.op, Op::Const(ConstValue::Int(2)));
    }

    #[test]
    fn test_scalar_dtype_follows_tensor() {
        let ctx = GraphContext::shared();
        let f = Tensor::new(&ctx, &[1.0f32, 2.0]);
        assert_eq!((&f * 2).dtype(), DType::Float32);

        let i = Tensor::new(&ctx, &[1, 2]);
        assert_eq!((&i * 2).dtype(), DType::Int32);
        assert_eq!((&i * 2.5f32).dtype(), DType::Float32);
        assert_eq!((&i / 2).dtype(), DType::Float32);
        assert_eq!(i.lt(2).unwrap().dtype(), DType::Bool);
    }

    #[test]
    fn test_identity_ops_reuse_the_node() {
        let ctx = GraphContext::shared();
        let t = Tensor::new(&ctx, &[1, 2, 3]);
        assert_eq!(t.reshape(&[3]).unwrap().uop(), t.uop());
        assert_eq!(t.cast(DType::Int32).uop(), t.uop());
        assert_eq!(t.to(Device::Cpu).uop(), t.uop());
    }

    #[test]
    fn test_to_other_device_adds_copy() {
        let ctx = GraphContext::shared();
        let t = Tensor::new(&ctx, &[1, 2]);
        let host = t.to(Device::Host);

        let node = host.uop_node().unwrap();
        assert_eq!(node.op, Op::Copy);
        assert_eq!(node.device, Device::Host);
        assert_eq!(node.shape, vec![2]);
        assert_eq!(node.src, vec![t.uop()]);
        assert_eq!(t.to(Device::Host).uop(), host.uop());
    }

    #[test]
    fn test_context_mismatch() {
        let a = Tensor::new(&GraphContext::shared(), &[1]);
        let b = Tensor::new(&GraphContext::shared(), &[1]);
        assert!(matches!(
            a.try_add(&b),
            Err(Error::Graph(GraphError::ContextMismatch))
        ));
    }

    #[test]
    fn test_display() {
        let ctx = GraphContext::shared();
        let t = Tensor::new(&ctx, &[1, 2, 3, 4]);
        assert_eq!(t.to_string(), "<Tensor <UOp CPU (4,) dtypes.int Ops.COPY> on CPU>");
        t.realize().unwrap();
        assert_eq!(t.to_string(), "<Tensor <UOp CPU (4,) dtypes.int Ops.BUFFER> on CPU>");
    }

    #[test]
    #[should_panic(expected = "add failed")]
    fn test_operator_panics_on_bad_shapes() {
        let ctx = GraphContext::shared();
        let a = Tensor::new(&ctx, &[1, 2, 3]);
        let b = Tensor::new(&ctx, &[1, 2]);
        let _ = &a + &b;
    }
}
