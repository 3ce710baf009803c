//! Realization: execute the pending part of a graph and turn the requested
//! nodes into buffers.

use super::backend::RuntimeError;
use crate::analysis::schedule::schedule;
use crate::buffer::{BufferStore, Storage};
use crate::device::DeviceRegistry;
use crate::uop::{Op, UOpGraph, UOpId};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Counters of the work done by realizations in one context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    /// Ops executed by a backend.
    pub kernels: usize,
    /// Buffers moved between devices.
    pub copies: usize,
    /// Nodes rewritten into buffers.
    pub realized: usize,
}

/// Borrows everything one realization touches.
pub struct Realizer<'a> {
    graph: &'a mut UOpGraph,
    buffers: &'a mut BufferStore,
    devices: &'a DeviceRegistry,
    stats: &'a mut ExecStats,
}

impl<'a> Realizer<'a> {
    pub fn new(
        graph: &'a mut UOpGraph,
        buffers: &'a mut BufferStore,
        devices: &'a DeviceRegistry,
        stats: &'a mut ExecStats,
    ) -> Self {
        Self { graph, buffers, devices, stats }
    }

    /// Computes every target that is not a buffer yet.
    ///
    /// Intermediate results only live for the duration of the call. After it
    /// returns, each target node is a `Buffer` node, observed by every handle
    /// that shares it.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub fn realize(&mut self, targets: &[UOpId]) -> Result<(), RuntimeError> {
        let order = schedule(self.graph, targets)?;
        if order.is_empty() {
            debug!("nothing to realize");
            return Ok(());
        }
        info!(nodes = order.len(), "scheduled");

        let mut memo: HashMap<UOpId, Storage> = HashMap::new();
        for id in order {
            let result = self.evaluate(id, &memo)?;
            memo.insert(id, result);
        }

        for &target in targets {
            if self.graph.is_realized(target)? {
                continue;
            }
            let storage = memo
                .remove(&target)
                .ok_or(RuntimeError::NotRealized(target))?;
            let device = self.graph.get(target)?.device;
            let buffer = self.buffers.allocate(device, storage);
            self.graph.become_buffer(target, buffer)?;
            self.stats.realized += 1;
            debug!(uop = %target, %buffer, %device, "realized");
        }
        Ok(())
    }

    fn evaluate(&mut self, id: UOpId, memo: &HashMap<UOpId, Storage>) -> Result<Storage, RuntimeError> {
        let graph = &*self.graph;
        let buffers = &*self.buffers;
        let node = graph.get(id)?;
        let inputs = node
            .src
            .iter()
            .map(|&src| operand(graph, buffers, memo, src))
            .collect::<Result<Vec<&Storage>, RuntimeError>>()?;

        let result = match &node.op {
            Op::Copy => {
                let input = inputs.first().ok_or_else(|| RuntimeError::TypeError {
                    expected: "1 operand for Ops.COPY".to_string(),
                    actual: "0 operand(s)".to_string(),
                })?;
                self.stats.copies += 1;
                (*input).clone()
            }
            Op::Buffer(_) => return Err(RuntimeError::NotRealized(id)),
            op => {
                let backend = self.devices.backend(node.device)?;
                let out = backend.execute(op, node.dtype, &node.shape, &inputs)?;
                self.stats.kernels += 1;
                out
            }
        };
        debug!(uop = %id, op = %node.op, device = %node.device, shape = ?node.shape, "exec");
        Ok(result)
    }
}

/// Value of an operand: computed earlier in this run, or an existing buffer.
fn operand<'m>(
    graph: &'m UOpGraph,
    buffers: &'m BufferStore,
    memo: &'m HashMap<UOpId, Storage>,
    id: UOpId,
) -> Result<&'m Storage, RuntimeError> {
    if let Some(storage) = memo.get(&id) {
        return Ok(storage);
    }
    match graph.get(id)?.buffer() {
        Some(buffer) => Ok(&buffers.get(buffer)?.storage),
        None => Err(RuntimeError::NotRealized(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::dtype::DType;
    use crate::uop::{BinaryOp, ConstValue};
    use ndarray::arr1;

    struct Env {
        graph: UOpGraph,
        buffers: BufferStore,
        devices: DeviceRegistry,
        stats: ExecStats,
    }

    impl Env {
        fn new() -> Self {
            Self {
                graph: UOpGraph::new(),
                buffers: BufferStore::new(),
                devices: DeviceRegistry::new(),
                stats: ExecStats::default(),
            }
        }

        fn realize(&mut self, targets: &[UOpId]) -> Result<(), RuntimeError> {
            Realizer::new(&mut self.graph, &mut self.buffers, &self.devices, &mut self.stats)
                .realize(targets)
        }

        fn read(&self, id: UOpId) -> Storage {
            let buffer = self.graph.get(id).unwrap().buffer().unwrap();
            self.buffers.get(buffer).unwrap().storage.clone()
        }

        /// Host buffer copied to the CPU, times a broadcast constant.
        fn times(&mut self, values: &[i32], k: i32) -> (UOpId, UOpId) {
            let n = values.len();
            let data = self
                .buffers
                .allocate(Device::Host, Storage::Int32(arr1(values).into_dyn()));
            let g = &mut self.graph;
            let buf = g.intern(Op::Buffer(data), DType::Int32, vec![n], Device::Host, vec![]);
            let copy = g.intern(Op::Copy, DType::Int32, vec![n], Device::Cpu, vec![buf]);
            let c = g.intern(Op::Const(ConstValue::Int(k)), DType::Int32, vec![], Device::Cpu, vec![]);
            let r = g.intern(Op::Reshape, DType::Int32, vec![1], Device::Cpu, vec![c]);
            let e = g.intern(Op::Expand, DType::Int32, vec![n], Device::Cpu, vec![r]);
            let mul = g.intern(Op::Binary(BinaryOp::Mul), DType::Int32, vec![n], Device::Cpu, vec![copy, e]);
            (copy, mul)
        }
    }

    #[test]
    fn test_realize_rewrites_target() {
        let mut env = Env::new();
        let (copy, mul) = env.times(&[1, 2, 3, 4], 2);
        env.realize(&[mul]).unwrap();

        assert_eq!(env.read(mul), Storage::Int32(arr1(&[2, 4, 6, 8]).into_dyn()));
        assert!(env.graph.is_realized(mul).unwrap());
        // Intermediates are not kept.
        assert!(!env.graph.is_realized(copy).unwrap());
        assert_eq!(env.stats, ExecStats { kernels: 4, copies: 1, realized: 1 });
    }

    #[test]
    fn test_realize_twice_is_free() {
        let mut env = Env::new();
        let (_, mul) = env.times(&[5], 3);
        env.realize(&[mul]).unwrap();
        let before = env.stats;
        env.realize(&[mul]).unwrap();
        assert_eq!(env.stats, before);
        assert_eq!(env.buffers.len(), 2);
    }

    #[test]
    fn test_realize_reuses_realized_operands() {
        let mut env = Env::new();
        let (copy, mul) = env.times(&[1, 2], 10);
        env.realize(&[copy]).unwrap();
        assert_eq!(env.stats.copies, 1);

        env.realize(&[mul]).unwrap();
        assert_eq!(env.stats.copies, 1);
        assert_eq!(env.read(mul), Storage::Int32(arr1(&[10, 20]).into_dyn()));
    }

    #[test]
    fn test_host_ops_have_no_backend() {
        let mut env = Env::new();
        let c = env
            .graph
            .intern(Op::Const(ConstValue::Int(1)), DType::Int32, vec![], Device::Host, vec![]);
        assert_eq!(env.realize(&[c]), Err(RuntimeError::NoBackend(Device::Host)));
        assert!(!env.graph.is_realized(c).unwrap());
    }

    #[test]
    fn test_failed_kernel_is_not_counted() {
        let mut env = Env::new();
        let g = &mut env.graph;
        let t = g.intern(Op::Const(ConstValue::Bool(true)), DType::Bool, vec![], Device::Cpu, vec![]);
        let div = g.intern(Op::Binary(BinaryOp::Div), DType::Bool, vec![], Device::Cpu, vec![t, t]);

        assert!(matches!(
            env.realize(&[div]),
            Err(RuntimeError::UnimplementedOperation(_))
        ));
        // Only the constant ran.
        assert_eq!(env.stats.kernels, 1);
        assert_eq!(env.stats.realized, 0);
    }
}
