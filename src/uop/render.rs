//! Text rendering of a node and everything it depends on.
//!
//! ```text
//! UOp(Ops.MUL, dtypes.int, (4,), CPU, src=(
//!   UOp(Ops.BUFFER, dtypes.int, (4,), CPU, arg=buf1, src=()),
//!   UOp(Ops.EXPAND, dtypes.int, (4,), CPU, src=(
//!     UOp(Ops.RESHAPE, dtypes.int, (1,), CPU, src=(
//!       UOp(Ops.CONST, dtypes.int, (), CPU, arg=2, src=()),)),)),))
//! ```
//!
//! A node reachable along more than one edge is printed once as `x<n>:=UOp(...)`
//! and afterwards referenced as `x<n>`.

use super::{GraphError, Op, UOpGraph, UOpId};
use std::collections::{HashMap, HashSet};

/// Formats a shape as a tuple: `()`, `(4,)`, `(2, 3)`.
pub fn format_shape(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [d] => format!("({},)", d),
        dims => {
            let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}

impl UOpGraph {
    /// Renders `root` and its operands as an indented tree.
    pub fn render(&self, root: UOpId) -> Result<String, GraphError> {
        let mut uses: HashMap<UOpId, usize> = HashMap::new();
        self.count_uses(root, &mut uses, &mut HashSet::new())?;

        let mut printer = Printer {
            graph: self,
            shared: uses.into_iter().filter(|(_, n)| *n > 1).map(|(id, _)| id).collect(),
            printed: HashSet::new(),
            out: String::new(),
        };
        printer.node(root, 0)?;
        Ok(printer.out)
    }

    fn count_uses(
        &self,
        id: UOpId,
        uses: &mut HashMap<UOpId, usize>,
        visited: &mut HashSet<UOpId>,
    ) -> Result<(), GraphError> {
        if !visited.insert(id) {
            return Ok(());
        }
        for &src in &self.get(id)?.src {
            *uses.entry(src).or_insert(0) += 1;
            self.count_uses(src, uses, visited)?;
        }
        Ok(())
    }
}

struct Printer<'a> {
    graph: &'a UOpGraph,
    shared: HashSet<UOpId>,
    printed: HashSet<UOpId>,
    out: String,
}

impl Printer<'_> {
    fn node(&mut self, id: UOpId, depth: usize) -> Result<(), GraphError> {
        let shared = self.shared.contains(&id);
        if shared && self.printed.contains(&id) {
            self.out.push_str(&format!("x{}", id));
            return Ok(());
        }
        if shared {
            self.printed.insert(id);
            self.out.push_str(&format!("x{}:=", id));
        }

        let node = self.graph.get(id)?;
        self.out.push_str(&format!(
            "UOp({}, {}, {}, {}",
            node.op,
            node.dtype,
            format_shape(&node.shape),
            node.device
        ));
        match &node.op {
            Op::Buffer(buffer) => self.out.push_str(&format!(", arg={}", buffer)),
            Op::Const(value) => self.out.push_str(&format!(", arg={}", value)),
            Op::ReduceSum(axes) => self.out.push_str(&format!(", arg={}", format_shape(axes))),
            _ => {}
        }

        if node.src.is_empty() {
            self.out.push_str(", src=())");
            return Ok(());
        }

        self.out.push_str(", src=(");
        let src = node.src.clone();
        for child in src {
            self.out.push('\n');
            self.out.push_str(&"  ".repeat(depth + 1));
            self.node(child, depth + 1)?;
            self.out.push(',');
        }
        self.out.push_str("))");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferId;
    use crate::device::Device;
    use crate::dtype::DType;
    use crate::uop::{BinaryOp, ConstValue};

    #[test]
    fn test_format_shape() {
        assert_eq!(format_shape(&[]), "()");
        assert_eq!(format_shape(&[4]), "(4,)");
        assert_eq!(format_shape(&[2, 3]), "(2, 3)");
    }

    #[test]
    fn test_render_leaf() {
        let mut graph = UOpGraph::new();
        let buf = graph.intern(
            Op::Buffer(BufferId::from_raw(0)),
            DType::Int32,
            vec![4],
            Device::Host,
            vec![],
        );
        assert_eq!(
            graph.render(buf).unwrap(),
            "UOp(Ops.BUFFER, dtypes.int, (4,), HOST, arg=buf0, src=())"
        );
    }

    #[test]
    fn test_render_nested() {
        let mut graph = UOpGraph::new();
        let buf = graph.intern(
            Op::Buffer(BufferId::from_raw(0)),
            DType::Int32,
            vec![4],
            Device::Host,
            vec![],
        );
        let copy = graph.intern(Op::Copy, DType::Int32, vec![4], Device::Cpu, vec![buf]);
        let expected = "UOp(Ops.COPY, dtypes.int, (4,), CPU, src=(\n  \
                        UOp(Ops.BUFFER, dtypes.int, (4,), HOST, arg=buf0, src=()),))";
        assert_eq!(graph.render(copy).unwrap(), expected);
    }

    #[test]
    fn test_render_const_and_reduce_args() {
        let mut graph = UOpGraph::new();
        let c = graph.intern(Op::Const(ConstValue::Int(2)), DType::Int32, vec![], Device::Cpu, vec![]);
        let e = graph.intern(Op::Expand, DType::Int32, vec![3], Device::Cpu, vec![c]);
        let sum = graph.intern(Op::ReduceSum(vec![0]), DType::Int32, vec![], Device::Cpu, vec![e]);
        let text = graph.render(sum).unwrap();
        assert!(text.starts_with("UOp(Ops.REDUCE_SUM, dtypes.int, (), CPU, arg=(0,), src=("));
        assert!(text.contains("UOp(Ops.CONST, dtypes.int, (), CPU, arg=2, src=())"));
    }

    #[test]
    fn test_render_labels_shared_nodes() {
        let mut graph = UOpGraph::new();
        let buf = graph.intern(
            Op::Buffer(BufferId::from_raw(0)),
            DType::Int32,
            vec![4],
            Device::Cpu,
            vec![],
        );
        let sum = graph.intern(
            Op::Binary(BinaryOp::Add),
            DType::Int32,
            vec![4],
            Device::Cpu,
            vec![buf, buf],
        );
        let text = graph.render(sum).unwrap();
        assert!(text.contains(&format!("x{}:=UOp(Ops.BUFFER", buf)));
        assert!(text.contains(&format!("\n  x{},))", buf)));
    }
}
