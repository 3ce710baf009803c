//! Execution order for pending nodes.
//!
//! Scheduling walks from the requested targets towards their operands, stops at
//! nodes that are already buffers, and topologically sorts what is left with
//! `petgraph`. Edges run from operand to user, so every node comes after
//! everything it reads.

use crate::uop::{GraphError, UOpGraph, UOpId};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Dependency graph over a subset of UOps, weights are the node ids.
pub type DependencyGraph = DiGraph<UOpId, ()>;

/// Builds the dependency graph of everything reachable from `roots`.
///
/// With `stop_at_buffers` the walk does not enter realized nodes; they are left
/// out of the graph entirely.
fn collect(
    graph: &UOpGraph,
    roots: &[UOpId],
    stop_at_buffers: bool,
) -> Result<DependencyGraph, GraphError> {
    let mut deps = DependencyGraph::new();
    let mut index: HashMap<UOpId, NodeIndex> = HashMap::new();
    let mut stack: Vec<UOpId> = Vec::new();

    for &root in roots {
        let node = graph.get(root)?;
        if stop_at_buffers && node.is_realized() {
            continue;
        }
        if !index.contains_key(&root) {
            index.insert(root, deps.add_node(root));
            stack.push(root);
        }
    }

    while let Some(id) = stack.pop() {
        let user = index[&id];
        for &src in &graph.get(id)?.src {
            if stop_at_buffers && graph.get(src)?.is_realized() {
                continue;
            }
            let operand = match index.get(&src) {
                Some(&ix) => ix,
                None => {
                    let ix = deps.add_node(src);
                    index.insert(src, ix);
                    stack.push(src);
                    ix
                }
            };
            deps.update_edge(operand, user, ());
        }
    }
    Ok(deps)
}

/// Full reachable subgraph of `roots`, buffers included.
pub fn dependency_graph(graph: &UOpGraph, roots: &[UOpId]) -> Result<DependencyGraph, GraphError> {
    collect(graph, roots, false)
}

/// Pending nodes needed for `targets`, operands first.
///
/// Targets that are already realized contribute nothing.
pub fn schedule(graph: &UOpGraph, targets: &[UOpId]) -> Result<Vec<UOpId>, GraphError> {
    let deps = collect(graph, targets, true)?;
    let order = toposort(&deps, None).map_err(|cycle| GraphError::Cycle(deps[cycle.node_id()]))?;
    Ok(order.into_iter().map(|ix| deps[ix]).collect())
}
