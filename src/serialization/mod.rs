//! Export of UOp graphs for inspection.
//!
//! - **JSON**: every node reachable from the roots, with op, dtype, shape,
//!   device and operand ids (`serde_json`).
//! - **DOT**: the dependency graph for Graphviz (`petgraph::dot`).
//!
//! ```rust,ignore
//! let json = lazygrad::serialization::to_json(ctx.borrow().graph(), &[t.uop()])?;
//! let dot = lazygrad::serialization::to_dot(ctx.borrow().graph(), &[t.uop()])?;
//! ```

use crate::analysis::schedule::dependency_graph;
use crate::uop::render::format_shape;
use crate::uop::{GraphError, Op, UOp, UOpGraph, UOpId};
use petgraph::dot::{Config, Dot};
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown graph format '{0}', expected 'json' or 'dot'")]
    UnknownFormat(String),
}

type Result<T> = std::result::Result<T, SerializationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Json,
    Dot,
}

impl FromStr for GraphFormat {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(GraphFormat::Json),
            "dot" => Ok(GraphFormat::Dot),
            _ => Err(SerializationError::UnknownFormat(s.to_string())),
        }
    }
}

#[derive(Serialize)]
struct GraphDump<'a> {
    roots: &'a [UOpId],
    nodes: Vec<&'a UOp>,
}

/// Reachable nodes of `roots` in id order, as pretty-printed JSON.
pub fn to_json(graph: &UOpGraph, roots: &[UOpId]) -> Result<String> {
    let deps = dependency_graph(graph, roots)?;
    let mut ids: Vec<UOpId> = deps.node_weights().copied().collect();
    ids.sort_unstable();
    let nodes = ids
        .into_iter()
        .map(|id| graph.get(id))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(serde_json::to_string_pretty(&GraphDump { roots, nodes })?)
}

/// Dependency graph of `roots` in Graphviz DOT syntax.
pub fn to_dot(graph: &UOpGraph, roots: &[UOpId]) -> Result<String> {
    let deps = dependency_graph(graph, roots)?;
    let mut labelled = Vec::with_capacity(deps.node_count());
    for &id in deps.node_weights() {
        labelled.push(label(graph.get(id)?));
    }
    let labelled = deps.map(|ix, _| labelled[ix.index()].clone(), |_, _| String::new());
    Ok(format!("{}", Dot::with_config(&labelled, &[Config::EdgeNoLabel])))
}

pub fn export(graph: &UOpGraph, roots: &[UOpId], format: GraphFormat) -> Result<String> {
    match format {
        GraphFormat::Json => to_json(graph, roots),
        GraphFormat::Dot => to_dot(graph, roots),
    }
}

fn label(node: &UOp) -> String {
    let arg = match &node.op {
        Op::Buffer(buffer) => format!(" {}", buffer),
        Op::Const(value) => format!(" {}", value),
        _ => String::new(),
    };
    format!(
        "{}{} {} {} {}",
        node.op.name(),
        arg,
        node.dtype,
        format_shape(&node.shape),
        node.device
    )
}
