//! Shape rules applied while the graph is built.

use crate::uop::{GraphError, Shape};

type Result<T> = std::result::Result<T, GraphError>;

pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Numpy-style broadcast of two shapes.
///
/// Shapes are aligned on their trailing dimensions; a dimension of size 1
/// stretches to match the other side.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Shape> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return Err(GraphError::IncompatibleShapes(a.to_vec(), b.to_vec())),
        };
    }
    Ok(out)
}

/// Shape of `shape` with ones prepended up to `rank`.
pub fn pad_rank(shape: &[usize], rank: usize) -> Shape {
    let mut out = vec![1; rank.saturating_sub(shape.len())];
    out.extend_from_slice(shape);
    out
}

pub fn validate_reshape(from: &[usize], to: &[usize]) -> Result<()> {
    if numel(from) != numel(to) {
        return Err(GraphError::InvalidReshape { from: from.to_vec(), to: to.to_vec() });
    }
    Ok(())
}

pub fn validate_expand(from: &[usize], to: &[usize]) -> Result<()> {
    let ok = from.len() == to.len()
        && from.iter().zip(to).all(|(&f, &t)| f == t || f == 1);
    if !ok {
        return Err(GraphError::InvalidExpand { from: from.to_vec(), to: to.to_vec() });
    }
    Ok(())
}

/// Normalizes reduction axes and returns them sorted with the output shape.
///
/// `None` reduces every axis.
pub fn reduce_shape(shape: &[usize], axes: Option<&[usize]>) -> Result<(Vec<usize>, Shape)> {
    let mut axes: Vec<usize> = match axes {
        Some(axes) => axes.to_vec(),
        None => (0..shape.len()).collect(),
    };
    if let Some(&axis) = axes.iter().find(|&&a| a >= shape.len()) {
        return Err(GraphError::InvalidAxis { axis, rank: shape.len() });
    }
    axes.sort_unstable();
    axes.dedup();

    let out = shape
        .iter()
        .enumerate()
        .filter(|(i, _)| !axes.contains(i))
        .map(|(_, &d)| d)
        .collect();
    Ok((axes, out))
}
