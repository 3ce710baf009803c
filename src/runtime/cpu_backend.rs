//! Backend that executes UOps on the CPU with `ndarray`.
//!
//! Every op works on whole arrays. Binary operands always arrive with equal
//! shapes because broadcasting is expressed in the graph as `Reshape` and
//! `Expand` nodes. Integer arithmetic wraps like 32-bit machine integers.

use super::backend::{Backend, RuntimeError};
use crate::buffer::Storage;
use crate::device::Device;
use crate::dtype::DType;
use crate::uop::{BinaryOp, Op, UnaryOp};
use ndarray::{ArrayD, Axis, Zip};

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for CpuBackend {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn priority(&self) -> u8 {
        1
    }

    fn execute(
        &self,
        op: &Op,
        dtype: DType,
        shape: &[usize],
        inputs: &[&Storage],
    ) -> Result<Storage, RuntimeError> {
        match op {
            Op::Const(value) => Ok(Storage::from_const(*value, dtype)),
            Op::Reshape => unary_input(op, inputs)?.reshape(shape),
            Op::Expand => unary_input(op, inputs)?.expand(shape),
            Op::Cast => Ok(unary_input(op, inputs)?.cast(dtype)),
            Op::Unary(unary) => op_unary(*unary, unary_input(op, inputs)?),
            Op::Binary(binary) => match inputs {
                [lhs, rhs] => op_binary(*binary, lhs, rhs),
                _ => Err(arity_error(op, 2, inputs.len())),
            },
            Op::ReduceSum(axes) => op_reduce_sum(unary_input(op, inputs)?, axes),
            Op::Buffer(_) | Op::Copy => Err(RuntimeError::UnimplementedOperation(format!(
                "{} is handled by the realizer",
                op
            ))),
        }
    }
}

fn unary_input<'a>(op: &Op, inputs: &[&'a Storage]) -> Result<&'a Storage, RuntimeError> {
    match inputs {
        [input] => Ok(*input),
        _ => Err(arity_error(op, 1, inputs.len())),
    }
}

fn arity_error(op: &Op, expected: usize, actual: usize) -> RuntimeError {
    RuntimeError::TypeError {
        expected: format!("{} operand(s) for {}", expected, op),
        actual: format!("{} operand(s)", actual),
    }
}

fn type_error(expected: &str, actual: &Storage) -> RuntimeError {
    RuntimeError::TypeError {
        expected: expected.to_string(),
        actual: actual.dtype().to_string(),
    }
}

fn op_unary(op: UnaryOp, operand: &Storage) -> Result<Storage, RuntimeError> {
    match (op, operand) {
        (UnaryOp::Neg, Storage::Bool(a)) => Ok(Storage::Bool(a.mapv(|x| !x))),
        (UnaryOp::Neg, Storage::Int32(a)) => Ok(Storage::Int32(a.mapv(i32::wrapping_neg))),
        (UnaryOp::Neg, Storage::Float32(a)) => Ok(Storage::Float32(a.mapv(|x| -x))),
        (UnaryOp::Sqrt, Storage::Float32(a)) => Ok(Storage::Float32(a.mapv(f32::sqrt))),
        (UnaryOp::Exp, Storage::Float32(a)) => Ok(Storage::Float32(a.mapv(f32::exp))),
        (UnaryOp::Log, Storage::Float32(a)) => Ok(Storage::Float32(a.mapv(f32::ln))),
        (_, other) => Err(type_error("dtypes.float", other)),
    }
}

fn zip_with<A, B, F>(a: &ArrayD<A>, b: &ArrayD<A>, f: F) -> Result<ArrayD<B>, RuntimeError>
where
    A: Copy,
    F: Fn(A, A) -> B,
{
    if a.shape() != b.shape() {
        return Err(RuntimeError::ShapeError(format!(
            "elementwise operands differ in shape: {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    Ok(Zip::from(a).and(b).map_collect(|&x, &y| f(x, y)))
}

fn op_binary(op: BinaryOp, lhs: &Storage, rhs: &Storage) -> Result<Storage, RuntimeError> {
    match (lhs, rhs) {
        (Storage::Float32(a), Storage::Float32(b)) => op_binary_float(op, a, b),
        (Storage::Int32(a), Storage::Int32(b)) => op_binary_int(op, a, b),
        (Storage::Bool(a), Storage::Bool(b)) => op_binary_bool(op, a, b),
        _ => Err(RuntimeError::TypeError {
            expected: format!("matching operand dtypes, lhs is {}", lhs.dtype()),
            actual: rhs.dtype().to_string(),
        }),
    }
}

fn op_binary_float(op: BinaryOp, a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<Storage, RuntimeError> {
    let out = match op {
        BinaryOp::Add => Storage::Float32(zip_with(a, b, |x, y| x + y)?),
        BinaryOp::Sub => Storage::Float32(zip_with(a, b, |x, y| x - y)?),
        BinaryOp::Mul => Storage::Float32(zip_with(a, b, |x, y| x * y)?),
        BinaryOp::Div => Storage::Float32(zip_with(a, b, |x, y| x / y)?),
        BinaryOp::Max => Storage::Float32(zip_with(a, b, f32::max)?),
        BinaryOp::CmpLt => Storage::Bool(zip_with(a, b, |x, y| x < y)?),
        BinaryOp::CmpEq => Storage::Bool(zip_with(a, b, |x, y| x == y)?),
    };
    Ok(out)
}

fn op_binary_int(op: BinaryOp, a: &ArrayD<i32>, b: &ArrayD<i32>) -> Result<Storage, RuntimeError> {
    let out = match op {
        BinaryOp::Add => Storage::Int32(zip_with(a, b, i32::wrapping_add)?),
        BinaryOp::Sub => Storage::Int32(zip_with(a, b, i32::wrapping_sub)?),
        BinaryOp::Mul => Storage::Int32(zip_with(a, b, i32::wrapping_mul)?),
        BinaryOp::Max => Storage::Int32(zip_with(a, b, |x, y| x.max(y))?),
        BinaryOp::CmpLt => Storage::Bool(zip_with(a, b, |x, y| x < y)?),
        BinaryOp::CmpEq => Storage::Bool(zip_with(a, b, |x, y| x == y)?),
        // Tensor division always promotes to float before reaching a kernel.
        BinaryOp::Div => {
            return Err(RuntimeError::UnimplementedOperation(
                "integer DIV, cast operands to dtypes.float".to_string(),
            ))
        }
    };
    Ok(out)
}

fn op_binary_bool(op: BinaryOp, a: &ArrayD<bool>, b: &ArrayD<bool>) -> Result<Storage, RuntimeError> {
    let out = match op {
        BinaryOp::Add | BinaryOp::Max => zip_with(a, b, |x, y| x || y)?,
        BinaryOp::Mul => zip_with(a, b, |x, y| x && y)?,
        BinaryOp::Sub => zip_with(a, b, |x, y| x != y)?,
        BinaryOp::CmpLt => zip_with(a, b, |x, y| !x && y)?,
        BinaryOp::CmpEq => zip_with(a, b, |x, y| x == y)?,
        BinaryOp::Div => {
            return Err(RuntimeError::UnimplementedOperation("boolean DIV".to_string()))
        }
    };
    Ok(Storage::Bool(out))
}

fn op_reduce_sum(operand: &Storage, axes: &[usize]) -> Result<Storage, RuntimeError> {
    if let Some(&axis) = axes.iter().find(|&&a| a >= operand.shape().len()) {
        return Err(RuntimeError::ShapeError(format!(
            "reduce axis {} out of range for shape {:?}",
            axis,
            operand.shape()
        )));
    }
    // Highest axis first so the remaining indices stay valid.
    let mut axes = axes.to_vec();
    axes.sort_unstable_by(|a, b| b.cmp(a));
    match operand {
        Storage::Int32(a) => {
            let mut acc = a.clone();
            for &axis in &axes {
                acc = acc.fold_axis(Axis(axis), 0i32, |s, &x| s.wrapping_add(x));
            }
            Ok(Storage::Int32(acc))
        }
        Storage::Float32(a) => {
            let mut acc = a.clone();
            for &axis in &axes {
                acc = acc.sum_axis(Axis(axis));
            }
            Ok(Storage::Float32(acc))
        }
        other => Err(type_error("dtypes.int or dtypes.float", other)),
    }
}
