//! Abstract interface of execution backends and the errors they share.

use crate::buffer::{BufferId, Storage};
use crate::device::Device;
use crate::dtype::DType;
use crate::uop::{GraphError, Op, UOpId};
use thiserror::Error;

/// Errors raised while realizing a graph. Shared by every backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Buffer {0} not found. It was never allocated by this context.")]
    BufferNotFound(BufferId),

    #[error("UOp {0} is not realized, it has no buffer to read. Call realize() on the tensor first.")]
    NotRealized(UOpId),

    #[error("No backend is registered for device {0}. Register one in the DeviceRegistry or move the tensor to a compute device with .to().")]
    NoBackend(Device),

    #[error("Type mismatch: operation expected {expected}, got {actual}. Check the dtypes of the operands.")]
    TypeError { expected: String, actual: String },

    #[error("Tensor shape error: {0}. Check the dimensions of the input tensors.")]
    ShapeError(String),

    #[error("Operation '{0}' is not implemented in this backend. Cast the operands to a supported dtype or implement the operation.")]
    UnimplementedOperation(String),
}

/// Executes single operations on one device.
///
/// The realizer hands every scheduled node except copies to the backend of the
/// node's device, with the operands already evaluated. Target `dtype` and
/// `shape` are those of the node.
pub trait Backend: std::fmt::Debug {
    fn device(&self) -> Device;

    /// Preference when resolving the default device; higher wins.
    fn priority(&self) -> u8 {
        0
    }

    fn execute(
        &self,
        op: &Op,
        dtype: DType,
        shape: &[usize],
        inputs: &[&Storage],
    ) -> Result<Storage, RuntimeError>;
}
