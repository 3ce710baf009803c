//! Crate-level error type returned by the `Tensor` API.

use crate::config::ConfigError;
use crate::dtype::DType;
use crate::runtime::backend::RuntimeError;
use crate::serialization::SerializationError;
use crate::uop::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("Requested elements of {requested}, but the tensor holds {actual}. Read it with the matching element type or cast() it first.")]
    DTypeMismatch { requested: DType, actual: DType },

    #[error("item() needs exactly one element, the tensor has {0}. Use to_vec() or reduce it with sum() first.")]
    NotScalar(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
