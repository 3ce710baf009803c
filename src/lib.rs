//! # lazygrad: a lazy tensor library built on a UOp graph
//!
//! Tensors in **lazygrad** hold no data. Each operation appends a node (a
//! *UOp*) to a hash-consed graph, so two identical computations end up as the
//! same node. Nothing runs until a tensor is realized: the pending graph is
//! scheduled, executed on a backend, and the target node is rewritten in place
//! into a `BUFFER`. Every tensor that shares the node sees the result.
//!
//! ## Usage Example
//!
//! ```
//! use lazygrad::{GraphContext, Tensor};
//!
//! let context = GraphContext::shared();
//! let t = Tensor::new(&context, &[1, 2, 3, 4]);
//!
//! // Lazy: only graph nodes so far.
//! let doubled = &t * 2;
//! assert!(!doubled.is_realized());
//!
//! // Identical computations share one node.
//! assert_eq!((&t * 4).uop(), (&t * 4).uop());
//!
//! assert_eq!(doubled.to_vec::<i32>().unwrap(), vec![2, 4, 6, 8]);
//! assert!(doubled.is_realized());
//! ```

pub mod analysis;
pub mod buffer;
pub mod config;
pub mod device;
pub mod dtype;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod serialization;
pub mod tensor;
pub mod uop;

pub use config::Config;
pub use device::Device;
pub use dtype::DType;
pub use error::{Error, Result};
pub use tensor::{GraphContext, Tensor};
