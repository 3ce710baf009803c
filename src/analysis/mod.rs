//! # Graph Analysis Module
//!
//! Passes that reason about the UOp graph without executing it.
//!
//! ## Available Passes
//!
//! - [`shape`]: broadcasting, reshape, expand and reduction rules. Tensor
//!   construction calls these eagerly so that every node has a known shape.
//! - [`schedule`]: collects the pending nodes behind a set of targets and orders
//!   them for execution.
//!
//! ```text
//! Tensor ops -> shape rules -> interned UOps -> schedule -> Realizer
//! ```

pub mod schedule;
pub mod shape;
