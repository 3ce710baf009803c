//! Execution of UOp graphs.
//!
//! - [`backend`]: the `Backend` trait every device implements, and `RuntimeError`.
//! - [`cpu_backend`]: `ndarray` kernels for the CPU device.
//! - [`realize`]: the `Realizer`, which schedules pending nodes, runs them and
//!   rewrites the requested ones into buffers.

pub mod backend;
pub mod cpu_backend;
pub mod realize;
