//! An embeddable grouped test framework with metered allocation.
//!
//! Callers build a [`TestTree`] of named groups and tests, optionally attach
//! per-group setup/teardown fixtures, then hand the tree to a [`Runner`] to
//! execute a filtered subset depth-first and collect a [`RunSummary`]. All
//! tree memory is accounted through a caller-supplied
//! [`TreeAlloc`](alloc::TreeAlloc) capability, so constrained embedders can
//! meter or cap it.

pub mod alloc;
pub mod check;
pub mod filter;

mod tree;
pub use tree::*;

mod runner;
pub use runner::*;

mod report;
pub use report::*;
