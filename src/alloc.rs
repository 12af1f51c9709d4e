//! Tree memory accounting for grovetest.
//!
//! Every group node, every test registration, and the per-run filter table is
//! charged against a [`TreeAlloc`] capability before the storage is acquired,
//! and credited back when it is released. The capability may refuse a charge,
//! which surfaces as a fatal [`AllocError`] to the caller — the tree never
//! retries or degrades.
//!
//! The capability is installed once on the tree root and inherited by every
//! descendant group, so a whole subtree always accounts through the same
//! allocator. Embedders on constrained targets can use this to cap tree
//! growth or to verify that a released tree settled every charge (see
//! [`CountingAlloc`]).
//!
//! Implement [`TreeAlloc`] to define an accounting policy.

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// A charge was refused by the installed [`TreeAlloc`].
///
/// This is fatal for the operation that needed the memory; no fallback
/// allocation path exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("allocation of {size} bytes refused by the tree allocator")]
pub struct AllocError {
    /// The refused charge, in bytes.
    pub size: usize,
}

/// An accounting policy for tree memory.
///
/// Every [`allocate`](TreeAlloc::allocate) the tree performs is later paired
/// with exactly one [`deallocate`](TreeAlloc::deallocate) of the same size
/// through the same capability.
pub trait TreeAlloc {
    /// Charge `size` bytes. Returning an error aborts the operation that
    /// needed the memory.
    fn allocate(&self, size: usize) -> Result<(), AllocError>;

    /// Credit back a charge of `size` bytes.
    fn deallocate(&self, size: usize);
}

/// The no-op policy: every charge succeeds.
///
/// This is what [`TestTree::new`](crate::TestTree::new) installs, analogous
/// to building the tree straight on the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAlloc;

impl TreeAlloc for SystemAlloc {
    fn allocate(&self, _: usize) -> Result<(), AllocError> {
        Ok(())
    }

    fn deallocate(&self, _: usize) {}
}

/// A policy that tracks live blocks and live bytes, with an optional cap.
///
/// After a tree built on this policy is fully released, both counters must
/// read zero; anything else means a leaked node. With a cap installed,
/// charges that would push the live byte count past the cap are refused,
/// which exercises the fatal allocation path.
#[derive(Debug, Default)]
pub struct CountingAlloc {
    blocks: AtomicUsize,
    bytes: AtomicUsize,
    cap: Option<usize>,
}

impl CountingAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse charges once live bytes would exceed `cap`.
    pub fn with_cap(self, cap: usize) -> Self {
        Self {
            cap: Some(cap),
            ..self
        }
    }

    /// Number of charges not yet credited back.
    pub fn live_blocks(&self) -> usize {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Sum of charged bytes not yet credited back.
    pub fn live_bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl TreeAlloc for CountingAlloc {
    fn allocate(&self, size: usize) -> Result<(), AllocError> {
        let live = self.bytes.load(Ordering::Relaxed);
        if let Some(cap) = self.cap
            && live + size > cap
        {
            return Err(AllocError { size });
        }
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    fn deallocate(&self, size: usize) {
        self.blocks.fetch_sub(1, Ordering::Relaxed);
        self.bytes.fetch_sub(size, Ordering::Relaxed);
    }
}
