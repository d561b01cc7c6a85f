//! Upstream pool management.
//!
//! # Responsibilities
//! - Hold the ordered set of backends and the rotation cursor
//! - Select the next backend with strict round-robin fairness
//! - Swap membership atomically when discovery updates it
//!
//! # Design Decisions
//! - One process-wide atomic cursor: a single fetch_add per selection,
//!   fairness is exact across all workers
//! - Membership lives behind arc-swap; a swap affects subsequent
//!   selections only, in-flight requests keep their chosen backend

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::upstream::backend::Backend;

/// The upstream pool: rotation order plus cursor.
///
/// Across any N consecutive `select` calls with pool size k, each backend
/// is chosen ⌊N/k⌋ or ⌈N/k⌉ times, and no backend is chosen twice before
/// all others have been chosen once within a cycle.
#[derive(Debug)]
pub struct UpstreamPool {
    /// Rotation sequence. Backends with weight w appear w times.
    rotation: ArcSwap<Vec<Arc<Backend>>>,
    /// Rotation cursor, advanced by one per selection.
    cursor: AtomicUsize,
}

impl UpstreamPool {
    /// Create a pool from an ordered list of backends.
    pub fn new(backends: Vec<Backend>) -> Self {
        Self {
            rotation: ArcSwap::from_pointee(Self::expand(backends)),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Build the rotation sequence, repeating each backend `weight` times.
    fn expand(backends: Vec<Backend>) -> Vec<Arc<Backend>> {
        let mut rotation = Vec::new();
        for backend in backends {
            let backend = Arc::new(backend);
            for _ in 0..backend.weight.max(1) {
                rotation.push(backend.clone());
            }
        }
        rotation
    }

    /// Select the next backend in rotation.
    ///
    /// Returns `None` only when the pool is empty, which startup
    /// validation prevents for the initial membership.
    pub fn select(&self) -> Option<Arc<Backend>> {
        let rotation = self.rotation.load();
        if rotation.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % rotation.len();
        Some(rotation[index].clone())
    }

    /// Append a backend to the rotation. Takes effect for subsequent
    /// selections; in-flight requests are unaffected.
    pub fn register(&self, backend: Backend) {
        let backend = Arc::new(backend);
        self.rotation.rcu(|current| {
            let mut rotation = (**current).clone();
            for _ in 0..backend.weight.max(1) {
                rotation.push(backend.clone());
            }
            rotation
        });
    }

    /// Replace pool membership. Takes effect for subsequent selections.
    pub fn replace(&self, backends: Vec<Backend>) {
        let rotation = Self::expand(backends);
        tracing::info!(backends = rotation.len(), "Upstream pool membership updated");
        self.rotation.store(Arc::new(rotation));
    }

    /// Number of slots in the rotation sequence.
    pub fn len(&self) -> usize {
        self.rotation.load().len()
    }

    /// True when no backends are registered.
    pub fn is_empty(&self) -> bool {
        self.rotation.load().is_empty()
    }
}
