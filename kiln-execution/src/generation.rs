//! Reload generations
//!
//! Every bundle update mints a new generation. In-flight reload work holds
//! the token it was minted with and compares it against the shared counter
//! at each resumption point; as soon as a newer token exists the work is
//! stale and must abort without side effects. This replaces cancellation
//! primitives with a plain version comparison.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared source of reload generations.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    latest: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next generation, superseding all outstanding tokens.
    pub fn next(&self) -> GenerationToken {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationToken {
            latest: Arc::clone(&self.latest),
            generation,
        }
    }

    pub fn current(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

/// A claim on one reload generation.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    latest: Arc<AtomicU64>,
    generation: u64,
}

impl GenerationToken {
    pub fn value(&self) -> u64 {
        self.generation
    }

    /// True while no newer generation has been minted.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.generation
    }

    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }
}
