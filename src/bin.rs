//! The fragment bin: the unit handed from the vertex stage to the fragment stage, and the
//! shared, per-producer-partitioned array that holds them plus the atomics that drive the drain
//! protocol.
//!
//! Grounded on `SR_ShaderUtil.hpp`'s `SR_FragmentBin` (screen coords + barycentric coefficients
//! + varyings, `alignas(sizeof(vec4))`) and `SR_ProcessorPool.hpp`'s `mBinsReady`/`mBinsUsed`
//! atomic fields, generalized from raw `std::atomic<int32_t>` arrays to `crossbeam_utils`'
//! `CachePadded` wrappers — euc's own dependency for this exact purpose
//! (`src/buffer/cached.rs` uses `CachePadded` to keep per-thread counters from false-sharing).

use core::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, Ordering};
use crossbeam_utils::CachePadded;

use crate::math::{PlaneEq, Vec4};
use crate::shader::MAX_VARYINGS;

/// Slots preallocated per producer thread; mirrors `SR_SHADER_MAX_BINNED_PRIMS`.
pub const MAX_BINNED_PRIMS: usize = 1024;

/// One triangle (or degenerate line/point, stored in its first two/one slots) ready for the
/// fragment stage: three screen-space positions `(x, y, z/w, 1/w)`, three precomputed
/// barycentric plane equations, and up to `3 * MAX_VARYINGS` varying vectors.
#[derive(Clone)]
pub struct FragmentBin {
    pub screen: [[f32; 4]; 3],
    pub planes: [PlaneEq; 3],
    pub varyings: [[Vec4<f32>; MAX_VARYINGS]; 3],
    pub num_varyings: u8,
    pub num_verts: u8,
}

impl FragmentBin {
    pub fn empty() -> Self {
        Self {
            screen: [[0.0; 4]; 3],
            planes: [PlaneEq::default(); 3],
            varyings: [[Vec4::zero(); MAX_VARYINGS]; 3],
            num_varyings: 0,
            num_verts: 0,
        }
    }
}

/// One producer's readiness/usage counters, cache-line padded so neighboring producers never
/// false-share a line while spinning on each other's state.
pub struct ProducerState {
    pub bins_used: CachePadded<AtomicU32>,
    pub bins_ready: CachePadded<AtomicI32>,
}

impl ProducerState {
    fn new() -> Self {
        Self {
            bins_used: CachePadded::new(AtomicU32::new(0)),
            bins_ready: CachePadded::new(AtomicI32::new(-1)),
        }
    }
}

/// The shared bin array plus the drain-protocol atomics, sized once for `n_threads` and reused
/// across every draw without reallocation (a fixed per-producer bin capacity).
pub struct BinStore {
    n_threads: usize,
    bins: Vec<FragmentBin>,
    producers: Vec<ProducerState>,
    pub frag_semaphore: AtomicU64,
    pub busy_semaphore: AtomicI64,
}

impl BinStore {
    pub fn new(n_threads: usize) -> Self {
        debug_assert!(n_threads > 0);
        Self {
            n_threads,
            bins: (0..n_threads * MAX_BINNED_PRIMS).map(|_| FragmentBin::empty()).collect(),
            producers: (0..n_threads).map(|_| ProducerState::new()).collect(),
            frag_semaphore: AtomicU64::new(0),
            busy_semaphore: AtomicI64::new(n_threads as i64),
        }
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    #[inline]
    fn base(&self, producer: usize) -> usize {
        producer * MAX_BINNED_PRIMS
    }

    /// Claim the next slot for `producer`, writing `bin` into it. Returns `false` (without
    /// writing) if the ring is already full; the caller must `flush_bins` before retrying.
    pub fn try_push(&mut self, producer: usize, bin: FragmentBin) -> bool {
        let used = self.producers[producer].bins_used.load(Ordering::Relaxed) as usize;
        if used >= MAX_BINNED_PRIMS {
            return false;
        }
        self.bins[self.base(producer) + used] = bin;
        self.producers[producer].bins_used.store((used + 1) as u32, Ordering::Relaxed);
        true
    }

    pub fn used(&self, producer: usize) -> usize {
        self.producers[producer].bins_used.load(Ordering::Acquire) as usize
    }

    pub fn bins_of(&self, producer: usize) -> &[FragmentBin] {
        &self.bins[self.base(producer)..self.base(producer) + self.used(producer)]
    }

    pub fn set_ready(&self, producer: usize, tile: i32) {
        self.producers[producer].bins_ready.store(tile, Ordering::Release);
    }

    pub fn ready(&self, producer: usize) -> i32 {
        self.producers[producer].bins_ready.load(Ordering::Acquire)
    }

    /// Reset every producer's counters for the next `flush_bins` round. Called once, by the
    /// last thread to cross the `2n - 1` boundary of `frag_semaphore` (step 5 of §4.6).
    pub fn reset_all(&self) {
        for p in &self.producers {
            p.bins_ready.store(-1, Ordering::Release);
            p.bins_used.store(0, Ordering::Release);
        }
    }

    pub fn reset_busy(&self) {
        self.busy_semaphore.store(self.n_threads as i64, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_push_respects_ring_capacity() {
        let mut store = BinStore::new(2);
        for _ in 0..MAX_BINNED_PRIMS {
            assert!(store.try_push(0, FragmentBin::empty()));
        }
        assert!(!store.try_push(0, FragmentBin::empty()));
        assert_eq!(store.used(0), MAX_BINNED_PRIMS);
        assert_eq!(store.used(1), 0);
    }

    #[test]
    fn reset_all_clears_ready_and_used() {
        let store = BinStore::new(3);
        store.set_ready(1, 7);
        store.reset_all();
        assert_eq!(store.ready(0), -1);
        assert_eq!(store.ready(1), -1);
        assert_eq!(store.used(2), 0);
    }
}
