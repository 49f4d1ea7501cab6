/// Lock-free floating point accumulation
///
/// There is no native atomic add for `f32`, so the value is stored as its raw
/// bit pattern inside an `AtomicU32` and updated with a compare-and-swap loop:
/// - Read the current bits and reinterpret them as a float
/// - Compute the proposed sum
/// - Swap the old bit pattern for the new one, only if nobody changed it meanwhile
/// - On failure, retry with the freshly observed bits
///
/// Comparing bit patterns (not float values) keeps NaN and -0.0 well behaved:
/// a NaN never compares equal to itself, its bits always do.
///
/// The retry count is unbounded. Under extreme contention a lane can starve,
/// but the final sum is never corrupted and no update is ever lost.

use std::sync::atomic::{AtomicU32, Ordering};

/// A 32-bit float with atomic load, store and add
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub const fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    pub fn store(&self, value: f32, order: Ordering) {
        self.0.store(value.to_bits(), order)
    }

    /// Atomically replace the value with `old + delta`
    /// Returns the value observed right before the successful swap
    pub fn fetch_add(&self, delta: f32) -> f32 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(previous) => return f32::from_bits(previous),
                Err(observed) => current = observed,
            }
        }
    }

    pub fn into_inner(self) -> f32 {
        f32::from_bits(self.0.into_inner())
    }
}

impl From<f32> for AtomicF32 {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}
