/// Deterministic pseudo-random buffer fill
///
/// Each element draws from its own 48-bit linear congruential step, seeded from the
/// caller's seed and the element index:
///   state  = seed + i * 0xFF9D2D
///   result = ((state * 0x5DEECE66D + 0xB) mod 2^48) >> 16      (32 bits)
///   value  = (result / (2^32 - 1) * 2 - 1) / div
///
/// Values land in [-1/div, 1/div]. Bigger layers want a bigger `div`.
/// No entropy source is involved: the same (seed, index, div) always yields the
/// same bits. All integer arithmetic wraps at 64 bits.
///
/// `i * 0xFF9D2D` is a 64-bit product. A 32-bit signed product overflows from
/// index 129 on and would sign-extend into the state, so streams from such an
/// implementation agree with this one only for the first 129 elements.

use crate::core::DeviceBuffer;
use crate::device::{Dims, Kernel, WorkItem};

const INDEX_STRIDE: u64 = 0xFF9D2D;
const LCG_MULTIPLIER: u64 = 0x5DEECE66D;
const LCG_INCREMENT: u64 = 0xB;
const LCG_MASK: u64 = (1 << 48) - 1;

/// The value element `index` receives for a given seed and divisor
pub fn random_value(seed: u64, index: u64, div: f32) -> f32 {
    let state = seed.wrapping_add(index.wrapping_mul(INDEX_STRIDE));
    let result = (state.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT) & LCG_MASK) >> 16;
    let unit = result as f32 / 4_294_967_295.0;
    (unit * 2.0 - 1.0) / div
}

pub struct RandomFill<'a> {
    pub buffer: &'a DeviceBuffer,
    pub seed: u64,
    pub div: f32,
}

impl RandomFill<'_> {
    pub fn grid(&self) -> Dims {
        Dims::one(self.buffer.len())
    }
}

impl Kernel for RandomFill<'_> {
    fn name(&self) -> &'static str {
        "random_buf"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let i = item.global_id().x;
        self.buffer.set(i, random_value(self.seed, i as u64, self.div));
    }
}
