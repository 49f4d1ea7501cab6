// Element-wise utility kernels: one lane per element, no scratch, no barriers.
// The only shared-location writer is `CombineColumns`, which goes through the
// atomic accumulator.

use crate::core::DeviceBuffer;
use crate::device::{Dims, Kernel, WorkItem};

use super::activation::Activation;

/// buffer[i] = biases[i + offset]
pub struct SetBiases<'a> {
    pub buffer: &'a DeviceBuffer,
    pub biases: &'a DeviceBuffer,
    pub offset: usize,
}

impl SetBiases<'_> {
    pub fn grid(&self) -> Dims {
        Dims::one(self.buffer.len())
    }
}

impl Kernel for SetBiases<'_> {
    fn name(&self) -> &'static str {
        "set_biases"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let i = item.global_id().x;
        self.buffer.set(i, self.biases.get(i + self.offset));
    }
}

/// target[i] = first[i] * second[i]
/// `target` may be the same buffer as `first` for an in-place multiply
pub struct Multiply<'a> {
    pub first: &'a DeviceBuffer,
    pub second: &'a DeviceBuffer,
    pub target: &'a DeviceBuffer,
}

impl Multiply<'_> {
    pub fn grid(&self) -> Dims {
        Dims::one(self.first.len())
    }
}

impl Kernel for Multiply<'_> {
    fn name(&self) -> &'static str {
        "multiply"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let i = item.global_id().x;
        self.target.set(i, self.first.get(i) * self.second.get(i));
    }
}

/// target[i] = first[i] * scalar
pub struct MultiplySingle<'a> {
    pub first: &'a DeviceBuffer,
    pub scalar: f32,
    pub target: &'a DeviceBuffer,
}

impl MultiplySingle<'_> {
    pub fn grid(&self) -> Dims {
        Dims::one(self.first.len())
    }
}

impl Kernel for MultiplySingle<'_> {
    fn name(&self) -> &'static str {
        "multiply_single"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let i = item.global_id().x;
        self.target.set(i, self.first.get(i) * self.scalar);
    }
}

/// Scaled accumulate: first[i] += second[i] * mult
pub struct MultSecondAndAdd<'a> {
    pub first: &'a DeviceBuffer,
    pub second: &'a DeviceBuffer,
    pub mult: f32,
}

impl MultSecondAndAdd<'_> {
    pub fn grid(&self) -> Dims {
        Dims::one(self.first.len())
    }
}

impl Kernel for MultSecondAndAdd<'_> {
    fn name(&self) -> &'static str {
        "mult_second_and_add"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let i = item.global_id().x;
        self.first
            .set(i, self.first.get(i) + self.second.get(i) * self.mult);
    }
}

/// top[i] = top[i] / bottom
pub struct ListDivide<'a> {
    pub top: &'a DeviceBuffer,
    pub bottom: f32,
}

impl ListDivide<'_> {
    pub fn grid(&self) -> Dims {
        Dims::one(self.top.len())
    }
}

impl Kernel for ListDivide<'_> {
    fn name(&self) -> &'static str {
        "list_divide_inplace"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let i = item.global_id().x;
        self.top.set(i, self.top.get(i) / self.bottom);
    }
}

/// Sum the rows of a row-major `y_len` × `x_len` matrix into a vector:
///   out[x] += matrix[x_len * y + x]   for every y
/// 2D grid (x_len, y_len). Every lane of a column hits the same out[x], so the
/// accumulation is atomic. `out` is not cleared first.
pub struct CombineColumns<'a> {
    pub matrix: &'a DeviceBuffer,
    pub out: &'a DeviceBuffer,
    pub x_len: usize,
}

impl CombineColumns<'_> {
    pub fn grid(&self) -> Dims {
        Dims::two(self.x_len, self.matrix.len() / self.x_len.max(1))
    }
}

impl Kernel for CombineColumns<'_> {
    fn name(&self) -> &'static str {
        "flat_combine_matrix"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let id = item.global_id();
        self.out
            .atomic_add(id.x, self.matrix.get(self.x_len * id.y + id.x));
    }
}

/// target[i] = activate(values[i])
pub struct Activate<'a> {
    pub values: &'a DeviceBuffer,
    pub target: &'a DeviceBuffer,
    pub activation: Activation,
}

impl Activate<'_> {
    pub fn grid(&self) -> Dims {
        Dims::one(self.values.len())
    }
}

impl Kernel for Activate<'_> {
    fn name(&self) -> &'static str {
        "activation"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let i = item.global_id().x;
        self.target.set(i, self.activation.activate(self.values.get(i)));
    }
}
