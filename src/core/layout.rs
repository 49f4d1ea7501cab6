/// Addressing for layers stored in flat buffers
///
/// All of a network's weights can live in one flat buffer, layer after layer.
/// For a layer with `input_len` I and `output_len` O, the weight connecting input
/// neuron `y` to output neuron `x` lives at:
///
///   weights_offset + I * x + y
///
/// which maps the (x, y) grid bijectively onto a contiguous I×O block.
/// Biases follow the same idea with one entry per output neuron.
///
/// Every kernel goes through these helpers instead of repeating the formula.

use crate::device::Dims;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerLayout {
    pub input_len: usize,
    pub output_len: usize,
    pub weights_offset: usize,
    pub biases_offset: usize,
}

impl LayerLayout {
    /// Layout of a layer that owns its weight and bias buffers (no base offsets)
    pub fn new(input_len: usize, output_len: usize) -> Self {
        Self {
            input_len,
            output_len,
            weights_offset: 0,
            biases_offset: 0,
        }
    }

    pub fn with_offsets(mut self, weights_offset: usize, biases_offset: usize) -> Self {
        self.weights_offset = weights_offset;
        self.biases_offset = biases_offset;
        self
    }

    /// Layouts for consecutive layers sharing one weight buffer and one bias buffer
    pub fn stacked(input_len: usize, sizes: &[usize]) -> Vec<Self> {
        let mut layouts = Vec::with_capacity(sizes.len());
        let mut in_len = input_len;
        let mut weights_offset = 0;
        let mut biases_offset = 0;
        for &size in sizes {
            let layout = Self::new(in_len, size).with_offsets(weights_offset, biases_offset);
            weights_offset += layout.weight_count();
            biases_offset += size;
            in_len = size;
            layouts.push(layout);
        }
        layouts
    }

    #[inline]
    pub fn weight_index(&self, x: usize, y: usize) -> usize {
        self.input_len * x + y + self.weights_offset
    }

    #[inline]
    pub fn bias_index(&self, x: usize) -> usize {
        x + self.biases_offset
    }

    pub fn weight_count(&self) -> usize {
        self.input_len * self.output_len
    }

    /// Launch grid for the layer kernels: x over outputs, y over inputs
    pub fn grid(&self) -> Dims {
        Dims::two(self.output_len, self.input_len)
    }
}

/// Shift selecting one sample's slice inside buffers shared by a whole batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOffsets {
    pub input: usize,
    pub output: usize,
}

impl BatchOffsets {
    pub fn new(input: usize, output: usize) -> Self {
        Self { input, output }
    }

    /// Offsets of sample `sample` when samples are packed back to back
    pub fn for_sample(layout: &LayerLayout, sample: usize) -> Self {
        Self {
            input: sample * layout.input_len,
            output: sample * layout.output_len,
        }
    }

    #[inline]
    pub fn input_index(&self, y: usize) -> usize {
        y + self.input
    }

    #[inline]
    pub fn output_index(&self, x: usize) -> usize {
        x + self.output
    }
}
