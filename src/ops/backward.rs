/// Dense layer backward pass
///
/// Inputs: the layer's pre-activation output, the upstream sensitivity
/// (dLoss/d activated output) for each output neuron, and the layer's weights.
///
/// Per lane (x = output index, y = input index):
///   g = derivative(pre_activation[x]) * sensitivity[x]
///   weight_mods[I*x + y] -= learn_rate * input[y] * g
///   bias_mods[x]         -= learn_rate * g              (lanes with y == 0 only)
///   gradients_out[y]     += weight[I*x + y] * g         (summed over every x)
///
/// Weight and bias mods have exactly one writer per index per launch, so they are
/// plain read-modify-writes. They are only ever decremented: clearing them between
/// batches is up to the caller.
///
/// The propagated sensitivity is the forward reduction transposed: the sum runs
/// over x for a fixed y. Products go to scratch[local_y][local_x], and after the
/// barrier the lane with local_x == 0 sums its scratch ROW and issues a single
/// atomic add per input neuron per group.

use crate::core::{BatchOffsets, DeviceBuffer, LayerLayout};
use crate::device::{Dims, Fence, Kernel, SCRATCH_DIM, WorkItem};

use super::activation::Activation;

pub struct BackwardKernel<'a> {
    pub layout: LayerLayout,
    pub activation: Activation,
    pub batch: BatchOffsets,
    pub learn_rate: f32,
    pub inputs: &'a DeviceBuffer,
    pub layer_output: &'a DeviceBuffer,
    pub sensitivities: &'a DeviceBuffer,
    pub weights: &'a DeviceBuffer,
    pub weight_mods: &'a DeviceBuffer,
    pub bias_mods: &'a DeviceBuffer,
    pub gradients_out: &'a DeviceBuffer,
}

impl BackwardKernel<'_> {
    pub fn grid(&self) -> Dims {
        self.layout.grid()
    }
}

impl Kernel for BackwardKernel<'_> {
    fn name(&self) -> &'static str {
        "backward"
    }

    fn scratch_capacity(&self) -> Option<Dims> {
        Some(Dims::two(SCRATCH_DIM, SCRATCH_DIM))
    }

    fn cooperative(&self, _stage: usize) -> bool {
        true
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let id = item.global_id();
        let (x, y) = (id.x, id.y);
        let local = item.local_id();
        let scratch = item.scratch();

        let out_index = self.batch.output_index(x);
        let in_index = self.batch.input_index(y);
        let weight_index = self.layout.weight_index(x, y);

        let gradient = self.activation.derivative(self.layer_output.get(out_index))
            * self.sensitivities.get(out_index);

        let weight_mod = self.weight_mods.get(weight_index);
        self.weight_mods.set(
            weight_index,
            weight_mod - self.learn_rate * self.inputs.get(in_index) * gradient,
        );

        if y == 0 {
            let bias_index = self.layout.bias_index(x);
            let bias_mod = self.bias_mods.get(bias_index);
            self.bias_mods.set(bias_index, bias_mod - self.learn_rate * gradient);
        }

        scratch.set(local.y, local.x, self.weights.get(weight_index) * gradient);

        item.barrier(Fence::Local);

        if local.x == 0 {
            let mut sum = 0.0;
            for col in 0..item.local_size().x {
                sum += scratch.get(local.y, col);
            }
            self.gradients_out.atomic_add(in_index, sum);
        }
    }
}
