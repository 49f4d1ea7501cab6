/// Dense layer forward pass
///
/// For every output neuron x:
///   output[x]           = sum_y(input[y] * weight[I*x + y]) + bias[x]
///   activated_output[x] = activate(output[x])
///
/// Launch grid: O×I, one lane per (x, y) pair, so O·I lanes all feed only O sums.
/// To keep contention on those sums low, the reduction has two levels:
/// 1. Each lane stores its product in scratch[local_y][local_x]
/// 2. Local barrier
/// 3. The lane with local_y == 0 sums its scratch column and does ONE atomic add
///    into output[x]: O·I contended adds become O·(groups along I)
/// 4. The lane with global y == 0 atomically adds the bias
/// 5. Global barrier, then every lane writes the activated output of its neuron.
///    Several lanes write the same value, which is harmless since activation is pure.
///
/// Step 5 runs as a second stage so the sum is complete across ALL groups
/// sharing the neuron, not only the lane's own group. That stage never touches
/// the barrier, so its lanes run without a thread each.
///
/// `output` is an accumulator: it must be zeroed before the launch.

use crate::core::{BatchOffsets, DeviceBuffer, LayerLayout};
use crate::device::{Dims, Fence, Kernel, SCRATCH_DIM, WorkItem};

use super::activation::Activation;

pub struct ForwardKernel<'a> {
    pub layout: LayerLayout,
    pub activation: Activation,
    pub batch: BatchOffsets,
    pub weights: &'a DeviceBuffer,
    pub biases: &'a DeviceBuffer,
    pub input: &'a DeviceBuffer,
    pub output: &'a DeviceBuffer,
    pub activated_output: &'a DeviceBuffer,
}

impl ForwardKernel<'_> {
    pub fn grid(&self) -> Dims {
        self.layout.grid()
    }
}

impl Kernel for ForwardKernel<'_> {
    fn name(&self) -> &'static str {
        "forward"
    }

    fn scratch_capacity(&self) -> Option<Dims> {
        Some(Dims::two(SCRATCH_DIM, SCRATCH_DIM))
    }

    fn cooperative(&self, stage: usize) -> bool {
        stage == 0
    }

    fn stages(&self) -> usize {
        2
    }

    fn run(&self, item: &WorkItem<'_>, stage: usize) {
        let id = item.global_id();
        let (x, y) = (id.x, id.y);
        let out_index = self.batch.output_index(x);

        if stage == 0 {
            let local = item.local_id();
            let scratch = item.scratch();

            let input = self.input.get(self.batch.input_index(y));
            let weight = self.weights.get(self.layout.weight_index(x, y));
            scratch.set(local.y, local.x, input * weight);

            item.barrier(Fence::Local);

            if local.y == 0 {
                let mut sum = 0.0;
                for row in 0..item.local_size().y {
                    sum += scratch.get(row, local.x);
                }
                self.output.atomic_add(out_index, sum);
            }

            if y == 0 {
                self.output
                    .atomic_add(out_index, self.biases.get(self.layout.bias_index(x)));
            }

            item.barrier(Fence::Global);
        } else {
            let activated = self.activation.activate(self.output.get(out_index));
            self.activated_output.set(out_index, activated);
        }
    }
}
