use log::debug;

use super::{LayerError, check_len};
use crate::core::{BatchOffsets, DeviceBuffer, LayerLayout};
use crate::device::Device;
use crate::ops::{
    Activation, BackwardKernel, ForwardKernel, MultSecondAndAdd, RandomFill,
};

/// Fully connected layer with its parameters, gradients and per-batch activations
///
/// Buffer sizes:
/// - weights / weight_mods: input_len * size
/// - biases / bias_mods: size
/// - outputs / activated_outputs: size * batch capacity
/// - sensitivities (propagated to the previous layer): input_len * batch capacity
#[derive(Debug)]
pub struct Dense {
    layout: LayerLayout,
    activation: Activation,

    weights: DeviceBuffer,
    biases: DeviceBuffer,

    weight_mods: DeviceBuffer,
    bias_mods: DeviceBuffer,

    outputs: DeviceBuffer,
    activated_outputs: DeviceBuffer,
    sensitivities: DeviceBuffer,

    batch_capacity: usize,
}

impl Dense {
    /// New layer with zeroed parameters, see `randomize`
    pub fn new(input_len: usize, size: usize, activation: Activation) -> Self {
        let layout = LayerLayout::new(input_len, size);
        Self {
            layout,
            activation,
            weights: DeviceBuffer::new(layout.weight_count()),
            biases: DeviceBuffer::new(size),
            weight_mods: DeviceBuffer::new(layout.weight_count()),
            bias_mods: DeviceBuffer::new(size),
            outputs: DeviceBuffer::new(size),
            activated_outputs: DeviceBuffer::new(size),
            sensitivities: DeviceBuffer::new(input_len),
            batch_capacity: 1,
        }
    }

    /// New layer with the given parameters
    /// `weights[input_len * x + y]` connects input y to output x
    pub fn with_parameters(
        input_len: usize,
        size: usize,
        activation: Activation,
        weights: &[f32],
        biases: &[f32],
    ) -> Result<Self, LayerError> {
        let layer = Self::new(input_len, size, activation);
        for (expected, actual) in [(layer.weights.len(), weights.len()), (size, biases.len())] {
            if expected != actual {
                return Err(LayerError::ParameterLength { expected, actual });
            }
        }
        layer.weights.write(weights);
        layer.biases.write(biases);
        Ok(layer)
    }

    /// Fill weights and biases with the device random kernel
    /// Values lie in [-1/sqrt(input_len), 1/sqrt(input_len)]
    pub fn randomize(&mut self, device: &Device, seed: u64) -> Result<(), LayerError> {
        let div = (self.layout.input_len as f32).sqrt().max(1.0);

        let kernel = RandomFill { buffer: &self.weights, seed, div };
        device.launch_auto(&kernel, kernel.grid())?;

        let kernel = RandomFill {
            buffer: &self.biases,
            seed: seed.wrapping_add(self.weights.len() as u64),
            div,
        };
        device.launch_auto(&kernel, kernel.grid())?;
        Ok(())
    }

    fn ensure_batch_size(&mut self, batch_size: usize) {
        if self.batch_capacity < batch_size {
            self.outputs.expand_to(self.layout.output_len * batch_size);
            self.activated_outputs.expand_to(self.layout.output_len * batch_size);
            self.sensitivities.expand_to(self.layout.input_len * batch_size);
            self.batch_capacity = batch_size;
        }
    }

    /// Forward pass for `batch_size` samples packed back to back in `inputs`
    pub fn forward(&mut self, device: &Device, inputs: &DeviceBuffer, batch_size: usize) -> Result<(), LayerError> {
        if batch_size == 0 {
            return Err(LayerError::EmptyBatch);
        }
        check_len(self.layout.input_len * batch_size, inputs.len(), |expected, actual| {
            LayerError::InputLength { expected, actual }
        })?;
        self.ensure_batch_size(batch_size);

        debug!(
            "Dense {} -> {} forward, batch {}",
            self.layout.input_len, self.layout.output_len, batch_size
        );

        // Outputs are accumulated by the kernel
        self.outputs.fill(0.0);
        for sample in 0..batch_size {
            let kernel = ForwardKernel {
                layout: self.layout,
                activation: self.activation,
                batch: BatchOffsets::for_sample(&self.layout, sample),
                weights: &self.weights,
                biases: &self.biases,
                input: inputs,
                output: &self.outputs,
                activated_output: &self.activated_outputs,
            };
            device.launch_auto(&kernel, kernel.grid())?;
        }
        Ok(())
    }

    /// Backward pass: accumulates into the weight/bias mods and writes the
    /// sensitivities for the previous layer
    ///
    /// `inputs` must be the buffer given to the matching `forward` call and
    /// `next_sensitivities` holds dLoss/d activated output for this layer.
    pub fn backward(
        &mut self,
        device: &Device,
        inputs: &DeviceBuffer,
        next_sensitivities: &DeviceBuffer,
        learn_rate: f32,
        batch_size: usize,
    ) -> Result<(), LayerError> {
        if batch_size == 0 {
            return Err(LayerError::EmptyBatch);
        }
        check_len(self.layout.input_len * batch_size, inputs.len(), |expected, actual| {
            LayerError::InputLength { expected, actual }
        })?;
        check_len(
            self.layout.output_len * batch_size,
            next_sensitivities.len(),
            |expected, actual| LayerError::SensitivityLength { expected, actual },
        )?;
        self.ensure_batch_size(batch_size);

        debug!(
            "Dense {} -> {} backward, batch {}, learn rate {}",
            self.layout.input_len, self.layout.output_len, batch_size, learn_rate
        );

        self.sensitivities.fill(0.0);
        for sample in 0..batch_size {
            let kernel = BackwardKernel {
                layout: self.layout,
                activation: self.activation,
                batch: BatchOffsets::for_sample(&self.layout, sample),
                learn_rate,
                inputs,
                layer_output: &self.outputs,
                sensitivities: next_sensitivities,
                weights: &self.weights,
                weight_mods: &self.weight_mods,
                bias_mods: &self.bias_mods,
                gradients_out: &self.sensitivities,
            };
            device.launch_auto(&kernel, kernel.grid())?;
        }
        Ok(())
    }

    /// parameters += mods * scale, then clear the mods
    pub fn apply_gradients(&mut self, device: &Device, scale: f32) -> Result<(), LayerError> {
        let kernel = MultSecondAndAdd {
            first: &self.weights,
            second: &self.weight_mods,
            mult: scale,
        };
        device.launch_auto(&kernel, kernel.grid())?;

        let kernel = MultSecondAndAdd {
            first: &self.biases,
            second: &self.bias_mods,
            mult: scale,
        };
        device.launch_auto(&kernel, kernel.grid())?;

        self.weight_mods.fill(0.0);
        self.bias_mods.fill(0.0);
        Ok(())
    }

    pub fn layout(&self) -> &LayerLayout {
        &self.layout
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn input_len(&self) -> usize {
        self.layout.input_len
    }

    pub fn size(&self) -> usize {
        self.layout.output_len
    }

    pub fn weights(&self) -> &DeviceBuffer {
        &self.weights
    }

    pub fn biases(&self) -> &DeviceBuffer {
        &self.biases
    }

    pub fn weight_mods(&self) -> &DeviceBuffer {
        &self.weight_mods
    }

    pub fn bias_mods(&self) -> &DeviceBuffer {
        &self.bias_mods
    }

    /// Pre-activation sums of the last forward pass
    pub fn outputs(&self) -> &DeviceBuffer {
        &self.outputs
    }

    pub fn activated_outputs(&self) -> &DeviceBuffer {
        &self.activated_outputs
    }

    /// Sensitivities propagated to the previous layer by the last backward pass
    pub fn sensitivities(&self) -> &DeviceBuffer {
        &self.sensitivities
    }
}
