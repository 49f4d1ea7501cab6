use log::{debug, info};

use super::{Dense, LayerError, check_len};
use crate::core::DeviceBuffer;
use crate::device::{Device, Dims};
use crate::ops::{Activation, Cost, ErrorDerivative};

/// Stack of dense layers trained with plain gradient descent on squared error
///
/// One training step:
/// 1. forward through every layer
/// 2. cost of the last layer's activated outputs
/// 3. error derivative (activated output - target) as the last layer's sensitivity
/// 4. backward through every layer in reverse order
/// 5. apply the accumulated mods, averaged over the batch
#[derive(Debug)]
pub struct Network {
    input_len: usize,
    layers: Vec<Dense>,
    errors: DeviceBuffer,
    cost: DeviceBuffer,
}

impl Network {
    /// `layers` lists (size, activation) per layer, first to last
    pub fn new(input_len: usize, layers: &[(usize, Activation)]) -> Result<Self, LayerError> {
        if layers.is_empty() {
            return Err(LayerError::ZeroLayers);
        }

        let mut dense_layers = Vec::with_capacity(layers.len());
        let mut in_len = input_len;
        for &(size, activation) in layers {
            dense_layers.push(Dense::new(in_len, size, activation));
            in_len = size;
        }

        info!(
            "Network created: {} inputs, layer sizes {:?}",
            input_len,
            layers.iter().map(|(size, _)| *size).collect::<Vec<_>>()
        );

        Ok(Self {
            input_len,
            layers: dense_layers,
            errors: DeviceBuffer::new(in_len),
            cost: DeviceBuffer::new(1),
        })
    }

    /// Build from existing layers; each layer's input must match the previous size
    pub fn from_layers(layers: Vec<Dense>) -> Result<Self, LayerError> {
        let first = layers.first().ok_or(LayerError::ZeroLayers)?;
        let input_len = first.input_len();
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[1].input_len() != pair[0].size() {
                return Err(LayerError::LayerMismatch {
                    layer: i + 1,
                    expected: pair[0].size(),
                    actual: pair[1].input_len(),
                });
            }
        }
        let output_len = layers.last().map(Dense::size).unwrap_or_default();
        Ok(Self {
            input_len,
            layers,
            errors: DeviceBuffer::new(output_len),
            cost: DeviceBuffer::new(1),
        })
    }

    /// Randomize every layer, each from its own seed
    pub fn randomize(&mut self, device: &Device, seed: u64) -> Result<(), LayerError> {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.randomize(device, seed.wrapping_add((i as u64) << 32))?;
        }
        Ok(())
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    pub fn output_len(&self) -> usize {
        self.layers.last().map(Dense::size).unwrap_or_default()
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn forward(&mut self, device: &Device, inputs: &DeviceBuffer, batch_size: usize) -> Result<(), LayerError> {
        check_len(self.input_len * batch_size, inputs.len(), |expected, actual| {
            LayerError::InputLength { expected, actual }
        })?;

        for i in 0..self.layers.len() {
            let (before, rest) = self.layers.split_at_mut(i);
            let layer = &mut rest[0];
            match before.last() {
                Some(previous) => layer.forward(device, previous.activated_outputs(), batch_size)?,
                None => layer.forward(device, inputs, batch_size)?,
            }
        }
        Ok(())
    }

    /// Forward pass returning the activated outputs of the last layer
    pub fn predict(&mut self, device: &Device, inputs: &DeviceBuffer, batch_size: usize) -> Result<Vec<f32>, LayerError> {
        self.forward(device, inputs, batch_size)?;
        let n = self.output_len() * batch_size;
        let mut outputs = self.last_layer().activated_outputs().to_vec();
        outputs.truncate(n);
        Ok(outputs)
    }

    /// Mean squared error of the last forward pass against `targets`
    pub fn cost(&self, device: &Device, targets: &DeviceBuffer, batch_size: usize) -> Result<f32, LayerError> {
        let n = self.output_len() * batch_size;
        if n == 0 {
            return Err(LayerError::EmptyBatch);
        }
        check_len(n, targets.len(), |expected, actual| LayerError::TargetLength { expected, actual })?;

        self.cost.fill(0.0);
        let kernel = Cost {
            values: self.last_layer().activated_outputs(),
            target: targets,
            output: &self.cost,
        };
        device.launch_auto(&kernel, Dims::one(n))?;
        Ok(self.cost.get(0) / n as f32)
    }

    /// One gradient descent step over a batch, returns the cost before the update
    pub fn train_batch(
        &mut self,
        device: &Device,
        inputs: &DeviceBuffer,
        targets: &DeviceBuffer,
        batch_size: usize,
        learn_rate: f32,
    ) -> Result<f32, LayerError> {
        self.forward(device, inputs, batch_size)?;
        let cost = self.cost(device, targets, batch_size)?;

        let n = self.output_len() * batch_size;
        self.errors.expand_to(n);
        let last = self.last_layer();
        let kernel = ErrorDerivative {
            values: last.outputs(),
            desired: targets,
            out: &self.errors,
            activation: last.activation(),
        };
        device.launch_auto(&kernel, Dims::one(n))?;

        let count = self.layers.len();
        for i in (0..count).rev() {
            let (before, rest) = self.layers.split_at_mut(i);
            let (current, after) = rest.split_at_mut(1);
            let layer_inputs = before.last().map_or(inputs, |previous| previous.activated_outputs());
            let next_sensitivities = after.first().map_or(&self.errors, |next| next.sensitivities());
            current[0].backward(device, layer_inputs, next_sensitivities, learn_rate, batch_size)?;
        }

        let scale = 1.0 / batch_size as f32;
        for layer in self.layers.iter_mut() {
            layer.apply_gradients(device, scale)?;
        }

        debug!("Trained batch of {}, cost {}", batch_size, cost);
        Ok(cost)
    }

    fn last_layer(&self) -> &Dense {
        // A network always has at least one layer
        &self.layers[self.layers.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn device() -> Device {
        Device::new(&DeviceConfig { threads: 4, max_group_lanes: 16 }).unwrap()
    }

    #[test]
    fn test_zero_layers_rejected() {
        assert!(matches!(Network::new(2, &[]), Err(LayerError::ZeroLayers)));
        assert!(matches!(Network::from_layers(Vec::new()), Err(LayerError::ZeroLayers)));
    }

    #[test]
    fn test_mismatched_layers_rejected() {
        let layers = vec![
            Dense::new(2, 3, Activation::Linear),
            Dense::new(3, 2, Activation::Linear),
            Dense::new(4, 1, Activation::Linear),
        ];
        let err = Network::from_layers(layers).unwrap_err();
        assert!(matches!(
            err,
            LayerError::LayerMismatch { layer: 2, expected: 2, actual: 4 }
        ));
        assert_eq!(err.to_string(), "Layer 2 takes 4 inputs, the previous layer produces 2");
    }

    #[test]
    fn test_predict_two_layers() {
        let device = device();
        let hidden = Dense::with_parameters(2, 2, Activation::ReLU, &[1.0, -1.0, 0.5, 0.5], &[0.0, -1.0]).unwrap();
        let output = Dense::with_parameters(2, 1, Activation::Linear, &[2.0, 3.0], &[0.25]).unwrap();
        let mut network = Network::from_layers(vec![hidden, output]).unwrap();

        // Sample 0: hidden = relu([1-2, 0.5+1-1]) = [0, 0.5]; out = 0*2 + 0.5*3 + 0.25 = 1.75
        // Sample 1: hidden = relu([3-1, 1.5+0.5-1]) = [2, 1]; out = 4 + 3 + 0.25 = 7.25
        let inputs = DeviceBuffer::from_slice(&[1.0, 2.0, 3.0, 1.0]);
        let predictions = network.predict(&device, &inputs, 2).unwrap();
        assert_eq!(predictions.len(), 2);
        assert!((predictions[0] - 1.75).abs() < 1e-6);
        assert!((predictions[1] - 7.25).abs() < 1e-6);
    }

    #[test]
    fn test_cost_is_mean_squared_error() {
        let device = device();
        let layer = Dense::with_parameters(1, 1, Activation::Linear, &[1.0], &[0.0]).unwrap();
        let mut network = Network::from_layers(vec![layer]).unwrap();
        let inputs = DeviceBuffer::from_slice(&[1.0, 2.0, 3.0]);
        network.forward(&device, &inputs, 3).unwrap();
        let targets = DeviceBuffer::from_slice(&[1.0, 2.0, 5.0]);
        let cost = network.cost(&device, &targets, 3).unwrap();
        assert!((cost - 4.0 / 3.0).abs() < 1e-6);

        let short = DeviceBuffer::new(2);
        assert!(matches!(
            network.cost(&device, &short, 3),
            Err(LayerError::TargetLength { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_training_reduces_cost_on_linear_target() {
        let device = device();
        let mut network = Network::new(2, &[(1, Activation::Linear)]).unwrap();
        network.randomize(&device, 2024).unwrap();

        // target = 2a - b + 0.5
        let inputs = DeviceBuffer::from_slice(&[0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
        let targets = DeviceBuffer::from_slice(&[0.5, -0.5, 2.5, 1.5]);

        let initial = network.train_batch(&device, &inputs, &targets, 4, 0.1).unwrap();
        let mut last = initial;
        for _ in 0..200 {
            last = network.train_batch(&device, &inputs, &targets, 4, 0.1).unwrap();
        }
        assert!(last < initial * 0.1, "cost went from {} to {}", initial, last);
        assert!(last < 0.01, "cost still {}", last);

        let weights = network.layers()[0].weights().to_vec();
        assert!((weights[0] - 2.0).abs() < 0.3);
        assert!((weights[1] + 1.0).abs() < 0.3);
    }

    #[test]
    fn test_wide_network_trains_then_shrinks_batch() {
        let device = device();
        let mut rng = StdRng::seed_from_u64(67);
        let mut network = Network::new(12, &[(16, Activation::TanH), (3, Activation::Linear)]).unwrap();
        network.randomize(&device, 70).unwrap();

        let raw_inputs: Vec<f32> = (0..5 * 12).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let raw_targets: Vec<f32> = (0..5 * 3).map(|_| rng.gen_range(-0.5..0.5)).collect();
        let inputs = DeviceBuffer::from_slice(&raw_inputs);
        let targets = DeviceBuffer::from_slice(&raw_targets);

        let initial = network.train_batch(&device, &inputs, &targets, 5, 0.05).unwrap();
        let mut last = initial;
        for _ in 0..20 {
            last = network.train_batch(&device, &inputs, &targets, 5, 0.05).unwrap();
        }
        assert!(last < initial, "cost went from {} to {}", initial, last);

        // Buffers sized for 5 samples must serve a batch of 2 unchanged
        let full = network.predict(&device, &inputs, 5).unwrap();
        let small_inputs = DeviceBuffer::from_slice(&raw_inputs[..2 * 12]);
        let small_targets = DeviceBuffer::from_slice(&raw_targets[..2 * 3]);
        let small = network.predict(&device, &small_inputs, 2).unwrap();
        assert_eq!(small.len(), 6);
        for (a, b) in small.iter().zip(&full[..6]) {
            assert!((a - b).abs() < 1e-5);
        }
        let cost = network.train_batch(&device, &small_inputs, &small_targets, 2, 0.05).unwrap();
        assert!(cost.is_finite());
    }

    #[test]
    fn test_hidden_layer_receives_gradient() {
        let device = device();
        let mut network = Network::new(2, &[(3, Activation::TanH), (1, Activation::Linear)]).unwrap();
        network.randomize(&device, 5).unwrap();
        let before = network.layers()[0].weights().to_vec();

        let inputs = DeviceBuffer::from_slice(&[0.5, -0.5]);
        let targets = DeviceBuffer::from_slice(&[1.0]);
        network.train_batch(&device, &inputs, &targets, 1, 0.5).unwrap();

        let after = network.layers()[0].weights().to_vec();
        assert!(before.iter().zip(&after).any(|(b, a)| (b - a).abs() > 1e-7));
    }
}
