// Loss helpers running on the device

use crate::core::DeviceBuffer;
use crate::device::{Dims, Kernel, WorkItem};

use super::activation::Activation;

/// Squared error reduced into a single scalar:
///   output[0] += (values[i] - target[i])^2   for every i
/// Every lane targets output[0], so this goes through the atomic accumulator.
/// `output[0]` is not cleared by the kernel.
pub struct Cost<'a> {
    pub values: &'a DeviceBuffer,
    pub target: &'a DeviceBuffer,
    pub output: &'a DeviceBuffer,
}

impl Cost<'_> {
    pub fn grid(&self) -> Dims {
        Dims::one(self.values.len())
    }
}

impl Kernel for Cost<'_> {
    fn name(&self) -> &'static str {
        "cost"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let i = item.global_id().x;
        let diff = self.values.get(i) - self.target.get(i);
        self.output.atomic_add(0, diff * diff);
    }
}

/// Derivative of the loss w.r.t. the activated output, taken from pre-activation values:
///   out[i] = activate(values[i]) - desired[i]
/// This is the sensitivity fed to the last layer's backward pass.
pub struct ErrorDerivative<'a> {
    pub values: &'a DeviceBuffer,
    pub desired: &'a DeviceBuffer,
    pub out: &'a DeviceBuffer,
    pub activation: Activation,
}

impl ErrorDerivative<'_> {
    pub fn grid(&self) -> Dims {
        Dims::one(self.values.len())
    }
}

impl Kernel for ErrorDerivative<'_> {
    fn name(&self) -> &'static str {
        "activate_and_error_derivative_calc"
    }

    fn run(&self, item: &WorkItem<'_>, _stage: usize) {
        let i = item.global_id().x;
        let actual = self.activation.activate(self.values.get(i));
        self.out.set(i, actual - self.desired.get(i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::device::Device;

    fn device() -> Device {
        Device::new(&DeviceConfig { threads: 4, max_group_lanes: 2 }).unwrap()
    }

    #[test]
    fn test_cost_simple() {
        let device = device();
        let values = DeviceBuffer::from_slice(&[1.0, 2.0, 3.0]);
        let target = DeviceBuffer::from_slice(&[1.0, 2.0, 5.0]);
        let output = DeviceBuffer::new(1);
        let kernel = Cost { values: &values, target: &target, output: &output };
        device.launch_auto(&kernel, kernel.grid()).unwrap();
        assert_eq!(output.get(0), 4.0);
    }

    #[test]
    fn test_cost_many_lanes_no_lost_updates() {
        let device = device();
        let n = 1000;
        let values = DeviceBuffer::filled(n, 3.0);
        let target = DeviceBuffer::filled(n, 1.0);
        let output = DeviceBuffer::new(1);
        let kernel = Cost { values: &values, target: &target, output: &output };
        device.launch_auto(&kernel, kernel.grid()).unwrap();
        assert_eq!(output.get(0), 4.0 * n as f32);
    }

    #[test]
    fn test_error_derivative() {
        let device = device();
        let values = DeviceBuffer::from_slice(&[-1.0, 0.5, 2.0]);
        let desired = DeviceBuffer::from_slice(&[0.0, 0.0, 1.0]);
        let out = DeviceBuffer::new(3);
        let kernel = ErrorDerivative {
            values: &values,
            desired: &desired,
            out: &out,
            activation: Activation::ReLU,
        };
        device.launch_auto(&kernel, kernel.grid()).unwrap();
        assert_eq!(out.to_vec(), vec![0.0, 0.5, 1.0]);
    }
}
