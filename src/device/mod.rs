// Emulated device: limits detection and kernel launching
pub mod launch;
pub mod limits;

pub use launch::{Device, Dims, Fence, Kernel, LaunchError, WorkItem, calc_group_size};
pub use limits::{DeviceLimits, SCRATCH_DIM};
