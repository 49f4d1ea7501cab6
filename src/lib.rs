//! Dense-layer training kernels on an emulated parallel device
//!
//! - `core`: atomic float accumulator, device buffers, scratch memory, index layouts
//! - `device`: group/lane launch model with barriers and per-group scratch
//! - `ops`: the kernels (forward, backward, cost, elementwise helpers, random fill)
//! - `layers`: host-side dense layers and networks sequencing the kernels

pub mod config;
pub mod core;
pub mod device;
pub mod layers;
pub mod ops;

pub use config::{ConfigError, DeviceConfig};
pub use device::{Device, LaunchError};
pub use layers::{Dense, LayerError, Network};
pub use ops::Activation;
