// Activation functions (shared by the layer kernels)
pub mod activation;

// Core layer kernels (two-level reductions through scratch memory)
pub mod forward;
pub mod backward;

// Loss on the device
pub mod cost;

// Utility kernels
pub mod elementwise;
pub mod random;

pub use activation::Activation;
pub use backward::BackwardKernel;
pub use cost::{Cost, ErrorDerivative};
pub use elementwise::{
    Activate, CombineColumns, ListDivide, MultSecondAndAdd, Multiply, MultiplySingle, SetBiases,
};
pub use forward::ForwardKernel;
pub use random::{RandomFill, random_value};
