// Lock-free float accumulation (CAS loop over the bit pattern)
pub mod atomic;

// Global device memory and group-local scratch memory
pub mod buffer;

// Offset arithmetic for layers and batches
pub mod layout;

pub use atomic::AtomicF32;
pub use buffer::{DeviceBuffer, Scratch};
pub use layout::{BatchOffsets, LayerLayout};
