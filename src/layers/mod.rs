// Host-side layers
//
// These own the device buffers and sequence kernel launches (forward, cost,
// backward, update). The numeric work itself lives in `ops`.
pub mod dense;
pub mod network;

pub use dense::Dense;
pub use network::Network;

use thiserror::Error;

use crate::device::LaunchError;

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("Batch size must be at least 1")]
    EmptyBatch,

    #[error("Input buffer holds {actual} values, the batch needs {expected}")]
    InputLength { expected: usize, actual: usize },

    #[error("Sensitivity buffer holds {actual} values, the batch needs {expected}")]
    SensitivityLength { expected: usize, actual: usize },

    #[error("Target buffer holds {actual} values, the batch needs {expected}")]
    TargetLength { expected: usize, actual: usize },

    #[error("Parameter buffer holds {actual} values, the layer needs {expected}")]
    ParameterLength { expected: usize, actual: usize },

    #[error("Layer {layer} takes {actual} inputs, the previous layer produces {expected}")]
    LayerMismatch {
        layer: usize,
        expected: usize,
        actual: usize,
    },

    #[error("No layers were provided when creating the network")]
    ZeroLayers,

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Fail unless `buffer_len` covers `expected` values
pub(crate) fn check_len(
    expected: usize,
    buffer_len: usize,
    err: fn(usize, usize) -> LayerError,
) -> Result<(), LayerError> {
    if buffer_len < expected {
        return Err(err(expected, buffer_len));
    }
    Ok(())
}
