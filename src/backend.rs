//! Backend abstraction - Multi-backend support
//!
//! NdArray (CPU) by default; CUDA (GPU) when built with the `cuda` feature.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray;

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as Backend>::Device {
    <DefaultBackend as Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA (GPU)"
    } else {
        "NdArray (CPU)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name_matches_features() {
        #[cfg(not(feature = "cuda"))]
        assert_eq!(backend_name(), "NdArray (CPU)");
        #[cfg(feature = "cuda")]
        assert_eq!(backend_name(), "CUDA (GPU)");
    }
}
