//! Gradient reversal
//!
//! Identity on the forward pass; on the backward pass the incoming gradient
//! is multiplied by `-lambda`. Built from a detached branch so no custom
//! backward op is needed:
//!
//! `y = -lambda * x + detach((1 + lambda) * x)`
//!
//! The value of `y` equals `x`, while only the first term carries gradient.

use burn::tensor::{backend::Backend, Tensor};

/// Reverse and scale gradients flowing back through `input`
pub fn grad_reverse<B: Backend, const D: usize>(input: Tensor<B, D>, lambda: f64) -> Tensor<B, D> {
    let passthrough = input.clone().mul_scalar(1.0 + lambda).detach();
    input.mul_scalar(-lambda) + passthrough
}
