//! Spectrally normalised linear layer
//!
//! The weight is divided by an estimate of its largest singular value,
//! refined by one power iteration per training forward pass. The iteration
//! vector is persistent module state, updated the same way batch norm
//! updates its running statistics.

use burn::{
    module::{Module, RunningState},
    nn::{Linear, LinearConfig},
    tensor::{backend::Backend, Distribution, Tensor},
};

const EPS: f64 = 1e-12;

/// Linear layer whose weight is used as `W / sigma(W)`
#[derive(Module, Debug)]
pub struct SpectralNormLinear<B: Backend> {
    linear: Linear<B>,
    /// Left singular vector estimate, shape `[d_output, 1]`
    u: RunningState<Tensor<B, 2>>,
}

impl<B: Backend> SpectralNormLinear<B> {
    pub fn new(d_input: usize, d_output: usize, device: &B::Device) -> Self {
        Self::from_linear(LinearConfig::new(d_input, d_output).init(device), device)
    }

    /// Wrap an existing linear layer, starting from a random unit vector
    pub fn from_linear(linear: Linear<B>, device: &B::Device) -> Self {
        let [_, d_output] = linear.weight.val().dims();
        let u = normalize(Tensor::random(
            [d_output, 1],
            Distribution::Normal(0.0, 1.0),
            device,
        ));

        Self {
            linear,
            u: RunningState::new(u),
        }
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let weight = self.linear.weight.val();
        let sigma = if B::ad_enabled() {
            self.power_iteration(weight.clone())
        } else {
            self.estimate(weight.clone())
        };

        let output = input.matmul(weight / sigma);
        match &self.linear.bias {
            Some(bias) => output + bias.val().unsqueeze(),
            None => output,
        }
    }

    /// One power iteration step; stores the refined `u` and returns sigma `[1, 1]`
    fn power_iteration(&self, weight: Tensor<B, 2>) -> Tensor<B, 2> {
        let w = weight.clone().detach();
        let u = self.u.value();

        // burn stores the weight as [d_input, d_output]
        let v = normalize(w.clone().matmul(u));
        let u = normalize(w.transpose().matmul(v.clone()));

        self.u.update(u.clone());

        v.transpose().matmul(weight).matmul(u)
    }

    fn estimate(&self, weight: Tensor<B, 2>) -> Tensor<B, 2> {
        let u = self.u.value();
        let v = normalize(weight.clone().detach().matmul(u.clone()));

        v.transpose().matmul(weight).matmul(u)
    }
}

/// Scale a column vector to unit L2 norm
fn normalize<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = x.clone().powf_scalar(2.0).sum().sqrt().reshape([1, 1]);
    x / norm.add_scalar(EPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::Param;
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    /// Spectral norm estimate from the stored vector, without updating it
    fn sigma<B: Backend>(layer: &SpectralNormLinear<B>) -> f32 {
        layer
            .estimate(layer.linear.weight.val())
            .into_scalar()
            .elem::<f32>()
    }

    fn linear_from_weight<B: Backend>(weight: Tensor<B, 2>) -> Linear<B> {
        Linear {
            weight: Param::from_tensor(weight),
            bias: None,
        }
    }

    fn diagonal<B: Backend>(values: [f32; 2], device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_floats(
            TensorData::new(vec![values[0], 0.0, 0.0, values[1]], [2, 2]),
            device,
        )
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let layer = SpectralNormLinear::<TestBackend>::new(6, 4, &device);

        let input = Tensor::<TestBackend, 2>::ones([3, 6], &device);
        assert_eq!(layer.forward(input).dims(), [3, 4]);
    }

    #[test]
    fn test_power_iteration_converges_to_largest_singular_value() {
        let device = Default::default();
        let weight = diagonal::<TestAutodiffBackend>([3.0, 1.0], &device);
        let layer = SpectralNormLinear::from_linear(linear_from_weight(weight), &device);

        let input = Tensor::<TestAutodiffBackend, 2>::from_floats([[1.0, 0.0]], &device);
        for _ in 0..30 {
            let _ = layer.forward(input.clone());
        }

        assert!((sigma(&layer) - 3.0).abs() < 1e-3);

        // The dominant direction is scaled to unit gain
        let output: Vec<f32> = layer.forward(input).into_data().to_vec().unwrap();
        assert!((output[0] - 1.0).abs() < 1e-3);
        assert!(output[1].abs() < 1e-6);
    }

    #[test]
    fn test_inference_does_not_update_vector() {
        let device = Default::default();
        let weight = diagonal::<TestBackend>([2.0, 5.0], &device);
        let layer = SpectralNormLinear::from_linear(linear_from_weight(weight), &device);

        let before = sigma(&layer);
        let input = Tensor::<TestBackend, 2>::ones([1, 2], &device);
        for _ in 0..5 {
            let _ = layer.forward(input.clone());
        }

        assert_eq!(sigma(&layer), before);
    }

    #[test]
    fn test_normalize_unit_length() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[3.0], [4.0]], &device);
        let values: Vec<f32> = normalize(x).into_data().to_vec().unwrap();

        assert!((values[0] - 0.6).abs() < 1e-6);
        assert!((values[1] - 0.8).abs() < 1e-6);
    }
}
