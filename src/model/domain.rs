//! CDAN domain discriminator
//!
//! Classifies the multilinear map of backbone features and class
//! probabilities as synthetic (0) or real (1). Every linear layer is
//! spectrally normalised.

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Relu},
    tensor::{backend::Backend, Tensor},
};

use crate::model::spectral_norm::SpectralNormLinear;

/// Configuration for the [`CdanDiscriminator`]
#[derive(Config, Debug)]
pub struct CdanDiscriminatorConfig {
    /// Width of the backbone features
    #[config(default = "512")]
    pub feature_dim: usize,

    #[config(default = "3")]
    pub num_classes: usize,

    /// Width of the two hidden layers
    #[config(default = "1024")]
    pub hidden_dim: usize,

    #[config(default = "0.5")]
    pub dropout_rate: f64,
}

impl CdanDiscriminatorConfig {
    pub fn input_dim(&self) -> usize {
        self.feature_dim * self.num_classes
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> CdanDiscriminator<B> {
        CdanDiscriminator {
            fc1: SpectralNormLinear::new(self.input_dim(), self.hidden_dim, device),
            fc2: SpectralNormLinear::new(self.hidden_dim, self.hidden_dim, device),
            fc3: SpectralNormLinear::new(self.hidden_dim, 1, device),
            dropout: DropoutConfig::new(self.dropout_rate).init(),
            activation: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct CdanDiscriminator<B: Backend> {
    fc1: SpectralNormLinear<B>,
    fc2: SpectralNormLinear<B>,
    fc3: SpectralNormLinear<B>,
    dropout: Dropout,
    activation: Relu,
}

impl<B: Backend> CdanDiscriminator<B> {
    /// Domain logits `[batch, 1]`
    ///
    /// # Arguments
    /// * `features` - Backbone features `[batch, feature_dim]`
    /// * `probs` - Class probabilities `[batch, num_classes]`
    pub fn forward(&self, features: Tensor<B, 2>, probs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = multilinear_map(features, probs);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        let x = self.fc2.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc3.forward(x)
    }
}

/// Flattened outer product `probs ⊗ features`, shape `[batch, classes * features]`
///
/// Row-major over classes: entry `c * feature_dim + f` is `probs[c] * features[f]`.
pub fn multilinear_map<B: Backend>(features: Tensor<B, 2>, probs: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, feature_dim] = features.dims();
    let [_, num_classes] = probs.dims();

    probs
        .unsqueeze_dim::<3>(2)
        .matmul(features.unsqueeze_dim::<3>(1))
        .reshape([batch, num_classes * feature_dim])
}
