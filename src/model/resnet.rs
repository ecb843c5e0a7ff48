//! ResNet-18 backbone for small inputs
//!
//! The stem is a 3x3 stride-1 convolution without the initial max-pool, so a
//! 96x96 input keeps enough spatial resolution through the four stages.
//! Architecture:
//! - Stem: Conv 3x3 (stride 1, no bias) + BN + ReLU
//! - 4 residual stages of two basic blocks (64, 128, 256, 512 channels)
//! - Global average pooling to a 512-dim feature vector

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::FEATURE_DIM;

/// 1x1 projection used when a block changes resolution or width
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(input))
    }
}

/// Two 3x3 convolutions with an identity (or projected) shortcut
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(out_channels).init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn2 = BatchNormConfig::new(out_channels).init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            downsample,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.activation.forward(x + identity)
    }
}

/// ResNet-18 feature extractor (no classification head)
#[derive(Module, Debug)]
pub struct ResNet18<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    layer1: Vec<BasicBlock<B>>,
    layer2: Vec<BasicBlock<B>>,
    layer3: Vec<BasicBlock<B>>,
    layer4: Vec<BasicBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    activation: Relu,
}

impl<B: Backend> ResNet18<B> {
    /// Create a randomly initialised backbone
    pub fn new(device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([3, 64], [3, 3])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(64).init(device);

        let stage = |in_channels: usize, out_channels: usize, stride: usize| {
            vec![
                BasicBlock::new(in_channels, out_channels, stride, device),
                BasicBlock::new(out_channels, out_channels, 1, device),
            ]
        };

        Self {
            conv1,
            bn1,
            layer1: stage(64, 64, 1),
            layer2: stage(64, 128, 2),
            layer3: stage(128, 256, 2),
            layer4: stage(256, FEATURE_DIM, 2),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            activation: Relu::new(),
        }
    }

    /// Pooled features `[batch, 512]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let mut x = self.activation.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }

        let x = self.avgpool.forward(x);

        // [batch, channels, 1, 1] -> [batch, channels]
        let [batch, channels, _, _] = x.dims();
        x.reshape([batch, channels])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_basic_block_keeps_shape_without_stride() {
        let device = Default::default();
        let block = BasicBlock::<TestBackend>::new(8, 8, 1, &device);
        assert!(block.downsample.is_none());

        let input = Tensor::<TestBackend, 4>::ones([2, 8, 6, 6], &device);
        assert_eq!(block.forward(input).dims(), [2, 8, 6, 6]);
    }

    #[test]
    fn test_basic_block_downsamples_with_stride() {
        let device = Default::default();
        let block = BasicBlock::<TestBackend>::new(8, 16, 2, &device);
        assert!(block.downsample.is_some());

        let input = Tensor::<TestBackend, 4>::ones([1, 8, 6, 6], &device);
        assert_eq!(block.forward(input).dims(), [1, 16, 3, 3]);
    }

    #[test]
    fn test_backbone_feature_shape() {
        let device = Default::default();
        let backbone = ResNet18::<TestBackend>::new(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        assert_eq!(backbone.forward(input).dims(), [2, FEATURE_DIM]);
    }
}
