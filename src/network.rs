//! Convolutional Q-network and the function-approximator seam policies depend on

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::softmax;

use crate::error::{self, PolicyError};

const CONV1_FILTERS: usize = 32;
const CONV1_KERNEL: usize = 8;
const CONV2_FILTERS: usize = 64;
const CONV2_KERNEL: usize = 5;
const CONV_STRIDE: usize = 4;

/// Trainable function mapping frame histories to action values.
///
/// Input is `[batch, nb_frames, height, width]`, output `[batch, outputs]`.
pub trait QFunction<B: Backend>: Module<B> {
    fn q_values(&self, histories: Tensor<B, 4>) -> Tensor<B, 2>;
}

/// Configuration for [`QNetwork`]
#[derive(Debug, Config)]
pub struct QNetworkConfig {
    /// Frame height and width
    pub resolution: [usize; 2],
    /// Frames stacked as input channels
    pub nb_frames: usize,
    /// Size of the value vector
    pub outputs: usize,
    /// Width of the fully connected layer
    #[config(default = 4032)]
    pub hidden_size: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
    /// Softmax output head, used by distilled student networks
    #[config(default = false)]
    pub distilled: bool,
}

impl QNetworkConfig {
    /// Number of features after the second convolution, `None` when the
    /// resolution is too small for the kernels.
    pub fn flattened_size(&self) -> Option<usize> {
        let [height, width] = self.resolution;
        let conv = |size: usize, kernel: usize| {
            size.checked_sub(kernel).map(|rest| rest / CONV_STRIDE + 1)
        };
        let height = conv(conv(height, CONV1_KERNEL)?, CONV2_KERNEL)?;
        let width = conv(conv(width, CONV1_KERNEL)?, CONV2_KERNEL)?;
        Some(CONV2_FILTERS * height * width)
    }

    pub fn validate(&self) -> error::Result<()> {
        if self.nb_frames == 0 {
            return Err(PolicyError::Config("nb_frames must be at least 1".to_string()));
        }
        if self.outputs == 0 {
            return Err(PolicyError::Config("network needs at least one output".to_string()));
        }
        if self.flattened_size().is_none() {
            return Err(PolicyError::Config(format!(
                "resolution {:?} is too small for the convolution stack",
                self.resolution
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<QNetwork<B>> {
        self.validate()?;
        let flattened = self.flattened_size().unwrap_or_default();

        let conv1 = Conv2dConfig::new([self.nb_frames, CONV1_FILTERS], [CONV1_KERNEL; 2])
            .with_stride([CONV_STRIDE; 2])
            .init(device);
        let conv2 = Conv2dConfig::new([CONV1_FILTERS, CONV2_FILTERS], [CONV2_KERNEL; 2])
            .with_stride([CONV_STRIDE; 2])
            .init(device);

        Ok(QNetwork {
            conv1,
            conv2,
            hidden: LinearConfig::new(flattened, self.hidden_size).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(self.hidden_size, self.outputs).init(device),
            activation: Relu::new(),
            distilled: Ignored(self.distilled),
        })
    }
}

/// Two strided convolutions followed by one dropout-regularized dense layer
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    hidden: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
    activation: Relu,
    distilled: Ignored<bool>,
}

impl<B: Backend> QNetwork<B> {
    pub fn forward(&self, histories: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.conv1.forward(histories));
        let x = self.activation.forward(self.conv2.forward(x));
        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.dropout.forward(self.activation.forward(self.hidden.forward(x)));
        let values = self.output.forward(x);

        if self.distilled.0 {
            softmax(values, 1)
        } else {
            values
        }
    }
}

impl<B: Backend> QFunction<B> for QNetwork<B> {
    fn q_values(&self, histories: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(histories)
    }
}

/// Values of the first sample in a `[batch, outputs]` tensor.
pub(crate) fn first_row<B: Backend>(values: Tensor<B, 2>) -> error::Result<Vec<f32>> {
    let [batch, outputs] = values.dims();
    if batch == 0 {
        return Ok(Vec::new());
    }
    let mut row = values
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| PolicyError::TensorData(format!("{err:?}")))?;
    row.truncate(outputs);
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config(outputs: usize) -> QNetworkConfig {
        QNetworkConfig::new([30, 40], 2, outputs).with_hidden_size(16)
    }

    #[test]
    fn test_flattened_size_matches_reference_resolution() {
        let config = QNetworkConfig::new([120, 160], 1, 3);
        assert_eq!(config.flattened_size(), Some(4032));
        assert_eq!(small_config(3).flattened_size(), Some(128));
    }

    #[test]
    fn test_validate_rejects_tiny_resolution() {
        let config = QNetworkConfig::new([8, 8], 1, 3);
        assert!(matches!(config.validate(), Err(PolicyError::Config(_))));
        let config = QNetworkConfig::new([120, 160], 0, 3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let network = small_config(5).init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([3, 2, 30, 40], &device);
        assert_eq!(network.q_values(input).dims(), [3, 5]);
    }

    #[test]
    fn test_distilled_head_outputs_distribution() {
        let device = Default::default();
        let network = small_config(4)
            .with_distilled(true)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 2, 30, 40], &device);
        let row = first_row(network.q_values(input)).unwrap();
        assert_eq!(row.len(), 4);
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_first_row() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device)
            .reshape([2, 2]);
        assert_eq!(first_row(values).unwrap(), vec![1.0, 2.0]);
    }
}
