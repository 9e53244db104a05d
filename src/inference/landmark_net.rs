//! # Landmark Regression Network
//!
//! A compact convolutional network that regresses keypoints directly from a
//! square RGB crop. Implemented with `candle` so weights load straight from a
//! safetensors file and run on CPU, CUDA or Metal.
//!
//! ## Architecture:
//! ```text
//! [1, 3, S, S] ─ conv 3x3/2 (16) ─ relu ─ conv 3x3/2 (32) ─ relu ─ conv 3x3/2 (32) ─ relu
//!              ─ flatten ─ linear ─ [1, slots * (1 + landmarks * 3)]
//! ```
//!
//! Each instance slot produces a presence logit followed by `x, y, z` per
//! landmark. `x`/`y` pass through a sigmoid into normalized image space, `z` is
//! left as relative depth.
//!
//! ## Tensor Names:
//! `backbone.conv1`, `backbone.conv2`, `backbone.conv3`, `head`.

use candle_core::{Device, Module, Tensor};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};
use image::imageops::{self, FilterType};

use super::backend::Landmark;
use crate::vision::{ModelKind, RawImage};

const CONV_CHANNELS: [usize; 3] = [16, 32, 32];

/// Shape of a network for one model kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkNetConfig {
    pub input_size: usize,
    pub num_landmarks: usize,
    pub max_instances: usize,
}

impl LandmarkNetConfig {
    /// Hands: 21 points, up to two hands. Face mesh: 468 points, one face.
    pub fn for_model(kind: ModelKind, input_size: usize) -> Self {
        match kind {
            ModelKind::GestureRecognizer | ModelKind::HandLandmarker => Self {
                input_size,
                num_landmarks: 21,
                max_instances: 2,
            },
            ModelKind::FaceLandmarker => Self {
                input_size,
                num_landmarks: 468,
                max_instances: 1,
            },
        }
    }

    fn feature_map_size(&self) -> usize {
        // 3x3 kernel, padding 1, stride 2
        (0..CONV_CHANNELS.len()).fold(self.input_size, |size, _| (size + 2 - 3) / 2 + 1)
    }

    fn head_inputs(&self) -> usize {
        let side = self.feature_map_size();
        CONV_CHANNELS[CONV_CHANNELS.len() - 1] * side * side
    }

    fn values_per_instance(&self) -> usize {
        1 + self.num_landmarks * 3
    }
}

/// One instance slot's raw prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancePrediction {
    pub presence: f32,
    pub landmarks: Vec<Landmark>,
}

pub struct LandmarkNet {
    conv1: Conv2d,
    conv2: Conv2d,
    conv3: Conv2d,
    head: Linear,
    config: LandmarkNetConfig,
}

impl LandmarkNet {
    pub fn load(vb: VarBuilder, config: LandmarkNetConfig) -> candle_core::Result<Self> {
        let conv_cfg = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        let backbone = vb.pp("backbone");

        let conv1 = conv2d(3, CONV_CHANNELS[0], 3, conv_cfg, backbone.pp("conv1"))?;
        let conv2 = conv2d(CONV_CHANNELS[0], CONV_CHANNELS[1], 3, conv_cfg, backbone.pp("conv2"))?;
        let conv3 = conv2d(CONV_CHANNELS[1], CONV_CHANNELS[2], 3, conv_cfg, backbone.pp("conv3"))?;
        let head = linear(
            config.head_inputs(),
            config.max_instances * config.values_per_instance(),
            vb.pp("head"),
        )?;

        Ok(Self {
            conv1,
            conv2,
            conv3,
            head,
            config,
        })
    }

    pub fn config(&self) -> &LandmarkNetConfig {
        &self.config
    }

    /// `[batch, 3, S, S]` → `[batch, slots * (1 + landmarks * 3)]`
    pub fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.conv1.forward(input)?.relu()?;
        let x = self.conv2.forward(&x)?.relu()?;
        let x = self.conv3.forward(&x)?.relu()?;
        let x = x.flatten_from(1)?;
        self.head.forward(&x)
    }

    /// Resize, normalize and run one frame, returning every instance slot.
    pub fn predict(&self, image: &RawImage, device: &Device) -> candle_core::Result<Vec<InstancePrediction>> {
        let input = self.preprocess(image, device)?;
        let raw = self.forward(&input)?.flatten_all()?.to_vec1::<f32>()?;

        let per_instance = self.config.values_per_instance();
        Ok(raw
            .chunks(per_instance)
            .take(self.config.max_instances)
            .map(|slot| InstancePrediction {
                presence: sigmoid(slot[0]),
                landmarks: slot[1..]
                    .chunks(3)
                    .map(|p| Landmark {
                        x: sigmoid(p[0]),
                        y: sigmoid(p[1]),
                        z: p[2],
                    })
                    .collect(),
            })
            .collect())
    }

    fn preprocess(&self, image: &RawImage, device: &Device) -> candle_core::Result<Tensor> {
        let side = self.config.input_size as u32;
        let resized = imageops::resize(image.pixels(), side, side, FilterType::Triangle);
        let data: Vec<f32> = resized.as_raw().iter().map(|&v| v as f32 / 255.0).collect();

        let size = self.config.input_size;
        Tensor::from_vec(data, (size, size, 3), device)?
            .permute((2, 0, 1))?
            .contiguous()?
            .unsqueeze(0)
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use image::RgbImage;

    fn zero_net(kind: ModelKind) -> LandmarkNet {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        LandmarkNet::load(vb, LandmarkNetConfig::for_model(kind, 64)).unwrap()
    }

    #[test]
    fn test_feature_map_size() {
        let config = LandmarkNetConfig::for_model(ModelKind::HandLandmarker, 64);
        assert_eq!(config.feature_map_size(), 8);
        assert_eq!(config.head_inputs(), 32 * 8 * 8);

        let odd = LandmarkNetConfig::for_model(ModelKind::HandLandmarker, 50);
        assert_eq!(odd.feature_map_size(), 7);
    }

    #[test]
    fn test_forward_shape() {
        let net = zero_net(ModelKind::GestureRecognizer);
        let input = Tensor::zeros((1, 3, 64, 64), DType::F32, &Device::Cpu).unwrap();
        let out = net.forward(&input).unwrap();
        assert_eq!(out.dims(), &[1, 2 * (1 + 21 * 3)]);
    }

    #[test]
    fn test_zero_weights_predict_centered_landmarks() {
        let net = zero_net(ModelKind::FaceLandmarker);
        let image = RawImage::new(RgbImage::new(120, 90));

        let predictions = net.predict(&image, &Device::Cpu).unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].presence, 0.5);
        assert_eq!(predictions[0].landmarks.len(), 468);
        assert_eq!(predictions[0].landmarks[0], Landmark { x: 0.5, y: 0.5, z: 0.0 });
    }
}
