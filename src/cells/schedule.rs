//! Constructor-time parameter schedules
//!
//! Deterministic per-layer curves for the mixing biases, the base decay and the
//! per-head bonus. Shallow layers start close to "use the current token"; deeper
//! layers lean further on the shifted token.

use burn::module::Param;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Depth ratios of one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerRatios {
    /// `layer / max(num_layers - 1, 1)`, 0 on the first layer and 1 on the last.
    pub zero_to_one: f64,
    /// `1 - layer / num_layers`, 1 on the first layer and `1/L` on the last.
    pub one_to_almost_zero: f64,
}

impl LayerRatios {
    pub fn new(layer_id: usize, num_layers: usize) -> Self {
        Self {
            zero_to_one: layer_id as f64 / num_layers.saturating_sub(1).max(1) as f64,
            one_to_almost_zero: 1.0 - layer_id as f64 / num_layers as f64,
        }
    }
}

/// `n / dim` for every channel.
fn channel_ramp(dim: usize) -> impl Iterator<Item = f64> {
    (0..dim).map(move |n| n as f64 / dim as f64)
}

/// `1 - (ramp^power + offset)` per channel.
pub fn token_shift_mix(dim: usize, power: f64, offset: f64) -> Vec<f64> {
    channel_ramp(dim)
        .map(|ratio| 1.0 - (ratio.powf(power) + offset))
        .collect()
}

/// Base log-decay, `-6 + 5 * (n / (dim - 1))^(0.7 + 1.3 * r01)`.
pub fn decay_speed(dim: usize, ratios: LayerRatios) -> Vec<f64> {
    let exponent = 0.7 + 1.3 * ratios.zero_to_one;
    let denominator = dim.saturating_sub(1).max(1) as f64;

    (0..dim)
        .map(|n| -6.0 + 5.0 * (n as f64 / denominator).powf(exponent))
        .collect()
}

/// Per-channel bonus, `r01 * (1 - n / (dim - 1)) + ((n + 1) % 3 - 1) * 0.1`.
pub fn bonus(dim: usize, ratios: LayerRatios) -> Vec<f64> {
    let denominator = dim.saturating_sub(1).max(1) as f64;

    (0..dim)
        .map(|n| {
            let zigzag = ((n + 1) % 3) as f64 - 1.0;
            ratios.zero_to_one * (1.0 - n as f64 / denominator) + zigzag * 0.1
        })
        .collect()
}

pub fn param_from_values<B: Backend, const D: usize>(
    values: &[f64],
    dims: [usize; D],
    device: &B::Device,
) -> Param<Tensor<B, D>> {
    Param::from_tensor(Tensor::<B, 1>::from_floats(values, device).reshape(dims))
}
