//! Elementwise maps used by the recurrent cells
//!
//! Burn ships `sigmoid`, `silu` and `relu`; the two maps below are specific to the
//! RWKV recurrence and live here so both time-mix variants and the channel mixer
//! share one definition.

use burn::tensor::activation::relu;
use burn::tensor::{backend::Backend, Tensor};

/// Double-exponential decay map `w = exp(-exp(z))`.
///
/// Maps any real pre-activation into the open interval `(0, 1)`, monotonically
/// decreasing in `z`: very negative `z` keeps the accumulator almost intact, very
/// positive `z` forgets it almost entirely. The sign of the carried state never flips.
///
/// # Example
///
/// ```rust
/// use burn::backend::NdArray;
/// use burn::tensor::Tensor;
/// use rwkv_rnn::activation::DoubleExpDecay;
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let z = Tensor::<Backend, 1>::from_floats([-2.0, 0.0, 2.0], &device);
/// let w = DoubleExpDecay::forward(z);
/// ```
pub struct DoubleExpDecay;

impl DoubleExpDecay {
    pub fn forward<B: Backend, const D: usize>(z: Tensor<B, D>) -> Tensor<B, D> {
        z.exp().neg().exp()
    }
}

/// Squared ReLU, `max(x, 0)^2`, the channel-mix hidden activation.
pub struct SquaredRelu;

impl SquaredRelu {
    pub fn forward<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
        relu(x).powf_scalar(2.0)
    }
}

/// Method-call sugar for the maps above.
pub trait RwkvActivation {
    fn double_exp_decay(self) -> Self;
    fn squared_relu(self) -> Self;
}

impl<B: Backend, const D: usize> RwkvActivation for Tensor<B, D> {
    fn double_exp_decay(self) -> Self {
        DoubleExpDecay::forward(self)
    }

    fn squared_relu(self) -> Self {
        SquaredRelu::forward(self)
    }
}
