//! Channel-mix cell
//!
//! Gated squared-ReLU feed-forward over a one-step token shift:
//!
//! ```text
//! sx = previous - x
//! r  = sigmoid(receptance(x + sx * maa_r))
//! k  = relu(key(x + sx * maa_k))^2
//! y  = r * value(k)
//! ```

use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::schedule::{self, LayerRatios};
use crate::activation::RwkvActivation;
use crate::config::RwkvConfig;
use crate::error::Result;
use crate::init::{ParamInitializer, ParamRole};
use crate::state::{LayerState, RwkvState};

#[derive(Module, Debug)]
pub struct ChannelMix<B: Backend> {
    pub maa_k: Param<Tensor<B, 1>>,
    pub maa_r: Param<Tensor<B, 1>>,
    /// `E -> F`
    pub key: Linear<B>,
    /// `E -> E`
    pub receptance: Linear<B>,
    /// `F -> E`
    pub value: Linear<B>,
    layer_id: usize,
}

impl<B: Backend> ChannelMix<B> {
    pub fn new(config: &RwkvConfig, layer_id: usize, device: &B::Device) -> Self {
        let (e, f) = (config.embedded_dim, config.dim_ffn());
        let r1 = LayerRatios::new(layer_id, config.num_layers).one_to_almost_zero;
        let mix = schedule::token_shift_mix(e, r1, 0.0);

        Self {
            maa_k: schedule::param_from_values(&mix, [e], device),
            maa_r: schedule::param_from_values(&mix, [e], device),
            key: LinearConfig::new(e, f).with_bias(false).init(device),
            receptance: LinearConfig::new(e, e).with_bias(false).init(device),
            value: LinearConfig::new(f, e).with_bias(false).init(device),
            layer_id,
        }
    }

    pub fn layer_id(&self) -> usize {
        self.layer_id
    }

    /// Reads `state.channel_shift`; the time-mix fields are passed through unchanged.
    pub fn forward(&self, x: Tensor<B, 2>, state: &LayerState<B>) -> (Tensor<B, 2>, LayerState<B>) {
        let sx = state.channel_shift.clone() - x.clone();

        let xk = x.clone() + sx.clone() * self.maa_k.val().unsqueeze::<2>();
        let xr = x.clone() + sx * self.maa_r.val().unsqueeze::<2>();

        let r = sigmoid(self.receptance.forward(xr));
        let k = self.key.forward(xk).squared_relu();

        let next = LayerState {
            channel_shift: x,
            time_shift: state.time_shift.clone(),
            wkv: state.wkv.clone(),
        };

        (r * self.value.forward(k), next)
    }

    /// Step against a whole stack state; only this cell's layer is replaced.
    pub fn forward_state(
        &self,
        x: Tensor<B, 2>,
        state: RwkvState<B>,
    ) -> Result<(Tensor<B, 2>, RwkvState<B>)> {
        let (output, layer) = self.forward(x, state.try_layer(self.layer_id)?);

        Ok((output, state.replace_layer(self.layer_id, layer)))
    }

    pub fn init_params(&mut self, init: &mut ParamInitializer) -> Result<()> {
        let layer = Some(self.layer_id);

        init.apply(layer, "ffn.time_maa_k", &mut self.maa_k, ParamRole::Preserved)?;
        init.apply(layer, "ffn.time_maa_r", &mut self.maa_r, ParamRole::Preserved)?;
        init.apply(layer, "ffn.key.weight", &mut self.key.weight, ParamRole::Orthogonal)?;
        init.apply(
            layer,
            "ffn.receptance.weight",
            &mut self.receptance.weight,
            ParamRole::ZeroProjection,
        )?;
        init.apply(
            layer,
            "ffn.value.weight",
            &mut self.value.weight,
            ParamRole::ZeroProjection,
        )
    }
}
