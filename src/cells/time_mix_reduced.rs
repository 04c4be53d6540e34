//! Reduced time-mix variant
//!
//! Four interpolation targets in the order `r, k, v, w`, no output gate and a
//! LayerNorm over the whole attention width. The key is additionally scaled by
//! `1 - exp(-exp(w))`, where `w` is the decay already mapped into `(0, 1)`.

use burn::module::{Module, Param};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::schedule::{self, LayerRatios};
use super::time_mix::{shifted_mix, wkv_step, DecayGenerator, MixGenerator, TimeMixCell, WkvInputs};
use crate::activation::RwkvActivation;
use crate::config::{RwkvConfig, TimeMixVariant};
use crate::error::Result;
use crate::init::{ParamInitializer, ParamRole};
use crate::precision::at_least_f32;
use crate::state::LayerState;

const TARGETS: usize = 4;

#[derive(Module, Debug)]
pub struct TimeMixReduced<B: Backend> {
    pub mix: MixGenerator<B>,
    pub maa_r: Param<Tensor<B, 1>>,
    pub maa_k: Param<Tensor<B, 1>>,
    pub maa_v: Param<Tensor<B, 1>>,
    pub maa_w: Param<Tensor<B, 1>>,
    pub decay: DecayGenerator<B>,
    pub bonus: Param<Tensor<B, 3>>,
    pub receptance: Linear<B>,
    pub key: Linear<B>,
    pub value: Linear<B>,
    pub output: Linear<B>,
    pub ln_x: LayerNorm<B>,
    layer_id: usize,
}

impl<B: Backend> TimeMixReduced<B> {
    pub fn new(
        config: &RwkvConfig,
        layer_id: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let e = config.embedded_dim;
        let dim_att = config.dim_att();
        let ratios = LayerRatios::new(layer_id, config.num_layers);
        let r1 = ratios.one_to_almost_zero;

        let mix_bias = |power: f64, offset: f64| {
            schedule::param_from_values(&schedule::token_shift_mix(e, power, offset), [e], device)
        };
        let projection = |d_input: usize, d_output: usize| {
            LinearConfig::new(d_input, d_output)
                .with_bias(false)
                .init(device)
        };

        Self {
            mix: MixGenerator::new(config, TARGETS, mix_bias(r1, 0.0), init, device),
            maa_r: mix_bias(0.5 * r1, 0.0),
            maa_k: mix_bias(r1, 0.0),
            maa_v: mix_bias(r1, 0.3 * ratios.zero_to_one),
            maa_w: mix_bias(r1, 0.0),
            decay: DecayGenerator::new(config, ratios, init, device),
            bonus: schedule::param_from_values(
                &schedule::bonus(dim_att, ratios),
                [config.num_heads(), config.head_size, 1],
                device,
            ),
            receptance: projection(e, dim_att),
            key: projection(e, dim_att),
            value: projection(e, dim_att),
            output: projection(dim_att, e),
            ln_x: LayerNormConfig::new(dim_att).init(device),
            layer_id,
        }
    }

    /// Interpolate every target and project the step inputs, key already rescaled.
    pub fn prepare(&self, x: Tensor<B, 2>, sx: Tensor<B, 2>) -> WkvInputs<B> {
        let [mr, mk, mv, mw] = self.mix.forward::<TARGETS>(x.clone(), sx.clone());

        let xr = shifted_mix(x.clone(), sx.clone(), &self.maa_r, mr);
        let xk = shifted_mix(x.clone(), sx.clone(), &self.maa_k, mk);
        let xv = shifted_mix(x.clone(), sx.clone(), &self.maa_v, mv);
        let xw = shifted_mix(x, sx, &self.maa_w, mw);

        let decay = self.decay.forward(xw);
        let key = at_least_f32(self.key.forward(xk))
            * decay.clone().double_exp_decay().neg().add_scalar(1.0);

        WkvInputs {
            receptance: self.receptance.forward(xr),
            key,
            value: self.value.forward(xv),
            decay,
        }
    }
}

impl<B: Backend> TimeMixCell<B> for TimeMixReduced<B> {
    fn forward(&self, x: Tensor<B, 2>, state: &LayerState<B>) -> (Tensor<B, 2>, LayerState<B>) {
        let sx = state.time_shift.clone() - x.clone();

        let inputs = self.prepare(x.clone(), sx);
        let (out, wkv) = wkv_step(inputs, self.bonus.val(), state.wkv.clone());

        let output = self.output.forward(self.ln_x.forward(out));

        let next = LayerState {
            channel_shift: state.channel_shift.clone(),
            time_shift: x,
            wkv,
        };

        (output, next)
    }

    fn init_params(&mut self, init: &mut ParamInitializer) -> Result<()> {
        let layer = Some(self.layer_id);

        self.mix.init_params(self.layer_id, init)?;
        init.apply(layer, "att.time_maa_r", &mut self.maa_r, ParamRole::Preserved)?;
        init.apply(layer, "att.time_maa_k", &mut self.maa_k, ParamRole::Preserved)?;
        init.apply(layer, "att.time_maa_v", &mut self.maa_v, ParamRole::Preserved)?;
        init.apply(layer, "att.time_maa_w", &mut self.maa_w, ParamRole::Preserved)?;
        self.decay.init_params(self.layer_id, init)?;
        init.apply(layer, "att.time_faaaa", &mut self.bonus, ParamRole::Preserved)?;

        for (name, linear, role) in [
            ("att.receptance.weight", &mut self.receptance, ParamRole::Orthogonal),
            ("att.key.weight", &mut self.key, ParamRole::LowGainProjection),
            ("att.value.weight", &mut self.value, ParamRole::Orthogonal),
            ("att.output.weight", &mut self.output, ParamRole::ZeroProjection),
        ] {
            init.apply(layer, name, &mut linear.weight, role)?;
        }

        init.apply(
            layer,
            "att.ln_x.weight",
            &mut self.ln_x.gamma,
            ParamRole::OutputNormScale,
        )?;
        init.apply(layer, "att.ln_x.bias", &mut self.ln_x.beta, ParamRole::Preserved)
    }

    fn variant(&self) -> TimeMixVariant {
        TimeMixVariant::Reduced
    }

    fn layer_id(&self) -> usize {
        self.layer_id
    }
}
