//! Gated time-mix variant
//!
//! Five interpolation targets in the order `w, k, v, r, g`, GroupNorm over heads and
//! a SiLU output gate.

use burn::module::{Module, Param};
use burn::nn::{GroupNorm, GroupNormConfig, Linear, LinearConfig};
use burn::tensor::activation::silu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::schedule::{self, LayerRatios};
use super::time_mix::{shifted_mix, wkv_step, DecayGenerator, MixGenerator, TimeMixCell, WkvInputs};
use crate::config::{RwkvConfig, TimeMixVariant};
use crate::error::Result;
use crate::init::{ParamInitializer, ParamRole};
use crate::state::LayerState;

const TARGETS: usize = 5;

#[derive(Module, Debug)]
pub struct TimeMixGated<B: Backend> {
    pub mix: MixGenerator<B>,
    pub maa_w: Param<Tensor<B, 1>>,
    pub maa_k: Param<Tensor<B, 1>>,
    pub maa_v: Param<Tensor<B, 1>>,
    pub maa_r: Param<Tensor<B, 1>>,
    pub maa_g: Param<Tensor<B, 1>>,
    pub decay: DecayGenerator<B>,
    /// `time_faaaa`, `[H, S, 1]`.
    pub bonus: Param<Tensor<B, 3>>,
    pub receptance: Linear<B>,
    pub key: Linear<B>,
    pub value: Linear<B>,
    pub output: Linear<B>,
    pub gate: Linear<B>,
    pub ln_x: GroupNorm<B>,
    layer_id: usize,
    num_heads: usize,
    head_size: usize,
}

impl<B: Backend> TimeMixGated<B> {
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

        let bonus = schedule::bonus(dim_att, ratios);

        Self {
            mix: MixGenerator::new(config, TARGETS, mix_bias(r1, 0.0), init, device),
            maa_w: mix_bias(r1, 0.0),
            maa_k: mix_bias(r1, 0.0),
            maa_v: mix_bias(r1, 0.3 * ratios.zero_to_one),
            maa_r: mix_bias(0.5 * r1, 0.0),
            maa_g: mix_bias(0.5 * r1, 0.0),
            decay: DecayGenerator::new(config, ratios, init, device),
            bonus: schedule::param_from_values(
                &bonus,
                [config.num_heads(), config.head_size, 1],
                device,
            ),
            receptance: projection(e, dim_att),
            key: projection(e, dim_att),
            value: projection(e, dim_att),
            output: projection(dim_att, e),
            gate: projection(e, dim_att),
            ln_x: GroupNormConfig::new(config.num_heads(), dim_att)
                .with_epsilon(config.group_norm_epsilon())
                .init(device),
            layer_id,
            num_heads: config.num_heads(),
            head_size: config.head_size,
        }
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    pub fn head_size(&self) -> usize {
        self.head_size
    }

    /// Interpolate every target and project the step inputs.
    ///
    /// Returns the accumulator inputs and the gate `silu(gate(x_g))`.
    pub fn prepare(&self, x: Tensor<B, 2>, sx: Tensor<B, 2>) -> (WkvInputs<B>, Tensor<B, 2>) {
        let [mw, mk, mv, mr, mg] = self.mix.forward::<TARGETS>(x.clone(), sx.clone());

        let xw = shifted_mix(x.clone(), sx.clone(), &self.maa_w, mw);
        let xk = shifted_mix(x.clone(), sx.clone(), &self.maa_k, mk);
        let xv = shifted_mix(x.clone(), sx.clone(), &self.maa_v, mv);
        let xr = shifted_mix(x.clone(), sx.clone(), &self.maa_r, mr);
        let xg = shifted_mix(x, sx, &self.maa_g, mg);

        let inputs = WkvInputs {
            receptance: self.receptance.forward(xr),
            key: self.key.forward(xk),
            value: self.value.forward(xv),
            decay: self.decay.forward(xw),
        };

        (inputs, silu(self.gate.forward(xg)))
    }
}

impl<B: Backend> TimeMixCell<B> for TimeMixGated<B> {
    fn forward(&self, x: Tensor<B, 2>, state: &LayerState<B>) -> (Tensor<B, 2>, LayerState<B>) {
        let [batch, dim_att] = x.dims();
        let sx = state.time_shift.clone() - x.clone();

        let (inputs, gate) = self.prepare(x.clone(), sx);
        let (out, wkv) = wkv_step(inputs, self.bonus.val(), state.wkv.clone());

        let out = self
            .ln_x
            .forward(out.reshape([batch, dim_att, 1]))
            .reshape([batch, dim_att]);
        let output = self.output.forward(out * gate);

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
        init.apply(layer, "att.time_maa_w", &mut self.maa_w, ParamRole::Preserved)?;
        init.apply(layer, "att.time_maa_k", &mut self.maa_k, ParamRole::Preserved)?;
        init.apply(layer, "att.time_maa_v", &mut self.maa_v, ParamRole::Preserved)?;
        init.apply(layer, "att.time_maa_r", &mut self.maa_r, ParamRole::Preserved)?;
        init.apply(layer, "att.time_maa_g", &mut self.maa_g, ParamRole::Preserved)?;
        self.decay.init_params(self.layer_id, init)?;
        init.apply(layer, "att.time_faaaa", &mut self.bonus, ParamRole::Preserved)?;

        init.apply(
            layer,
            "att.receptance.weight",
            &mut self.receptance.weight,
            ParamRole::Orthogonal,
        )?;
        init.apply(
            layer,
            "att.key.weight",
            &mut self.key.weight,
            ParamRole::LowGainProjection,
        )?;
        init.apply(
            layer,
            "att.value.weight",
            &mut self.value.weight,
            ParamRole::Orthogonal,
        )?;
        init.apply(
            layer,
            "att.output.weight",
            &mut self.output.weight,
            ParamRole::ZeroProjection,
        )?;
        init.apply(
            layer,
            "att.gate.weight",
            &mut self.gate.weight,
            ParamRole::LowGainProjection,
        )?;

        if let Some(gamma) = self.ln_x.gamma.as_mut() {
            init.apply(layer, "att.ln_x.weight", gamma, ParamRole::OutputNormScale)?;
        }
        if let Some(beta) = self.ln_x.beta.as_mut() {
            init.apply(layer, "att.ln_x.bias", beta, ParamRole::Preserved)?;
        }

        Ok(())
    }

    fn variant(&self) -> TimeMixVariant {
        TimeMixVariant::Gated
    }

    fn layer_id(&self) -> usize {
        self.layer_id
    }
}
