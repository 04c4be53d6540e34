//! Time-mix cell
//!
//! One recurrent step of RWKV x060 attention. Every variant follows the same path:
//!
//! 1. token shift: `sx = previous - x`
//! 2. data-dependent interpolation between `x` and the previous token, one per target,
//!    with per-target deltas from a shared low-rank generator
//! 3. decay `w = exp(-exp(decay + lora(x_w)))`
//! 4. per-head accumulator step:
//!    ```text
//!    a   = k ⊗ v
//!    out = r · (u ⊙ a + s)
//!    s'  = a + w ⊙ s
//!    ```
//! 5. normalization, optional gate, output projection
//!
//! The two variants, [`TimeMixGated`] and [`TimeMixReduced`], differ in their target
//! set, normalization and gate; [`TimeMixer`] picks one at construction.

use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::schedule::{self, LayerRatios};
use super::{TimeMixGated, TimeMixReduced};
use crate::activation::RwkvActivation;
use crate::config::{RwkvConfig, TimeMixVariant};
use crate::error::Result;
use crate::init::{ParamInitializer, ParamRole};
use crate::precision::{at_least_f32, cast_to};
use crate::state::{LayerState, RwkvState};

/// A time-mix step over one layer's state.
///
/// `forward` reads `state.time_shift` and `state.wkv` and returns the cell output
/// with a new record; the channel shift is passed through unchanged.
pub trait TimeMixCell<B: Backend> {
    fn forward(&self, x: Tensor<B, 2>, state: &LayerState<B>) -> (Tensor<B, 2>, LayerState<B>);

    /// Apply the role of every parameter this cell owns.
    fn init_params(&mut self, init: &mut ParamInitializer) -> Result<()>;

    fn variant(&self) -> TimeMixVariant;

    fn layer_id(&self) -> usize;

    /// Step against a whole stack state; only this cell's layer is replaced.
    fn forward_state(
        &self,
        x: Tensor<B, 2>,
        state: RwkvState<B>,
    ) -> Result<(Tensor<B, 2>, RwkvState<B>)> {
        let layer_id = self.layer_id();
        let (output, layer) = self.forward(x, state.try_layer(layer_id)?);

        Ok((output, state.replace_layer(layer_id, layer)))
    }
}

/// The time-mix cell of one block, either variant.
#[derive(Module, Debug)]
pub enum TimeMixer<B: Backend> {
    Gated(TimeMixGated<B>),
    Reduced(TimeMixReduced<B>),
}

impl<B: Backend> TimeMixer<B> {
    pub fn new(
        config: &RwkvConfig,
        layer_id: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        match config.variant {
            TimeMixVariant::Gated => Self::Gated(TimeMixGated::new(config, layer_id, init, device)),
            TimeMixVariant::Reduced => {
                Self::Reduced(TimeMixReduced::new(config, layer_id, init, device))
            }
        }
    }
}

impl<B: Backend> TimeMixCell<B> for TimeMixer<B> {
    fn forward(&self, x: Tensor<B, 2>, state: &LayerState<B>) -> (Tensor<B, 2>, LayerState<B>) {
        match self {
            Self::Gated(cell) => cell.forward(x, state),
            Self::Reduced(cell) => cell.forward(x, state),
        }
    }

    fn init_params(&mut self, init: &mut ParamInitializer) -> Result<()> {
        match self {
            Self::Gated(cell) => cell.init_params(init),
            Self::Reduced(cell) => cell.init_params(init),
        }
    }

    fn variant(&self) -> TimeMixVariant {
        match self {
            Self::Gated(cell) => cell.variant(),
            Self::Reduced(cell) => cell.variant(),
        }
    }

    fn layer_id(&self) -> usize {
        match self {
            Self::Gated(cell) => cell.layer_id(),
            Self::Reduced(cell) => cell.layer_id(),
        }
    }
}

/// Low-rank generator of the per-target interpolation deltas.
///
/// `tanh((x + sx * maa_x) @ w1)` is split into `targets` slices of width `rank`,
/// and slice `t` is projected back to `E` by `w2[t]`.
#[derive(Module, Debug)]
pub struct MixGenerator<B: Backend> {
    /// `time_maa_x`, `[E]`.
    pub maa_x: Param<Tensor<B, 1>>,
    /// `time_maa_w1`, `[E, rank * targets]`.
    pub w1: Param<Tensor<B, 2>>,
    /// `time_maa_w2`, `[targets, rank, E]`.
    pub w2: Param<Tensor<B, 3>>,
    targets: usize,
    rank: usize,
}

impl<B: Backend> MixGenerator<B> {
    pub fn new(
        config: &RwkvConfig,
        targets: usize,
        maa_x: Param<Tensor<B, 1>>,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let (e, rank) = (config.embedded_dim, config.mix_lora_dim);

        Self {
            maa_x,
            w1: Param::from_tensor(Tensor::zeros([e, rank * targets], device)),
            w2: Param::from_tensor(init.uniform([targets, rank, e], -0.01, 0.01, device)),
            targets,
            rank,
        }
    }

    /// One `[batch, E]` delta per target, in target order. `T` must equal the
    /// target count the generator was built with.
    pub fn forward<const T: usize>(
        &self,
        x: Tensor<B, 2>,
        sx: Tensor<B, 2>,
    ) -> [Tensor<B, 2>; T] {
        debug_assert_eq!(T, self.targets);
        let [batch, e] = x.dims();

        let xxx = x + sx * self.maa_x.val().unsqueeze::<2>();
        let deltas = xxx
            .matmul(self.w1.val())
            .tanh()
            .reshape([batch, self.targets, self.rank])
            .swap_dims(0, 1)
            .matmul(self.w2.val());

        core::array::from_fn(|t| {
            deltas
                .clone()
                .slice([t..t + 1, 0..batch, 0..e])
                .reshape([batch, e])
        })
    }

    pub fn init_params(&mut self, layer_id: usize, init: &mut ParamInitializer) -> Result<()> {
        init.apply(Some(layer_id), "att.time_maa_x", &mut self.maa_x, ParamRole::Preserved)?;
        init.apply(Some(layer_id), "att.time_maa_w1", &mut self.w1, ParamRole::Preserved)?;
        init.apply(Some(layer_id), "att.time_maa_w2", &mut self.w2, ParamRole::Preserved)
    }
}

/// Data-dependent decay: base log-decay plus a tanh low-rank correction, mapped
/// through `exp(-exp(.))`.
#[derive(Module, Debug)]
pub struct DecayGenerator<B: Backend> {
    /// `time_decay`, `[E]`.
    pub decay: Param<Tensor<B, 1>>,
    /// `time_decay_w1`, `[E, D]`.
    pub w1: Param<Tensor<B, 2>>,
    /// `time_decay_w2`, `[D, E]`.
    pub w2: Param<Tensor<B, 2>>,
}

impl<B: Backend> DecayGenerator<B> {
    pub fn new(
        config: &RwkvConfig,
        ratios: LayerRatios,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let (e, rank) = (config.dim_att(), config.decay_lora_dim);
        let decay = schedule::decay_speed(e, ratios);

        Self {
            decay: schedule::param_from_values(&decay, [e], device),
            w1: Param::from_tensor(Tensor::zeros([config.embedded_dim, rank], device)),
            w2: Param::from_tensor(init.uniform([rank, e], -0.01, 0.01, device)),
        }
    }

    /// Pre-activation `decay + tanh(xw @ w1) @ w2`.
    pub fn log_decay(&self, xw: Tensor<B, 2>) -> Tensor<B, 2> {
        self.decay.val().unsqueeze::<2>() + xw.matmul(self.w1.val()).tanh().matmul(self.w2.val())
    }

    /// Decay factors in `(0, 1)`, mapped in at least f32.
    pub fn forward(&self, xw: Tensor<B, 2>) -> Tensor<B, 2> {
        at_least_f32(self.log_decay(xw)).double_exp_decay()
    }

    pub fn init_params(&mut self, layer_id: usize, init: &mut ParamInitializer) -> Result<()> {
        init.apply(Some(layer_id), "att.time_decay", &mut self.decay, ParamRole::Preserved)?;
        init.apply(Some(layer_id), "att.time_decay_w1", &mut self.w1, ParamRole::Preserved)?;
        init.apply(Some(layer_id), "att.time_decay_w2", &mut self.w2, ParamRole::Preserved)
    }
}

/// `x + sx * (maa + delta)`.
pub(crate) fn shifted_mix<B: Backend>(
    x: Tensor<B, 2>,
    sx: Tensor<B, 2>,
    maa: &Param<Tensor<B, 1>>,
    delta: Tensor<B, 2>,
) -> Tensor<B, 2> {
    x + sx * (maa.val().unsqueeze::<2>() + delta)
}

/// Projected step inputs, all `[batch, E]`.
#[derive(Debug, Clone)]
pub struct WkvInputs<B: Backend> {
    pub receptance: Tensor<B, 2>,
    pub key: Tensor<B, 2>,
    pub value: Tensor<B, 2>,
    /// Decay factors, already mapped into `(0, 1)`.
    pub decay: Tensor<B, 2>,
}

/// One accumulator step for all heads.
///
/// `bonus` is `[H, S, 1]` and `wkv` is `[batch, H, S, S]`. Returns the flattened
/// per-head readout `[batch, E]` in the receptance's precision and the new
/// accumulator, which is kept in at least f32.
pub fn wkv_step<B: Backend>(
    inputs: WkvInputs<B>,
    bonus: Tensor<B, 3>,
    wkv: Tensor<B, 4>,
) -> (Tensor<B, 2>, Tensor<B, 4>) {
    let [batch, heads, head_size, _] = wkv.dims();
    let e = heads * head_size;
    let dtype = inputs.receptance.dtype();

    let r = at_least_f32(inputs.receptance).reshape([batch, heads, 1, head_size]);
    let k = at_least_f32(inputs.key).reshape([batch, heads, head_size, 1]);
    let v = at_least_f32(inputs.value).reshape([batch, heads, 1, head_size]);
    let w = at_least_f32(inputs.decay).reshape([batch, heads, head_size, 1]);
    let u = at_least_f32(bonus).unsqueeze::<4>();
    let wkv = at_least_f32(wkv);

    let a = k.matmul(v);
    let out = r.matmul(u * a.clone() + wkv.clone());
    let next = a + w * wkv;

    (cast_to(out.reshape([batch, e]), dtype), next)
}
