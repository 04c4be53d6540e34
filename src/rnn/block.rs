//! One RWKV block: pre-norm time mix and channel mix, each with a residual.

use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use log::debug;

use crate::cells::{ChannelMix, TimeMixCell, TimeMixer};
use crate::config::RwkvConfig;
use crate::error::Result;
use crate::init::{ParamInitializer, ParamRole};
use crate::state::RwkvState;

/// ```text
/// x = ln0(x)                 (layer 0 only)
/// x = x + att(ln1(x))
/// x = x + ffn(ln2(x))
/// ```
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    pub ln0: Option<LayerNorm<B>>,
    pub ln1: LayerNorm<B>,
    pub ln2: LayerNorm<B>,
    pub att: TimeMixer<B>,
    pub ffn: ChannelMix<B>,
    layer_id: usize,
}

impl<B: Backend> Block<B> {
    pub fn new(
        config: &RwkvConfig,
        layer_id: usize,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Self {
        let e = config.embedded_dim;

        Self {
            ln0: (layer_id == 0).then(|| LayerNormConfig::new(e).init(device)),
            ln1: LayerNormConfig::new(e).init(device),
            ln2: LayerNormConfig::new(e).init(device),
            att: TimeMixer::new(config, layer_id, init, device),
            ffn: ChannelMix::new(config, layer_id, device),
            layer_id,
        }
    }

    pub fn layer_id(&self) -> usize {
        self.layer_id
    }

    /// Step this block. Only `state.layer(layer_id)` is read and replaced.
    pub fn forward(
        &self,
        x: Tensor<B, 2>,
        state: RwkvState<B>,
    ) -> Result<(Tensor<B, 2>, RwkvState<B>)> {
        let x = match &self.ln0 {
            Some(ln0) => ln0.forward(x),
            None => x,
        };

        let (att_out, layer) = self
            .att
            .forward(self.ln1.forward(x.clone()), state.try_layer(self.layer_id)?);
        let x = x + att_out;

        let (ffn_out, layer) = self.ffn.forward(self.ln2.forward(x.clone()), &layer);
        let x = x + ffn_out;

        Ok((x, state.replace_layer(self.layer_id, layer)))
    }

    pub fn init_params(&mut self, init: &mut ParamInitializer) -> Result<()> {
        let layer = Some(self.layer_id);
        let before = init.visited_elements();

        if let Some(ln0) = self.ln0.as_mut() {
            init_layer_norm(init, layer, "ln0", ln0)?;
        }
        init_layer_norm(init, layer, "ln1", &mut self.ln1)?;
        init_layer_norm(init, layer, "ln2", &mut self.ln2)?;

        self.att.init_params(init)?;
        self.ffn.init_params(init)?;

        debug!(
            "initialized block {} ({:?} time mix): {} parameters",
            self.layer_id,
            self.att.variant(),
            init.visited_elements() - before
        );

        Ok(())
    }
}

pub(crate) fn init_layer_norm<B: Backend>(
    init: &mut ParamInitializer,
    layer: Option<usize>,
    prefix: &str,
    norm: &mut LayerNorm<B>,
) -> Result<()> {
    init.apply(
        layer,
        &format!("{prefix}.weight"),
        &mut norm.gamma,
        ParamRole::Preserved,
    )?;
    init.apply(
        layer,
        &format!("{prefix}.bias"),
        &mut norm.beta,
        ParamRole::Preserved,
    )
}
