//! The RWKV stack: every block in layer order followed by the output LayerNorm.

use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use log::info;

use super::block::{init_layer_norm, Block};
use crate::cells::TimeMixCell;
use crate::config::{RwkvConfig, TimeMixVariant};
use crate::error::{Result, RwkvError};
use crate::init::{InitReport, ParamInitializer};
use crate::state::RwkvState;

/// An `L`-layer RWKV stack in RNN mode. One call to [`Rwkv::forward`] advances
/// every layer by exactly one time step.
#[derive(Module, Debug)]
pub struct Rwkv<B: Backend> {
    pub blocks: Vec<Block<B>>,
    pub ln_out: LayerNorm<B>,
    embedded_dim: usize,
    num_layers: usize,
    head_size: usize,
}

impl RwkvConfig {
    /// Build and initialize a stack.
    ///
    /// Fails on any configuration violation, on a backend whose float element is
    /// narrower than `f32`, and if some parameter was left without a role.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Rwkv<B>> {
        self.init_with_report(device).map(|(model, _)| model)
    }

    /// Like [`RwkvConfig::init`], also returning what the initializer did.
    pub fn init_with_report<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<(Rwkv<B>, InitReport)> {
        let mut init = ParamInitializer::new(self.seed, self.num_layers, self.embedded_dim);
        let model = self.init_with(&mut init, device)?;

        Ok((model, init.into_report()))
    }

    /// Build a stack drawing from (and initializing through) a shared initializer.
    pub fn init_with<B: Backend>(
        &self,
        init: &mut ParamInitializer,
        device: &B::Device,
    ) -> Result<Rwkv<B>> {
        self.validate()?;

        let blocks = (0..self.num_layers)
            .map(|layer_id| Block::new(self, layer_id, init, device))
            .collect();

        let mut model = Rwkv {
            blocks,
            ln_out: LayerNormConfig::new(self.embedded_dim).init(device),
            embedded_dim: self.embedded_dim,
            num_layers: self.num_layers,
            head_size: self.head_size,
        };
        model.init_params(init)?;

        info!(
            "built rwkv stack: {} layers, E={}, F={}, {} heads of {}, {:?} time mix, {} parameters",
            self.num_layers,
            self.embedded_dim,
            self.dim_ffn(),
            self.num_heads(),
            self.head_size,
            self.variant,
            model.num_params()
        );

        Ok(model)
    }
}

impl<B: Backend> Rwkv<B> {
    pub fn embedded_dim(&self) -> usize {
        self.embedded_dim
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn head_size(&self) -> usize {
        self.head_size
    }

    pub fn variant(&self) -> TimeMixVariant {
        self.blocks
            .first()
            .map_or(TimeMixVariant::Reduced, |block| block.att.variant())
    }

    /// Dimensions the state has to match.
    fn state_shape(&self) -> RwkvConfig {
        RwkvConfig::new(self.embedded_dim, self.num_layers).with_head_size(self.head_size)
    }

    pub fn zero_state(&self, batch_size: usize, device: &B::Device) -> RwkvState<B> {
        RwkvState::zeros(&self.state_shape(), batch_size, device)
    }

    /// Apply every parameter's role.
    ///
    /// Errors with [`RwkvError::UntaggedParameters`] if the roles applied do not
    /// cover exactly [`Module::num_params`] elements.
    pub fn init_params(&mut self, init: &mut ParamInitializer) -> Result<()> {
        let before = init.visited_elements();

        for block in self.blocks.iter_mut() {
            block.init_params(init)?;
        }
        init_layer_norm(init, None, "ln_out", &mut self.ln_out)?;

        let visited = init.visited_elements() - before;
        let expected = self.num_params();
        if visited != expected {
            return Err(RwkvError::UntaggedParameters { visited, expected });
        }

        Ok(())
    }

    /// Advance one time step.
    ///
    /// `x` is `[batch, E]`; `state` must hold `L` layers for the same batch size.
    pub fn forward(
        &self,
        x: Tensor<B, 2>,
        state: RwkvState<B>,
    ) -> Result<(Tensor<B, 2>, RwkvState<B>)> {
        let [batch, e] = x.dims();
        if e != self.embedded_dim {
            return Err(RwkvError::shape_mismatch(
                "input",
                [batch, self.embedded_dim],
                [batch, e],
            ));
        }
        state.validate(&self.state_shape(), batch)?;

        let (x, state) = self
            .blocks
            .iter()
            .try_fold((x, state), |(x, state), block| block.forward(x, state))?;

        Ok((self.ln_out.forward(x), state))
    }

    /// [`Rwkv::forward`] over the flat `[batch, L * (2 + S), E]` state layout.
    pub fn forward_flat(
        &self,
        x: Tensor<B, 2>,
        state: Tensor<B, 3>,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 3>)> {
        let state = RwkvState::from_flat(state, &self.state_shape())?;
        let (output, state) = self.forward(x, state)?;

        Ok((output, state.to_flat()))
    }
}
