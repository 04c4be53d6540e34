//! Sequence driver
//!
//! Wraps a [`Rwkv`] stack with a linear input encoder and a linear read-out so it
//! can consume `[batch, seq, features]` tensors directly. The state is threaded
//! through the steps; the read-out sees the stack output of each step.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::Rwkv;
use crate::config::RwkvConfig;
use crate::error::{self, RwkvError};
use crate::init::{InitReport, ParamInitializer, ParamRole};
use crate::state::RwkvState;

#[derive(Config, Debug)]
pub struct SequenceModelConfig {
    pub rwkv: RwkvConfig,
    /// Features per input step.
    pub input_dim: usize,
    /// Width of the read-out.
    pub output_dim: usize,
    #[config(default = true)]
    pub batch_first: bool,
}

impl SequenceModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<SequenceModel<B>> {
        self.init_with_report(device).map(|(model, _)| model)
    }

    pub fn init_with_report<B: Backend>(
        &self,
        device: &B::Device,
    ) -> error::Result<(SequenceModel<B>, InitReport)> {
        if self.input_dim == 0 || self.output_dim == 0 {
            return Err(RwkvError::invalid_config(
                "input_dim and output_dim must be at least 1",
            ));
        }

        let e = self.rwkv.embedded_dim;
        let mut init = ParamInitializer::new(self.rwkv.seed, self.rwkv.num_layers, e)
            .with_vocab_size(self.output_dim);

        let mut encoder = LinearConfig::new(self.input_dim, e).init(device);
        let rwkv = self.rwkv.init_with(&mut init, device)?;
        let mut readout = LinearConfig::new(e, self.output_dim).init(device);

        init.apply(None, "encoder.weight", &mut encoder.weight, ParamRole::Preserved)?;
        if let Some(bias) = encoder.bias.as_mut() {
            init.apply(None, "encoder.bias", bias, ParamRole::Preserved)?;
        }
        init.apply(None, "head.weight", &mut readout.weight, ParamRole::Head)?;
        if let Some(bias) = readout.bias.as_mut() {
            init.apply(None, "head.bias", bias, ParamRole::Preserved)?;
        }

        let model = SequenceModel {
            encoder,
            rwkv,
            readout,
            batch_first: self.batch_first,
        };

        Ok((model, init.into_report()))
    }
}

/// Encoder, RWKV stack and read-out.
#[derive(Module, Debug)]
pub struct SequenceModel<B: Backend> {
    pub encoder: Linear<B>,
    pub rwkv: Rwkv<B>,
    pub readout: Linear<B>,
    batch_first: bool,
}

impl<B: Backend> SequenceModel<B> {
    /// Set whether input is batch-first (default: true)
    pub fn with_batch_first(mut self, batch_first: bool) -> Self {
        self.batch_first = batch_first;
        self
    }

    pub fn batch_first(&self) -> bool {
        self.batch_first
    }

    /// One step: encode `[batch, input_dim]`, advance the stack, no read-out.
    pub fn step(
        &self,
        input: Tensor<B, 2>,
        state: RwkvState<B>,
    ) -> error::Result<(Tensor<B, 2>, RwkvState<B>)> {
        self.rwkv.forward(self.encoder.forward(input), state)
    }

    /// Run the whole sequence and read out the last step.
    ///
    /// `input` is `[batch, seq, input_dim]` (or `[seq, batch, input_dim]` when not
    /// batch-first). Starts from `state` or from zeros. Returns `[batch, output_dim]`
    /// and the final state.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        state: Option<RwkvState<B>>,
    ) -> error::Result<(Tensor<B, 2>, RwkvState<B>)> {
        let (last, state) = self.run(input, state, |_| ())?;

        Ok((self.readout.forward(last), state))
    }

    /// Run the whole sequence and read out every step, `[batch, seq, output_dim]`.
    pub fn forward_sequence(
        &self,
        input: Tensor<B, 3>,
        state: Option<RwkvState<B>>,
    ) -> error::Result<(Tensor<B, 3>, RwkvState<B>)> {
        let mut outputs = Vec::new();
        let (_, state) = self.run(input, state, |output| {
            outputs.push(self.readout.forward(output))
        })?;

        Ok((Tensor::stack(outputs, 1), state))
    }

    fn run(
        &self,
        input: Tensor<B, 3>,
        state: Option<RwkvState<B>>,
        mut on_step: impl FnMut(Tensor<B, 2>),
    ) -> error::Result<(Tensor<B, 2>, RwkvState<B>)> {
        let device = input.device();
        let dims = input.dims();
        let (batch_size, seq_len, features) = if self.batch_first {
            (dims[0], dims[1], dims[2])
        } else {
            (dims[1], dims[0], dims[2])
        };

        let [input_dim, _] = self.encoder.weight.dims();
        if features != input_dim || seq_len == 0 {
            return Err(RwkvError::shape_mismatch(
                "sequence input",
                [batch_size, seq_len.max(1), input_dim],
                [batch_size, seq_len, features],
            ));
        }

        let mut state = state.unwrap_or_else(|| self.rwkv.zero_state(batch_size, &device));
        let mut last = None;

        for t in 0..seq_len {
            let step_input = if self.batch_first {
                input.clone().narrow(1, t, 1).reshape([batch_size, features])
            } else {
                input.clone().narrow(0, t, 1).reshape([batch_size, features])
            };

            let (output, next) = self.step(step_input, state)?;
            state = next;
            on_step(output.clone());
            last = Some(output);
        }

        match last {
            Some(output) => Ok((output, state)),
            None => Err(RwkvError::shape_mismatch(
                "sequence input",
                [batch_size, 1, input_dim],
                [batch_size, 0, features],
            )),
        }
    }
}
