//! Training Demo - Sequence Classification
//!
//! Trains the sequence driver for a few steps on a synthetic task: does the first
//! feature of the sequence sum to a positive number? The label depends on every
//! step, so the stack has to carry information through its state.

use burn::backend::{Autodiff, NdArray};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::{Int, Tensor};
use rwkv_rnn::prelude::*;

type Backend = Autodiff<NdArray<f32>>;

fn batch(
    batch_size: usize,
    seq_len: usize,
    features: usize,
    device: &<Backend as burn::tensor::backend::Backend>::Device,
) -> (Tensor<Backend, 3>, Tensor<Backend, 1, Int>) {
    let input = Tensor::<Backend, 3>::random(
        [batch_size, seq_len, features],
        burn::tensor::Distribution::Uniform(-1.0, 1.0),
        device,
    );

    let sums: Vec<f32> = input
        .clone()
        .slice([0..batch_size, 0..seq_len, 0..1])
        .sum_dim(1)
        .into_data()
        .to_vec()
        .unwrap_or_default();
    let labels: Vec<i64> = sums.iter().map(|&s| i64::from(s > 0.0)).collect();

    (input, Tensor::from_ints(labels.as_slice(), device))
}

fn main() -> Result<()> {
    println!("=== RWKV-RNN Training Example ===\n");

    let device = Default::default();
    let (batch_size, seq_len, features) = (16, 12, 4);

    let config = SequenceModelConfig::new(RwkvConfig::new(64, 2).with_head_size(32), features, 2);
    let mut model = config.init::<Backend>(&device)?;
    let mut optim = AdamConfig::new().init();
    let loss_fn = CrossEntropyLossConfig::new().init(&device);

    println!("Training setup:");
    println!("  Model: RWKV, 2 layers, E=64, {} input features", features);
    println!("  Task:  sign of the running sum of feature 0");
    println!();

    for step in 0..20 {
        let (input, labels) = batch(batch_size, seq_len, features, &device);

        let (logits, _) = model.forward(input, None)?;
        let loss = loss_fn.forward(logits, labels);
        let value: f32 = loss.clone().into_scalar();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(1e-3, model, grads);

        if step % 5 == 0 {
            println!("  step {:>2}: loss {:.4}", step, value);
        }
    }
    println!();

    // Demonstrate state persistence across chunks
    println!("State persistence demo:");
    let (first, _) = batch(1, 5, features, &device);
    let (second, _) = batch(1, 5, features, &device);
    let (_, state) = model.forward(first, None)?;
    let (logits, _) = model.forward(second, Some(state))?;
    println!("  Chunk 2 read-out with chunk 1 history: {:?}", logits.dims());
    println!();

    println!("=== Training Example completed! ===");
    Ok(())
}
