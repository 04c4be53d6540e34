//! Basic usage example of the RWKV stack in recurrent mode
//!
//! Builds a small stack, steps it over a few tokens with explicit state, and runs
//! the same stack through the sequence driver.

use burn::backend::NdArray;
use burn::tensor::Tensor;
use rwkv_rnn::prelude::*;

fn main() -> Result<()> {
    println!("=== RWKV-RNN Basic Example ===\n");

    // Use the NdArray backend (CPU)
    type Backend = NdArray<f32>;
    let device = Default::default();

    // Example 1: step a stack by hand
    println!("Example 1: Stepping the stack");
    let config = RwkvConfig::new(64, 4).with_head_size(32);
    let model = config.init::<Backend>(&device)?;

    println!("Created RWKV stack:");
    println!("  Embedding width: {}", config.embedded_dim);
    println!("  Layers:          {}", config.num_layers);
    println!("  Heads:           {} x {}", config.num_heads(), config.head_size);
    println!("  FFN width:       {}", config.dim_ffn());
    println!("  Time mix:        {:?}", config.variant);
    println!();

    let mut state = model.zero_state(2, &device);
    for t in 0..5 {
        let x = Tensor::<Backend, 2>::random(
            [2, 64],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let (output, next) = model.forward(x, state)?;
        state = next;
        println!("  step {}: output {:?}", t, output.dims());
    }
    println!("  Flat state shape: {:?}", state.to_flat().dims());
    println!();

    // Example 2: the gated variant
    println!("Example 2: Gated time mix");
    let gated = config
        .clone()
        .with_variant(TimeMixVariant::Gated)
        .init::<Backend>(&device)?;
    let (output, _) = gated.forward(
        Tensor::<Backend, 2>::ones([2, 64], &device),
        gated.zero_state(2, &device),
    )?;
    println!("  Output shape: {:?}", output.dims());
    println!();

    // Example 3: whole sequences through the driver
    println!("Example 3: Sequence driver");
    let driver = SequenceModelConfig::new(config, 20, 10).init::<Backend>(&device)?;

    // Input shape: [batch=4, seq=12, features=20]
    let input = Tensor::<Backend, 3>::random(
        [4, 12, 20],
        burn::tensor::Distribution::Uniform(-1.0, 1.0),
        &device,
    );
    let (last, state) = driver.forward(input.clone(), None)?;
    let (all, _) = driver.forward_sequence(input, None)?;

    println!("  Input shape:         [4, 12, 20]");
    println!("  Last read-out shape: {:?}", last.dims());
    println!("  All read-outs shape: {:?}", all.dims());
    println!("  Final state layers:  {}", state.num_layers());
    println!();

    println!("=== Examples completed successfully! ===");
    Ok(())
}
