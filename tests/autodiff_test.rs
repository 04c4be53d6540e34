//! The stack trains like any other burn module.

use burn::backend::{Autodiff, NdArray};
use burn::module::Param;
use burn::tensor::{Distribution, Tensor};
use rwkv_rnn::cells::TimeMixer;
use rwkv_rnn::config::{RwkvConfig, TimeMixVariant};

type Backend = Autodiff<NdArray<f32>>;

#[test]
fn test_gradients_reach_parameters_through_three_steps() {
    let device = Default::default();

    for variant in [TimeMixVariant::Gated, TimeMixVariant::Reduced] {
        let mut model = RwkvConfig::new(64, 2)
            .with_head_size(32)
            .with_variant(variant)
            .init::<Backend>(&device)
            .unwrap();

        // open the zero-initialized output projections so the recurrence feeds the loss
        for block in model.blocks.iter_mut() {
            let output = match &mut block.att {
                TimeMixer::Gated(cell) => &mut cell.output,
                TimeMixer::Reduced(cell) => &mut cell.output,
            };
            output.weight = Param::from_tensor(Tensor::random(
                [64, 64],
                Distribution::Uniform(-0.2, 0.2),
                &device,
            ));
        }

        let mut state = model.zero_state(2, &device);
        let mut output = None;
        for _ in 0..3 {
            let x = Tensor::<Backend, 2>::random([2, 64], Distribution::Default, &device);
            let (y, next) = model.forward(x, state).unwrap();
            state = next;
            output = Some(y);
        }

        let weights = Tensor::<Backend, 2>::random([2, 64], Distribution::Default, &device);
        let loss = (output.unwrap() * weights).sum();
        let grads = loss.backward();

        assert!(model.ln_out.gamma.grad(&grads).is_some());

        let output_weight = match &model.blocks[1].att {
            TimeMixer::Gated(cell) => &cell.output.weight,
            TimeMixer::Reduced(cell) => &cell.output.weight,
        };
        let grad: Vec<f32> = output_weight
            .grad(&grads)
            .expect("time-mix output projection has a gradient")
            .into_data()
            .to_vec()
            .unwrap();

        assert!(grad.iter().all(|v| v.is_finite()));
        assert!(grad.iter().any(|&v| v != 0.0), "{variant:?}");

        // the last readout sees an accumulator decayed on the step before
        let (receptance, decay_base) = match &model.blocks[0].att {
            TimeMixer::Gated(cell) => (&cell.receptance.weight, &cell.decay.decay),
            TimeMixer::Reduced(cell) => (&cell.receptance.weight, &cell.decay.decay),
        };
        for grad in [
            receptance
                .grad(&grads)
                .expect("receptance has a gradient")
                .into_data()
                .to_vec::<f32>()
                .unwrap(),
            decay_base
                .grad(&grads)
                .expect("decay base has a gradient")
                .into_data()
                .to_vec::<f32>()
                .unwrap(),
        ] {
            assert!(grad.iter().all(|v| v.is_finite()));
            assert!(grad.iter().any(|&v| v != 0.0), "{variant:?}");
        }
    }
}
