#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::module::Param;
    use burn::tensor::{Distribution, Tensor};
    use rwkv_rnn::cells::{TimeMixCell, TimeMixGated, TimeMixReduced, TimeMixer};
    use rwkv_rnn::config::{RwkvConfig, TimeMixVariant};
    use rwkv_rnn::error::RwkvError;
    use rwkv_rnn::init::ParamInitializer;
    use rwkv_rnn::state::{LayerState, RwkvState};

    type Backend = NdArray<f32>;

    fn config(variant: TimeMixVariant) -> RwkvConfig {
        RwkvConfig::new(64, 3)
            .with_head_size(32)
            .with_variant(variant)
    }

    fn create_cell(variant: TimeMixVariant, layer_id: usize) -> TimeMixer<Backend> {
        let device = Default::default();
        let config = config(variant);
        let mut init = ParamInitializer::new(config.seed, config.num_layers, config.embedded_dim);
        let mut cell = TimeMixer::new(&config, layer_id, &mut init, &device);
        cell.init_params(&mut init).unwrap();
        cell
    }

    fn to_vec<const D: usize>(tensor: Tensor<Backend, D>) -> Vec<f32> {
        tensor.into_data().to_vec().unwrap()
    }

    fn random_state(variant: TimeMixVariant, batch: usize) -> RwkvState<Backend> {
        let device = Default::default();
        let config = config(variant);
        let flat = Tensor::<Backend, 3>::random(
            [batch, config.state_rows(), 64],
            Distribution::Uniform(-0.5, 0.5),
            &device,
        );
        RwkvState::from_flat(flat, &config).unwrap()
    }

    #[test]
    fn test_variant_selection() {
        assert_eq!(
            create_cell(TimeMixVariant::Gated, 0).variant(),
            TimeMixVariant::Gated
        );
        assert_eq!(
            create_cell(TimeMixVariant::Reduced, 2).variant(),
            TimeMixVariant::Reduced
        );
        assert_eq!(create_cell(TimeMixVariant::Reduced, 2).layer_id(), 2);
    }

    #[test]
    fn test_forward_finite_from_zero_state() {
        let device = Default::default();

        for variant in [TimeMixVariant::Gated, TimeMixVariant::Reduced] {
            let cell = create_cell(variant, 1);
            let state = LayerState::zeros(&config(variant), 2, &device);
            let x = Tensor::<Backend, 2>::random([2, 64], Distribution::Default, &device);

            let (y, next) = cell.forward(x, &state);

            assert_eq!(y.dims(), [2, 64]);
            assert_eq!(next.wkv.dims(), [2, 2, 32, 32]);
            assert!(to_vec(y).iter().all(|v| v.is_finite()));
            assert!(to_vec(next.wkv).iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_time_shift_stores_input_and_keeps_channel_shift() {
        let device = Default::default();
        let cell = create_cell(TimeMixVariant::Reduced, 0);
        let state = random_state(TimeMixVariant::Reduced, 2);

        let x = Tensor::<Backend, 2>::random([2, 64], Distribution::Default, &device);
        let (_, next) = cell.forward(x.clone(), state.layer(0));

        assert_eq!(to_vec(next.time_shift), to_vec(x));
        assert_eq!(
            to_vec(next.channel_shift),
            to_vec(state.layer(0).channel_shift.clone())
        );
    }

    #[test]
    fn test_other_layers_untouched() {
        let device = Default::default();

        for variant in [TimeMixVariant::Gated, TimeMixVariant::Reduced] {
            let cell = create_cell(variant, 1);
            let state = random_state(variant, 2);
            let before = state.clone();

            let x = Tensor::<Backend, 2>::random([2, 64], Distribution::Default, &device);
            let (_, after) = cell.forward_state(x, state).unwrap();

            for layer_id in [0, 2] {
                let old = before.layer(layer_id);
                let new = after.layer(layer_id);
                assert_eq!(to_vec(old.time_shift.clone()), to_vec(new.time_shift.clone()));
                assert_eq!(
                    to_vec(old.channel_shift.clone()),
                    to_vec(new.channel_shift.clone())
                );
                assert_eq!(to_vec(old.wkv.clone()), to_vec(new.wkv.clone()));
            }

            // the caller's copy of the old state is still the old state
            assert_ne!(
                to_vec(before.layer(1).time_shift.clone()),
                to_vec(after.layer(1).time_shift.clone())
            );
        }
    }

    #[test]
    fn test_forward_state_rejects_short_state() {
        let device = Default::default();

        for variant in [TimeMixVariant::Gated, TimeMixVariant::Reduced] {
            // cell of layer 1 against a single-layer state
            let cell = create_cell(variant, 1);
            let short = RwkvConfig::new(64, 1)
                .with_head_size(32)
                .with_variant(variant);
            let state = RwkvState::<Backend>::zeros(&short, 2, &device);

            let x = Tensor::<Backend, 2>::random([2, 64], Distribution::Default, &device);
            let result = cell.forward_state(x, state);

            assert!(matches!(
                result,
                Err(RwkvError::ShapeMismatch { what: "state layers", .. })
            ));
        }
    }

    #[test]
    fn test_zero_accumulator_becomes_outer_product() {
        let device = Default::default();
        let config = config(TimeMixVariant::Gated);
        let mut init = ParamInitializer::new(1, 3, 64);
        let cell = TimeMixGated::<Backend>::new(&config, 0, &mut init, &device);

        let x = Tensor::<Backend, 2>::random([1, 64], Distribution::Default, &device);
        let state = LayerState::zeros(&config, 1, &device);
        let sx = state.time_shift.clone() - x.clone();

        let (inputs, _) = cell.prepare(x.clone(), sx);
        let k = to_vec(inputs.key);
        let v = to_vec(inputs.value);

        let (_, next) = cell.forward(x, &state);
        let wkv = to_vec(next.wkv);

        let s = 32;
        for h in 0..2 {
            for i in 0..s {
                for j in 0..s {
                    let expected = k[h * s + i] * v[h * s + j];
                    let actual = wkv[(h * s + i) * s + j];
                    assert!(
                        (expected - actual).abs() < 1e-5 * (1.0 + expected.abs()),
                        "head {h} [{i}, {j}]: {expected} vs {actual}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_zero_key_keeps_accumulator_zero() {
        let device = Default::default();
        let config = config(TimeMixVariant::Reduced);
        let mut init = ParamInitializer::new(1, 3, 64);
        let mut cell = TimeMixReduced::<Backend>::new(&config, 1, &mut init, &device);
        cell.key.weight = Param::from_tensor(Tensor::zeros([64, 64], &device));

        let mut state = LayerState::zeros(&config, 2, &device);
        for _ in 0..3 {
            let x = Tensor::<Backend, 2>::random([2, 64], Distribution::Default, &device);
            let (_, next) = cell.forward(x, &state);
            state = next;
        }

        assert!(to_vec(state.wkv).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_reduced_key_scaled_by_decay() {
        let device = Default::default();
        let config = config(TimeMixVariant::Reduced);
        let mut init = ParamInitializer::new(1, 3, 64);
        let cell = TimeMixReduced::<Backend>::new(&config, 2, &mut init, &device);

        let x = Tensor::<Backend, 2>::random([1, 64], Distribution::Default, &device);
        let sx = Tensor::<Backend, 2>::zeros([1, 64], &device);
        let inputs = cell.prepare(x.clone(), sx);

        // zero shift difference: every target sees x itself
        let raw_key = to_vec(cell.key.forward(x));
        let decay = to_vec(inputs.decay);
        let key = to_vec(inputs.key);

        for n in 0..64 {
            let scale = 1.0 - (-(decay[n].exp())).exp();
            assert!((key[n] - raw_key[n] * scale).abs() < 1e-5);
        }
    }

    #[test]
    fn test_decay_inputs_inside_unit_interval() {
        let device = Default::default();
        let config = config(TimeMixVariant::Gated);
        let mut init = ParamInitializer::new(1, 3, 64);
        let cell = TimeMixGated::<Backend>::new(&config, 2, &mut init, &device);

        let x = Tensor::<Backend, 2>::random([4, 64], Distribution::Uniform(-5.0, 5.0), &device);
        let sx = Tensor::<Backend, 2>::random([4, 64], Distribution::Uniform(-5.0, 5.0), &device);
        let (inputs, _) = cell.prepare(x, sx);

        assert!(to_vec(inputs.decay).iter().all(|&w| w > 0.0 && w < 1.0));
    }

    /// Give the generators and the output projection non-zero weights, so the
    /// per-target deltas and the readout both depend on the input.
    fn randomize_projections(cell: &mut TimeMixer<Backend>) {
        let device = Default::default();
        let random = |dims: [usize; 2]| {
            Param::from_tensor(Tensor::<Backend, 2>::random(
                dims,
                Distribution::Uniform(-0.5, 0.5),
                &device,
            ))
        };

        match cell {
            TimeMixer::Gated(cell) => {
                cell.mix.w1 = random(cell.mix.w1.dims());
                cell.decay.w1 = random(cell.decay.w1.dims());
                cell.output.weight = random(cell.output.weight.dims());
            }
            TimeMixer::Reduced(cell) => {
                cell.mix.w1 = random(cell.mix.w1.dims());
                cell.decay.w1 = random(cell.decay.w1.dims());
                cell.output.weight = random(cell.output.weight.dims());
            }
        }
    }

    fn batch_row(layer: &LayerState<Backend>, row: usize) -> LayerState<Backend> {
        LayerState {
            channel_shift: layer.channel_shift.clone().slice([row..row + 1, 0..64]),
            time_shift: layer.time_shift.clone().slice([row..row + 1, 0..64]),
            wkv: layer.wkv.clone().slice([row..row + 1, 0..2, 0..32, 0..32]),
        }
    }

    #[test]
    fn test_batch_rows_independent() {
        let device = Default::default();

        for variant in [TimeMixVariant::Gated, TimeMixVariant::Reduced] {
            let mut cell = create_cell(variant, 1);
            randomize_projections(&mut cell);

            let state = random_state(variant, 2);
            let layer = state.layer(1);
            let x = Tensor::<Backend, 2>::random([2, 64], Distribution::Default, &device);

            let (both, both_state) = cell.forward(x.clone(), layer);
            let both = to_vec(both);
            assert!(
                both.iter().any(|v| v.abs() > 1e-3),
                "{variant:?}: output must not vanish"
            );

            for row in 0..2 {
                let (single, single_state) = cell.forward(
                    x.clone().slice([row..row + 1, 0..64]),
                    &batch_row(layer, row),
                );

                let single = to_vec(single);
                for n in 0..64 {
                    let batched = both[row * 64 + n];
                    assert!(
                        (batched - single[n]).abs() < 1e-4,
                        "{variant:?} row {row} channel {n}: {batched} vs {}",
                        single[n]
                    );
                }

                let expected = to_vec(batch_row(&both_state, row).wkv);
                for (a, b) in to_vec(single_state.wkv).iter().zip(&expected) {
                    assert!((a - b).abs() < 1e-4, "{variant:?} row {row} accumulator");
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let device = Default::default();

        for variant in [TimeMixVariant::Gated, TimeMixVariant::Reduced] {
            let cell = create_cell(variant, 0);
            let state = random_state(variant, 2);
            let x = Tensor::<Backend, 2>::random([2, 64], Distribution::Default, &device);

            let (y1, s1) = cell.forward(x.clone(), state.layer(0));
            let (y2, s2) = cell.forward(x, state.layer(0));

            assert_eq!(to_vec(y1), to_vec(y2));
            assert_eq!(to_vec(s1.wkv), to_vec(s2.wkv));
        }
    }
}
