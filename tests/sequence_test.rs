#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, Tensor};
    use rwkv_rnn::config::RwkvConfig;
    use rwkv_rnn::rnn::{SequenceModel, SequenceModelConfig};

    type Backend = NdArray<f32>;

    fn create_model() -> SequenceModel<Backend> {
        let device = Default::default();
        SequenceModelConfig::new(RwkvConfig::new(64, 2).with_head_size(32), 8, 10)
            .init(&device)
            .unwrap()
    }

    fn to_vec<const D: usize>(tensor: Tensor<Backend, D>) -> Vec<f32> {
        tensor.into_data().to_vec().unwrap()
    }

    fn assert_close(actual: Vec<f32>, expected: Vec<f32>) {
        for (a, b) in actual.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn test_sequence_model_forward() {
        let device = Default::default();
        let model = create_model();

        let input = Tensor::<Backend, 3>::random([4, 12, 8], Distribution::Default, &device);
        let (output, state) = model.forward(input, None).unwrap();

        assert_eq!(output.dims(), [4, 10]);
        assert_eq!(state.to_flat().dims(), [4, 2 * 34, 64]);
        assert!(to_vec(output).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_split_sequence_matches_whole() {
        let device = Default::default();
        let model = create_model();

        let input = Tensor::<Backend, 3>::random([2, 10, 8], Distribution::Default, &device);
        let head = input.clone().slice([0..2, 0..4, 0..8]);
        let tail = input.clone().slice([0..2, 4..10, 0..8]);

        let (whole, whole_state) = model.forward(input, None).unwrap();
        let (_, state) = model.forward(head, None).unwrap();
        let (split, split_state) = model.forward(tail, Some(state)).unwrap();

        assert_close(to_vec(split), to_vec(whole));
        assert_close(to_vec(split_state.to_flat()), to_vec(whole_state.to_flat()));
    }

    #[test]
    fn test_last_step_of_sequence_output_matches_forward() {
        let device = Default::default();
        let model = create_model();

        let input = Tensor::<Backend, 3>::random([3, 5, 8], Distribution::Default, &device);
        let (last, _) = model.forward(input.clone(), None).unwrap();
        let (all, _) = model.forward_sequence(input, None).unwrap();

        assert_eq!(all.dims(), [3, 5, 10]);
        let final_step = all.slice([0..3, 4..5, 0..10]).reshape([3, 10]);
        assert_close(to_vec(final_step), to_vec(last));
    }

    #[test]
    fn test_seq_first_matches_batch_first() {
        let device = Default::default();
        let model = create_model();

        let input = Tensor::<Backend, 3>::random([2, 6, 8], Distribution::Default, &device);
        let (batch_first, _) = model.forward(input.clone(), None).unwrap();

        let model = model.with_batch_first(false);
        assert!(!model.batch_first());
        let (seq_first, _) = model.forward(input.swap_dims(0, 1), None).unwrap();

        assert_close(to_vec(seq_first), to_vec(batch_first));
    }

    #[test]
    fn test_step_by_step_matches_forward() {
        let device = Default::default();
        let model = create_model();

        let input = Tensor::<Backend, 3>::random([2, 3, 8], Distribution::Default, &device);
        let (expected, _) = model.forward(input.clone(), None).unwrap();

        let mut state = model.rwkv.zero_state(2, &device);
        let mut last = None;
        for t in 0..3 {
            let step = input.clone().slice([0..2, t..t + 1, 0..8]).reshape([2, 8]);
            let (output, next) = model.step(step, state).unwrap();
            state = next;
            last = Some(output);
        }
        let actual = model.readout.forward(last.unwrap());

        assert_close(to_vec(actual), to_vec(expected));
    }
}
