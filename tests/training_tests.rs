use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::optim::{Optimizer, SGD};
use stackgrad::layers::{ActivationKind, ParamInit};
use stackgrad::model::{dense_network, DenseNetworkConfig};
use stackgrad::recurrent::{lstm_network, RecurrentConfig};

fn threshold_dataset(device: &Device) -> Result<(Tensor, Tensor)> {
    let inputs = Tensor::randn(0f32, 1.0, (64, 4), device)?;
    let labels = inputs
        .narrow(1, 0, 1)?
        .squeeze(1)?
        .ge(0f32)?
        .to_dtype(DType::U32)?;
    Ok((inputs, labels))
}

#[test]
fn sgd_steps_reduce_classifier_loss() -> Result<()> {
    let device = Device::Cpu;
    let config = DenseNetworkConfig {
        input_features: 4,
        hidden_features: vec![16, 2],
        activation: Some(ActivationKind::Tanh),
        classifier: true,
        init: ParamInit::XavierUniform,
        ..Default::default()
    };
    let (stack, params) = dense_network(&config, &device)?;
    let (inputs, labels) = threshold_dataset(&device)?;

    let mut sgd = SGD::new(params.vars(), 0.5)?;
    let initial = candle_nn::loss::cross_entropy(&stack.forward(&params, &inputs)?, &labels)?
        .to_vec0::<f32>()?;
    for _ in 0..40 {
        let logits = stack.forward_t(&params, &inputs, true)?;
        let loss = candle_nn::loss::cross_entropy(&logits, &labels)?;
        sgd.backward_step(&loss)?;
    }
    let trained = candle_nn::loss::cross_entropy(&stack.forward(&params, &inputs)?, &labels)?
        .to_vec0::<f32>()?;
    assert!(trained < initial, "loss went from {initial} to {trained}");
    Ok(())
}

#[test]
fn optimiser_updates_the_blocks_the_layers_read() -> Result<()> {
    let device = Device::Cpu;
    let config = DenseNetworkConfig {
        input_features: 4,
        hidden_features: vec![3, 2],
        classifier: true,
        init: ParamInit::XavierNormal,
        ..Default::default()
    };
    let (stack, params) = dense_network(&config, &device)?;
    let head_slot = stack.slot_of(stack.len() - 1).expect("head owns a block");
    let before = params.require(head_slot)?.weight().expect("W").copy()?;

    let (inputs, labels) = threshold_dataset(&device)?;
    let loss = candle_nn::loss::cross_entropy(&stack.forward(&params, &inputs)?, &labels)?;
    SGD::new(params.vars(), 0.1)?.backward_step(&loss)?;

    let after = params.require(head_slot)?.weight().expect("W");
    let moved = (after - &before)?.abs()?.sum_all()?.to_vec0::<f32>()?;
    assert!(moved > 0.0);
    Ok(())
}

#[test]
fn streamed_chunks_train_with_carried_state() -> Result<()> {
    let device = Device::Cpu;
    let config = RecurrentConfig::new(2, 4).with_init(ParamInit::XavierUniform);
    let (lstm, params) = lstm_network(config, &device)?;
    let mut sgd = SGD::new(params.vars(), 0.05)?;

    let stream = Tensor::randn(0f32, 1.0, (3, 12, 2), &device)?;
    let target = Tensor::zeros((3, 4), DType::F32, &device)?;
    let mut state = None;
    for chunk in 0..4 {
        let input = stream.narrow(1, chunk * 3, 3)?;
        let (output, next) = lstm.forward(&params, &input, state.as_ref())?;
        let loss = candle_nn::loss::mse(&output, &target)?;
        sgd.backward_step(&loss)?;
        assert_eq!(next.h.dims(), &[3, 4]);
        state = Some(next);
    }
    Ok(())
}
