use std::thread;

use anyhow::Result;
use candle_core::{Device, Tensor};
use stackgrad::layers::ParamInit;
use stackgrad::model::{dense_network, DenseNetworkConfig};
use stackgrad::recurrent::{lstm_network, RecurrentConfig};

#[test]
fn one_stack_serves_threads_with_their_own_parameters() -> Result<()> {
    let device = Device::Cpu;
    let config = DenseNetworkConfig {
        input_features: 6,
        hidden_features: vec![8, 3],
        classifier: true,
        init: ParamInit::XavierUniform,
        ..Default::default()
    };
    let (stack, shared) = dense_network(&config, &device)?;
    let (_, other) = dense_network(&config, &device)?;
    let input = Tensor::randn(0f32, 1.0, (4, 6), &device)?;
    let expected = stack.forward(&shared, &input)?.flatten_all()?.to_vec1::<f32>()?;

    let outputs = thread::scope(|scope| {
        let handles: Vec<_> = [&shared, &other]
            .into_iter()
            .map(|params| {
                let stack = &stack;
                let input = &input;
                scope.spawn(move || -> stackgrad::Result<Vec<f32>> {
                    Ok(stack.forward(params, input)?.flatten_all()?.to_vec1::<f32>()?)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect::<stackgrad::Result<Vec<_>>>()
    })?;

    assert_eq!(outputs[0], expected);
    assert_ne!(outputs[1], expected);
    Ok(())
}

#[test]
fn lstm_engine_is_shareable_across_threads() -> Result<()> {
    fn assert_send_sync<T: Send + Sync>(_: &T) {}

    let device = Device::Cpu;
    let (lstm, params) = lstm_network(RecurrentConfig::new(2, 3), &device)?;
    assert_send_sync(&lstm);
    assert_send_sync(&params);

    let input = Tensor::ones((1, 4, 2), candle_core::DType::F32, &device)?;
    let state = thread::scope(|scope| {
        scope
            .spawn(|| lstm.forward(&params, &input, None))
            .join()
            .expect("worker panicked")
    })?;
    assert_eq!(state.1.h.dims(), &[1, 3]);
    Ok(())
}

#[test]
fn forced_cpu_device_is_honoured() -> Result<()> {
    assert!(matches!(stackgrad::select_device(true)?, Device::Cpu));
    Ok(())
}
