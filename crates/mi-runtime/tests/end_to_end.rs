mod common;

use approx::assert_relative_eq;
use mi_runtime::{
    BufferState, Conv2DOptions, ErrorKind, Graph, Interpreter, OpCode, OpOptions, Operator,
    Padding, RuntimeConfig, SubgraphBuilder,
};
use mi_quant::FusedActivation;
use mi_tensor::{DType, Quantization, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{desc, f32_desc, interpreter, output, shared};

fn add_square() -> (mi_runtime::Subgraph, usize, usize) {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[2, 2]));
    let y = b.input(f32_desc(&[2, 2]));
    let sum = b.tensor(f32_desc(&[2, 2]));
    let out = b.tensor(f32_desc(&[2, 2]));
    b.op(Operator::new(OpCode::Add, &[x, y], &[sum]))
        .op(Operator::new(OpCode::Square, &[sum], &[out]))
        .output(out);
    (b.build(), sum, out)
}

#[test]
fn test_add_then_square() {
    let (sg, _, _) = add_square();
    let mut interp = interpreter(vec![sg], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[1.0f32, 2.0, 3.0, 4.0])).unwrap();
    interp.set_input(0, 1, shared(&[5.0f32, 6.0, 7.0, 8.0])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<f32>(&interp, 0), vec![36.0, 64.0, 100.0, 144.0]);
    assert_eq!(interp.output_shape(0, 0).unwrap().dims(), &[2, 2]);
}

#[test]
fn test_square_runs_in_place() {
    let (sg, sum, out) = add_square();
    let mut interp = interpreter(vec![sg], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[1.0f32; 4])).unwrap();
    interp.set_input(0, 1, shared(&[1.0f32; 4])).unwrap();
    interp.execute(0).unwrap();

    let buffers = interp.buffer_manager(0).unwrap();
    assert_eq!(buffers.state(sum), Some(&BufferState::Released { owner: out }));
    let addr = buffers.buffer_address(out).unwrap();
    assert_eq!(buffers.holders(addr), vec![out]);
    assert_eq!(output::<f32>(&interp, 0), vec![4.0; 4]);
}

#[test]
fn test_in_place_disabled_keeps_buffers_apart() {
    let (sg, sum, out) = add_square();
    let mut interp = interpreter(vec![sg], RuntimeConfig::default().with_in_place(false));
    interp.set_input(0, 0, shared(&[1.0f32; 4])).unwrap();
    interp.set_input(0, 1, shared(&[2.0f32; 4])).unwrap();
    interp.execute(0).unwrap();
    let buffers = interp.buffer_manager(0).unwrap();
    assert!(matches!(buffers.state(sum), Some(BufferState::Arena(_))));
    assert_ne!(buffers.buffer_address(sum), buffers.buffer_address(out));
    assert_eq!(output::<f32>(&interp, 0), vec![9.0; 4]);
}

#[test]
fn test_random_inputs_match_reference() {
    let (sg, _, _) = add_square();
    let mut interp = interpreter(vec![sg], RuntimeConfig::default());
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..10 {
        let x: Vec<f32> = (0..4).map(|_| rng.gen_range(-10.0..10.0)).collect();
        let y: Vec<f32> = (0..4).map(|_| rng.gen_range(-10.0..10.0)).collect();
        interp.set_input(0, 0, shared(&x)).unwrap();
        interp.copy_input(0, 1, bytemuck::cast_slice(&y)).unwrap();
        interp.execute(0).unwrap();
        for (got, (a, b)) in output::<f32>(&interp, 0).iter().zip(x.iter().zip(&y)) {
            assert_relative_eq!(*got, (a + b) * (a + b), epsilon = 1e-4);
        }
    }
}

#[test]
fn test_arena_limit() {
    let (sg, _, _) = add_square();
    let mut interp =
        Interpreter::new(Graph::new(vec![sg]), RuntimeConfig::default().with_arena_limit(8)).unwrap();
    let err = interp.configure(0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
    assert!(!interp.is_configured(0));
}

#[test]
fn test_broadcast_add() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[2, 1]));
    let y = b.input(f32_desc(&[3]));
    let out = b.tensor(f32_desc(&[2, 3]));
    b.op(Operator::new(OpCode::Add, &[x, y], &[out])).output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[1.0f32, 2.0])).unwrap();
    interp.set_input(0, 1, shared(&[10.0f32, 20.0, 30.0])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<f32>(&interp, 0), vec![11.0, 21.0, 31.0, 12.0, 22.0, 32.0]);
}

#[test]
fn test_incompatible_broadcast_fails_configure() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[2, 3]));
    let y = b.input(f32_desc(&[4]));
    let out = b.tensor(f32_desc(&[2, 4]));
    b.op(Operator::new(OpCode::Mul, &[x, y], &[out])).output(out);
    let mut interp = Interpreter::new(Graph::new(vec![b.build()]), RuntimeConfig::default()).unwrap();
    let err = interp.configure(0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
}

#[test]
fn test_mixed_types_fail_configure() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[2]));
    let y = b.input(desc(DType::I32, &[2]));
    let out = b.tensor(f32_desc(&[2]));
    b.op(Operator::new(OpCode::Sub, &[x, y], &[out])).output(out);
    let mut interp = Interpreter::new(Graph::new(vec![b.build()]), RuntimeConfig::default()).unwrap();
    assert_eq!(interp.configure(0).unwrap_err().kind(), ErrorKind::TypeMismatch);
}

#[test]
fn test_integer_add_with_relu6() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(desc(DType::I32, &[4]));
    let c = b.constant(Tensor::from_slice(&[1i32, 1, 1, 1], [4]).unwrap());
    let out = b.tensor(desc(DType::I32, &[4]));
    b.op(Operator::new(OpCode::Add, &[x, c], &[out]).with_options(OpOptions::Arithmetic {
        activation: FusedActivation::Relu6,
    }))
    .output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[-5i32, 2, 5, 40])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<i32>(&interp, 0), vec![0, 3, 6, 6]);
}

#[test]
fn test_quantized_add() {
    let q = || Quantization::per_tensor(0.1, 0);
    let mut b = SubgraphBuilder::new();
    let x = b.input(desc(DType::I8, &[4]).with_quantization(q()));
    let y = b.input(desc(DType::I8, &[4]).with_quantization(q()));
    let out = b.tensor(desc(DType::I8, &[4]).with_quantization(q()));
    b.op(Operator::new(OpCode::Add, &[x, y], &[out])).output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[10i8, 20, -30, 100])).unwrap();
    interp.set_input(0, 1, shared(&[20i8, 20, 10, 100])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<i8>(&interp, 0), vec![30, 40, -20, 127]);
}

#[test]
fn test_quantized_tanh_rejected() {
    let q = || Quantization::per_tensor(0.1, 0);
    let mut b = SubgraphBuilder::new();
    let x = b.input(desc(DType::I8, &[2]).with_quantization(q()));
    let y = b.input(desc(DType::I8, &[2]).with_quantization(q()));
    let out = b.tensor(desc(DType::I8, &[2]).with_quantization(q()));
    b.op(Operator::new(OpCode::Add, &[x, y], &[out]).with_options(OpOptions::Arithmetic {
        activation: FusedActivation::Tanh,
    }))
    .output(out);
    let mut interp = Interpreter::new(Graph::new(vec![b.build()]), RuntimeConfig::default()).unwrap();
    assert_eq!(interp.configure(0).unwrap_err().kind(), ErrorKind::UnsupportedType);
}

#[test]
fn test_less_then_select_is_min() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[3]));
    let y = b.constant(Tensor::from_slice(&[2.0f32, 2.0, 2.0], [3]).unwrap());
    let cond = b.tensor(desc(DType::Bool, &[3]));
    let out = b.tensor(f32_desc(&[3]));
    b.op(Operator::new(OpCode::Less, &[x, y], &[cond]))
        .op(Operator::new(OpCode::Select, &[cond, x, y], &[out]))
        .output(out)
        .output(cond);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[1.0f32, 5.0, 3.0])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<f32>(&interp, 0), vec![1.0, 2.0, 2.0]);
    assert_eq!(interp.get_output(0, 1).unwrap(), &[1, 0, 0]);
}

#[test]
fn test_fully_connected_f32_with_relu() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[1, 3]));
    let w = b.constant(Tensor::from_slice(&[1.0f32, 0.0, 1.0, 0.0, 1.0, 0.0], [2, 3]).unwrap());
    let bias = b.constant(Tensor::from_slice(&[0.5f32, -3.0], [2]).unwrap());
    let out = b.tensor(f32_desc(&[1, 2]));
    b.op(
        Operator::new(OpCode::FullyConnected, &[x, w, bias], &[out]).with_options(
            OpOptions::FullyConnected {
                activation: FusedActivation::Relu,
                keep_num_dims: false,
            },
        ),
    )
    .output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[1.0f32, 2.0, 3.0])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<f32>(&interp, 0), vec![4.5, 0.0]);
}

#[test]
fn test_fully_connected_i8_per_channel() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(desc(DType::I8, &[1, 2]).with_quantization(Quantization::per_tensor(0.5, 0)));
    let w = b.constant(
        Tensor::from_slice(&[2i8, 2, 4, -4], [2, 2])
            .unwrap()
            .with_quantization(Quantization::per_channel(vec![0.5, 0.25], vec![0, 0], 0))
            .unwrap(),
    );
    let out = b.tensor(desc(DType::I8, &[1, 2]).with_quantization(Quantization::per_tensor(0.5, 0)));
    let mut op = Operator::new(OpCode::FullyConnected, &[x, w], &[out]);
    op.inputs.push(None);
    b.op(op).output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[2i8, 4])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<i8>(&interp, 0), vec![6, -2]);
}

#[test]
fn test_conv2d_same_padding() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[1, 3, 3, 1]));
    let w = b.constant(Tensor::from_slice(&[1.0f32; 9], [1, 3, 3, 1]).unwrap());
    let out = b.tensor(f32_desc(&[1, 3, 3, 1]));
    b.op(
        Operator::new(OpCode::Conv2D, &[x, w], &[out]).with_options(OpOptions::Conv2D(Conv2DOptions {
            padding: Padding::Same,
            ..Default::default()
        })),
    )
    .output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    let input: Vec<f32> = (1..=9).map(|v| v as f32).collect();
    interp.set_input(0, 0, shared(&input)).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(
        output::<f32>(&interp, 0),
        vec![12.0, 21.0, 16.0, 27.0, 45.0, 33.0, 24.0, 39.0, 28.0]
    );
}

#[test]
fn test_conv2d_i8_per_channel() {
    let unit = || Quantization::per_tensor(1.0, 0);
    let mut b = SubgraphBuilder::new();
    let x = b.input(desc(DType::I8, &[1, 2, 2, 1]).with_quantization(unit()));
    let w = b.constant(
        Tensor::from_slice(&[3i8, 4], [2, 1, 1, 1])
            .unwrap()
            .with_quantization(Quantization::per_channel(vec![1.0, 0.5], vec![0, 0], 0))
            .unwrap(),
    );
    let bias = b.constant(Tensor::from_slice(&[1i32, 0], [2]).unwrap());
    let out = b.tensor(desc(DType::I8, &[1, 2, 2, 2]).with_quantization(unit()));
    b.op(Operator::new(OpCode::Conv2D, &[x, w, bias], &[out])).output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[1i8, 2, 3, 4])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<i8>(&interp, 0), vec![4, 2, 7, 4, 10, 6, 13, 8]);
}

#[test]
fn test_conv2d_filter_channel_mismatch() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[1, 3, 3, 2]));
    let w = b.constant(Tensor::from_slice(&[1.0f32; 9], [1, 3, 3, 1]).unwrap());
    let out = b.tensor(f32_desc(&[1, 1, 1, 1]));
    b.op(Operator::new(OpCode::Conv2D, &[x, w], &[out])).output(out);
    let mut interp = Interpreter::new(Graph::new(vec![b.build()]), RuntimeConfig::default()).unwrap();
    assert_eq!(interp.configure(0).unwrap_err().kind(), ErrorKind::ShapeMismatch);
}

#[test]
fn test_quantize_dequantize_saturates() {
    let params = || Quantization::per_tensor(0.5, -1);
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[4]));
    let q = b.tensor(desc(DType::I8, &[4]).with_quantization(params()));
    let out = b.tensor(f32_desc(&[4]));
    b.op(Operator::new(OpCode::Quantize, &[x], &[q]))
        .op(Operator::new(OpCode::Dequantize, &[q], &[out]))
        .output(out)
        .output(q);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[-1.0f32, 0.0, 0.5, 100.0])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<i8>(&interp, 1), vec![-3, -1, 0, 127]);
    assert_eq!(output::<f32>(&interp, 0), vec![-1.0, 0.0, 0.5, 64.0]);
}

#[test]
fn test_unsupported_type() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(desc(DType::I16, &[2]));
    let out = b.tensor(desc(DType::I16, &[2]));
    b.op(Operator::new(OpCode::Abs, &[x], &[out])).output(out);
    let mut interp = Interpreter::new(Graph::new(vec![b.build()]), RuntimeConfig::default()).unwrap();
    assert_eq!(interp.configure(0).unwrap_err().kind(), ErrorKind::UnsupportedType);
}

#[test]
fn test_operator_errors_carry_location() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[2]));
    let y = b.tensor(f32_desc(&[2]));
    let z = b.tensor(desc(DType::I32, &[2]));
    b.op(Operator::new(OpCode::Neg, &[x], &[y]))
        .op(Operator::new(OpCode::Abs, &[y], &[z]))
        .output(z);
    let mut interp = Interpreter::new(Graph::new(vec![b.build()]), RuntimeConfig::default()).unwrap();
    let err = interp.configure(0).unwrap_err();
    assert!(matches!(
        err,
        mi_runtime::RuntimeError::Operator {
            subgraph: 0,
            index: 1,
            op: OpCode::Abs,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}
