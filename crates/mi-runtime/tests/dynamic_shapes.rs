mod common;

use mi_runtime::{ErrorKind, OpCode, Operator, RuntimeConfig, Subgraph, SubgraphBuilder};
use mi_tensor::{DType, Tensor};

use common::{desc, f32_desc, interpreter, output, shared};

/// `abs(reshape(x, shape))` with `shape` supplied at run time.
fn runtime_reshape() -> Subgraph {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[2, 3]));
    let shape = b.input(desc(DType::I32, &[2]));
    let r = b.tensor(f32_desc(&[2, 3]));
    let out = b.tensor(f32_desc(&[2, 3]));
    b.op(Operator::new(OpCode::Reshape, &[x, shape], &[r]))
        .op(Operator::new(OpCode::Abs, &[r], &[out]))
        .output(out);
    b.build()
}

#[test]
fn test_reshape_follows_runtime_shape() {
    let mut interp = interpreter(vec![runtime_reshape()], RuntimeConfig::default());
    let buffers = interp.buffer_manager(0).unwrap();
    let out = interp.output_index(0, 0).unwrap();
    assert!(buffers.is_dynamic(out));

    interp.set_input(0, 0, shared(&[-1.0f32, 2.0, -3.0, 4.0, -5.0, 6.0])).unwrap();
    interp.set_input(0, 1, shared(&[3i32, -1])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(interp.output_shape(0, 0).unwrap().dims(), &[3, 2]);
    assert_eq!(output::<f32>(&interp, 0), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    interp.set_input(0, 1, shared(&[6i32, 1])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(interp.output_shape(0, 0).unwrap().dims(), &[6, 1]);
}

#[test]
fn test_reshape_rejects_bad_runtime_shape() {
    let mut interp = interpreter(vec![runtime_reshape()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[0.0f32; 6])).unwrap();
    interp.set_input(0, 1, shared(&[-1i32, -1])).unwrap();
    assert_eq!(interp.execute(0).unwrap_err().kind(), ErrorKind::ShapeMismatch);
    assert!(!interp.is_poisoned());

    interp.set_input(0, 1, shared(&[4i32, 2])).unwrap();
    assert_eq!(interp.execute(0).unwrap_err().kind(), ErrorKind::ShapeMismatch);

    interp.set_input(0, 1, shared(&[1i32, 6])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(interp.output_shape(0, 0).unwrap().dims(), &[1, 6]);
}

#[test]
fn test_dynamic_limit() {
    let config = RuntimeConfig::default().with_dynamic_limit(8);
    let mut interp = interpreter(vec![runtime_reshape()], config);
    interp.set_input(0, 0, shared(&[0.0f32; 6])).unwrap();
    interp.set_input(0, 1, shared(&[2i32, 3])).unwrap();
    assert_eq!(interp.execute(0).unwrap_err().kind(), ErrorKind::AllocationFailure);
    assert!(!interp.is_poisoned());
}

#[test]
fn test_constant_shape_stays_static() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[2, 3]));
    let shape = b.constant(Tensor::from_slice(&[-1i32], [1]).unwrap());
    let out = b.tensor(f32_desc(&[6]));
    b.op(Operator::new(OpCode::Reshape, &[x, shape], &[out])).output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    assert!(!interp.buffer_manager(0).unwrap().is_dynamic(out));

    let values: Vec<f32> = (0..6).map(|v| v as f32).collect();
    interp.set_input(0, 0, shared(&values)).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<f32>(&interp, 0), values);
}

#[test]
fn test_slice_with_runtime_begin() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[3, 4]));
    let begin = b.input(desc(DType::I32, &[2]));
    let size = b.constant(Tensor::from_slice(&[2i32, -1], [2]).unwrap());
    let out = b.tensor(f32_desc(&[2, 3]));
    b.op(Operator::new(OpCode::Slice, &[x, begin, size], &[out])).output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    assert!(interp.buffer_manager(0).unwrap().is_dynamic(out));

    let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
    interp.set_input(0, 0, shared(&values)).unwrap();
    interp.set_input(0, 1, shared(&[1i32, 1])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(interp.output_shape(0, 0).unwrap().dims(), &[2, 3]);
    assert_eq!(output::<f32>(&interp, 0), vec![5.0, 6.0, 7.0, 9.0, 10.0, 11.0]);

    interp.set_input(0, 1, shared(&[0i32, 3])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(interp.output_shape(0, 0).unwrap().dims(), &[2, 1]);
    assert_eq!(output::<f32>(&interp, 0), vec![3.0, 7.0]);

    interp.set_input(0, 1, shared(&[2i32, 0])).unwrap();
    assert_eq!(interp.execute(0).unwrap_err().kind(), ErrorKind::ShapeMismatch);
}

#[test]
fn test_constant_slice_window_checked_at_configure() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[3, 4]));
    let begin = b.constant(Tensor::from_slice(&[0i32, 0], [2]).unwrap());
    let size = b.constant(Tensor::from_slice(&[2i32, 2], [2]).unwrap());
    let out = b.tensor(f32_desc(&[2, 3]));
    b.op(Operator::new(OpCode::Slice, &[x, begin, size], &[out])).output(out);
    let mut interp =
        mi_runtime::Interpreter::new(mi_runtime::Graph::new(vec![b.build()]), RuntimeConfig::default())
            .unwrap();
    assert_eq!(interp.configure(0).unwrap_err().kind(), ErrorKind::ShapeMismatch);
}

#[test]
fn test_reshape_rejects_overflowing_runtime_shape() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[2, 3]));
    let shape = b.input(desc(DType::I64, &[2]));
    let out = b.tensor(f32_desc(&[2, 3]));
    b.op(Operator::new(OpCode::Reshape, &[x, shape], &[out])).output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[0.0f32; 6])).unwrap();

    for requested in [[i64::MAX, 4], [i64::MAX, -1], [i64::MIN, 1]] {
        interp.set_input(0, 1, shared(&requested)).unwrap();
        assert_eq!(interp.execute(0).unwrap_err().kind(), ErrorKind::ShapeMismatch);
    }
    assert!(!interp.is_poisoned());

    interp.set_input(0, 1, shared(&[3i64, 2])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(interp.output_shape(0, 0).unwrap().dims(), &[3, 2]);
}

#[test]
fn test_slice_rejects_extreme_runtime_window() {
    let mut b = SubgraphBuilder::new();
    let x = b.input(f32_desc(&[4]));
    let begin = b.input(desc(DType::I64, &[1]));
    let size = b.input(desc(DType::I64, &[1]));
    let out = b.tensor(f32_desc(&[4]));
    b.op(Operator::new(OpCode::Slice, &[x, begin, size], &[out])).output(out);
    let mut interp = interpreter(vec![b.build()], RuntimeConfig::default());
    interp.set_input(0, 0, shared(&[0.0f32, 1.0, 2.0, 3.0])).unwrap();

    for (b, s) in [(i64::MAX, 1), (i64::MIN, -1), (1, i64::MAX), (-1, 1)] {
        interp.set_input(0, 1, shared(&[b])).unwrap();
        interp.set_input(0, 2, shared(&[s])).unwrap();
        assert_eq!(interp.execute(0).unwrap_err().kind(), ErrorKind::ShapeMismatch);
    }
    assert!(!interp.is_poisoned());

    interp.set_input(0, 1, shared(&[2i64])).unwrap();
    interp.set_input(0, 2, shared(&[-1i64])).unwrap();
    interp.execute(0).unwrap();
    assert_eq!(output::<f32>(&interp, 0), vec![2.0, 3.0]);
}
