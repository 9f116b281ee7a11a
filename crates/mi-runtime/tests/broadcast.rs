mod common;

use mi_runtime::{Graph, Interpreter, OpCode, Operator, RuntimeConfig, SubgraphBuilder};
use mi_tensor::Shape;
use proptest::prelude::*;

use common::{f32_desc, init_logging, shared};

/// Broadcast-compatible shape pairs; the second may have fewer axes.
fn shape_pair() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    prop::collection::vec(1usize..4, 1..4)
        .prop_flat_map(|out| {
            let n = out.len();
            (
                Just(out),
                prop::collection::vec(any::<bool>(), n),
                prop::collection::vec(any::<bool>(), n),
                0..=n,
            )
        })
        .prop_map(|(out, ones_a, ones_b, drop)| {
            let collapse = |ones: &[bool]| -> Vec<usize> {
                out.iter().zip(ones).map(|(&d, &one)| if one { 1 } else { d }).collect()
            };
            let a = collapse(&ones_a);
            let b = collapse(&ones_b).into_iter().skip(drop).collect();
            (a, b)
        })
}

fn source_index(coords: &[usize], dims: &[usize]) -> usize {
    let lead = coords.len() - dims.len();
    dims.iter()
        .zip(&coords[lead..])
        .fold(0, |flat, (&d, &c)| flat * d + if d == 1 { 0 } else { c })
}

fn reference_sum(a: &[f32], a_dims: &[usize], b: &[f32], b_dims: &[usize], out: &Shape) -> Vec<f32> {
    let dims = out.dims();
    (0..out.numel())
        .map(|mut flat| {
            let mut coords = vec![0usize; dims.len()];
            for axis in (0..dims.len()).rev() {
                coords[axis] = flat % dims[axis];
                flat /= dims[axis];
            }
            a[source_index(&coords, a_dims)] + b[source_index(&coords, b_dims)]
        })
        .collect()
}

proptest! {
    #[test]
    fn test_add_matches_reference((a_dims, b_dims) in shape_pair()) {
        init_logging();
        let (sa, sb) = (Shape::from_slice(&a_dims), Shape::from_slice(&b_dims));
        let out_shape = Shape::broadcast_shape(&sa, &sb).unwrap();

        let mut builder = SubgraphBuilder::new();
        let x = builder.input(f32_desc(&a_dims));
        let y = builder.input(f32_desc(&b_dims));
        let out = builder.tensor(f32_desc(out_shape.dims()));
        builder.op(Operator::new(OpCode::Add, &[x, y], &[out])).output(out);
        let mut interp = Interpreter::new(Graph::new(vec![builder.build()]), RuntimeConfig::default()).unwrap();
        interp.configure(0).unwrap();

        let a: Vec<f32> = (0..sa.numel()).map(|v| v as f32).collect();
        let b: Vec<f32> = (0..sb.numel()).map(|v| 100.0 * v as f32).collect();
        interp.set_input(0, 0, shared(&a)).unwrap();
        interp.set_input(0, 1, shared(&b)).unwrap();
        interp.execute(0).unwrap();

        let got = interp.output_tensor(0, 0).unwrap();
        prop_assert_eq!(got.shape().dims(), out_shape.dims());
        prop_assert_eq!(
            got.as_slice::<f32>().unwrap().to_vec(),
            reference_sum(&a, &a_dims, &b, &b_dims, &out_shape)
        );
    }
}
