#![allow(dead_code)]

use mi_runtime::{Graph, Interpreter, RuntimeConfig, Subgraph};
use mi_tensor::{AlignedBuf, DType, Element, Shape, SharedBuffer, TensorDescriptor};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn desc(dtype: DType, dims: &[usize]) -> TensorDescriptor {
    TensorDescriptor::new(dtype, Shape::from_slice(dims))
}

pub fn f32_desc(dims: &[usize]) -> TensorDescriptor {
    desc(DType::F32, dims)
}

pub fn shared<T: Element>(values: &[T]) -> SharedBuffer {
    AlignedBuf::from_elements(values).unwrap().into_shared()
}

pub fn interpreter(subgraphs: Vec<Subgraph>, config: RuntimeConfig) -> Interpreter {
    init_logging();
    let mut interp = Interpreter::new(Graph::new(subgraphs), config).unwrap();
    interp.configure(0).unwrap();
    interp
}

pub fn output<T: Element>(interp: &Interpreter, slot: usize) -> Vec<T> {
    interp
        .output_tensor(0, slot)
        .unwrap()
        .as_slice::<T>()
        .unwrap()
        .to_vec()
}
