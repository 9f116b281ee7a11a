//! Zero-point offsets in the sign convention the integer kernels add them.
//!
//! Inputs and filters are shifted by `-zero_point` before accumulation,
//! outputs by `+zero_point` after requantization.

use mi_tensor::QuantParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputOffset(i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterOffset(i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputOffset(i32);

impl InputOffset {
    pub fn new(params: QuantParams) -> Self {
        Self(-params.zero_point)
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl FilterOffset {
    pub fn new(params: QuantParams) -> Self {
        Self(-params.zero_point)
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl OutputOffset {
    pub fn new(params: QuantParams) -> Self {
        Self(params.zero_point)
    }

    pub fn value(self) -> i32 {
        self.0
    }
}
