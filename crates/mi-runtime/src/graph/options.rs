use mi_quant::FusedActivation;

/// Spatial padding scheme for windowed operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    #[default]
    Same,
    Valid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2DOptions {
    pub padding: Padding,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub activation: FusedActivation,
}

impl Default for Conv2DOptions {
    fn default() -> Self {
        Conv2DOptions {
            padding: Padding::Valid,
            stride_h: 1,
            stride_w: 1,
            dilation_h: 1,
            dilation_w: 1,
            activation: FusedActivation::None,
        }
    }
}

/// Operator-specific options record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpOptions {
    #[default]
    None,
    Arithmetic {
        activation: FusedActivation,
    },
    Conv2D(Conv2DOptions),
    FullyConnected {
        activation: FusedActivation,
        keep_num_dims: bool,
    },
    Reshape {
        new_shape: Option<Vec<i32>>,
    },
    If {
        then_subgraph: usize,
        else_subgraph: usize,
    },
    While {
        cond_subgraph: usize,
        body_subgraph: usize,
    },
}

impl OpOptions {
    /// Fused activation carried by the options, `None` when there is none.
    pub fn activation(&self) -> FusedActivation {
        match self {
            OpOptions::Arithmetic { activation } | OpOptions::FullyConnected { activation, .. } => {
                *activation
            }
            OpOptions::Conv2D(c) => c.activation,
            _ => FusedActivation::None,
        }
    }
}
