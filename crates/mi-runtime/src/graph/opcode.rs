use std::fmt;

use crate::error::{Result, RuntimeError};

/// The closed set of operators the interpreter dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Add,
    Sub,
    Mul,
    Abs,
    Neg,
    Square,
    Relu,
    Relu6,
    Less,
    Greater,
    Equal,
    NotEqual,
    Select,
    Reshape,
    Slice,
    FullyConnected,
    Conv2D,
    Quantize,
    Dequantize,
    If,
    While,
}

impl OpCode {
    pub const COUNT: usize = 21;

    pub const ALL: [OpCode; OpCode::COUNT] = [
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Abs,
        OpCode::Neg,
        OpCode::Square,
        OpCode::Relu,
        OpCode::Relu6,
        OpCode::Less,
        OpCode::Greater,
        OpCode::Equal,
        OpCode::NotEqual,
        OpCode::Select,
        OpCode::Reshape,
        OpCode::Slice,
        OpCode::FullyConnected,
        OpCode::Conv2D,
        OpCode::Quantize,
        OpCode::Dequantize,
        OpCode::If,
        OpCode::While,
    ];

    /// Dense index into dispatch tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The TFLite `BuiltinOperator` code.
    pub fn builtin(self) -> u32 {
        match self {
            OpCode::Add => 0,
            OpCode::Conv2D => 3,
            OpCode::Dequantize => 6,
            OpCode::FullyConnected => 9,
            OpCode::Mul => 18,
            OpCode::Relu => 19,
            OpCode::Relu6 => 21,
            OpCode::Reshape => 22,
            OpCode::Sub => 41,
            OpCode::Less => 58,
            OpCode::Neg => 59,
            OpCode::Greater => 61,
            OpCode::Slice => 65,
            OpCode::Equal => 71,
            OpCode::NotEqual => 72,
            OpCode::Square => 92,
            OpCode::Abs => 101,
            OpCode::Quantize => 114,
            OpCode::If => 118,
            OpCode::While => 119,
            OpCode::Select => 123,
        }
    }

    pub fn from_builtin(code: u32) -> Result<OpCode> {
        OpCode::ALL
            .iter()
            .copied()
            .find(|op| op.builtin() == code)
            .ok_or(RuntimeError::UnknownOpCode(code))
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Abs => "ABS",
            OpCode::Neg => "NEG",
            OpCode::Square => "SQUARE",
            OpCode::Relu => "RELU",
            OpCode::Relu6 => "RELU6",
            OpCode::Less => "LESS",
            OpCode::Greater => "GREATER",
            OpCode::Equal => "EQUAL",
            OpCode::NotEqual => "NOT_EQUAL",
            OpCode::Select => "SELECT_V2",
            OpCode::Reshape => "RESHAPE",
            OpCode::Slice => "SLICE",
            OpCode::FullyConnected => "FULLY_CONNECTED",
            OpCode::Conv2D => "CONV_2D",
            OpCode::Quantize => "QUANTIZE",
            OpCode::Dequantize => "DEQUANTIZE",
            OpCode::If => "IF",
            OpCode::While => "WHILE",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
