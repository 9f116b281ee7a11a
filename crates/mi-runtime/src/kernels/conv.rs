//! CONV_2D over NHWC inputs with `[out_c, k_h, k_w, in_c]` filters.

use mi_quant::FusedActivation;
use mi_tensor::{DType, Shape};

use crate::access::{MisoData, MisoKernel};
use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{Conv2DOptions, OpCode, OpOptions, Operator, Padding};
use crate::kernels::{OpData, QuantizedAccumulation};
use crate::registry::KernelRegistration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvGeometry {
    pub batches: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub in_c: usize,
    pub k_h: usize,
    pub k_w: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub out_c: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conv2DData {
    pub geometry: ConvGeometry,
    pub activation: FusedActivation,
    pub quantized: Option<QuantizedAccumulation>,
}

pub fn register_conv2d() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::Conv2D.name(),
        configure,
        execute,
        in_place: InPlaceSupport::None,
    }
}

/// Output extent along one spatial axis.
pub fn output_size(padding: Padding, input: usize, filter: usize, stride: usize, dilation: usize) -> usize {
    let effective = (filter - 1) * dilation + 1;
    match padding {
        Padding::Same => input.div_ceil(stride),
        Padding::Valid if input < effective => 0,
        Padding::Valid => (input - effective + stride) / stride,
    }
}

/// Leading padding along one spatial axis. Any odd remainder lands on the
/// trailing edge.
pub fn leading_padding(input: usize, filter: usize, stride: usize, dilation: usize, output: usize) -> usize {
    let effective = (filter - 1) * dilation + 1;
    let needed = output.saturating_sub(1) * stride + effective;
    needed.saturating_sub(input) / 2
}

impl ConvGeometry {
    pub fn new(input: &Shape, filter: &Shape, options: &Conv2DOptions) -> Result<Self> {
        if input.ndim() != 4 || filter.ndim() != 4 {
            return Err(RuntimeError::InvalidShape(format!(
                "conv needs 4-D input and filter, got {input} and {filter}"
            )));
        }
        if options.stride_h == 0
            || options.stride_w == 0
            || options.dilation_h == 0
            || options.dilation_w == 0
        {
            return Err(RuntimeError::InvalidShape(
                "conv strides and dilations must be positive".into(),
            ));
        }
        let (batches, in_h, in_w, in_c) = (input.dim(0), input.dim(1), input.dim(2), input.dim(3));
        let (out_c, k_h, k_w, filter_c) = (filter.dim(0), filter.dim(1), filter.dim(2), filter.dim(3));
        if filter_c != in_c || k_h == 0 || k_w == 0 {
            return Err(RuntimeError::ShapeMismatch {
                tensor: 1,
                expected: vec![out_c, k_h.max(1), k_w.max(1), in_c],
                got: filter.dims().to_vec(),
            });
        }
        let out_h = output_size(options.padding, in_h, k_h, options.stride_h, options.dilation_h);
        let out_w = output_size(options.padding, in_w, k_w, options.stride_w, options.dilation_w);
        if out_h == 0 || out_w == 0 {
            return Err(RuntimeError::InvalidShape(format!(
                "filter {filter} does not fit input {input}"
            )));
        }
        let pad = |input, filter, stride, dilation, output| match options.padding {
            Padding::Same => leading_padding(input, filter, stride, dilation, output),
            Padding::Valid => 0,
        };
        Ok(ConvGeometry {
            batches,
            in_h,
            in_w,
            in_c,
            k_h,
            k_w,
            out_h,
            out_w,
            out_c,
            stride_h: options.stride_h,
            stride_w: options.stride_w,
            dilation_h: options.dilation_h,
            dilation_w: options.dilation_w,
            pad_h: pad(in_h, k_h, options.stride_h, options.dilation_h, out_h),
            pad_w: pad(in_w, k_w, options.stride_w, options.dilation_w, out_w),
        })
    }

    pub fn output_shape(&self) -> Shape {
        Shape::from([self.batches, self.out_h, self.out_w, self.out_c])
    }

    /// Calls `f(input_offset, filter_offset)` for every tap of output pixel
    /// `(b, oy, ox)` inside the input. Both offsets address channel 0; the
    /// filter offset is relative to the start of an output channel's kernel.
    fn for_each_tap(&self, b: usize, oy: usize, ox: usize, mut f: impl FnMut(usize, usize)) {
        for ky in 0..self.k_h {
            let iy = (oy * self.stride_h + ky * self.dilation_h) as isize - self.pad_h as isize;
            if iy < 0 || iy >= self.in_h as isize {
                continue;
            }
            for kx in 0..self.k_w {
                let ix = (ox * self.stride_w + kx * self.dilation_w) as isize - self.pad_w as isize;
                if ix < 0 || ix >= self.in_w as isize {
                    continue;
                }
                let input = ((b * self.in_h + iy as usize) * self.in_w + ix as usize) * self.in_c;
                let filter = (ky * self.k_w + kx) * self.in_c;
                f(input, filter);
            }
        }
    }

    fn check(&self, x: usize, w: usize, out: usize) -> Result<()> {
        let expected = (
            self.batches * self.in_h * self.in_w * self.in_c,
            self.out_c * self.k_h * self.k_w * self.in_c,
            self.batches * self.out_h * self.out_w * self.out_c,
        );
        if (x, w, out) != expected {
            return Err(RuntimeError::invariant(format!(
                "conv buffers of {x}, {w} and {out} elements do not match {self:?}"
            )));
        }
        Ok(())
    }
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = MisoKernel::new(op, 2)?;
    let (input, filter) = (op.required_input(0)?, op.required_input(1)?);
    let options = match &op.options {
        OpOptions::Conv2D(options) => *options,
        _ => Conv2DOptions::default(),
    };
    let dtype = ctx.dtype(input)?;
    ctx.expect_dtype(filter, dtype)?;
    ctx.expect_dtype(k.output, dtype)?;
    let bias_dtype = match dtype {
        DType::F32 => DType::F32,
        DType::I8 => DType::I32,
        other => {
            return Err(RuntimeError::UnsupportedType {
                op: op.opcode,
                dtype: other,
            })
        }
    };
    if ctx.is_dynamic(input) {
        return Err(RuntimeError::InvalidShape(format!(
            "{} needs a statically shaped input",
            op.opcode
        )));
    }
    let geometry = ConvGeometry::new(ctx.shape(input)?, ctx.shape(filter)?, &options)?;
    if let Some(bias) = op.input(2) {
        ctx.expect_dtype(bias, bias_dtype)?;
        ctx.expect_shape(bias, &Shape::from([geometry.out_c]))?;
    }
    if !ctx.is_dynamic(k.output) {
        ctx.expect_shape(k.output, &geometry.output_shape())?;
    }
    let quantized = match dtype {
        DType::I8 => Some(QuantizedAccumulation::configure(
            ctx,
            op,
            (input, filter, k.output),
            geometry.out_c,
            options.activation,
        )?),
        _ => None,
    };
    Ok(OpData::Conv2D(Conv2DData {
        geometry,
        activation: options.activation,
        quantized,
    }))
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let OpData::Conv2D(params) = data else {
        return Err(RuntimeError::invariant("conv kernel without conv data"));
    };
    let k = MisoKernel::new(op, 2)?;
    if ctx.is_dynamic(k.output) {
        crate::access::prepare_output(ctx, k.output, params.geometry.output_shape())?;
    }
    let d = k.read_data(ctx)?;
    match (d.output.dtype, &params.quantized) {
        (DType::F32, _) => run_f32(d, params),
        (DType::I8, Some(q)) => run_i8(d, &params.geometry, q),
        (dtype, _) => Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        }),
    }
}

fn run_f32(d: MisoData<'_>, params: &Conv2DData) -> Result<()> {
    let g = &params.geometry;
    let x = d.input(0)?.slice::<f32>()?;
    let w = d.input(1)?.slice::<f32>()?;
    let bias = d.optional(2).map(|b| b.slice::<f32>()).transpose()?;
    let out = d.output.into_typed::<f32>()?;
    g.check(x.len(), w.len(), out.len())?;
    let kernel = g.k_h * g.k_w * g.in_c;
    let mut o = 0;
    for b in 0..g.batches {
        for oy in 0..g.out_h {
            for ox in 0..g.out_w {
                for oc in 0..g.out_c {
                    let mut acc = bias.map_or(0.0, |bias| bias[oc]);
                    let filter = &w[oc * kernel..(oc + 1) * kernel];
                    g.for_each_tap(b, oy, ox, |xi, fi| {
                        for c in 0..g.in_c {
                            acc += x[xi + c] * filter[fi + c];
                        }
                    });
                    out[o] = params.activation.apply(acc);
                    o += 1;
                }
            }
        }
    }
    Ok(())
}

fn run_i8(d: MisoData<'_>, g: &ConvGeometry, q: &QuantizedAccumulation) -> Result<()> {
    let x = d.input(0)?.slice::<i8>()?;
    let w = d.input(1)?.slice::<i8>()?;
    let bias = d.optional(2).map(|b| b.slice::<i32>()).transpose()?;
    let out = d.output.into_typed::<i8>()?;
    g.check(x.len(), w.len(), out.len())?;
    let kernel = g.k_h * g.k_w * g.in_c;
    let (input_offset, filter_offset) = (q.input_offset.value(), q.filter_offset.value());
    let mut o = 0;
    for b in 0..g.batches {
        for oy in 0..g.out_h {
            for ox in 0..g.out_w {
                for oc in 0..g.out_c {
                    let mut acc = bias.map_or(0, |bias| bias[oc]);
                    let filter = &w[oc * kernel..(oc + 1) * kernel];
                    g.for_each_tap(b, oy, ox, |xi, fi| {
                        for c in 0..g.in_c {
                            acc += (x[xi + c] as i32 + input_offset)
                                * (filter[fi + c] as i32 + filter_offset);
                        }
                    });
                    out[o] = q.requantize(acc, oc) as i8;
                    o += 1;
                }
            }
        }
    }
    Ok(())
}
