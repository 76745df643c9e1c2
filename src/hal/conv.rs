use serde::Deserialize;

use crate::loom::{
    num::{DataType, Float},
    ops::{OpDesc, OpError, Operation},
    tensor::{Tensor, TensorError},
    workspace::Workspace,
};

/// A field given either as one value for every side or as one value per side.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Sides {
    One(usize),
    Many(Vec<usize>),
}

impl Sides {
    fn expand<const N: usize>(self, key: &str) -> Result<[usize; N], OpError> {
        match self {
            Sides::One(x) => Ok([x; N]),
            Sides::Many(x) if x.len() == 1 => Ok([x[0]; N]),
            Sides::Many(x) => x.try_into().map_err(|x: Vec<usize>| {
                let count = x.len();
                OpError::Shape(format!("`{key}` expects 1 or {N} values, found {count}"))
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConvDims {
    /// Input height, width, channels and batch size.
    x: [usize; 4],
    /// Filter height, width and count.
    f: [usize; 3],
    /// Output height and width.
    y: [usize; 2],
    stride: [usize; 2],
    /// Padding of top and left; bottom and right only affect the output size.
    pad: [usize; 2],
}

impl ConvDims {
    fn new(x: &Tensor, f: &Tensor, stride: [usize; 2], pad: [usize; 4]) -> Result<Self, OpError> {
        let xs = x.shape();
        let fs = f.shape();
        if xs.len() > 4 || fs.len() > 4 {
            return Err(OpError::Shape(format!(
                "expect at most 4 dimensions, found input {xs} and filters {fs}"
            )));
        }
        let x = [xs.dim(0), xs.dim(1), xs.dim(2), xs.dim(3)];
        let [fh, fw, fc, k] = [fs.dim(0), fs.dim(1), fs.dim(2), fs.dim(3)];
        if fc != x[2] {
            return Err(OpError::Shape(format!(
                "filters {fs} do not match the {} channels of input {xs}",
                x[2]
            )));
        }
        if stride.contains(&0) {
            return Err(OpError::Shape("stride must be positive".into()));
        }

        let [top, bottom, left, right] = pad;
        let span = |size: usize, lo: usize, hi: usize, window: usize, stride: usize| {
            (size + lo + hi)
                .checked_sub(window)
                .map(|span| span / stride + 1)
        };
        let oh = span(x[0], top, bottom, fh, stride[0]);
        let ow = span(x[1], left, right, fw, stride[1]);
        let (Some(oh), Some(ow)) = (oh, ow) else {
            return Err(OpError::Shape(format!(
                "filters {fs} are larger than the padded input {xs}"
            )));
        };

        Ok(Self {
            x,
            f: [fh, fw, k],
            y: [oh, ow],
            stride,
            pad: [top, left],
        })
    }

    #[inline]
    fn output_shape(&self) -> [usize; 4] {
        [self.y[0], self.y[1], self.f[2], self.x[3]]
    }

    /// Computes one output plane `(k, n)`, of size `oh * ow`, first dimension fastest.
    fn plane<T: Float>(
        &self,
        x: &[T],
        f: &[T],
        b: Option<&[T]>,
        k: usize,
        n: usize,
        output: &mut [T],
    ) {
        let [h, w, c, _] = self.x;
        let [fh, fw, _] = self.f;
        let [oh, ow] = self.y;
        let [sy, sx] = self.stride;
        let [pt, pl] = self.pad;

        let bias = b.map_or(T::zero(), |b| b[k]);
        for ox in 0..ow {
            for oy in 0..oh {
                let mut acc = bias;
                for z in 0..c {
                    for fx in 0..fw {
                        let ix = (ox * sx + fx).checked_sub(pl).filter(|&ix| ix < w);
                        let Some(ix) = ix else { continue };
                        for fy in 0..fh {
                            let iy = (oy * sy + fy).checked_sub(pt).filter(|&iy| iy < h);
                            let Some(iy) = iy else { continue };
                            let xi = iy + h * (ix + w * (z + c * n));
                            let fi = fy + fh * (fx + fw * (z + c * k));
                            acc += x[xi] * f[fi];
                        }
                    }
                }
                output[oy + oh * ox] = acc;
            }
        }
    }

    fn run<T: Float>(&self, x: &[T], f: &[T], b: Option<&[T]>) -> Vec<T> {
        let [oh, ow] = self.y;
        let k = self.f[2];
        let mut output = vec![T::zero(); self.output_shape().iter().product()];
        if oh * ow == 0 {
            return output;
        }

        #[cfg(not(feature = "rayon"))]
        {
            output
                .chunks_exact_mut(oh * ow)
                .enumerate()
                .for_each(|(index, plane)| self.plane(x, f, b, index % k, index / k, plane));
        }
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;

            output
                .par_chunks_exact_mut(oh * ow)
                .enumerate()
                .for_each(|(index, plane)| self.plane(x, f, b, index % k, index / k, plane));
        }
        output
    }
}

/// 2D convolution over tensors laid out as `[height, width, channels, batch]`, first dimension fastest.
///
/// Inputs are the data `x`, the filters `[FH, FW, C, K]` and optionally the biases `[K]`.
/// `stride` (`[y, x]`) and `pad` (`[top, bottom, left, right]`) may be given as a single value.
#[derive(Debug, Default, Clone)]
pub struct Conv;

impl Conv {
    fn fetch(workspace: &Workspace, name: &str) -> Result<Tensor, OpError> {
        let tensor = workspace.get(name);
        match tensor.is_empty() {
            true => Err(OpError::MissingTensor(name.to_string())),
            false => Ok(tensor),
        }
    }

    fn compute<T: Float>(
        dims: &ConvDims,
        x: &Tensor,
        f: &Tensor,
        b: Option<&Tensor>,
        y: &Tensor,
    ) -> Result<(), OpError> {
        let x = x.read_slice::<T>()?;
        let f = f.read_slice::<T>()?;
        let b = b.map(Tensor::read_slice::<T>).transpose()?;
        let output = dims.run(&x, &f, b.as_deref());
        y.write_slice(&output)?;
        Ok(())
    }
}

impl Operation for Conv {
    fn r#type(&self) -> &str {
        "Conv"
    }

    fn execute(&self, op: &OpDesc, workspace: &mut Workspace) -> Result<(), OpError> {
        let x = Self::fetch(workspace, op.input(0)?)?;
        let f = Self::fetch(workspace, op.input(1)?)?;
        let b = match op.inputs.get(2) {
            Some(name) => Some(Self::fetch(workspace, name)?),
            None => None,
        };
        let output = op.output(0)?;

        let r#type = x.data_type();
        if !matches!(r#type, DataType::F32 | DataType::F64) {
            return Err(OpError::DataType(r#type.to_string()));
        }
        for tensor in [Some(&f), b.as_ref()].into_iter().flatten() {
            if tensor.data_type() != r#type {
                return Err(TensorError::Type(tensor.data_type(), r#type).into());
            }
        }

        let stride = op.field_or("stride", Sides::One(1))?.expand::<2>("stride")?;
        let pad = op.field_or("pad", Sides::One(0))?.expand::<4>("pad")?;
        let dims = ConvDims::new(&x, &f, stride, pad)?;
        if let Some(b) = &b {
            if b.data_count() != dims.f[2] {
                return Err(OpError::Shape(format!(
                    "biases {} do not match {} filters",
                    b.shape(),
                    dims.f[2]
                )));
            }
        }

        let y = workspace.get_or_create(output, r#type, dims.output_shape())?;
        match r#type {
            DataType::F32 => Self::compute::<f32>(&dims, &x, &f, b.as_ref(), &y),
            DataType::F64 => Self::compute::<f64>(&dims, &x, &f, b.as_ref(), &y),
            other => Err(OpError::DataType(other.to_string())),
        }
    }
}
