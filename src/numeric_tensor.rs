use crate::dtype::{DType, DTypeError, DTypeOfPrimitive};
use half::{bf16, f16};
use num_traits::Float;
use ndarray::{ArcArray, ArrayD, Axis, Ix2, IxDyn, Zip};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, thiserror::Error)]
pub enum NumericTensorError {
    #[error("Requested dtype {0}, but had dtype {1}")]
    WrongDTypeError(DType, DType),
    #[error("Unsupported operation {0} for dtypes {1:?}")]
    UnsupportedOperationForDTypes(String, Vec<DType>),
    #[error("Cannot broadcast shapes {0:?} and {1:?}")]
    BroadcastError(Vec<usize>, Vec<usize>),
    #[error("Invalid axes {0:?} for tensor of rank {1}")]
    InvalidAxes(Vec<usize>, usize),
    #[error("Integer division by zero")]
    DivisionByZero,
    #[error("Invalid convolution: {0}")]
    InvalidConvolution(String),
    #[error("Cannot multiply matrices of shapes {0:?} and {1:?}")]
    InvalidMatMul(Vec<usize>, Vec<usize>),
    #[error(transparent)]
    ShapeError(#[from] ndarray::ShapeError),
    #[error(transparent)]
    DTypeError(#[from] DTypeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum UnaryOp {
    Exp,
    Tanh,
    Rsqrt,
    Log,
    Sine,
    Cosine,
    Sqrt,
    Abs,
}

impl UnaryOp {
    fn apply_float<F: Float>(&self, x: F) -> F {
        match self {
            UnaryOp::Exp => x.exp(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Rsqrt => x.sqrt().recip(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sine => x.sin(),
            UnaryOp::Cosine => x.cos(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Abs => x.abs(),
        }
    }

    fn apply_i64(&self, x: i64) -> Option<i64> {
        match self {
            UnaryOp::Abs => Some(x.wrapping_abs()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Max,
    Min,
}

impl BinaryOp {
    fn apply_f64(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Max => a.max(b),
            BinaryOp::Min => a.min(b),
        }
    }

    fn apply_i64(&self, a: i64, b: i64) -> Option<i64> {
        match self {
            BinaryOp::Add => Some(a.wrapping_add(b)),
            BinaryOp::Sub => Some(a.wrapping_sub(b)),
            BinaryOp::Mul => Some(a.wrapping_mul(b)),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Pow => Some(if b >= 0 {
                a.wrapping_pow(b.min(u32::MAX as i64) as u32)
            } else {
                match a {
                    1 => 1,
                    -1 if b % 2 == 0 => 1,
                    -1 => -1,
                    _ => 0,
                }
            }),
            BinaryOp::Max => Some(a.max(b)),
            BinaryOp::Min => Some(a.min(b)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
    Prod,
}

impl ReduceOp {
    fn init_f64(&self) -> f64 {
        match self {
            ReduceOp::Sum => 0.0,
            ReduceOp::Prod => 1.0,
            ReduceOp::Max => f64::NEG_INFINITY,
            ReduceOp::Min => f64::INFINITY,
        }
    }

    fn init_i64(&self) -> i64 {
        match self {
            ReduceOp::Sum => 0,
            ReduceOp::Prod => 1,
            ReduceOp::Max => i64::MIN,
            ReduceOp::Min => i64::MAX,
        }
    }

    fn combine_f64(&self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Prod => a * b,
            ReduceOp::Max => a.max(b),
            ReduceOp::Min => a.min(b),
        }
    }

    fn combine_i64(&self, a: i64, b: i64) -> i64 {
        match self {
            ReduceOp::Sum => a.wrapping_add(b),
            ReduceOp::Prod => a.wrapping_mul(b),
            ReduceOp::Max => a.max(b),
            ReduceOp::Min => a.min(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvolutionParams {
    /// (low, high) padding per spatial dimension.
    pub padding: Vec<(i64, i64)>,
    pub stride: Vec<u64>,
    pub lhs_dilation: Vec<u64>,
    pub rhs_dilation: Vec<u64>,
    pub feature_group_count: u64,
}

pub trait NumericElement:
    Copy + DTypeOfPrimitive + PartialOrd + std::fmt::Debug + Send + Sync + 'static
{
    const IS_FLOAT: bool;
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
    fn to_i64(self) -> i64;
    fn from_i64(v: i64) -> Self;
    fn wrap(value: ArcArray<Self, IxDyn>) -> NumericTensor;
    fn inner(tensor: &NumericTensor) -> Result<&ArcArray<Self, IxDyn>, NumericTensorError>;
}

macro_rules! impl_numeric_element {
    ($t:ty, $variant:ident, $is_float:expr, $to_f64:expr, $from_f64:expr, $to_i64:expr, $from_i64:expr) => {
        impl NumericElement for $t {
            const IS_FLOAT: bool = $is_float;
            fn to_f64(self) -> f64 {
                ($to_f64)(self)
            }
            fn from_f64(v: f64) -> Self {
                ($from_f64)(v)
            }
            fn to_i64(self) -> i64 {
                ($to_i64)(self)
            }
            fn from_i64(v: i64) -> Self {
                ($from_i64)(v)
            }
            fn wrap(value: ArcArray<Self, IxDyn>) -> NumericTensor {
                NumericTensor::$variant(value)
            }
            fn inner(tensor: &NumericTensor) -> Result<&ArcArray<Self, IxDyn>, NumericTensorError> {
                if let NumericTensor::$variant(x) = tensor {
                    Ok(x)
                } else {
                    Err(NumericTensorError::WrongDTypeError(Self::DTYPE, tensor.dtype()))
                }
            }
        }
    };
}

impl_numeric_element!(f64, F64, true, |v: f64| v, |v: f64| v, |v: f64| v as i64, |v: i64| v as f64);
impl_numeric_element!(f32, F32, true, |v: f32| v as f64, |v: f64| v as f32, |v: f32| v as i64, |v: i64| v as f32);
impl_numeric_element!(
    bf16,
    BF16,
    true,
    |v: bf16| v.to_f64(),
    bf16::from_f64,
    |v: bf16| v.to_f64() as i64,
    |v: i64| bf16::from_f64(v as f64)
);
impl_numeric_element!(
    f16,
    F16,
    true,
    |v: f16| v.to_f64(),
    f16::from_f64,
    |v: f16| v.to_f64() as i64,
    |v: i64| f16::from_f64(v as f64)
);
impl_numeric_element!(i64, I64, false, |v: i64| v as f64, |v: f64| v as i64, |v: i64| v, |v: i64| v);
impl_numeric_element!(i32, I32, false, |v: i32| v as f64, |v: f64| v as i32, |v: i32| v as i64, |v: i64| v as i32);
impl_numeric_element!(i8, I8, false, |v: i8| v as f64, |v: f64| v as i8, |v: i8| v as i64, |v: i64| v as i8);
impl_numeric_element!(u8, U8, false, |v: u8| v as f64, |v: f64| v as u8, |v: u8| v as i64, |v: i64| v as u8);
impl_numeric_element!(
    bool,
    BOOL,
    false,
    |v: bool| if v { 1.0 } else { 0.0 },
    |v: f64| v != 0.0,
    |v: bool| v as i64,
    |v: i64| v != 0
);

fn wrap<T: NumericElement>(value: ArcArray<T, IxDyn>) -> NumericTensor {
    T::wrap(value)
}

/// Concrete host-resident tensor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NumericTensor {
    F64(ArcArray<f64, IxDyn>),
    F32(ArcArray<f32, IxDyn>),
    BF16(ArcArray<bf16, IxDyn>),
    F16(ArcArray<f16, IxDyn>),
    I64(ArcArray<i64, IxDyn>),
    I32(ArcArray<i32, IxDyn>),
    I8(ArcArray<i8, IxDyn>),
    U8(ArcArray<u8, IxDyn>),
    BOOL(ArcArray<bool, IxDyn>),
}

macro_rules! dispatch {
    ($tensor:expr, |$x:ident| $body:expr) => {
        match $tensor {
            NumericTensor::F64($x) => $body,
            NumericTensor::F32($x) => $body,
            NumericTensor::BF16($x) => $body,
            NumericTensor::F16($x) => $body,
            NumericTensor::I64($x) => $body,
            NumericTensor::I32($x) => $body,
            NumericTensor::I8($x) => $body,
            NumericTensor::U8($x) => $body,
            NumericTensor::BOOL($x) => $body,
        }
    };
}

macro_rules! dispatch_pair {
    ($a:expr, $b:expr, |$x:ident, $y:ident| $body:expr, $mismatch:expr) => {
        match ($a, $b) {
            (NumericTensor::F64($x), NumericTensor::F64($y)) => $body,
            (NumericTensor::F32($x), NumericTensor::F32($y)) => $body,
            (NumericTensor::BF16($x), NumericTensor::BF16($y)) => $body,
            (NumericTensor::F16($x), NumericTensor::F16($y)) => $body,
            (NumericTensor::I64($x), NumericTensor::I64($y)) => $body,
            (NumericTensor::I32($x), NumericTensor::I32($y)) => $body,
            (NumericTensor::I8($x), NumericTensor::I8($y)) => $body,
            (NumericTensor::U8($x), NumericTensor::U8($y)) => $body,
            (NumericTensor::BOOL($x), NumericTensor::BOOL($y)) => $body,
            _ => $mismatch,
        }
    };
}

impl Display for NumericTensor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        dispatch!(self, |x| x.fmt(f))
    }
}

impl<T: NumericElement> From<ArrayD<T>> for NumericTensor {
    fn from(value: ArrayD<T>) -> Self {
        T::wrap(value.into_shared())
    }
}

impl NumericTensor {
    pub fn from_vec_shape<T: NumericElement>(
        v: Vec<T>,
        shape: Vec<usize>,
    ) -> Result<Self, NumericTensorError> {
        Ok(T::wrap(ArcArray::from_shape_vec(IxDyn(&shape), v)?))
    }

    pub fn from_vec<T: NumericElement>(v: Vec<T>) -> Self {
        T::wrap(ArcArray::from_vec(v).into_dyn())
    }

    pub fn scalar<T: NumericElement>(v: T) -> Self {
        T::wrap(ArcArray::from_elem(IxDyn(&[]), v))
    }

    pub fn dtype(&self) -> DType {
        match self {
            NumericTensor::F64(_) => DType::F64,
            NumericTensor::F32(_) => DType::F32,
            NumericTensor::BF16(_) => DType::BF16,
            NumericTensor::F16(_) => DType::F16,
            NumericTensor::I64(_) => DType::I64,
            NumericTensor::I32(_) => DType::I32,
            NumericTensor::I8(_) => DType::I8,
            NumericTensor::U8(_) => DType::U8,
            NumericTensor::BOOL(_) => DType::BOOL,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        dispatch!(self, |x| x.shape().to_vec())
    }

    pub fn rank(&self) -> usize {
        dispatch!(self, |x| x.ndim())
    }

    pub fn num_elements(&self) -> usize {
        dispatch!(self, |x| x.len())
    }

    pub fn is_standard_layout(&self) -> bool {
        dispatch!(self, |x| x.is_standard_layout())
    }

    pub fn as_inner<T: NumericElement>(&self) -> Result<&ArcArray<T, IxDyn>, NumericTensorError> {
        T::inner(self)
    }

    /// Elements in logical (row-major) order.
    pub fn to_vec<T: NumericElement>(&self) -> Result<Vec<T>, NumericTensorError> {
        Ok(T::inner(self)?.iter().copied().collect())
    }

    pub fn to_f64_array(&self) -> ArrayD<f64> {
        dispatch!(self, |x| x.mapv(|v| v.to_f64()))
    }

    /// Element values rendered with `Debug`, row-major.
    pub fn element_strings(&self) -> Vec<String> {
        dispatch!(self, |x| x.iter().map(|v| format!("{v:?}")).collect())
    }

    pub fn to_standard_layout(&self) -> NumericTensor {
        dispatch!(self, |x| wrap(x.as_standard_layout().into_owned().into_shared()))
    }

    pub fn cast(&self, dtype: DType) -> Result<NumericTensor, NumericTensorError> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        dispatch!(self, |x| cast_array(x, dtype))
    }

    pub fn unary(&self, op: UnaryOp) -> Result<NumericTensor, NumericTensorError> {
        dispatch!(self, |x| {
            unary_array(x, op)
                .map(wrap)
                .ok_or_else(|| {
                    NumericTensorError::UnsupportedOperationForDTypes(
                        op.to_string(),
                        vec![self.dtype()],
                    )
                })
        })
    }

    pub fn binary(&self, other: &NumericTensor, op: BinaryOp) -> Result<NumericTensor, NumericTensorError> {
        dispatch_pair!(
            self,
            other,
            |a, b| binary_array(a, b, op).map(wrap),
            Err(NumericTensorError::UnsupportedOperationForDTypes(
                op.to_string(),
                vec![self.dtype(), other.dtype()]
            ))
        )
    }

    pub fn reduce(&self, dims: &[usize], op: ReduceOp) -> Result<NumericTensor, NumericTensorError> {
        let rank = self.rank();
        if dims.iter().any(|d| *d >= rank) {
            return Err(NumericTensorError::InvalidAxes(dims.to_vec(), rank));
        }
        let mut sorted = dims.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        dispatch!(self, |x| Ok(wrap(reduce_array(x, &sorted, op))))
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<NumericTensor, NumericTensorError> {
        dispatch!(self, |x| {
            let owned = x.as_standard_layout().into_owned();
            Ok(wrap(owned.into_shape_with_order(shape.to_vec())?.into_shared()))
        })
    }

    pub fn permute(&self, permutation: &[usize]) -> Result<NumericTensor, NumericTensorError> {
        let rank = self.rank();
        let mut seen = vec![false; rank];
        for p in permutation {
            if *p >= rank || seen[*p] {
                return Err(NumericTensorError::InvalidAxes(permutation.to_vec(), rank));
            }
            seen[*p] = true;
        }
        if permutation.len() != rank {
            return Err(NumericTensorError::InvalidAxes(permutation.to_vec(), rank));
        }
        dispatch!(self, |x| {
            let permuted = x.clone().permuted_axes(permutation.to_vec());
            Ok(wrap(permuted.as_standard_layout().into_owned().into_shared()))
        })
    }

    pub fn convolution(
        &self,
        weight: &NumericTensor,
        params: &ConvolutionParams,
    ) -> Result<NumericTensor, NumericTensorError> {
        if self.dtype() != weight.dtype() {
            return Err(NumericTensorError::UnsupportedOperationForDTypes(
                "Convolution".to_string(),
                vec![self.dtype(), weight.dtype()],
            ));
        }
        let out = convolution_f64(&self.to_f64_array(), &weight.to_f64_array(), params)?;
        NumericTensor::from(out).cast(self.dtype())
    }

    pub fn matmul(&self, other: &NumericTensor) -> Result<NumericTensor, NumericTensorError> {
        if self.dtype() != other.dtype() {
            return Err(NumericTensorError::UnsupportedOperationForDTypes(
                "MatMul".to_string(),
                vec![self.dtype(), other.dtype()],
            ));
        }
        let out = matmul_f64(&self.to_f64_array(), &other.to_f64_array())?;
        NumericTensor::from(out).cast(self.dtype())
    }
}

fn convert<S: NumericElement, D: NumericElement>(x: &ArcArray<S, IxDyn>) -> NumericTensor {
    let out = if S::IS_FLOAT || D::IS_FLOAT {
        x.mapv(|v| D::from_f64(v.to_f64()))
    } else {
        x.mapv(|v| D::from_i64(v.to_i64()))
    };
    D::wrap(out.into_shared())
}

fn cast_array<T: NumericElement>(
    x: &ArcArray<T, IxDyn>,
    dtype: DType,
) -> Result<NumericTensor, NumericTensorError> {
    Ok(match dtype {
        DType::F64 => convert::<T, f64>(x),
        DType::F32 => convert::<T, f32>(x),
        DType::BF16 => convert::<T, bf16>(x),
        DType::F16 => convert::<T, f16>(x),
        DType::I64 => convert::<T, i64>(x),
        DType::I32 => convert::<T, i32>(x),
        DType::I8 => convert::<T, i8>(x),
        DType::U8 => convert::<T, u8>(x),
        DType::BOOL => convert::<T, bool>(x),
        DType::F8 => Err(DTypeError::DTypeNotSupportedByBackend(DType::F8))?,
    })
}

fn unary_array<T: NumericElement>(x: &ArcArray<T, IxDyn>, op: UnaryOp) -> Option<ArcArray<T, IxDyn>> {
    if T::IS_FLOAT {
        Some(x.mapv(|v| T::from_f64(op.apply_float(v.to_f64()))).into_shared())
    } else {
        op.apply_i64(0)?;
        Some(
            x.mapv(|v| T::from_i64(op.apply_i64(v.to_i64()).unwrap_or_default()))
                .into_shared(),
        )
    }
}

pub(crate) fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    (0..rank)
        .map(|i| {
            let da = (i + a.len()).checked_sub(rank).map(|x| a[x]).unwrap_or(1);
            let db = (i + b.len()).checked_sub(rank).map(|x| b[x]).unwrap_or(1);
            if da == db || db == 1 {
                Some(da)
            } else if da == 1 {
                Some(db)
            } else {
                None
            }
        })
        .collect()
}

fn binary_array<T: NumericElement>(
    a: &ArcArray<T, IxDyn>,
    b: &ArcArray<T, IxDyn>,
    op: BinaryOp,
) -> Result<ArcArray<T, IxDyn>, NumericTensorError> {
    let broadcast_error =
        || NumericTensorError::BroadcastError(a.shape().to_vec(), b.shape().to_vec());
    let shape = broadcast_shape(a.shape(), b.shape()).ok_or_else(broadcast_error)?;
    let av = a.broadcast(IxDyn(&shape)).ok_or_else(broadcast_error)?;
    let bv = b.broadcast(IxDyn(&shape)).ok_or_else(broadcast_error)?;
    if T::IS_FLOAT {
        let out = Zip::from(&av)
            .and(&bv)
            .map_collect(|x, y| T::from_f64(op.apply_f64(x.to_f64(), y.to_f64())));
        Ok(out.into_shared())
    } else {
        let out = Zip::from(&av)
            .and(&bv)
            .map_collect(|x, y| op.apply_i64(x.to_i64(), y.to_i64()));
        if out.iter().any(Option::is_none) {
            return Err(NumericTensorError::DivisionByZero);
        }
        Ok(out.mapv(|v| T::from_i64(v.unwrap_or_default())).into_shared())
    }
}

fn reduce_array<T: NumericElement>(
    x: &ArcArray<T, IxDyn>,
    sorted_dims: &[usize],
    op: ReduceOp,
) -> ArcArray<T, IxDyn> {
    if T::IS_FLOAT {
        let mut acc = x.mapv(|v| v.to_f64());
        for dim in sorted_dims.iter().rev() {
            acc = acc.fold_axis(Axis(*dim), op.init_f64(), |a, b| op.combine_f64(*a, *b));
        }
        acc.mapv(T::from_f64).into_shared()
    } else {
        let mut acc = x.mapv(|v| v.to_i64());
        for dim in sorted_dims.iter().rev() {
            acc = acc.fold_axis(Axis(*dim), op.init_i64(), |a, b| op.combine_i64(*a, *b));
        }
        acc.mapv(T::from_i64).into_shared()
    }
}

fn dilated_size(size: usize, dilation: u64) -> Option<i64> {
    if size == 0 {
        return Some(0);
    }
    let size = (size as u64 - 1).checked_mul(dilation)?.checked_add(1)?;
    i64::try_from(size).ok()
}

fn convolution_f64(
    input: &ArrayD<f64>,
    kernel: &ArrayD<f64>,
    params: &ConvolutionParams,
) -> Result<ArrayD<f64>, NumericTensorError> {
    let in_shape = input.shape();
    let k_shape = kernel.shape();
    let rank = in_shape.len();
    if rank < 3 || k_shape.len() != rank {
        return Err(NumericTensorError::InvalidConvolution(format!(
            "input shape {in_shape:?} and weight shape {k_shape:?} are not compatible"
        )));
    }
    let spatial = rank - 2;
    if params.padding.len() != spatial
        || params.stride.len() != spatial
        || params.lhs_dilation.len() != spatial
        || params.rhs_dilation.len() != spatial
    {
        return Err(NumericTensorError::InvalidConvolution(format!(
            "expected attributes for {spatial} spatial dimensions"
        )));
    }
    let groups = params.feature_group_count as usize;
    let (batch, c_in) = (in_shape[0], in_shape[1]);
    let (c_out, c_in_per_group) = (k_shape[0], k_shape[1]);
    if groups == 0 || c_in != c_in_per_group * groups || c_out % groups != 0 {
        return Err(NumericTensorError::InvalidConvolution(format!(
            "{c_in} input channels and {c_out} output channels cannot be split into {groups} groups"
        )));
    }
    let c_out_per_group = c_out / groups;

    let mut out_shape = vec![batch, c_out];
    for i in 0..spatial {
        let (lo, hi) = params.padding[i];
        let overflow = || {
            NumericTensorError::InvalidConvolution(format!(
                "window of spatial dimension {i} overflows"
            ))
        };
        let eff_in = dilated_size(in_shape[2 + i], params.lhs_dilation[i])
            .and_then(|x| x.checked_add(lo))
            .and_then(|x| x.checked_add(hi))
            .ok_or_else(overflow)?;
        let eff_k = dilated_size(k_shape[2 + i], params.rhs_dilation[i]).ok_or_else(overflow)?;
        if params.stride[i] == 0 || params.lhs_dilation[i] == 0 || eff_in < eff_k {
            return Err(NumericTensorError::InvalidConvolution(format!(
                "spatial dimension {i} is smaller than the kernel"
            )));
        }
        out_shape.push(((eff_in - eff_k) as u64 / params.stride[i] + 1) as usize);
    }

    let mut out = ArrayD::<f64>::zeros(IxDyn(&out_shape));
    let kernel_spatial = k_shape[2..].to_vec();
    let mut in_idx = vec![0usize; rank];
    let mut k_idx = vec![0usize; rank];
    for (out_pos, value) in out.indexed_iter_mut() {
        let (b, co) = (out_pos[0], out_pos[1]);
        let group = co / c_out_per_group;
        let mut acc = 0.0;
        for ci in 0..c_in_per_group {
            'kernel: for kpos in ndarray::indices(IxDyn(&kernel_spatial)) {
                for i in 0..spatial {
                    let pos = out_pos[2 + i] as i128 * params.stride[i] as i128
                        + kpos[i] as i128 * params.rhs_dilation[i] as i128
                        - params.padding[i].0 as i128;
                    let lhs_dilation = params.lhs_dilation[i] as i128;
                    if pos < 0 || pos % lhs_dilation != 0 {
                        continue 'kernel;
                    }
                    let ip = (pos / lhs_dilation) as usize;
                    if ip >= in_shape[2 + i] {
                        continue 'kernel;
                    }
                    in_idx[2 + i] = ip;
                    k_idx[2 + i] = kpos[i];
                }
                in_idx[0] = b;
                in_idx[1] = group * c_in_per_group + ci;
                k_idx[0] = co;
                k_idx[1] = ci;
                acc += input[IxDyn(&in_idx)] * kernel[IxDyn(&k_idx)];
            }
        }
        *value = acc;
    }
    Ok(out)
}

fn matmul_f64(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>, NumericTensorError> {
    let error = || NumericTensorError::InvalidMatMul(a.shape().to_vec(), b.shape().to_vec());
    let (ra, rb) = (a.ndim(), b.ndim());
    if ra < 2 || rb < 2 {
        return Err(error());
    }
    let (m, k) = (a.shape()[ra - 2], a.shape()[ra - 1]);
    let (k2, n) = (b.shape()[rb - 2], b.shape()[rb - 1]);
    if k != k2 {
        return Err(error());
    }
    let batch = broadcast_shape(&a.shape()[..ra - 2], &b.shape()[..rb - 2]).ok_or_else(error)?;
    let mut a_shape = batch.clone();
    a_shape.extend([m, k]);
    let mut b_shape = batch.clone();
    b_shape.extend([k, n]);
    let mut out_shape = batch.clone();
    out_shape.extend([m, n]);

    let av = a.broadcast(IxDyn(&a_shape)).ok_or_else(error)?;
    let bv = b.broadcast(IxDyn(&b_shape)).ok_or_else(error)?;
    let mut out = ArrayD::<f64>::zeros(IxDyn(&out_shape));
    for batch_index in ndarray::indices(IxDyn(&batch)) {
        let mut a_sub = av.view();
        let mut b_sub = bv.view();
        let mut o_sub = out.view_mut();
        for i in 0..batch.len() {
            a_sub = a_sub.index_axis_move(Axis(0), batch_index[i]);
            b_sub = b_sub.index_axis_move(Axis(0), batch_index[i]);
            o_sub = o_sub.index_axis_move(Axis(0), batch_index[i]);
        }
        let a2 = a_sub.into_dimensionality::<Ix2>()?;
        let b2 = b_sub.into_dimensionality::<Ix2>()?;
        o_sub.assign(&a2.dot(&b2));
    }
    Ok(out)
}
