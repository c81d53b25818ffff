use half::{bf16, f16};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum DTypeError {
    #[error("The backend does not support the dtype {0}")]
    DTypeNotSupportedByBackend(DType),
    #[error("Unknown dtype name \"{0}\"")]
    UnknownDTypeName(String),
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DType {
    F64,
    F32,
    BF16,
    F16,
    F8,
    I64,
    I32,
    I8,
    U8,
    BOOL,
}

impl DType {
    pub const ALL: [DType; 10] = [
        DType::F64,
        DType::F32,
        DType::BF16,
        DType::F16,
        DType::F8,
        DType::I64,
        DType::I32,
        DType::I8,
        DType::U8,
        DType::BOOL,
    ];

    pub fn size(&self) -> usize {
        match self {
            DType::F64 => 8,
            DType::F32 => 4,
            DType::BF16 => 2,
            DType::F16 => 2,
            DType::F8 => 1,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::I8 => 1,
            DType::U8 => 1,
            DType::BOOL => 1,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            DType::F64 | DType::F32 | DType::BF16 | DType::F16 | DType::F8
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DType::I64 | DType::I32 | DType::I8 | DType::U8)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DType::F64 => write!(f, "float64"),
            DType::F32 => write!(f, "float32"),
            DType::BF16 => write!(f, "bfloat16"),
            DType::F16 => write!(f, "float16"),
            DType::F8 => write!(f, "float8"),
            DType::I64 => write!(f, "int64"),
            DType::I32 => write!(f, "int32"),
            DType::I8 => write!(f, "int8"),
            DType::U8 => write!(f, "uint8"),
            DType::BOOL => write!(f, "bool"),
        }
    }
}

impl FromStr for DType {
    type Err = DTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DType::ALL
            .into_iter()
            .find(|dtype| dtype.to_string() == s)
            .ok_or_else(|| DTypeError::UnknownDTypeName(s.to_string()))
    }
}

pub trait DTypeOfPrimitive {
    const DTYPE: DType;
}

macro_rules! impl_dtype_of_primitive {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl DTypeOfPrimitive for $t {
                const DTYPE: DType = DType::$variant;
            }
        )*
    };
}

impl_dtype_of_primitive!(
    f64 => F64,
    f32 => F32,
    bf16 => BF16,
    f16 => F16,
    i64 => I64,
    i32 => I32,
    i8 => I8,
    u8 => U8,
    bool => BOOL,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_dtypes_match_sizes() {
        assert_eq!(<f32 as DTypeOfPrimitive>::DTYPE, DType::F32);
        assert_eq!(<bf16 as DTypeOfPrimitive>::DTYPE, DType::BF16);
        assert_eq!(<bool as DTypeOfPrimitive>::DTYPE, DType::BOOL);
        assert_eq!(<f16 as DTypeOfPrimitive>::DTYPE.size(), std::mem::size_of::<f16>());
        assert_eq!(<i64 as DTypeOfPrimitive>::DTYPE.size(), std::mem::size_of::<i64>());
        assert_eq!(<u8 as DTypeOfPrimitive>::DTYPE.size(), std::mem::size_of::<u8>());
    }
}
