use bytemuck::Pod;
use derive_more::Display;
use half::f16;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    F32,
    F64,
    F16,
    U8,
}

impl DataType {
    /// Returns the size in bytes of one element of this data type.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            DataType::F32 => size_of::<f32>(),
            DataType::F64 => size_of::<f64>(),
            DataType::F16 => size_of::<f16>(),
            DataType::U8 => size_of::<u8>(),
        }
    }
}

pub trait Zero {
    fn zero() -> Self;
}

impl Zero for f32 {
    fn zero() -> Self {
        0.0
    }
}

impl Zero for f64 {
    fn zero() -> Self {
        0.0
    }
}

impl Zero for f16 {
    fn zero() -> Self {
        Self::ZERO
    }
}

impl Zero for u8 {
    fn zero() -> Self {
        0
    }
}

pub trait Scalar: Sized + Pod + Zero + Send + Sync + sealed::Sealed {
    const DATA_TYPE: DataType;
}

/// Scalars the CPU kernels can do arithmetic on.
pub trait Float:
    Scalar
    + std::ops::Add<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::AddAssign
    + PartialEq
{
}

impl Scalar for f32 {
    const DATA_TYPE: DataType = DataType::F32;
}

impl Scalar for f64 {
    const DATA_TYPE: DataType = DataType::F64;
}

impl Scalar for f16 {
    const DATA_TYPE: DataType = DataType::F16;
}

impl Scalar for u8 {
    const DATA_TYPE: DataType = DataType::U8;
}

impl Float for f32 {}
impl Float for f64 {}

mod sealed {
    use half::f16;

    pub trait Sealed {}

    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for f16 {}
    impl Sealed for u8 {}
}
