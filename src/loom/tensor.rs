use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use half::f16;
use thiserror::Error;

use super::{
    num::{DataType, Scalar},
    shape::Shape,
};

#[derive(Debug, Error)]
pub enum TensorError {
    #[error("tensor type error: data type {0} mismatches {1}")]
    Type(DataType, DataType),
    #[error("tensor size error: shape {0} holds {1} elements but data has {2}")]
    Size(Shape, usize, usize),
    #[error("tensor is empty")]
    Empty,
    #[error("tensor allocation error: byte size of shape {0} with type {1} overflows")]
    Overflow(Shape, DataType),
    #[error("tensor allocation error: failed to allocate {0} bytes")]
    Alloc(usize),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId;

/// Shared CPU storage of a tensor.
pub type Buffer = Arc<RwLock<Box<[u8]>>>;

/// A handle to a typed, shaped byte buffer.
///
/// Cloning a handle shares the buffer. A handle may also be *empty*, carrying no buffer at all;
/// this is how a missing or not yet materialized tensor is represented.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Shape,
    r#type: DataType,
    data: Option<Buffer>,
    id: uid::Id<TensorId>,
}

impl Default for Tensor {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl Tensor {
    /// Create an empty tensor with no buffer.
    #[inline]
    pub fn empty() -> Self {
        Self {
            shape: Shape::default(),
            r#type: DataType::default(),
            data: None,
            id: uid::Id::new(),
        }
    }

    /// Allocate a zero-filled tensor of the given type and shape.
    ///
    /// Returns [`TensorError::Overflow`] if the byte size is not representable,
    /// and [`TensorError::Alloc`] if the memory cannot be reserved.
    pub fn zeros(r#type: DataType, shape: impl Into<Shape>) -> Result<Self, TensorError> {
        let shape = shape.into();
        let size = shape
            .checked_size()
            .and_then(|count| count.checked_mul(r#type.size()))
            .ok_or_else(|| TensorError::Overflow(shape.clone(), r#type))?;

        let mut contents = Vec::new();
        contents
            .try_reserve_exact(size)
            .map_err(|_| TensorError::Alloc(size))?;
        contents.resize(size, 0u8);

        let data = Some(Arc::new(RwLock::new(contents.into_boxed_slice())));
        let id = uid::Id::new();
        Ok(Self {
            shape,
            r#type,
            data,
            id,
        })
    }

    /// Create a tensor from typed contents. The number of elements must match the shape.
    pub fn from_slice<T: Scalar>(
        shape: impl Into<Shape>,
        contents: &[T],
    ) -> Result<Self, TensorError> {
        let tensor = Self::zeros(T::DATA_TYPE, shape)?;
        tensor.write_slice(contents)?;
        Ok(tensor)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape.clone()
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.r#type
    }

    #[inline]
    pub fn id(&self) -> uid::Id<TensorId> {
        self.id
    }

    /// Number of elements held by the buffer; zero for an empty tensor.
    #[inline]
    pub fn data_count(&self) -> usize {
        match self.data {
            Some(_) => self.shape.size(),
            None => 0,
        }
    }

    /// Length of the buffer in bytes; zero for an empty tensor.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.data_count() * self.r#type.size()
    }

    /// Returns `true` if the tensor has exactly this type and shape.
    #[inline]
    pub fn matches(&self, r#type: DataType, shape: &Shape) -> bool {
        !self.is_empty() && self.r#type == r#type && &self.shape == shape
    }

    /// Returns `true` if both handles refer to the same buffer.
    #[inline]
    pub fn same_buffer(&self, other: &Tensor) -> bool {
        match (&self.data, &other.data) {
            (Some(x), Some(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Number of handles sharing the buffer; zero for an empty tensor.
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.data.as_ref().map_or(0, Arc::strong_count)
    }

    #[inline]
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Box<[u8]>>, TensorError> {
        let data = self.data.as_ref().ok_or(TensorError::Empty)?;
        Ok(data.read().expect("failed to lock"))
    }

    #[inline]
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Box<[u8]>>, TensorError> {
        let data = self.data.as_ref().ok_or(TensorError::Empty)?;
        Ok(data.write().expect("failed to lock"))
    }

    #[inline]
    fn check_type<T: Scalar>(&self) -> Result<(), TensorError> {
        match self.r#type == T::DATA_TYPE {
            true => Ok(()),
            false => Err(TensorError::Type(self.r#type, T::DATA_TYPE)),
        }
    }

    /// Copy the contents out as typed elements. Returns error if type mismatches.
    pub fn read_slice<T: Scalar>(&self) -> Result<Vec<T>, TensorError> {
        self.check_type::<T>()?;
        let data = self.read()?;
        Ok(bytemuck::pod_collect_to_vec(&data[..]))
    }

    /// Overwrite the contents with typed elements. Returns error if type or length mismatches.
    pub fn write_slice<T: Scalar>(&self, contents: &[T]) -> Result<(), TensorError> {
        self.check_type::<T>()?;
        let count = self.data_count();
        if contents.len() != count {
            return Err(TensorError::Size(self.shape(), count, contents.len()));
        }
        let mut data = self.write()?;
        data.copy_from_slice(bytemuck::cast_slice(contents));
        Ok(())
    }

    /// Format the first element of the buffer, if any.
    fn peek(&self) -> Option<String> {
        let data = self.read().ok()?;
        let bytes = data.get(..self.r#type.size())?;
        let text = match self.r#type {
            DataType::F32 => bytemuck::pod_read_unaligned::<f32>(bytes).to_string(),
            DataType::F64 => bytemuck::pod_read_unaligned::<f64>(bytes).to_string(),
            DataType::F16 => bytemuck::pod_read_unaligned::<f16>(bytes).to_string(),
            DataType::U8 => bytes[0].to_string(),
        };
        Some(text)
    }
}

impl std::fmt::Display for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "<no data>");
        }
        write!(f, "{} {}", self.shape, self.r#type)?;
        match self.peek() {
            Some(first) => write!(f, " {first} ..."),
            None => Ok(()),
        }
    }
}
