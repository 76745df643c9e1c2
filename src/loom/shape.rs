use std::sync::Arc;

use derive_more::{Deref, Display, From, Into};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Sizes of a tensor's dimensions, first dimension first.
///
/// Two shapes are equal iff they have the same number of dimensions with the same sizes in order.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Hash, Deref, From, Into, Display, Serialize, Deserialize,
)]
#[display("[{}]", _0.iter().format(", "))]
#[serde(transparent)]
pub struct Shape(Arc<[usize]>);

impl From<Vec<usize>> for Shape {
    #[inline]
    fn from(value: Vec<usize>) -> Self {
        Self(value.into())
    }
}

impl From<&[usize]> for Shape {
    #[inline]
    fn from(value: &[usize]) -> Self {
        Self(value.into())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    #[inline]
    fn from(value: [usize; N]) -> Self {
        Self(value.into())
    }
}

impl Shape {
    /// Number of elements, or `None` if it overflows `usize`.
    /// A shape without dimensions holds no elements.
    #[inline]
    pub fn checked_size(&self) -> Option<usize> {
        match self.is_empty() {
            true => Some(0),
            false => self.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim)),
        }
    }

    /// Number of elements. Saturates on overflow.
    #[inline]
    pub fn size(&self) -> usize {
        self.checked_size().unwrap_or(usize::MAX)
    }

    /// Size of dimension `index`, treating trailing missing dimensions as singletons.
    #[inline]
    pub fn dim(&self, index: usize) -> usize {
        self.get(index).copied().unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::Shape;

    #[test]
    fn test_shape() {
        let x = Shape::from([2, 3]);
        let y = Shape::from(vec![2, 3]);
        let z = Shape::from([3, 2]);
        let w = Shape::from([2, 3, 1]);

        assert_eq!(x, y);
        assert_ne!(x, z);
        assert_ne!(x, w);
        assert_eq!(x.size(), 6);
        assert_eq!(x.len(), 2);
        assert_eq!(x.dim(3), 1);
        assert_eq!(x.to_string(), "[2, 3]");

        assert_eq!(Shape::default().size(), 0);
        assert_eq!(Shape::from([4, 0, 2]).size(), 0);
        assert_eq!(Shape::from([usize::MAX, 2]).checked_size(), None);
    }

    #[test]
    fn test_shape_serde() -> Result<(), Box<dyn std::error::Error>> {
        let shape: Shape = serde_json::from_str("[2, 3, 4]")?;
        assert_eq!(shape, Shape::from([2, 3, 4]));
        assert_eq!(serde_json::to_string(&shape)?, "[2,3,4]");
        Ok(())
    }
}
