use std::path::{Path, PathBuf};

use itertools::Itertools;
use rustc_hash::FxHashMap as HashMap;

use super::{
    num::DataType,
    shape::Shape,
    tensor::{Tensor, TensorError},
};

/// A named store of tensors for one execution context.
///
/// Tensors are cached by name: asking for a name with the type and shape it already has returns the
/// same buffer, so re-running a program reuses every buffer whose `(name, type, shape)` is unchanged.
#[derive(Debug, Default)]
pub struct Workspace {
    /// Root against which relative resource file names are resolved.
    base: PathBuf,
    /// At most one tensor per name.
    tensors: HashMap<String, Tensor>,
}

impl Workspace {
    #[inline]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let tensors = HashMap::default();
        Self { base, tensors }
    }

    #[inline]
    pub fn exists(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Returns the tensor stored under `name`, or an empty tensor if there is none.
    #[inline]
    pub fn get(&self, name: &str) -> Tensor {
        self.tensors.get(name).cloned().unwrap_or_default()
    }

    /// Returns the tensor stored under `name` if it already has the requested type and shape.
    /// Otherwise releases whatever is stored under `name` and allocates a zero-filled replacement.
    ///
    /// If the allocation fails the old entry stays released.
    pub fn get_or_create(
        &mut self,
        name: &str,
        r#type: DataType,
        shape: impl Into<Shape>,
    ) -> Result<Tensor, TensorError> {
        let shape = shape.into();
        if let Some(tensor) = self.tensors.get(name) {
            if tensor.matches(r#type, &shape) {
                return Ok(tensor.clone());
            }
        }

        self.remove(name);
        let tensor = Tensor::zeros(r#type, shape)?;
        log::trace!("allocate {name}: {} {}", tensor.shape(), tensor.data_type());

        self.tensors.insert(name.to_string(), tensor.clone());
        Ok(tensor)
    }

    /// Stores a host-provided tensor under `name`, returning the one it replaces.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        tensor: Tensor,
    ) -> Result<Option<Tensor>, TensorError> {
        if tensor.is_empty() {
            return Err(TensorError::Empty);
        }
        Ok(self.tensors.insert(name.into(), tensor))
    }

    /// Releases the tensor stored under `name`. Does nothing if there is none.
    #[inline]
    pub fn remove(&mut self, name: &str) -> Option<Tensor> {
        let tensor = self.tensors.remove(name)?;
        log::trace!("release {name}: {} {}", tensor.shape(), tensor.data_type());
        Some(tensor)
    }

    /// Releases every tensor.
    pub fn clear(&mut self) {
        for (name, tensor) in self.tensors.drain() {
            log::trace!("release {name}: {} {}", tensor.shape(), tensor.data_type());
        }
    }

    #[inline]
    pub fn base_name(&self) -> &Path {
        &self.base
    }

    #[inline]
    pub fn set_base_name(&mut self, base: impl Into<PathBuf>) {
        self.base = base.into();
    }

    /// Resolves a resource file name relative to the base path.
    #[inline]
    pub fn resolve(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.base.join(file_name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Names of all stored tensors, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tensors.keys().cloned().sorted().collect()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.tensors.iter().map(|(name, tensor)| (name.as_str(), tensor))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Display for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Workspace:")?;
        for (name, tensor) in self.iter().sorted_by_key(|(name, _)| *name) {
            writeln!(f, "\t{name}: {tensor}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::Workspace;
    use crate::loom::{
        num::DataType,
        shape::Shape,
        tensor::{Tensor, TensorError},
    };

    #[test]
    fn test_absent() {
        let ws = Workspace::default();
        for name in ["x", "", "conv1"] {
            assert!(!ws.exists(name));
            assert!(ws.get(name).is_empty());
        }
        assert!(ws.is_empty());
    }

    #[test]
    fn test_cache_hit() -> Result<(), Box<dyn Error>> {
        let mut ws = Workspace::default();
        let x = ws.get_or_create("x", DataType::F32, [2, 3])?;
        x.write_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])?;

        let y = ws.get_or_create("x", DataType::F32, [2, 3])?;
        assert!(x.same_buffer(&y));
        assert_eq!(x.id(), y.id());
        assert_eq!(y.read_slice::<f32>()?, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let z = ws.get("x");
        assert!(z.same_buffer(&x));
        assert!(ws.exists("x"));
        assert_eq!(ws.len(), 1);
        Ok(())
    }

    #[test]
    fn test_realloc() -> Result<(), Box<dyn Error>> {
        let mut ws = Workspace::default();
        let shapes = [Shape::from([2, 3]), Shape::from([3, 2])];

        let mut last = ws.get_or_create("x", DataType::F32, shapes[0].clone())?;
        for index in 1..8 {
            let shape = shapes[index % 2].clone();
            let next = ws.get_or_create("x", DataType::F32, shape.clone())?;

            // the workspace dropped its handle to the previous buffer
            assert!(!next.same_buffer(&last));
            assert_eq!(last.ref_count(), 1);
            assert_eq!(next.ref_count(), 2);

            assert_eq!(next.shape(), shape);
            assert_eq!(next.data_size(), 24);
            assert_eq!(ws.len(), 1);
            last = next;
        }

        let retyped = ws.get_or_create("x", DataType::F64, shapes[1].clone())?;
        assert!(!retyped.same_buffer(&last));
        assert_eq!(retyped.data_type(), DataType::F64);
        assert_eq!(retyped.data_size(), 48);
        assert_eq!(retyped.read_slice::<f64>()?, vec![0.0; 6]);
        Ok(())
    }

    #[test]
    fn test_remove() -> Result<(), Box<dyn Error>> {
        let mut ws = Workspace::default();
        ws.get_or_create("x", DataType::F32, [4])?;
        ws.get_or_create("y", DataType::U8, [4])?;

        assert!(ws.remove("x").is_some());
        assert!(!ws.exists("x"));
        assert!(ws.remove("x").is_none());
        assert!(ws.remove("never").is_none());
        assert!(!ws.exists("x"));
        assert_eq!(ws.names(), vec!["y".to_string()]);
        Ok(())
    }

    #[test]
    fn test_insert() -> Result<(), Box<dyn Error>> {
        let mut ws = Workspace::default();
        let x = Tensor::from_slice([2], &[1u8, 2])?;
        assert!(ws.insert("x", x.clone())?.is_none());
        assert!(ws.get("x").same_buffer(&x));

        let replaced = ws.insert("x", Tensor::zeros(DataType::U8, [2])?)?;
        assert!(replaced.is_some_and(|tensor| tensor.same_buffer(&x)));

        assert!(matches!(
            ws.insert("y", Tensor::empty()),
            Err(TensorError::Empty)
        ));
        assert!(!ws.exists("y"));
        Ok(())
    }

    #[test]
    fn test_teardown() -> Result<(), Box<dyn Error>> {
        drop(Workspace::default());

        let mut ws = Workspace::default();
        let x = ws.get_or_create("x", DataType::F32, [1])?;
        drop(ws);
        assert_eq!(x.ref_count(), 1);

        let mut ws = Workspace::default();
        let handles = (0..16)
            .map(|index| ws.get_or_create(&format!("t{index}"), DataType::F16, [index + 1]))
            .collect::<Result<Vec<_>, _>>()?;
        assert!(handles.iter().all(|tensor| tensor.ref_count() == 2));

        ws.clear();
        assert!(ws.is_empty());
        assert!(handles.iter().all(|tensor| tensor.ref_count() == 1));
        drop(ws);
        Ok(())
    }

    #[test]
    fn test_base_name() {
        let mut ws = Workspace::new("bundle");
        assert_eq!(ws.base_name(), std::path::Path::new("bundle"));
        assert_eq!(ws.resolve("x.bin"), std::path::Path::new("bundle/x.bin"));

        ws.set_base_name("other");
        assert_eq!(ws.resolve("x.bin"), std::path::Path::new("other/x.bin"));
    }

    #[test]
    fn test_display() -> Result<(), Box<dyn Error>> {
        let mut ws = Workspace::default();
        ws.insert("b", Tensor::from_slice([2], &[0.5f32, 1.0])?)?;
        ws.get_or_create("a", DataType::U8, [3])?;

        let text = ws.to_string();
        assert_eq!(text, "Workspace:\n\ta: [3] U8 0 ...\n\tb: [2] F32 0.5 ...\n");
        Ok(())
    }
}
