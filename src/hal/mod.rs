//! Built-in operations: loading raw tensors and images from a bundle, and convolution.

use std::{fs::File, io::Read, path::Path};

use crate::loom::{
    ops::{OpError, RegistryBuilder},
    tensor::Tensor,
};

pub mod conv;
pub mod image;
pub mod load;

pub use conv::Conv;
pub use image::LoadImage;
pub use load::Load;

/// What a loading operation does when its resource file is missing, unreadable or short.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePolicy {
    /// Fail the operation.
    #[default]
    Fail,
    /// Log a warning and carry on with whatever the buffer holds.
    Warn,
}

impl ResourcePolicy {
    #[inline]
    pub fn handle(self, err: OpError) -> Result<(), OpError> {
        match self {
            ResourcePolicy::Fail => Err(err),
            ResourcePolicy::Warn => {
                log::warn!("{err}");
                Ok(())
            }
        }
    }
}

/// Reads the raw bytes of `path` into the buffer of `tensor`, without any byte-order conversion.
fn read_resource(path: &Path, tensor: &Tensor, policy: ResourcePolicy) -> Result<(), OpError> {
    let resource = |source| OpError::Resource {
        path: path.to_path_buf(),
        source,
    };

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) => return policy.handle(resource(err)),
    };

    let mut data = tensor.write()?;
    let expected = data.len();
    let mut found = 0;
    while found < expected {
        match file.read(&mut data[found..]) {
            Ok(0) => break,
            Ok(count) => found += count,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return policy.handle(resource(err)),
        }
    }

    if found < expected {
        let path = path.to_path_buf();
        return policy.handle(OpError::Truncated {
            path,
            expected,
            found,
        });
    }
    Ok(())
}

impl RegistryBuilder {
    /// Registers `Load`, `LoadImage` and `Conv` with their default options.
    pub fn add_default_ops(self) -> Self {
        self.add_op(Load::default())
            .add_op(LoadImage::default())
            .add_op(Conv)
    }
}
