use std::{path::PathBuf, sync::Arc};

use derive_more::Display;
use dyn_clone::DynClone;
use itertools::Itertools;
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{tensor::TensorError, workspace::Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Io {
    #[display("input")]
    Input,
    #[display("output")]
    Output,
}

#[derive(Debug, Error)]
pub enum OpError {
    #[error("unsupported operation type `{0}`")]
    Unsupported(String),
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("invalid field `{0}`: {1}")]
    InvalidField(String, #[source] serde_json::Error),
    #[error("missing {0} tensor name at position {1}")]
    MissingTensorName(Io, usize),
    #[error("expect {0} output tensors, found {1}")]
    Outputs(usize, usize),
    #[error("unsupported data type `{0}`")]
    DataType(String),
    #[error("missing tensor `{0}` in workspace")]
    MissingTensor(String),
    #[error("shape error: {0}")]
    Shape(String),
    #[error("failed to read resource {}: {source}", .path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("resource {} is truncated: expected {expected} bytes, found {found}", .path.display())]
    Truncated {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("malformed image {}: {reason}", .path.display())]
    Image { path: PathBuf, reason: String },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// One step of a program: an operation tag, the names of the tensors it reads and writes,
/// and whatever extra fields the operation needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpDesc {
    pub r#type: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OpDesc {
    #[inline]
    pub fn new(r#type: impl Into<String>) -> Self {
        Self {
            r#type: r#type.into(),
            inputs: vec![],
            outputs: vec![],
            fields: Map::new(),
        }
    }

    pub fn with_inputs<S: Into<String>>(mut self, inputs: impl IntoIterator<Item = S>) -> Self {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<S: Into<String>>(mut self, outputs: impl IntoIterator<Item = S>) -> Self {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Name of the `index`-th input tensor.
    #[inline]
    pub fn input(&self, index: usize) -> Result<&str, OpError> {
        self.inputs
            .get(index)
            .map(String::as_str)
            .ok_or(OpError::MissingTensorName(Io::Input, index))
    }

    /// Name of the `index`-th output tensor.
    #[inline]
    pub fn output(&self, index: usize) -> Result<&str, OpError> {
        self.outputs
            .get(index)
            .map(String::as_str)
            .ok_or(OpError::MissingTensorName(Io::Output, index))
    }

    /// Deserializes a required field.
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Result<T, OpError> {
        let value = self
            .fields
            .get(key)
            .ok_or_else(|| OpError::MissingField(key.to_string()))?;
        T::deserialize(value).map_err(|err| OpError::InvalidField(key.to_string(), err))
    }

    /// Deserializes an optional field, falling back to `default` when it is absent.
    pub fn field_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, OpError> {
        match self.fields.contains_key(key) {
            true => self.field(key),
            false => Ok(default),
        }
    }
}

impl std::fmt::Display for OpDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}([{}]) -> [{}]",
            self.r#type,
            self.inputs.iter().format(", "),
            self.outputs.iter().format(", ")
        )
    }
}

/// The handler bound to an operation tag.
/// Reads its tensors from the workspace by name and writes its results back the same way.
pub trait Operation: DynClone + Send + Sync {
    /// The `type` tag of the descriptors this operation handles.
    fn r#type(&self) -> &str;
    /// Runs the operation described by `op` against `workspace`.
    fn execute(&self, op: &OpDesc, workspace: &mut Workspace) -> Result<(), OpError>;
}

dyn_clone::clone_trait_object!(Operation);

type OpVTable = HashMap<String, Box<dyn Operation>>;

/// Maps operation tags to their handlers.
#[derive(Clone, Default)]
pub struct Registry {
    ops: Arc<OpVTable>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("ops", &self.types())
            .finish()
    }
}

impl Registry {
    #[inline]
    pub fn get(&self, r#type: &str) -> Result<&dyn Operation, OpError> {
        self.ops
            .get(r#type)
            .map(|op| &**op)
            .ok_or_else(|| OpError::Unsupported(r#type.to_string()))
    }

    #[inline]
    pub fn contains(&self, r#type: &str) -> bool {
        self.ops.contains_key(r#type)
    }

    /// Registered tags, sorted.
    pub fn types(&self) -> Vec<&str> {
        self.ops.keys().map(String::as_str).sorted().collect()
    }

    /// Dispatches `op` to the handler registered for its tag.
    #[inline]
    pub fn execute(&self, op: &OpDesc, workspace: &mut Workspace) -> Result<(), OpError> {
        self.get(&op.r#type)?.execute(op, workspace)
    }
}

#[derive(Clone, Default)]
pub struct RegistryBuilder {
    ops: OpVTable,
}

impl RegistryBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `op` under its tag, replacing any handler registered before under the same tag.
    pub fn add_op(mut self, op: impl Operation + 'static) -> Self {
        let r#type = op.r#type().to_string();
        self.ops.insert(r#type, Box::new(op));
        self
    }

    pub fn build(self) -> Registry {
        let ops = Arc::new(self.ops);
        Registry { ops }
    }
}
