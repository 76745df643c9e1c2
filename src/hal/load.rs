use crate::loom::{
    num::DataType,
    ops::{OpDesc, OpError, Operation},
    shape::Shape,
    workspace::Workspace,
};

use super::ResourcePolicy;

/// Maps the manifest's data type names to element types.
pub fn parse_data_type(name: &str) -> Result<DataType, OpError> {
    match name {
        "single" => Ok(DataType::F32),
        "double" => Ok(DataType::F64),
        _ => Err(OpError::DataType(name.to_string())),
    }
}

/// Loads a raw tensor dump into the workspace.
///
/// The descriptor names one output and carries `fileName` (relative to the workspace base),
/// `dataType` and `shape`. The file holds exactly the tensor's bytes in native order.
///
/// An output that already exists is left untouched unless [`Load::force_reload`] is set.
#[derive(Debug, Default, Clone)]
pub struct Load {
    /// Reload the file even if the output tensor is already in the workspace.
    pub force_reload: bool,
    /// What to do when the file is missing or short.
    pub missing_resource: ResourcePolicy,
}

impl Load {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_force_reload(mut self, force_reload: bool) -> Self {
        self.force_reload = force_reload;
        self
    }

    #[inline]
    pub fn with_missing_resource(mut self, policy: ResourcePolicy) -> Self {
        self.missing_resource = policy;
        self
    }
}

impl Operation for Load {
    fn r#type(&self) -> &str {
        "Load"
    }

    fn execute(&self, op: &OpDesc, workspace: &mut Workspace) -> Result<(), OpError> {
        if op.outputs.len() > 1 {
            return Err(OpError::Outputs(1, op.outputs.len()));
        }
        let name = op.output(0)?;
        let file_name: String = op.field("fileName")?;
        let r#type = parse_data_type(&op.field::<String>("dataType")?)?;
        let shape: Shape = op.field("shape")?;

        if !self.force_reload && workspace.exists(name) {
            log::debug!("{name} is cached, skip loading {file_name}");
            return Ok(());
        }

        let created = !workspace.exists(name);
        let tensor = workspace.get_or_create(name, r#type, shape)?;
        let path = workspace.resolve(&file_name);
        let result = super::read_resource(&path, &tensor, self.missing_resource);
        if result.is_err() && created {
            // a failed load must not leave a zero tensor that later runs take as cached
            workspace.remove(name);
        }
        result
    }
}
