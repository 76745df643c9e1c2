use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::loom::{
    ops::{OpDesc, OpError, Registry},
    workspace::Workspace,
};

/// File name of the manifest inside a bundle directory.
pub const MANIFEST: &str = "net.json";

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to open manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("operation #{index} `{op}` failed: {source}")]
    Execute {
        index: usize,
        op: String,
        #[source]
        source: OpError,
    },
}

/// The serialized form of a program.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub operations: Vec<OpDesc>,
}

/// What [`Program::load`] does when the manifest cannot be opened.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MissingManifest {
    #[default]
    Error,
    /// Log a warning and keep the program loaded before.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramOptions {
    /// Manifest file name, relative to the bundle directory.
    pub manifest: String,
    pub missing_manifest: MissingManifest,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            manifest: MANIFEST.to_string(),
            missing_manifest: MissingManifest::default(),
        }
    }
}

/// An ordered list of operations, executed one after another against a [`Workspace`].
#[derive(Debug, Default, Clone)]
pub struct Program {
    options: ProgramOptions,
    manifest: Option<Manifest>,
}

impl FromStr for Program {
    type Err = ProgramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let manifest = serde_json::from_str(s)?;
        Ok(Self::from_manifest(manifest))
    }
}

impl Program {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_options(options: ProgramOptions) -> Self {
        Self {
            options,
            manifest: None,
        }
    }

    #[inline]
    pub fn from_manifest(manifest: Manifest) -> Self {
        Self {
            options: Default::default(),
            manifest: Some(manifest),
        }
    }

    #[inline]
    pub fn options(&self) -> &ProgramOptions {
        &self.options
    }

    /// Loads the manifest of the bundle at `path`, replacing the current program.
    ///
    /// On failure the current program is kept. A manifest that cannot be opened is only an error
    /// under [`MissingManifest::Error`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), ProgramError> {
        let path = path.as_ref().join(&self.options.manifest);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(source) => {
                let err = ProgramError::Manifest { path, source };
                return match self.options.missing_manifest {
                    MissingManifest::Error => Err(err),
                    MissingManifest::Ignore => {
                        log::warn!("{err}");
                        Ok(())
                    }
                };
            }
        };
        self.load_str(&text)?;
        log::info!("loaded {} operations from {}", self.len(), path.display());
        Ok(())
    }

    /// Parses a manifest document, replacing the current program. On failure the current program is kept.
    pub fn load_str(&mut self, text: &str) -> Result<(), ProgramError> {
        let manifest = serde_json::from_str(text)?;
        self.manifest = Some(manifest);
        Ok(())
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.manifest.is_some()
    }

    #[inline]
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    #[inline]
    pub fn operations(&self) -> &[OpDesc] {
        self.manifest
            .as_ref()
            .map(|manifest| manifest.operations.as_slice())
            .unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.operations().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.operations().is_empty()
    }

    /// Runs every operation in order, stopping at the first one that fails.
    ///
    /// Nothing is rolled back: operations before the failing one keep their effects on `workspace`.
    /// An unloaded program does nothing.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub fn execute(
        &self,
        registry: &Registry,
        workspace: &mut Workspace,
    ) -> Result<(), ProgramError> {
        for (index, op) in self.operations().iter().enumerate() {
            #[cfg(feature = "trace")]
            let _span = tracing::debug_span!("op", index, op = %op).entered();

            let start = instant::Instant::now();
            registry
                .execute(op, workspace)
                .map_err(|source| ProgramError::Execute {
                    index,
                    op: op.r#type.clone(),
                    source,
                })?;
            log::debug!("#{index} {op}: {:?}", start.elapsed());
        }
        Ok(())
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.manifest {
            Some(manifest) => {
                let text = serde_json::to_string_pretty(manifest).map_err(|_| std::fmt::Error)?;
                write!(f, "{text}")
            }
            None => write!(f, "<unloaded>"),
        }
    }
}
