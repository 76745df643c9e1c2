//! `weave` interprets serialized tensor programs.
//!
//! A program is an ordered list of operation descriptors, usually read from the `net.json` manifest
//! of a bundle directory. Each descriptor names the tensors it reads and writes; the program runs
//! the descriptors one by one, dispatching each through a [`Registry`](loom::ops::Registry) against
//! a [`Workspace`](loom::workspace::Workspace) that owns every named tensor.
//!
//! ```no_run
//! use weave::{
//!     loom::{ops::RegistryBuilder, workspace::Workspace},
//!     program::Program,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = RegistryBuilder::new().add_default_ops().build();
//! let mut workspace = Workspace::new("bundle");
//! let mut program = Program::new();
//! program.load("bundle")?;
//! program.execute(&registry, &mut workspace)?;
//! println!("{workspace}");
//! # Ok(())
//! # }
//! ```

pub mod hal;
pub mod loom;
pub mod program;
