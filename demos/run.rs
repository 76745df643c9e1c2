use std::error::Error;

use weave::{
    loom::{ops::RegistryBuilder, workspace::Workspace},
    program::Program,
};

fn main() -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "trace")]
    {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: run <bundle>");
        return Ok(());
    };

    let registry = RegistryBuilder::new().add_default_ops().build();
    let mut program = Program::new();
    program.load(&path)?;
    println!("{program}");

    let mut workspace = Workspace::new(&path);
    program.execute(&registry, &mut workspace)?;
    println!("{workspace}");

    Ok(())
}
