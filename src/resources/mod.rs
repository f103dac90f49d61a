//! Built-in resource types, executed on the local host.
//!
//! - `shell`: `run` a command through bash
//! - `file`: `write`, `read` and `remove` a file

pub mod file;
pub mod shell;

use crate::core::error::RegistryError;
use crate::core::registry::{Registry, RegistryBuilder};
use std::sync::Arc;

/// Register every built-in type on `builder`.
pub fn register_builtins(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder
        .register(shell::TYPE_KEY, Arc::new(shell::ShellExecutor), shell::schema())?
        .register(file::TYPE_KEY, Arc::new(file::FileExecutor), file::schema())?;
    Ok(())
}

/// A registry holding only the built-in types.
pub fn builtin_registry() -> Result<Registry, RegistryError> {
    let mut builder = Registry::builder();
    register_builtins(&mut builder)?;
    Ok(builder.build())
}
