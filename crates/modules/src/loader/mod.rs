//! Supermodule loaders.
//!
//! A loader turns a supermodule path into a [`CreationFuncs`] table. Loading
//! is idempotent per path, and every unit stays open until the loader is
//! dropped.

mod interpreted;
mod native;


pub use interpreted::InterpretedLoader;
pub use native::{FINALIZE_SYMBOL, HookFn, INITIALIZE_SYMBOL, INSERT_SYMBOL, InsertFn, LibloadingBackend, NativeBackend, NativeLoader};

use crate::{CreationFuncs, ModuleError, Result, SupermoduleKind};

/// Opens supermodules of one kind.
pub trait SupermoduleLoader: Send {
	/// Kind of supermodule this loader opens.
	fn kind(&self) -> SupermoduleKind;

	/// Loads `path` (once) and returns its creators.
	fn load_supermodule(&mut self, path: &str) -> Result<&CreationFuncs>;

	/// Paths loaded so far, in load order.
	fn loaded_paths(&self) -> Vec<String>;
}

fn reject_empty(path: &str) -> Result<()> {
	if path.is_empty() {
		return Err(ModuleError::Load {
			path: String::new(),
			reason: "supermodule path is empty".to_string(),
		});
	}
	Ok(())
}
