use std::sync::Arc;

use indexmap::IndexMap;

use super::{SupermoduleLoader, reject_empty};
use crate::foreign::{ForeignRef, ForeignValue, Interpreter};
use crate::{CreationFuncs, ModuleError, Result, SupermoduleKind};

const INSERT_ATTR: &str = "InsertSupermodule";
const INITIALIZE_ATTR: &str = "InitializeSupermodule";
const FINALIZE_ATTR: &str = "FinalizeSupermodule";

struct ScriptUnit {
	module: ForeignRef,
	funcs: CreationFuncs,
}

/// Loader for supermodules written for the embedded interpreter.
pub struct InterpretedLoader {
	interpreter: Arc<dyn Interpreter>,
	units: IndexMap<String, ScriptUnit>,
}

impl InterpretedLoader {
	pub fn new(interpreter: Arc<dyn Interpreter>) -> Self {
		Self {
			interpreter,
			units: IndexMap::new(),
		}
	}

	fn run_hook(module: &ForeignRef, attr: &str, path: &str) -> Result<()> {
		match module.getattr(attr) {
			Some(hook) => hook.call(&[]).map(drop).map_err(|reason| ModuleError::Load {
				path: path.to_string(),
				reason: format!("{attr} failed: {reason}"),
			}),
			None => {
				tracing::debug!(path, symbol = attr, "supermodule.hook_missing");
				Ok(())
			}
		}
	}

	fn open_unit(&self, path: &str) -> Result<ScriptUnit> {
		let module = self.interpreter.import(path).map_err(|reason| ModuleError::Load {
			path: path.to_string(),
			reason,
		})?;
		let insert = module.getattr(INSERT_ATTR).ok_or_else(|| ModuleError::MissingEntryPoint {
			path: path.to_string(),
			symbol: INSERT_ATTR,
		})?;

		Self::run_hook(&module, INITIALIZE_ATTR, path)?;

		let listing = insert.call(&[]).map_err(|reason| ModuleError::Load {
			path: path.to_string(),
			reason: format!("{INSERT_ATTR} failed: {reason}"),
		})?;
		let ForeignValue::Map(creators) = listing else {
			return Err(ModuleError::Load {
				path: path.to_string(),
				reason: format!("{INSERT_ATTR} returned {listing:?}, expected a name -> creator map"),
			});
		};

		let mut funcs = CreationFuncs::new();
		for (name, creator) in creators {
			let ForeignValue::Object(callable) = creator else {
				return Err(ModuleError::Load {
					path: path.to_string(),
					reason: format!("creator for '{name}' is not callable"),
				});
			};
			funcs.add_foreign_creator(name, callable);
		}
		tracing::debug!(path, creators = funcs.len(), "supermodule.loaded");
		Ok(ScriptUnit { module, funcs })
	}
}

impl SupermoduleLoader for InterpretedLoader {
	fn kind(&self) -> SupermoduleKind {
		SupermoduleKind::Interpreted
	}

	fn load_supermodule(&mut self, path: &str) -> Result<&CreationFuncs> {
		reject_empty(path)?;
		if !self.units.contains_key(path) {
			let unit = self.open_unit(path)?;
			self.units.insert(path.to_string(), unit);
		}
		self.units.get(path).map(|unit| &unit.funcs).ok_or_else(|| ModuleError::Load {
			path: path.to_string(),
			reason: "unit vanished after loading".to_string(),
		})
	}

	fn loaded_paths(&self) -> Vec<String> {
		self.units.keys().cloned().collect()
	}
}

impl Drop for InterpretedLoader {
	fn drop(&mut self) {
		while let Some((path, ScriptUnit { module, mut funcs })) = self.units.pop() {
			if let Err(e) = Self::run_hook(&module, FINALIZE_ATTR, &path) {
				tracing::warn!(path = %path, error = %e, "supermodule.finalize_failed");
			}
			funcs.clear();
			drop(module);
			tracing::debug!(path = %path, "supermodule.unloaded");
		}
	}
}
