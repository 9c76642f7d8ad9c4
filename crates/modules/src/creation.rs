//! Per-supermodule table of module creators.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::foreign::{ForeignModule, ForeignRef, ForeignValue};
use crate::{ConstructModule, ModuleError, ModuleHandle, ModuleId, Result};

/// A creator: builds the module with the given id.
pub type CreatorFn = Arc<dyn Fn(ModuleId) -> Result<ModuleHandle> + Send + Sync>;

/// Map from module name to creator.
#[derive(Clone, Default)]
pub struct CreationFuncs {
	creators: FxHashMap<String, CreatorFn>,
}

impl CreationFuncs {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn has_creator(&self, name: &str) -> bool {
		self.creators.contains_key(name)
	}

	/// Returns the creator for `name`. `path` only labels the error.
	pub fn get_creator(&self, name: &str, path: &str) -> Result<CreatorFn> {
		self.creators.get(name).cloned().ok_or_else(|| ModuleError::MissingCreator {
			name: name.to_string(),
			path: path.to_string(),
		})
	}

	/// Registers a creator that constructs a native `T`.
	pub fn add_native_creator<T: ConstructModule>(&mut self, name: impl Into<String>) {
		self.add_creator(name, |id| Ok(ModuleHandle::native(Box::new(T::construct(id)))));
	}

	/// Registers a creator that calls `callable(id)` in the interpreter.
	pub fn add_foreign_creator(&mut self, name: impl Into<String>, callable: ForeignRef) {
		let name = name.into();
		let label = name.clone();
		self.add_creator(name, move |id| {
			let arg = i64::try_from(id).map_err(|_| ModuleError::Foreign(format!("module id {id} does not fit an interpreter int")))?;
			let value = callable.call(&[ForeignValue::Int(arg)]).map_err(ModuleError::Foreign)?;
			match value {
				ForeignValue::Object(object) => Ok(ModuleHandle::foreign(ForeignModule::new(id, object))),
				ForeignValue::None => Ok(ModuleHandle::empty()),
				other => Err(ModuleError::Foreign(format!("creator '{label}' returned {other:?}, expected an object"))),
			}
		});
	}

	/// Registers an arbitrary creator closure.
	pub fn add_creator<F>(&mut self, name: impl Into<String>, creator: F)
	where
		F: Fn(ModuleId) -> Result<ModuleHandle> + Send + Sync + 'static,
	{
		self.creators.insert(name.into(), Arc::new(creator));
	}

	/// Drops every creator.
	pub fn clear(&mut self) {
		self.creators.clear();
	}

	/// Registered module names, sorted.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.creators.keys().cloned().collect();
		names.sort();
		names
	}

	pub fn len(&self) -> usize {
		self.creators.len()
	}

	pub fn is_empty(&self) -> bool {
		self.creators.is_empty()
	}
}

impl std::fmt::Debug for CreationFuncs {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CreationFuncs").field("names", &self.names()).finish()
	}
}
