use std::path::Path;

use indexmap::IndexMap;
use libloading::Library;

use super::{SupermoduleLoader, reject_empty};
use crate::{CreationFuncs, ModuleError, Result, SupermoduleKind};

/// Mandatory entry point returning the supermodule's creators.
pub const INSERT_SYMBOL: &str = "insert_supermodule";
/// Optional entry point run after opening.
pub const INITIALIZE_SYMBOL: &str = "initialize_supermodule";
/// Optional entry point run before closing.
pub const FINALIZE_SYMBOL: &str = "finalize_supermodule";

/// Signature of the optional initialize/finalize hooks.
pub type HookFn = fn();

/// Signature of the insert entry point.
///
/// This is a Rust-ABI function, so supermodules must be built with the same
/// compiler and `pulsar-modules` version as the host.
pub type InsertFn = fn() -> CreationFuncs;

/// How native units are opened and queried.
pub trait NativeBackend: Send {
	type Library: Send;

	fn open(&mut self, path: &Path) -> std::result::Result<Self::Library, String>;

	fn hook(&self, library: &Self::Library, symbol: &str) -> Option<HookFn>;

	fn inserter(&self, library: &Self::Library, symbol: &str) -> Option<InsertFn>;

	fn close(&mut self, library: Self::Library);
}

/// Shared libraries opened with `libloading`.
#[derive(Debug, Default)]
pub struct LibloadingBackend;

fn symbol_name(symbol: &str) -> Vec<u8> {
	let mut name = symbol.as_bytes().to_vec();
	name.push(0);
	name
}

impl NativeBackend for LibloadingBackend {
	type Library = Library;

	fn open(&mut self, path: &Path) -> std::result::Result<Library, String> {
		// SAFETY: opening a supermodule runs its global constructors; loading
		// trusted code is the purpose of this backend.
		unsafe { Library::new(path) }.map_err(|e| e.to_string())
	}

	fn hook(&self, library: &Library, symbol: &str) -> Option<HookFn> {
		// SAFETY: the exported hooks are declared as `fn()` by the ABI.
		unsafe { library.get::<HookFn>(&symbol_name(symbol)) }.ok().map(|sym| *sym)
	}

	fn inserter(&self, library: &Library, symbol: &str) -> Option<InsertFn> {
		// SAFETY: the insert entry point is declared as `fn() -> CreationFuncs`.
		unsafe { library.get::<InsertFn>(&symbol_name(symbol)) }.ok().map(|sym| *sym)
	}

	fn close(&mut self, library: Library) {
		if let Err(e) = library.close() {
			tracing::warn!(error = %e, "supermodule.close_failed");
		}
	}
}

struct NativeUnit<L> {
	library: L,
	funcs: CreationFuncs,
}

/// Loader for shared-library supermodules.
pub struct NativeLoader<B: NativeBackend = LibloadingBackend> {
	backend: B,
	units: IndexMap<String, NativeUnit<B::Library>>,
}

impl NativeLoader<LibloadingBackend> {
	pub fn new() -> Self {
		Self::with_backend(LibloadingBackend)
	}
}

impl Default for NativeLoader<LibloadingBackend> {
	fn default() -> Self {
		Self::new()
	}
}

impl<B: NativeBackend> NativeLoader<B> {
	pub fn with_backend(backend: B) -> Self {
		Self {
			backend,
			units: IndexMap::new(),
		}
	}

	pub fn backend(&self) -> &B {
		&self.backend
	}

	fn open_unit(&mut self, path: &str) -> Result<NativeUnit<B::Library>> {
		let library = self.backend.open(Path::new(path)).map_err(|reason| ModuleError::Load {
			path: path.to_string(),
			reason,
		})?;

		let Some(insert) = self.backend.inserter(&library, INSERT_SYMBOL) else {
			self.backend.close(library);
			return Err(ModuleError::MissingEntryPoint {
				path: path.to_string(),
				symbol: INSERT_SYMBOL,
			});
		};

		match self.backend.hook(&library, INITIALIZE_SYMBOL) {
			Some(init) => {
				init();
				tracing::debug!(path, "supermodule.initialized");
			}
			None => tracing::debug!(path, symbol = INITIALIZE_SYMBOL, "supermodule.hook_missing"),
		}

		let funcs = insert();
		tracing::debug!(path, creators = funcs.len(), "supermodule.loaded");
		Ok(NativeUnit {
			library,
			funcs,
		})
	}
}

impl<B: NativeBackend> SupermoduleLoader for NativeLoader<B> {
	fn kind(&self) -> SupermoduleKind {
		SupermoduleKind::Native
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

impl<B: NativeBackend> Drop for NativeLoader<B> {
	fn drop(&mut self) {
		while let Some((path, NativeUnit { library, mut funcs })) = self.units.pop() {
			match self.backend.hook(&library, FINALIZE_SYMBOL) {
				Some(finalize) => {
					finalize();
					tracing::debug!(path = %path, "supermodule.finalized");
				}
				None => tracing::debug!(path = %path, symbol = FINALIZE_SYMBOL, "supermodule.hook_missing"),
			}
			// Creators may capture code from the library.
			funcs.clear();
			self.backend.close(library);
			tracing::debug!(path = %path, "supermodule.unloaded");
		}
	}
}
