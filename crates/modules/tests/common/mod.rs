//! Shared fixtures: an in-memory loader and a scripted interpreter.

#![allow(dead_code)]

use std::sync::Arc;

use pulsar_cache::CachePolicy;
use pulsar_modules::{
	ConstructModule, CreationFuncs, ForeignObject, ForeignRef, ForeignValue, Interpreter, Module, ModuleCore, ModuleError, ModuleId,
	SupermoduleKind, SupermoduleLoader,
};
use rustc_hash::FxHashMap;

pub const CHEM_LIB: &str = "/opt/pulsar/libchem.so";

pub struct Scf {
	core: ModuleCore,
}

impl Module for Scf {
	fn core(&self) -> &ModuleCore {
		&self.core
	}

	fn core_mut(&mut self) -> &mut ModuleCore {
		&mut self.core
	}
}

impl ConstructModule for Scf {
	fn construct(id: ModuleId) -> Self {
		Self { core: ModuleCore::new(id) }
	}
}

impl Scf {
	/// Publishes an energy to every rank and returns it.
	pub fn energy(&self, geometry: &str) -> Result<f64, ModuleError> {
		let key = format!("energy:{geometry}");
		let slice = self.core.cache()?;
		if let Some(cached) = slice.get::<f64>(&key, true)? {
			self.core.print("cache hit\n");
			return Ok(*cached);
		}
		let energy = -(geometry.len() as f64);
		slice.set(&key, energy, CachePolicy::DISTRIBUTE_GLOBAL)?;
		self.core.print("computed\n");
		Ok(energy)
	}
}

pub fn chem_funcs() -> CreationFuncs {
	let mut funcs = CreationFuncs::new();
	funcs.add_native_creator::<Scf>("Scf");
	funcs
}

/// Serves creator tables from memory.
#[derive(Default)]
pub struct StaticLoader {
	tables: FxHashMap<String, CreationFuncs>,
}

impl StaticLoader {
	pub fn with(mut self, path: &str, funcs: CreationFuncs) -> Self {
		self.tables.insert(path.to_string(), funcs);
		self
	}
}

impl SupermoduleLoader for StaticLoader {
	fn kind(&self) -> SupermoduleKind {
		SupermoduleKind::Native
	}

	fn load_supermodule(&mut self, path: &str) -> Result<&CreationFuncs, ModuleError> {
		self.tables.get(path).ok_or_else(|| ModuleError::Load {
			path: path.to_string(),
			reason: "no such supermodule".to_string(),
		})
	}

	fn loaded_paths(&self) -> Vec<String> {
		let mut paths: Vec<String> = self.tables.keys().cloned().collect();
		paths.sort();
		paths
	}
}

type CallFn = Box<dyn Fn(&[ForeignValue]) -> Result<ForeignValue, String> + Send + Sync>;

/// An interpreter object built from Rust closures.
pub struct ScriptObject {
	name: String,
	attrs: FxHashMap<String, ForeignRef>,
	call: Option<CallFn>,
}

impl ScriptObject {
	pub fn namespace(name: &str, attrs: Vec<(&str, ForeignRef)>) -> ForeignRef {
		Arc::new(Self {
			name: name.to_string(),
			attrs: attrs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
			call: None,
		})
	}

	pub fn function(call: impl Fn(&[ForeignValue]) -> Result<ForeignValue, String> + Send + Sync + 'static) -> ForeignRef {
		Arc::new(Self {
			name: "function".to_string(),
			attrs: FxHashMap::default(),
			call: Some(Box::new(call)),
		})
	}
}

impl ForeignObject for ScriptObject {
	fn type_name(&self) -> String {
		self.name.clone()
	}

	fn getattr(&self, name: &str) -> Option<ForeignRef> {
		self.attrs.get(name).cloned()
	}

	fn call(&self, args: &[ForeignValue]) -> Result<ForeignValue, String> {
		match &self.call {
			Some(call) => call(args),
			None => Err(format!("'{}' object is not callable", self.name)),
		}
	}
}

#[derive(Default)]
pub struct ScriptInterpreter {
	scripts: FxHashMap<String, ForeignRef>,
}

impl ScriptInterpreter {
	pub fn with(mut self, path: &str, module: ForeignRef) -> Self {
		self.scripts.insert(path.to_string(), module);
		self
	}
}

impl Interpreter for ScriptInterpreter {
	fn import(&self, path: &str) -> Result<ForeignRef, String> {
		self.scripts.get(path).cloned().ok_or_else(|| format!("ModuleNotFoundError: {path}"))
	}
}

/// A script whose `Greeter` class answers `greet(name)`.
pub fn greeter_script() -> ForeignRef {
	let class = ScriptObject::function(|args| {
		let [ForeignValue::Int(id)] = args else {
			return Err("Greeter() takes one id".to_string());
		};
		let id = *id;
		let greet = ScriptObject::function(move |args| match args {
			[ForeignValue::Str(name)] => Ok(ForeignValue::Str(format!("hello {name} from {id}"))),
			_ => Err("greet() takes one string".to_string()),
		});
		Ok(ForeignValue::Object(ScriptObject::namespace("Greeter", vec![("greet", greet)])))
	});
	let insert = ScriptObject::function(move |_| Ok(ForeignValue::Map(vec![("Greeter".to_string(), ForeignValue::Object(Arc::clone(&class)))])));
	ScriptObject::namespace("module", vec![("InsertSupermodule", insert)])
}
