use std::fmt;
use std::hash::{Hash, Hasher};

use pulsar_options::OptionMap;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

/// How a supermodule is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupermoduleKind {
	/// A shared library exporting the native entry points.
	Native,
	/// A script loaded through the embedded interpreter.
	Interpreted,
}

impl SupermoduleKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Native => "native",
			Self::Interpreted => "interpreted",
		}
	}
}

impl fmt::Display for SupermoduleKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Descriptor of a loadable module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInfo {
	/// Name of the module inside its supermodule.
	pub name: String,
	/// Loader kind.
	pub kind: SupermoduleKind,
	/// Capability family the module implements.
	pub base: String,
	/// Supermodule path.
	pub path: String,
	pub version: String,
	pub description: String,
	pub authors: Vec<String>,
	pub refs: Vec<String>,
	/// Declared options and their current values.
	pub options: OptionMap,
}

impl ModuleInfo {
	/// Creates a descriptor with empty metadata and no options.
	pub fn new(name: impl Into<String>, kind: SupermoduleKind, path: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			kind,
			base: String::new(),
			path: path.into(),
			version: String::new(),
			description: String::new(),
			authors: Vec::new(),
			refs: Vec::new(),
			options: OptionMap::new(),
		}
	}

	pub fn with_base(mut self, base: impl Into<String>) -> Self {
		self.base = base.into();
		self
	}

	pub fn with_version(mut self, version: impl Into<String>) -> Self {
		self.version = version.into();
		self
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn with_options(mut self, options: OptionMap) -> Self {
		self.options = options;
		self
	}

	/// Cache scope shared by every instance of this name and version.
	pub fn cache_scope(&self) -> String {
		format!("{}_v{}", self.name, self.version)
	}

	/// Hex digest of every field, option values included.
	pub fn content_hash(&self) -> String {
		let mut hasher = FxHasher::default();
		self.hash(&mut hasher);
		format!("{:016x}", hasher.finish())
	}
}
