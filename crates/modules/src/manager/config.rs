//! Declarative manager configuration.

use std::path::Path;

use indexmap::IndexMap;
use pulsar_options::{OptionEntry, OptionKind, OptionMap, OptionValue};
use serde::Deserialize;

use super::ModuleManager;
use crate::{ModuleError, ModuleInfo, Result, SupermoduleKind};

/// A TOML document listing modules to register.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
	#[serde(default)]
	pub debug_all: bool,
	#[serde(default, rename = "module")]
	pub modules: Vec<ModuleConfig>,
}

/// One `[[module]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
	/// Registry key.
	pub key: String,
	/// Module name inside the supermodule.
	pub name: String,
	#[serde(rename = "type")]
	pub kind: SupermoduleKind,
	pub path: String,
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub base: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub authors: Vec<String>,
	#[serde(default)]
	pub refs: Vec<String>,
	#[serde(default)]
	pub expert: bool,
	#[serde(default)]
	pub debug: bool,
	/// Declared options.
	#[serde(default)]
	pub options: IndexMap<String, OptionDeclConfig>,
	/// Overrides applied after registration.
	#[serde(default)]
	pub set: IndexMap<String, toml::Value>,
}

/// Declaration of one option.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionDeclConfig {
	pub kind: OptionKind,
	#[serde(default)]
	pub required: bool,
	pub default: Option<toml::Value>,
	#[serde(default)]
	pub help: String,
}

impl ManagerConfig {
	pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	/// Reads and parses a configuration file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|e| ModuleError::Config {
			path: path.to_path_buf(),
			reason: e.to_string(),
		})?;
		Self::from_toml_str(&text).map_err(|e| ModuleError::Config {
			path: path.to_path_buf(),
			reason: e.to_string(),
		})
	}
}

impl ModuleConfig {
	/// Builds the descriptor, declaring every option.
	pub fn to_info(&self) -> Result<ModuleInfo> {
		let mut options = OptionMap::new();
		for (name, decl) in &self.options {
			let option_error = |source| ModuleError::Option {
				key: self.key.clone(),
				source,
			};
			let mut entry = OptionEntry::new(decl.kind).help(decl.help.clone());
			if decl.required {
				entry = entry.required();
			}
			if let Some(default) = &decl.default {
				entry = entry.default(OptionValue::from_toml(name, decl.kind, default).map_err(option_error)?);
			}
			options.insert(name, entry).map_err(option_error)?;
		}
		options.set_expert(self.expert);

		Ok(ModuleInfo {
			name: self.name.clone(),
			kind: self.kind,
			base: self.base.clone(),
			path: self.path.clone(),
			version: self.version.clone(),
			description: self.description.clone(),
			authors: self.authors.clone(),
			refs: self.refs.clone(),
			options,
		})
	}
}

impl ModuleManager {
	/// Registers every module of `config` and applies its overrides.
	pub fn load_config(&self, config: &ManagerConfig) -> Result<()> {
		if config.debug_all {
			self.enable_debug_all(true);
		}
		for module in &config.modules {
			let mut info = module.to_info()?;
			for (option, value) in &module.set {
				info.options.change_toml(option, value).map_err(|source| ModuleError::Option {
					key: module.key.clone(),
					source,
				})?;
			}
			self.load_module_from_minfo(info, &module.key)?;
			if module.debug {
				self.enable_debug(&module.key, true)?;
			}
		}
		tracing::info!(modules = config.modules.len(), "manager.config_loaded");
		Ok(())
	}
}
