//! Errors raised while loading, registering, and creating modules.

use std::path::PathBuf;

use pulsar_cache::CacheError;
use pulsar_options::{OptionError, OptionIssues};
use thiserror::Error;

use crate::{ModuleId, SupermoduleKind};

/// Errors raised by the module subsystem.
#[derive(Debug, Error)]
pub enum ModuleError {
	/// A supermodule could not be opened.
	#[error("failed to load supermodule {path}: {reason}")]
	Load {
		/// Supermodule path.
		path: String,
		/// Loader diagnostic.
		reason: String,
	},

	/// A supermodule lacks its mandatory entry point.
	#[error("supermodule {path} does not export '{symbol}'")]
	MissingEntryPoint {
		/// Supermodule path.
		path: String,
		/// Missing symbol.
		symbol: &'static str,
	},

	/// No loader is registered for the descriptor's kind.
	#[error("no supermodule loader for kind '{kind}' needed by {path}")]
	UnknownLoader {
		/// Declared kind.
		kind: SupermoduleKind,
		/// Supermodule that needed it.
		path: String,
	},

	/// A key is already registered.
	#[error("module key '{0}' is already registered")]
	DuplicateKey(String),

	/// A key is not registered.
	#[error("module key '{0}' is not registered")]
	MissingKey(String),

	/// Options cannot change once a key has produced instances.
	#[error("cannot change options of '{key}': already used to create {times_created} module(s)")]
	InUse {
		/// Registry key.
		key: String,
		/// Instances created so far.
		times_created: u64,
	},

	/// The supermodule does not provide a creator for the module name.
	#[error("supermodule {path} has no creator for module '{name}'")]
	MissingCreator {
		/// Module name.
		name: String,
		/// Supermodule path.
		path: String,
	},

	/// The creator failed or panicked.
	#[error("creating '{name}' from {path} for key '{key}' failed: {reason}")]
	Creation {
		/// Registry key.
		key: String,
		/// Module name.
		name: String,
		/// Supermodule path.
		path: String,
		/// Failure description.
		reason: String,
	},

	/// The created instance does not provide the requested type.
	#[error("module for key '{key}' is a {found}, not a {expected}")]
	TypeMismatch {
		/// Registry key.
		key: String,
		/// Requested type.
		expected: &'static str,
		/// Type the creator produced.
		found: String,
	},

	/// The parent id is not in the instance tree.
	#[error("parent module id {id} is not in the module tree")]
	MissingParent {
		/// Requested parent id.
		id: ModuleId,
	},

	/// An option operation failed.
	#[error("option error for key '{key}': {source}")]
	Option {
		/// Registry key.
		key: String,
		/// Underlying option error.
		#[source]
		source: OptionError,
	},

	/// Options failed validation at creation time.
	#[error("options of '{key}' failed validation: {issues}")]
	Validation {
		/// Registry key.
		key: String,
		/// Collected issues.
		issues: OptionIssues,
	},

	/// No tree node has this id.
	#[error("no module with id {id} in the module tree")]
	UnknownModule {
		/// Requested id.
		id: ModuleId,
	},

	/// The handle holds no module.
	#[error("module handle is empty")]
	EmptyHandle,

	/// The handle holds a module of the other origin.
	#[error("module handle holds a {found} module, expected {expected}")]
	WrongOrigin {
		/// Origin requested.
		expected: SupermoduleKind,
		/// Origin held.
		found: SupermoduleKind,
	},

	/// A module outlived its manager.
	#[error("module {id} is detached from its manager")]
	Detached {
		/// Module id.
		id: ModuleId,
	},

	/// The creator returned an empty handle.
	#[error("creator for '{name}' (key '{key}') returned no module")]
	NullModule {
		/// Registry key.
		key: String,
		/// Module name.
		name: String,
	},

	/// An interpreter operation failed.
	#[error("interpreter error: {0}")]
	Foreign(String),

	/// A computation state could not be encoded or decoded.
	#[error("computation state codec error: {0}")]
	State(String),

	/// A configuration file could not be read or parsed.
	#[error("invalid manager configuration {path}: {reason}")]
	Config {
		/// File involved.
		path: PathBuf,
		/// Diagnostic.
		reason: String,
	},

	/// A cache operation failed.
	#[error(transparent)]
	Cache(#[from] CacheError),
}

/// Result type for module operations.
pub type Result<T> = std::result::Result<T, ModuleError>;
