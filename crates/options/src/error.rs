//! Error types for option maps.

use thiserror::Error;

use crate::OptionKind;

/// Errors raised while declaring, changing or reading options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
	/// The option key is not declared in the map.
	#[error("unknown option: {0}")]
	UnknownOption(String),

	/// The option key is already declared.
	#[error("option '{0}' is already declared")]
	DuplicateOption(String),

	/// The supplied value cannot be cast to the declared kind.
	#[error("type mismatch for option '{option}': expected {expected}, got {got}")]
	TypeMismatch {
		/// The option key.
		option: String,
		/// The declared kind.
		expected: OptionKind,
		/// The kind of the offending value.
		got: OptionKind,
	},

	/// The option's validator rejected the value.
	#[error("invalid value for option '{option}': {reason}")]
	InvalidValue {
		/// The option key.
		option: String,
		/// Validator message.
		reason: String,
	},

	/// The option has neither an override nor a default.
	#[error("option '{0}' has no value")]
	NoValue(String),

	/// A configuration value does not have the shape the kind requires.
	#[error("option '{option}' expects {expected}, found {got}")]
	Unparsable {
		/// The option key.
		option: String,
		/// The declared kind.
		expected: OptionKind,
		/// Description of what was found.
		got: String,
	},
}

/// Result type for option operations.
pub type Result<T> = std::result::Result<T, OptionError>;
