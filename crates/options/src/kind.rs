use serde::{Deserialize, Serialize};

/// The kind of value an option holds.
///
/// The set is closed: scalars, lists, sets and string-keyed dictionaries over
/// the scalar kinds. Floats have no set variant since they have no total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
	/// 64-bit signed integer.
	Int,
	/// 64-bit float.
	Float,
	/// Boolean.
	Bool,
	/// UTF-8 string.
	String,
	/// Ordered list of integers.
	ListInt,
	/// Ordered list of floats.
	ListFloat,
	/// Ordered list of booleans.
	ListBool,
	/// Ordered list of strings.
	ListString,
	/// Set of integers.
	SetInt,
	/// Set of booleans.
	SetBool,
	/// Set of strings.
	SetString,
	/// String-keyed dictionary of integers.
	DictInt,
	/// String-keyed dictionary of floats.
	DictFloat,
	/// String-keyed dictionary of booleans.
	DictBool,
	/// String-keyed dictionary of strings.
	DictString,
}

impl OptionKind {
	/// Returns the configuration spelling of this kind.
	pub const fn name(self) -> &'static str {
		match self {
			OptionKind::Int => "int",
			OptionKind::Float => "float",
			OptionKind::Bool => "bool",
			OptionKind::String => "string",
			OptionKind::ListInt => "list_int",
			OptionKind::ListFloat => "list_float",
			OptionKind::ListBool => "list_bool",
			OptionKind::ListString => "list_string",
			OptionKind::SetInt => "set_int",
			OptionKind::SetBool => "set_bool",
			OptionKind::SetString => "set_string",
			OptionKind::DictInt => "dict_int",
			OptionKind::DictFloat => "dict_float",
			OptionKind::DictBool => "dict_bool",
			OptionKind::DictString => "dict_string",
		}
	}

	/// Returns true for the scalar kinds.
	pub const fn is_scalar(self) -> bool {
		matches!(self, OptionKind::Int | OptionKind::Float | OptionKind::Bool | OptionKind::String)
	}
}

impl core::fmt::Display for OptionKind {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.write_str(self.name())
	}
}
