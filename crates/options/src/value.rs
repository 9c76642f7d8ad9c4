use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::OptionKind;

/// A concrete option value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OptionValue {
	/// Integer value.
	Int(i64),
	/// Float value.
	Float(f64),
	/// Boolean value.
	Bool(bool),
	/// String value.
	String(String),
	/// List of integers.
	ListInt(Vec<i64>),
	/// List of floats.
	ListFloat(Vec<f64>),
	/// List of booleans.
	ListBool(Vec<bool>),
	/// List of strings.
	ListString(Vec<String>),
	/// Set of integers.
	SetInt(BTreeSet<i64>),
	/// Set of booleans.
	SetBool(BTreeSet<bool>),
	/// Set of strings.
	SetString(BTreeSet<String>),
	/// Dictionary of integers.
	DictInt(BTreeMap<String, i64>),
	/// Dictionary of floats.
	DictFloat(BTreeMap<String, f64>),
	/// Dictionary of booleans.
	DictBool(BTreeMap<String, bool>),
	/// Dictionary of strings.
	DictString(BTreeMap<String, String>),
}

impl OptionValue {
	/// Returns the kind of this value.
	pub fn kind(&self) -> OptionKind {
		match self {
			OptionValue::Int(_) => OptionKind::Int,
			OptionValue::Float(_) => OptionKind::Float,
			OptionValue::Bool(_) => OptionKind::Bool,
			OptionValue::String(_) => OptionKind::String,
			OptionValue::ListInt(_) => OptionKind::ListInt,
			OptionValue::ListFloat(_) => OptionKind::ListFloat,
			OptionValue::ListBool(_) => OptionKind::ListBool,
			OptionValue::ListString(_) => OptionKind::ListString,
			OptionValue::SetInt(_) => OptionKind::SetInt,
			OptionValue::SetBool(_) => OptionKind::SetBool,
			OptionValue::SetString(_) => OptionKind::SetString,
			OptionValue::DictInt(_) => OptionKind::DictInt,
			OptionValue::DictFloat(_) => OptionKind::DictFloat,
			OptionValue::DictBool(_) => OptionKind::DictBool,
			OptionValue::DictString(_) => OptionKind::DictString,
		}
	}

	/// Returns the type name of this value.
	pub fn type_name(&self) -> &'static str {
		self.kind().name()
	}

	/// Returns true if this value matches the given kind exactly.
	pub fn matches_kind(&self, kind: OptionKind) -> bool {
		self.kind() == kind
	}

	/// Casts this value into `kind`.
	///
	/// Identity casts always succeed. Integers widen to floats (scalars, lists
	/// and dictionaries), and lists become sets of the same element kind.
	/// Returns the value unchanged in `Err` when no cast exists.
	pub fn cast(self, kind: OptionKind) -> Result<OptionValue, OptionValue> {
		if self.kind() == kind {
			return Ok(self);
		}
		match (self, kind) {
			(OptionValue::Int(v), OptionKind::Float) => Ok(OptionValue::Float(v as f64)),
			(OptionValue::ListInt(v), OptionKind::ListFloat) => Ok(OptionValue::ListFloat(v.into_iter().map(|i| i as f64).collect())),
			(OptionValue::DictInt(v), OptionKind::DictFloat) => {
				Ok(OptionValue::DictFloat(v.into_iter().map(|(k, i)| (k, i as f64)).collect()))
			}
			(OptionValue::ListInt(v), OptionKind::SetInt) => Ok(OptionValue::SetInt(v.into_iter().collect())),
			(OptionValue::ListBool(v), OptionKind::SetBool) => Ok(OptionValue::SetBool(v.into_iter().collect())),
			(OptionValue::ListString(v), OptionKind::SetString) => Ok(OptionValue::SetString(v.into_iter().collect())),
			(other, _) => Err(other),
		}
	}

	/// Returns the integer value if this is an `Int` variant.
	pub fn as_int(&self) -> Option<i64> {
		match self {
			OptionValue::Int(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the float value, widening integers.
	pub fn as_float(&self) -> Option<f64> {
		match self {
			OptionValue::Float(v) => Some(*v),
			OptionValue::Int(v) => Some(*v as f64),
			_ => None,
		}
	}

	/// Returns the boolean value if this is a `Bool` variant.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			OptionValue::Bool(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the string value if this is a `String` variant.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			OptionValue::String(v) => Some(v),
			_ => None,
		}
	}
}

fn hash_floats<'a, H: Hasher>(values: impl Iterator<Item = &'a f64>, state: &mut H) {
	for v in values {
		v.to_bits().hash(state);
	}
}

impl PartialEq for OptionValue {
	fn eq(&self, other: &Self) -> bool {
		fn floats_eq<'a>(a: impl ExactSizeIterator<Item = &'a f64>, b: impl ExactSizeIterator<Item = &'a f64>) -> bool {
			a.len() == b.len() && a.zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
		}

		match (self, other) {
			(OptionValue::Int(a), OptionValue::Int(b)) => a == b,
			(OptionValue::Float(a), OptionValue::Float(b)) => a.to_bits() == b.to_bits(),
			(OptionValue::Bool(a), OptionValue::Bool(b)) => a == b,
			(OptionValue::String(a), OptionValue::String(b)) => a == b,
			(OptionValue::ListInt(a), OptionValue::ListInt(b)) => a == b,
			(OptionValue::ListFloat(a), OptionValue::ListFloat(b)) => floats_eq(a.iter(), b.iter()),
			(OptionValue::ListBool(a), OptionValue::ListBool(b)) => a == b,
			(OptionValue::ListString(a), OptionValue::ListString(b)) => a == b,
			(OptionValue::SetInt(a), OptionValue::SetInt(b)) => a == b,
			(OptionValue::SetBool(a), OptionValue::SetBool(b)) => a == b,
			(OptionValue::SetString(a), OptionValue::SetString(b)) => a == b,
			(OptionValue::DictInt(a), OptionValue::DictInt(b)) => a == b,
			(OptionValue::DictFloat(a), OptionValue::DictFloat(b)) => a.keys().eq(b.keys()) && floats_eq(a.values(), b.values()),
			(OptionValue::DictBool(a), OptionValue::DictBool(b)) => a == b,
			(OptionValue::DictString(a), OptionValue::DictString(b)) => a == b,
			_ => false,
		}
	}
}

impl Eq for OptionValue {}

impl Hash for OptionValue {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.kind().hash(state);
		match self {
			OptionValue::Int(v) => v.hash(state),
			OptionValue::Float(v) => v.to_bits().hash(state),
			OptionValue::Bool(v) => v.hash(state),
			OptionValue::String(v) => v.hash(state),
			OptionValue::ListInt(v) => v.hash(state),
			OptionValue::ListFloat(v) => hash_floats(v.iter(), state),
			OptionValue::ListBool(v) => v.hash(state),
			OptionValue::ListString(v) => v.hash(state),
			OptionValue::SetInt(v) => v.hash(state),
			OptionValue::SetBool(v) => v.hash(state),
			OptionValue::SetString(v) => v.hash(state),
			OptionValue::DictInt(v) => v.hash(state),
			OptionValue::DictFloat(v) => {
				for (k, f) in v {
					k.hash(state);
					f.to_bits().hash(state);
				}
			}
			OptionValue::DictBool(v) => v.hash(state),
			OptionValue::DictString(v) => v.hash(state),
		}
	}
}

macro_rules! value_conversions {
	($($variant:ident => $ty:ty),* $(,)?) => {
		$(
			impl From<$ty> for OptionValue {
				fn from(v: $ty) -> Self {
					OptionValue::$variant(v)
				}
			}

			impl sealed::Sealed for $ty {}

			impl FromOptionValue for $ty {
				fn from_option(value: &OptionValue) -> Option<Self> {
					match value.clone().cast(OptionKind::$variant) {
						Ok(OptionValue::$variant(v)) => Some(v),
						_ => None,
					}
				}

				fn option_kind() -> OptionKind {
					OptionKind::$variant
				}
			}
		)*
	};
}

// Seal the FromOptionValue trait to prevent external implementations.
mod sealed {
	pub trait Sealed {}
}

/// Trait for types that can be extracted from an [`OptionValue`].
pub trait FromOptionValue: sealed::Sealed + Sized {
	/// Extracts the value, returning `None` if no cast to this type exists.
	fn from_option(value: &OptionValue) -> Option<Self>;

	/// Returns the [`OptionKind`] corresponding to this Rust type.
	fn option_kind() -> OptionKind;
}

value_conversions! {
	Int => i64,
	Float => f64,
	Bool => bool,
	String => String,
	ListInt => Vec<i64>,
	ListFloat => Vec<f64>,
	ListBool => Vec<bool>,
	ListString => Vec<String>,
	SetInt => BTreeSet<i64>,
	SetBool => BTreeSet<bool>,
	SetString => BTreeSet<String>,
	DictInt => BTreeMap<String, i64>,
	DictFloat => BTreeMap<String, f64>,
	DictBool => BTreeMap<String, bool>,
	DictString => BTreeMap<String, String>,
}

impl From<i32> for OptionValue {
	fn from(v: i32) -> Self {
		OptionValue::Int(i64::from(v))
	}
}

impl From<&str> for OptionValue {
	fn from(v: &str) -> Self {
		OptionValue::String(v.to_string())
	}
}

impl From<Vec<&str>> for OptionValue {
	fn from(v: Vec<&str>) -> Self {
		OptionValue::ListString(v.into_iter().map(str::to_string).collect())
	}
}
