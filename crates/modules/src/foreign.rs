//! Bridge to an embedded interpreter.
//!
//! The interpreter is a black box reached through [`Interpreter`] and
//! [`ForeignObject`]. Values crossing the boundary are [`ForeignValue`]s.

use std::fmt;
use std::sync::Arc;

use pulsar_options::{OptionMap, OptionValue};

use crate::{Module, ModuleCore, ModuleError, ModuleId, Result};

/// Shared reference to an interpreter object.
pub type ForeignRef = Arc<dyn ForeignObject>;

/// An embedded interpreter able to import supermodule scripts.
pub trait Interpreter: Send + Sync {
	/// Imports the script at `path` and returns the module object.
	fn import(&self, path: &str) -> std::result::Result<ForeignRef, String>;
}

/// An object living inside the interpreter.
pub trait ForeignObject: Send + Sync {
	/// Interpreter-side type name.
	fn type_name(&self) -> String;

	/// Looks up an attribute.
	fn getattr(&self, name: &str) -> Option<ForeignRef>;

	/// Calls the object.
	fn call(&self, args: &[ForeignValue]) -> std::result::Result<ForeignValue, String>;
}

/// A value passed to or returned from the interpreter.
#[derive(Clone)]
pub enum ForeignValue {
	None,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
	List(Vec<ForeignValue>),
	/// Ordered key/value pairs.
	Map(Vec<(String, ForeignValue)>),
	Object(ForeignRef),
}

impl ForeignValue {
	pub fn as_object(&self) -> Option<&ForeignRef> {
		match self {
			Self::Object(obj) => Some(obj),
			_ => None,
		}
	}

	/// Converts every declared option with a value into a `Map`.
	pub fn from_options(options: &OptionMap) -> Self {
		Self::Map(
			options
				.iter()
				.filter_map(|(key, entry)| entry.effective().map(|value| (key.to_string(), Self::from(value))))
				.collect(),
		)
	}
}

impl fmt::Debug for ForeignValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::None => f.write_str("None"),
			Self::Bool(v) => write!(f, "Bool({v})"),
			Self::Int(v) => write!(f, "Int({v})"),
			Self::Float(v) => write!(f, "Float({v})"),
			Self::Str(v) => write!(f, "Str({v:?})"),
			Self::List(v) => f.debug_tuple("List").field(v).finish(),
			Self::Map(v) => f.debug_tuple("Map").field(v).finish(),
			Self::Object(obj) => write!(f, "Object(<{}>)", obj.type_name()),
		}
	}
}

fn list<T, F: Fn(T) -> ForeignValue>(items: impl IntoIterator<Item = T>, f: F) -> ForeignValue {
	ForeignValue::List(items.into_iter().map(f).collect())
}

fn map<T, F: Fn(T) -> ForeignValue>(items: impl IntoIterator<Item = (String, T)>, f: F) -> ForeignValue {
	ForeignValue::Map(items.into_iter().map(|(k, v)| (k, f(v))).collect())
}

impl From<&OptionValue> for ForeignValue {
	fn from(value: &OptionValue) -> Self {
		match value.clone() {
			OptionValue::Int(v) => Self::Int(v),
			OptionValue::Float(v) => Self::Float(v),
			OptionValue::Bool(v) => Self::Bool(v),
			OptionValue::String(v) => Self::Str(v),
			OptionValue::ListInt(v) => list(v, Self::Int),
			OptionValue::ListFloat(v) => list(v, Self::Float),
			OptionValue::ListBool(v) => list(v, Self::Bool),
			OptionValue::ListString(v) => list(v, Self::Str),
			OptionValue::SetInt(v) => list(v, Self::Int),
			OptionValue::SetBool(v) => list(v, Self::Bool),
			OptionValue::SetString(v) => list(v, Self::Str),
			OptionValue::DictInt(v) => map(v, Self::Int),
			OptionValue::DictFloat(v) => map(v, Self::Float),
			OptionValue::DictBool(v) => map(v, Self::Bool),
			OptionValue::DictString(v) => map(v, Self::Str),
		}
	}
}

/// A module whose implementation lives in the interpreter.
pub struct ForeignModule {
	core: ModuleCore,
	object: ForeignRef,
}

impl ForeignModule {
	pub fn new(id: ModuleId, object: ForeignRef) -> Self {
		Self {
			core: ModuleCore::new(id),
			object,
		}
	}

	/// The interpreter object.
	pub fn object(&self) -> &ForeignRef {
		&self.object
	}

	/// Calls method `name` on the interpreter object.
	pub fn call_method(&self, name: &str, args: &[ForeignValue]) -> Result<ForeignValue> {
		let method = self
			.object
			.getattr(name)
			.ok_or_else(|| ModuleError::Foreign(format!("{} has no attribute '{name}'", self.object.type_name())))?;
		method.call(args).map_err(ModuleError::Foreign)
	}
}

impl Module for ForeignModule {
	fn core(&self) -> &ModuleCore {
		&self.core
	}

	fn core_mut(&mut self) -> &mut ModuleCore {
		&mut self.core
	}
}
