use std::hash::{Hash, Hasher};

use crate::{OptionKind, OptionValue};

/// Validator run against a candidate value before it is accepted.
pub type OptionValidator = fn(&OptionValue) -> Result<(), String>;

/// One declared option: kind, default, override and validation rules.
#[derive(Clone)]
pub struct OptionEntry {
	pub(crate) name: String,
	kind: OptionKind,
	required: bool,
	pub(crate) default: Option<OptionValue>,
	pub(crate) value: Option<OptionValue>,
	help: String,
	validator: Option<OptionValidator>,
}

impl OptionEntry {
	/// Declares an optional option of `kind` with no default.
	pub fn new(kind: OptionKind) -> Self {
		Self {
			name: String::new(),
			kind,
			required: false,
			default: None,
			value: None,
			help: String::new(),
			validator: None,
		}
	}

	/// Marks the option as required.
	pub fn required(mut self) -> Self {
		self.required = true;
		self
	}

	/// Sets the default value. Checked against the kind on insertion.
	pub fn default(mut self, value: impl Into<OptionValue>) -> Self {
		self.default = Some(value.into());
		self
	}

	/// Sets the help text.
	pub fn help(mut self, help: impl Into<String>) -> Self {
		self.help = help.into();
		self
	}

	/// Attaches a validator.
	pub fn validator(mut self, validator: OptionValidator) -> Self {
		self.validator = Some(validator);
		self
	}

	/// Returns the key as it was spelled when declared.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the declared kind.
	pub fn kind(&self) -> OptionKind {
		self.kind
	}

	/// Returns true if the option must have a value before use.
	pub fn is_required(&self) -> bool {
		self.required
	}

	/// Returns the help text.
	pub fn help_text(&self) -> &str {
		&self.help
	}

	/// Returns the default value, if any.
	pub fn default_value(&self) -> Option<&OptionValue> {
		self.default.as_ref()
	}

	/// Returns the override, if any.
	pub fn override_value(&self) -> Option<&OptionValue> {
		self.value.as_ref()
	}

	/// Returns the override, falling back to the default.
	pub fn effective(&self) -> Option<&OptionValue> {
		self.value.as_ref().or(self.default.as_ref())
	}

	/// True iff an override or a default exists.
	pub fn has_value(&self) -> bool {
		self.value.is_some() || self.default.is_some()
	}

	/// True iff an override exists, even one equal to the default.
	pub fn is_set(&self) -> bool {
		self.value.is_some()
	}

	/// Runs the validator, if any, against `value`.
	pub fn check(&self, value: &OptionValue) -> Result<(), String> {
		match self.validator {
			Some(validator) => validator(value),
			None => Ok(()),
		}
	}

	pub(crate) fn has_validator(&self) -> bool {
		self.validator.is_some()
	}
}

impl core::fmt::Debug for OptionEntry {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("OptionEntry")
			.field("name", &self.name)
			.field("kind", &self.kind)
			.field("required", &self.required)
			.field("default", &self.default)
			.field("value", &self.value)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

// Validators are compared by presence; function pointer identity is not stable across codegen units.
impl PartialEq for OptionEntry {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name
			&& self.kind == other.kind
			&& self.required == other.required
			&& self.default == other.default
			&& self.value == other.value
			&& self.help == other.help
			&& self.has_validator() == other.has_validator()
	}
}

impl Eq for OptionEntry {}

impl Hash for OptionEntry {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.name.hash(state);
		self.kind.hash(state);
		self.required.hash(state);
		self.default.hash(state);
		self.value.hash(state);
		self.help.hash(state);
		self.has_validator().hash(state);
	}
}
