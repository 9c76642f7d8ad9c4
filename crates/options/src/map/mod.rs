use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use crate::{FromOptionValue, OptionEntry, OptionError, OptionIssue, OptionIssues, OptionValue, Result};


/// Ordered, case-insensitive map of declared options.
///
/// Keys are normalized to lowercase for lookup; the spelling used at
/// declaration is kept on the entry for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
	entries: IndexMap<String, OptionEntry>,
	expert: bool,
}

fn normalize(key: &str) -> String {
	key.to_lowercase()
}

impl OptionMap {
	/// Creates an empty map.
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares a new option.
	///
	/// Fails if the key is already declared (case-insensitively) or if the
	/// entry's default cannot be cast to its kind.
	pub fn insert(&mut self, key: &str, mut entry: OptionEntry) -> Result<()> {
		let norm = normalize(key);
		if self.entries.contains_key(&norm) {
			return Err(OptionError::DuplicateOption(key.to_string()));
		}
		if let Some(default) = entry.default.take() {
			let default = default.cast(entry.kind()).map_err(|got| OptionError::TypeMismatch {
				option: key.to_string(),
				expected: entry.kind(),
				got: got.kind(),
			})?;
			entry.default = Some(default);
		}
		entry.name = key.to_string();
		self.entries.insert(norm, entry);
		Ok(())
	}

	/// Returns true if `key` is declared.
	pub fn has_key(&self, key: &str) -> bool {
		self.entries.contains_key(&normalize(key))
	}

	/// Returns the entry for `key`.
	pub fn entry(&self, key: &str) -> Result<&OptionEntry> {
		self.entries.get(&normalize(key)).ok_or_else(|| OptionError::UnknownOption(key.to_string()))
	}

	fn entry_mut(&mut self, key: &str) -> Result<&mut OptionEntry> {
		self.entries
			.get_mut(&normalize(key))
			.ok_or_else(|| OptionError::UnknownOption(key.to_string()))
	}

	/// True iff `key` is declared and has an override or a default.
	pub fn has_value(&self, key: &str) -> bool {
		self.entry(key).is_ok_and(OptionEntry::has_value)
	}

	/// True iff `key` is declared and has an override.
	pub fn is_set(&self, key: &str) -> bool {
		self.entry(key).is_ok_and(OptionEntry::is_set)
	}

	/// Overrides the value of `key`.
	///
	/// The value is cast to the declared kind and run through the validator;
	/// on failure the previous override is left in place.
	pub fn change(&mut self, key: &str, value: impl Into<OptionValue>) -> Result<()> {
		let entry = self.entry_mut(key)?;
		let kind = entry.kind();
		let value = value.into().cast(kind).map_err(|got| OptionError::TypeMismatch {
			option: key.to_string(),
			expected: kind,
			got: got.kind(),
		})?;
		entry.check(&value).map_err(|reason| OptionError::InvalidValue {
			option: key.to_string(),
			reason,
		})?;
		entry.value = Some(value);
		Ok(())
	}

	/// Overrides the value of `key` from a TOML value.
	pub fn change_toml(&mut self, key: &str, value: &toml::Value) -> Result<()> {
		let kind = self.entry(key)?.kind();
		let value = OptionValue::from_toml(key, kind, value)?;
		self.change(key, value)
	}

	/// Overrides the value of `key` from its string spelling.
	pub fn change_str(&mut self, key: &str, value: &str) -> Result<()> {
		let kind = self.entry(key)?.kind();
		let value = crate::parse_value_for_kind(value, kind).map_err(|reason| OptionError::InvalidValue {
			option: key.to_string(),
			reason,
		})?;
		self.change(key, value)
	}

	/// Drops the override of `key`, falling back to the default.
	pub fn reset(&mut self, key: &str) -> Result<()> {
		self.entry_mut(key)?.value = None;
		Ok(())
	}

	/// Returns the effective value of `key`, if any.
	pub fn value(&self, key: &str) -> Option<&OptionValue> {
		self.entry(key).ok().and_then(OptionEntry::effective)
	}

	/// Returns the effective value of `key` as `T`.
	pub fn get<T: FromOptionValue>(&self, key: &str) -> Result<T> {
		let entry = self.entry(key)?;
		let value = entry.effective().ok_or_else(|| OptionError::NoValue(key.to_string()))?;
		T::from_option(value).ok_or_else(|| OptionError::TypeMismatch {
			option: key.to_string(),
			expected: T::option_kind(),
			got: value.kind(),
		})
	}

	/// Collects every missing required value and validator rejection.
	pub fn validate(&self) -> OptionIssues {
		let mut issues = OptionIssues::default();
		for entry in self.entries.values() {
			match entry.effective() {
				None if entry.is_required() => issues.push(OptionIssue::MissingRequired {
					option: entry.name().to_string(),
				}),
				None => {}
				Some(value) => {
					if let Err(reason) = entry.check(value) {
						issues.push(OptionIssue::Rejected {
							option: entry.name().to_string(),
							reason,
						});
					}
				}
			}
		}
		issues
	}

	/// Returns true when validation issues are tolerated at creation time.
	pub fn is_expert(&self) -> bool {
		self.expert
	}

	/// Sets expert mode.
	pub fn set_expert(&mut self, expert: bool) {
		self.expert = expert;
	}

	/// Returns the number of declared options.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns true if no options are declared.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Iterates over `(declared key, entry)` in declaration order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionEntry)> {
		self.entries.values().map(|e| (e.name(), e))
	}
}

impl Hash for OptionMap {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.expert.hash(state);
		for (key, entry) in &self.entries {
			key.hash(state);
			entry.hash(state);
		}
	}
}
