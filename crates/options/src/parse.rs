//! Shared parsing utilities for option values.
//!
//! Used by manager configuration files (TOML values) and by command-line
//! overrides (plain strings).

use std::collections::BTreeMap;

use crate::{OptionError, OptionKind, OptionValue};

/// Parses a string into an [`OptionValue`] of a known kind.
///
/// Collections are comma separated; dictionary items are `name=value`.
pub fn parse_value_for_kind(value: &str, kind: OptionKind) -> Result<OptionValue, String> {
	let value = value.trim();
	Ok(match kind {
		OptionKind::Int => OptionValue::Int(parse_int(value)?),
		OptionKind::Float => OptionValue::Float(parse_float(value)?),
		OptionKind::Bool => OptionValue::Bool(parse_bool(value)?),
		OptionKind::String => OptionValue::String(value.to_string()),
		OptionKind::ListInt => OptionValue::ListInt(split_items(value).map(parse_int).collect::<Result<_, _>>()?),
		OptionKind::ListFloat => OptionValue::ListFloat(split_items(value).map(parse_float).collect::<Result<_, _>>()?),
		OptionKind::ListBool => OptionValue::ListBool(split_items(value).map(parse_bool).collect::<Result<_, _>>()?),
		OptionKind::ListString => OptionValue::ListString(split_items(value).map(str::to_string).collect()),
		OptionKind::SetInt => OptionValue::SetInt(split_items(value).map(parse_int).collect::<Result<_, _>>()?),
		OptionKind::SetBool => OptionValue::SetBool(split_items(value).map(parse_bool).collect::<Result<_, _>>()?),
		OptionKind::SetString => OptionValue::SetString(split_items(value).map(str::to_string).collect()),
		OptionKind::DictInt => OptionValue::DictInt(parse_dict(value, parse_int)?),
		OptionKind::DictFloat => OptionValue::DictFloat(parse_dict(value, parse_float)?),
		OptionKind::DictBool => OptionValue::DictBool(parse_dict(value, parse_bool)?),
		OptionKind::DictString => OptionValue::DictString(parse_dict(value, |s| Ok(s.to_string()))?),
	})
}

fn split_items(value: &str) -> impl Iterator<Item = &str> {
	value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_int(s: &str) -> Result<i64, String> {
	s.parse().map_err(|_| format!("'{s}' is not an integer"))
}

fn parse_float(s: &str) -> Result<f64, String> {
	s.parse().map_err(|_| format!("'{s}' is not a number"))
}

fn parse_bool(s: &str) -> Result<bool, String> {
	match s.to_ascii_lowercase().as_str() {
		"true" | "on" | "yes" | "1" => Ok(true),
		"false" | "off" | "no" | "0" => Ok(false),
		_ => Err(format!("'{s}' is not a boolean")),
	}
}

fn parse_dict<T>(value: &str, parse: impl Fn(&str) -> Result<T, String>) -> Result<BTreeMap<String, T>, String> {
	split_items(value)
		.map(|item| {
			let (name, v) = item.split_once('=').ok_or_else(|| format!("'{item}' is not a name=value pair"))?;
			Ok((name.trim().to_string(), parse(v.trim())?))
		})
		.collect()
}

impl OptionValue {
	/// Converts a TOML value into an option value of `kind`.
	///
	/// Integers are accepted where floats are expected.
	pub fn from_toml(option: &str, kind: OptionKind, value: &toml::Value) -> Result<Self, OptionError> {
		let converted = match kind {
			OptionKind::Int => value.as_integer().map(OptionValue::Int),
			OptionKind::Float => toml_float(value).map(OptionValue::Float),
			OptionKind::Bool => value.as_bool().map(OptionValue::Bool),
			OptionKind::String => value.as_str().map(|s| OptionValue::String(s.to_string())),
			OptionKind::ListInt => toml_array(value, toml::Value::as_integer).map(OptionValue::ListInt),
			OptionKind::ListFloat => toml_array(value, toml_float).map(OptionValue::ListFloat),
			OptionKind::ListBool => toml_array(value, toml::Value::as_bool).map(OptionValue::ListBool),
			OptionKind::ListString => toml_array(value, toml_string).map(OptionValue::ListString),
			OptionKind::SetInt => toml_array(value, toml::Value::as_integer).map(|v| OptionValue::SetInt(v.into_iter().collect())),
			OptionKind::SetBool => toml_array(value, toml::Value::as_bool).map(|v| OptionValue::SetBool(v.into_iter().collect())),
			OptionKind::SetString => toml_array(value, toml_string).map(|v| OptionValue::SetString(v.into_iter().collect())),
			OptionKind::DictInt => toml_table(value, toml::Value::as_integer).map(OptionValue::DictInt),
			OptionKind::DictFloat => toml_table(value, toml_float).map(OptionValue::DictFloat),
			OptionKind::DictBool => toml_table(value, toml::Value::as_bool).map(OptionValue::DictBool),
			OptionKind::DictString => toml_table(value, toml_string).map(OptionValue::DictString),
		};
		converted.ok_or_else(|| OptionError::Unparsable {
			option: option.to_string(),
			expected: kind,
			got: format!("TOML {}", value.type_str()),
		})
	}
}

fn toml_float(value: &toml::Value) -> Option<f64> {
	value.as_float().or_else(|| value.as_integer().map(|i| i as f64))
}

fn toml_string(value: &toml::Value) -> Option<String> {
	value.as_str().map(str::to_string)
}

fn toml_array<T>(value: &toml::Value, item: impl Fn(&toml::Value) -> Option<T>) -> Option<Vec<T>> {
	value.as_array()?.iter().map(item).collect()
}

fn toml_table<T>(value: &toml::Value, item: impl Fn(&toml::Value) -> Option<T>) -> Option<BTreeMap<String, T>> {
	value.as_table()?.iter().map(|(k, v)| item(v).map(|x| (k.clone(), x))).collect()
}
