//! Option maps bound to module descriptors.
//!
//! An [`OptionMap`] is an ordered, case-insensitive mapping from option key to
//! an [`OptionEntry`]. Every entry has a fixed [`OptionKind`] for its whole
//! lifetime, an optional default, an optional override, and an optional
//! validator.

mod entry;
mod error;
mod issues;
mod kind;
mod map;
mod parse;
mod value;

pub use entry::{OptionEntry, OptionValidator};
pub use error::{OptionError, Result};
pub use issues::{OptionIssue, OptionIssues};
pub use kind::OptionKind;
pub use map::OptionMap;
pub use parse::parse_value_for_kind;
pub use value::{FromOptionValue, OptionValue};
