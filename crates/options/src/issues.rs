/// One problem found while validating an option map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionIssue {
	/// A required option has neither an override nor a default.
	MissingRequired {
		/// The option key.
		option: String,
	},
	/// The effective value was rejected by the option's validator.
	Rejected {
		/// The option key.
		option: String,
		/// Validator message.
		reason: String,
	},
}

impl OptionIssue {
	/// Returns the option key this issue refers to.
	pub fn option(&self) -> &str {
		match self {
			OptionIssue::MissingRequired { option } | OptionIssue::Rejected { option, .. } => option,
		}
	}
}

impl core::fmt::Display for OptionIssue {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self {
			OptionIssue::MissingRequired { option } => write!(f, "required option '{option}' is not set"),
			OptionIssue::Rejected { option, reason } => write!(f, "option '{option}' rejected: {reason}"),
		}
	}
}

/// Issues collected by [`crate::OptionMap::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionIssues(Vec<OptionIssue>);

impl OptionIssues {
	/// Returns true if no issues were found.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns the number of issues.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Iterates over the issues in declaration order.
	pub fn iter(&self) -> impl Iterator<Item = &OptionIssue> {
		self.0.iter()
	}

	pub(crate) fn push(&mut self, issue: OptionIssue) {
		self.0.push(issue);
	}
}

impl core::fmt::Display for OptionIssues {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		for (i, issue) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str("; ")?;
			}
			write!(f, "{issue}")?;
		}
		Ok(())
	}
}

impl IntoIterator for OptionIssues {
	type Item = OptionIssue;
	type IntoIter = std::vec::IntoIter<OptionIssue>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}
