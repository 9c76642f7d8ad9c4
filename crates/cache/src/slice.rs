use std::sync::{Arc, Weak};

use crate::map::CacheInner;
use crate::{CacheData, CacheError, CacheMap, CachePolicy, Result};

/// A non-owning view onto a [`CacheMap`] restricted to one owner scope.
///
/// Every key is stored in the map as `"{scope}:{key}"`, so two scopes never
/// see each other's entries.
#[derive(Clone)]
pub struct CacheSlice {
	scope: String,
	map: Weak<CacheInner>,
}

impl CacheSlice {
	pub(crate) fn new(scope: String, map: Weak<CacheInner>) -> Self {
		Self { scope, map }
	}

	/// Owner scope of this slice.
	pub fn scope(&self) -> &str {
		&self.scope
	}

	/// Key under which `key` is stored in the underlying map.
	pub fn full_key(&self, key: &str) -> String {
		format!("{}:{key}", self.scope)
	}

	fn map(&self) -> Result<CacheMap> {
		self.map.upgrade().map(|inner| CacheMap { inner }).ok_or_else(|| CacheError::Detached {
			scope: self.scope.clone(),
		})
	}

	/// Looks `key` up as a `T`. See [`CacheMap::get`].
	pub fn get<T: CacheData>(&self, key: &str, allow_remote: bool) -> Result<Option<Arc<T>>> {
		self.map()?.get(&self.full_key(key), allow_remote)
	}

	/// Stores `value` under `key`.
	pub fn set<T: CacheData>(&self, key: &str, value: T, policy: CachePolicy) -> Result<()> {
		self.map()?.set(self.full_key(key), value, policy)
	}

	/// Removes `key`. Returns true if it was present.
	pub fn erase(&self, key: &str) -> Result<bool> {
		self.map()?.erase(&self.full_key(key))
	}

	/// Returns 1 if `key` is present, 0 otherwise.
	pub fn count(&self, key: &str) -> Result<usize> {
		Ok(self.map()?.count(&self.full_key(key)))
	}

	/// Keys of this scope, with the scope prefix stripped.
	pub fn keys(&self) -> Result<Vec<String>> {
		let prefix = format!("{}:", self.scope);
		Ok(self
			.map()?
			.get_keys()
			.into_iter()
			.filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
			.collect())
	}
}

impl std::fmt::Debug for CacheSlice {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CacheSlice")
			.field("scope", &self.scope)
			.field("attached", &(self.map.strong_count() > 0))
			.finish()
	}
}
