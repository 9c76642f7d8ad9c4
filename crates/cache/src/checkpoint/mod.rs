//! Checkpoint backends.
//!
//! A backend is a flat key to bytes store. [`CacheMap::save_checkpoint`]
//! writes one postcard `{meta, value}` record per entry and
//! [`CacheMap::load_checkpoint`] reads them back as serialized placeholders.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{CacheError, CacheMap, CachePolicy, Result};

/// Storage for checkpoint records.
pub trait CheckpointIo: Send {
	/// Returns 1 if a record for `key` exists, 0 otherwise.
	fn count(&self, key: &str) -> usize;

	/// Writes (or overwrites) the record for `key`.
	fn write(&mut self, key: &str, bytes: &[u8]) -> Result<()>;

	/// Reads the record for `key`.
	fn read(&self, key: &str) -> Result<Vec<u8>>;

	/// Every key with a record, sorted.
	fn all_keys(&self) -> Result<Vec<String>>;

	/// Removes the record for `key`, if any.
	fn erase(&mut self, key: &str) -> Result<()>;

	/// Removes every record.
	fn clear(&mut self) -> Result<()>;
}

/// In-memory backend.
#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpoint {
	records: BTreeMap<String, Vec<u8>>,
}

impl MemoryCheckpoint {
	pub fn new() -> Self {
		Self::default()
	}
}

impl CheckpointIo for MemoryCheckpoint {
	fn count(&self, key: &str) -> usize {
		usize::from(self.records.contains_key(key))
	}

	fn write(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
		self.records.insert(key.to_string(), bytes.to_vec());
		Ok(())
	}

	fn read(&self, key: &str) -> Result<Vec<u8>> {
		self.records.get(key).cloned().ok_or_else(|| CacheError::MissingCheckpoint(key.to_string()))
	}

	fn all_keys(&self) -> Result<Vec<String>> {
		Ok(self.records.keys().cloned().collect())
	}

	fn erase(&mut self, key: &str) -> Result<()> {
		self.records.remove(key);
		Ok(())
	}

	fn clear(&mut self) -> Result<()> {
		self.records.clear();
		Ok(())
	}
}

const RECORD_EXT: &str = "bin";

/// Directory backend: one `<hex(key)>.bin` file per record.
#[derive(Debug, Clone)]
pub struct DirCheckpoint {
	root: PathBuf,
}

impl DirCheckpoint {
	/// Opens (creating if needed) a checkpoint directory.
	pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		fs::create_dir_all(&root).map_err(|error| CacheError::Io { path: root.clone(), error })?;
		Ok(Self { root })
	}

	/// Directory holding the records.
	pub fn root(&self) -> &Path {
		&self.root
	}

	fn record_path(&self, key: &str) -> PathBuf {
		let mut name = String::with_capacity(key.len() * 2 + RECORD_EXT.len() + 1);
		for byte in key.bytes() {
			name.push_str(&format!("{byte:02x}"));
		}
		name.push('.');
		name.push_str(RECORD_EXT);
		self.root.join(name)
	}

	fn key_from_file_name(name: &str) -> Option<String> {
		let hex = name.strip_suffix(RECORD_EXT)?.strip_suffix('.')?;
		if hex.len() % 2 != 0 {
			return None;
		}
		let bytes = (0..hex.len())
			.step_by(2)
			.map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
			.collect::<Option<Vec<u8>>>()?;
		String::from_utf8(bytes).ok()
	}
}

impl CheckpointIo for DirCheckpoint {
	fn count(&self, key: &str) -> usize {
		usize::from(self.record_path(key).is_file())
	}

	fn write(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
		let path = self.record_path(key);
		fs::write(&path, bytes).map_err(|error| CacheError::Io { path, error })
	}

	fn read(&self, key: &str) -> Result<Vec<u8>> {
		let path = self.record_path(key);
		if !path.is_file() {
			return Err(CacheError::MissingCheckpoint(key.to_string()));
		}
		fs::read(&path).map_err(|error| CacheError::Io { path, error })
	}

	fn all_keys(&self) -> Result<Vec<String>> {
		let entries = fs::read_dir(&self.root).map_err(|error| CacheError::Io {
			path: self.root.clone(),
			error,
		})?;
		let mut keys = Vec::new();
		for entry in entries {
			let entry = entry.map_err(|error| CacheError::Io {
				path: self.root.clone(),
				error,
			})?;
			if let Some(key) = entry.file_name().to_str().and_then(Self::key_from_file_name) {
				keys.push(key);
			}
		}
		keys.sort();
		Ok(keys)
	}

	fn erase(&mut self, key: &str) -> Result<()> {
		let path = self.record_path(key);
		match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(error) => Err(CacheError::Io { path, error }),
		}
	}

	fn clear(&mut self) -> Result<()> {
		for key in self.all_keys()? {
			self.erase(&key)?;
		}
		Ok(())
	}
}

/// A pair of backends: one per rank (local) and one shared (global).
pub struct Checkpoint {
	local: Box<dyn CheckpointIo>,
	global: Box<dyn CheckpointIo>,
}

impl Checkpoint {
	pub fn new(local: Box<dyn CheckpointIo>, global: Box<dyn CheckpointIo>) -> Self {
		Self { local, global }
	}

	/// Writes entries marked [`CachePolicy::CHECKPOINT_LOCAL`].
	pub fn save_local_cache(&mut self, cache: &CacheMap) -> Result<usize> {
		cache.save_checkpoint(self.local.as_mut(), CachePolicy::CHECKPOINT_LOCAL)
	}

	/// Restores entries from the local backend.
	pub fn load_local_cache(&self, cache: &CacheMap) -> Result<usize> {
		cache.load_checkpoint(self.local.as_ref())
	}

	/// Writes entries marked [`CachePolicy::CHECKPOINT_GLOBAL`].
	pub fn save_global_cache(&mut self, cache: &CacheMap) -> Result<usize> {
		cache.save_checkpoint(self.global.as_mut(), CachePolicy::CHECKPOINT_GLOBAL)
	}

	/// Restores entries from the global backend.
	pub fn load_global_cache(&self, cache: &CacheMap) -> Result<usize> {
		cache.load_checkpoint(self.global.as_ref())
	}

	pub fn local(&self) -> &dyn CheckpointIo {
		self.local.as_ref()
	}

	pub fn global(&self) -> &dyn CheckpointIo {
		self.global.as_ref()
	}
}
