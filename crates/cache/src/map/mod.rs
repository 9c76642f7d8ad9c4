//! The key to value-holder store.

#[cfg(test)]
mod tests;

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use pulsar_comm::{Communicator, Tag};
use rustc_hash::FxHashMap;

use crate::checkpoint::CheckpointIo;
use crate::holder::WireEntry;
use crate::sync::{self, Command, SyncSession};
use crate::{CacheData, CacheError, CachePolicy, CacheSlice, Holder, Result, SerializedHolder, ValueHolder, decode_value, encode_value};

/// One stored value and the policy it was stored under.
#[derive(Clone)]
pub(crate) struct CacheEntry {
	pub value: Arc<dyn ValueHolder>,
	pub policy: CachePolicy,
}

/// Entry table shared with the sync server thread.
pub(crate) type Entries = Arc<Mutex<FxHashMap<String, CacheEntry>>>;

pub(crate) struct CacheInner {
	pub(crate) entries: Entries,
	comm: Option<Arc<dyn Communicator>>,
	/// Held for the whole of a client request so acks stay in order.
	sync: Mutex<Option<SyncSession>>,
}

impl Drop for CacheInner {
	fn drop(&mut self) {
		if let Some(session) = self.sync.get_mut().take()
			&& let Err(e) = sync::stop(session)
		{
			tracing::warn!(error = %e, "cache.sync.stop_on_drop_failed");
		}
	}
}

/// Thread-safe map from string keys to cached values.
///
/// Cloning yields another handle onto the same map.
#[derive(Clone)]
pub struct CacheMap {
	pub(crate) inner: Arc<CacheInner>,
}

impl Default for CacheMap {
	fn default() -> Self {
		Self::new()
	}
}

impl CacheMap {
	/// Creates a map without distributed sync support.
	pub fn new() -> Self {
		Self::build(None)
	}

	/// Creates a map that can run the sync protocol over `comm`.
	pub fn with_communicator(comm: Arc<dyn Communicator>) -> Self {
		Self::build(Some(comm))
	}

	fn build(comm: Option<Arc<dyn Communicator>>) -> Self {
		Self {
			inner: Arc::new(CacheInner {
				entries: Arc::new(Mutex::new(FxHashMap::default())),
				comm,
				sync: Mutex::new(None),
			}),
		}
	}

	/// Looks `key` up as a `T`.
	///
	/// A serialized placeholder declaring `T` is decoded and replaced by a
	/// live holder. A value of another type yields `Ok(None)`. When the key is
	/// absent, `allow_remote` is set, and sync is running, the value is
	/// fetched from the rank that holds it.
	pub fn get<T: CacheData>(&self, key: &str, allow_remote: bool) -> Result<Option<Arc<T>>> {
		if let Some(found) = self.lookup::<T>(key)? {
			return Ok(found);
		}
		if !allow_remote {
			return Ok(None);
		}

		let fetched = {
			let session = self.inner.sync.lock();
			match session.as_ref() {
				Some(session) => sync::fetch_remote(session, key)?,
				None => None,
			}
		};
		let Some(serialized) = fetched else {
			return Ok(None);
		};
		let policy = serialized.meta().policy;
		self.inner.entries.lock().entry(key.to_string()).or_insert_with(|| CacheEntry {
			value: Arc::new(serialized),
			policy,
		});
		Ok(self.lookup::<T>(key)?.flatten())
	}

	/// Local lookup. `Ok(None)` if the key is absent, `Ok(Some(None))` if it
	/// holds something that is not a `T`.
	fn lookup<T: CacheData>(&self, key: &str) -> Result<Option<Option<Arc<T>>>> {
		let mut entries = self.inner.entries.lock();
		let Some(entry) = entries.get_mut(key) else {
			return Ok(None);
		};
		let any = entry.value.as_any();
		if let Some(holder) = any.downcast_ref::<Holder<T>>() {
			return Ok(Some(Some(Arc::clone(holder.value()))));
		}
		let Some(serialized) = any.downcast_ref::<SerializedHolder>() else {
			return Ok(Some(None));
		};
		if !T::is_serializable() || !serialized.declares::<T>() {
			return Ok(Some(None));
		}
		let live = serialized.decode::<T>()?;
		let value = Arc::clone(live.value());
		entry.value = Arc::new(live);
		tracing::trace!(key, "cache.materialized");
		Ok(Some(Some(value)))
	}

	/// Stores `value` under `key`, replacing any previous entry.
	pub fn set<T: CacheData>(&self, key: impl Into<String>, value: T, policy: CachePolicy) -> Result<()> {
		self.set_holder(key, Arc::new(Holder::new(value)), policy)
	}

	/// Stores an already type-erased holder.
	pub fn set_holder(&self, key: impl Into<String>, value: Arc<dyn ValueHolder>, policy: CachePolicy) -> Result<()> {
		let key = key.into();
		let announce = policy.contains(CachePolicy::DISTRIBUTE_GLOBAL) && value.is_serializable();
		self.inner.entries.lock().insert(key.clone(), CacheEntry { value, policy });
		if announce {
			self.notify(Command::Add, &key)?;
		}
		Ok(())
	}

	/// Removes `key`. Returns true if it was present.
	pub fn erase(&self, key: &str) -> Result<bool> {
		let removed = self.inner.entries.lock().remove(key);
		let Some(entry) = removed else {
			return Ok(false);
		};
		if entry.policy.contains(CachePolicy::DISTRIBUTE_GLOBAL) && entry.value.is_serializable() {
			self.notify(Command::Delete, key)?;
		}
		Ok(true)
	}

	fn notify(&self, command: Command, key: &str) -> Result<()> {
		let session = self.inner.sync.lock();
		if let Some(session) = session.as_ref()
			&& !sync::announce(session, command, key)?
		{
			tracing::debug!(key, command = command.name(), "cache.sync.announce_refused");
		}
		Ok(())
	}

	/// Removes every entry without notifying the coordinator.
	pub fn clear(&self) {
		self.inner.entries.lock().clear();
	}

	/// Number of entries.
	pub fn size(&self) -> usize {
		self.inner.entries.lock().len()
	}

	/// Returns 1 if `key` is present, 0 otherwise.
	pub fn count(&self, key: &str) -> usize {
		usize::from(self.inner.entries.lock().contains_key(key))
	}

	/// Returns every key, sorted.
	pub fn get_keys(&self) -> Vec<String> {
		let mut keys: Vec<String> = self.inner.entries.lock().keys().cloned().collect();
		keys.sort();
		keys
	}

	/// Returns the policy `key` was stored under.
	pub fn policy(&self, key: &str) -> Option<CachePolicy> {
		self.inner.entries.lock().get(key).map(|entry| entry.policy)
	}

	/// Returns the type-erased holder stored under `key`.
	pub fn holder(&self, key: &str) -> Option<Arc<dyn ValueHolder>> {
		self.inner.entries.lock().get(key).map(|entry| Arc::clone(&entry.value))
	}

	/// Writes one `key -> serializable -> type` line per entry, sorted by key.
	pub fn print(&self, out: &mut dyn io::Write) -> io::Result<()> {
		let mut rows: Vec<(String, bool, String)> = self
			.inner
			.entries
			.lock()
			.iter()
			.map(|(key, entry)| (key.clone(), entry.value.is_serializable(), entry.value.type_name().to_string()))
			.collect();
		rows.sort();
		for (key, serializable, type_name) in rows {
			writeln!(out, "{key} -> {serializable} -> {type_name}")?;
		}
		Ok(())
	}

	/// Returns a view of this map that prefixes keys with `"{scope}:"`.
	pub fn slice(&self, scope: impl Into<String>) -> CacheSlice {
		CacheSlice::new(scope.into(), Arc::downgrade(&self.inner))
	}

	/// Starts the sync protocol on `tag`. Collective: every rank must call it.
	pub fn start_sync(&self, tag: Tag) -> Result<()> {
		let comm = self.inner.comm.clone().ok_or(CacheError::NoCommunicator)?;
		let mut slot = self.inner.sync.lock();
		if let Some(active) = slot.as_ref() {
			return Err(CacheError::SyncActive { tag: active.tags.command });
		}
		*slot = Some(sync::start(comm, Arc::clone(&self.inner.entries), tag)?);
		Ok(())
	}

	/// Stops this rank's sync thread.
	pub fn stop_sync(&self) -> Result<()> {
		let session = self.inner.sync.lock().take().ok_or(CacheError::SyncInactive)?;
		sync::stop(session)
	}

	/// True from `start_sync` until `stop_sync`, even if the server thread
	/// has failed in between. See [`CacheMap::check_sync`].
	pub fn is_syncing(&self) -> bool {
		self.inner.sync.lock().is_some()
	}

	/// Fails if the running session's server thread hit a protocol fault.
	pub fn check_sync(&self) -> Result<()> {
		self.inner.sync.lock().as_ref().ok_or(CacheError::SyncInactive)?.ensure_healthy()
	}

	/// Writes every serializable entry whose policy intersects `filter`.
	///
	/// Returns the number of records written.
	pub fn save_checkpoint(&self, io: &mut dyn CheckpointIo, filter: CachePolicy) -> Result<usize> {
		let snapshot: Vec<(String, CacheEntry)> = self
			.inner
			.entries
			.lock()
			.iter()
			.filter(|(_, entry)| entry.policy.intersects(filter) && entry.value.is_serializable())
			.map(|(key, entry)| (key.clone(), entry.clone()))
			.collect();

		for (key, entry) in &snapshot {
			let wire = WireEntry::pack(entry.value.as_ref(), entry.policy)?;
			io.write(key, &encode_value(&wire)?)?;
		}
		tracing::debug!(written = snapshot.len(), filter = ?filter, "cache.checkpoint.saved");
		Ok(snapshot.len())
	}

	/// Loads serialized placeholders for every checkpointed key not already present.
	///
	/// Returns the number of entries added.
	pub fn load_checkpoint(&self, io: &dyn CheckpointIo) -> Result<usize> {
		let mut loaded = 0;
		for key in io.all_keys()? {
			if self.count(&key) > 0 {
				continue;
			}
			let wire: WireEntry = decode_value(&io.read(&key)?)?;
			let serialized = wire.unpack()?;
			let policy = serialized.meta().policy;
			let mut entries = self.inner.entries.lock();
			if !entries.contains_key(&key) {
				entries.insert(key, CacheEntry {
					value: Arc::new(serialized),
					policy,
				});
				loaded += 1;
			}
		}
		tracing::debug!(loaded, "cache.checkpoint.loaded");
		Ok(loaded)
	}
}

impl std::fmt::Debug for CacheMap {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CacheMap")
			.field("size", &self.size())
			.field("syncing", &self.is_syncing())
			.finish()
	}
}
