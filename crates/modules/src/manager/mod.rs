//! The module manager: registry of keys, module creation, and the instance tree.

mod config;

#[cfg(test)]
mod tests;

use std::any::type_name;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub use config::{ManagerConfig, ModuleConfig, OptionDeclConfig};
use parking_lot::Mutex;
use pulsar_cache::CacheMap;
use pulsar_comm::{Communicator, Tag};
use pulsar_options::{OptionIssues, OptionMap, OptionValue};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::creation::CreatorFn;
use crate::foreign::Interpreter;
use crate::loader::{InterpretedLoader, NativeLoader, SupermoduleLoader};
use crate::tree::{ModuleTree, TreeNode};
use crate::{ComputationState, Module, ModuleError, ModuleHandle, ModuleId, ModuleInfo, ModulePtr, Result, SupermoduleKind};

/// Id handed to the first module a manager creates.
pub const FIRST_MODULE_ID: ModuleId = 100;

struct EntryState {
	info: ModuleInfo,
	times_created: u64,
}

/// One registered key: descriptor, creator and use counter.
struct RegistryEntry {
	state: Mutex<EntryState>,
	creator: CreatorFn,
}

impl RegistryEntry {
	fn new(info: ModuleInfo, creator: CreatorFn) -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(EntryState { info, times_created: 0 }),
			creator,
		})
	}
}

struct ManagerState {
	registry: FxHashMap<String, Arc<RegistryEntry>>,
	tree: ModuleTree,
	loaders: FxHashMap<SupermoduleKind, Box<dyn SupermoduleLoader>>,
	debug_keys: FxHashSet<String>,
}

pub(crate) struct ManagerInner {
	state: Mutex<ManagerState>,
	debug_all: AtomicBool,
	next_id: AtomicU64,
	cache: CacheMap,
}

impl Drop for ManagerInner {
	fn drop(&mut self) {
		let state = self.state.get_mut();
		let in_use = state.tree.in_use_count();
		if in_use > 0 {
			tracing::warn!(in_use, "manager.modules_still_in_use");
		}
		if self.cache.is_syncing()
			&& let Err(e) = self.cache.stop_sync()
		{
			tracing::warn!(error = %e, "manager.cache_sync_stop_failed");
		}
		// Cached values and creators may run code from loaded units, so they
		// go before the loaders.
		self.cache.clear();
		state.tree.clear();
		state.registry.clear();
		state.debug_keys.clear();
		state.loaders.clear();
	}
}

/// Builder for [`ModuleManager`].
#[derive(Default)]
pub struct ManagerBuilder {
	loaders: Vec<Box<dyn SupermoduleLoader>>,
	communicator: Option<Arc<dyn Communicator>>,
	debug_all: bool,
}

impl ManagerBuilder {
	/// Registers a loader, replacing any earlier loader of the same kind.
	pub fn loader(mut self, loader: Box<dyn SupermoduleLoader>) -> Self {
		self.loaders.push(loader);
		self
	}

	/// Enables interpreted supermodules.
	pub fn interpreter(self, interpreter: Arc<dyn Interpreter>) -> Self {
		self.loader(Box::new(InterpretedLoader::new(interpreter)))
	}

	/// Transport for the cache sync protocol.
	pub fn communicator(mut self, comm: Arc<dyn Communicator>) -> Self {
		self.communicator = Some(comm);
		self
	}

	pub fn debug_all(mut self, enabled: bool) -> Self {
		self.debug_all = enabled;
		self
	}

	pub fn build(self) -> ModuleManager {
		let mut loaders: FxHashMap<SupermoduleKind, Box<dyn SupermoduleLoader>> = FxHashMap::default();
		for loader in self.loaders {
			loaders.insert(loader.kind(), loader);
		}
		loaders
			.entry(SupermoduleKind::Native)
			.or_insert_with(|| Box::new(NativeLoader::new()));

		let cache = match self.communicator {
			Some(comm) => CacheMap::with_communicator(comm),
			None => CacheMap::new(),
		};
		ModuleManager {
			inner: Arc::new(ManagerInner {
				state: Mutex::new(ManagerState {
					registry: FxHashMap::default(),
					tree: ModuleTree::new(),
					loaders,
					debug_keys: FxHashSet::default(),
				}),
				debug_all: AtomicBool::new(self.debug_all),
				next_id: AtomicU64::new(FIRST_MODULE_ID),
				cache,
			}),
		}
	}
}

/// Registry of module keys and factory for module instances.
///
/// Cloning yields another handle onto the same manager. Modules keep only a
/// weak reference back, so dropping the last handle tears the manager down:
/// cache, tree and registry first, loaders (and their units) last.
#[derive(Clone)]
pub struct ModuleManager {
	inner: Arc<ManagerInner>,
}

impl Default for ModuleManager {
	fn default() -> Self {
		Self::new()
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&str>() {
		(*msg).to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"creator panicked".to_string()
	}
}

impl ModuleManager {
	/// A manager with the shared-library loader only.
	pub fn new() -> Self {
		Self::builder().build()
	}

	pub fn builder() -> ManagerBuilder {
		ManagerBuilder::default()
	}

	pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
		Self { inner }
	}

	fn entry(&self, key: &str) -> Result<Arc<RegistryEntry>> {
		self.inner
			.state
			.lock()
			.registry
			.get(key)
			.cloned()
			.ok_or_else(|| ModuleError::MissingKey(key.to_string()))
	}

	/// Loads `path` with the loader for `kind` and returns its module names.
	pub fn load_supermodule(&self, kind: SupermoduleKind, path: &str) -> Result<Vec<String>> {
		let mut state = self.inner.state.lock();
		let loader = state.loaders.get_mut(&kind).ok_or_else(|| ModuleError::UnknownLoader {
			kind,
			path: path.to_string(),
		})?;
		Ok(loader.load_supermodule(path)?.names())
	}

	/// Registers `info` under `key`, loading its supermodule if needed.
	pub fn load_module_from_minfo(&self, info: ModuleInfo, key: &str) -> Result<()> {
		if info.path.is_empty() {
			return Err(ModuleError::Load {
				path: String::new(),
				reason: format!("module '{}' for key '{key}' has no supermodule path", info.name),
			});
		}
		let mut state = self.inner.state.lock();
		if state.registry.contains_key(key) {
			return Err(ModuleError::DuplicateKey(key.to_string()));
		}
		let loader = state.loaders.get_mut(&info.kind).ok_or_else(|| ModuleError::UnknownLoader {
			kind: info.kind,
			path: info.path.clone(),
		})?;
		let creator = loader.load_supermodule(&info.path)?.get_creator(&info.name, &info.path)?;
		tracing::debug!(key, name = %info.name, path = %info.path, "manager.module_loaded");
		state.registry.insert(key.to_string(), RegistryEntry::new(info, creator));
		Ok(())
	}

	pub fn has_key(&self, key: &str) -> bool {
		self.inner.state.lock().registry.contains_key(key)
	}

	/// Number of registered keys.
	pub fn size(&self) -> usize {
		self.inner.state.lock().registry.len()
	}

	/// Registered keys, sorted.
	pub fn keys(&self) -> Vec<String> {
		let mut keys: Vec<String> = self.inner.state.lock().registry.keys().cloned().collect();
		keys.sort();
		keys
	}

	/// Current descriptor of `key`, option overrides included.
	pub fn module_key_info(&self, key: &str) -> Result<ModuleInfo> {
		Ok(self.entry(key)?.state.lock().info.clone())
	}

	pub fn times_created(&self, key: &str) -> Result<u64> {
		Ok(self.entry(key)?.state.lock().times_created)
	}

	/// Copies `existing` to `new_key` with a fresh use counter.
	pub fn duplicate_key(&self, existing: &str, new_key: &str) -> Result<()> {
		if self.has_key(new_key) {
			return Err(ModuleError::DuplicateKey(new_key.to_string()));
		}
		// Entry locks are never taken while the manager lock is held.
		let source = self.entry(existing)?;
		let info = source.state.lock().info.clone();
		let mut state = self.inner.state.lock();
		if state.registry.contains_key(new_key) {
			return Err(ModuleError::DuplicateKey(new_key.to_string()));
		}
		state.registry.insert(new_key.to_string(), RegistryEntry::new(info, Arc::clone(&source.creator)));
		tracing::debug!(existing, new_key, "manager.key_duplicated");
		Ok(())
	}

	/// A key no registry entry uses.
	pub fn generate_unique_key(&self) -> String {
		let state = self.inner.state.lock();
		loop {
			let key = uuid::Uuid::new_v4().to_string();
			if !state.registry.contains_key(&key) {
				return key;
			}
		}
	}

	fn with_unused_options(&self, key: &str, f: impl FnOnce(&mut OptionMap) -> pulsar_options::Result<()>) -> Result<()> {
		let entry = self.entry(key)?;
		let mut state = entry.state.lock();
		if state.times_created > 0 {
			return Err(ModuleError::InUse {
				key: key.to_string(),
				times_created: state.times_created,
			});
		}
		f(&mut state.info.options).map_err(|source| ModuleError::Option {
			key: key.to_string(),
			source,
		})
	}

	/// Overrides option `option` of `key`. Fails once `key` has created a module.
	pub fn change_option(&self, key: &str, option: &str, value: impl Into<OptionValue>) -> Result<()> {
		let value = value.into();
		self.with_unused_options(key, |options| options.change(option, value))
	}

	/// Like [`ModuleManager::change_option`], parsing `value` for the option's kind.
	pub fn change_option_str(&self, key: &str, option: &str, value: &str) -> Result<()> {
		self.with_unused_options(key, |options| options.change_str(option, value))
	}

	/// Like [`ModuleManager::change_option`], converting a TOML value.
	pub fn change_option_toml(&self, key: &str, option: &str, value: &toml::Value) -> Result<()> {
		self.with_unused_options(key, |options| options.change_toml(option, value))
	}

	/// Toggles expert mode (validation failures only warn) for `key`.
	pub fn set_expert(&self, key: &str, expert: bool) -> Result<()> {
		self.entry(key)?.state.lock().info.options.set_expert(expert);
		Ok(())
	}

	/// Creates a module from `key` and checks that it is a `T`.
	pub fn create_module<T: Module>(&self, key: &str, parent: Option<ModuleId>) -> Result<ModulePtr<T>> {
		let handle = self.create(key, parent, |handle| {
			if handle.is_type::<T>() {
				return Ok(());
			}
			Err(ModuleError::TypeMismatch {
				key: key.to_string(),
				expected: type_name::<T>(),
				found: handle.type_name().unwrap_or("<empty>").to_string(),
			})
		})?;
		handle.into_typed::<T>()
	}

	/// Creates a module from `key` whatever its origin or type.
	pub fn create_module_foreign(&self, key: &str, parent: Option<ModuleId>) -> Result<ModuleHandle> {
		self.create(key, parent, |_| Ok(()))
	}

	fn create(&self, key: &str, parent: Option<ModuleId>, check: impl FnOnce(&ModuleHandle) -> Result<()>) -> Result<ModuleHandle> {
		let entry = self.entry(key)?;
		// Held for the whole creation so options cannot change underneath it.
		let mut entry_state = entry.state.lock();

		let issues = entry_state.info.options.validate();
		if !issues.is_empty() {
			if !entry_state.info.options.is_expert() {
				return Err(ModuleError::Validation {
					key: key.to_string(),
					issues,
				});
			}
			tracing::warn!(key, %issues, "manager.expert_mode_validation_bypassed");
		}

		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		let info = entry_state.info.clone();
		let creation_error = |reason: String| ModuleError::Creation {
			key: key.to_string(),
			name: info.name.clone(),
			path: info.path.clone(),
			reason,
		};

		let mut handle = match catch_unwind(AssertUnwindSafe(|| (entry.creator)(id))) {
			Ok(Ok(handle)) => handle,
			Ok(Err(e)) => return Err(creation_error(e.to_string())),
			Err(payload) => return Err(creation_error(panic_message(payload.as_ref()))),
		};
		if handle.is_empty() {
			return Err(ModuleError::NullModule {
				key: key.to_string(),
				name: info.name.clone(),
			});
		}
		check(&handle)?;

		let scope = info.cache_scope();
		let (node, debug) = {
			let mut state = self.inner.state.lock();
			let start = match parent {
				Some(parent_id) => {
					let parent_node = state.tree.get_by_id(parent_id).map_err(|_| ModuleError::MissingParent { id: parent_id })?;
					if parent_node.in_use() {
						parent_node.initial_state().clone()
					} else {
						parent_node.final_state()
					}
				}
				None => ComputationState::empty(),
			};
			let debug = self.inner.debug_all.load(Ordering::Relaxed) || state.debug_keys.contains(key);
			let node = state.tree.insert(TreeNode::new(id, key.to_string(), info, parent, start))?;
			(node, debug)
		};

		handle
			.base_mut()?
			.core_mut()
			.attach(Arc::downgrade(&self.inner), node, self.inner.cache.slice(scope), debug);
		entry_state.times_created += 1;
		tracing::debug!(key, id, ?parent, "manager.module_created");
		Ok(handle)
	}

	/// Checks every key's options and smoke-tests its creator.
	///
	/// Keys with option issues are reported and, unless in expert mode,
	/// skipped. A creation failure on any other key is returned as an error.
	pub fn test_all(&self) -> Result<Vec<(String, OptionIssues)>> {
		let mut report = Vec::new();
		for key in self.keys() {
			let (issues, expert) = {
				let entry = self.entry(&key)?;
				let state = entry.state.lock();
				(state.info.options.validate(), state.info.options.is_expert())
			};
			if !issues.is_empty() {
				for issue in issues.iter() {
					tracing::warn!(key = %key, %issue, "manager.test_all.option_issue");
				}
				report.push((key.clone(), issues));
				if !expert {
					continue;
				}
			}
			drop(self.create_module_foreign(&key, None)?);
			tracing::debug!(key = %key, "manager.test_all.created");
		}
		Ok(report)
	}

	/// Toggles debug output for modules created from `key`.
	pub fn enable_debug(&self, key: &str, enabled: bool) -> Result<()> {
		let mut state = self.inner.state.lock();
		if !state.registry.contains_key(key) {
			return Err(ModuleError::MissingKey(key.to_string()));
		}
		if enabled {
			state.debug_keys.insert(key.to_string());
		} else {
			state.debug_keys.remove(key);
		}
		Ok(())
	}

	/// Toggles debug output for every module created from now on.
	pub fn enable_debug_all(&self, enabled: bool) {
		self.inner.debug_all.store(enabled, Ordering::Relaxed);
	}

	/// Starts the cache sync protocol. Collective across ranks.
	pub fn start_cache_sync(&self, tag: Tag) -> Result<()> {
		Ok(self.inner.cache.start_sync(tag)?)
	}

	pub fn stop_cache_sync(&self) -> Result<()> {
		Ok(self.inner.cache.stop_sync()?)
	}

	/// The cache shared by every module of this manager.
	pub fn cache(&self) -> &CacheMap {
		&self.inner.cache
	}

	/// Tree node of module `id`.
	pub fn tree_node(&self, id: ModuleId) -> Result<Arc<TreeNode>> {
		self.inner.state.lock().tree.get_by_id(id).cloned()
	}

	pub fn tree_len(&self) -> usize {
		self.inner.state.lock().tree.len()
	}

	/// Number of created modules still alive.
	pub fn in_use_count(&self) -> usize {
		self.inner.state.lock().tree.in_use_count()
	}

	/// Runs `f` with the instance tree locked.
	pub fn with_tree<R>(&self, f: impl FnOnce(&ModuleTree) -> R) -> R {
		f(&self.inner.state.lock().tree)
	}

	/// Writes one line per registered key, sorted.
	pub fn print(&self, out: &mut dyn io::Write) -> io::Result<()> {
		let entries: Vec<(String, Arc<RegistryEntry>)> = {
			let state = self.inner.state.lock();
			let mut entries: Vec<_> = state.registry.iter().map(|(k, e)| (k.clone(), Arc::clone(e))).collect();
			entries.sort_by(|a, b| a.0.cmp(&b.0));
			entries
		};
		for (key, entry) in entries {
			let state = entry.state.lock();
			let info = &state.info;
			writeln!(
				out,
				"{key}: {} v{} [{}] {} (base '{}', created {})",
				info.name, info.version, info.kind, info.path, info.base, state.times_created
			)?;
			for (option, decl) in info.options.iter() {
				let value = decl.effective().map_or_else(|| "<unset>".to_string(), |v| format!("{v:?}"));
				writeln!(out, "    {option} ({}) = {value}", decl.kind())?;
			}
		}
		Ok(())
	}
}

impl std::fmt::Debug for ModuleManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ModuleManager")
			.field("keys", &self.size())
			.field("modules", &self.tree_len())
			.finish()
	}
}
