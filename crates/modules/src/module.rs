//! The module trait and the per-instance context every module carries.

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use pulsar_cache::CacheSlice;
use pulsar_options::OptionMap;

use crate::handle::{ModuleHandle, ModulePtr};
use crate::manager::{ManagerInner, ModuleManager};
use crate::tree::TreeNode;
use crate::{ComputationState, ModuleError, ModuleInfo, Result};

/// Numeric id of a created module, unique for the lifetime of its manager.
pub type ModuleId = u64;

/// Downcasting support for module trait objects.
///
/// Implemented for every `'static` type. Call it through `&dyn Module`, not
/// through a `Box<dyn Module>`, or the box itself is what gets cast.
pub trait AsAny: Any {
	fn as_any(&self) -> &dyn Any;
	fn as_any_mut(&mut self) -> &mut dyn Any;
	fn into_any(self: Box<Self>) -> Box<dyn Any>;
	fn concrete_type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}

	fn into_any(self: Box<Self>) -> Box<dyn Any> {
		self
	}

	fn concrete_type_name(&self) -> &'static str {
		std::any::type_name::<T>()
	}
}

/// A unit of computation created by a [`ModuleManager`].
///
/// Implementors embed a [`ModuleCore`] and expose it through `core`; the
/// manager fills it in after the creator returns.
pub trait Module: AsAny + Send {
	fn core(&self) -> &ModuleCore;
	fn core_mut(&mut self) -> &mut ModuleCore;
}

impl dyn Module + '_ {
	/// True if the concrete type is `T`.
	pub fn is<T: Module>(&self) -> bool {
		self.as_any().is::<T>()
	}

	pub fn downcast_ref<T: Module>(&self) -> Option<&T> {
		self.as_any().downcast_ref::<T>()
	}

	pub fn downcast_mut<T: Module>(&mut self) -> Option<&mut T> {
		self.as_any_mut().downcast_mut::<T>()
	}
}

/// Construction hook used by native creators.
pub trait ConstructModule: Module + Sized {
	fn construct(id: ModuleId) -> Self;
}

/// Context injected into every created module.
pub struct ModuleCore {
	id: ModuleId,
	manager: Weak<ManagerInner>,
	node: Option<Arc<TreeNode>>,
	cache: Option<CacheSlice>,
	debug: bool,
}

impl ModuleCore {
	/// A core for module `id` that is not yet attached to a manager.
	pub fn new(id: ModuleId) -> Self {
		Self {
			id,
			manager: Weak::new(),
			node: None,
			cache: None,
			debug: false,
		}
	}

	pub(crate) fn attach(&mut self, manager: Weak<ManagerInner>, node: Arc<TreeNode>, cache: CacheSlice, debug: bool) {
		self.manager = manager;
		self.node = Some(node);
		self.cache = Some(cache);
		self.debug = debug;
	}

	pub fn id(&self) -> ModuleId {
		self.id
	}

	fn node(&self) -> Result<&Arc<TreeNode>> {
		self.node.as_ref().ok_or(ModuleError::Detached { id: self.id })
	}

	/// Registry key this module was created from.
	pub fn key(&self) -> Result<&str> {
		Ok(self.node()?.key())
	}

	/// Descriptor snapshot taken at creation.
	pub fn info(&self) -> Result<&ModuleInfo> {
		Ok(self.node()?.info())
	}

	pub fn name(&self) -> Result<&str> {
		Ok(&self.info()?.name)
	}

	pub fn version(&self) -> Result<&str> {
		Ok(&self.info()?.version)
	}

	/// Options as they were when the module was created.
	pub fn options(&self) -> Result<&OptionMap> {
		Ok(&self.info()?.options)
	}

	pub fn debug_enabled(&self) -> bool {
		self.debug
	}

	/// Cache slice shared by every instance of this module name and version.
	pub fn cache(&self) -> Result<&CacheSlice> {
		self.cache.as_ref().ok_or(ModuleError::Detached { id: self.id })
	}

	/// Appends `text` to the captured output of this module's tree node.
	pub fn print(&self, text: &str) {
		let Some(node) = &self.node else {
			tracing::debug!(id = self.id, text, "module.print_detached");
			return;
		};
		node.append_output(text);
		if self.debug {
			tracing::debug!(id = self.id, key = node.key(), text, "module.output");
		}
	}

	pub fn initial_state(&self) -> Result<ComputationState> {
		Ok(self.node()?.initial_state().clone())
	}

	pub fn final_state(&self) -> Result<ComputationState> {
		Ok(self.node()?.final_state())
	}

	pub fn set_final_state(&self, state: ComputationState) -> Result<()> {
		self.node()?.set_final_state(state);
		Ok(())
	}

	fn manager(&self) -> Result<ModuleManager> {
		self.manager
			.upgrade()
			.map(ModuleManager::from_inner)
			.ok_or(ModuleError::Detached { id: self.id })
	}

	/// Creates a module as a child of this one.
	pub fn create_child<T: Module>(&self, key: &str) -> Result<ModulePtr<T>> {
		self.manager()?.create_module::<T>(key, Some(self.id))
	}

	/// Creates a module of either origin as a child of this one.
	pub fn create_child_handle(&self, key: &str) -> Result<ModuleHandle> {
		self.manager()?.create_module_foreign(key, Some(self.id))
	}

	/// Key that no registry entry uses yet.
	pub fn generate_unique_key(&self) -> Result<String> {
		Ok(self.manager()?.generate_unique_key())
	}

	pub(crate) fn mark_finished(&self) {
		if let Some(node) = &self.node {
			node.in_use.store(false, Ordering::Release);
		}
	}
}

impl Drop for ModuleCore {
	fn drop(&mut self) {
		self.mark_finished();
	}
}

impl std::fmt::Debug for ModuleCore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ModuleCore")
			.field("id", &self.id)
			.field("key", &self.node.as_ref().map(|n| n.key()))
			.field("debug", &self.debug)
			.finish()
	}
}
