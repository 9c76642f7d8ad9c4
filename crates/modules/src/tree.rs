//! The module instance tree.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::{ComputationState, ModuleError, ModuleId, ModuleInfo, Result};

/// Record of one created module.
///
/// Nodes outlive the modules they describe: once a module is dropped its node
/// stays in the tree with `in_use == false`, keeping its output and final
/// state available.
pub struct TreeNode {
	id: ModuleId,
	key: String,
	info: ModuleInfo,
	parent: Option<ModuleId>,
	output: Mutex<String>,
	initial_state: ComputationState,
	final_state: Mutex<ComputationState>,
	pub(crate) in_use: AtomicBool,
}

impl TreeNode {
	/// A fresh, in-use node whose initial and final states both start at `state`.
	pub(crate) fn new(id: ModuleId, key: String, info: ModuleInfo, parent: Option<ModuleId>, state: ComputationState) -> Self {
		Self {
			id,
			key,
			info,
			parent,
			output: Mutex::new(String::new()),
			initial_state: state.clone(),
			final_state: Mutex::new(state),
			in_use: AtomicBool::new(true),
		}
	}

	pub fn id(&self) -> ModuleId {
		self.id
	}

	pub fn key(&self) -> &str {
		&self.key
	}

	pub fn info(&self) -> &ModuleInfo {
		&self.info
	}

	pub fn parent(&self) -> Option<ModuleId> {
		self.parent
	}

	/// Everything the module printed so far.
	pub fn output(&self) -> String {
		self.output.lock().clone()
	}

	pub(crate) fn append_output(&self, text: &str) {
		self.output.lock().push_str(text);
	}

	pub fn initial_state(&self) -> &ComputationState {
		&self.initial_state
	}

	pub fn final_state(&self) -> ComputationState {
		self.final_state.lock().clone()
	}

	pub(crate) fn set_final_state(&self, state: ComputationState) {
		*self.final_state.lock() = state;
	}

	/// True while the module created with this node is alive.
	pub fn in_use(&self) -> bool {
		self.in_use.load(Ordering::Acquire)
	}
}

impl std::fmt::Debug for TreeNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TreeNode")
			.field("id", &self.id)
			.field("key", &self.key)
			.field("name", &self.info.name)
			.field("parent", &self.parent)
			.field("in_use", &self.in_use())
			.finish()
	}
}

/// Append-only forest of [`TreeNode`]s indexed by id.
#[derive(Debug, Default)]
pub struct ModuleTree {
	nodes: Vec<Arc<TreeNode>>,
	index: FxHashMap<ModuleId, usize>,
	children: FxHashMap<ModuleId, Vec<ModuleId>>,
	roots: Vec<ModuleId>,
}

impl ModuleTree {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts `node` under its parent. Fails if the parent is unknown.
	pub fn insert(&mut self, node: TreeNode) -> Result<Arc<TreeNode>> {
		if let Some(parent) = node.parent
			&& !self.index.contains_key(&parent)
		{
			return Err(ModuleError::MissingParent { id: parent });
		}
		let id = node.id;
		let node = Arc::new(node);
		match node.parent {
			Some(parent) => self.children.entry(parent).or_default().push(id),
			None => self.roots.push(id),
		}
		self.index.insert(id, self.nodes.len());
		self.nodes.push(Arc::clone(&node));
		Ok(node)
	}

	pub fn has_id(&self, id: ModuleId) -> bool {
		self.index.contains_key(&id)
	}

	pub fn get_by_id(&self, id: ModuleId) -> Result<&Arc<TreeNode>> {
		self.index
			.get(&id)
			.and_then(|&pos| self.nodes.get(pos))
			.ok_or(ModuleError::UnknownModule { id })
	}

	/// Ids of the direct children of `id`, in creation order.
	pub fn children(&self, id: ModuleId) -> &[ModuleId] {
		self.children.get(&id).map(Vec::as_slice).unwrap_or_default()
	}

	/// Depth-first walk: every root followed by its descendants.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<TreeNode>> {
		let mut order = Vec::with_capacity(self.nodes.len());
		let mut stack: Vec<ModuleId> = self.roots.iter().rev().copied().collect();
		while let Some(id) = stack.pop() {
			if let Ok(node) = self.get_by_id(id) {
				order.push(node);
			}
			stack.extend(self.children(id).iter().rev());
		}
		order.into_iter()
	}

	/// Every node in insertion order, regardless of depth.
	pub fn iter_flat(&self) -> impl Iterator<Item = &Arc<TreeNode>> {
		self.nodes.iter()
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Number of nodes whose module is still alive.
	pub fn in_use_count(&self) -> usize {
		self.nodes.iter().filter(|node| node.in_use()).count()
	}

	pub fn clear(&mut self) {
		self.nodes.clear();
		self.index.clear();
		self.children.clear();
		self.roots.clear();
	}
}
