//! Module management runtime.
//!
//! Supermodules (shared libraries or interpreter scripts) export tables of
//! module creators. A [`ModuleManager`] registers module descriptors under
//! caller-chosen keys, creates instances on demand, records them in a
//! [`ModuleTree`], and gives every instance a scoped slice of a shared
//! [`pulsar_cache::CacheMap`].

mod creation;
mod error;
pub mod foreign;
mod handle;
mod info;
pub mod loader;
mod manager;
mod module;
mod state;
mod tree;

pub use creation::{CreationFuncs, CreatorFn};
pub use error::{ModuleError, Result};
pub use foreign::{ForeignModule, ForeignObject, ForeignRef, ForeignValue, Interpreter};
pub use handle::{ModuleHandle, ModulePtr};
pub use info::{ModuleInfo, SupermoduleKind};
pub use loader::SupermoduleLoader;
pub use manager::{FIRST_MODULE_ID, ManagerBuilder, ManagerConfig, ModuleConfig, ModuleManager, OptionDeclConfig};
pub use module::{AsAny, ConstructModule, Module, ModuleCore, ModuleId};
pub use state::ComputationState;
pub use tree::{ModuleTree, TreeNode};
