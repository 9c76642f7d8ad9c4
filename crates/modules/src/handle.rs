//! Exclusive ownership of created modules.

use std::ops::{Deref, DerefMut};

use crate::foreign::{ForeignModule, ForeignRef};
use crate::{AsAny, Module, ModuleError, Result, SupermoduleKind};

enum ModuleSlot {
	Native(Box<dyn Module>),
	Foreign(Box<ForeignModule>),
}

/// Owns exactly one created module, of either origin.
///
/// Dropping the handle drops the module, which marks its tree node finished.
#[derive(Default)]
pub struct ModuleHandle {
	slot: Option<ModuleSlot>,
}

impl ModuleHandle {
	pub fn native(module: Box<dyn Module>) -> Self {
		Self {
			slot: Some(ModuleSlot::Native(module)),
		}
	}

	pub fn foreign(module: ForeignModule) -> Self {
		Self {
			slot: Some(ModuleSlot::Foreign(Box::new(module))),
		}
	}

	/// A handle holding nothing.
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.slot.is_none()
	}

	/// Where the held module was allocated.
	pub fn origin(&self) -> Option<SupermoduleKind> {
		self.slot.as_ref().map(|slot| match slot {
			ModuleSlot::Native(_) => SupermoduleKind::Native,
			ModuleSlot::Foreign(_) => SupermoduleKind::Interpreted,
		})
	}

	/// The held module, whatever its origin.
	pub fn base(&self) -> Result<&dyn Module> {
		match &self.slot {
			Some(ModuleSlot::Native(module)) => Ok(&**module),
			Some(ModuleSlot::Foreign(module)) => Ok(&**module),
			None => Err(ModuleError::EmptyHandle),
		}
	}

	pub fn base_mut(&mut self) -> Result<&mut dyn Module> {
		match &mut self.slot {
			Some(ModuleSlot::Native(module)) => Ok(&mut **module),
			Some(ModuleSlot::Foreign(module)) => Ok(&mut **module),
			None => Err(ModuleError::EmptyHandle),
		}
	}

	/// True if the held module is a `T`.
	pub fn is_type<T: Module>(&self) -> bool {
		self.base().is_ok_and(|module| module.is::<T>())
	}

	/// Concrete type name of the held module.
	pub fn type_name(&self) -> Option<&'static str> {
		self.base().ok().map(|module| module.concrete_type_name())
	}

	/// Moves the module out, leaving this handle empty.
	pub fn take(&mut self) -> Self {
		Self { slot: self.slot.take() }
	}

	/// Converts into a typed pointer. The module is dropped if it is not a `T`.
	pub fn into_typed<T: Module>(self) -> Result<ModulePtr<T>> {
		let found = self.type_name().unwrap_or("<empty>").to_string();
		let any = match self.slot {
			Some(ModuleSlot::Native(module)) => module.into_any(),
			Some(ModuleSlot::Foreign(module)) => module.into_any(),
			None => return Err(ModuleError::EmptyHandle),
		};
		any.downcast::<T>().map(|module| ModulePtr { module }).map_err(|_| ModuleError::TypeMismatch {
			key: String::new(),
			expected: std::any::type_name::<T>(),
			found,
		})
	}

	/// Hands an interpreter-allocated module back to the interpreter.
	///
	/// The module's node is marked finished; the returned object keeps living
	/// under the interpreter's reference counting. A native module stays in
	/// the handle.
	pub fn release_foreign(&mut self) -> Result<ForeignRef> {
		match self.slot.take() {
			Some(ModuleSlot::Foreign(module)) => Ok(module.object().clone()),
			slot => Err(self.restore(slot, SupermoduleKind::Interpreted)),
		}
	}

	/// Moves a natively allocated module out. An interpreter module stays in
	/// the handle.
	pub fn into_native(&mut self) -> Result<Box<dyn Module>> {
		match self.slot.take() {
			Some(ModuleSlot::Native(module)) => Ok(module),
			slot => Err(self.restore(slot, SupermoduleKind::Native)),
		}
	}

	fn restore(&mut self, slot: Option<ModuleSlot>, expected: SupermoduleKind) -> ModuleError {
		let Some(slot) = slot else {
			return ModuleError::EmptyHandle;
		};
		let found = match &slot {
			ModuleSlot::Native(_) => SupermoduleKind::Native,
			ModuleSlot::Foreign(_) => SupermoduleKind::Interpreted,
		};
		self.slot = Some(slot);
		ModuleError::WrongOrigin { expected, found }
	}

	/// Borrows the held interpreter module.
	pub fn as_foreign(&self) -> Option<&ForeignModule> {
		match &self.slot {
			Some(ModuleSlot::Foreign(module)) => Some(&**module),
			_ => None,
		}
	}
}

impl std::fmt::Debug for ModuleHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ModuleHandle")
			.field("origin", &self.origin())
			.field("type", &self.type_name())
			.finish()
	}
}

/// Typed owner of a created module.
pub struct ModulePtr<T: Module> {
	module: Box<T>,
}

impl<T: Module> ModulePtr<T> {
	pub fn into_inner(self) -> Box<T> {
		self.module
	}
}

impl<T: Module> Deref for ModulePtr<T> {
	type Target = T;

	fn deref(&self) -> &T {
		&self.module
	}
}

impl<T: Module> DerefMut for ModulePtr<T> {
	fn deref_mut(&mut self) -> &mut T {
		&mut self.module
	}
}
