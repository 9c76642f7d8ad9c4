use std::any::{Any, TypeId, type_name};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{CacheData, CacheError, CachePolicy, Result};

/// Type-erased container for one cached value.
pub trait ValueHolder: Send + Sync {
	/// Human-readable type of the held value.
	fn type_name(&self) -> &str;

	/// Runtime type of the held value, `None` while it is still serialized.
	fn value_type_id(&self) -> Option<TypeId>;

	/// True if the value can be turned into bytes.
	fn is_serializable(&self) -> bool;

	/// True if the value has a content hash.
	fn is_hashable(&self) -> bool;

	/// Serializes the value.
	fn to_byte_array(&self) -> Result<Vec<u8>>;

	/// Returns the content hash of the value.
	fn my_hash(&self) -> Result<String>;

	/// Downcasting support.
	fn as_any(&self) -> &dyn Any;
}

/// Live holder of a concrete value.
pub struct Holder<T: CacheData> {
	value: Arc<T>,
}

impl<T: CacheData> Holder<T> {
	/// Wraps a value.
	pub fn new(value: T) -> Self {
		Self { value: Arc::new(value) }
	}

	/// Wraps an already shared value.
	pub fn from_arc(value: Arc<T>) -> Self {
		Self { value }
	}

	/// Rebuilds a holder from bytes produced by [`ValueHolder::to_byte_array`].
	pub fn from_byte_array(bytes: &[u8]) -> Result<Self> {
		T::decode(bytes).map(Self::new)
	}

	/// Returns the shared value.
	pub fn value(&self) -> &Arc<T> {
		&self.value
	}
}

impl<T: CacheData> ValueHolder for Holder<T> {
	fn type_name(&self) -> &str {
		type_name::<T>()
	}

	fn value_type_id(&self) -> Option<TypeId> {
		Some(TypeId::of::<T>())
	}

	fn is_serializable(&self) -> bool {
		T::is_serializable()
	}

	fn is_hashable(&self) -> bool {
		T::is_hashable()
	}

	fn to_byte_array(&self) -> Result<Vec<u8>> {
		self.value.encode()
	}

	fn my_hash(&self) -> Result<String> {
		self.value.content_hash()
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// Metadata travelling with serialized values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
	/// Declared type of the encoded value.
	pub type_name: String,
	/// Content hash, when the type is hashable.
	pub hash: Option<String>,
	/// Policy the value was stored under.
	pub policy: CachePolicy,
}

impl EntryMeta {
	/// Describes a holder stored under `policy`.
	pub fn describe(holder: &dyn ValueHolder, policy: CachePolicy) -> Self {
		Self {
			type_name: holder.type_name().to_string(),
			hash: holder.is_hashable().then(|| holder.my_hash().ok()).flatten(),
			policy,
		}
	}
}

/// Placeholder for a value that arrived as bytes (remote fetch, checkpoint).
///
/// It is converted into a live [`Holder`] the first time it is read with the
/// declared type.
#[derive(Debug, Clone)]
pub struct SerializedHolder {
	meta: EntryMeta,
	bytes: Vec<u8>,
}

impl SerializedHolder {
	/// Wraps encoded bytes and their metadata.
	pub fn new(meta: EntryMeta, bytes: Vec<u8>) -> Self {
		Self { meta, bytes }
	}

	/// Returns the metadata.
	pub fn meta(&self) -> &EntryMeta {
		&self.meta
	}

	/// Returns the encoded bytes.
	pub fn bytes(&self) -> &[u8] {
		&self.bytes
	}

	/// Returns true if the declared type is `T`.
	pub fn declares<T: CacheData>(&self) -> bool {
		self.meta.type_name == type_name::<T>()
	}

	/// Decodes into a live holder of `T`.
	///
	/// Fails if `T` is not the declared type, if decoding fails, or if the
	/// decoded value does not reproduce the recorded hash.
	pub fn decode<T: CacheData>(&self) -> Result<Holder<T>> {
		if !self.declares::<T>() {
			return Err(CacheError::TypeMismatch {
				declared: self.meta.type_name.clone(),
				requested: type_name::<T>().to_string(),
			});
		}
		let holder = Holder::<T>::from_byte_array(&self.bytes)?;
		if let Some(recorded) = &self.meta.hash
			&& T::is_hashable()
		{
			let computed = holder.my_hash()?;
			if &computed != recorded {
				return Err(CacheError::HashMismatch {
					type_name: self.meta.type_name.clone(),
					recorded: recorded.clone(),
					computed,
				});
			}
		}
		Ok(holder)
	}
}

impl ValueHolder for SerializedHolder {
	fn type_name(&self) -> &str {
		&self.meta.type_name
	}

	fn value_type_id(&self) -> Option<TypeId> {
		None
	}

	fn is_serializable(&self) -> bool {
		true
	}

	fn is_hashable(&self) -> bool {
		self.meta.hash.is_some()
	}

	fn to_byte_array(&self) -> Result<Vec<u8>> {
		Ok(self.bytes.clone())
	}

	fn my_hash(&self) -> Result<String> {
		self.meta.hash.clone().ok_or_else(|| CacheError::NotHashable {
			type_name: self.meta.type_name.clone(),
		})
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// `{metadata bytes, value bytes}` record used on the wire and in checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireEntry {
	pub meta: Vec<u8>,
	pub value: Vec<u8>,
}

impl WireEntry {
	pub fn pack(holder: &dyn ValueHolder, policy: CachePolicy) -> Result<Self> {
		let meta = EntryMeta::describe(holder, policy);
		Ok(Self {
			meta: crate::encode_value(&meta)?,
			value: holder.to_byte_array()?,
		})
	}

	pub fn unpack(self) -> Result<SerializedHolder> {
		let meta: EntryMeta = crate::decode_value(&self.meta)?;
		Ok(SerializedHolder::new(meta, self.value))
	}
}
