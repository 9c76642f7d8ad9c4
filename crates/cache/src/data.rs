use std::any::{Any, type_name};
use std::hash::Hasher;

use rustc_hash::FxHasher;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CacheError, Result};

/// Per-type capabilities of a cached value.
///
/// Every cached type implements this trait. The defaults describe an opaque
/// value: not serializable and not hashable. Types that should take part in
/// checkpointing or distributed lookup override the methods, usually through
/// [`impl_cache_serde!`](crate::impl_cache_serde).
pub trait CacheData: Any + Send + Sync + Sized {
	/// True if [`CacheData::encode`] and [`CacheData::decode`] are supported.
	fn is_serializable() -> bool {
		false
	}

	/// True if [`CacheData::content_hash`] is supported.
	fn is_hashable() -> bool {
		false
	}

	/// Encodes the value into bytes.
	fn encode(&self) -> Result<Vec<u8>> {
		Err(CacheError::NotSerializable {
			type_name: type_name::<Self>().to_string(),
		})
	}

	/// Decodes a value from bytes produced by [`CacheData::encode`].
	fn decode(_bytes: &[u8]) -> Result<Self> {
		Err(CacheError::NotSerializable {
			type_name: type_name::<Self>().to_string(),
		})
	}

	/// Returns a content hash, stable across processes running the same build.
	fn content_hash(&self) -> Result<String> {
		Err(CacheError::NotHashable {
			type_name: type_name::<Self>().to_string(),
		})
	}
}

/// Encodes a serde value with postcard.
pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>> {
	postcard::to_allocvec(value).map_err(|e| CacheError::Codec {
		type_name: type_name::<T>().to_string(),
		reason: e.to_string(),
	})
}

/// Decodes a serde value with postcard.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
	postcard::from_bytes(bytes).map_err(|e| CacheError::Codec {
		type_name: type_name::<T>().to_string(),
		reason: e.to_string(),
	})
}

/// Hashes raw bytes into a fixed-width hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
	let mut hasher = FxHasher::default();
	hasher.write(bytes);
	format!("{:016x}", hasher.finish())
}

/// Implements [`CacheData`] for serde types: postcard encoding, and a hash of
/// the encoded bytes.
#[macro_export]
macro_rules! impl_cache_serde {
	($($ty:ty),* $(,)?) => {
		$(
			impl $crate::CacheData for $ty {
				fn is_serializable() -> bool {
					true
				}

				fn is_hashable() -> bool {
					true
				}

				fn encode(&self) -> $crate::Result<Vec<u8>> {
					$crate::encode_value(self)
				}

				fn decode(bytes: &[u8]) -> $crate::Result<Self> {
					$crate::decode_value(bytes)
				}

				fn content_hash(&self) -> $crate::Result<String> {
					self.encode().map(|bytes| $crate::hash_bytes(&bytes))
				}
			}
		)*
	};
}

/// Implements [`CacheData`] with the opaque defaults.
#[macro_export]
macro_rules! impl_cache_opaque {
	($($ty:ty),* $(,)?) => {
		$(
			impl $crate::CacheData for $ty {}
		)*
	};
}

impl_cache_serde!(
	bool,
	i32,
	i64,
	u32,
	u64,
	usize,
	f32,
	f64,
	String,
	Vec<u8>,
	Vec<i64>,
	Vec<f64>,
	Vec<bool>,
	Vec<String>,
	Vec<Vec<f64>>,
);
