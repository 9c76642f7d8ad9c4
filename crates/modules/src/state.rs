use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{ModuleError, Result};

/// Opaque snapshot of a computation, handed from parent to child modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationState {
	data: Option<Bytes>,
}

impl ComputationState {
	/// A state with no data.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Wraps raw bytes.
	pub fn from_bytes(data: impl Into<Bytes>) -> Self {
		Self { data: Some(data.into()) }
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_none()
	}

	pub fn bytes(&self) -> Option<&Bytes> {
		self.data.as_ref()
	}

	/// Encodes a serde value as the state payload.
	pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
		postcard::to_allocvec(value)
			.map(Self::from_bytes)
			.map_err(|e| ModuleError::State(e.to_string()))
	}

	/// Decodes the payload. `Ok(None)` for an empty state.
	pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>> {
		let Some(data) = &self.data else {
			return Ok(None);
		};
		postcard::from_bytes(data)
			.map(Some)
			.map_err(|e| ModuleError::State(e.to_string()))
	}
}
