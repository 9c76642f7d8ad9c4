//! Key-scoped result cache.
//!
//! A [`CacheMap`] stores type-erased values ([`ValueHolder`]) under string
//! keys together with a [`CachePolicy`]. Values whose type opts into
//! serialization through [`CacheData`] can be checkpointed to a
//! [`CheckpointIo`] backend and fetched from cooperating ranks once
//! [`CacheMap::start_sync`] has been called on every rank.

mod checkpoint;
mod data;
mod error;
mod holder;
mod map;
mod policy;
mod slice;
mod sync;

pub use checkpoint::{Checkpoint, CheckpointIo, DirCheckpoint, MemoryCheckpoint};
pub use data::{CacheData, hash_bytes};
#[doc(hidden)]
pub use data::{decode_value, encode_value};
pub use error::{CacheError, Result};
pub use holder::{EntryMeta, Holder, SerializedHolder, ValueHolder};
pub use map::CacheMap;
pub use policy::CachePolicy;
pub use slice::CacheSlice;
pub use sync::Command;
