use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
	/// Persistence and distribution flags attached to every cache entry.
	#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
	pub struct CachePolicy: u32 {
		/// Written by local (per-rank) checkpoints.
		const CHECKPOINT_LOCAL  = 0b001;
		/// Written by global checkpoints.
		const CHECKPOINT_GLOBAL = 0b010;
		/// Advertised to the sync coordinator and served to other ranks.
		const DISTRIBUTE_GLOBAL = 0b100;
	}
}

impl CachePolicy {
	/// No persistence, no distribution.
	pub const NONE: Self = Self::empty();
}
