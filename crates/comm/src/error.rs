use thiserror::Error;

use crate::Rank;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommError {
	/// The destination rank does not exist.
	#[error("rank {rank} is out of range for a world of size {size}")]
	InvalidRank {
		/// The requested rank.
		rank: Rank,
		/// Number of ranks.
		size: usize,
	},

	/// A world was requested with zero ranks.
	#[error("a communicator world needs at least one rank")]
	EmptyWorld,

	/// The world was shut down while sending or waiting.
	#[error("communicator for rank {rank} is disconnected")]
	Disconnected {
		/// The rank whose mailbox is closed.
		rank: Rank,
	},
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, CommError>;
