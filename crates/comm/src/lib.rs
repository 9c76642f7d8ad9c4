//! Point-to-point message passing between cooperating ranks.
//!
//! [`Communicator`] is the narrow transport the distributed cache protocol
//! needs: tagged sends, blocking selective receives, and a per-process
//! registry of claimed tags. [`LocalWorld`] provides an in-process world of
//! ranks backed by shared mailboxes.

mod error;
mod local;


pub use error::{CommError, Result};
pub use local::{LocalComm, LocalWorld};

/// Index of a process within a communicator.
pub type Rank = usize;

/// Message tag used to match sends with receives.
pub type Tag = i32;

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
	/// Rank that sent the message.
	pub source: Rank,
	/// Tag the message was sent with.
	pub tag: Tag,
	/// Message bytes.
	pub payload: Vec<u8>,
}

/// Tagged point-to-point transport.
pub trait Communicator: Send + Sync {
	/// Rank of the calling process.
	fn rank(&self) -> Rank;

	/// Number of ranks.
	fn size(&self) -> usize;

	/// Sends `payload` to `dest` under `tag`. Never blocks on the receiver.
	fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()>;

	/// Blocks until a message with `tag` arrives from `source` (any rank when `None`).
	fn recv(&self, source: Option<Rank>, tag: Tag) -> Result<Envelope>;

	/// Claims `tag` for exclusive use by this process. Returns false if already claimed.
	fn claim_tag(&self, tag: Tag) -> bool;

	/// Releases a previously claimed tag.
	fn release_tag(&self, tag: Tag);
}
