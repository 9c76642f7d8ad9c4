use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;

use crate::{CommError, Communicator, Envelope, Rank, Result, Tag};

struct MailboxState {
	queue: VecDeque<Envelope>,
	closed: bool,
}

struct Mailbox {
	state: Mutex<MailboxState>,
	ready: Condvar,
	claimed: Mutex<FxHashSet<Tag>>,
}

struct WorldInner {
	mailboxes: Vec<Mailbox>,
}

/// An in-process world of ranks.
///
/// Every rank owns one unbounded mailbox. Receives scan the mailbox for the
/// first message matching `(source, tag)`, so messages from one sender under
/// one tag are delivered in send order.
#[derive(Clone)]
pub struct LocalWorld {
	inner: Arc<WorldInner>,
}

impl LocalWorld {
	/// Creates a world of `size` ranks. A world needs at least one rank.
	pub fn new(size: usize) -> Result<Self> {
		if size == 0 {
			return Err(CommError::EmptyWorld);
		}
		let mailboxes = (0..size)
			.map(|_| Mailbox {
				state: Mutex::new(MailboxState {
					queue: VecDeque::new(),
					closed: false,
				}),
				ready: Condvar::new(),
				claimed: Mutex::new(FxHashSet::default()),
			})
			.collect();
		Ok(Self {
			inner: Arc::new(WorldInner { mailboxes }),
		})
	}

	/// Returns the number of ranks.
	pub fn size(&self) -> usize {
		self.inner.mailboxes.len()
	}

	/// Returns the communicator endpoint for `rank`.
	pub fn comm(&self, rank: Rank) -> Result<Arc<LocalComm>> {
		if rank >= self.size() {
			return Err(CommError::InvalidRank { rank, size: self.size() });
		}
		Ok(Arc::new(LocalComm {
			rank,
			inner: Arc::clone(&self.inner),
		}))
	}

	/// Returns one endpoint per rank, in rank order.
	pub fn comms(&self) -> Vec<Arc<LocalComm>> {
		(0..self.size())
			.map(|rank| {
				Arc::new(LocalComm {
					rank,
					inner: Arc::clone(&self.inner),
				})
			})
			.collect()
	}

	/// Closes every mailbox, waking blocked receivers with [`CommError::Disconnected`].
	pub fn shutdown(&self) {
		for mailbox in &self.inner.mailboxes {
			mailbox.state.lock().closed = true;
			mailbox.ready.notify_all();
		}
		tracing::debug!(size = self.size(), "comm.local.shutdown");
	}
}

/// One rank's endpoint into a [`LocalWorld`].
pub struct LocalComm {
	rank: Rank,
	inner: Arc<WorldInner>,
}

impl LocalComm {
	fn mailbox(&self, rank: Rank) -> Result<&Mailbox> {
		self.inner.mailboxes.get(rank).ok_or(CommError::InvalidRank {
			rank,
			size: self.inner.mailboxes.len(),
		})
	}
}

impl Communicator for LocalComm {
	fn rank(&self) -> Rank {
		self.rank
	}

	fn size(&self) -> usize {
		self.inner.mailboxes.len()
	}

	fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()> {
		let mailbox = self.mailbox(dest)?;
		let mut state = mailbox.state.lock();
		if state.closed {
			return Err(CommError::Disconnected { rank: dest });
		}
		tracing::trace!(source = self.rank, dest, tag, len = payload.len(), "comm.local.send");
		state.queue.push_back(Envelope {
			source: self.rank,
			tag,
			payload,
		});
		drop(state);
		// Several receivers with different filters may wait on one mailbox.
		mailbox.ready.notify_all();
		Ok(())
	}

	fn recv(&self, source: Option<Rank>, tag: Tag) -> Result<Envelope> {
		let mailbox = self.mailbox(self.rank)?;
		let mut state = mailbox.state.lock();
		loop {
			let found = state
				.queue
				.iter()
				.position(|env| env.tag == tag && source.is_none_or(|src| env.source == src));
			if let Some(env) = found.and_then(|pos| state.queue.remove(pos)) {
				return Ok(env);
			}
			if state.closed {
				return Err(CommError::Disconnected { rank: self.rank });
			}
			mailbox.ready.wait(&mut state);
		}
	}

	fn claim_tag(&self, tag: Tag) -> bool {
		self.mailbox(self.rank).is_ok_and(|mailbox| mailbox.claimed.lock().insert(tag))
	}

	fn release_tag(&self, tag: Tag) {
		if let Ok(mailbox) = self.mailbox(self.rank) {
			mailbox.claimed.lock().remove(&tag);
		}
	}
}
