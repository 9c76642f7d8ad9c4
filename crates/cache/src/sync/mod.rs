//! Distributed lookup protocol between cooperating cache maps.
//!
//! Rank 0 is the coordinator: it tracks which rank holds each
//! distribute-global key. Every rank runs a server thread that answers
//! commands on the session tag. Clients talk to the coordinator for QUERY,
//! ADD and DELETE, and to the holding rank for GET.
//!
//! A session reserves a block of four tags: commands on `tag`,
//! acknowledgements on `tag + 1`, GET payloads on `tag + 2`, and the
//! start-up key exchange on `tag + 3`.

mod client;
mod server;


use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use pulsar_comm::{Communicator, Rank, Tag};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub(crate) use self::client::{announce, fetch_remote};
use crate::map::Entries;
use crate::{CacheError, CachePolicy, Result, decode_value, encode_value};

/// Rank tracking key ownership.
pub(crate) const COORDINATOR: Rank = 0;

/// Protocol command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Command {
	/// Negative acknowledgement.
	Nack = -1,
	/// Positive acknowledgement.
	Ack = 0,
	/// Liveness check.
	Ping = 1,
	/// Ask the coordinator which rank holds a key.
	Query = 2,
	/// Tell the coordinator this rank now holds a key.
	Add = 3,
	/// Tell the coordinator this rank no longer holds a key.
	Delete = 4,
	/// Ask a rank for the serialized value of a key.
	Get = 5,
	/// Shut the server loop down.
	Stop = 100,
}

impl Command {
	/// Wire code of the command.
	pub fn code(self) -> i32 {
		self as i32
	}

	/// Decodes a wire code.
	pub fn from_code(code: i32) -> Option<Self> {
		Some(match code {
			-1 => Self::Nack,
			0 => Self::Ack,
			1 => Self::Ping,
			2 => Self::Query,
			3 => Self::Add,
			4 => Self::Delete,
			5 => Self::Get,
			100 => Self::Stop,
			_ => return None,
		})
	}

	/// Upper-case protocol name.
	pub fn name(self) -> &'static str {
		match self {
			Self::Nack => "NACK",
			Self::Ack => "ACK",
			Self::Ping => "PING",
			Self::Query => "QUERY",
			Self::Add => "ADD",
			Self::Delete => "DELETE",
			Self::Get => "GET",
			Self::Stop => "STOP",
		}
	}
}

/// A command code followed by its string payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Message {
	pub code: i32,
	pub text: String,
}

impl Message {
	pub fn new(command: Command, text: impl Into<String>) -> Self {
		Self {
			code: command.code(),
			text: text.into(),
		}
	}

	pub fn command(&self) -> Option<Command> {
		Command::from_code(self.code)
	}

	pub fn encode(&self) -> Result<Vec<u8>> {
		encode_value(self)
	}

	pub fn decode(bytes: &[u8]) -> Result<Self> {
		decode_value(bytes)
	}
}

/// The tag block reserved by one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SyncTags {
	pub command: Tag,
	pub ack: Tag,
	pub data: Tag,
	pub startup: Tag,
}

impl SyncTags {
	pub fn new(tag: Tag) -> Result<Self> {
		if tag < 0 || tag.checked_add(3).is_none() {
			return Err(CacheError::InvalidTag { tag });
		}
		Ok(Self {
			command: tag,
			ack: tag + 1,
			data: tag + 2,
			startup: tag + 3,
		})
	}

	fn all(self) -> [Tag; 4] {
		[self.command, self.ack, self.data, self.startup]
	}

	/// Claims every tag of the block, or none of them.
	fn claim(self, comm: &dyn Communicator) -> Result<()> {
		let mut claimed = Vec::with_capacity(4);
		for tag in self.all() {
			if !comm.claim_tag(tag) {
				for held in claimed {
					comm.release_tag(held);
				}
				return Err(CacheError::TagInUse { tag });
			}
			claimed.push(tag);
		}
		Ok(())
	}

	fn release(self, comm: &dyn Communicator) {
		for tag in self.all() {
			comm.release_tag(tag);
		}
	}
}

/// Coordinator-side map of key to holding ranks.
#[derive(Debug, Default)]
pub(crate) struct Directory {
	holders: FxHashMap<String, Vec<Rank>>,
}

impl Directory {
	pub fn add(&mut self, key: String, rank: Rank) {
		let ranks = self.holders.entry(key).or_default();
		if !ranks.contains(&rank) {
			ranks.push(rank);
		}
	}

	/// Removes `rank` as a holder of `key`. Returns false if it was not one.
	pub fn remove(&mut self, key: &str, rank: Rank) -> bool {
		let Some(ranks) = self.holders.get_mut(key) else {
			return false;
		};
		let Some(pos) = ranks.iter().position(|r| *r == rank) else {
			return false;
		};
		ranks.remove(pos);
		if ranks.is_empty() {
			self.holders.remove(key);
		}
		true
	}

	/// Picks a holder of `key`, preferring one other than `requester`.
	pub fn holder(&self, key: &str, requester: Rank) -> Option<Rank> {
		let ranks = self.holders.get(key)?;
		ranks.iter().copied().find(|r| *r != requester).or_else(|| ranks.first().copied())
	}

	pub fn len(&self) -> usize {
		self.holders.len()
	}
}

/// Reason the server thread of a session gave up, set at most once.
pub(crate) type Failure = Arc<OnceLock<String>>;

/// A running sync session.
pub(crate) struct SyncSession {
	pub tags: SyncTags,
	pub comm: Arc<dyn Communicator>,
	failure: Failure,
	worker: Option<JoinHandle<Result<()>>>,
}

impl SyncSession {
	/// Fails once this rank's server thread has hit a protocol fault.
	pub fn ensure_healthy(&self) -> Result<()> {
		match self.failure.get() {
			Some(reason) => Err(CacheError::Protocol {
				command: "sync",
				reason: format!("sync server on rank {} failed: {reason}", self.comm.rank()),
			}),
			None => Ok(()),
		}
	}
}

/// Keys this rank advertises at start-up.
fn distributed_keys(entries: &Entries) -> Vec<String> {
	let mut keys: Vec<String> = entries
		.lock()
		.iter()
		.filter(|(_, entry)| entry.policy.contains(CachePolicy::DISTRIBUTE_GLOBAL) && entry.value.is_serializable())
		.map(|(key, _)| key.clone())
		.collect();
	keys.sort();
	keys
}

/// Performs the start-up key exchange and spawns the server thread.
///
/// Must be called on every rank of the communicator with the same tag.
pub(crate) fn start(comm: Arc<dyn Communicator>, entries: Entries, tag: Tag) -> Result<SyncSession> {
	let tags = SyncTags::new(tag)?;
	tags.claim(comm.as_ref())?;
	match exchange_keys(comm.as_ref(), &entries, tags) {
		Ok(directory) => {
			let failure = Failure::default();
			let server = server::Server::new(Arc::clone(&comm), entries, tags, directory, Arc::clone(&failure));
			let worker = std::thread::Builder::new()
				.name(format!("pulsar-cache-sync-{tag}"))
				.spawn(move || server.run())
				.map_err(|e| {
					tags.release(comm.as_ref());
					CacheError::Thread(e.to_string())
				})?;
			tracing::debug!(rank = comm.rank(), tag, "cache.sync.started");
			Ok(SyncSession {
				tags,
				comm,
				failure,
				worker: Some(worker),
			})
		}
		Err(e) => {
			tags.release(comm.as_ref());
			Err(e)
		}
	}
}

fn exchange_keys(comm: &dyn Communicator, entries: &Entries, tags: SyncTags) -> Result<Option<Directory>> {
	let own = distributed_keys(entries);
	if comm.rank() != COORDINATOR {
		comm.send(COORDINATOR, tags.startup, encode_value(&own)?)?;
		return Ok(None);
	}

	let mut directory = Directory::default();
	for key in own {
		directory.add(key, COORDINATOR);
	}
	for _ in 1..comm.size() {
		let env = comm.recv(None, tags.startup)?;
		let keys: Vec<String> = decode_value(&env.payload)?;
		for key in keys {
			directory.add(key, env.source);
		}
	}
	tracing::debug!(keys = directory.len(), ranks = comm.size(), "cache.sync.directory_built");
	Ok(Some(directory))
}

/// Stops this rank's server thread and releases the tag block.
pub(crate) fn stop(mut session: SyncSession) -> Result<()> {
	let result = shutdown(&mut session);
	session.tags.release(session.comm.as_ref());
	tracing::debug!(rank = session.comm.rank(), tag = session.tags.command, "cache.sync.stopped");
	result
}

fn shutdown(session: &mut SyncSession) -> Result<()> {
	let Some(worker) = session.worker.take() else {
		return Ok(());
	};
	if !worker.is_finished() {
		let reply = client::request(session.comm.as_ref(), session.tags, session.comm.rank(), Command::Stop, "")?;
		if reply.command() != Some(Command::Ack) {
			return Err(CacheError::Protocol {
				command: Command::Stop.name(),
				reason: format!("expected ACK, got code {}", reply.code),
			});
		}
	}
	worker.join().map_err(|_| CacheError::Thread("sync server thread panicked".to_string()))?
}
