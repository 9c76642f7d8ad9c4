use pulsar_comm::{Communicator, Rank};

use super::{COORDINATOR, Command, Message, SyncSession, SyncTags};
use crate::holder::{SerializedHolder, WireEntry};
use crate::{CacheError, Result, decode_value};

/// Sends one command and waits for its acknowledgement.
///
/// Callers serialize requests per rank, so acks arrive in request order.
pub(super) fn request(comm: &dyn Communicator, tags: SyncTags, dest: Rank, command: Command, text: &str) -> Result<Message> {
	comm.send(dest, tags.command, Message::new(command, text).encode()?)?;
	let env = comm.recv(Some(dest), tags.ack)?;
	let reply = Message::decode(&env.payload)?;
	match reply.command() {
		Some(Command::Ack | Command::Nack) => Ok(reply),
		_ => Err(CacheError::Protocol {
			command: command.name(),
			reason: format!("expected ACK or NACK from rank {dest}, got code {}", reply.code),
		}),
	}
}

/// Informs the coordinator that this rank gained (`Add`) or lost (`Delete`) `key`.
///
/// Returns true if the coordinator acknowledged.
pub(crate) fn announce(session: &SyncSession, command: Command, key: &str) -> Result<bool> {
	session.ensure_healthy()?;
	let reply = request(session.comm.as_ref(), session.tags, COORDINATOR, command, key)?;
	Ok(reply.command() == Some(Command::Ack))
}

/// Looks `key` up on the other ranks.
///
/// `Ok(None)` means no rank holds the key.
pub(crate) fn fetch_remote(session: &SyncSession, key: &str) -> Result<Option<SerializedHolder>> {
	session.ensure_healthy()?;
	let comm = session.comm.as_ref();
	let reply = request(comm, session.tags, COORDINATOR, Command::Query, key)?;
	if reply.command() == Some(Command::Nack) {
		tracing::debug!(key, "cache.sync.remote_miss");
		return Ok(None);
	}
	let holder: Rank = reply.text.parse().map_err(|_| CacheError::Protocol {
		command: Command::Query.name(),
		reason: format!("coordinator answered with non-rank '{}'", reply.text),
	})?;

	let reply = request(comm, session.tags, holder, Command::Get, key)?;
	if reply.command() == Some(Command::Nack) {
		tracing::debug!(key, holder, "cache.sync.remote_get_refused");
		return Ok(None);
	}
	let env = comm.recv(Some(holder), session.tags.data)?;
	let wire: WireEntry = decode_value(&env.payload)?;
	let value = wire.unpack()?;
	tracing::debug!(key, holder, type_name = %value.meta().type_name, "cache.sync.remote_fetched");
	Ok(Some(value))
}
