use std::sync::Arc;

use pulsar_comm::{Communicator, Rank};

use super::{COORDINATOR, Command, Directory, Failure, Message, SyncTags};
use crate::holder::WireEntry;
use crate::map::Entries;
use crate::{CacheError, Result, encode_value};

/// Command loop run on the sync thread of every rank.
pub(super) struct Server {
	comm: Arc<dyn Communicator>,
	entries: Entries,
	tags: SyncTags,
	/// Present on the coordinator only.
	directory: Option<Directory>,
	failure: Failure,
}

impl Server {
	pub fn new(comm: Arc<dyn Communicator>, entries: Entries, tags: SyncTags, directory: Option<Directory>, failure: Failure) -> Self {
		Self {
			comm,
			entries,
			tags,
			directory,
			failure,
		}
	}

	/// Serves commands until STOP.
	///
	/// A protocol fault is logged and recorded in the session, after which
	/// the server refuses every request with NACK until it is stopped. The
	/// fault is returned when the thread is joined.
	pub fn run(mut self) -> Result<()> {
		let Err(fault) = self.serve() else {
			return Ok(());
		};
		let rank = self.comm.rank();
		tracing::error!(rank, tag = self.tags.command, error = %fault, "cache.sync.server_failed");
		let _ = self.failure.set(fault.to_string());
		if let Err(e) = self.refuse_until_stop() {
			tracing::warn!(rank, error = %e, "cache.sync.refusal_loop_ended");
		}
		Err(fault)
	}

	fn refuse_until_stop(&self) -> Result<()> {
		loop {
			let env = self.comm.recv(None, self.tags.command)?;
			match Message::decode(&env.payload).ok().and_then(|msg| msg.command()) {
				Some(Command::Stop) => return self.reply(env.source, Command::Ack, ""),
				// Acknowledgements have no waiting sender.
				Some(Command::Ack | Command::Nack) => {}
				_ => self.reply(env.source, Command::Nack, "")?,
			}
		}
	}

	fn serve(&mut self) -> Result<()> {
		loop {
			let env = self.comm.recv(None, self.tags.command)?;
			let msg = match Message::decode(&env.payload) {
				Ok(msg) => msg,
				Err(e) => return Err(self.refuse(env.source, e)),
			};
			let Some(command) = msg.command() else {
				let fault = CacheError::Protocol {
					command: "recv",
					reason: format!("unknown command code {} from rank {}", msg.code, env.source),
				};
				return Err(self.refuse(env.source, fault));
			};
			tracing::trace!(rank = self.comm.rank(), source = env.source, command = command.name(), text = %msg.text, "cache.sync.command");

			match command {
				Command::Ping => self.reply(env.source, Command::Ack, "")?,
				Command::Query => self.query(env.source, &msg.text)?,
				Command::Add => {
					self.directory_mut(env.source, command)?.add(msg.text, env.source);
					self.reply(env.source, Command::Ack, "")?;
				}
				Command::Delete => {
					let removed = self.directory_mut(env.source, command)?.remove(&msg.text, env.source);
					self.reply(env.source, if removed { Command::Ack } else { Command::Nack }, "")?;
				}
				Command::Get => self.get(env.source, &msg.text)?,
				Command::Stop => {
					self.reply(env.source, Command::Ack, "")?;
					return Ok(());
				}
				Command::Ack | Command::Nack => {
					return Err(CacheError::Protocol {
						command: command.name(),
						reason: format!("unsolicited acknowledgement from rank {}", env.source),
					});
				}
			}
		}
	}

	fn reply(&self, dest: Rank, command: Command, text: &str) -> Result<()> {
		self.comm.send(dest, self.tags.ack, Message::new(command, text).encode()?)?;
		Ok(())
	}

	/// NACKs a request that cannot be served, so its sender does not block.
	fn refuse(&self, source: Rank, fault: CacheError) -> CacheError {
		if let Err(e) = self.reply(source, Command::Nack, "") {
			tracing::warn!(rank = self.comm.rank(), source, error = %e, "cache.sync.refusal_failed");
		}
		fault
	}

	fn directory_mut(&mut self, source: Rank, command: Command) -> Result<&mut Directory> {
		if self.directory.is_none() {
			let fault = CacheError::Protocol {
				command: command.name(),
				reason: format!("rank {} is not the coordinator (rank {COORDINATOR})", self.comm.rank()),
			};
			return Err(self.refuse(source, fault));
		}
		self.directory.as_mut().ok_or_else(|| CacheError::Protocol {
			command: command.name(),
			reason: "coordinator directory vanished".to_string(),
		})
	}

	fn query(&mut self, source: Rank, key: &str) -> Result<()> {
		let holder = self.directory_mut(source, Command::Query)?.holder(key, source);
		match holder {
			Some(rank) => self.reply(source, Command::Ack, &rank.to_string()),
			None => self.reply(source, Command::Nack, key),
		}
	}

	fn get(&self, source: Rank, key: &str) -> Result<()> {
		let packed = {
			let entries = self.entries.lock();
			entries
				.get(key)
				.filter(|entry| entry.value.is_serializable())
				.map(|entry| WireEntry::pack(entry.value.as_ref(), entry.policy))
		};
		match packed {
			Some(Ok(wire)) => {
				self.reply(source, Command::Ack, key)?;
				self.comm.send(source, self.tags.data, encode_value(&wire)?)?;
				Ok(())
			}
			Some(Err(e)) => {
				tracing::warn!(key, error = %e, "cache.sync.get_encode_failed");
				self.reply(source, Command::Nack, key)
			}
			None => self.reply(source, Command::Nack, key),
		}
	}
}
