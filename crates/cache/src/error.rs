//! Error types for the cache and its sync protocol.

use std::path::PathBuf;

use pulsar_comm::{CommError, Tag};
use thiserror::Error;

/// Errors raised by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
	/// Serialization was requested for a type that does not support it.
	#[error("values of type {type_name} are not serializable")]
	NotSerializable {
		/// Type of the held value.
		type_name: String,
	},

	/// A hash was requested for a type that does not support it.
	#[error("values of type {type_name} are not hashable")]
	NotHashable {
		/// Type of the held value.
		type_name: String,
	},

	/// A serialized entry was decoded as a different type than it declares.
	#[error("serialized entry declares type {declared}, requested {requested}")]
	TypeMismatch {
		/// Type recorded with the bytes.
		declared: String,
		/// Type the caller asked for.
		requested: String,
	},

	/// A decoded value does not reproduce the hash recorded with its bytes.
	#[error("hash mismatch for {type_name}: recorded {recorded}, computed {computed}")]
	HashMismatch {
		/// Type of the value.
		type_name: String,
		/// Hash stored alongside the bytes.
		recorded: String,
		/// Hash of the decoded value.
		computed: String,
	},

	/// Encoding or decoding failed.
	#[error("codec error for {type_name}: {reason}")]
	Codec {
		/// Type being encoded or decoded.
		type_name: String,
		/// Codec diagnostic.
		reason: String,
	},

	/// A cache slice outlived the map it points into.
	#[error("cache slice '{scope}' is detached from its cache map")]
	Detached {
		/// Owner scope of the slice.
		scope: String,
	},

	/// No communicator was configured for this cache map.
	#[error("cache map has no communicator; distributed sync is unavailable")]
	NoCommunicator,

	/// Sync tags must be non-negative.
	#[error("invalid sync tag {tag}: tags must be non-negative")]
	InvalidTag {
		/// The rejected tag.
		tag: Tag,
	},

	/// Another sync session on this rank already uses the tag block.
	#[error("sync tag {tag} is already in use")]
	TagInUse {
		/// The rejected tag.
		tag: Tag,
	},

	/// `start_sync` was called twice.
	#[error("cache sync is already running on tag {tag}")]
	SyncActive {
		/// Tag of the running session.
		tag: Tag,
	},

	/// `stop_sync` was called without a running session.
	#[error("cache sync is not running")]
	SyncInactive,

	/// A peer sent something the protocol does not allow at this point.
	#[error("sync protocol violation during {command}: {reason}")]
	Protocol {
		/// Command being exchanged.
		command: &'static str,
		/// What was wrong.
		reason: String,
	},

	/// The sync background thread could not be started or panicked.
	#[error("sync thread failure: {0}")]
	Thread(String),

	/// Transport failure.
	#[error(transparent)]
	Comm(#[from] CommError),

	/// A checkpoint backend has no record for the key.
	#[error("checkpoint has no entry for key '{0}'")]
	MissingCheckpoint(String),

	/// Checkpoint I/O failure.
	#[error("I/O error on {path}: {error}")]
	Io {
		/// File involved.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
