//! Error types for notesync operations

use std::error::Error;
use std::fmt;
use std::io;

use serde_json::json;

use crate::chunk::ChunkError;
use crate::codec::{server_frame, CodecError, Frame};
use crate::merge::MergeError;
use crate::repo::RepoError;

/// Helper to reduce `Box::new()` boilerplate when wrapping errors into
/// `Box<dyn Error + Send + Sync>` for error variant fields.
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Unified error type for sync operations.
///
/// Domain-specific error enums nest into this one variant via `From`,
/// the same way the session registry, chunk transfer, and merge engine
/// each keep their own error type but converge here at module boundaries.
#[derive(Debug)]
pub enum SyncError {
	/// Request failed binding/validation.
	InvalidParams { fields: Vec<(String, String)> },

	/// Resource (or upload session) does not exist or is a tombstone.
	NotFound { what: String },

	/// Rename target already exists, or a vault name collision occurred.
	PreconditionFailed { message: String },

	/// Chunk write I/O error.
	UploadFailed { message: String },

	/// Referenced session id is unknown (expired or never existed).
	UploadSessionNotFound { session_id: String },

	/// Repository unreachable, disk full, or similar unrecoverable condition.
	Fatal { message: String },

	/// Repository error (nested).
	Repo(RepoError),

	/// Blob store error (nested).
	Blob(Box<dyn Error + Send + Sync>),

	/// Chunk transfer error (nested).
	Chunk(ChunkError),

	/// Merge engine error (nested).
	Merge(MergeError),

	/// Message codec error (nested).
	Codec(CodecError),

	/// I/O error.
	Io(io::Error),

	/// Generic error message, used sparingly.
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::InvalidParams { fields } => {
				write!(f, "invalid params: ")?;
				for (i, (field, msg)) in fields.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{}: {}", field, msg)?;
				}
				Ok(())
			}
			SyncError::NotFound { what } => write!(f, "not found: {}", what),
			SyncError::PreconditionFailed { message } => {
				write!(f, "precondition failed: {}", message)
			}
			SyncError::UploadFailed { message } => write!(f, "upload failed: {}", message),
			SyncError::UploadSessionNotFound { session_id } => {
				write!(f, "upload session not found: {}", session_id)
			}
			SyncError::Fatal { message } => write!(f, "fatal error: {}", message),
			SyncError::Repo(e) => write!(f, "repository error: {}", e),
			SyncError::Blob(e) => write!(f, "blob store error: {}", e),
			SyncError::Chunk(e) => write!(f, "chunk error: {}", e),
			SyncError::Merge(e) => write!(f, "merge error: {}", e),
			SyncError::Codec(e) => write!(f, "codec error: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<RepoError> for SyncError {
	fn from(e: RepoError) -> Self {
		SyncError::Repo(e)
	}
}

impl From<ChunkError> for SyncError {
	fn from(e: ChunkError) -> Self {
		SyncError::Chunk(e)
	}
}

impl From<MergeError> for SyncError {
	fn from(e: MergeError) -> Self {
		SyncError::Merge(e)
	}
}

impl From<CodecError> for SyncError {
	fn from(e: CodecError) -> Self {
		SyncError::Codec(e)
	}
}

impl SyncError {
	/// Maps this error to the typed reply frame sent back to the
	/// originating client, per spec.md §7's error taxonomy and the
	/// `Error{Variant}` action names spec.md §4.2/§4.6 give as examples
	/// (`ErrorInvalidParams`, `ErrorFileUploadFailed`,
	/// `ErrorFileUploadSessionNotFound`).
	pub fn to_frame(&self, vault: Option<&str>) -> Frame {
		let (action, data) = match self {
			SyncError::InvalidParams { fields } => (
				"ErrorInvalidParams",
				json!({ "fields": fields.iter().map(|(f, m)| json!({"field": f, "message": m})).collect::<Vec<_>>() }),
			),
			SyncError::NotFound { what } => ("ErrorNotFound", json!({ "what": what })),
			SyncError::PreconditionFailed { message } => ("ErrorPreconditionFailed", json!({ "message": message })),
			SyncError::UploadFailed { message } => ("ErrorFileUploadFailed", json!({ "message": message })),
			SyncError::UploadSessionNotFound { session_id } => ("ErrorFileUploadSessionNotFound", json!({ "sessionId": session_id })),
			SyncError::Chunk(e) => ("ErrorFileUploadFailed", json!({ "message": e.to_string() })),
			SyncError::Codec(e) => ("ErrorInvalidParams", json!({ "message": e.to_string() })),
			SyncError::Fatal { message } => ("ErrorFatal", json!({ "message": message })),
			SyncError::Repo(e) => ("ErrorFatal", json!({ "message": e.to_string() })),
			SyncError::Blob(e) => ("ErrorFatal", json!({ "message": e.to_string() })),
			SyncError::Merge(e) => ("ErrorFatal", json!({ "message": e.to_string() })),
			SyncError::Io(e) => ("ErrorFatal", json!({ "message": e.to_string() })),
			SyncError::Other { message } => ("ErrorFatal", json!({ "message": message })),
		};
		server_frame(action, data, vault)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_params_maps_to_typed_frame() {
		let err = SyncError::InvalidParams { fields: vec![("path".to_string(), "required".to_string())] };
		let frame = err.to_frame(Some("default"));
		match frame {
			Frame::Text(v) => {
				assert_eq!(v["action"], "ErrorInvalidParams");
				assert_eq!(v["vault"], "default");
				assert_eq!(v["data"]["fields"][0]["field"], "path");
			}
			Frame::Binary(_) => panic!("expected a text frame"),
		}
	}

	#[test]
	fn upload_failed_maps_to_file_upload_failed() {
		let err = SyncError::UploadFailed { message: "disk full".to_string() };
		match err.to_frame(None) {
			Frame::Text(v) => assert_eq!(v["action"], "ErrorFileUploadFailed"),
			Frame::Binary(_) => panic!("expected a text frame"),
		}
	}

	#[test]
	fn upload_session_not_found_carries_session_id() {
		let err = SyncError::UploadSessionNotFound { session_id: "s1".to_string() };
		match err.to_frame(None) {
			Frame::Text(v) => {
				assert_eq!(v["action"], "ErrorFileUploadSessionNotFound");
				assert_eq!(v["data"]["sessionId"], "s1");
			}
			Frame::Binary(_) => panic!("expected a text frame"),
		}
	}
}

// vim: ts=4
