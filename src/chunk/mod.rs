//! Chunked binary transfer, per spec.md §4.6.
//!
//! Upload sessions are owned by the user, not the connection (spec.md
//! §3 "Ownership"): they survive a disconnect and are only torn down by
//! completion, timeout, or explicit cleanup. Writes are positional
//! (`pwrite`-style) so chunks may arrive in any order.

use std::error::Error;
use std::fmt;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::codec::{encode_chunk_frame, Frame};

#[derive(Debug)]
pub enum ChunkError {
	SessionNotFound { session_id: String },
	WriteFailed { message: String },
	Io(std::io::Error),
}

impl fmt::Display for ChunkError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChunkError::SessionNotFound { session_id } => write!(f, "upload session not found: {}", session_id),
			ChunkError::WriteFailed { message } => write!(f, "upload write failed: {}", message),
			ChunkError::Io(e) => write!(f, "chunk I/O error: {}", e),
		}
	}
}

impl Error for ChunkError {}

impl From<std::io::Error> for ChunkError {
	fn from(e: std::io::Error) -> Self {
		ChunkError::Io(e)
	}
}

/// A resumable upload in progress, keyed by `sessionId` under the
/// user's slot in the session registry.
pub struct ChunkSession {
	pub session_id: String,
	pub owner: String,
	pub vault_id: String,
	pub path: String,
	pub path_hash: String,
	pub size: u64,
	pub chunk_size: u64,
	pub ctime: i64,
	pub mtime: i64,
	pub content_hash: String,
	pub client_name: Option<String>,
	pub temp_path: PathBuf,
	file: std::fs::File,
	uploaded_bytes: AtomicU64,
	last_activity_ms: AtomicU64,
}

#[allow(clippy::too_many_arguments)]
impl ChunkSession {
	pub fn create(
		owner: String,
		vault_id: String,
		path: String,
		path_hash: String,
		content_hash: String,
		client_name: Option<String>,
		ctime: i64,
		mtime: i64,
		size: u64,
		chunk_size: u64,
		temp_dir: &Path,
	) -> Result<Self, ChunkError> {
		let session_id = Uuid::new_v4().to_string();
		let temp_path = temp_dir.join(format!("{}.upload", session_id));
		let file = std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(&temp_path)?;
		file.set_len(size)?;

		Ok(ChunkSession {
			session_id,
			owner,
			vault_id,
			path,
			path_hash,
			size,
			chunk_size,
			ctime,
			mtime,
			content_hash,
			client_name,
			temp_path,
			file,
			uploaded_bytes: AtomicU64::new(0),
			last_activity_ms: AtomicU64::new(crate::repo::now_ms() as u64),
		})
	}

	#[cfg(test)]
	pub fn new_for_test(session_id: String, size: u64, chunk_size: u64) -> Self {
		let dir = tempfile::tempdir().unwrap();
		let temp_path = dir.path().join("test.upload");
		let file = std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(&temp_path).unwrap();
		file.set_len(size).unwrap();
		std::mem::forget(dir);
		ChunkSession {
			session_id,
			owner: "test".into(),
			vault_id: "v".into(),
			path: "p".into(),
			path_hash: "h".into(),
			size,
			chunk_size,
			ctime: 0,
			mtime: 0,
			content_hash: String::new(),
			client_name: None,
			temp_path,
			file,
			uploaded_bytes: AtomicU64::new(0),
			last_activity_ms: AtomicU64::new(0),
		}
	}

	/// Writes one chunk at its positional offset. Returns whether the
	/// session is now complete (`uploadedBytes >= size`), per spec.md
	/// §4.6 — completion is judged by byte count, not by chunk index.
	pub fn write_chunk(&self, chunk_index: u32, bytes: &[u8]) -> Result<bool, ChunkError> {
		let offset = chunk_index as u64 * self.chunk_size;
		self.file
			.write_at(bytes, offset)
			.map_err(|e| ChunkError::WriteFailed { message: e.to_string() })?;
		self.uploaded_bytes.fetch_add(bytes.len() as u64, Ordering::SeqCst);
		self.last_activity_ms.store(crate::repo::now_ms() as u64, Ordering::SeqCst);
		Ok(self.is_complete())
	}

	pub fn uploaded_bytes(&self) -> u64 {
		self.uploaded_bytes.load(Ordering::SeqCst)
	}

	pub fn is_complete(&self) -> bool {
		self.uploaded_bytes() >= self.size
	}

	pub fn is_expired(&self, timeout: Duration) -> bool {
		let last = self.last_activity_ms.load(Ordering::SeqCst) as i64;
		crate::repo::now_ms() - last > timeout.as_millis() as i64
	}

	/// Removes the temp file; called on fatal write error or timeout.
	pub fn cleanup(&self) -> std::io::Result<()> {
		std::fs::remove_file(&self.temp_path).or_else(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				Ok(())
			} else {
				Err(e)
			}
		})
	}
}

/// Streams `totalChunks` binary frames of a blob to `outbound`,
/// sequentially, bounded by `timeout` for the whole transfer.
pub async fn stream_download(
	session_id: &str,
	mut reader: impl AsyncRead + Unpin,
	size: u64,
	chunk_size: u64,
	outbound: mpsc::Sender<Frame>,
	timeout: Duration,
) -> Result<(), ChunkError> {
	let transfer = async {
		let total_chunks = size.div_ceil(chunk_size.max(1));
		let mut remaining = size;
		for idx in 0..total_chunks {
			let this_len = remaining.min(chunk_size) as usize;
			let mut buf = vec![0u8; this_len];
			reader.read_exact(&mut buf).await.map_err(ChunkError::Io)?;
			remaining -= this_len as u64;
			let frame = Frame::Binary(encode_chunk_frame(session_id, idx as u32, &buf));
			if outbound.send(frame).await.is_err() {
				break;
			}
		}
		Ok(())
	};

	match tokio::time::timeout(timeout, transfer).await {
		Ok(result) => result,
		Err(_) => Err(ChunkError::WriteFailed { message: "download timed out".to_string() }),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn out_of_order_chunks_reassemble_correctly() {
		let size = 30u64;
		let chunk_size = 10u64;
		let session = ChunkSession::new_for_test("s1".to_string(), size, chunk_size);

		let chunk0 = vec![b'A'; 10];
		let chunk1 = vec![b'B'; 10];
		let chunk2 = vec![b'C'; 10];

		assert!(!session.write_chunk(2, &chunk2).unwrap());
		assert!(!session.write_chunk(0, &chunk0).unwrap());
		assert!(session.write_chunk(1, &chunk1).unwrap());

		let data = std::fs::read(&session.temp_path).unwrap();
		assert_eq!(&data[0..10], chunk0.as_slice());
		assert_eq!(&data[10..20], chunk1.as_slice());
		assert_eq!(&data[20..30], chunk2.as_slice());
	}

	#[test]
	fn completion_is_judged_by_byte_count() {
		let session = ChunkSession::new_for_test("s1".to_string(), 15, 10);
		assert!(!session.write_chunk(0, &vec![0u8; 10]).unwrap());
		assert!(session.write_chunk(1, &vec![0u8; 5]).unwrap());
	}

	#[test]
	fn is_expired_respects_timeout() {
		let session = ChunkSession::new_for_test("s1".to_string(), 10, 10);
		assert!(session.is_expired(Duration::from_millis(0)));
	}

	#[tokio::test]
	async fn stream_download_sends_expected_chunk_count() {
		let data = vec![7u8; 25];
		let reader = std::io::Cursor::new(data.clone());
		let (tx, mut rx) = mpsc::channel(8);

		stream_download("sess", reader, 25, 10, tx, Duration::from_secs(5)).await.unwrap();

		let mut received = Vec::new();
		while let Ok(frame) = rx.try_recv() {
			if let Frame::Binary(bytes) = frame {
				received.push(bytes);
			}
		}
		assert_eq!(received.len(), 3);
	}
}

// vim: ts=4
