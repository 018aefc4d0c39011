//! Blob store abstraction, per spec.md §4.6 and §9.
//!
//! The core only depends on this trait; the actual backends (S3, OSS,
//! R2, WebDAV) are external collaborators per spec.md §1. `LocalBlobStore`
//! is the one concrete implementation carried here, used both directly
//! and as the reference behaviour other backends must match.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::io::AsyncRead;

#[derive(Debug)]
pub enum BlobError {
	Io(std::io::Error),
	NotFound { key: String },
}

impl fmt::Display for BlobError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BlobError::Io(e) => write!(f, "blob I/O error: {}", e),
			BlobError::NotFound { key } => write!(f, "blob not found: {}", key),
		}
	}
}

impl Error for BlobError {}

impl From<std::io::Error> for BlobError {
	fn from(e: std::io::Error) -> Self {
		BlobError::Io(e)
	}
}

/// Storage for file attachment bodies, addressed by opaque key.
///
/// Keys are never interpreted by the core (spec.md §6: "the core treats
/// keys as opaque"); `LocalBlobStore::generate_key` merely follows the
/// suggested `<yyyyMM>/<fileId>/<sanitizedName>` shape.
#[async_trait]
pub trait BlobStore: Send + Sync {
	/// Moves a completed upload's temp file into the store under `key`.
	/// Must be atomic from a reader's perspective.
	async fn put(&self, temp_path: &Path, key: &str) -> Result<(), BlobError>;

	/// Opens `key` for streaming read.
	async fn open(&self, key: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>, BlobError>;

	/// Removes the blob at `key`. Idempotent: removing an absent key is
	/// not an error.
	async fn remove(&self, key: &str) -> Result<(), BlobError>;

	/// Generates a fresh opaque key for a newly-uploaded file.
	fn generate_key(&self, file_id: &str, name: &str) -> String {
		let (year, month) = year_month_now();
		format!("{:04}{:02}/{}/{}", year, month, file_id, sanitize_name(name))
	}
}

fn sanitize_name(name: &str) -> String {
	name.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
		.collect()
}

/// Civil (year, month) for the current UTC time, via Howard Hinnant's
/// days-from-civil algorithm run in reverse. Avoids pulling in a
/// calendar crate for what is, per spec.md §6, just a suggested key shape.
fn year_month_now() -> (i64, u32) {
	let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
	let days = secs.div_euclid(86_400);
	civil_from_days(days)
}

fn civil_from_days(z: i64) -> (i64, u32) {
	let z = z + 719_468;
	let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
	let doe = (z - era * 146_097) as u64;
	let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
	let y = yoe as i64 + era * 400;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let m = if mp < 10 { mp + 3 } else { mp - 9 };
	let year = if m <= 2 { y + 1 } else { y };
	(year, m as u32)
}

/// Local-filesystem blob store: files live under `root/<key>`.
pub struct LocalBlobStore {
	root: PathBuf,
}

impl LocalBlobStore {
	pub fn new(root: PathBuf) -> Self {
		LocalBlobStore { root }
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.root.join(key)
	}
}

#[async_trait]
impl BlobStore for LocalBlobStore {
	async fn put(&self, temp_path: &Path, key: &str) -> Result<(), BlobError> {
		let dest = self.path_for(key);
		if let Some(parent) = dest.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		match tokio::fs::rename(temp_path, &dest).await {
			Ok(()) => Ok(()),
			Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
				// Cross-filesystem rename: copy into a temp path on the
				// target filesystem, then rename locally, then unlink
				// the source. The rename step keeps the final publish
				// atomic from a reader's perspective.
				let tmp_dest = dest.with_extension("tmp-move");
				tokio::fs::copy(temp_path, &tmp_dest).await?;
				tokio::fs::rename(&tmp_dest, &dest).await?;
				tokio::fs::remove_file(temp_path).await?;
				Ok(())
			}
			Err(e) => Err(BlobError::Io(e)),
		}
	}

	async fn open(&self, key: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>, BlobError> {
		let path = self.path_for(key);
		match tokio::fs::File::open(&path).await {
			Ok(f) => Ok(Box::new(f)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(BlobError::NotFound { key: key.to_string() })
			}
			Err(e) => Err(BlobError::Io(e)),
		}
	}

	async fn remove(&self, key: &str) -> Result<(), BlobError> {
		let path = self.path_for(key);
		match tokio::fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(BlobError::Io(e)),
		}
	}
}


// vim: ts=4
