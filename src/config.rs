#![allow(dead_code)]

//! Server configuration.
//!
//! A single `ServerConfig` struct, parsed from CLI flags by `main.rs`.
//! File/env layering is out of scope (spec.md §1: "configuration file
//! parsing" is an external collaborator) — this struct is the shape a
//! loader would populate, not the loader itself.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default chunk size for uploads/downloads, per spec.md §4.6.
pub const DEFAULT_CHUNK_SIZE: u64 = 512 * 1024;

/// Default upload-session idle timeout, per spec.md §4.6.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Default download-stream timeout, per spec.md §4.6.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default bounded outbound queue capacity per client, per spec.md §9.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default `DiffMergePaths` entry TTL, per spec.md §5 ("e.g., 24h").
pub const DEFAULT_DIFF_MERGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
	/// Address the session listener binds to.
	pub bind_addr: String,

	/// Root directory for the repository's persisted state and the
	/// default local-filesystem blob store.
	pub data_dir: PathBuf,

	/// Default chunk size handed out in `FileUpload`/`FileSyncChunkDownload`
	/// replies. Parsed from `<n>{B|KB|MB}` at the CLI layer.
	pub chunk_size: u64,

	/// Upper bound accepted for a client-requested chunk size, if that
	/// ever becomes negotiable; currently informational.
	pub max_chunk_size: u64,

	/// Idle timeout before an upload session is cleaned up.
	#[serde(with = "duration_secs")]
	pub upload_timeout: Duration,

	/// Timeout bounding a full chunk-download transfer.
	#[serde(with = "duration_secs")]
	pub download_timeout: Duration,

	/// Bounded outbound frame queue capacity per connected client.
	pub queue_capacity: usize,

	/// TTL for unswept `DiffMergePaths` entries.
	#[serde(with = "duration_secs")]
	pub diff_merge_ttl: Duration,

	/// Log level passed to the tracing `EnvFilter`.
	pub log_level: String,
}

impl Default for ServerConfig {
	fn default() -> Self {
		ServerConfig {
			bind_addr: "0.0.0.0:7420".to_string(),
			data_dir: PathBuf::from("./data"),
			chunk_size: DEFAULT_CHUNK_SIZE,
			max_chunk_size: 8 * 1024 * 1024,
			upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
			download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
			queue_capacity: DEFAULT_QUEUE_CAPACITY,
			diff_merge_ttl: DEFAULT_DIFF_MERGE_TTL,
			log_level: "info".to_string(),
		}
	}
}

impl ServerConfig {
	/// Validates cross-field constraints not expressible in the type
	/// alone. Mirrors the teacher's `ChunkConfig::validate` pattern.
	pub fn validate(&self) -> Result<(), String> {
		if self.chunk_size == 0 {
			return Err("chunkSize must be non-zero".to_string());
		}
		if self.chunk_size > self.max_chunk_size {
			return Err(format!(
				"chunkSize ({}) exceeds maxChunkSize ({})",
				self.chunk_size, self.max_chunk_size
			));
		}
		if self.queue_capacity == 0 {
			return Err("queueCapacity must be non-zero".to_string());
		}
		if self.bind_addr.is_empty() {
			return Err("bindAddr must not be empty".to_string());
		}
		Ok(())
	}

	/// Parses a chunk size expressed as `<n>{B|KB|MB}`, per spec.md §4.6.
	pub fn parse_size(raw: &str) -> Result<u64, String> {
		let raw = raw.trim();
		let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
			Some(idx) => raw.split_at(idx),
			None => (raw, ""),
		};
		let n: u64 = digits.parse().map_err(|_| format!("invalid size: {}", raw))?;
		let multiplier = match unit.to_ascii_uppercase().as_str() {
			"" | "B" => 1,
			"KB" => 1024,
			"MB" => 1024 * 1024,
			other => return Err(format!("unknown size unit: {}", other)),
		};
		Ok(n * multiplier)
	}
}

mod duration_secs {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let secs = u64::deserialize(d)?;
		Ok(Duration::from_secs(secs))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		assert!(ServerConfig::default().validate().is_ok());
	}

	#[test]
	fn rejects_zero_chunk_size() {
		let mut c = ServerConfig::default();
		c.chunk_size = 0;
		assert!(c.validate().is_err());
	}

	#[test]
	fn rejects_chunk_size_over_max() {
		let mut c = ServerConfig::default();
		c.chunk_size = c.max_chunk_size + 1;
		assert!(c.validate().is_err());
	}

	#[test]
	fn parses_plain_bytes() {
		assert_eq!(ServerConfig::parse_size("1024").unwrap(), 1024);
		assert_eq!(ServerConfig::parse_size("1024B").unwrap(), 1024);
	}

	#[test]
	fn parses_kb_and_mb() {
		assert_eq!(ServerConfig::parse_size("512KB").unwrap(), 512 * 1024);
		assert_eq!(ServerConfig::parse_size("2MB").unwrap(), 2 * 1024 * 1024);
	}

	#[test]
	fn rejects_unknown_unit() {
		assert!(ServerConfig::parse_size("5GB").is_err());
	}

	#[test]
	fn serde_roundtrips() {
		let c = ServerConfig::default();
		let json = serde_json::to_string(&c).unwrap();
		let back: ServerConfig = serde_json::from_str(&json).unwrap();
		assert_eq!(back.bind_addr, c.bind_addr);
		assert_eq!(back.chunk_size, c.chunk_size);
	}
}

// vim: ts=4
