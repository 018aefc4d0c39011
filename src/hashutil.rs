//! Content fingerprints used for change detection.
//!
//! Both `pathHash` and `contentHash` are 32-char lowercase hex digests
//! (spec.md §4.3: "a stable 32-char hex digest"). BLAKE3 is already the
//! teacher's hashing primitive (see `util::hash`); here the digest is
//! truncated to 128 bits and hex-encoded instead of base64-encoded, since
//! the wire format calls for hex.

/// Hash raw bytes to a 32-char lowercase hex digest.
pub fn content_hash(buf: &[u8]) -> String {
	let full = blake3::hash(buf);
	hex::encode(&full.as_bytes()[..16])
}

/// Hash a normalized path to a 32-char lowercase hex digest.
///
/// `path` must already be NFC-normalized with a `/` separator and no
/// leading slash; see `pathutil::normalize_path`.
pub fn path_hash(path: &str) -> String {
	content_hash(path.as_bytes())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn content_hash_is_32_hex_chars() {
		let h = content_hash(b"hello world");
		assert_eq!(h.len(), 32);
		assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn content_hash_deterministic() {
		assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
	}

	#[test]
	fn content_hash_sensitive_to_input() {
		assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
	}

	#[test]
	fn content_hash_empty() {
		let h = content_hash(b"");
		assert_eq!(h.len(), 32);
	}

	#[test]
	fn path_hash_differs_by_path() {
		assert_ne!(path_hash("a.md"), path_hash("b.md"));
	}

	#[test]
	fn path_hash_stable() {
		assert_eq!(path_hash("notes/a.md"), path_hash("notes/a.md"));
	}
}

// vim: ts=4
