//! Path normalization, safe-join, and extension classification.
//!
//! Spec.md §4.3: "Path normalisation is NFC-unicode with `/`-separator,
//! leading `/` stripped." These helpers are pure and infallible except
//! for `safe_join`, which rejects paths that would escape a root.

use unicode_normalization::UnicodeNormalization;

/// Classification of a file by extension, used to decide whether a
/// blob should be treated as a text note body or an opaque attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionClass {
	/// Markdown note body.
	Markdown,
	/// Plain text.
	Text,
	/// Anything else — treated as a binary attachment.
	Binary,
}

/// Normalize a client-supplied path: NFC-normalize, convert backslashes
/// to forward slashes, strip a leading slash, and collapse any `..` or
/// empty segments. This is intentionally liberal on input and strict on
/// output so two clients with differently-encoded but semantically
/// equal paths converge on the same `pathHash`.
pub fn normalize_path(raw: &str) -> String {
	let nfc: String = raw.nfc().collect();
	let slashed = nfc.replace('\\', "/");
	let trimmed = slashed.trim_start_matches('/');

	let mut segments: Vec<&str> = Vec::new();
	for seg in trimmed.split('/') {
		match seg {
			"" | "." => continue,
			".." => {
				segments.pop();
			}
			_ => segments.push(seg),
		}
	}
	segments.join("/")
}

/// Classify a path by its extension.
pub fn classify_extension(path: &str) -> ExtensionClass {
	let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
	match ext.as_str() {
		"md" | "markdown" => ExtensionClass::Markdown,
		"txt" => ExtensionClass::Text,
		_ => ExtensionClass::Binary,
	}
}

/// Join `root` and a normalized relative `path`, rejecting any result
/// that would escape `root`. Used when the blob store's default
/// implementation maps opaque keys onto the local filesystem.
pub fn safe_join(root: &std::path::Path, rel: &str) -> Option<std::path::PathBuf> {
	let normalized = normalize_path(rel);
	if normalized.is_empty() {
		return None;
	}
	let candidate = root.join(&normalized);
	// normalize_path already strips `..` segments, so no canonicalization
	// round-trip against the filesystem is required to detect escape —
	// but guard against absolute components sneaking back in via `segments`.
	if normalized.split('/').any(|s| s == ".." || s.is_empty()) {
		return None;
	}
	Some(candidate)
}


// vim: ts=4
