//! Line-level diffing between a base text and a modified text.
//!
//! Computes, for `base -> other`, the set of half-open line ranges over
//! `base` that were touched (deleted or replaced) plus the replacement
//! text, per spec.md §4.4 step 1–2. Built on `similar`'s Myers diff,
//! which is the standard choice for this in the Rust ecosystem.

use similar::{capture_diff_slices, Algorithm};
use std::ops::Range;

/// A touched range of `base` lines and what replaces it.
///
/// `base_range` is half-open over base line indices. An empty range
/// (`start == end`) represents a pure insertion at that position with
/// no deletion. `new_lines` is empty for a pure deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
	pub base_range: Range<usize>,
	pub new_lines: Vec<String>,
}

/// Split text into lines without the trailing newline, the
/// representation `similar::TextDiff::from_slices` expects.
pub fn split_lines(text: &str) -> Vec<String> {
	if text.is_empty() {
		return Vec::new();
	}
	text.split('\n').map(|s| s.to_string()).collect()
}

/// Join lines back into text with `\n` separators.
pub fn join_lines(lines: &[String]) -> String {
	lines.join("\n")
}

/// Diff `base_lines -> other_lines`, returning the non-equal hunks.
pub fn diff_hunks(base_lines: &[String], other_lines: &[String]) -> Vec<Hunk> {
	let ops = capture_diff_slices(Algorithm::Myers, base_lines, other_lines);
	let mut hunks = Vec::new();

	for op in ops {
		use similar::DiffOp::*;
		match op {
			Equal { .. } => {}
			Delete { old_index, old_len, .. } => {
				hunks.push(Hunk { base_range: old_index..(old_index + old_len), new_lines: vec![] });
			}
			Insert { old_index, new_index, new_len } => {
				hunks.push(Hunk {
					base_range: old_index..old_index,
					new_lines: other_lines[new_index..new_index + new_len].to_vec(),
				});
			}
			Replace { old_index, old_len, new_index, new_len } => {
				hunks.push(Hunk {
					base_range: old_index..(old_index + old_len),
					new_lines: other_lines[new_index..new_index + new_len].to_vec(),
				});
			}
		}
	}

	hunks
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn no_changes_yields_no_hunks() {
		let base = split_lines("A\nB\nC");
		let hunks = diff_hunks(&base, &base.clone());
		assert!(hunks.is_empty());
	}

	#[test]
	fn single_line_replace() {
		let base = split_lines("A\nB\nC");
		let other = split_lines("A\nB2\nC");
		let hunks = diff_hunks(&base, &other);
		assert_eq!(hunks.len(), 1);
		assert_eq!(hunks[0].base_range, 1..2);
		assert_eq!(hunks[0].new_lines, vec!["B2".to_string()]);
	}

	#[test]
	fn pure_insertion() {
		let base = split_lines("A\nC");
		let other = split_lines("A\nB\nC");
		let hunks = diff_hunks(&base, &other);
		assert_eq!(hunks.len(), 1);
		assert!(hunks[0].base_range.is_empty());
		assert_eq!(hunks[0].new_lines, vec!["B".to_string()]);
	}

	#[test]
	fn pure_deletion() {
		let base = split_lines("A\nB\nC");
		let other = split_lines("A\nC");
		let hunks = diff_hunks(&base, &other);
		assert_eq!(hunks.len(), 1);
		assert_eq!(hunks[0].base_range, 1..2);
		assert!(hunks[0].new_lines.is_empty());
	}

	#[test]
	fn join_roundtrips_split() {
		let text = "A\nB\nC";
		assert_eq!(join_lines(&split_lines(text)), text);
	}
}

// vim: ts=4
