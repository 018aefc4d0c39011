//! Three-way text merge, per spec.md §4.4.
//!
//! Diffs `base -> pc1` and `base -> pc2` independently, then reconciles
//! the two sets of touched line ranges. Overlapping ranges with differing
//! replacement text are conflicts; everything else merges automatically.

use std::error::Error;
use std::fmt;
use std::ops::Range;

use crate::diff::{diff_hunks, join_lines, split_lines, Hunk};

#[derive(Debug)]
pub enum MergeError {
	/// Either input text contains content that cannot be merged as lines
	/// (reserved for future binary-aware handling; currently unused).
	NotMergeable { reason: String },
}

impl fmt::Display for MergeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MergeError::NotMergeable { reason } => write!(f, "not mergeable: {}", reason),
		}
	}
}

impl Error for MergeError {}

/// Result of a three-way merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
	pub content: String,
	pub has_conflict: bool,
	pub conflict_info: Option<String>,
}

/// Merge `pc1` and `pc2` against their common ancestor `base`.
///
/// `pc1_first` breaks ties when two edits touch the same boundary without
/// truly conflicting (e.g. an insertion immediately before another side's
/// replaced range); it also orders the fallback on conflict.
pub fn three_way_merge(base: &str, pc1: &str, pc2: &str, pc1_first: bool) -> Result<MergeOutcome, MergeError> {
	if pc1 == pc2 {
		return Ok(MergeOutcome { content: pc1.to_string(), has_conflict: false, conflict_info: None });
	}
	if pc1 == base {
		return Ok(MergeOutcome { content: pc2.to_string(), has_conflict: false, conflict_info: None });
	}
	if pc2 == base {
		return Ok(MergeOutcome { content: pc1.to_string(), has_conflict: false, conflict_info: None });
	}

	let base_lines = split_lines(base);
	let pc1_lines = split_lines(pc1);
	let pc2_lines = split_lines(pc2);

	let hunks1 = diff_hunks(&base_lines, &pc1_lines);
	let hunks2 = diff_hunks(&base_lines, &pc2_lines);

	// Hunks identical on both sides are the same edit made twice, not a
	// conflict — keep one copy and drop them from further comparison.
	let mut shared: Vec<Hunk> = Vec::new();
	let mut remaining1: Vec<Hunk> = Vec::new();
	let mut remaining2 = hunks2.clone();

	for h1 in hunks1 {
		if let Some(pos) = remaining2.iter().position(|h2| *h2 == h1) {
			remaining2.remove(pos);
			shared.push(h1);
		} else {
			remaining1.push(h1);
		}
	}

	let mut conflicts = Vec::new();
	let mut taken2 = vec![false; remaining2.len()];
	for h1 in &remaining1 {
		for (i, h2) in remaining2.iter().enumerate() {
			if ranges_conflict(&h1.base_range, &h2.base_range) {
				conflicts.push((h1.clone(), h2.clone()));
				taken2[i] = true;
			}
		}
	}

	if !conflicts.is_empty() {
		let info = conflicts
			.iter()
			.map(|(h1, h2)| format!("lines {:?} vs {:?}", h1.base_range, h2.base_range))
			.collect::<Vec<_>>()
			.join("; ");
		let fallback = if pc1_first { pc1.to_string() } else { pc2.to_string() };
		return Ok(MergeOutcome { content: fallback, has_conflict: true, conflict_info: Some(info) });
	}

	let mut all: Vec<Hunk> = Vec::new();
	all.extend(shared);
	all.extend(remaining1);
	all.extend(remaining2);
	all.sort_by(|a, b| {
		a.base_range
			.start
			.cmp(&b.base_range.start)
			.then_with(|| a.base_range.end.cmp(&b.base_range.end))
	});

	let merged = apply_hunks(&base_lines, &all);
	Ok(MergeOutcome { content: join_lines(&merged), has_conflict: false, conflict_info: None })
}

/// Two ranges over base lines conflict if they overlap. An empty range
/// (pure insertion at a point) conflicts with a non-empty range only when
/// the insertion point falls strictly inside it; two insertions at the
/// exact same point were already deduplicated above if identical, so any
/// remaining pair at the same point is a genuine conflict.
fn ranges_conflict(a: &Range<usize>, b: &Range<usize>) -> bool {
	if a.is_empty() && b.is_empty() {
		return a.start == b.start;
	}
	if a.is_empty() {
		return a.start > b.start && a.start < b.end;
	}
	if b.is_empty() {
		return b.start > a.start && b.start < a.end;
	}
	a.start < b.end && b.start < a.end
}

/// Apply a sorted, non-conflicting list of hunks to `base_lines`.
fn apply_hunks(base_lines: &[String], hunks: &[Hunk]) -> Vec<String> {
	let mut out = Vec::new();
	let mut cursor = 0usize;

	for hunk in hunks {
		if hunk.base_range.start > cursor {
			out.extend_from_slice(&base_lines[cursor..hunk.base_range.start]);
		}
		out.extend(hunk.new_lines.iter().cloned());
		cursor = cursor.max(hunk.base_range.end);
	}
	if cursor < base_lines.len() {
		out.extend_from_slice(&base_lines[cursor..]);
	}
	out
}

/// Conservative conflict fallback: keeps the union of both sides' text,
/// preserving data at the cost of possible duplication, and reports no
/// conflict. Used by the sync coordinator when a client requests
/// `MergeTextsIgnoreConflictIgnoreDelete` instead of surfacing the raw
/// conflict to the user.
pub fn merge_ignore_conflict_ignore_delete(pc1: &str, pc2: &str, pc1_first: bool) -> String {
	if pc1 == pc2 {
		return pc1.to_string();
	}
	if pc1_first {
		format!("{}\n{}", pc1, pc2)
	} else {
		format!("{}\n{}", pc2, pc1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_sides_return_that_text_no_conflict() {
		let out = three_way_merge("A\nB\nC", "A\nB2\nC", "A\nB2\nC", true).unwrap();
		assert!(!out.has_conflict);
		assert_eq!(out.content, "A\nB2\nC");
	}

	#[test]
	fn one_side_unchanged_returns_other_side() {
		let base = "A\nB\nC";
		let out = three_way_merge(base, base, "A\nB2\nC", true).unwrap();
		assert!(!out.has_conflict);
		assert_eq!(out.content, "A\nB2\nC");
	}

	#[test]
	fn disjoint_edits_merge_cleanly() {
		let base = "A\nB\nC\nD";
		let pc1 = "A2\nB\nC\nD";
		let pc2 = "A\nB\nC\nD2";
		let out = three_way_merge(base, pc1, pc2, true).unwrap();
		assert!(!out.has_conflict);
		assert_eq!(out.content, "A2\nB\nC\nD2");
	}

	#[test]
	fn overlapping_edits_conflict() {
		let base = "A\nB\nC";
		let pc1 = "A\nB1\nC";
		let pc2 = "A\nB2\nC";
		let out = three_way_merge(base, pc1, pc2, true).unwrap();
		assert!(out.has_conflict);
		assert_eq!(out.content, pc1);
	}

	#[test]
	fn overlapping_edits_conflict_fallback_respects_pc1_first() {
		let base = "A\nB\nC";
		let pc1 = "A\nB1\nC";
		let pc2 = "A\nB2\nC";
		let out = three_way_merge(base, pc1, pc2, false).unwrap();
		assert!(out.has_conflict);
		assert_eq!(out.content, pc2);
	}

	#[test]
	fn same_span_deleted_both_sides_removed_once() {
		let base = "A\nB\nC";
		let pc1 = "A\nC";
		let pc2 = "A\nC";
		let out = three_way_merge(base, pc1, pc2, true).unwrap();
		assert!(!out.has_conflict);
		assert_eq!(out.content, "A\nC");
	}

	#[test]
	fn delete_vs_modify_same_span_conflicts() {
		let base = "A\nB\nC";
		let pc1 = "A\nC";
		let pc2 = "A\nB2\nC";
		let out = three_way_merge(base, pc1, pc2, true).unwrap();
		assert!(out.has_conflict);
	}

	#[test]
	fn force_merge_preserves_both_sides_text() {
		let merged = merge_ignore_conflict_ignore_delete("A\nB1\nC", "A\nB2\nC", true);
		assert!(merged.contains("B1"));
		assert!(merged.contains("B2"));
		assert!(!merged.is_empty());
	}

	#[test]
	fn force_merge_identical_sides_deduplicates() {
		let merged = merge_ignore_conflict_ignore_delete("same", "same", true);
		assert_eq!(merged, "same");
	}
}

// vim: ts=4
