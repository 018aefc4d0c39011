//! Per-connection client state, per spec.md §4.1.
//!
//! A `Client` is one active bidirectional session: identity, declared
//! capabilities, and the `DiffMergePaths` hint set that routes a note's
//! next modify through the merge engine instead of a plain override.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::codec::Frame;

/// Opaque per-session identifier, attached to log lines so a
/// deployment can correlate a trace across coordinator calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(pub String);

impl TraceId {
	pub fn new() -> Self {
		TraceId(Uuid::new_v4().to_string())
	}
}

impl Default for TraceId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for TraceId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Per-session policy selecting between last-writer-wins (empty),
/// new-time-merge, or time-ignoring three-way merge, per the glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineSyncStrategy {
	None,
	NewTimeMerge,
	IgnoreTimeMerge,
}

impl OfflineSyncStrategy {
	pub fn from_wire(s: &str) -> Self {
		match s {
			"newTimeMerge" => OfflineSyncStrategy::NewTimeMerge,
			"ignoreTimeMerge" => OfflineSyncStrategy::IgnoreTimeMerge,
			_ => OfflineSyncStrategy::None,
		}
	}

	pub fn requires_merge_gating(self) -> bool {
		!matches!(self, OfflineSyncStrategy::None)
	}
}

/// Per-client set of note paths whose next modify must be handled as a
/// merge, not a plain override, per the glossary. Entries older than
/// `ttl` are swept lazily on access (spec.md §5, §9 Open Question 4).
pub struct DiffMergePaths {
	entries: Mutex<HashMap<String, Instant>>,
	ttl: Duration,
}

impl DiffMergePaths {
	pub fn new(ttl: Duration) -> Self {
		DiffMergePaths { entries: Mutex::new(HashMap::new()), ttl }
	}

	fn sweep(&self, map: &mut HashMap<String, Instant>) {
		let ttl = self.ttl;
		map.retain(|_, inserted| inserted.elapsed() < ttl);
	}

	/// Marks `path` as requiring merge handling on its next modify.
	pub fn mark(&self, path: &str) {
		let mut map = self.entries.lock().unwrap();
		self.sweep(&mut map);
		map.insert(path.to_string(), Instant::now());
	}

	/// Removes and returns whether `path` was marked, per
	/// `NoteModify`'s "remove the entry" step in spec.md §4.5.2.
	pub fn take(&self, path: &str) -> bool {
		let mut map = self.entries.lock().unwrap();
		self.sweep(&mut map);
		map.remove(path).is_some()
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.entries.lock().unwrap().len()
	}
}

/// One active bidirectional session.
pub struct Client {
	pub id: Uuid,
	pub owner: String,
	pub trace_id: TraceId,
	pub client_name: String,
	pub client_version: String,
	pub offline_sync_strategy: OfflineSyncStrategy,
	pub diff_merge_paths: DiffMergePaths,
	/// The vault this session last scoped a sync to; broadcasts are
	/// delivered to clients whose most recent scope matches.
	pub current_vault: Mutex<Option<String>>,
	pub outbound: mpsc::Sender<Frame>,
	/// Span carrying `trace_id` as a field; every log line emitted while
	/// handling this session's frames should run inside it (via
	/// `Instrument::instrument` on the connection future, or
	/// `.in_scope()` around a synchronous block) so the lines correlate.
	pub span: tracing::Span,
}

impl Client {
	pub fn new(
		owner: String,
		client_name: String,
		client_version: String,
		offline_sync_strategy: OfflineSyncStrategy,
		diff_merge_ttl: Duration,
		outbound: mpsc::Sender<Frame>,
	) -> Self {
		let trace_id = TraceId::new();
		let span = tracing::info_span!("session", trace_id = %trace_id);
		Client {
			id: Uuid::new_v4(),
			owner,
			trace_id,
			client_name,
			client_version,
			offline_sync_strategy,
			diff_merge_paths: DiffMergePaths::new(diff_merge_ttl),
			current_vault: Mutex::new(None),
			outbound,
			span,
		}
	}

	pub fn set_current_vault(&self, vault: &str) {
		*self.current_vault.lock().unwrap() = Some(vault.to_string());
	}

	pub fn scoped_to(&self, vault: &str) -> bool {
		self.current_vault.lock().unwrap().as_deref() == Some(vault)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread::sleep;

	#[test]
	fn offline_sync_strategy_parses_known_values() {
		assert_eq!(OfflineSyncStrategy::from_wire("newTimeMerge"), OfflineSyncStrategy::NewTimeMerge);
		assert_eq!(OfflineSyncStrategy::from_wire("ignoreTimeMerge"), OfflineSyncStrategy::IgnoreTimeMerge);
		assert_eq!(OfflineSyncStrategy::from_wire(""), OfflineSyncStrategy::None);
		assert_eq!(OfflineSyncStrategy::from_wire("bogus"), OfflineSyncStrategy::None);
	}

	#[test]
	fn diff_merge_paths_mark_and_take() {
		let dmp = DiffMergePaths::new(Duration::from_secs(60));
		assert!(!dmp.take("a.md"));
		dmp.mark("a.md");
		assert!(dmp.take("a.md"));
		assert!(!dmp.take("a.md"));
	}

	#[test]
	fn diff_merge_paths_sweeps_expired_entries() {
		let dmp = DiffMergePaths::new(Duration::from_millis(10));
		dmp.mark("a.md");
		sleep(Duration::from_millis(30));
		assert!(!dmp.take("a.md"));
		assert_eq!(dmp.len(), 0);
	}
}

// vim: ts=4
