//! Persisted data model, per spec.md §3.
//!
//! `ResourceEnvelope` carries the fields shared by notes, files, folders,
//! and settings; each resource kind embeds one (flattened on the wire)
//! and adds its own fields.

use serde::{Deserialize, Serialize};

/// What a resource envelope currently represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
	Create,
	Modify,
	Delete,
}

impl Action {
	pub fn is_tombstone(self) -> bool {
		matches!(self, Action::Delete)
	}
}

/// One vault: a user-scoped root namespace. Unique per `(owner, name)`
/// among non-deleted vaults; created lazily on first sync that touches
/// an unknown name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
	pub id: String,
	pub owner: String,
	pub name: String,
	pub note_count: i64,
	pub note_size: i64,
	pub file_count: i64,
	pub file_size: i64,
	pub is_deleted: bool,
	pub created_at: i64,
	pub updated_at: i64,
}

impl Vault {
	pub fn new(id: String, owner: String, name: String, now_ms: i64) -> Self {
		Vault {
			id,
			owner,
			name,
			note_count: 0,
			note_size: 0,
			file_count: 0,
			file_size: 0,
			is_deleted: false,
			created_at: now_ms,
			updated_at: now_ms,
		}
	}
}

/// Fields shared by every resource kind (note, file, folder, setting).
///
/// `pathHash` is the primary lookup key within `(vaultId, owner)`.
/// `updatedTimestamp` is the server-assigned monotonic sync cursor;
/// repositories must guarantee it never decreases for a given resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEnvelope {
	pub id: String,
	pub vault_id: String,
	pub action: Action,
	pub path: String,
	pub path_hash: String,
	pub ctime: i64,
	pub mtime: i64,
	pub updated_timestamp: i64,
	pub created_at: i64,
	pub updated_at: i64,
}

/// A markdown note.
///
/// `content_last_snapshot`/`content_last_snapshot_hash` record the most
/// recent history base used by the merge engine, so a later merge can
/// find its ancestor without rescanning `NoteHistory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
	#[serde(flatten)]
	pub envelope: ResourceEnvelope,
	pub fid: String,
	pub content: String,
	pub content_hash: String,
	pub content_last_snapshot: Option<String>,
	pub content_last_snapshot_hash: Option<String>,
	pub version: i64,
	pub client_name: String,
	pub size: i64,
}

/// A binary attachment. `save_path` is an opaque blob-store key, not a
/// filesystem path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
	#[serde(flatten)]
	pub envelope: ResourceEnvelope,
	pub fid: String,
	pub content_hash: String,
	pub save_path: String,
	pub size: i64,
}

/// A folder; hierarchy is implied by `path`, `level` is its depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
	#[serde(flatten)]
	pub envelope: ResourceEnvelope,
	pub fid: String,
	pub level: i32,
}

/// A vault-scoped key-value setting item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
	#[serde(flatten)]
	pub envelope: ResourceEnvelope,
	pub content: String,
	pub content_hash: String,
	pub size: i64,
}

/// An append-only merge-base snapshot for a note. Retired by an external
/// retention sweeper; the core only ever appends and reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteHistory {
	pub id: String,
	pub note_id: String,
	pub vault_id: String,
	pub path: String,
	pub diff_patch: String,
	pub content: String,
	pub content_hash: String,
	pub client_name: String,
	pub version: i64,
	pub created_at: i64,
}

/// The disjoint resource kinds a `pathHash` lookup can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
	Note,
	File,
	Folder,
	Setting,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn action_is_tombstone() {
		assert!(Action::Delete.is_tombstone());
		assert!(!Action::Create.is_tombstone());
		assert!(!Action::Modify.is_tombstone());
	}

	#[test]
	fn vault_new_has_zeroed_counters() {
		let v = Vault::new("v1".into(), "u1".into(), "default".into(), 1000);
		assert_eq!(v.note_count, 0);
		assert_eq!(v.file_count, 0);
		assert!(!v.is_deleted);
		assert_eq!(v.created_at, v.updated_at);
	}

	#[test]
	fn note_envelope_flattens_on_the_wire() {
		let note = Note {
			envelope: ResourceEnvelope {
				id: "n1".into(),
				vault_id: "v1".into(),
				action: Action::Create,
				path: "a.md".into(),
				path_hash: "h".into(),
				ctime: 1,
				mtime: 1,
				updated_timestamp: 1,
				created_at: 1,
				updated_at: 1,
			},
			fid: "f1".into(),
			content: "hello".into(),
			content_hash: "ch".into(),
			content_last_snapshot: None,
			content_last_snapshot_hash: None,
			version: 1,
			client_name: "desktop".into(),
			size: 5,
		};
		let json = serde_json::to_value(&note).unwrap();
		assert_eq!(json["path"], "a.md");
		assert_eq!(json["content"], "hello");
		assert_eq!(json["contentHash"], "ch");
		assert_eq!(json["vaultId"], "v1");
		assert_eq!(json["pathHash"], "h");
		assert_eq!(json["updatedTimestamp"], 1);
		assert!(json.get("content_hash").is_none());
	}
}

// vim: ts=4
