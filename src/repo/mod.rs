//! Resource repositories: persisted CRUD over vaults and the four
//! resource kinds plus note history, per spec.md §3 and §4.3.
//!
//! Backed by `redb` with `bincode`-serialized values, the same pattern
//! the cache module already used for a simpler single-table case. The
//! relational dialect spec.md treats as an external collaborator; this
//! is the concrete, working stand-in the core needs to function, with
//! one table per resource kind as spec.md §6 calls for.

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::model::{Action, File, Folder, Note, NoteHistory, ResourceEnvelope, Setting, Vault};

const VAULTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vaults");
const VAULT_NAME_INDEX: TableDefinition<&str, &str> = TableDefinition::new("vault_name_index");
const NOTES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("notes");
const FILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const FOLDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("folders");
const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");
const NOTE_HISTORY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("note_history");

#[derive(Debug)]
pub enum RepoError {
	VaultNotFound { vault_id: String },
	NameCollision { owner: String, name: String },
	Backend(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for RepoError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RepoError::VaultNotFound { vault_id } => write!(f, "vault not found: {}", vault_id),
			RepoError::NameCollision { owner, name } => {
				write!(f, "vault name collision: {}/{}", owner, name)
			}
			RepoError::Backend(e) => write!(f, "repository backend error: {}", e),
		}
	}
}

impl Error for RepoError {}

fn backend<E: Error + Send + Sync + 'static>(e: E) -> RepoError {
	RepoError::Backend(Box::new(e))
}

/// Net change to a vault's resource counters, applied in the same
/// transaction as the resource write that caused it.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaultDelta {
	pub note_count: i64,
	pub note_size: i64,
	pub file_count: i64,
	pub file_size: i64,
}

pub fn now_ms() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

fn resource_key(owner: &str, vault_id: &str, path_hash: &str) -> String {
	format!("{}\u{0}{}\u{0}{}", owner, vault_id, path_hash)
}

fn vault_name_key(owner: &str, name: &str) -> String {
	format!("{}\u{0}{}", owner, name)
}

/// The redb-backed repository implementing the persistence layer for
/// all resource kinds.
pub struct Repo {
	db: redb::Database,
}

impl Repo {
	pub fn open(path: &Path) -> Result<Self, RepoError> {
		let db = redb::Database::create(path).map_err(backend)?;
		{
			let txn = db.begin_write().map_err(backend)?;
			txn.open_table(VAULTS_TABLE).map_err(backend)?;
			txn.open_table(VAULT_NAME_INDEX).map_err(backend)?;
			txn.open_table(NOTES_TABLE).map_err(backend)?;
			txn.open_table(FILES_TABLE).map_err(backend)?;
			txn.open_table(FOLDERS_TABLE).map_err(backend)?;
			txn.open_table(SETTINGS_TABLE).map_err(backend)?;
			txn.open_table(NOTE_HISTORY_TABLE).map_err(backend)?;
			txn.commit().map_err(backend)?;
		}
		Ok(Repo { db })
	}

	// -- vaults --------------------------------------------------------

	pub fn get_vault(&self, vault_id: &str) -> Result<Option<Vault>, RepoError> {
		let txn = self.db.begin_read().map_err(backend)?;
		let table = txn.open_table(VAULTS_TABLE).map_err(backend)?;
		match table.get(vault_id).map_err(backend)? {
			Some(bytes) => {
				let v: Vault = bincode::deserialize(bytes.value()).map_err(backend)?;
				Ok(Some(v))
			}
			None => Ok(None),
		}
	}

	/// Looks up a vault by `(owner, name)`, creating it lazily if it
	/// does not yet exist, per spec.md §3: "Created lazily on first sync
	/// touching an unknown name."
	pub fn find_or_create_vault(&self, owner: &str, name: &str) -> Result<Vault, RepoError> {
		let name_key = vault_name_key(owner, name);

		{
			let txn = self.db.begin_read().map_err(backend)?;
			let index = txn.open_table(VAULT_NAME_INDEX).map_err(backend)?;
			if let Some(id) = index.get(name_key.as_str()).map_err(backend)? {
				let vault_id = id.value().to_string();
				drop(index);
				drop(txn);
				if let Some(v) = self.get_vault(&vault_id)? {
					return Ok(v);
				}
			}
		}

		let vault = Vault::new(Uuid::new_v4().to_string(), owner.to_string(), name.to_string(), now_ms());
		let txn = self.db.begin_write().map_err(backend)?;
		{
			let mut index = txn.open_table(VAULT_NAME_INDEX).map_err(backend)?;
			// Re-check under the write lock: another writer may have
			// created this vault between our read and this transaction.
			if let Some(id) = index.get(name_key.as_str()).map_err(backend)? {
				let vault_id = id.value().to_string();
				drop(index);
				txn.commit().map_err(backend)?;
				return self.get_vault(&vault_id)?.ok_or(RepoError::VaultNotFound { vault_id });
			}
			index.insert(name_key.as_str(), vault.id.as_str()).map_err(backend)?;
			let mut vaults = txn.open_table(VAULTS_TABLE).map_err(backend)?;
			let bytes = bincode::serialize(&vault).map_err(backend)?;
			vaults.insert(vault.id.as_str(), bytes.as_slice()).map_err(backend)?;
		}
		txn.commit().map_err(backend)?;
		Ok(vault)
	}

	fn apply_vault_delta(
		txn: &redb::WriteTransaction,
		vault_id: &str,
		delta: VaultDelta,
	) -> Result<(), RepoError> {
		let mut vaults = txn.open_table(VAULTS_TABLE).map_err(backend)?;
		let mut vault: Vault = match vaults.get(vault_id).map_err(backend)? {
			Some(bytes) => bincode::deserialize(bytes.value()).map_err(backend)?,
			None => return Err(RepoError::VaultNotFound { vault_id: vault_id.to_string() }),
		};
		vault.note_count += delta.note_count;
		vault.note_size += delta.note_size;
		vault.file_count += delta.file_count;
		vault.file_size += delta.file_size;
		vault.updated_at = now_ms();
		let bytes = bincode::serialize(&vault).map_err(backend)?;
		vaults.insert(vault_id, bytes.as_slice()).map_err(backend)?;
		Ok(())
	}

	// -- generic envelope helpers ---------------------------------------

	/// Computes the next `updatedTimestamp` for a resource given its
	/// previous value, guaranteeing the strictly-increasing sequence
	/// property tests rely on even when the server clock hasn't ticked.
	fn next_timestamp(previous: Option<i64>) -> i64 {
		let now = now_ms();
		match previous {
			Some(p) if p >= now => p + 1,
			_ => now,
		}
	}

	fn list_since<T, F>(
		table_bytes: Vec<(String, Vec<u8>)>,
		owner: &str,
		vault_id: &str,
		last_time: i64,
		envelope_of: F,
	) -> Result<Vec<T>, RepoError>
	where
		T: serde::de::DeserializeOwned,
		F: Fn(&T) -> &ResourceEnvelope,
	{
		let prefix = resource_key(owner, vault_id, "");
		let mut out: Vec<T> = Vec::new();
		for (key, bytes) in table_bytes {
			if !key.starts_with(&prefix) {
				continue;
			}
			let record: T = bincode::deserialize(&bytes).map_err(backend)?;
			if envelope_of(&record).updated_timestamp > last_time {
				out.push(record);
			}
		}
		out.sort_by_key(|r| envelope_of(r).updated_timestamp);
		Ok(out)
	}

	fn scan_table(&self, table_def: TableDefinition<&str, &[u8]>) -> Result<Vec<(String, Vec<u8>)>, RepoError> {
		let txn = self.db.begin_read().map_err(backend)?;
		let table = txn.open_table(table_def).map_err(backend)?;
		let mut out = Vec::new();
		for entry in table.iter().map_err(backend)? {
			let (k, v) = entry.map_err(backend)?;
			out.push((k.value().to_string(), v.value().to_vec()));
		}
		Ok(out)
	}

	// -- notes -----------------------------------------------------------

	pub fn get_note(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Note>, RepoError> {
		let key = resource_key(owner, vault_id, path_hash);
		let txn = self.db.begin_read().map_err(backend)?;
		let table = txn.open_table(NOTES_TABLE).map_err(backend)?;
		match table.get(key.as_str()).map_err(backend)? {
			Some(bytes) => Ok(Some(bincode::deserialize(bytes.value()).map_err(backend)?)),
			None => Ok(None),
		}
	}

	/// Writes `note` and applies `delta` to its vault's counters in one
	/// transaction, per the "transactional vault-counter updates" design
	/// note. Assigns a fresh monotonic `updatedTimestamp` and returns the
	/// stored record.
	pub fn put_note(&self, owner: &str, mut note: Note, delta: VaultDelta) -> Result<Note, RepoError> {
		let key = resource_key(owner, &note.envelope.vault_id, &note.envelope.path_hash);
		let txn = self.db.begin_write().map_err(backend)?;
		{
			let mut table = txn.open_table(NOTES_TABLE).map_err(backend)?;
			let previous = table
				.get(key.as_str())
				.map_err(backend)?
				.map(|b| bincode::deserialize::<Note>(b.value()).map(|n| n.envelope.updated_timestamp))
				.transpose()
				.map_err(backend)?;
			note.envelope.updated_timestamp = Self::next_timestamp(previous);
			let bytes = bincode::serialize(&note).map_err(backend)?;
			table.insert(key.as_str(), bytes.as_slice()).map_err(backend)?;
		}
		Self::apply_vault_delta(&txn, &note.envelope.vault_id, delta)?;
		txn.commit().map_err(backend)?;
		Ok(note)
	}

	/// Tombstones a note. Idempotent: returns an existing tombstone
	/// unchanged without reassigning `updatedTimestamp`.
	pub fn delete_note(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Note>, RepoError> {
		let mut note = match self.get_note(owner, vault_id, path_hash)? {
			Some(n) => n,
			None => return Ok(None),
		};
		if note.envelope.action == Action::Delete {
			return Ok(Some(note));
		}
		let delta = VaultDelta { note_count: -1, note_size: -note.size, ..Default::default() };
		note.envelope.action = Action::Delete;
		Ok(Some(self.put_note(owner, note, delta)?))
	}

	pub fn list_notes_since(&self, owner: &str, vault_id: &str, last_time: i64) -> Result<Vec<Note>, RepoError> {
		let rows = self.scan_table(NOTES_TABLE)?;
		Self::list_since(rows, owner, vault_id, last_time, |n: &Note| &n.envelope)
	}

	// -- files ------------------------------------------------------------

	pub fn get_file(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<File>, RepoError> {
		let key = resource_key(owner, vault_id, path_hash);
		let txn = self.db.begin_read().map_err(backend)?;
		let table = txn.open_table(FILES_TABLE).map_err(backend)?;
		match table.get(key.as_str()).map_err(backend)? {
			Some(bytes) => Ok(Some(bincode::deserialize(bytes.value()).map_err(backend)?)),
			None => Ok(None),
		}
	}

	pub fn put_file(&self, owner: &str, mut file: File, delta: VaultDelta) -> Result<File, RepoError> {
		let key = resource_key(owner, &file.envelope.vault_id, &file.envelope.path_hash);
		let txn = self.db.begin_write().map_err(backend)?;
		{
			let mut table = txn.open_table(FILES_TABLE).map_err(backend)?;
			let previous = table
				.get(key.as_str())
				.map_err(backend)?
				.map(|b| bincode::deserialize::<File>(b.value()).map(|f| f.envelope.updated_timestamp))
				.transpose()
				.map_err(backend)?;
			file.envelope.updated_timestamp = Self::next_timestamp(previous);
			let bytes = bincode::serialize(&file).map_err(backend)?;
			table.insert(key.as_str(), bytes.as_slice()).map_err(backend)?;
		}
		Self::apply_vault_delta(&txn, &file.envelope.vault_id, delta)?;
		txn.commit().map_err(backend)?;
		Ok(file)
	}

	pub fn delete_file(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<File>, RepoError> {
		let mut file = match self.get_file(owner, vault_id, path_hash)? {
			Some(f) => f,
			None => return Ok(None),
		};
		if file.envelope.action == Action::Delete {
			return Ok(Some(file));
		}
		let delta = VaultDelta { file_count: -1, file_size: -file.size, ..Default::default() };
		file.envelope.action = Action::Delete;
		Ok(Some(self.put_file(owner, file, delta)?))
	}

	pub fn list_files_since(&self, owner: &str, vault_id: &str, last_time: i64) -> Result<Vec<File>, RepoError> {
		let rows = self.scan_table(FILES_TABLE)?;
		Self::list_since(rows, owner, vault_id, last_time, |f: &File| &f.envelope)
	}

	// -- folders -----------------------------------------------------------

	pub fn get_folder(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Folder>, RepoError> {
		let key = resource_key(owner, vault_id, path_hash);
		let txn = self.db.begin_read().map_err(backend)?;
		let table = txn.open_table(FOLDERS_TABLE).map_err(backend)?;
		match table.get(key.as_str()).map_err(backend)? {
			Some(bytes) => Ok(Some(bincode::deserialize(bytes.value()).map_err(backend)?)),
			None => Ok(None),
		}
	}

	pub fn put_folder(&self, owner: &str, mut folder: Folder) -> Result<Folder, RepoError> {
		let key = resource_key(owner, &folder.envelope.vault_id, &folder.envelope.path_hash);
		let txn = self.db.begin_write().map_err(backend)?;
		{
			let mut table = txn.open_table(FOLDERS_TABLE).map_err(backend)?;
			let previous = table
				.get(key.as_str())
				.map_err(backend)?
				.map(|b| bincode::deserialize::<Folder>(b.value()).map(|f| f.envelope.updated_timestamp))
				.transpose()
				.map_err(backend)?;
			folder.envelope.updated_timestamp = Self::next_timestamp(previous);
			let bytes = bincode::serialize(&folder).map_err(backend)?;
			table.insert(key.as_str(), bytes.as_slice()).map_err(backend)?;
		}
		txn.commit().map_err(backend)?;
		Ok(folder)
	}

	pub fn delete_folder(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Folder>, RepoError> {
		let mut folder = match self.get_folder(owner, vault_id, path_hash)? {
			Some(f) => f,
			None => return Ok(None),
		};
		if folder.envelope.action == Action::Delete {
			return Ok(Some(folder));
		}
		folder.envelope.action = Action::Delete;
		Ok(Some(self.put_folder(owner, folder)?))
	}

	pub fn list_folders_since(&self, owner: &str, vault_id: &str, last_time: i64) -> Result<Vec<Folder>, RepoError> {
		let rows = self.scan_table(FOLDERS_TABLE)?;
		Self::list_since(rows, owner, vault_id, last_time, |f: &Folder| &f.envelope)
	}

	// -- settings -----------------------------------------------------------

	pub fn get_setting(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Setting>, RepoError> {
		let key = resource_key(owner, vault_id, path_hash);
		let txn = self.db.begin_read().map_err(backend)?;
		let table = txn.open_table(SETTINGS_TABLE).map_err(backend)?;
		match table.get(key.as_str()).map_err(backend)? {
			Some(bytes) => Ok(Some(bincode::deserialize(bytes.value()).map_err(backend)?)),
			None => Ok(None),
		}
	}

	pub fn put_setting(&self, owner: &str, mut setting: Setting) -> Result<Setting, RepoError> {
		let key = resource_key(owner, &setting.envelope.vault_id, &setting.envelope.path_hash);
		let txn = self.db.begin_write().map_err(backend)?;
		{
			let mut table = txn.open_table(SETTINGS_TABLE).map_err(backend)?;
			let previous = table
				.get(key.as_str())
				.map_err(backend)?
				.map(|b| bincode::deserialize::<Setting>(b.value()).map(|s| s.envelope.updated_timestamp))
				.transpose()
				.map_err(backend)?;
			setting.envelope.updated_timestamp = Self::next_timestamp(previous);
			let bytes = bincode::serialize(&setting).map_err(backend)?;
			table.insert(key.as_str(), bytes.as_slice()).map_err(backend)?;
		}
		txn.commit().map_err(backend)?;
		Ok(setting)
	}

	pub fn delete_setting(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Setting>, RepoError> {
		let mut setting = match self.get_setting(owner, vault_id, path_hash)? {
			Some(s) => s,
			None => return Ok(None),
		};
		if setting.envelope.action == Action::Delete {
			return Ok(Some(setting));
		}
		setting.envelope.action = Action::Delete;
		Ok(Some(self.put_setting(owner, setting)?))
	}

	pub fn list_settings_since(&self, owner: &str, vault_id: &str, last_time: i64) -> Result<Vec<Setting>, RepoError> {
		let rows = self.scan_table(SETTINGS_TABLE)?;
		Self::list_since(rows, owner, vault_id, last_time, |s: &Setting| &s.envelope)
	}

	// -- note history -----------------------------------------------------

	/// Looks up a merge base keyed by `(noteId, contentHash)`, per the
	/// "history base lookup" design note.
	pub fn get_note_history_base(&self, note_id: &str, content_hash: &str) -> Result<Option<NoteHistory>, RepoError> {
		let key = format!("{}\u{0}{}", note_id, content_hash);
		let txn = self.db.begin_read().map_err(backend)?;
		let table = txn.open_table(NOTE_HISTORY_TABLE).map_err(backend)?;
		match table.get(key.as_str()).map_err(backend)? {
			Some(bytes) => Ok(Some(bincode::deserialize(bytes.value()).map_err(backend)?)),
			None => Ok(None),
		}
	}

	/// Appends a history snapshot. At most one snapshot is kept per
	/// `(noteId, contentHash)`; a second append with the same pair
	/// overwrites rather than duplicating.
	pub fn append_note_history(&self, history: &NoteHistory) -> Result<(), RepoError> {
		let key = format!("{}\u{0}{}", history.note_id, history.content_hash);
		let txn = self.db.begin_write().map_err(backend)?;
		{
			let mut table = txn.open_table(NOTE_HISTORY_TABLE).map_err(backend)?;
			let bytes = bincode::serialize(history).map_err(backend)?;
			table.insert(key.as_str(), bytes.as_slice()).map_err(backend)?;
		}
		txn.commit().map_err(backend)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::ResourceEnvelope;

	fn envelope(vault_id: &str, path: &str, path_hash: &str) -> ResourceEnvelope {
		ResourceEnvelope {
			id: Uuid::new_v4().to_string(),
			vault_id: vault_id.to_string(),
			action: Action::Create,
			path: path.to_string(),
			path_hash: path_hash.to_string(),
			ctime: 0,
			mtime: 0,
			updated_timestamp: 0,
			created_at: 0,
			updated_at: 0,
		}
	}

	fn open_repo() -> (Repo, tempfile::TempDir) {
		let dir = tempfile::tempdir().unwrap();
		let repo = Repo::open(&dir.path().join("repo.redb")).unwrap();
		(repo, dir)
	}

	#[test]
	fn find_or_create_vault_is_idempotent() {
		let (repo, _dir) = open_repo();
		let v1 = repo.find_or_create_vault("alice", "default").unwrap();
		let v2 = repo.find_or_create_vault("alice", "default").unwrap();
		assert_eq!(v1.id, v2.id);
	}

	#[test]
	fn put_note_assigns_strictly_increasing_timestamps() {
		let (repo, _dir) = open_repo();
		let vault = repo.find_or_create_vault("alice", "default").unwrap();

		let note = Note {
			envelope: envelope(&vault.id, "a.md", "hash1"),
			fid: "f1".into(),
			content: "hello".into(),
			content_hash: "ch1".into(),
			content_last_snapshot: None,
			content_last_snapshot_hash: None,
			version: 1,
			client_name: "desktop".into(),
			size: 5,
		};
		let delta = VaultDelta { note_count: 1, note_size: 5, ..Default::default() };
		let stored1 = repo.put_note("alice", note.clone(), delta).unwrap();

		let mut note2 = stored1.clone();
		note2.content = "hello2".into();
		let stored2 = repo.put_note("alice", note2, VaultDelta::default()).unwrap();

		assert!(stored2.envelope.updated_timestamp > stored1.envelope.updated_timestamp);

		let v = repo.get_vault(&vault.id).unwrap().unwrap();
		assert_eq!(v.note_count, 1);
		assert_eq!(v.note_size, 5);
	}

	#[test]
	fn delete_note_is_idempotent() {
		let (repo, _dir) = open_repo();
		let vault = repo.find_or_create_vault("alice", "default").unwrap();
		let note = Note {
			envelope: envelope(&vault.id, "a.md", "hash1"),
			fid: "f1".into(),
			content: "hello".into(),
			content_hash: "ch1".into(),
			content_last_snapshot: None,
			content_last_snapshot_hash: None,
			version: 1,
			client_name: "desktop".into(),
			size: 5,
		};
		repo.put_note("alice", note, VaultDelta { note_count: 1, note_size: 5, ..Default::default() }).unwrap();

		let deleted1 = repo.delete_note("alice", &vault.id, "hash1").unwrap().unwrap();
		assert_eq!(deleted1.envelope.action, Action::Delete);
		let deleted2 = repo.delete_note("alice", &vault.id, "hash1").unwrap().unwrap();
		assert_eq!(deleted1.envelope.updated_timestamp, deleted2.envelope.updated_timestamp);
	}

	#[test]
	fn list_notes_since_orders_ascending_and_filters() {
		let (repo, _dir) = open_repo();
		let vault = repo.find_or_create_vault("alice", "default").unwrap();

		for i in 0..3 {
			let note = Note {
				envelope: envelope(&vault.id, &format!("n{}.md", i), &format!("hash{}", i)),
				fid: format!("f{}", i),
				content: "x".into(),
				content_hash: "ch".into(),
				content_last_snapshot: None,
				content_last_snapshot_hash: None,
				version: 1,
				client_name: "desktop".into(),
				size: 1,
			};
			repo.put_note("alice", note, VaultDelta::default()).unwrap();
		}

		let all = repo.list_notes_since("alice", &vault.id, 0).unwrap();
		assert_eq!(all.len(), 3);
		for w in all.windows(2) {
			assert!(w[0].envelope.updated_timestamp <= w[1].envelope.updated_timestamp);
		}

		let since_last = repo.list_notes_since("alice", &vault.id, all[1].envelope.updated_timestamp).unwrap();
		assert_eq!(since_last.len(), 1);
	}

	#[test]
	fn list_is_scoped_to_vault() {
		let (repo, _dir) = open_repo();
		let v1 = repo.find_or_create_vault("alice", "one").unwrap();
		let v2 = repo.find_or_create_vault("alice", "two").unwrap();

		let note = Note {
			envelope: envelope(&v1.id, "a.md", "hash1"),
			fid: "f1".into(),
			content: "x".into(),
			content_hash: "ch".into(),
			content_last_snapshot: None,
			content_last_snapshot_hash: None,
			version: 1,
			client_name: "desktop".into(),
			size: 1,
		};
		repo.put_note("alice", note, VaultDelta::default()).unwrap();

		assert_eq!(repo.list_notes_since("alice", &v1.id, 0).unwrap().len(), 1);
		assert_eq!(repo.list_notes_since("alice", &v2.id, 0).unwrap().len(), 0);
	}

	#[test]
	fn note_history_lookup_by_note_id_and_content_hash() {
		let (repo, _dir) = open_repo();
		let history = NoteHistory {
			id: Uuid::new_v4().to_string(),
			note_id: "n1".into(),
			vault_id: "v1".into(),
			path: "a.md".into(),
			diff_patch: String::new(),
			content: "base text".into(),
			content_hash: "basehash".into(),
			client_name: "desktop".into(),
			version: 1,
			created_at: 0,
		};
		repo.append_note_history(&history).unwrap();

		let found = repo.get_note_history_base("n1", "basehash").unwrap().unwrap();
		assert_eq!(found.content, "base text");
		assert!(repo.get_note_history_base("n1", "otherhash").unwrap().is_none());
	}
}

// vim: ts=4
