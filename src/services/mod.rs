//! Resource services: the common contract shared by notes, files,
//! folders, and settings, per spec.md §4.3.
//!
//! Each service is a thin layer over `Repo` that adds the business
//! rules the repository itself is agnostic to: the update-check
//! classification, history snapshotting for notes, and rename's
//! tombstone-old/create-new pairing.

use std::sync::Arc;

use crate::model::{Action, File, Folder, Note, NoteHistory, ResourceEnvelope, Setting};
use crate::repo::{now_ms, Repo, RepoError, VaultDelta};

/// Classification produced by `UpdateCheck`, per spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCheckMode {
	NoOp,
	UpdateContent,
	UpdateMtime,
	Create,
}

pub trait HasEnvelope {
	fn envelope(&self) -> &ResourceEnvelope;
}

impl HasEnvelope for Note {
	fn envelope(&self) -> &ResourceEnvelope {
		&self.envelope
	}
}
impl HasEnvelope for File {
	fn envelope(&self) -> &ResourceEnvelope {
		&self.envelope
	}
}
impl HasEnvelope for Folder {
	fn envelope(&self) -> &ResourceEnvelope {
		&self.envelope
	}
}
impl HasEnvelope for Setting {
	fn envelope(&self) -> &ResourceEnvelope {
		&self.envelope
	}
}

pub trait HasContentHash: HasEnvelope {
	fn content_hash(&self) -> &str;
}

impl HasContentHash for Note {
	fn content_hash(&self) -> &str {
		&self.content_hash
	}
}
impl HasContentHash for File {
	fn content_hash(&self) -> &str {
		&self.content_hash
	}
}
impl HasContentHash for Setting {
	fn content_hash(&self) -> &str {
		&self.content_hash
	}
}

/// `UpdateCheck` for content-bearing resources (notes, files, settings).
pub fn update_check<T: HasContentHash>(existing: Option<&T>, client_content_hash: Option<&str>, client_mtime: i64) -> UpdateCheckMode {
	let existing = match existing {
		None => return UpdateCheckMode::Create,
		Some(e) if e.envelope().action == Action::Delete => return UpdateCheckMode::Create,
		Some(e) => e,
	};
	let hashes_equal = client_content_hash.map(|h| h == existing.content_hash()).unwrap_or(false);
	if hashes_equal && existing.envelope().mtime == client_mtime {
		UpdateCheckMode::NoOp
	} else if hashes_equal {
		UpdateCheckMode::UpdateMtime
	} else {
		UpdateCheckMode::UpdateContent
	}
}

/// `UpdateCheck` for folders, which carry no body to hash.
pub fn update_check_folder(existing: Option<&Folder>, client_mtime: i64) -> UpdateCheckMode {
	match existing {
		None => UpdateCheckMode::Create,
		Some(e) if e.envelope().action == Action::Delete => UpdateCheckMode::Create,
		Some(e) if e.envelope().mtime == client_mtime => UpdateCheckMode::NoOp,
		Some(_) => UpdateCheckMode::UpdateMtime,
	}
}

fn base_envelope(vault_id: &str, path: &str, path_hash: &str, ctime: i64, mtime: i64) -> ResourceEnvelope {
	let now = now_ms();
	ResourceEnvelope {
		id: uuid::Uuid::new_v4().to_string(),
		vault_id: vault_id.to_string(),
		action: Action::Create,
		path: path.to_string(),
		path_hash: path_hash.to_string(),
		ctime,
		mtime,
		updated_timestamp: 0,
		created_at: now,
		updated_at: now,
	}
}

pub struct NoteService {
	pub repo: Arc<Repo>,
}

impl NoteService {
	pub fn get(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Note>, RepoError> {
		self.repo.get_note(owner, vault_id, path_hash)
	}

	pub fn update_check(&self, owner: &str, vault_id: &str, path_hash: &str, content_hash: Option<&str>, mtime: i64) -> Result<UpdateCheckMode, RepoError> {
		let existing = self.get(owner, vault_id, path_hash)?;
		Ok(update_check(existing.as_ref(), content_hash, mtime))
	}

	/// Inserts or updates a note. On update, pushes a history snapshot
	/// of the previous content unless one already exists for that
	/// `(noteId, contentHash)` pair (spec.md §4.3).
	#[allow(clippy::too_many_arguments)]
	pub fn modify_or_create(
		&self,
		owner: &str,
		vault_id: &str,
		path: &str,
		path_hash: &str,
		content: &str,
		content_hash: &str,
		ctime: i64,
		mtime: i64,
		client_name: &str,
	) -> Result<(bool, Note), RepoError> {
		let existing = self.get(owner, vault_id, path_hash)?;
		let created = existing.is_none() || existing.as_ref().unwrap().envelope.action == Action::Delete;

		let (note, size_delta, count_delta) = match existing {
			Some(mut prev) if !created => {
				let history = NoteHistory {
					id: uuid::Uuid::new_v4().to_string(),
					note_id: prev.envelope.id.clone(),
					vault_id: vault_id.to_string(),
					path: prev.envelope.path.clone(),
					diff_patch: String::new(),
					content: prev.content.clone(),
					content_hash: prev.content_hash.clone(),
					client_name: prev.client_name.clone(),
					version: prev.version,
					created_at: now_ms(),
				};
				self.repo.append_note_history(&history)?;

				let old_size = prev.size;
				prev.content_last_snapshot = Some(prev.content.clone());
				prev.content_last_snapshot_hash = Some(prev.content_hash.clone());
				prev.envelope.action = Action::Modify;
				prev.envelope.path = path.to_string();
				prev.envelope.path_hash = path_hash.to_string();
				prev.envelope.ctime = ctime;
				prev.envelope.mtime = mtime;
				prev.content = content.to_string();
				prev.content_hash = content_hash.to_string();
				prev.client_name = client_name.to_string();
				prev.version += 1;
				prev.size = content.len() as i64;
				(prev, prev_size_delta(old_size, content.len() as i64), 0)
			}
			_ => {
				let envelope = base_envelope(vault_id, path, path_hash, ctime, mtime);
				let note = Note {
					envelope,
					fid: uuid::Uuid::new_v4().to_string(),
					content: content.to_string(),
					content_hash: content_hash.to_string(),
					content_last_snapshot: None,
					content_last_snapshot_hash: None,
					version: 1,
					client_name: client_name.to_string(),
					size: content.len() as i64,
				};
				(note, content.len() as i64, 1)
			}
		};

		let delta = VaultDelta { note_count: count_delta, note_size: size_delta, ..Default::default() };
		let stored = self.repo.put_note(owner, note, delta)?;
		Ok((created, stored))
	}

	pub fn delete(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Note>, RepoError> {
		self.repo.delete_note(owner, vault_id, path_hash)
	}

	/// Tombstones the old path and creates/updates the new one,
	/// preserving `content`/`contentHash` (spec.md §4.5.3).
	pub fn rename(&self, owner: &str, vault_id: &str, old_path_hash: &str, new_path: &str, new_path_hash: &str) -> Result<(Option<Note>, Option<Note>), RepoError> {
		let old = match self.repo.get_note(owner, vault_id, old_path_hash)? {
			Some(n) if n.envelope.action != Action::Delete => n,
			other => return Ok((other, None)),
		};
		let old_deleted = self.repo.delete_note(owner, vault_id, old_path_hash)?;

		let (_, new_note) = self.modify_or_create(
			owner,
			vault_id,
			new_path,
			new_path_hash,
			&old.content,
			&old.content_hash,
			old.envelope.ctime,
			old.envelope.mtime,
			&old.client_name,
		)?;
		Ok((old_deleted, Some(new_note)))
	}

	pub fn list_since(&self, owner: &str, vault_id: &str, last_time: i64) -> Result<Vec<Note>, RepoError> {
		self.repo.list_notes_since(owner, vault_id, last_time)
	}
}

fn prev_size_delta(old: i64, new: i64) -> i64 {
	new - old
}

pub struct FileService {
	pub repo: Arc<Repo>,
}

impl FileService {
	pub fn get(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<File>, RepoError> {
		self.repo.get_file(owner, vault_id, path_hash)
	}

	pub fn update_check(&self, owner: &str, vault_id: &str, path_hash: &str, content_hash: Option<&str>, mtime: i64) -> Result<UpdateCheckMode, RepoError> {
		let existing = self.get(owner, vault_id, path_hash)?;
		Ok(update_check(existing.as_ref(), content_hash, mtime))
	}

	/// Completes an upload session: creates/updates the file record and
	/// assigns `savePath` to the blob key the caller already moved the
	/// temp file under.
	pub fn upload_complete(
		&self,
		owner: &str,
		vault_id: &str,
		path: &str,
		path_hash: &str,
		content_hash: &str,
		save_path: &str,
		ctime: i64,
		mtime: i64,
		size: i64,
	) -> Result<(bool, File), RepoError> {
		let existing = self.get(owner, vault_id, path_hash)?;
		let created = existing.is_none() || existing.as_ref().unwrap().envelope.action == Action::Delete;
		let old_size = existing.as_ref().map(|f| f.size).unwrap_or(0);

		let mut envelope = existing.map(|f| f.envelope).unwrap_or_else(|| base_envelope(vault_id, path, path_hash, ctime, mtime));
		envelope.action = if created { Action::Create } else { Action::Modify };
		envelope.path = path.to_string();
		envelope.path_hash = path_hash.to_string();
		envelope.ctime = ctime;
		envelope.mtime = mtime;

		let file = File {
			fid: envelope.id.clone(),
			envelope,
			content_hash: content_hash.to_string(),
			save_path: save_path.to_string(),
			size,
		};

		let delta =
			VaultDelta { file_count: if created { 1 } else { 0 }, file_size: size - old_size, ..Default::default() };
		let stored = self.repo.put_file(owner, file, delta)?;
		Ok((created, stored))
	}

	pub fn delete(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<File>, RepoError> {
		self.repo.delete_file(owner, vault_id, path_hash)
	}

	/// Moves the logical record only; the underlying blob is not
	/// copied (spec.md §4.5.3).
	pub fn rename(&self, owner: &str, vault_id: &str, old_path_hash: &str, new_path: &str, new_path_hash: &str) -> Result<(Option<File>, Option<File>), RepoError> {
		let old = match self.repo.get_file(owner, vault_id, old_path_hash)? {
			Some(f) if f.envelope.action != Action::Delete => f,
			other => return Ok((other, None)),
		};
		let old_deleted = self.repo.delete_file(owner, vault_id, old_path_hash)?;
		let (_, new_file) = self.upload_complete(
			owner,
			vault_id,
			new_path,
			new_path_hash,
			&old.content_hash,
			&old.save_path,
			old.envelope.ctime,
			old.envelope.mtime,
			old.size,
		)?;
		Ok((old_deleted, Some(new_file)))
	}

	pub fn list_since(&self, owner: &str, vault_id: &str, last_time: i64) -> Result<Vec<File>, RepoError> {
		self.repo.list_files_since(owner, vault_id, last_time)
	}
}

pub struct FolderService {
	pub repo: Arc<Repo>,
}

impl FolderService {
	pub fn get(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Folder>, RepoError> {
		self.repo.get_folder(owner, vault_id, path_hash)
	}

	pub fn update_check(&self, owner: &str, vault_id: &str, path_hash: &str, mtime: i64) -> Result<UpdateCheckMode, RepoError> {
		let existing = self.get(owner, vault_id, path_hash)?;
		Ok(update_check_folder(existing.as_ref(), mtime))
	}

	pub fn modify_or_create(&self, owner: &str, vault_id: &str, path: &str, path_hash: &str, ctime: i64, mtime: i64, level: i32) -> Result<(bool, Folder), RepoError> {
		let existing = self.get(owner, vault_id, path_hash)?;
		let created = existing.is_none() || existing.as_ref().unwrap().envelope.action == Action::Delete;

		let mut envelope = existing.map(|f| f.envelope).unwrap_or_else(|| base_envelope(vault_id, path, path_hash, ctime, mtime));
		envelope.action = if created { Action::Create } else { Action::Modify };
		envelope.path = path.to_string();
		envelope.path_hash = path_hash.to_string();
		envelope.ctime = ctime;
		envelope.mtime = mtime;

		let folder = Folder { fid: envelope.id.clone(), envelope, level };
		let stored = self.repo.put_folder(owner, folder)?;
		Ok((created, stored))
	}

	pub fn delete(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Folder>, RepoError> {
		self.repo.delete_folder(owner, vault_id, path_hash)
	}

	pub fn rename(&self, owner: &str, vault_id: &str, old_path_hash: &str, new_path: &str, new_path_hash: &str) -> Result<(Option<Folder>, Option<Folder>), RepoError> {
		let old = match self.repo.get_folder(owner, vault_id, old_path_hash)? {
			Some(f) if f.envelope.action != Action::Delete => f,
			other => return Ok((other, None)),
		};
		let old_deleted = self.repo.delete_folder(owner, vault_id, old_path_hash)?;
		let (_, new_folder) = self.modify_or_create(owner, vault_id, new_path, new_path_hash, old.envelope.ctime, old.envelope.mtime, old.level)?;
		Ok((old_deleted, Some(new_folder)))
	}

	pub fn list_since(&self, owner: &str, vault_id: &str, last_time: i64) -> Result<Vec<Folder>, RepoError> {
		self.repo.list_folders_since(owner, vault_id, last_time)
	}
}

pub struct SettingService {
	pub repo: Arc<Repo>,
}

impl SettingService {
	pub fn get(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Setting>, RepoError> {
		self.repo.get_setting(owner, vault_id, path_hash)
	}

	pub fn update_check(&self, owner: &str, vault_id: &str, path_hash: &str, content_hash: Option<&str>, mtime: i64) -> Result<UpdateCheckMode, RepoError> {
		let existing = self.get(owner, vault_id, path_hash)?;
		Ok(update_check(existing.as_ref(), content_hash, mtime))
	}

	pub fn modify_or_create(&self, owner: &str, vault_id: &str, path: &str, path_hash: &str, content: &str, content_hash: &str, ctime: i64, mtime: i64) -> Result<(bool, Setting), RepoError> {
		let existing = self.get(owner, vault_id, path_hash)?;
		let created = existing.is_none() || existing.as_ref().unwrap().envelope.action == Action::Delete;

		let mut envelope = existing.map(|s| s.envelope).unwrap_or_else(|| base_envelope(vault_id, path, path_hash, ctime, mtime));
		envelope.action = if created { Action::Create } else { Action::Modify };
		envelope.path = path.to_string();
		envelope.path_hash = path_hash.to_string();
		envelope.ctime = ctime;
		envelope.mtime = mtime;

		let setting = Setting { envelope, content: content.to_string(), content_hash: content_hash.to_string(), size: content.len() as i64 };
		let stored = self.repo.put_setting(owner, setting)?;
		Ok((created, stored))
	}

	pub fn delete(&self, owner: &str, vault_id: &str, path_hash: &str) -> Result<Option<Setting>, RepoError> {
		self.repo.delete_setting(owner, vault_id, path_hash)
	}

	pub fn list_since(&self, owner: &str, vault_id: &str, last_time: i64) -> Result<Vec<Setting>, RepoError> {
		self.repo.list_settings_since(owner, vault_id, last_time)
	}

	/// `SettingClear`: tombstones every live setting in the vault.
	pub fn clear(&self, owner: &str, vault_id: &str) -> Result<Vec<Setting>, RepoError> {
		let live: Vec<Setting> = self
			.repo
			.list_settings_since(owner, vault_id, 0)
			.map(|v| v.into_iter().filter(|s| s.envelope.action != Action::Delete).collect())?;
		let mut cleared = Vec::with_capacity(live.len());
		for s in live {
			if let Some(deleted) = self.repo.delete_setting(owner, vault_id, &s.envelope.path_hash)? {
				cleared.push(deleted);
			}
		}
		Ok(cleared)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn setup() -> (Arc<Repo>, String, String) {
		let dir = tempdir().unwrap();
		let repo = Arc::new(Repo::open(&dir.path().join("repo.redb")).unwrap());
		std::mem::forget(dir);
		let vault = repo.find_or_create_vault("alice", "default").unwrap();
		(repo, "alice".to_string(), vault.id)
	}

	#[test]
	fn note_create_then_modify_snapshots_history() {
		let (repo, owner, vault_id) = setup();
		let service = NoteService { repo: repo.clone() };

		let (created, note1) = service
			.modify_or_create(&owner, &vault_id, "a.md", "hash1", "hello", "ch1", 0, 0, "desktop")
			.unwrap();
		assert!(created);

		let (created2, note2) = service
			.modify_or_create(&owner, &vault_id, "a.md", "hash1", "hello world", "ch2", 0, 1, "desktop")
			.unwrap();
		assert!(!created2);
		assert_eq!(note2.content, "hello world");
		assert_eq!(note2.version, note1.version + 1);

		let history = repo.get_note_history_base(&note1.envelope.id, "ch1").unwrap();
		assert!(history.is_some());
		assert_eq!(history.unwrap().content, "hello");
	}

	#[test]
	fn update_check_modes() {
		let (repo, owner, vault_id) = setup();
		let service = NoteService { repo };

		assert_eq!(service.update_check(&owner, &vault_id, "hash1", Some("ch1"), 0).unwrap(), UpdateCheckMode::Create);

		service.modify_or_create(&owner, &vault_id, "a.md", "hash1", "hello", "ch1", 0, 5, "desktop").unwrap();

		assert_eq!(service.update_check(&owner, &vault_id, "hash1", Some("ch1"), 5).unwrap(), UpdateCheckMode::NoOp);
		assert_eq!(service.update_check(&owner, &vault_id, "hash1", Some("ch1"), 6).unwrap(), UpdateCheckMode::UpdateMtime);
		assert_eq!(service.update_check(&owner, &vault_id, "hash1", Some("ch2"), 6).unwrap(), UpdateCheckMode::UpdateContent);
	}

	#[test]
	fn rename_tombstones_old_and_creates_new() {
		let (repo, owner, vault_id) = setup();
		let service = NoteService { repo: repo.clone() };
		service.modify_or_create(&owner, &vault_id, "a.md", "hashA", "hello", "ch1", 0, 0, "desktop").unwrap();

		let (old, new) = service.rename(&owner, &vault_id, "hashA", "b.md", "hashB").unwrap();
		assert_eq!(old.unwrap().envelope.action, Action::Delete);
		let new = new.unwrap();
		assert_eq!(new.envelope.action, Action::Create);
		assert_eq!(new.content, "hello");

		assert!(service.get(&owner, &vault_id, "hashA").unwrap().unwrap().envelope.action == Action::Delete);
		assert!(service.get(&owner, &vault_id, "hashB").unwrap().unwrap().envelope.action != Action::Delete);
	}

	#[test]
	fn setting_clear_tombstones_all_live_settings() {
		let (repo, owner, vault_id) = setup();
		let service = SettingService { repo };
		service.modify_or_create(&owner, &vault_id, "theme", "h1", "dark", "ch1", 0, 0).unwrap();
		service.modify_or_create(&owner, &vault_id, "font", "h2", "mono", "ch2", 0, 0).unwrap();

		let cleared = service.clear(&owner, &vault_id).unwrap();
		assert_eq!(cleared.len(), 2);
		assert!(cleared.iter().all(|s| s.envelope.action == Action::Delete));
	}
}

// vim: ts=4
