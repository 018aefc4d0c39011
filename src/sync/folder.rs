//! `Folder{Sync,Modify,Delete,Rename}` coordinators, per spec.md §4.5.1.
//!
//! Folders carry no content hash, so `UpdateCheck` only ever compares
//! `mtime`; there is no merge or upload/download concept for them.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use crate::codec::{DeleteRequest, ModifyRequest, RenameRequest, SyncRequest};
use crate::error::SyncError;
use crate::model::Action;
use crate::repo::now_ms;
use crate::services::FolderService;

use super::{frame, sync_end_frame, SyncCounts, SyncOutcome};

const KIND: &str = "Folder";

pub fn folder_sync(owner: &str, vault_id: &str, service: &FolderService, req: &SyncRequest) -> Result<SyncOutcome, SyncError> {
	let delta = service.list_since(owner, vault_id, req.last_time)?;
	let mut handled: HashSet<String> = HashSet::new();
	let mut queued: Vec<crate::codec::Frame> = Vec::new();
	let mut counts = SyncCounts::default();
	let mut last_time = req.last_time;

	for del in &req.del_items {
		handled.insert(del.path_hash.clone());
		if let Some(existing) = service.get(owner, vault_id, &del.path_hash)? {
			if existing.envelope.action != Action::Delete {
				if let Some(f) = service.delete(owner, vault_id, &del.path_hash)? {
					last_time = last_time.max(f.envelope.updated_timestamp);
				}
			}
		}
	}

	for item in &req.missing_items {
		if !handled.insert(item.path_hash.clone()) {
			continue;
		}
		if let Some(rec) = service.get(owner, vault_id, &item.path_hash)? {
			if rec.envelope.action != Action::Delete {
				last_time = last_time.max(rec.envelope.updated_timestamp);
				queued.push(frame(KIND, "SyncModify", &rec, vault_id));
				counts.need_modify += 1;
			}
		}
	}

	let client_index: HashMap<&str, &crate::codec::SyncItem> = req.items.iter().map(|i| (i.path_hash.as_str(), i)).collect();
	let mut seen_in_delta: HashSet<String> = HashSet::new();

	for rec in &delta {
		let path_hash = rec.envelope.path_hash.clone();
		seen_in_delta.insert(path_hash.clone());
		if handled.contains(&path_hash) {
			continue;
		}
		last_time = last_time.max(rec.envelope.updated_timestamp);

		match client_index.get(path_hash.as_str()) {
			Some(_) if rec.envelope.action.is_tombstone() => {
				queued.push(frame(KIND, "SyncDelete", json!({"path": rec.envelope.path, "pathHash": path_hash}), vault_id));
				counts.need_delete += 1;
			}
			None if rec.envelope.action.is_tombstone() => {}
			None => {
				queued.push(frame(KIND, "SyncModify", rec, vault_id));
				counts.need_modify += 1;
			}
			Some(item) => {
				if item.mtime == rec.envelope.mtime {
					// already in sync
				} else {
					queued.push(frame(KIND, "SyncMtime", json!({"path": rec.envelope.path, "pathHash": path_hash, "mtime": rec.envelope.mtime}), vault_id));
					counts.need_sync_mtime += 1;
				}
			}
		}
	}

	// Folders have no "please push" directive in the closed action
	// vocabulary (spec.md §4.5.1 step 5 names one for notes/settings/
	// files only), so an unmatched client folder gets no reply here —
	// the client resubmits it via `FolderModify` on its own.

	let mut outcome = SyncOutcome::default();
	outcome.to_caller.push(sync_end_frame(KIND, counts, last_time, vault_id));
	outcome.to_caller.extend(queued);
	Ok(outcome)
}

pub fn folder_modify(owner: &str, vault_id: &str, service: &FolderService, req: &ModifyRequest) -> Result<SyncOutcome, SyncError> {
	let level = req.path.matches('/').count() as i32;
	let now = now_ms();
	let (_, folder) = service.modify_or_create(owner, vault_id, &req.path, &req.path_hash, req.ctime, now, level)?;
	let mut outcome = SyncOutcome::default();
	outcome.broadcast(frame(KIND, "SyncModify", &folder, vault_id), true);
	Ok(outcome)
}

pub fn folder_delete(owner: &str, vault_id: &str, service: &FolderService, req: &DeleteRequest) -> Result<SyncOutcome, SyncError> {
	let mut outcome = SyncOutcome::default();
	if let Some(folder) = service.delete(owner, vault_id, &req.path_hash)? {
		outcome.broadcast(frame(KIND, "SyncDelete", json!({"path": folder.envelope.path, "pathHash": folder.envelope.path_hash}), vault_id), true);
	}
	Ok(outcome)
}

pub fn folder_rename(owner: &str, vault_id: &str, service: &FolderService, req: &RenameRequest) -> Result<SyncOutcome, SyncError> {
	let (old, new) = service.rename(owner, vault_id, &req.old_path_hash, &req.path, &req.path_hash)?;
	let mut outcome = SyncOutcome::default();
	if let Some(old) = &old {
		outcome.broadcast(frame(KIND, "SyncDelete", json!({"path": old.envelope.path, "pathHash": old.envelope.path_hash}), vault_id), true);
	}
	if let Some(new) = &new {
		outcome.broadcast(frame(KIND, "SyncModify", new, vault_id), true);
	}
	Ok(outcome)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::repo::Repo;
	use std::sync::Arc;
	use tempfile::tempdir;

	fn setup() -> (FolderService, String, String) {
		let dir = tempdir().unwrap();
		let repo = Arc::new(Repo::open(&dir.path().join("repo.redb")).unwrap());
		std::mem::forget(dir);
		let vault = repo.find_or_create_vault("alice", "default").unwrap();
		(FolderService { repo }, "alice".to_string(), vault.id)
	}

	#[test]
	fn modify_creates_then_broadcasts() {
		let (service, owner, vault_id) = setup();
		let req = ModifyRequest {
			vault: vault_id.clone(),
			path: "notes/sub".into(),
			path_hash: "h1".into(),
			content: None,
			content_hash: None,
			ctime: 0,
			mtime: 0,
			client_name: None,
			base_hash: None,
		};
		let outcome = folder_modify(&owner, &vault_id, &service, &req).unwrap();
		assert_eq!(outcome.to_broadcast.len(), 1);
	}

	#[test]
	fn sync_reports_unseen_folder_as_modify() {
		let (service, owner, vault_id) = setup();
		service.modify_or_create(&owner, &vault_id, "notes", "h1", 0, 0, 0).unwrap();
		let req = SyncRequest { vault: vault_id.clone(), last_time: 0, items: vec![], del_items: vec![], missing_items: vec![] };
		let outcome = folder_sync(&owner, &vault_id, &service, &req).unwrap();
		assert!(outcome.to_caller.iter().any(|f| matches!(f, crate::codec::Frame::Text(v) if v["action"] == "FolderSyncModify")));
	}
}

// vim: ts=4
