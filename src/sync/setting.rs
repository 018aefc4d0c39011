//! `Setting{Sync,Modify,Delete,Check,Clear}` coordinators, per
//! spec.md §4.5.1.
//!
//! Settings are vault-scoped key/value pairs with no merge behavior: a
//! modify is always a plain override, same as a folder's.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use crate::codec::{CheckRequest, DeleteRequest, ModifyRequest, SettingClearRequest, SyncRequest};
use crate::error::SyncError;
use crate::hashutil;
use crate::model::Action;
use crate::repo::now_ms;
use crate::services::SettingService;

use super::{frame, sync_end_frame, SyncCounts, SyncOutcome};

const KIND: &str = "Setting";

pub fn setting_sync(owner: &str, vault_id: &str, service: &SettingService, req: &SyncRequest) -> Result<SyncOutcome, SyncError> {
	let delta = service.list_since(owner, vault_id, req.last_time)?;
	let mut handled: HashSet<String> = HashSet::new();
	let mut queued: Vec<crate::codec::Frame> = Vec::new();
	let mut counts = SyncCounts::default();
	let mut last_time = req.last_time;

	for del in &req.del_items {
		handled.insert(del.path_hash.clone());
		if let Some(existing) = service.get(owner, vault_id, &del.path_hash)? {
			if existing.envelope.action != Action::Delete {
				if let Some(s) = service.delete(owner, vault_id, &del.path_hash)? {
					last_time = last_time.max(s.envelope.updated_timestamp);
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
				let hashes_equal = item.content_hash.as_deref() == Some(rec.content_hash.as_str());
				if hashes_equal && item.mtime == rec.envelope.mtime {
					// already in sync
				} else if hashes_equal {
					queued.push(frame(KIND, "SyncMtime", json!({"path": rec.envelope.path, "pathHash": path_hash, "mtime": rec.envelope.mtime}), vault_id));
					counts.need_sync_mtime += 1;
				} else {
					queued.push(frame(KIND, "SyncModify", rec, vault_id));
					counts.need_modify += 1;
				}
			}
		}
	}

	for item in &req.items {
		if handled.contains(&item.path_hash) || seen_in_delta.contains(&item.path_hash) {
			continue;
		}
		if service.get(owner, vault_id, &item.path_hash)?.is_none() {
			queued.push(frame(KIND, "SyncNeedUpload", json!({"path": item.path, "pathHash": item.path_hash}), vault_id));
			counts.need_modify += 1;
		}
	}

	let mut outcome = SyncOutcome::default();
	outcome.to_caller.push(sync_end_frame(KIND, counts, last_time, vault_id));
	outcome.to_caller.extend(queued);
	Ok(outcome)
}

pub fn setting_modify(owner: &str, vault_id: &str, service: &SettingService, req: &ModifyRequest) -> Result<SyncOutcome, SyncError> {
	let content = req.content.clone().unwrap_or_default();
	let content_hash = hashutil::content_hash(content.as_bytes());
	let now = now_ms();
	let (_, setting) = service.modify_or_create(owner, vault_id, &req.path, &req.path_hash, &content, &content_hash, req.ctime, now)?;
	let mut outcome = SyncOutcome::default();
	outcome.broadcast(frame(KIND, "SyncModify", &setting, vault_id), true);
	Ok(outcome)
}

pub fn setting_delete(owner: &str, vault_id: &str, service: &SettingService, req: &DeleteRequest) -> Result<SyncOutcome, SyncError> {
	let mut outcome = SyncOutcome::default();
	if let Some(setting) = service.delete(owner, vault_id, &req.path_hash)? {
		outcome.broadcast(frame(KIND, "SyncDelete", json!({"path": setting.envelope.path, "pathHash": setting.envelope.path_hash}), vault_id), true);
	}
	Ok(outcome)
}

pub fn setting_check(owner: &str, vault_id: &str, service: &SettingService, req: &CheckRequest) -> Result<SyncOutcome, SyncError> {
	let mode = service.update_check(owner, vault_id, &req.path_hash, req.content_hash.as_deref(), req.mtime)?;
	let mut outcome = SyncOutcome::default();
	outcome.to_caller.push(frame(KIND, "CheckResult", json!({"path": req.path, "pathHash": req.path_hash, "mode": format!("{:?}", mode)}), vault_id));
	Ok(outcome)
}

pub fn setting_clear(owner: &str, vault_id: &str, service: &SettingService, req: &SettingClearRequest) -> Result<SyncOutcome, SyncError> {
	let cleared = service.clear(owner, vault_id)?;
	let mut outcome = SyncOutcome::default();
	for setting in cleared {
		outcome.broadcast(frame(KIND, "SyncDelete", json!({"path": setting.envelope.path, "pathHash": setting.envelope.path_hash}), &req.vault), true);
	}
	Ok(outcome)
}


// vim: ts=4
