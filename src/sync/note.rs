//! `Note{Sync,Modify,Delete,Rename,Check,RePush}` coordinators, per
//! spec.md §4.5.1 and §4.5.2.
//!
//! `note_modify` is the one coordinator that consults the three-way
//! merge engine: a path marked in `DiffMergePaths` during a prior sync
//! routes its next modify through `three_way_merge` against the
//! history-recorded ancestor, instead of a plain override.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use crate::codec::{CheckRequest, DeleteRequest, ModifyRequest, RenameRequest, RePushRequest, SyncRequest};
use crate::error::SyncError;
use crate::hashutil;
use crate::merge::{merge_ignore_conflict_ignore_delete, three_way_merge};
use crate::model::Action;
use crate::repo::now_ms;
use crate::services::NoteService;
use crate::session::{Client, OfflineSyncStrategy};

use super::{frame, sync_end_frame, SyncCounts, SyncOutcome};

const KIND: &str = "Note";

pub fn note_sync(owner: &str, vault_id: &str, client: &Client, service: &NoteService, req: &SyncRequest) -> Result<SyncOutcome, SyncError> {
	let delta = service.list_since(owner, vault_id, req.last_time)?;
	let mut handled: HashSet<String> = HashSet::new();
	let mut queued: Vec<crate::codec::Frame> = Vec::new();
	let mut counts = SyncCounts::default();
	let mut last_time = req.last_time;

	for del in &req.del_items {
		handled.insert(del.path_hash.clone());
		if let Some(existing) = service.get(owner, vault_id, &del.path_hash)? {
			if existing.envelope.action != Action::Delete {
				let deleted = service.delete(owner, vault_id, &del.path_hash)?;
				if let Some(n) = deleted {
					last_time = last_time.max(n.envelope.updated_timestamp);
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
				} else if rec.envelope.mtime > item.mtime {
					if client.offline_sync_strategy.requires_merge_gating() {
						client.diff_merge_paths.mark(&rec.envelope.path);
						queued.push(frame(KIND, "SyncNeedPush", json!({"path": rec.envelope.path, "pathHash": path_hash}), vault_id));
						counts.need_modify += 1;
					} else {
						queued.push(frame(KIND, "SyncModify", rec, vault_id));
						counts.need_modify += 1;
					}
				} else {
					queued.push(frame(KIND, "SyncNeedPush", json!({"path": rec.envelope.path, "pathHash": path_hash}), vault_id));
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
			queued.push(frame(KIND, "SyncNeedPush", json!({"path": item.path, "pathHash": item.path_hash}), vault_id));
			counts.need_modify += 1;
		}
	}

	let mut outcome = SyncOutcome::default();
	outcome.to_caller.push(sync_end_frame(KIND, counts, last_time, vault_id));
	outcome.to_caller.extend(queued);
	Ok(outcome)
}

pub fn note_modify(owner: &str, vault_id: &str, client: &Client, service: &NoteService, req: &ModifyRequest) -> Result<SyncOutcome, SyncError> {
	let incoming = req.content.clone().unwrap_or_default();
	let gated = client.diff_merge_paths.take(&req.path) && client.offline_sync_strategy.requires_merge_gating();

	let final_content = if gated {
		merge_against_server(owner, vault_id, client, service, req, &incoming)?
	} else {
		incoming
	};

	let content_hash = hashutil::content_hash(final_content.as_bytes());
	let now = now_ms();
	let client_name = req.client_name.as_deref().unwrap_or("unknown");
	let (_, note) =
		service.modify_or_create(owner, vault_id, &req.path, &req.path_hash, &final_content, &content_hash, req.ctime, now, client_name)?;

	let mut outcome = SyncOutcome::default();
	// A merged edit may differ from what the origin sent, so the origin
	// needs the broadcast too; a plain edit is an echo the origin already has.
	outcome.broadcast(frame(KIND, "SyncModify", &note, vault_id), !gated);
	Ok(outcome)
}

fn merge_against_server(owner: &str, vault_id: &str, client: &Client, service: &NoteService, req: &ModifyRequest, client_content: &str) -> Result<String, SyncError> {
	let existing = match service.get(owner, vault_id, &req.path_hash)? {
		Some(e) if e.envelope.action != Action::Delete => e,
		_ => return Ok(client_content.to_string()),
	};

	if req.base_hash.as_deref() == Some(existing.content_hash.as_str()) {
		return Ok(client_content.to_string());
	}

	let base_hash = req.base_hash.clone().unwrap_or_default();
	let base = service
		.repo
		.get_note_history_base(&existing.envelope.id, &base_hash)?
		.map(|h| h.content)
		.unwrap_or_else(|| existing.content.clone());

	let pc1_first = match client.offline_sync_strategy {
		OfflineSyncStrategy::IgnoreTimeMerge => true,
		_ => req.mtime <= existing.envelope.mtime,
	};

	let merged = three_way_merge(&base, client_content, &existing.content, pc1_first)?;
	if merged.has_conflict {
		Ok(merge_ignore_conflict_ignore_delete(client_content, &existing.content, pc1_first))
	} else {
		Ok(merged.content)
	}
}

pub fn note_delete(owner: &str, vault_id: &str, service: &NoteService, req: &DeleteRequest) -> Result<SyncOutcome, SyncError> {
	let mut outcome = SyncOutcome::default();
	if let Some(note) = service.delete(owner, vault_id, &req.path_hash)? {
		outcome.broadcast(frame(KIND, "SyncDelete", json!({"path": note.envelope.path, "pathHash": note.envelope.path_hash}), vault_id), true);
	}
	Ok(outcome)
}

pub fn note_rename(owner: &str, vault_id: &str, service: &NoteService, req: &RenameRequest) -> Result<SyncOutcome, SyncError> {
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

pub fn note_check(owner: &str, vault_id: &str, service: &NoteService, req: &CheckRequest) -> Result<SyncOutcome, SyncError> {
	let mode = service.update_check(owner, vault_id, &req.path_hash, req.content_hash.as_deref(), req.mtime)?;
	let mut outcome = SyncOutcome::default();
	outcome.to_caller.push(frame(KIND, "CheckResult", json!({"path": req.path, "pathHash": req.path_hash, "mode": format!("{:?}", mode)}), vault_id));
	Ok(outcome)
}

pub fn note_re_push(client: &Client, req: &RePushRequest) -> SyncOutcome {
	client.diff_merge_paths.mark(&req.path);
	let mut outcome = SyncOutcome::default();
	outcome.to_caller.push(frame(KIND, "SyncNeedPush", json!({"path": req.path, "pathHash": req.path_hash}), &req.vault));
	outcome
}


// vim: ts=4
