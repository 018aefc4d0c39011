//! `File{Sync,UploadCheck,Delete,Rename,ChunkDownload,RePush}`
//! coordinators, per spec.md §4.5.1 and §4.6.
//!
//! Unlike notes, a file body is never merged: when client and server
//! disagree, one side is simply asked to push (opening an upload
//! session and replying `FileUpload`) or pull (`FileSyncModify`) the
//! other's version.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::json;
use uuid::Uuid;

use crate::blobstore::BlobStore;
use crate::chunk::ChunkSession;
use crate::codec::{DeleteRequest, FileChunkDownloadRequest, FileUploadCheckRequest, RenameRequest, RePushRequest, SyncRequest};
use crate::error::{boxed_error, SyncError};
use crate::model::Action;
use crate::services::{FileService, UpdateCheckMode};

use super::{frame, sync_end_frame, SyncCounts, SyncOutcome};

const KIND: &str = "File";

#[allow(clippy::too_many_arguments)]
pub fn file_sync(
	owner: &str,
	vault_id: &str,
	service: &FileService,
	req: &SyncRequest,
	client_name: Option<String>,
	chunk_size: u64,
	temp_dir: &Path,
) -> Result<(SyncOutcome, Vec<ChunkSession>), SyncError> {
	let delta = service.list_since(owner, vault_id, req.last_time)?;
	let mut handled: HashSet<String> = HashSet::new();
	let mut queued: Vec<crate::codec::Frame> = Vec::new();
	let mut counts = SyncCounts::default();
	let mut last_time = req.last_time;
	let mut sessions: Vec<ChunkSession> = Vec::new();

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
				let hashes_equal = item.content_hash.as_deref() == Some(rec.content_hash.as_str());
				if hashes_equal && item.mtime == rec.envelope.mtime {
					// already in sync
				} else if hashes_equal {
					queued.push(frame(KIND, "SyncMtime", json!({"path": rec.envelope.path, "pathHash": path_hash, "mtime": rec.envelope.mtime}), vault_id));
					counts.need_sync_mtime += 1;
				} else if rec.envelope.mtime > item.mtime {
					queued.push(frame(KIND, "SyncModify", rec, vault_id));
					counts.need_modify += 1;
				} else {
					let content_hash = item.content_hash.clone().unwrap_or_default();
					let size = item.size.unwrap_or(0).max(0) as u64;
					let session = ChunkSession::create(
						owner.to_string(),
						vault_id.to_string(),
						item.path.clone(),
						path_hash.clone(),
						content_hash,
						client_name.clone(),
						rec.envelope.ctime,
						item.mtime,
						size,
						chunk_size,
						temp_dir,
					)?;
					queued.push(frame(KIND, "Upload", json!({"path": item.path, "sessionId": session.session_id, "chunkSize": chunk_size}), vault_id));
					counts.need_upload += 1;
					sessions.push(session);
				}
			}
		}
	}

	for item in &req.items {
		if handled.contains(&item.path_hash) || seen_in_delta.contains(&item.path_hash) {
			continue;
		}
		if service.get(owner, vault_id, &item.path_hash)?.is_none() {
			let content_hash = item.content_hash.clone().unwrap_or_default();
			let size = item.size.unwrap_or(0).max(0) as u64;
			let session = ChunkSession::create(
				owner.to_string(),
				vault_id.to_string(),
				item.path.clone(),
				item.path_hash.clone(),
				content_hash,
				client_name.clone(),
				0,
				item.mtime,
				size,
				chunk_size,
				temp_dir,
			)?;
			queued.push(frame(KIND, "Upload", json!({"path": item.path, "sessionId": session.session_id, "chunkSize": chunk_size}), vault_id));
			counts.need_upload += 1;
			sessions.push(session);
		}
	}

	let mut outcome = SyncOutcome::default();
	outcome.to_caller.push(sync_end_frame(KIND, counts, last_time, vault_id));
	outcome.to_caller.extend(queued);
	Ok((outcome, sessions))
}

/// Accepts an upload-initiation request: classifies the change and, if
/// content actually needs transferring, opens a `ChunkSession` for the
/// caller to stream chunks into.
#[allow(clippy::too_many_arguments)]
pub fn file_upload_check(
	owner: &str,
	vault_id: &str,
	service: &FileService,
	req: &FileUploadCheckRequest,
	client_name: Option<String>,
	chunk_size: u64,
	temp_dir: &Path,
) -> Result<(SyncOutcome, Option<ChunkSession>), SyncError> {
	let mode = service.update_check(owner, vault_id, &req.path_hash, Some(&req.content_hash), req.mtime)?;
	let mut outcome = SyncOutcome::default();

	if mode == UpdateCheckMode::NoOp {
		// Nothing for the client to push; spec.md §4.6 names a reply
		// frame only for the Create/UpdateContent branch.
		return Ok((outcome, None));
	}

	let session = ChunkSession::create(
		owner.to_string(),
		vault_id.to_string(),
		req.path.clone(),
		req.path_hash.clone(),
		req.content_hash.clone(),
		client_name,
		0,
		req.mtime,
		req.size.max(0) as u64,
		chunk_size,
		temp_dir,
	)?;

	outcome.to_caller.push(frame(KIND, "Upload", json!({"path": req.path, "sessionId": session.session_id, "chunkSize": chunk_size}), vault_id));
	Ok((outcome, Some(session)))
}

/// Finalizes a completed upload session: moves its temp file into the
/// blob store and records the file, per spec.md §4.6.
pub async fn file_upload_finish(owner: &str, vault_id: &str, service: &FileService, blob_store: &dyn BlobStore, session: &ChunkSession) -> Result<SyncOutcome, SyncError> {
	let key = blob_store.generate_key(&session.path_hash, &session.path);
	blob_store.put(&session.temp_path, &key).await.map_err(boxed_error).map_err(SyncError::Blob)?;

	let (_, file) = service.upload_complete(
		owner,
		vault_id,
		&session.path,
		&session.path_hash,
		&session.content_hash,
		&key,
		session.ctime,
		session.mtime,
		session.size as i64,
	)?;

	let mut outcome = SyncOutcome::default();
	outcome.broadcast(frame(KIND, "SyncUpdate", &file, vault_id), true);
	Ok(outcome)
}

/// Blob-store key, size, and download session id a chunk stream should
/// be spawned against; resolved before any binary frame is sent so the
/// `FileSyncChunkDownload` reply can carry the same `sessionId` the
/// binary frames will use.
pub struct DownloadPlan {
	pub session_id: String,
	pub save_path: String,
	pub size: u64,
}

pub fn file_chunk_download_prepare(
	owner: &str,
	vault_id: &str,
	service: &FileService,
	req: &FileChunkDownloadRequest,
	chunk_size: u64,
) -> Result<(SyncOutcome, Option<DownloadPlan>), SyncError> {
	let file = match service.get(owner, vault_id, &req.path_hash)? {
		Some(f) if f.envelope.action != Action::Delete => f,
		_ => return Err(SyncError::NotFound { what: format!("file {}", req.path) }),
	};

	let size = file.size.max(0) as u64;
	let session_id = Uuid::new_v4().to_string();
	let total_chunks = size.div_ceil(chunk_size.max(1));

	let mut outcome = SyncOutcome::default();
	outcome.to_caller.push(frame(
		KIND,
		"SyncChunkDownload",
		json!({
			"path": req.path,
			"sessionId": session_id,
			"chunkSize": chunk_size,
			"totalChunks": total_chunks,
			"size": size,
			"ctime": file.envelope.ctime,
			"mtime": file.envelope.mtime,
		}),
		vault_id,
	));
	Ok((outcome, Some(DownloadPlan { session_id, save_path: file.save_path, size })))
}

pub fn file_delete(owner: &str, vault_id: &str, service: &FileService, req: &DeleteRequest) -> Result<SyncOutcome, SyncError> {
	let mut outcome = SyncOutcome::default();
	if let Some(file) = service.delete(owner, vault_id, &req.path_hash)? {
		outcome.broadcast(frame(KIND, "SyncDelete", json!({"path": file.envelope.path, "pathHash": file.envelope.path_hash}), vault_id), true);
	}
	Ok(outcome)
}

pub fn file_rename(owner: &str, vault_id: &str, service: &FileService, req: &RenameRequest) -> Result<SyncOutcome, SyncError> {
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

/// Re-opens an upload session for a path the server previously asked
/// the client to push, same mechanism as `file_upload_check`. Since
/// `FileRePush` carries no fresh content metadata, the session is
/// seeded from the existing record (or zeros, for a path the server
/// has never seen).
pub fn file_re_push(
	owner: &str,
	vault_id: &str,
	service: &FileService,
	req: &RePushRequest,
	client_name: Option<String>,
	chunk_size: u64,
	temp_dir: &Path,
) -> Result<(SyncOutcome, ChunkSession), SyncError> {
	let existing = service.get(owner, vault_id, &req.path_hash)?;
	let (content_hash, ctime, mtime, size) = match &existing {
		Some(f) => (f.content_hash.clone(), f.envelope.ctime, f.envelope.mtime, f.size.max(0) as u64),
		None => (String::new(), 0, 0, 0),
	};
	let session = ChunkSession::create(owner.to_string(), vault_id.to_string(), req.path.clone(), req.path_hash.clone(), content_hash, client_name, ctime, mtime, size, chunk_size, temp_dir)?;

	let mut outcome = SyncOutcome::default();
	outcome.to_caller.push(frame(KIND, "Upload", json!({"path": req.path, "sessionId": session.session_id, "chunkSize": chunk_size}), vault_id));
	Ok((outcome, session))
}


// vim: ts=4
