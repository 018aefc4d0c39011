//! Session listener: the TCP accept loop, per-connection framing, and
//! request dispatch into the `sync` coordinators, per spec.md §4.1 and §6.
//!
//! Wire framing is a 4-byte big-endian length prefix followed by the
//! payload — a UTF-8 JSON object for a text frame (`RawTextFrame`), or a
//! binary chunk frame (§4.2) whose first two bytes are the `"00"` tag.
//! A connection's first frame must carry a `context` object identifying
//! the session (`owner`, `clientName`, `clientVersion`,
//! `offlineSyncStrategy`); every frame after that is a sync request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::blobstore::{BlobStore, LocalBlobStore};
use crate::chunk;
use crate::codec::{bind_request, decode_chunk_frame, ClientRequest, Frame, RawTextFrame};
use crate::config::ServerConfig;
use crate::error::SyncError;
use crate::logging::{debug, info, warn};
use crate::registry::SessionRegistry;
use crate::repo::Repo;
use crate::services::{FileService, FolderService, NoteService, SettingService};
use crate::session::{Client, OfflineSyncStrategy};
use crate::sync::{self, SyncOutcome};

const LENGTH_PREFIX_BYTES: usize = 4;
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;
const CHUNK_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Everything a connection handler needs: the repository, blob store,
/// and session registry, plus the resolved config. Cloned behind an
/// `Arc` into every spawned task.
pub struct AppState {
	pub repo: Arc<Repo>,
	pub blob_store: Arc<dyn BlobStore>,
	pub registry: Arc<SessionRegistry>,
	pub config: ServerConfig,
}

impl AppState {
	pub fn open(config: ServerConfig) -> Result<Self, SyncError> {
		std::fs::create_dir_all(&config.data_dir)?;
		let repo = Arc::new(Repo::open(&config.data_dir.join("notesync.redb"))?);
		let blob_root = config.data_dir.join("blobs");
		std::fs::create_dir_all(&blob_root)?;
		let blob_store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(blob_root));
		let state = AppState { repo, blob_store, registry: Arc::new(SessionRegistry::new()), config };
		std::fs::create_dir_all(state.upload_dir())?;
		Ok(state)
	}

	fn upload_dir(&self) -> PathBuf {
		self.config.data_dir.join("uploads")
	}

	fn notes(&self) -> NoteService {
		NoteService { repo: self.repo.clone() }
	}

	fn files(&self) -> FileService {
		FileService { repo: self.repo.clone() }
	}

	fn folders(&self) -> FolderService {
		FolderService { repo: self.repo.clone() }
	}

	fn settings(&self) -> SettingService {
		SettingService { repo: self.repo.clone() }
	}
}

/// Binds `config.bind_addr` and serves it forever. Thin wrapper around
/// `serve` for the common case where the caller doesn't need the bound
/// address back (tests bind their own ephemeral listener instead, via
/// `serve`, to learn the assigned port).
pub async fn run(config: ServerConfig) -> Result<(), SyncError> {
	config.validate().map_err(|message| SyncError::Fatal { message })?;
	let state = Arc::new(AppState::open(config)?);

	let listener = TcpListener::bind(&state.config.bind_addr).await?;
	info!(addr = %state.config.bind_addr, "notesyncd listening");
	serve(state, listener).await
}

/// Accepts connections on an already-bound listener forever, spawning a
/// handler task per connection plus one periodic upload-sweep task.
pub async fn serve(state: Arc<AppState>, listener: TcpListener) -> Result<(), SyncError> {
	tokio::spawn(sweep_chunk_sessions(state.clone()));

	loop {
		let (stream, peer) = listener.accept().await?;
		let state = state.clone();
		tokio::spawn(async move {
			if let Err(e) = handle_connection(stream, state).await {
				warn!(%peer, error = %e, "connection ended with error");
			}
		});
	}
}

async fn sweep_chunk_sessions(state: Arc<AppState>) {
	let mut tick = tokio::time::interval(CHUNK_SWEEP_INTERVAL);
	loop {
		tick.tick().await;
		let expired = state.registry.sweep_expired_chunk_sessions(state.config.upload_timeout);
		for session in expired {
			debug!(session_id = %session.session_id, "cleaning up expired upload session");
			let _ = session.cleanup();
		}
	}
}

async fn handle_connection(stream: TcpStream, state: Arc<AppState>) -> Result<(), SyncError> {
	stream.set_nodelay(true).ok();
	let (mut reader, mut writer) = stream.into_split();

	let first = match read_frame(&mut reader).await? {
		Some(bytes) => bytes,
		None => return Ok(()),
	};
	let raw = match parse_text_frame(&first) {
		Ok(raw) => raw,
		Err(e) => return reject_handshake(&mut writer, e).await,
	};
	let context = match raw.context.clone().ok_or_else(|| {
		SyncError::InvalidParams { fields: vec![("context".to_string(), "required on the first frame".to_string())] }
	}) {
		Ok(context) => context,
		Err(e) => return reject_handshake(&mut writer, e).await,
	};
	let owner = match context
		.get("owner")
		.and_then(|v| v.as_str())
		.ok_or_else(|| SyncError::InvalidParams { fields: vec![("context.owner".to_string(), "required".to_string())] })
	{
		Ok(owner) => owner.to_string(),
		Err(e) => return reject_handshake(&mut writer, e).await,
	};
	let client_name = context.get("clientName").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
	let client_version = context.get("clientVersion").and_then(|v| v.as_str()).unwrap_or("").to_string();
	let strategy =
		context.get("offlineSyncStrategy").and_then(|v| v.as_str()).map(OfflineSyncStrategy::from_wire).unwrap_or(OfflineSyncStrategy::None);

	let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(state.config.queue_capacity);
	let client = Arc::new(Client::new(owner.clone(), client_name, client_version, strategy, state.config.diff_merge_ttl, outbound_tx));
	let span = client.span.clone();
	span.in_scope(|| info!(owner = %client.owner, client = %client.client_name, "client connected"));
	state.registry.register(client.clone());

	run_session(state.clone(), client.clone(), reader, writer, outbound_rx, raw).instrument(span.clone()).await;

	state.registry.unregister(&owner, client.id);
	span.in_scope(|| info!(owner = %owner, "client disconnected"));
	Ok(())
}

/// Drives one session's frames to completion, inside `client.span` so
/// every log line below — not just the connect/disconnect lines in the
/// caller — carries the session's trace id.
async fn run_session(
	state: Arc<AppState>,
	client: Arc<Client>,
	mut reader: OwnedReadHalf,
	writer: OwnedWriteHalf,
	outbound_rx: mpsc::Receiver<Frame>,
	first: RawTextFrame,
) {
	let writer_task = tokio::spawn(run_writer(writer, outbound_rx));

	if let Err(e) = handle_text_frame(&state, &client, first).await {
		warn!(error = %e, "request failed");
		reply_error(&client, &e);
	}

	loop {
		let bytes = match read_frame(&mut reader).await {
			Ok(Some(b)) => b,
			Ok(None) => break,
			Err(e) => {
				warn!(error = %e, "frame read failed");
				break;
			}
		};

		if bytes.len() >= 2 && &bytes[0..2] == b"00" {
			if let Err(e) = handle_binary_frame(&state, &client, &bytes).await {
				warn!(error = %e, "chunk write failed");
				reply_error(&client, &e);
			}
			continue;
		}

		match parse_text_frame(&bytes) {
			Ok(raw) => {
				if let Err(e) = handle_text_frame(&state, &client, raw).await {
					warn!(error = %e, "request failed");
					reply_error(&client, &e);
				}
			}
			Err(e) => {
				warn!(error = %e, "malformed frame");
				reply_error(&client, &e);
			}
		}
	}

	drop(client);
	let _ = writer_task.await;
}

async fn run_writer(mut writer: OwnedWriteHalf, mut outbound_rx: mpsc::Receiver<Frame>) {
	while let Some(frame) = outbound_rx.recv().await {
		if write_frame(&mut writer, &frame).await.is_err() {
			break;
		}
	}
}

async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>, SyncError> {
	let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
	match reader.read_exact(&mut len_buf).await {
		Ok(_) => {}
		Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(e) => return Err(SyncError::Io(e)),
	}
	let len = u32::from_be_bytes(len_buf);
	if len > MAX_FRAME_LEN {
		return Err(SyncError::Fatal { message: format!("frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN) });
	}
	let mut buf = vec![0u8; len as usize];
	reader.read_exact(&mut buf).await?;
	Ok(Some(buf))
}

/// Writes a typed error frame for a handshake failure, before the
/// connection has a registered `Client` (and so no outbound queue) to
/// reply through. Always returns `Ok(())`: the handshake is over either
/// way once this runs.
async fn reject_handshake(writer: &mut OwnedWriteHalf, e: SyncError) -> Result<(), SyncError> {
	warn!(error = %e, "handshake rejected");
	let _ = write_frame(writer, &e.to_frame(None)).await;
	Ok(())
}

/// Queues a typed error frame back to the client, per spec.md §7's
/// "reply with a typed error frame" propagation policy.
fn reply_error(client: &Arc<Client>, e: &SyncError) {
	let vault = client.current_vault.lock().unwrap().clone();
	let _ = client.outbound.try_send(e.to_frame(vault.as_deref()));
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Frame) -> Result<(), SyncError> {
	let bytes = match frame {
		Frame::Text(v) => serde_json::to_vec(v).map_err(|e| SyncError::Other { message: e.to_string() })?,
		Frame::Binary(b) => b.clone(),
	};
	writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
	writer.write_all(&bytes).await?;
	Ok(())
}

fn parse_text_frame(bytes: &[u8]) -> Result<RawTextFrame, SyncError> {
	serde_json::from_slice(bytes).map_err(|e| SyncError::InvalidParams { fields: vec![("frame".to_string(), e.to_string())] })
}

async fn handle_text_frame(state: &Arc<AppState>, client: &Arc<Client>, raw: RawTextFrame) -> Result<(), SyncError> {
	let request = bind_request(raw)?;
	let vault_name = request_vault(&request).to_string();
	let vault = state.repo.find_or_create_vault(&client.owner, &vault_name)?;
	client.set_current_vault(&vault.id);

	let outcome = dispatch(state, client, &vault.id, request).await?;
	deliver(state, client, outcome);
	Ok(())
}

fn request_vault(request: &ClientRequest) -> &str {
	use ClientRequest::*;
	match request {
		NoteSync(r) | FileSync(r) | FolderSync(r) | SettingSync(r) => &r.vault,
		NoteModify(r) | FolderModify(r) | SettingModify(r) => &r.vault,
		NoteDelete(r) | FileDelete(r) | FolderDelete(r) | SettingDelete(r) => &r.vault,
		NoteRename(r) | FileRename(r) | FolderRename(r) => &r.vault,
		NoteCheck(r) | SettingCheck(r) => &r.vault,
		NoteRePush(r) | FileRePush(r) => &r.vault,
		FileUploadCheck(r) => &r.vault,
		FileChunkDownload(r) => &r.vault,
		SettingClear(r) => &r.vault,
	}
}

async fn dispatch(state: &Arc<AppState>, client: &Arc<Client>, vault_id: &str, request: ClientRequest) -> Result<SyncOutcome, SyncError> {
	use ClientRequest::*;
	let owner = client.owner.as_str();
	match request {
		NoteSync(req) => sync::note_sync(owner, vault_id, client, &state.notes(), &req),
		NoteModify(req) => sync::note_modify(owner, vault_id, client, &state.notes(), &req),
		NoteDelete(req) => sync::note_delete(owner, vault_id, &state.notes(), &req),
		NoteRename(req) => sync::note_rename(owner, vault_id, &state.notes(), &req),
		NoteCheck(req) => sync::note_check(owner, vault_id, &state.notes(), &req),
		NoteRePush(req) => Ok(sync::note_re_push(client, &req)),

		FileSync(req) => {
			let (outcome, sessions) =
				sync::file_sync(owner, vault_id, &state.files(), &req, Some(client.client_name.clone()), state.config.chunk_size, &state.upload_dir())?;
			for session in sessions {
				state.registry.set_chunk_session(owner, Arc::new(session));
			}
			Ok(outcome)
		}
		FileUploadCheck(req) => {
			let (outcome, session) =
				sync::file_upload_check(owner, vault_id, &state.files(), &req, Some(client.client_name.clone()), state.config.chunk_size, &state.upload_dir())?;
			if let Some(session) = session {
				state.registry.set_chunk_session(owner, Arc::new(session));
			}
			Ok(outcome)
		}
		FileDelete(req) => sync::file_delete(owner, vault_id, &state.files(), &req),
		FileRename(req) => sync::file_rename(owner, vault_id, &state.files(), &req),
		FileChunkDownload(req) => {
			let (outcome, plan) = sync::file_chunk_download_prepare(owner, vault_id, &state.files(), &req, state.config.chunk_size)?;
			if let Some(plan) = plan {
				spawn_download(state.clone(), client.clone(), plan);
			}
			Ok(outcome)
		}
		FileRePush(req) => {
			let (outcome, session) =
				sync::file_re_push(owner, vault_id, &state.files(), &req, Some(client.client_name.clone()), state.config.chunk_size, &state.upload_dir())?;
			state.registry.set_chunk_session(owner, Arc::new(session));
			Ok(outcome)
		}

		FolderSync(req) => sync::folder_sync(owner, vault_id, &state.folders(), &req),
		FolderModify(req) => sync::folder_modify(owner, vault_id, &state.folders(), &req),
		FolderDelete(req) => sync::folder_delete(owner, vault_id, &state.folders(), &req),
		FolderRename(req) => sync::folder_rename(owner, vault_id, &state.folders(), &req),

		SettingSync(req) => sync::setting_sync(owner, vault_id, &state.settings(), &req),
		SettingModify(req) => sync::setting_modify(owner, vault_id, &state.settings(), &req),
		SettingDelete(req) => sync::setting_delete(owner, vault_id, &state.settings(), &req),
		SettingCheck(req) => sync::setting_check(owner, vault_id, &state.settings(), &req),
		SettingClear(req) => sync::setting_clear(owner, vault_id, &state.settings(), &req),
	}
}

/// Spawns the async finish of a completed upload session: moves the
/// blob, records the file, and fans out the broadcast. Invoked once a
/// binary chunk frame completes the session (spec.md §4.6).
fn spawn_upload_finish(state: Arc<AppState>, client: Arc<Client>, session: Arc<chunk::ChunkSession>) {
	tokio::spawn(async move {
		let outcome = sync::file_upload_finish(&session.owner, &session.vault_id, &state.files(), state.blob_store.as_ref(), &session).await;
		match outcome {
			Ok(outcome) => deliver(&state, &client, outcome),
			Err(e) => warn!(error = %e, session_id = %session.session_id, "upload finish failed"),
		}
	});
}

fn spawn_download(state: Arc<AppState>, client: Arc<Client>, plan: sync::DownloadPlan) {
	tokio::spawn(async move {
		let reader = match state.blob_store.open(&plan.save_path).await {
			Ok(r) => r,
			Err(e) => {
				warn!(error = %e, "failed to open blob for download");
				return;
			}
		};
		if let Err(e) =
			chunk::stream_download(&plan.session_id, reader, plan.size, state.config.chunk_size, client.outbound.clone(), state.config.download_timeout).await
		{
			warn!(error = %e, "chunk download stream failed");
		}
	});
}

async fn handle_binary_frame(state: &Arc<AppState>, client: &Arc<Client>, bytes: &[u8]) -> Result<(), SyncError> {
	let (session_id, chunk_index, payload) = decode_chunk_frame(bytes)?;
	let session = state
		.registry
		.get_chunk_session(&client.owner, &session_id)
		.ok_or_else(|| SyncError::UploadSessionNotFound { session_id: session_id.clone() })?;

	// Per spec.md §4.6: on any fatal write error, cleanup the session
	// (close + unlink temp + remove entry) before replying with an error
	// frame, rather than leaving it to linger until the next sweep.
	match session.write_chunk(chunk_index, payload) {
		Ok(true) => {
			state.registry.remove_chunk_session(&client.owner, &session_id);
			spawn_upload_finish(state.clone(), client.clone(), session);
			Ok(())
		}
		Ok(false) => Ok(()),
		Err(e) => {
			state.registry.remove_chunk_session(&client.owner, &session_id);
			let _ = session.cleanup();
			Err(SyncError::UploadFailed { message: e.to_string() })
		}
	}
}

fn deliver(state: &Arc<AppState>, client: &Arc<Client>, outcome: SyncOutcome) {
	for frame in outcome.to_caller {
		let _ = client.outbound.try_send(frame);
	}
	let vault = client.current_vault.lock().unwrap().clone();
	let Some(vault) = vault else { return };
	for b in outcome.to_broadcast {
		let exclude = if b.exclude_origin { Some(client.id) } else { None };
		state.registry.broadcast(&client.owner, &vault, b.frame, exclude, &client.trace_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::{CheckRequest, DeleteRequest, FileChunkDownloadRequest, FileUploadCheckRequest, ModifyRequest, RePushRequest, RenameRequest, SettingClearRequest, SyncRequest};

	// request_vault is an exhaustive match over all 21 ClientRequest
	// variants; this pins down that every arm reaches the right field
	// rather than falling through to a neighbor's `.vault`.
	#[test]
	fn request_vault_covers_every_variant() {
		let sync_req = |vault: &str| SyncRequest { vault: vault.to_string(), ..Default::default() };

		assert_eq!(request_vault(&ClientRequest::NoteSync(sync_req("a"))), "a");
		assert_eq!(request_vault(&ClientRequest::FileSync(sync_req("b"))), "b");
		assert_eq!(request_vault(&ClientRequest::FolderSync(sync_req("c"))), "c");
		assert_eq!(request_vault(&ClientRequest::SettingSync(sync_req("d"))), "d");

		let modify = |vault: &str| ModifyRequest {
			vault: vault.to_string(),
			path: "p".to_string(),
			path_hash: "h".to_string(),
			content: None,
			content_hash: None,
			ctime: 0,
			mtime: 0,
			client_name: None,
			base_hash: None,
		};
		assert_eq!(request_vault(&ClientRequest::NoteModify(modify("e"))), "e");
		assert_eq!(request_vault(&ClientRequest::FolderModify(modify("f"))), "f");
		assert_eq!(request_vault(&ClientRequest::SettingModify(modify("g"))), "g");

		let delete = |vault: &str| DeleteRequest { vault: vault.to_string(), path: "p".to_string(), path_hash: "h".to_string() };
		assert_eq!(request_vault(&ClientRequest::NoteDelete(delete("h"))), "h");
		assert_eq!(request_vault(&ClientRequest::FileDelete(delete("i"))), "i");
		assert_eq!(request_vault(&ClientRequest::FolderDelete(delete("j"))), "j");
		assert_eq!(request_vault(&ClientRequest::SettingDelete(delete("k"))), "k");

		let rename = |vault: &str| RenameRequest {
			vault: vault.to_string(),
			path: "p".to_string(),
			path_hash: "h".to_string(),
			old_path: "op".to_string(),
			old_path_hash: "oh".to_string(),
		};
		assert_eq!(request_vault(&ClientRequest::NoteRename(rename("l"))), "l");
		assert_eq!(request_vault(&ClientRequest::FileRename(rename("m"))), "m");
		assert_eq!(request_vault(&ClientRequest::FolderRename(rename("n"))), "n");

		let check = |vault: &str| {
			CheckRequest { vault: vault.to_string(), path: "p".to_string(), path_hash: "h".to_string(), content_hash: None, mtime: 0 }
		};
		assert_eq!(request_vault(&ClientRequest::NoteCheck(check("o"))), "o");
		assert_eq!(request_vault(&ClientRequest::SettingCheck(check("p"))), "p");

		let re_push = |vault: &str| RePushRequest { vault: vault.to_string(), path: "p".to_string(), path_hash: "h".to_string() };
		assert_eq!(request_vault(&ClientRequest::NoteRePush(re_push("q"))), "q");
		assert_eq!(request_vault(&ClientRequest::FileRePush(re_push("r"))), "r");

		assert_eq!(
			request_vault(&ClientRequest::FileUploadCheck(FileUploadCheckRequest {
				vault: "s".to_string(),
				path: "p".to_string(),
				path_hash: "h".to_string(),
				content_hash: "ch".to_string(),
				mtime: 0,
				size: 0,
			})),
			"s"
		);
		assert_eq!(
			request_vault(&ClientRequest::FileChunkDownload(FileChunkDownloadRequest {
				vault: "t".to_string(),
				path: "p".to_string(),
				path_hash: "h".to_string(),
			})),
			"t"
		);
		assert_eq!(request_vault(&ClientRequest::SettingClear(SettingClearRequest { vault: "u".to_string() })), "u");
	}
}

// vim: ts=4
