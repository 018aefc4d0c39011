//! Message codec: text frame framing, typed request binding, and the
//! binary chunk frame format, per spec.md §4.2 and §6.
//!
//! Incoming requests are bound into a tagged sum type (`ClientRequest`)
//! rather than dispatched by matching on the raw `action` string at each
//! call site, per the "avoid string-based reflection" redesign note in
//! spec.md §9.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug)]
pub enum CodecError {
	UnknownAction { action: String },
	InvalidParams { fields: Vec<(String, String)> },
	MalformedBinaryFrame { reason: String },
}

impl fmt::Display for CodecError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CodecError::UnknownAction { action } => write!(f, "unknown action: {}", action),
			CodecError::InvalidParams { fields } => {
				write!(f, "invalid params: ")?;
				for (i, (field, msg)) in fields.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{}: {}", field, msg)?;
				}
				Ok(())
			}
			CodecError::MalformedBinaryFrame { reason } => write!(f, "malformed binary frame: {}", reason),
		}
	}
}

impl Error for CodecError {}

/// An outbound message: either a JSON text frame or a raw binary chunk
/// frame. This is the unit the session registry's outbound queue moves.
#[derive(Debug, Clone)]
pub enum Frame {
	Text(Value),
	Binary(Vec<u8>),
}

/// Wire shape of an incoming text frame, before `data` is bound into a
/// typed request.
#[derive(Debug, Deserialize)]
pub struct RawTextFrame {
	pub action: String,
	#[serde(default)]
	pub data: Value,
	#[serde(rename = "traceId", default)]
	pub trace_id: Option<String>,
	#[serde(default)]
	pub vault: Option<String>,
	#[serde(default)]
	pub context: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
	pub path: String,
	pub path_hash: String,
	#[serde(default)]
	pub content_hash: Option<String>,
	pub mtime: i64,
	#[serde(default)]
	pub size: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncDelItem {
	pub path: String,
	pub path_hash: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
	pub vault: String,
	#[serde(default)]
	pub last_time: i64,
	#[serde(default)]
	pub items: Vec<SyncItem>,
	#[serde(default)]
	pub del_items: Vec<SyncDelItem>,
	#[serde(default)]
	pub missing_items: Vec<SyncItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyRequest {
	pub vault: String,
	pub path: String,
	pub path_hash: String,
	#[serde(default)]
	pub content: Option<String>,
	#[serde(default)]
	pub content_hash: Option<String>,
	#[serde(default)]
	pub ctime: i64,
	#[serde(default)]
	pub mtime: i64,
	#[serde(default)]
	pub client_name: Option<String>,
	/// The client's asserted ancestor `contentHash`, driving the
	/// three-way merge base lookup; see glossary "BaseHash".
	#[serde(default)]
	pub base_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
	pub vault: String,
	pub path: String,
	pub path_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
	pub vault: String,
	pub path: String,
	pub path_hash: String,
	pub old_path: String,
	pub old_path_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
	pub vault: String,
	pub path: String,
	pub path_hash: String,
	#[serde(default)]
	pub content_hash: Option<String>,
	#[serde(default)]
	pub mtime: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RePushRequest {
	pub vault: String,
	pub path: String,
	pub path_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadCheckRequest {
	pub vault: String,
	pub path: String,
	pub path_hash: String,
	pub content_hash: String,
	pub mtime: i64,
	pub size: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunkDownloadRequest {
	pub vault: String,
	pub path: String,
	pub path_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingClearRequest {
	pub vault: String,
}

/// Every client → server request, bound from its wire `action` tag.
#[derive(Debug, Clone)]
pub enum ClientRequest {
	NoteSync(SyncRequest),
	NoteModify(ModifyRequest),
	NoteDelete(DeleteRequest),
	NoteRename(RenameRequest),
	NoteCheck(CheckRequest),
	NoteRePush(RePushRequest),
	FileSync(SyncRequest),
	FileUploadCheck(FileUploadCheckRequest),
	FileDelete(DeleteRequest),
	FileRename(RenameRequest),
	FileChunkDownload(FileChunkDownloadRequest),
	FileRePush(RePushRequest),
	FolderSync(SyncRequest),
	FolderModify(ModifyRequest),
	FolderDelete(DeleteRequest),
	FolderRename(RenameRequest),
	SettingSync(SyncRequest),
	SettingModify(ModifyRequest),
	SettingDelete(DeleteRequest),
	SettingCheck(CheckRequest),
	SettingClear(SettingClearRequest),
}

fn bind<T: for<'de> Deserialize<'de>>(data: Value) -> Result<T, CodecError> {
	serde_json::from_value(data).map_err(|e| CodecError::InvalidParams { fields: vec![("data".to_string(), e.to_string())] })
}

/// Binds a raw frame's `action`/`data` pair into a typed request.
pub fn bind_request(raw: RawTextFrame) -> Result<ClientRequest, CodecError> {
	let data = raw.data;
	match raw.action.as_str() {
		"NoteSync" => Ok(ClientRequest::NoteSync(bind(data)?)),
		"NoteModify" => Ok(ClientRequest::NoteModify(bind(data)?)),
		"NoteDelete" => Ok(ClientRequest::NoteDelete(bind(data)?)),
		"NoteRename" => Ok(ClientRequest::NoteRename(bind(data)?)),
		"NoteCheck" => Ok(ClientRequest::NoteCheck(bind(data)?)),
		"NoteRePush" => Ok(ClientRequest::NoteRePush(bind(data)?)),
		"FileSync" => Ok(ClientRequest::FileSync(bind(data)?)),
		"FileUploadCheck" => Ok(ClientRequest::FileUploadCheck(bind(data)?)),
		"FileDelete" => Ok(ClientRequest::FileDelete(bind(data)?)),
		"FileRename" => Ok(ClientRequest::FileRename(bind(data)?)),
		"FileChunkDownload" => Ok(ClientRequest::FileChunkDownload(bind(data)?)),
		"FileRePush" => Ok(ClientRequest::FileRePush(bind(data)?)),
		"FolderSync" => Ok(ClientRequest::FolderSync(bind(data)?)),
		"FolderModify" => Ok(ClientRequest::FolderModify(bind(data)?)),
		"FolderDelete" => Ok(ClientRequest::FolderDelete(bind(data)?)),
		"FolderRename" => Ok(ClientRequest::FolderRename(bind(data)?)),
		"SettingSync" => Ok(ClientRequest::SettingSync(bind(data)?)),
		"SettingModify" => Ok(ClientRequest::SettingModify(bind(data)?)),
		"SettingDelete" => Ok(ClientRequest::SettingDelete(bind(data)?)),
		"SettingCheck" => Ok(ClientRequest::SettingCheck(bind(data)?)),
		"SettingClear" => Ok(ClientRequest::SettingClear(bind(data)?)),
		other => Err(CodecError::UnknownAction { action: other.to_string() }),
	}
}

/// Builds an outbound text frame `{action, data, vault?}`.
pub fn server_frame(action: &str, data: impl Serialize, vault: Option<&str>) -> Frame {
	let mut obj = serde_json::json!({ "action": action, "data": data });
	if let Some(v) = vault {
		obj["vault"] = Value::String(v.to_string());
	}
	Frame::Text(obj)
}

const BINARY_FRAME_TAG: &[u8; 2] = b"00";
const SESSION_ID_LEN: usize = 36;
const HEADER_LEN: usize = 2 + SESSION_ID_LEN + 4;

/// Encodes a vault-attachment chunk frame: `"00" ‖ sessionId ‖ chunkIndex(BE) ‖ bytes`.
pub fn encode_chunk_frame(session_id: &str, chunk_index: u32, bytes: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(HEADER_LEN + bytes.len());
	out.extend_from_slice(BINARY_FRAME_TAG);
	let mut sid = session_id.as_bytes().to_vec();
	sid.resize(SESSION_ID_LEN, b' ');
	out.extend_from_slice(&sid);
	out.extend_from_slice(&chunk_index.to_be_bytes());
	out.extend_from_slice(bytes);
	out
}

/// Decodes a binary chunk frame into `(sessionId, chunkIndex, payload)`.
pub fn decode_chunk_frame(frame: &[u8]) -> Result<(String, u32, &[u8]), CodecError> {
	if frame.len() < HEADER_LEN {
		return Err(CodecError::MalformedBinaryFrame { reason: "frame shorter than header".to_string() });
	}
	if &frame[0..2] != BINARY_FRAME_TAG {
		return Err(CodecError::MalformedBinaryFrame { reason: "unknown type tag".to_string() });
	}
	let session_id = String::from_utf8_lossy(&frame[2..2 + SESSION_ID_LEN]).trim_end().to_string();
	let mut idx_bytes = [0u8; 4];
	idx_bytes.copy_from_slice(&frame[2 + SESSION_ID_LEN..HEADER_LEN]);
	let chunk_index = u32::from_be_bytes(idx_bytes);
	Ok((session_id, chunk_index, &frame[HEADER_LEN..]))
}


// vim: ts=4
