//! Sync coordinators: the four protocol handlers driving the sync
//! state machines, per spec.md §4.5.

mod file;
mod folder;
mod note;
mod setting;

pub use file::{
	file_chunk_download_prepare, file_delete, file_re_push, file_rename, file_sync, file_upload_check, file_upload_finish, DownloadPlan,
};
pub use folder::{folder_delete, folder_modify, folder_rename, folder_sync};
pub use note::{note_check, note_delete, note_modify, note_re_push, note_rename, note_sync};
pub use setting::{setting_check, setting_clear, setting_delete, setting_modify, setting_sync};

use serde::Serialize;

use crate::codec::{server_frame, Frame};

/// Tallies returned in every `XxxSyncEnd` frame, per spec.md §4.5.1.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncCounts {
	pub need_modify: i64,
	pub need_upload: i64,
	pub need_delete: i64,
	pub need_sync_mtime: i64,
}

/// A frame queued for broadcast to sibling sessions, with whether the
/// originating client itself should be skipped (spec.md §8 property 3).
#[derive(Debug, Clone)]
pub struct BroadcastFrame {
	pub frame: Frame,
	pub exclude_origin: bool,
}

/// The frames one coordinator call produces: those to send back to the
/// requesting client, in enqueue order, and those to fan out to
/// siblings of the same user scoped to the vault.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
	pub to_caller: Vec<Frame>,
	pub to_broadcast: Vec<BroadcastFrame>,
}

impl SyncOutcome {
	fn broadcast(&mut self, frame: Frame, exclude_origin: bool) {
		self.to_broadcast.push(BroadcastFrame { frame, exclude_origin });
	}
}

pub(crate) fn frame(kind: &str, suffix: &str, data: impl Serialize, vault: &str) -> Frame {
	server_frame(&format!("{}{}", kind, suffix), data, Some(vault))
}

pub(crate) fn sync_end_frame(kind: &str, counts: SyncCounts, last_time: i64, vault: &str) -> Frame {
	frame(
		kind,
		"SyncEnd",
		serde_json::json!({
			"lastTime": last_time,
			"needModifyCount": counts.need_modify,
			"needUploadCount": counts.need_upload,
			"needDeleteCount": counts.need_delete,
			"needSyncMtimeCount": counts.need_sync_mtime,
		}),
		vault,
	)
}

// vim: ts=4
