//! Session registry, per spec.md §4.1.
//!
//! State is `UserId -> { clients, chunkSessions }`, one reader-writer
//! lock per user slot. `Broadcast` snapshots receivers under the read
//! lock, releases it, then dispatches — a slow receiver only blocks
//! itself, never the sender or its siblings.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use uuid::Uuid;

use crate::chunk::ChunkSession;
use crate::codec::Frame;
use crate::logging::debug;
use crate::session::{Client, TraceId};

struct UserHub {
	clients: RwLock<HashMap<Uuid, Arc<Client>>>,
	chunk_sessions: RwLock<HashMap<String, Arc<ChunkSession>>>,
}

impl UserHub {
	fn new() -> Self {
		UserHub { clients: RwLock::new(HashMap::new()), chunk_sessions: RwLock::new(HashMap::new()) }
	}
}

/// The sole in-memory shared state of the server (spec.md §5): client
/// connections and upload sessions, keyed per user.
pub struct SessionRegistry {
	users: RwLock<HashMap<String, Arc<UserHub>>>,
}

impl SessionRegistry {
	pub fn new() -> Self {
		SessionRegistry { users: RwLock::new(HashMap::new()) }
	}

	fn hub_for(&self, owner: &str) -> Arc<UserHub> {
		if let Some(hub) = self.users.read().unwrap().get(owner) {
			return hub.clone();
		}
		let mut users = self.users.write().unwrap();
		users.entry(owner.to_string()).or_insert_with(|| Arc::new(UserHub::new())).clone()
	}

	pub fn register(&self, client: Arc<Client>) {
		let hub = self.hub_for(&client.owner);
		hub.clients.write().unwrap().insert(client.id, client);
	}

	pub fn unregister(&self, owner: &str, client_id: Uuid) {
		let hub = self.hub_for(owner);
		hub.clients.write().unwrap().remove(&client_id);
	}

	/// Delivers `frame` to every client of `owner` whose most recent
	/// sync scope matches `vault`. `exclude_origin`, if set, skips that
	/// client (spec.md §8 property 3, "broadcast exclusion"). `origin_trace`
	/// is logged alongside each receiving session's trace id at `debug`,
	/// per spec.md §1.2's session correlation guarantee.
	///
	/// Delivery is best-effort: a receiver whose outbound queue is full
	/// is disconnected rather than allowed to stall the broadcast.
	pub fn broadcast(&self, owner: &str, vault: &str, frame: Frame, exclude_origin: Option<Uuid>, origin_trace: &TraceId) {
		let hub = self.hub_for(owner);
		let receivers: Vec<Arc<Client>> = {
			let clients = hub.clients.read().unwrap();
			clients
				.values()
				.filter(|c| Some(c.id) != exclude_origin && c.scoped_to(vault))
				.cloned()
				.collect()
		};

		let mut disconnected = Vec::new();
		for client in receivers {
			debug!(origin_trace = %origin_trace, receiver_trace = %client.trace_id, "broadcasting frame");
			if client.outbound.try_send(frame.clone()).is_err() {
				disconnected.push(client.id);
			}
		}
		if !disconnected.is_empty() {
			let mut clients = hub.clients.write().unwrap();
			for id in disconnected {
				clients.remove(&id);
			}
		}
	}

	pub fn get_chunk_session(&self, owner: &str, session_id: &str) -> Option<Arc<ChunkSession>> {
		let hub = self.hub_for(owner);
		let sessions = hub.chunk_sessions.read().unwrap();
		sessions.get(session_id).cloned()
	}

	pub fn set_chunk_session(&self, owner: &str, session: Arc<ChunkSession>) {
		let hub = self.hub_for(owner);
		hub.chunk_sessions.write().unwrap().insert(session.session_id.clone(), session);
	}

	pub fn remove_chunk_session(&self, owner: &str, session_id: &str) -> Option<Arc<ChunkSession>> {
		let hub = self.hub_for(owner);
		hub.chunk_sessions.write().unwrap().remove(session_id)
	}

	/// Removes and returns every upload session across all users whose
	/// idle time exceeds `timeout`, for the periodic cleanup sweep
	/// (spec.md §4.6).
	pub fn sweep_expired_chunk_sessions(&self, timeout: Duration) -> Vec<Arc<ChunkSession>> {
		let users = self.users.read().unwrap();
		let mut expired = Vec::new();
		for hub in users.values() {
			let mut sessions = hub.chunk_sessions.write().unwrap();
			let expired_ids: Vec<String> = sessions.iter().filter(|(_, s)| s.is_expired(timeout)).map(|(id, _)| id.clone()).collect();
			for id in expired_ids {
				if let Some(s) = sessions.remove(&id) {
					expired.push(s);
				}
			}
		}
		expired
	}
}

impl Default for SessionRegistry {
	fn default() -> Self {
		Self::new()
	}
}


// vim: ts=4
