//! Shared harness for the end-to-end tests: a real `notesync` server
//! bound to an ephemeral port, plus a thin client that speaks the wire
//! framing directly (4-byte length prefix, JSON text frames, binary
//! chunk frames).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use notesync::config::ServerConfig;
use notesync::server::{self, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A running server instance, its state handle (for seeding data
/// directly through the repository before a client connects), and the
/// temp dir backing its storage, kept alive for the test's duration.
pub struct TestServer {
	pub addr: SocketAddr,
	pub state: Arc<AppState>,
	_data_dir: TempDir,
}

impl TestServer {
	pub async fn start() -> Self {
		Self::start_with(|_| {}).await
	}

	/// Starts a server after letting the caller tweak the config
	/// (e.g. shrink `upload_timeout` for a sweep test).
	pub async fn start_with(tweak: impl FnOnce(&mut ServerConfig)) -> Self {
		let data_dir = tempfile::tempdir().unwrap();
		let mut config = ServerConfig::default();
		config.data_dir = data_dir.path().to_path_buf();
		config.bind_addr = "127.0.0.1:0".to_string();
		tweak(&mut config);

		let state = Arc::new(AppState::open(config).unwrap());
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(server::serve(state.clone(), listener));

		TestServer { addr, state, _data_dir: data_dir }
	}
}

pub struct TestClient {
	stream: TcpStream,
}

impl TestClient {
	pub async fn connect(addr: SocketAddr) -> Self {
		let stream = TcpStream::connect(addr).await.unwrap();
		stream.set_nodelay(true).ok();
		TestClient { stream }
	}

	/// A `context` object for the first frame on a connection, per the
	/// identity handshake: `{owner, clientName, clientVersion,
	/// offlineSyncStrategy}`.
	pub fn handshake(owner: &str, client_name: &str, strategy: &str) -> Value {
		serde_json::json!({
			"owner": owner,
			"clientName": client_name,
			"clientVersion": "1.0",
			"offlineSyncStrategy": strategy,
		})
	}

	pub async fn send(&mut self, action: &str, data: Value, vault: &str, context: Option<Value>) {
		let mut obj = serde_json::json!({ "action": action, "data": data, "vault": vault });
		if let Some(c) = context {
			obj["context"] = c;
		}
		self.send_raw(obj).await;
	}

	async fn send_raw(&mut self, obj: Value) {
		let bytes = serde_json::to_vec(&obj).unwrap();
		self.stream.write_all(&(bytes.len() as u32).to_be_bytes()).await.unwrap();
		self.stream.write_all(&bytes).await.unwrap();
	}

	pub async fn send_binary(&mut self, payload: &[u8]) {
		self.stream.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
		self.stream.write_all(payload).await.unwrap();
	}

	pub async fn recv(&mut self) -> Value {
		let mut len_buf = [0u8; 4];
		self.stream.read_exact(&mut len_buf).await.unwrap();
		let len = u32::from_be_bytes(len_buf) as usize;
		let mut buf = vec![0u8; len];
		self.stream.read_exact(&mut buf).await.unwrap();
		serde_json::from_slice(&buf).unwrap()
	}

    pub async fn recv_timeout(&mut self, d: Duration) -> Option<Value> {
        tokio::time::timeout(d, self.recv()).await.ok()
    }
}
