//! `notesyncd`: the sync server binary.
//!
//! Exit codes, per spec.md §6: `0` clean shutdown, `1` invalid
//! configuration, `2` fatal startup error, `3` repository storage
//! unreachable.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use notesync::config::ServerConfig;
use notesync::logging;
use notesync::server;
use notesync::SyncError;

#[derive(Debug, Parser)]
#[command(name = "notesyncd", version, about = "Multi-device note/file/folder/setting sync server")]
struct Cli {
	/// Address the session listener binds to, e.g. `0.0.0.0:7420`.
	#[arg(long)]
	bind: Option<String>,

	/// Root directory for persisted state and the local blob store.
	#[arg(long)]
	data_dir: Option<PathBuf>,

	/// Chunk size for uploads/downloads, as `<n>{B|KB|MB}`.
	#[arg(long)]
	chunk_size: Option<String>,

	/// Tracing `EnvFilter` default level, overridden by `RUST_LOG`.
	#[arg(long, default_value = "info")]
	log_level: String,
}

fn build_config(cli: Cli) -> Result<ServerConfig, String> {
	let mut config = ServerConfig::default();
	if let Some(bind) = cli.bind {
		config.bind_addr = bind;
	}
	if let Some(data_dir) = cli.data_dir {
		config.data_dir = data_dir;
	}
	if let Some(chunk_size) = cli.chunk_size {
		config.chunk_size = ServerConfig::parse_size(&chunk_size)?;
	}
	config.log_level = cli.log_level;
	config.validate()?;
	Ok(config)
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	let log_level = cli.log_level.clone();

	let config = match build_config(cli) {
		Ok(c) => c,
		Err(message) => {
			eprintln!("invalid configuration: {}", message);
			return ExitCode::from(1);
		}
	};

	logging::init_tracing_with_level(&log_level);

	let runtime = match tokio::runtime::Runtime::new() {
		Ok(rt) => rt,
		Err(e) => {
			eprintln!("failed to start async runtime: {}", e);
			return ExitCode::from(2);
		}
	};

	match runtime.block_on(server::run(config)) {
		Ok(()) => ExitCode::SUCCESS,
		Err(SyncError::Fatal { message }) => {
			logging::error!(message = %message, "fatal startup error");
			ExitCode::from(2)
		}
		Err(SyncError::Repo(e)) => {
			logging::error!(error = %e, "repository storage unreachable");
			ExitCode::from(3)
		}
		Err(e) => {
			logging::error!(error = %e, "server exited with an error");
			ExitCode::from(2)
		}
	}
}

// vim: ts=4
