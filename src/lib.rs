//! # notesync - a multi-device note, file, folder and setting sync server
//!
//! notesync accepts concurrent client connections that each hold a sync
//! cursor over a per-user vault, reconciling client and server state for
//! four resource kinds (notes, files, folders, settings) and fanning out
//! changes to sibling sessions of the same user. Notes additionally
//! support an offline three-way merge instead of last-writer-wins.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use notesync::config::ServerConfig;
//! use notesync::server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     server::run(config).await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod blobstore;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod diff;
pub mod error;
pub mod hashutil;
pub mod logging;
pub mod merge;
pub mod model;
pub mod pathutil;
pub mod registry;
pub mod repo;
pub mod server;
pub mod services;
pub mod session;
pub mod sync;

// Re-export commonly used types and functions.
pub use config::ServerConfig;
pub use error::SyncError;
pub use model::{Action, File, Folder, Note, ResourceKind, Setting, Vault};
pub use server::{run, AppState};
pub use session::{Client, OfflineSyncStrategy};

// vim: ts=4
