//! docsync-core
//!
//! Keeps replicated documents consistent across server instances by
//! exchanging sync, ping and pong messages over a pub/sub transport.
//!
//! ```no_run
//! use std::sync::Arc;
//! use docsync_core::config::ProviderConfig;
//! use docsync_core::core_doc::ReplicatedDoc;
//! use docsync_core::core_sync::{MemoryHub, SyncProvider};
//!
//! # async fn run() -> docsync_core::core_sync::SyncResult<()> {
//! let hub = MemoryHub::new();
//! let doc = Arc::new(ReplicatedDoc::new());
//! let provider = SyncProvider::new(
//!     "notes",
//!     doc.clone(),
//!     0,
//!     Arc::new(hub.channel("notes")),
//!     ProviderConfig::default(),
//! );
//! provider.connect().await?;
//! doc.set("title", "hello").ok();
//! provider.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core_doc;
pub mod core_sync;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod test_utils;

pub use config::Config;
pub use core_doc::ReplicatedDoc;
pub use core_sync::{SyncError, SyncProvider, SyncResult};
pub use logging::{init_logging, LogLevel};
