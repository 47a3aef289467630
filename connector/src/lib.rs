//! Pryv connector - multi-connection synchronization engine.
//!
//! Pulls users, streams and events from one or more remote accounts into the
//! fixed tables declared by [`pryv_wdc::schema`].
//!
//! # Architecture
//!
//! ```text
//! endpoint text / campaign link
//!          ↓
//!   descriptor parser ──→ credential vault
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       ConnectionPool                     │
//! │  - built lazily from credentials         │
//! │  - validated once (concurrent probes)    │
//! └─────────────────────────────────────────┘
//!          ↓
//!   for_each_connection (sequential, skips invalid)
//!          ↓
//!   event pipeline / stream flattening → rows
//!          ↓
//!        Host
//! ```
//!
//! # Core Types
//!
//! - [`Connection`] - Remote account client (HTTP in [`pryv`], in-memory in [`memory`])
//! - [`ConnectionPool`] - Owner of the connections of a run
//! - [`Session`] - Host lifecycle and interactive operations
//!
//! # Gathering a table
//!
//! ```no_run
//! use pryv_connector::pryv::PryvConnectionFactory;
//! use pryv_connector::Session;
//! use pryv_wdc::config::WdcConfig;
//! use pryv_wdc::credentials::MemoryVault;
//! use pryv_wdc::host::RecordingHost;
//! use pryv_wdc::TableId;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut session = Session::new(
//!     WdcConfig::default(),
//!     Arc::new(MemoryVault::new()),
//!     Arc::new(PryvConnectionFactory::default()),
//! );
//! let host = RecordingHost::new();
//!
//! session.load_endpoints("https://token@alice.pryv.me/", &host).await?;
//! let filter = session.submit_filter(0, 1_700_000_000, None, &host)?;
//! session
//!     .get_data(TableId::NumericEvents, &filter.connection_data, &host)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod campaign;
pub mod connection;
pub mod descriptor;
pub mod iterator;
pub mod memory;
pub mod pipeline;
pub mod pool;
pub mod pryv;
pub mod session;
pub mod validator;

pub use connection::{Connection, ConnectionFactory, EventDelivery};
pub use descriptor::{ConnectionDescriptor, ConnectionSource, DescriptorError};
pub use iterator::{for_each_connection, IterationSummary};
pub use pool::{ConnectionPool, PooledConnection, Validity};
pub use session::{RunError, RunState, Session};
