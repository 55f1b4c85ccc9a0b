//! Kernel side of the plugin.
//!
//! - **connection**: connection file lookup and parsing
//! - **message**: conversion of protocol messages into typed enums
//! - **client**: the `KernelClient`/`Connector` seam and in-process queues
//! - **jupyter**: `KernelClient` over the kernel's shell and iopub sockets
//!
//! # Data Flow
//!
//! ```text
//! iopub socket ─► output_message ─► QueueSenders ─► output queue ─► drain_output
//! shell socket ─► shell_reply    ─► QueueSenders ─► shell queue  ─► next_reply
//! execute(code) ─► shell socket
//! ```

pub mod client;
pub mod connection;
pub mod jupyter;
pub mod message;

pub use client::{Connector, KernelClient, KernelError, ReplyError};
pub use connection::{ConnectionError, ConnectionFile, Resolver};
pub use jupyter::JupyterConnector;
pub use message::{KernelMessage, MessageContent};
