//! Kernel client seam
//!
//! [`KernelClient`] is everything the plugin needs from a kernel: submit
//! code, wait (briefly) for a shell reply, and drain queued output.
//! [`super::jupyter`] implements it over the kernel's ZeroMQ sockets; tests
//! use the scripted kernel in `testing`.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::connection::ConnectionFile;
use super::message::{Incoming, KernelMessage, ShellReply};

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("failed to start kernel runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("kernel channel error: {0}")]
    Channel(String),

    #[error("kernel channels did not open within {0:?}")]
    Timeout(Duration),

    #[error("kernel connection is closed")]
    Closed,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReplyError {
    #[error("no reply from kernel")]
    Timeout,

    #[error("kernel connection is closed")]
    Closed,
}

/// A live connection to one kernel
pub trait KernelClient {
    /// Submit code on the shell channel, returning its correlation id
    fn execute(&mut self, code: &str) -> Result<String, KernelError>;

    /// Next shell reply, waiting at most `timeout`
    fn next_reply(&mut self, timeout: Duration) -> Result<ShellReply, ReplyError>;

    /// Every output message queued right now (never blocks)
    fn drain_output(&mut self) -> Vec<KernelMessage>;
}

/// Opens clients against connection files
pub trait Connector {
    fn open(&self, connection: &ConnectionFile) -> Result<Box<dyn KernelClient>, KernelError>;
}

/// Producer half of the kernel queues, fed by a transport
#[derive(Clone)]
pub struct QueueSenders {
    shell: Sender<ShellReply>,
    output: Sender<KernelMessage>,
}

impl QueueSenders {
    /// Route a decoded message to its queue. Returns false once the
    /// consumer is gone.
    pub fn route(&self, incoming: Incoming) -> bool {
        match incoming {
            Incoming::Shell(reply) => self.shell.send(reply).is_ok(),
            Incoming::Output(msg) => self.output.send(msg).is_ok(),
        }
    }
}

/// Consumer half of the kernel queues
pub struct KernelQueues {
    shell: Receiver<ShellReply>,
    output: Receiver<KernelMessage>,
}

/// Create a connected pair of queues
pub fn queues() -> (QueueSenders, KernelQueues) {
    let (shell_tx, shell_rx) = mpsc::channel();
    let (output_tx, output_rx) = mpsc::channel();
    (
        QueueSenders {
            shell: shell_tx,
            output: output_tx,
        },
        KernelQueues {
            shell: shell_rx,
            output: output_rx,
        },
    )
}

impl KernelQueues {
    /// Collect all available output messages
    pub fn drain_output(&self) -> Vec<KernelMessage> {
        let mut messages = Vec::new();
        loop {
            match self.output.try_recv() {
                Ok(msg) => messages.push(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("output queue disconnected");
                    break;
                }
            }
        }
        messages
    }

    /// Wait for the next shell reply
    pub fn next_reply(&self, timeout: Duration) -> Result<ShellReply, ReplyError> {
        self.shell.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => ReplyError::Timeout,
            RecvTimeoutError::Disconnected => ReplyError::Closed,
        })
    }
}
