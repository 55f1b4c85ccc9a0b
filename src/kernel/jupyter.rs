//! Kernel client over the Jupyter sockets
//!
//! [`JupyterClient`] opens the shell and iopub sockets named in a connection
//! file with runtimelib. A private tokio runtime runs one reader task per
//! socket; each converts what it reads and pushes it onto the in-process
//! queues. Execute requests are sent from the caller's thread by blocking on
//! that runtime.

use std::fmt::Display;
use std::time::Duration;

use jupyter_protocol::{ExecuteRequest, JupyterMessage};
use runtimelib::DealerSendConnection;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::{queues, Connector, KernelClient, KernelError, KernelQueues, ReplyError};
use super::connection::ConnectionFile;
use super::message::{output_message, shell_reply, Incoming, KernelMessage, ShellReply};

/// Opens a [`JupyterClient`] per connection
pub struct JupyterConnector {
    connect_timeout: Duration,
}

impl JupyterConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for JupyterConnector {
    fn open(&self, connection: &ConnectionFile) -> Result<Box<dyn KernelClient>, KernelError> {
        Ok(Box::new(JupyterClient::connect(connection, self.connect_timeout)?))
    }
}

/// Live shell and iopub connections to one kernel
pub struct JupyterClient {
    shell: Option<DealerSendConnection>,
    queues: KernelQueues,
    readers: Vec<JoinHandle<()>>,
    runtime: Runtime,
}

fn channel_error(e: impl Display) -> KernelError {
    KernelError::Channel(e.to_string())
}

impl JupyterClient {
    /// Connect to the kernel described by `connection`
    pub fn connect(connection: &ConnectionFile, timeout: Duration) -> Result<Self, KernelError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ipyvim-kernel")
            .enable_all()
            .build()
            .map_err(KernelError::Runtime)?;

        let session_id = Uuid::new_v4().to_string();
        let info = &connection.info;
        let open = async {
            let iopub = runtimelib::create_client_iopub_connection(info, "", &session_id)
                .await
                .map_err(channel_error)?;
            let identity = runtimelib::peer_identity_for_session(&session_id).map_err(channel_error)?;
            let shell = runtimelib::create_client_shell_connection_with_identity(info, &session_id, identity)
                .await
                .map_err(channel_error)?;
            Ok::<_, KernelError>((iopub, shell))
        };
        let (mut iopub, shell) = runtime
            .block_on(tokio::time::timeout(timeout, open))
            .map_err(|_| KernelError::Timeout(timeout))??;

        let (shell_writer, mut shell_reader) = shell.split();
        let (senders, queues) = queues();

        let output = senders.clone();
        let iopub_task = runtime.spawn(async move {
            loop {
                match iopub.read().await {
                    Ok(message) => {
                        if !output.route(Incoming::Output(output_message(&message))) {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "iopub read failed");
                        break;
                    }
                }
            }
            debug!("iopub reader stopped");
        });

        let shell_task = runtime.spawn(async move {
            loop {
                match shell_reader.read().await {
                    Ok(message) => match shell_reply(&message) {
                        Some(reply) => {
                            if !senders.route(Incoming::Shell(reply)) {
                                break;
                            }
                        }
                        None => debug!(msg_type = %message.header.msg_type, "ignoring shell message"),
                    },
                    Err(e) => {
                        warn!(error = %e, "shell read failed");
                        break;
                    }
                }
            }
            debug!("shell reader stopped");
        });

        info!(
            connection = %connection.path.display(),
            session = %session_id,
            "kernel channels open"
        );

        Ok(Self {
            shell: Some(shell_writer),
            queues,
            readers: vec![iopub_task, shell_task],
            runtime,
        })
    }
}

impl KernelClient for JupyterClient {
    fn execute(&mut self, code: &str) -> Result<String, KernelError> {
        let shell = self.shell.as_mut().ok_or(KernelError::Closed)?;
        let message: JupyterMessage = ExecuteRequest::new(code.to_string()).into();
        let msg_id = message.header.msg_id.clone();

        self.runtime.block_on(shell.send(message)).map_err(channel_error)?;
        debug!(%msg_id, "execute request sent");
        Ok(msg_id)
    }

    fn next_reply(&mut self, timeout: Duration) -> Result<ShellReply, ReplyError> {
        self.queues.next_reply(timeout)
    }

    fn drain_output(&mut self) -> Vec<KernelMessage> {
        self.queues.drain_output()
    }
}

impl Drop for JupyterClient {
    fn drop(&mut self) {
        let _guard = self.runtime.enter();
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        self.shell.take();
        debug!("kernel channels closed");
    }
}
