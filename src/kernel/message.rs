//! Kernel message conversion
//!
//! runtimelib hands us [`JupyterMessage`]s read off the shell and iopub
//! sockets. They are converted exactly once, here, into [`KernelMessage`]
//! (output channel) or [`ShellReply`] (shell channel). Nothing downstream
//! looks at protocol types.

use jupyter_protocol::{JupyterMessage, JupyterMessageContent, Media};
use serde_json::Value;

/// A decoded output channel message
#[derive(Debug, Clone, PartialEq)]
pub struct KernelMessage {
    /// `msg_id` of the request that produced this message
    pub parent_id: Option<String>,
    pub content: MessageContent,
}

/// Per-kind payload
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// Kernel busy/idle notification
    Status,
    /// stdout/stderr text
    Stream { text: String },
    /// Value of the last expression
    ExecuteResult { execution_count: u32, text: String },
    /// Rich display output
    DisplayData { text: String },
    /// Code echoed back by the kernel
    ExecuteInput { execution_count: u32, code: String },
    /// Exception raised by the code
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    /// Any other message kind
    Other(String),
}

/// A shell channel reply
#[derive(Debug, Clone, PartialEq)]
pub struct ShellReply {
    pub parent_id: Option<String>,
    pub execution_count: Option<u32>,
}

/// A converted kernel message, tagged by the queue it belongs to
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Shell(ShellReply),
    Output(KernelMessage),
}

impl MessageContent {
    /// Convert protocol content; `kind` names anything not rendered
    pub fn from_jupyter(kind: &str, content: &JupyterMessageContent) -> Self {
        match content {
            JupyterMessageContent::Status(_) => MessageContent::Status,
            JupyterMessageContent::StreamContent(stream) => MessageContent::Stream {
                text: stream.text.clone(),
            },
            JupyterMessageContent::ExecuteResult(result) => MessageContent::ExecuteResult {
                execution_count: count(result.execution_count.0),
                text: plain_text(&result.data),
            },
            JupyterMessageContent::DisplayData(data) => MessageContent::DisplayData {
                text: plain_text(&data.data),
            },
            JupyterMessageContent::ExecuteInput(input) => MessageContent::ExecuteInput {
                execution_count: count(input.execution_count.0),
                code: input.code.clone(),
            },
            JupyterMessageContent::ErrorOutput(error) => MessageContent::Error {
                ename: error.ename.clone(),
                evalue: error.evalue.clone(),
                traceback: error.traceback.clone(),
            },
            _ => MessageContent::Other(kind.to_string()),
        }
    }
}

/// Convert a message read from the iopub socket
pub fn output_message(message: &JupyterMessage) -> KernelMessage {
    KernelMessage {
        parent_id: parent_id(message),
        content: MessageContent::from_jupyter(&message.header.msg_type, &message.content),
    }
}

/// Convert a message read from the shell socket; only execute replies count
pub fn shell_reply(message: &JupyterMessage) -> Option<ShellReply> {
    match &message.content {
        JupyterMessageContent::ExecuteReply(reply) => Some(ShellReply {
            parent_id: parent_id(message),
            execution_count: Some(count(reply.execution_count.0)),
        }),
        _ => None,
    }
}

fn parent_id(message: &JupyterMessage) -> Option<String> {
    message
        .parent_header
        .as_ref()
        .map(|header| header.msg_id.clone())
        .filter(|id| !id.is_empty())
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// `text/plain` representation of a mime bundle, empty if there is none
fn plain_text(media: &Media) -> String {
    let Ok(Value::Object(bundle)) = serde_json::to_value(media) else {
        return String::new();
    };
    match bundle.get("text/plain") {
        Some(Value::String(text)) => text.clone(),
        // Some kernels split long reprs into a list of lines
        Some(Value::Array(parts)) => parts.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}
