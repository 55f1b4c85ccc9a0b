//! Command dispatcher
//!
//! Every run command follows the same path: pick the code out of the
//! focused buffer, submit it, wait briefly for the execution count, echo a
//! status line and (when monitoring output) force a refresh pass.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::kernel::{ConnectionError, KernelClient, KernelError, ReplyError};
use crate::session::Session;
use crate::surface::{DisplaySurface, Severity, SurfaceError};

/// Outcome of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Sent; the count is known when a matching reply arrived in time
    Sent {
        msg_id: String,
        execution_count: Option<u32>,
    },
    /// Sent, but no matching reply within the reply timeout
    Timeout { msg_id: String },
    /// No active kernel
    NotConnected,
}

/// Submit `code` to the active kernel
pub fn submit(session: &mut Session, code: &str) -> Result<Submission, KernelError> {
    let wait = session.config().run.show_execution_count;
    let timeout = session.config().run.reply_timeout();
    let Some(client) = session.client_mut() else {
        return Ok(Submission::NotConnected);
    };

    let msg_id = client.execute(code)?;
    if !wait {
        return Ok(Submission::Sent {
            msg_id,
            execution_count: None,
        });
    }

    match wait_for_reply(client, &msg_id, timeout) {
        Ok(execution_count) => Ok(Submission::Sent {
            msg_id,
            execution_count,
        }),
        Err(e) => {
            debug!(%msg_id, error = %e, "no execution count");
            Ok(Submission::Timeout { msg_id })
        }
    }
}

/// Wait for the shell reply to `msg_id`, skipping replies to anything else.
/// The whole wait is bounded by `timeout`.
fn wait_for_reply(
    client: &mut dyn KernelClient,
    msg_id: &str,
    timeout: Duration,
) -> Result<Option<u32>, ReplyError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ReplyError::Timeout);
        }
        let reply = client.next_reply(remaining)?;
        if reply.parent_id.as_deref() == Some(msg_id) {
            return Ok(reply.execution_count);
        }
        warn!(expected = msg_id, got = ?reply.parent_id, "skipping a message on the shell channel");
    }
}

/// Status line for a submission labelled `label`
pub fn status_text(label: &str, submission: &Submission) -> (String, Severity) {
    match submission {
        Submission::Sent {
            execution_count: Some(count),
            ..
        } => (format!("In[{}]: {}", count, label), Severity::Info),
        Submission::Sent {
            execution_count: None,
            ..
        } => (format!("In[]: {}", label), Severity::Info),
        Submission::Timeout { .. } => (
            format!("In[]: {} (no reply from kernel)", label),
            Severity::Info,
        ),
        Submission::NotConnected => ("Not connected to a kernel".to_string(), Severity::Error),
    }
}

/// Submit `code`, report it as `label`, then refresh the output buffer.
/// Returns whether the code was sent.
pub fn run_code(
    session: &mut Session,
    surface: &mut dyn DisplaySurface,
    code: &str,
    label: &str,
) -> Result<bool, SurfaceError> {
    let submission = match submit(session, code) {
        Ok(submission) => submission,
        Err(e) => {
            warn!(error = %e, "submit failed");
            surface.notify(&format!("Failed to send to kernel: {}", e), Severity::Error)?;
            return Ok(false);
        }
    };

    let (text, severity) = status_text(label, &submission);
    surface.notify(&text, severity)?;
    if submission == Submission::NotConnected {
        return Ok(false);
    }

    if session.config().run.monitor_output {
        session.refresh(surface, true)?;
    }
    Ok(true)
}

/// Run the focused buffer's file with `%run`
pub fn run_file(session: &mut Session, surface: &mut dyn DisplaySurface) -> Result<bool, SurfaceError> {
    let path = surface.current_file()?;
    if path.is_empty() {
        surface.notify("Buffer has no file to run", Severity::Warning)?;
        return Ok(false);
    }

    let flags = session.config().run.flags.trim();
    let command = if flags.is_empty() {
        format!("%run {}", python_repr(&path))
    } else {
        format!("%run {} {}", flags, python_repr(&path))
    };
    run_code(session, surface, &command, &command)
}

/// Run the cursor line
pub fn run_line(session: &mut Session, surface: &mut dyn DisplaySurface, dedent: bool) -> Result<bool, SurfaceError> {
    let line = surface.current_line()?;
    let code = if dedent { line.trim_start() } else { line.as_str() };
    run_code(session, surface, code, code)
}

/// Run lines `start..=end` (1-based)
pub fn run_range(
    session: &mut Session,
    surface: &mut dyn DisplaySurface,
    start: usize,
    end: usize,
    dedent: bool,
) -> Result<bool, SurfaceError> {
    let (start, end) = (start.min(end).max(1), start.max(end).max(1));
    let lines = surface.lines(start, end)?;

    let code = if dedent {
        match dedent_lines(&lines) {
            Some(lines) => lines.join("\n"),
            None => return Ok(false),
        }
    } else {
        lines.join("\n")
    };

    let label = format!("lines {}-{} ", start, end);
    run_code(session, surface, &code, &label)
}

/// Number of leading whitespace characters
pub fn leading_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Cut the first non-blank line's indentation width off every line.
///
/// Every line loses that many characters, whatever they are; shorter lines
/// end up empty. `None` when every line is blank.
pub fn dedent_lines(lines: &[String]) -> Option<Vec<String>> {
    let first = lines.iter().find(|line| !line.trim().is_empty())?;
    let width = leading_width(first);

    Some(
        lines
            .iter()
            .map(|line| line.chars().skip(width).collect())
            .collect(),
    )
}

/// Quote a string the way Python's `repr` does
pub fn python_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Connect to `spec` and report the outcome
pub fn connect(session: &mut Session, surface: &mut dyn DisplaySurface, spec: &str) -> Result<bool, SurfaceError> {
    let spec = spec.trim();
    match session.connect(spec) {
        Ok(connection) => {
            let message = format!("Connected to {}", connection.path.display());
            surface.notify(&message, Severity::Info)?;
            Ok(true)
        }
        Err(e) => {
            warn!(spec, error = %e, "connect failed");
            surface.notify(&format!(":IPython {} failed", spec), Severity::Info)?;
            let detail = match e {
                ConnectionError::NotFound(_) => format!("^-- failed '{}' not found", spec),
                other => format!("^-- {}", other),
            };
            surface.notify(&detail, Severity::Error)?;
            Ok(false)
        }
    }
}

/// Connect to the kernel in the last-kernel record and report the outcome
pub fn connect_last(session: &mut Session, surface: &mut dyn DisplaySurface) -> Result<bool, SurfaceError> {
    match session.connect_last() {
        Ok(connection) => {
            let message = format!("Connected to {}", connection.path.display());
            surface.notify(&message, Severity::Info)?;
            Ok(true)
        }
        Err(e) => {
            warn!(error = %e, "connect to last kernel failed");
            let message = match e {
                ConnectionError::RecordMissing(path) | ConnectionError::RecordEmpty(path) => {
                    format!("Kernel not found (see {})", path.display())
                }
                other => other.to_string(),
            };
            surface.notify(&message, Severity::Error)?;
            Ok(false)
        }
    }
}
