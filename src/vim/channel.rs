//! Vim channel codec
//!
//! Vim talks to a job in JSON mode: one JSON array per line. Requests from
//! Vim carry positive ids, `[id, payload]`, and expect `[id, result]` back.
//! Commands we send are `["ex", cmd]`, `["normal", keys]`, `["redraw", ""]`,
//! and for anything with a result `["expr", expr, -n]` or
//! `["call", func, args, -n]`, which Vim answers with `[-n, result]`.
//!
//! While waiting for such an answer Vim may send new requests; they are
//! queued and handed out by [`VimChannel::next_request`] later.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::surface::SurfaceError;

/// A request from Vim
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRequest {
    pub id: i64,
    pub payload: Value,
}

/// Both directions of the Vim channel
pub struct VimChannel<R, W> {
    reader: R,
    writer: W,
    /// Last id used for expr/call; counts down from -1
    last_id: i64,
    /// Requests that arrived while waiting for a reply
    pending: VecDeque<IncomingRequest>,
}

impl<R: BufRead, W: Write> VimChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            last_id: 0,
            pending: VecDeque::new(),
        }
    }

    /// Next request from Vim, `None` once Vim closes the channel
    pub fn next_request(&mut self) -> Result<Option<IncomingRequest>, SurfaceError> {
        if let Some(request) = self.pending.pop_front() {
            return Ok(Some(request));
        }
        loop {
            let Some((id, payload)) = self.read_message()? else {
                return Ok(None);
            };
            if id > 0 {
                return Ok(Some(IncomingRequest { id, payload }));
            }
            debug!(id, "dropping stale reply");
        }
    }

    /// Answer request `id`
    pub fn respond(&mut self, id: i64, result: Value) -> Result<(), SurfaceError> {
        self.send(&json!([id, result]))
    }

    /// Run an Ex command
    pub fn ex(&mut self, command: &str) -> Result<(), SurfaceError> {
        self.send(&json!(["ex", command]))
    }

    /// Execute Normal-mode keys
    pub fn normal(&mut self, keys: &str) -> Result<(), SurfaceError> {
        self.send(&json!(["normal", keys]))
    }

    pub fn redraw(&mut self) -> Result<(), SurfaceError> {
        self.send(&json!(["redraw", ""]))
    }

    /// Evaluate an expression
    pub fn expr(&mut self, expr: &str) -> Result<Value, SurfaceError> {
        let id = self.allocate_id();
        self.send(&json!(["expr", expr, id]))?;
        self.wait_for(id)
    }

    /// Call a function
    pub fn call(&mut self, func: &str, args: Value) -> Result<Value, SurfaceError> {
        let id = self.allocate_id();
        self.send(&json!(["call", func, args, id]))?;
        self.wait_for(id)
    }

    fn allocate_id(&mut self) -> i64 {
        self.last_id -= 1;
        self.last_id
    }

    fn wait_for(&mut self, id: i64) -> Result<Value, SurfaceError> {
        loop {
            let (got, payload) = self.read_message()?.ok_or(SurfaceError::Disconnected)?;
            if got == id {
                return Ok(payload);
            }
            if got > 0 {
                self.pending.push_back(IncomingRequest { id: got, payload });
            } else {
                debug!(expected = id, got, "dropping unexpected reply");
            }
        }
    }

    fn send(&mut self, message: &Value) -> Result<(), SurfaceError> {
        trace!(%message, "-> vim");
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read one `[id, payload]` message, skipping malformed lines
    fn read_message(&mut self) -> Result<Option<(i64, Value)>, SurfaceError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            trace!(message = text, "<- vim");

            match parse_message(text) {
                Some(message) => return Ok(Some(message)),
                None => warn!(line = text, "ignoring malformed channel message"),
            }
        }
    }
}

#[cfg(test)]
impl<R> VimChannel<R, Vec<u8>> {
    /// Messages written so far
    pub fn sent(&self) -> Vec<Value> {
        String::from_utf8_lossy(&self.writer)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

/// Split `[id, payload]`; a missing payload is `null`
fn parse_message(text: &str) -> Option<(i64, Value)> {
    let value: Value = serde_json::from_str(text).ok()?;
    let mut items = match value {
        Value::Array(items) => items.into_iter(),
        _ => return None,
    };
    let id = items.next()?.as_i64()?;
    Some((id, items.next().unwrap_or(Value::Null)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn channel(input: &str) -> VimChannel<Cursor<Vec<u8>>, Vec<u8>> {
        VimChannel::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_requests_and_responses() {
        let mut ch = channel("[1, {\"cmd\": \"refresh\"}]\n\nnot json\n[2, {\"cmd\": \"shutdown\"}]\n");

        let first = ch.next_request().unwrap().unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.payload["cmd"], "refresh");
        ch.respond(1, json!(true)).unwrap();

        assert_eq!(ch.next_request().unwrap().unwrap().id, 2);
        assert!(ch.next_request().unwrap().is_none());
        assert_eq!(ch.sent(), vec![json!([1, true])]);
    }

    #[test]
    fn test_expr_queues_interleaved_requests() {
        let mut ch = channel("[5, {\"cmd\": \"run_line\"}]\n[-1, \"x = 1\"]\n");

        assert_eq!(ch.expr("getline('.')").unwrap(), json!("x = 1"));
        assert_eq!(ch.next_request().unwrap().unwrap().id, 5);
        assert_eq!(ch.sent(), vec![json!(["expr", "getline('.')", -1])]);
    }

    #[test]
    fn test_call_uses_fresh_ids() {
        let mut ch = channel("[-1, 0]\n[-9, \"stale\"]\n[-2, [\"a\"]]\n");

        assert_eq!(ch.call("append", json!(["$", ["a"]])).unwrap(), json!(0));
        assert_eq!(ch.expr("getline(1, '$')").unwrap(), json!(["a"]));
        assert_eq!(
            ch.sent(),
            vec![
                json!(["call", "append", ["$", ["a"]], -1]),
                json!(["expr", "getline(1, '$')", -2]),
            ]
        );
    }

    #[test]
    fn test_disconnect_while_waiting() {
        let mut ch = channel("");
        assert!(matches!(ch.expr("1"), Err(SurfaceError::Disconnected)));
    }

    #[test]
    fn test_commands() {
        let mut ch = channel("");
        ch.ex("pclose").unwrap();
        ch.normal("G").unwrap();
        ch.redraw().unwrap();
        assert_eq!(
            ch.sent(),
            vec![json!(["ex", "pclose"]), json!(["normal", "G"]), json!(["redraw", ""])]
        );
    }
}
