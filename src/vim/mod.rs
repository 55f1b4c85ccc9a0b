//! Vim front end
//!
//! The binary runs as a Vim job (`job_start(..., {'mode': 'json'})`).
//!
//! - **channel**: the JSON channel codec
//! - **surface**: `DisplaySurface` implemented with channel commands
//! - **request**: requests sent by `plugin/ipyvim.vim`
//!
//! [`serve`] answers requests until Vim closes the channel or asks us to
//! shut down.

pub mod channel;
pub mod request;
pub mod surface;

use std::io::{BufRead, Write};

use serde_json::json;
use tracing::{debug, info, warn};

pub use channel::VimChannel;
pub use request::Request;
pub use surface::VimSurface;

use crate::session::Session;
use crate::surface::{DisplaySurface, Severity, SurfaceError};

/// Request loop
pub fn serve<R: BufRead, W: Write>(session: &mut Session, surface: &mut VimSurface<R, W>) -> Result<(), SurfaceError> {
    while let Some(incoming) = surface.channel_mut().next_request()? {
        let id = incoming.id;
        let request = match Request::parse(incoming.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(id, error = %e, "malformed request");
                surface.channel_mut().respond(id, json!(false))?;
                continue;
            }
        };

        debug!(
            id,
            ?request,
            kernel = ?session.connection().map(|c| c.path.display().to_string()),
            "handling request"
        );
        let shutdown = request == Request::Shutdown;
        let result = match request.execute(session, surface) {
            Ok(result) => result,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(id, error = %e, "request failed");
                surface.notify(&format!("ipyvim: {}", e), Severity::Error)?;
                false
            }
        };
        surface.channel_mut().respond(id, json!(result))?;

        if shutdown {
            info!("shutdown requested");
            return Ok(());
        }
    }

    info!("vim closed the channel");
    if session.is_connected() {
        session.disconnect();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::session_with_kernels;
    use serde_json::Value;
    use std::io::Cursor;

    fn run(session: &mut Session, input: &[Value]) -> Vec<Value> {
        let text: String = input.iter().map(|v| format!("{}\n", v)).collect();
        let channel = VimChannel::new(Cursor::new(text.into_bytes()), Vec::new());
        let mut surface = VimSurface::new(channel);
        serve(session, &mut surface).unwrap();
        surface.channel_mut().sent()
    }

    fn replies(sent: &[Value]) -> Vec<Value> {
        sent.iter().filter(|v| v[0].is_i64()).cloned().collect()
    }

    #[test]
    fn test_serve_answers_every_request() {
        let (mut session, _connector, _dir) = session_with_kernels(&[]);
        let sent = run(
            &mut session,
            &[
                json!([1, {"cmd": "bogus"}]),
                json!([2, {"cmd": "refresh"}]),
                json!([3, {"cmd": "run_line"}]),
                json!([-1, "x = 1"]),
                json!([4, {"cmd": "shutdown"}]),
                json!([5, {"cmd": "refresh"}]),
            ],
        );

        assert_eq!(
            replies(&sent),
            vec![json!([1, false]), json!([2, false]), json!([3, false]), json!([4, true])]
        );
        assert!(sent.contains(&json!([
            "ex",
            "echohl Error | echomsg \"Not connected to a kernel\" | echohl None"
        ])));
    }

    #[test]
    fn test_serve_survives_bad_editor_reply() {
        let (mut session, _connector, _dir) = session_with_kernels(&["1"]);
        session.connect("").unwrap();
        let sent = run(
            &mut session,
            &[
                json!([1, {"cmd": "refresh", "force": true}]),
                json!([-1, "a.py"]),
                json!([-2, "ipyvim-output"]),
                json!([-3, ["Blue"]]),
                json!([2, {"cmd": "shutdown"}]),
            ],
        );

        assert_eq!(replies(&sent), vec![json!([1, false]), json!([2, true])]);
        assert!(sent.iter().any(|v| v[0] == "ex"
            && v[1].as_str().is_some_and(|cmd| cmd.starts_with("echohl Error | echomsg \"ipyvim: unexpected reply"))));
    }

    #[test]
    fn test_serve_connects() {
        let (mut session, connector, dir) = session_with_kernels(&["7"]);
        let sent = run(&mut session, &[json!([1, {"cmd": "connect", "spec": "7"}])]);

        assert_eq!(replies(&sent), vec![json!([1, true])]);
        assert_eq!(connector.opened.borrow().len(), 1);
        let message = format!(
            "echohl Question | echomsg \"Connected to {}\" | echohl None",
            dir.path().join("kernel-7.json").display()
        );
        assert!(sent.contains(&json!(["ex", message])));
        // Channel closed: the kernel is released
        assert!(!session.is_connected());
    }
}
