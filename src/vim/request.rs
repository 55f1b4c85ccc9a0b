//! Requests sent by the plugin script

use serde::Deserialize;
use serde_json::Value;

use crate::dispatch;
use crate::session::Session;
use crate::surface::{DisplaySurface, SurfaceError};

/// One `ch_sendexpr` payload, tagged by `cmd`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    /// `:IPython [spec]`
    Connect {
        #[serde(default)]
        spec: String,
    },
    /// `:IPythonLast`
    ConnectLast,
    /// `:IPyRun {code}`
    Run { code: String },
    RunFile,
    RunLine,
    RunLineDedent,
    /// `:[range]IPyRunRange`, `:[range]IPyRunRangeDedent`
    RunRange {
        start: usize,
        end: usize,
        #[serde(default)]
        dedent: bool,
    },
    /// `:IPyRefresh[!]`
    Refresh {
        #[serde(default)]
        force: bool,
    },
    Shutdown,
}

impl Request {
    pub fn parse(payload: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload)
    }

    /// Handle the request; the result is the reply sent back to Vim
    pub fn execute(self, session: &mut Session, surface: &mut dyn DisplaySurface) -> Result<bool, SurfaceError> {
        match self {
            Request::Connect { spec } => dispatch::connect(session, surface, &spec),
            Request::ConnectLast => dispatch::connect_last(session, surface),
            Request::Run { code } => dispatch::run_code(session, surface, &code, &code),
            Request::RunFile => dispatch::run_file(session, surface),
            Request::RunLine => dispatch::run_line(session, surface, false),
            Request::RunLineDedent => dispatch::run_line(session, surface, true),
            Request::RunRange { start, end, dedent } => {
                dispatch::run_range(session, surface, start, end, dedent)
            }
            Request::Refresh { force } => session.refresh(surface, force),
            Request::Shutdown => {
                session.disconnect();
                Ok(true)
            }
        }
    }
}
