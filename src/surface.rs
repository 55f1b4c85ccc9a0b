//! Display surface seam
//!
//! Everything the plugin asks of the editor goes through [`DisplaySurface`]:
//! reading the code to send, driving the preview window that holds the
//! scratch buffer, appending lines, highlighting prompts, reading settings
//! and echoing status messages. [`crate::vim::VimSurface`] implements it over
//! the Vim channel; tests use the in-memory surface in [`testing`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("editor channel I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid editor message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("editor closed the channel")]
    Disconnected,

    #[error("unexpected reply to '{request}': {reply}")]
    UnexpectedReply { request: String, reply: String },
}

impl SurfaceError {
    /// Whether the channel to the editor is gone
    pub fn is_fatal(&self) -> bool {
        matches!(self, SurfaceError::Io(_) | SurfaceError::Disconnected)
    }
}

/// Highlight used for a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Vim highlight group
    pub fn highlight_group(self) -> &'static str {
        match self {
            Severity::Info => "Question",
            Severity::Warning => "WarningMsg",
            Severity::Error => "Error",
        }
    }
}

/// Narrow view of the editor
pub trait DisplaySurface {
    /// Text of the cursor line in the focused buffer
    fn current_line(&mut self) -> Result<String, SurfaceError>;

    /// Lines `start..=end` (1-based) of the focused buffer
    fn lines(&mut self, start: usize, end: usize) -> Result<Vec<String>, SurfaceError>;

    /// Full path of the file in the focused buffer
    fn current_file(&mut self) -> Result<String, SurfaceError>;

    /// Name of the focused buffer
    fn focused_buffer(&mut self) -> Result<String, SurfaceError>;

    /// Whether a window shows `buffer`
    fn is_visible(&mut self, buffer: &str) -> Result<bool, SurfaceError>;

    /// Focus the preview window, if there is one
    fn focus_preview(&mut self) -> Result<(), SurfaceError>;

    /// Keep the preview window at its current height
    fn fit_preview(&mut self) -> Result<(), SurfaceError>;

    /// Close any preview window and show `buffer` in a new, focused one
    fn replace_preview(&mut self, buffer: &str) -> Result<(), SurfaceError>;

    /// Scratch settings for the focused buffer: unlisted, no folds, no
    /// numbers, no swap file, `q` to quit
    fn configure_scratch(&mut self) -> Result<(), SurfaceError>;

    /// Return focus to the previously focused window
    fn focus_previous(&mut self) -> Result<(), SurfaceError>;

    /// Last line of the focused buffer
    fn last_line(&mut self) -> Result<String, SurfaceError>;

    /// Append lines at the end of the focused buffer
    fn append_lines(&mut self, lines: &[String]) -> Result<(), SurfaceError>;

    /// Move the cursor to the last line
    fn cursor_to_end(&mut self) -> Result<(), SurfaceError>;

    /// Define a highlight group
    fn highlight(&mut self, group: &str, console: &str, gui: &str) -> Result<(), SurfaceError>;

    /// Highlight lines starting with `pattern` using `group`
    fn syntax_match(&mut self, group: &str, pattern: &str) -> Result<(), SurfaceError>;

    /// Value of a global editor variable, `None` when unset
    fn variable(&mut self, name: &str) -> Result<Option<String>, SurfaceError>;

    /// One-line status message
    fn notify(&mut self, message: &str, severity: Severity) -> Result<(), SurfaceError>;
}

#[cfg(test)]
pub mod testing {
    //! In-memory editor

    use std::collections::HashMap;

    use super::*;

    pub const SOURCE: &str = "script.py";

    /// Editor with one source buffer, an optional preview window and
    /// a record of everything it was asked to do
    pub struct FakeSurface {
        pub buffers: HashMap<String, Vec<String>>,
        pub focused: String,
        pub previous: Option<String>,
        pub preview: Option<String>,
        pub cursor_line: usize,
        pub file: String,
        pub variables: HashMap<String, String>,
        pub notifications: Vec<(String, Severity)>,
        pub highlights: Vec<(String, String, String)>,
        pub syntax: Vec<(String, String)>,
        pub configured: usize,
        pub fitted: usize,
        pub cursor_moves: usize,
    }

    impl FakeSurface {
        pub fn with_source(lines: &[&str]) -> Self {
            let mut buffers = HashMap::new();
            buffers.insert(
                SOURCE.to_string(),
                lines.iter().map(|l| l.to_string()).collect(),
            );
            Self {
                buffers,
                focused: SOURCE.to_string(),
                previous: None,
                preview: None,
                cursor_line: 1,
                file: "/work/script.py".to_string(),
                variables: HashMap::new(),
                notifications: Vec::new(),
                highlights: Vec::new(),
                syntax: Vec::new(),
                configured: 0,
                fitted: 0,
                cursor_moves: 0,
            }
        }

        pub fn buffer(&self, name: &str) -> Vec<String> {
            self.buffers.get(name).cloned().unwrap_or_default()
        }

        pub fn messages(&self) -> Vec<String> {
            self.notifications.iter().map(|(m, _)| m.clone()).collect()
        }

        fn focus(&mut self, name: &str) {
            if self.focused != name {
                self.previous = Some(std::mem::replace(&mut self.focused, name.to_string()));
            }
        }

        fn focused_lines(&mut self) -> &mut Vec<String> {
            self.buffers.entry(self.focused.clone()).or_default()
        }
    }

    impl DisplaySurface for FakeSurface {
        fn current_line(&mut self) -> Result<String, SurfaceError> {
            let line = self.cursor_line;
            Ok(self.focused_lines().get(line - 1).cloned().unwrap_or_default())
        }

        fn lines(&mut self, start: usize, end: usize) -> Result<Vec<String>, SurfaceError> {
            let lines = self.focused_lines();
            let end = end.min(lines.len());
            Ok(lines.get(start - 1..end).map(<[String]>::to_vec).unwrap_or_default())
        }

        fn current_file(&mut self) -> Result<String, SurfaceError> {
            Ok(self.file.clone())
        }

        fn focused_buffer(&mut self) -> Result<String, SurfaceError> {
            Ok(self.focused.clone())
        }

        fn is_visible(&mut self, buffer: &str) -> Result<bool, SurfaceError> {
            Ok(self.focused == buffer || self.preview.as_deref() == Some(buffer))
        }

        fn focus_preview(&mut self) -> Result<(), SurfaceError> {
            if let Some(preview) = self.preview.clone() {
                self.focus(&preview);
            }
            Ok(())
        }

        fn fit_preview(&mut self) -> Result<(), SurfaceError> {
            self.fitted += 1;
            Ok(())
        }

        fn replace_preview(&mut self, buffer: &str) -> Result<(), SurfaceError> {
            self.preview = Some(buffer.to_string());
            // A fresh Vim buffer holds one empty line
            self.buffers
                .entry(buffer.to_string())
                .or_insert_with(|| vec![String::new()]);
            self.focus(buffer);
            Ok(())
        }

        fn configure_scratch(&mut self) -> Result<(), SurfaceError> {
            self.configured += 1;
            Ok(())
        }

        fn focus_previous(&mut self) -> Result<(), SurfaceError> {
            if let Some(previous) = self.previous.clone() {
                self.focus(&previous);
            }
            Ok(())
        }

        fn last_line(&mut self) -> Result<String, SurfaceError> {
            Ok(self.focused_lines().last().cloned().unwrap_or_default())
        }

        fn append_lines(&mut self, lines: &[String]) -> Result<(), SurfaceError> {
            self.focused_lines().extend_from_slice(lines);
            Ok(())
        }

        fn cursor_to_end(&mut self) -> Result<(), SurfaceError> {
            self.cursor_moves += 1;
            Ok(())
        }

        fn highlight(&mut self, group: &str, console: &str, gui: &str) -> Result<(), SurfaceError> {
            self.highlights
                .push((group.to_string(), console.to_string(), gui.to_string()));
            Ok(())
        }

        fn syntax_match(&mut self, group: &str, pattern: &str) -> Result<(), SurfaceError> {
            self.syntax.push((group.to_string(), pattern.to_string()));
            Ok(())
        }

        fn variable(&mut self, name: &str) -> Result<Option<String>, SurfaceError> {
            Ok(self.variables.get(name).cloned())
        }

        fn notify(&mut self, message: &str, severity: Severity) -> Result<(), SurfaceError> {
            self.notifications.push((message.to_string(), severity));
            Ok(())
        }
    }
}
