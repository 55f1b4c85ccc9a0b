//! Message classification
//!
//! Turns drained kernel messages into the text shown in the scratch buffer:
//!
//! | Kind | Shown as |
//! |------|----------|
//! | status | nothing |
//! | stream | the text, escapes stripped |
//! | execute result | output prompt + plain text |
//! | display data | plain text |
//! | execute input | input prompt + code, dot-leader on continuation lines |
//! | error | traceback, then `ename: evalue` |
//!
//! The plugin's own introspection calls are echoed by the kernel like any
//! other input; those are recognised by marker and hidden.

use crate::ansi::strip_escapes;
use crate::kernel::{KernelMessage, MessageContent};
use crate::prompt::{continuation_prefix, PromptTemplate};

/// Code fragments that identify the plugin's bookkeeping commands
pub const BOOKKEEPING_MARKERS: &[&str] = &["whos", "np.save('/tmp/tmp_", "fcpyvke0"];

/// Stream output containing this is a variable listing, not user output
pub const VARIABLE_LISTING_MARKER: &str = "Data/Info";

/// Formats messages with the configured prompts
#[derive(Debug, Clone)]
pub struct Classifier {
    input: PromptTemplate,
    output: PromptTemplate,
}

impl Classifier {
    pub fn new(input: PromptTemplate, output: PromptTemplate) -> Self {
        Self { input, output }
    }

    /// Text block for one message, `None` if it is not shown.
    ///
    /// Blocks never carry escape sequences, whatever the kind.
    pub fn classify(&self, msg: &KernelMessage) -> Option<String> {
        self.block(msg).map(|block| strip_escapes(&block))
    }

    fn block(&self, msg: &KernelMessage) -> Option<String> {
        match &msg.content {
            MessageContent::Status => None,
            MessageContent::Stream { text } => {
                if text.contains(VARIABLE_LISTING_MARKER) {
                    None
                } else {
                    Some(text.clone())
                }
            }
            MessageContent::ExecuteResult {
                execution_count,
                text,
            } => Some(format!("{}{}", self.output.render(*execution_count), text)),
            MessageContent::DisplayData { text } => Some(text.clone()),
            MessageContent::ExecuteInput {
                execution_count,
                code,
            } => {
                if is_bookkeeping(code) {
                    return None;
                }
                Some(self.format_input(*execution_count, code))
            }
            MessageContent::Error {
                ename,
                evalue,
                traceback,
            } => {
                let mut block: Vec<String> = traceback
                    .iter()
                    .map(|frame| {
                        strip_escapes(frame)
                            .trim_end_matches(|c| c == '\n' || c == '\r')
                            .to_string()
                    })
                    .collect();
                block.push(format!("{}: {}", ename, evalue));
                Some(block.join("\n"))
            }
            MessageContent::Other(_) => None,
        }
    }

    /// Render lines for a batch of messages, in order
    pub fn render_lines(&self, messages: &[KernelMessage]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|msg| self.classify(msg))
            .flat_map(|block| split_lines(&block))
            .collect()
    }

    fn format_input(&self, count: u32, code: &str) -> String {
        let prompt = self.input.render(count);
        let dots = continuation_prefix(&prompt);
        let code = code.replace("\r\n", "\n");
        let code = code.trim_end().replace('\n', &format!("\n{}", dots));
        format!("{}{}", prompt, code)
    }
}

/// Whether echoed code is one of the plugin's own calls
pub fn is_bookkeeping(code: &str) -> bool {
    BOOKKEEPING_MARKERS.iter().any(|marker| code.contains(marker))
}

/// Split a block into buffer lines.
///
/// A block without a newline is one line (even if empty); otherwise lines
/// are split on `\n`/`\r\n` and a final line terminator adds no empty line.
pub fn split_lines(block: &str) -> Vec<String> {
    if !block.contains('\n') {
        return vec![block.to_string()];
    }
    block.lines().map(str::to_string).collect()
}
