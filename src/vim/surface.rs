//! [`DisplaySurface`] over the Vim channel

use std::io::{BufRead, Write};

use serde_json::{json, Value};

use super::channel::VimChannel;
use crate::surface::{DisplaySurface, Severity, SurfaceError};

/// The running Vim instance
pub struct VimSurface<R, W> {
    channel: VimChannel<R, W>,
}

impl<R: BufRead, W: Write> VimSurface<R, W> {
    pub fn new(channel: VimChannel<R, W>) -> Self {
        Self { channel }
    }

    pub fn channel_mut(&mut self) -> &mut VimChannel<R, W> {
        &mut self.channel
    }

    fn eval_string(&mut self, expr: &str) -> Result<String, SurfaceError> {
        match self.channel.expr(expr)? {
            Value::String(text) => Ok(text),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(unexpected(expr, &other)),
        }
    }

    fn eval_number(&mut self, expr: &str) -> Result<i64, SurfaceError> {
        let value = self.channel.expr(expr)?;
        match &value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
        .ok_or_else(|| unexpected(expr, &value))
    }
}

fn unexpected(request: &str, reply: &Value) -> SurfaceError {
    SurfaceError::UnexpectedReply {
        request: request.to_string(),
        reply: reply.to_string(),
    }
}

/// Vim single-quoted string literal
fn vim_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Escape a buffer name for use as an Ex command argument
fn ex_argument(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, ' ' | '\\' | '|' | '"' | '%' | '#' | '\t') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escape text for a double-quoted `:echomsg` argument
fn echo_string(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    // One status line
    escaped.replace(|c: char| c == '\n' || c == '\r', " ")
}

impl<R: BufRead, W: Write> DisplaySurface for VimSurface<R, W> {
    fn current_line(&mut self) -> Result<String, SurfaceError> {
        self.eval_string("getline('.')")
    }

    fn lines(&mut self, start: usize, end: usize) -> Result<Vec<String>, SurfaceError> {
        let expr = format!("getline({}, {})", start, end);
        match self.channel.expr(&expr)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(text) => Ok(text),
                    other => Err(unexpected(&expr, &other)),
                })
                .collect(),
            other => Err(unexpected(&expr, &other)),
        }
    }

    fn current_file(&mut self) -> Result<String, SurfaceError> {
        self.eval_string("expand('%:p')")
    }

    fn focused_buffer(&mut self) -> Result<String, SurfaceError> {
        self.eval_string("bufname('%')")
    }

    fn is_visible(&mut self, buffer: &str) -> Result<bool, SurfaceError> {
        let pattern = vim_string(&format!("^{}$", buffer));
        Ok(self.eval_number(&format!("bufwinnr({}) > 0", pattern))? != 0)
    }

    fn focus_preview(&mut self) -> Result<(), SurfaceError> {
        self.channel.ex("silent! wincmd P")
    }

    fn fit_preview(&mut self) -> Result<(), SurfaceError> {
        self.channel.ex("execute 'set previewheight=' . winheight(0)")
    }

    fn replace_preview(&mut self, buffer: &str) -> Result<(), SurfaceError> {
        self.channel.ex("pclose")?;
        self.channel
            .ex(&format!("silent pedit +set\\ ma {}", ex_argument(buffer)))?;
        self.channel.ex("wincmd P")
    }

    fn configure_scratch(&mut self) -> Result<(), SurfaceError> {
        for command in [
            "nnoremap <buffer> q :q<CR>",
            "setlocal bufhidden=hide buftype=nofile filetype=python",
            "setlocal nobuflisted",
            "setlocal foldlevel=99",
            "setlocal nonumber",
            "setlocal noswapfile",
        ] {
            self.channel.ex(command)?;
        }
        Ok(())
    }

    fn focus_previous(&mut self) -> Result<(), SurfaceError> {
        self.channel.ex("wincmd p")
    }

    fn last_line(&mut self) -> Result<String, SurfaceError> {
        self.eval_string("getline('$')")
    }

    fn append_lines(&mut self, lines: &[String]) -> Result<(), SurfaceError> {
        self.channel.call("append", json!(["$", lines]))?;
        Ok(())
    }

    fn cursor_to_end(&mut self) -> Result<(), SurfaceError> {
        self.channel.normal("G")?;
        self.channel.redraw()
    }

    fn highlight(&mut self, group: &str, console: &str, gui: &str) -> Result<(), SurfaceError> {
        self.channel
            .ex(&format!("highlight {} ctermfg={} guifg={}", group, console, gui))
    }

    fn syntax_match(&mut self, group: &str, pattern: &str) -> Result<(), SurfaceError> {
        self.channel.ex(&format!("syntax match {} /^{}/", group, pattern))
    }

    fn variable(&mut self, name: &str) -> Result<Option<String>, SurfaceError> {
        let key = name.strip_prefix("g:").unwrap_or(name);
        let expr = format!("get(g:, {}, v:null)", vim_string(key));
        match self.channel.expr(&expr)? {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text)),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(u8::from(b).to_string())),
            other => Err(unexpected(&expr, &other)),
        }
    }

    fn notify(&mut self, message: &str, severity: Severity) -> Result<(), SurfaceError> {
        self.channel.ex(&format!(
            "echohl {} | echomsg \"{}\" | echohl None",
            severity.highlight_group(),
            echo_string(message)
        ))
    }
}
