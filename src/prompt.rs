//! Prompt templates
//!
//! Prompts are configured the IPython way, as printf-style templates with a
//! named `line` field (`"In [%(line)d]: "`). This module renders them, builds
//! the dot-leader used for continuation lines, and derives the Vim syntax
//! pattern that highlights a prompt at the start of a line.

/// Count substituted when deriving the syntax pattern
const PATTERN_SAMPLE: u32 = 999;

/// A `%(line)d` prompt template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Render the prompt for an execution count
    pub fn render(&self, count: u32) -> String {
        let mut out = String::with_capacity(self.template.len() + 4);
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos..];

            if let Some(after) = rest.strip_prefix("%%") {
                out.push('%');
                rest = after;
            } else if let Some((spec, after)) = parse_line_field(rest) {
                out.push_str(&spec.format(count));
                rest = after;
            } else {
                // Not a field we know, keep it literally
                out.push('%');
                rest = &rest[1..];
            }
        }
        out.push_str(rest);
        out
    }

    /// Vim regex matching this prompt for any count
    pub fn syntax_pattern(&self) -> String {
        let sample = PATTERN_SAMPLE.to_string();
        vim_regex_escape(&self.render(PATTERN_SAMPLE)).replace(&sample, "[ 0-9]*")
    }
}

/// Width/fill flags of a `%(line)...d` field
#[derive(Debug, Default, PartialEq)]
struct FieldSpec {
    width: usize,
    zero_pad: bool,
    left_align: bool,
}

impl FieldSpec {
    fn format(&self, count: u32) -> String {
        let width = self.width;
        if self.left_align {
            format!("{:<width$}", count)
        } else if self.zero_pad {
            format!("{:0width$}", count)
        } else {
            format!("{:>width$}", count)
        }
    }
}

/// Parse `%(line)[-0][width]d` at the start of `input`
fn parse_line_field(input: &str) -> Option<(FieldSpec, &str)> {
    let mut rest = input.strip_prefix("%(line)")?;
    let mut spec = FieldSpec::default();

    loop {
        if let Some(after) = rest.strip_prefix('-') {
            spec.left_align = true;
            rest = after;
        } else if let Some(after) = rest.strip_prefix('0') {
            spec.zero_pad = true;
            rest = after;
        } else {
            break;
        }
    }

    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        spec.width = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
    }

    let rest = rest.strip_prefix('d').or_else(|| rest.strip_prefix('i'))?;
    Some((spec, rest))
}

/// Escape the characters Vim's regex engine treats specially in a prompt
pub fn vim_regex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '[' | ']' | ':' | '.' | '*' | '/' | '\\' | '~' | '^' | '$') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Dot-leader prefix for continuation lines of a rendered prompt.
///
/// One dot per character of the trimmed prompt; trailing whitespace is
/// kept as is.
pub fn continuation_prefix(prompt: &str) -> String {
    let trimmed = prompt.trim_end();
    let mut dots = ".".repeat(trimmed.chars().count());
    dots.push_str(&prompt[trimmed.len()..]);
    dots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_default_prompts() {
        assert_eq!(PromptTemplate::new("In [%(line)d]: ").render(7), "In [7]: ");
        assert_eq!(PromptTemplate::new("Out[%(line)d]: ").render(12), "Out[12]: ");
    }

    #[test]
    fn test_render_width_and_flags() {
        assert_eq!(PromptTemplate::new("In [%(line)3d]: ").render(7), "In [  7]: ");
        assert_eq!(PromptTemplate::new("[%(line)03d]").render(7), "[007]");
        assert_eq!(PromptTemplate::new("[%(line)-3d]").render(7), "[7  ]");
    }

    #[test]
    fn test_render_literal_percent() {
        assert_eq!(PromptTemplate::new("100%% [%(line)d]").render(1), "100% [1]");
        assert_eq!(PromptTemplate::new("%s [%(line)d]").render(2), "%s [2]");
        assert_eq!(PromptTemplate::new("tail %").render(2), "tail %");
    }

    #[test]
    fn test_syntax_pattern() {
        let pattern = PromptTemplate::new("In [%(line)d]: ").syntax_pattern();
        assert_eq!(pattern, "In \\[[ 0-9]*\\]\\: ");
    }

    #[test]
    fn test_continuation_prefix_keeps_trailing_space() {
        let prompt = PromptTemplate::new("In [%(line)d]: ").render(7);
        let dots = continuation_prefix(&prompt);
        assert_eq!(dots, "....... ");
        assert_eq!(dots.trim_end().len(), prompt.trim_end().len());
    }

    #[test]
    fn test_continuation_prefix_counts_chars() {
        assert_eq!(continuation_prefix("入力> "), "... ");
        assert_eq!(continuation_prefix(">>>\t"), "...\t");
    }
}
