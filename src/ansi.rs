//! ANSI escape sequence stripping
//!
//! Kernel output (tracebacks, colored `print` calls) arrives with SGR color
//! codes and the occasional cursor or title sequence. Vim shows those bytes
//! literally, so every piece of kernel text passes through [`strip_escapes`]
//! before it reaches the scratch buffer.
//!
//! The stripper is a small VT state machine: it walks the same states a
//! terminal parser would (escape, CSI, OSC) but only decides what to drop.
//! Its output never contains ESC or a C1 introducer, which makes stripping
//! idempotent.

const ESC: char = '\x1b';
const BEL: char = '\x07';
/// C1 Control Sequence Introducer
const C1_CSI: char = '\u{9b}';
/// C1 Operating System Command
const C1_OSC: char = '\u{9d}';
/// C1 String Terminator
const C1_ST: char = '\u{9c}';

#[derive(Clone, Copy, Default, PartialEq, Debug)]
enum StripState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    Csi,
    OscString,
    EscapeInOsc, // ESC received within OSC, waiting for backslash
}

/// Streaming escape stripper
#[derive(Default)]
pub struct EscapeStripper {
    state: StripState,
}

impl EscapeStripper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a single character, returning it if it is visible text
    pub fn feed(&mut self, ch: char) -> Option<char> {
        match self.state {
            StripState::Ground => self.ground(ch),
            StripState::Escape => self.escape(ch),
            StripState::EscapeIntermediate => self.escape_intermediate(ch),
            StripState::Csi => self.csi(ch),
            StripState::OscString => self.osc_string(ch),
            StripState::EscapeInOsc => self.escape_in_osc(ch),
        }
    }

    fn ground(&mut self, ch: char) -> Option<char> {
        match ch {
            ESC => {
                self.state = StripState::Escape;
                None
            }
            C1_CSI => {
                self.state = StripState::Csi;
                None
            }
            C1_OSC => {
                self.state = StripState::OscString;
                None
            }
            _ => Some(ch),
        }
    }

    fn escape(&mut self, ch: char) -> Option<char> {
        match ch {
            '[' => {
                self.state = StripState::Csi;
                None
            }
            ']' => {
                self.state = StripState::OscString;
                None
            }
            ESC => None,
            '\x20'..='\x2f' => {
                self.state = StripState::EscapeIntermediate;
                None
            }
            // Two-character sequences (DECSC, RI, RIS, ...)
            '\x30'..='\x7e' => {
                self.state = StripState::Ground;
                None
            }
            _ => self.abort(ch),
        }
    }

    fn escape_intermediate(&mut self, ch: char) -> Option<char> {
        match ch {
            '\x20'..='\x2f' => None,
            '\x30'..='\x7e' => {
                // Charset selection and friends
                self.state = StripState::Ground;
                None
            }
            _ => self.abort(ch),
        }
    }

    fn csi(&mut self, ch: char) -> Option<char> {
        match ch {
            // Parameter and intermediate bytes
            '\x20'..='\x3f' => None,
            // Final byte
            '\x40'..='\x7e' => {
                self.state = StripState::Ground;
                None
            }
            _ => self.abort(ch),
        }
    }

    fn osc_string(&mut self, ch: char) -> Option<char> {
        match ch {
            BEL | C1_ST => {
                self.state = StripState::Ground;
            }
            ESC => {
                self.state = StripState::EscapeInOsc;
            }
            _ => {}
        }
        None
    }

    fn escape_in_osc(&mut self, ch: char) -> Option<char> {
        if ch == '\\' {
            // ST (ESC \)
            self.state = StripState::Ground;
            None
        } else {
            // Unterminated OSC, treat this as the start of a new escape
            self.state = StripState::Escape;
            self.escape(ch)
        }
    }

    /// Malformed sequence: drop what was collected and resume as text
    fn abort(&mut self, ch: char) -> Option<char> {
        self.state = StripState::Ground;
        self.ground(ch)
    }
}

/// Remove every escape sequence from `text`.
///
/// An unterminated sequence at the end of the input is dropped.
pub fn strip_escapes(text: &str) -> String {
    if !text.contains(&[ESC, C1_CSI, C1_OSC][..]) {
        return text.to_string();
    }

    let mut stripper = EscapeStripper::new();
    text.chars().filter_map(|ch| stripper.feed(ch)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sgr_colors() {
        let input = "\x1b[0;31mZeroDivisionError\x1b[0m: division by zero";
        assert_eq!(strip_escapes(input), "ZeroDivisionError: division by zero");
    }

    #[test]
    fn test_strip_erase_and_cursor_sequences() {
        assert_eq!(strip_escapes("abc\x1b[K"), "abc");
        assert_eq!(strip_escapes("\x1b[5;10Hxy\x1b[?25l"), "xy");
        assert_eq!(strip_escapes("\x1b[38;5;208morange\x1b[39m"), "orange");
    }

    #[test]
    fn test_strip_osc_title() {
        assert_eq!(strip_escapes("\x1b]0;title\x07text"), "text");
        assert_eq!(strip_escapes("\x1b]2;title\x1b\\text"), "text");
    }

    #[test]
    fn test_strip_c1_csi() {
        assert_eq!(strip_escapes("a\u{9b}1mb"), "ab");
    }

    #[test]
    fn test_plain_text_untouched() {
        let input = "In [3]: print('héllo')\n\tindented";
        assert_eq!(strip_escapes(input), input);
    }

    #[test]
    fn test_unterminated_sequence_dropped() {
        assert_eq!(strip_escapes("value\x1b[31"), "value");
        assert_eq!(strip_escapes("value\x1b"), "value");
    }

    #[test]
    fn test_malformed_sequence_keeps_text() {
        // A newline inside a CSI sequence aborts it
        assert_eq!(strip_escapes("a\x1b[3\nb"), "a\nb");
    }

    #[test]
    fn test_strip_is_idempotent() {
        let inputs = [
            "\x1b[1;32mok\x1b[0m",
            "\x1b\x1b[31mx",
            "\x1b]0;t\x1bZrest",
            "\x1b[31",
            "\x1b(Bplain",
            "\u{9d}osc\u{9c}after",
        ];
        for input in inputs {
            let once = strip_escapes(input);
            assert_eq!(strip_escapes(&once), once, "input {:?}", input);
            assert!(!once.contains('\x1b'), "input {:?}", input);
            assert!(!once.contains(C1_CSI), "input {:?}", input);
        }
    }
}
