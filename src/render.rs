//! Scratch buffer rendering
//!
//! One refresh pass:
//!
//! 1. Put the scratch buffer in the preview window (creating and
//!    configuring it when the preview shows something else)
//! 2. Re-apply prompt highlighting from the current settings
//! 3. Drain the kernel output queue and append the classified lines
//! 4. Keep exactly one blank line at the end, scroll to it
//! 5. Give focus back to the window the pass started from

use tracing::debug;

use crate::classify::Classifier;
use crate::config::{ColorConfig, Config};
use crate::kernel::KernelClient;
use crate::prompt::PromptTemplate;
use crate::surface::{DisplaySurface, SurfaceError};

pub const PROMPT_IN_GROUP: &str = "IPyPromptIn";
pub const PROMPT_OUT_GROUP: &str = "IPyPromptOut";
pub const PROMPT_CONTINUATION_GROUP: &str = "IPyPromptOut2";

/// Dot-leader at the start of a continuation line
const CONTINUATION_PATTERN: &str = r"\.\.\.* ";

/// Settings read at the start of every pass; Vim globals win over the file
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub input: PromptTemplate,
    pub output: PromptTemplate,
    pub colors: ColorConfig,
    pub blank_lines: u32,
}

impl RenderSettings {
    pub fn resolve(config: &Config, surface: &mut dyn DisplaySurface) -> Result<Self, SurfaceError> {
        let mut text = |name: &str, fallback: &str| -> Result<String, SurfaceError> {
            Ok(surface
                .variable(name)?
                .unwrap_or_else(|| fallback.to_string()))
        };

        let colors = &config.colors;
        let resolved_colors = ColorConfig {
            in_console: text("g:ipy_status_in_console_color", &colors.in_console)?,
            in_gui: text("g:ipy_status_in_gui_color", &colors.in_gui)?,
            out_console: text("g:ipy_status_out_console_color", &colors.out_console)?,
            out_gui: text("g:ipy_status_out_gui_color", &colors.out_gui)?,
            continuation_console: text(
                "g:ipy_status_out2_console_color",
                &colors.continuation_console,
            )?,
            continuation_gui: text("g:ipy_status_out2_gui_color", &colors.continuation_gui)?,
        };

        let input = text("g:ipy_status_in", &config.prompt.input)?;
        let output = text("g:ipy_status_out", &config.prompt.output)?;
        let blank_lines = text("g:ipy_status_blank_lines", "")?
            .trim()
            .parse()
            .unwrap_or(config.buffer.blank_lines);

        Ok(Self {
            input: PromptTemplate::new(input),
            output: PromptTemplate::new(output),
            colors: resolved_colors,
            blank_lines,
        })
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.input.clone(), self.output.clone())
    }

    fn apply_highlighting(&self, surface: &mut dyn DisplaySurface) -> Result<(), SurfaceError> {
        let colors = &self.colors;
        surface.highlight(PROMPT_IN_GROUP, &colors.in_console, &colors.in_gui)?;
        surface.highlight(PROMPT_OUT_GROUP, &colors.out_console, &colors.out_gui)?;
        surface.highlight(
            PROMPT_CONTINUATION_GROUP,
            &colors.continuation_console,
            &colors.continuation_gui,
        )?;

        surface.syntax_match(PROMPT_IN_GROUP, &self.input.syntax_pattern())?;
        surface.syntax_match(PROMPT_OUT_GROUP, &self.output.syntax_pattern())?;
        surface.syntax_match(PROMPT_CONTINUATION_GROUP, CONTINUATION_PATTERN)?;
        Ok(())
    }
}

/// Run one refresh pass, returning whether any output was rendered.
///
/// Without `force` nothing happens unless the scratch buffer is already
/// visible.
pub fn refresh(
    client: &mut dyn KernelClient,
    surface: &mut dyn DisplaySurface,
    config: &Config,
    force: bool,
) -> Result<bool, SurfaceError> {
    let scratch = config.buffer.name.as_str();
    if !force && !surface.is_visible(scratch)? {
        return Ok(false);
    }

    let started_in_scratch = surface.focused_buffer()? == scratch;
    if !started_in_scratch {
        show_scratch(surface, scratch)?;
    }

    let settings = RenderSettings::resolve(config, surface)?;
    settings.apply_highlighting(surface)?;

    let messages = client.drain_output();
    let mut lines = settings.classifier().render_lines(&messages);
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    let updated = !lines.is_empty();
    if updated {
        surface.append_lines(&lines)?;
    }

    // Leave an empty line to type at
    if settings.blank_lines > 0 && !surface.last_line()?.is_empty() {
        surface.append_lines(&[String::new()])?;
    }

    if updated || force {
        surface.cursor_to_end()?;
    }
    if !started_in_scratch {
        surface.focus_previous()?;
    }

    debug!(messages = messages.len(), lines = lines.len(), "refresh pass");
    Ok(updated)
}

/// Focus the scratch buffer in the preview window
fn show_scratch(surface: &mut dyn DisplaySurface, scratch: &str) -> Result<(), SurfaceError> {
    surface.focus_preview()?;
    if surface.focused_buffer()? == scratch {
        surface.fit_preview()?;
    } else {
        surface.replace_preview(scratch)?;
        surface.configure_scratch()?;
    }
    Ok(())
}
