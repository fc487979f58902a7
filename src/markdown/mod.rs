// ABOUTME: Markdown rendering for terminal display

pub mod renderer;

pub use renderer::{MarkdownError, MarkdownRenderer, DARK_THEME};

use std::path::Path;

/// Render a markdown string with the default dark theme.
pub fn render(input: &str) -> Result<String, MarkdownError> {
    MarkdownRenderer::new()?.render(input)
}

/// Read `path` and render its contents.
pub fn render_file(path: &Path) -> Result<String, MarkdownError> {
    MarkdownRenderer::new()?.render_file(path)
}
