// ABOUTME: Renders markdown to ANSI-styled terminal text with a fixed dark theme
// Parses with pulldown-cmark, styles inline text with crossterm and highlights code blocks with syntect

use crossterm::style::{Attribute, Color, ContentStyle, StyledContent};
use lazy_static::lazy_static;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};
use std::path::{Path, PathBuf};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};
use thiserror::Error;
use tracing::debug;

/// Theme used for fenced code blocks.
pub const DARK_THEME: &str = "base16-ocean.dark";

const RESET: &str = "\x1b[0m";

lazy_static! {
    static ref SYNTAX_SET: SyntaxSet = SyntaxSet::load_defaults_newlines();
    static ref THEME_SET: ThemeSet = ThemeSet::load_defaults();
}

#[derive(Debug, Error)]
pub enum MarkdownError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Theme not found: {0}")]
    ThemeNotFound(String),
    #[error("Highlighting failed: {0}")]
    Highlight(#[from] syntect::Error),
}

/// Markdown to terminal renderer.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    width: usize,
    theme: &'static Theme,
}

impl MarkdownRenderer {
    pub fn new() -> Result<Self, MarkdownError> {
        Self::with_width(80)
    }

    /// `width` only affects horizontal rules.
    pub fn with_width(width: usize) -> Result<Self, MarkdownError> {
        let theme = THEME_SET
            .themes
            .get(DARK_THEME)
            .ok_or_else(|| MarkdownError::ThemeNotFound(DARK_THEME.to_string()))?;

        Ok(Self { width, theme })
    }

    pub fn render(&self, input: &str) -> Result<String, MarkdownError> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);

        let mut writer = Writer::new(self);
        for event in Parser::new_ext(input, options) {
            writer.handle(event)?;
        }

        Ok(writer.finish())
    }

    pub fn render_file(&self, path: &Path) -> Result<String, MarkdownError> {
        debug!("Rendering markdown file {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| MarkdownError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.render(&content)
    }

    /// Highlighted lines of `code`, without line endings.
    fn highlight(&self, code: &str, lang: &str) -> Result<Vec<String>, MarkdownError> {
        let syntax = SYNTAX_SET
            .find_syntax_by_token(lang)
            .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
        let mut highlighter = HighlightLines::new(syntax, self.theme);

        let mut lines = Vec::new();
        for line in LinesWithEndings::from(code) {
            let ranges = highlighter.highlight_line(line, &SYNTAX_SET)?;
            let escaped = as_24_bit_terminal_escaped(&ranges, false);
            lines.push(escaped.trim_end_matches('\n').to_string());
        }
        Ok(lines)
    }
}

fn heading_style(level: HeadingLevel) -> ContentStyle {
    let mut style = ContentStyle::new();
    style.attributes.set(Attribute::Bold);
    style.foreground_color = Some(match level {
        HeadingLevel::H1 => Color::Rgb { r: 255, g: 95, b: 215 },
        HeadingLevel::H2 => Color::Rgb { r: 0, g: 175, b: 255 },
        _ => Color::Rgb { r: 135, g: 175, b: 255 },
    });
    style
}

fn attribute_style(attribute: Attribute) -> ContentStyle {
    let mut style = ContentStyle::new();
    style.attributes.set(attribute);
    style
}

fn color_style(color: Color) -> ContentStyle {
    ContentStyle {
        foreground_color: Some(color),
        ..ContentStyle::new()
    }
}

/// Open block that adds a prefix to every line inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Quote,
    /// List item; continuation lines are indented by the marker width
    Item(usize),
}

struct Writer<'r> {
    renderer: &'r MarkdownRenderer,
    out: String,
    styles: Vec<ContentStyle>,
    /// One entry per open list: next item number for ordered lists
    lists: Vec<Option<u64>>,
    containers: Vec<Container>,
    code_block: Option<(String, String)>,
    link_targets: Vec<String>,
    table_cell: usize,
}

impl<'r> Writer<'r> {
    fn new(renderer: &'r MarkdownRenderer) -> Self {
        Self {
            renderer,
            out: String::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            containers: Vec::new(),
            code_block: None,
            link_targets: Vec::new(),
            table_cell: 0,
        }
    }

    fn current_style(&self) -> ContentStyle {
        self.styles.iter().fold(ContentStyle::new(), |mut acc, style| {
            if style.foreground_color.is_some() {
                acc.foreground_color = style.foreground_color;
            }
            if style.background_color.is_some() {
                acc.background_color = style.background_color;
            }
            acc.attributes.extend(style.attributes);
            acc
        })
    }

    fn text(&mut self, text: &str) {
        let style = self.current_style();
        if style == ContentStyle::new() {
            self.out.push_str(text);
        } else {
            self.out.push_str(&StyledContent::new(style, text).to_string());
        }
    }

    fn styled(&mut self, style: ContentStyle, text: &str) {
        self.styles.push(style);
        self.text(text);
        self.styles.pop();
    }

    fn newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn block_end(&mut self) {
        self.newline();
        if self.lists.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn at_line_start(&self) -> bool {
        self.out.is_empty() || self.out.ends_with('\n')
    }

    fn line_prefix(&mut self) {
        for i in 0..self.containers.len() {
            match self.containers[i] {
                Container::Quote => self.styled(color_style(Color::DarkGrey), "│ "),
                Container::Item(width) => self.out.push_str(&" ".repeat(width)),
            }
        }
    }

    /// Write the prefix of the enclosing quotes and list items when a new line begins.
    fn start_line(&mut self) {
        if self.at_line_start() {
            self.line_prefix();
        }
    }

    fn handle(&mut self, event: Event<'_>) -> Result<(), MarkdownError> {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag)?,
            Event::Text(text) => {
                if let Some((_, code)) = self.code_block.as_mut() {
                    code.push_str(&text);
                } else {
                    self.start_line();
                    self.text(&text);
                }
            }
            Event::Code(code) => {
                let style = ContentStyle {
                    foreground_color: Some(Color::Rgb { r: 255, g: 95, b: 95 }),
                    background_color: Some(Color::Rgb { r: 48, g: 48, b: 48 }),
                    ..ContentStyle::new()
                };
                self.start_line();
                self.styled(style, &format!(" {} ", code));
            }
            Event::Html(html) => {
                self.start_line();
                self.styled(color_style(Color::DarkGrey), &html);
            }
            Event::FootnoteReference(name) => {
                self.styled(color_style(Color::DarkGrey), &format!("[^{}]", name));
            }
            Event::SoftBreak => self.out.push(' '),
            Event::HardBreak => {
                self.out.push('\n');
                self.line_prefix();
            }
            Event::Rule => {
                self.newline();
                self.start_line();
                let rule = "─".repeat(self.renderer.width);
                self.styled(color_style(Color::DarkGrey), &rule);
                self.block_end();
            }
            Event::TaskListMarker(checked) => {
                self.out.push_str(if checked { "[✓] " } else { "[ ] " });
            }
        }
        Ok(())
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.start_line(),
            Tag::Heading(level, _, _) => {
                self.newline();
                self.start_line();
                self.styles.push(heading_style(level));
                let marker = format!("{} ", "#".repeat(level as usize));
                self.text(&marker);
            }
            Tag::BlockQuote => {
                self.newline();
                self.containers.push(Container::Quote);
                self.styles.push(attribute_style(Attribute::Italic));
            }
            Tag::CodeBlock(kind) => {
                self.newline();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.code_block = Some((lang, String::new()));
            }
            Tag::List(start) => {
                self.newline();
                self.lists.push(start);
            }
            Tag::Item => {
                self.newline();
                self.start_line();
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{}. ", n);
                        *n += 1;
                        bullet
                    }
                    _ => "• ".to_string(),
                };
                let marker = format!("  {}", bullet);
                self.out.push_str(&marker);
                self.containers.push(Container::Item(marker.chars().count()));
            }
            Tag::FootnoteDefinition(name) => {
                self.newline();
                self.start_line();
                self.styled(color_style(Color::DarkGrey), &format!("[^{}]: ", name));
            }
            Tag::Table(_) => self.newline(),
            Tag::TableHead => {
                self.start_line();
                self.table_cell = 0;
                self.styles.push(attribute_style(Attribute::Bold));
            }
            Tag::TableRow => {
                self.start_line();
                self.table_cell = 0;
            }
            Tag::TableCell => {
                if self.table_cell > 0 {
                    self.styled(color_style(Color::DarkGrey), " │ ");
                }
                self.table_cell += 1;
            }
            Tag::Emphasis => self.styles.push(attribute_style(Attribute::Italic)),
            Tag::Strong => self.styles.push(attribute_style(Attribute::Bold)),
            Tag::Strikethrough => self.styles.push(attribute_style(Attribute::CrossedOut)),
            Tag::Link(_, dest, _) => {
                let mut style = color_style(Color::Rgb { r: 0, g: 135, b: 175 });
                style.attributes.set(Attribute::Underlined);
                self.styles.push(style);
                self.link_targets.push(dest.to_string());
            }
            Tag::Image(_, dest, _) => {
                self.styles.push(color_style(Color::Rgb { r: 0, g: 135, b: 175 }));
                self.text("Image: ");
                self.link_targets.push(dest.to_string());
            }
        }
    }

    fn end(&mut self, tag: Tag<'_>) -> Result<(), MarkdownError> {
        match tag {
            Tag::Paragraph => self.block_end(),
            Tag::Heading(..) => {
                self.styles.pop();
                self.block_end();
            }
            Tag::BlockQuote => {
                self.styles.pop();
                self.containers.pop();
                self.block_end();
            }
            Tag::CodeBlock(_) => {
                if let Some((lang, code)) = self.code_block.take() {
                    for line in self.renderer.highlight(&code, &lang)? {
                        self.start_line();
                        self.out.push_str("  ");
                        self.out.push_str(&line);
                        self.out.push_str(RESET);
                        self.out.push('\n');
                    }
                }
                self.block_end();
            }
            Tag::List(_) => {
                self.lists.pop();
                self.block_end();
            }
            Tag::Item => {
                self.newline();
                self.containers.pop();
            }
            Tag::FootnoteDefinition(_) | Tag::TableRow => self.newline(),
            Tag::Table(_) => self.block_end(),
            Tag::TableHead => {
                self.styles.pop();
                self.newline();
            }
            Tag::TableCell => {}
            Tag::Emphasis | Tag::Strong | Tag::Strikethrough => {
                self.styles.pop();
            }
            Tag::Link(..) | Tag::Image(..) => {
                self.styles.pop();
                if let Some(dest) = self.link_targets.pop() {
                    self.styled(color_style(Color::DarkGrey), &format!(" ({})", dest));
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> String {
        let mut out = self.out.trim_end().to_string();
        out.push('\n');
        out
    }
}
