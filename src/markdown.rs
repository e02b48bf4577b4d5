//! Markdown bodies (self text, comments) laid out as wrapped terminal lines.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, Copy)]
pub struct MarkdownStyle {
    pub text: Style,
    pub heading: Style,
    pub quote: Style,
    pub code: Style,
    pub marker: Style,
}

impl MarkdownStyle {
    pub fn new(dark_mode: bool) -> Self {
        if dark_mode {
            Self {
                text: Style::default().fg(Color::Gray),
                heading: Style::default().fg(Color::Yellow),
                quote: Style::default().fg(Color::Green),
                code: Style::default().fg(Color::Cyan),
                marker: Style::default().fg(Color::Yellow),
            }
        } else {
            Self {
                text: Style::default().fg(Color::Black),
                heading: Style::default().fg(Color::Blue),
                quote: Style::default().fg(Color::DarkGray),
                code: Style::default().fg(Color::Magenta),
                marker: Style::default().fg(Color::Blue),
            }
        }
    }

    fn heading_style(&self, level: u8) -> Style {
        match level {
            1 => self
                .heading
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
            _ => self.heading.add_modifier(Modifier::BOLD),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Paragraph(String),
    Heading(u8, String),
    Item {
        depth: usize,
        marker: String,
        text: String,
    },
    Quote {
        depth: usize,
        text: String,
    },
    Code(Vec<String>),
    Rule,
}

impl Block {
    fn is_item(&self) -> bool {
        matches!(self, Block::Item { .. })
    }
}

/// Renders `input` wrapped to `width` columns. Empty input gives no lines.
pub fn render(input: &str, width: usize, style: &MarkdownStyle) -> Vec<Line<'static>> {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_TASKLISTS);

    let mut collector = Collector::default();
    for event in Parser::new_ext(input, opts) {
        collector.event(event);
    }
    collector.flush();
    layout(&collector.blocks, width, style)
}

#[derive(Default)]
struct Collector {
    blocks: Vec<Block>,
    buffer: String,
    lists: Vec<Option<u64>>,
    item: Option<(usize, String)>,
    quote_depth: usize,
    heading: Option<u8>,
    code: Option<String>,
    link: Option<(String, usize)>,
}

impl Collector {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => match self.code.as_mut() {
                Some(code) => code.push_str(&text),
                None => self.buffer.push_str(&text),
            },
            Event::Code(code) => {
                self.buffer.push('`');
                self.buffer.push_str(&code);
                self.buffer.push('`');
            }
            Event::SoftBreak => self.buffer.push(' '),
            Event::HardBreak => self.buffer.push('\n'),
            Event::Rule => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            Event::TaskListMarker(done) => {
                self.buffer.push_str(if done { "[x] " } else { "[ ] " });
            }
            Event::FootnoteReference(name) => {
                self.buffer.push_str(&format!("[{name}]"));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.flush(),
            Tag::Heading { level, .. } => {
                self.flush();
                self.heading = Some(heading_level(level));
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.blocks.push(Block::Paragraph(format!("[{lang}]")));
                    }
                }
                self.code = Some(String::new());
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(next)) => {
                        let marker = format!("{next}.");
                        *next += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                self.item = Some((depth, marker));
            }
            Tag::Link { dest_url, .. } => {
                self.link = Some((dest_url.into_string(), self.buffer.len()));
            }
            Tag::Image { .. } => self.buffer.push_str("[image] "),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) => self.flush(),
            TagEnd::BlockQuote => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    let lines = code
                        .trim_end_matches('\n')
                        .split('\n')
                        .map(str::to_string)
                        .collect();
                    self.blocks.push(Block::Code(lines));
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::Item => {
                self.flush();
                self.item = None;
            }
            TagEnd::Link => {
                if let Some((url, start)) = self.link.take() {
                    let label = self.buffer.get(start..).unwrap_or_default();
                    if label.trim() != url {
                        self.buffer.push_str(&format!(" ({url})"));
                    }
                }
            }
            TagEnd::TableCell => self.buffer.push_str(" | "),
            TagEnd::TableHead | TagEnd::TableRow => self.flush(),
            _ => {}
        }
    }

    fn flush(&mut self) {
        let text = self.buffer.trim().to_string();
        self.buffer.clear();
        if text.is_empty() {
            return;
        }

        if let Some(level) = self.heading.take() {
            self.blocks.push(Block::Heading(level, text));
        } else if let Some((depth, marker)) = self.item.as_mut() {
            // Later paragraphs of the same item continue without a marker.
            self.blocks.push(Block::Item {
                depth: *depth,
                marker: std::mem::take(marker),
                text,
            });
        } else if self.quote_depth > 0 {
            self.blocks.push(Block::Quote {
                depth: self.quote_depth,
                text,
            });
        } else {
            self.blocks.push(Block::Paragraph(text));
        }
    }
}

fn layout(blocks: &[Block], width: usize, style: &MarkdownStyle) -> Vec<Line<'static>> {
    let width = width.max(10);
    let mut lines = Vec::new();
    let mut previous: Option<&Block> = None;

    for block in blocks {
        if let Some(prev) = previous {
            if !(prev.is_item() && block.is_item()) {
                lines.push(Line::default());
            }
        }
        match block {
            Block::Paragraph(text) => {
                push_wrapped(&mut lines, text, width, Prefix::none(), style.text);
            }
            Block::Heading(level, text) => {
                push_wrapped(
                    &mut lines,
                    text,
                    width,
                    Prefix::none(),
                    style.heading_style(*level),
                );
            }
            Block::Item {
                depth,
                marker,
                text,
            } => {
                let indent = "  ".repeat(*depth);
                let marker_width = if marker.is_empty() {
                    0
                } else {
                    marker.width() + 1
                };
                let first = if marker.is_empty() {
                    format!("{indent}  ")
                } else {
                    format!("{indent}{marker} ")
                };
                let rest = format!("{indent}{}", " ".repeat(marker_width.max(2)));
                push_wrapped(
                    &mut lines,
                    text,
                    width,
                    Prefix {
                        first,
                        rest,
                        style: style.marker,
                    },
                    style.text,
                );
            }
            Block::Quote { depth, text } => {
                let bar = "│ ".repeat(*depth);
                push_wrapped(
                    &mut lines,
                    text,
                    width,
                    Prefix {
                        first: bar.clone(),
                        rest: bar,
                        style: style.quote,
                    },
                    style.quote,
                );
            }
            Block::Code(code) => {
                for line in code {
                    lines.push(Line::from(Span::styled(format!("  {line}"), style.code)));
                }
            }
            Block::Rule => {
                lines.push(Line::from(Span::styled(
                    "─".repeat(width.min(40)),
                    style.marker,
                )));
            }
        }
        previous = Some(block);
    }
    lines
}

struct Prefix {
    first: String,
    rest: String,
    style: Style,
}

impl Prefix {
    fn none() -> Self {
        Self {
            first: String::new(),
            rest: String::new(),
            style: Style::default(),
        }
    }
}

fn push_wrapped(
    lines: &mut Vec<Line<'static>>,
    text: &str,
    width: usize,
    prefix: Prefix,
    text_style: Style,
) {
    let mut first = true;
    for hard_line in text.split('\n') {
        let lead = if first { &prefix.first } else { &prefix.rest };
        let available = width.saturating_sub(lead.width()).max(1);
        for segment in textwrap::wrap(hard_line.trim(), available) {
            let lead = if first { &prefix.first } else { &prefix.rest };
            first = false;
            let mut spans = Vec::with_capacity(2);
            if !lead.is_empty() {
                spans.push(Span::styled(lead.clone(), prefix.style));
            }
            spans.push(Span::styled(segment.into_owned(), text_style));
            lines.push(Line::from(spans));
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(input: &str, width: usize) -> Vec<String> {
        render(input, width, &MarkdownStyle::new(true))
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn paragraphs_are_separated_by_blank_lines() {
        assert_eq!(plain("one\n\ntwo", 40), vec!["one", "", "two"]);
    }

    #[test]
    fn long_text_wraps_to_width() {
        let lines = plain("alpha beta gamma delta epsilon", 12);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.width() <= 12));
    }

    #[test]
    fn list_markers_and_nesting() {
        let lines = plain("- apples\n- pears\n  1. green\n  2. red", 40);
        assert_eq!(lines, vec!["• apples", "• pears", "  1. green", "  2. red"]);
    }

    #[test]
    fn quotes_and_code_blocks() {
        let lines = plain("> quoted text\n\n```rust\nfn main() {}\n```", 40);
        assert_eq!(lines, vec!["│ quoted text", "", "[rust]", "", "  fn main() {}"]);
    }

    #[test]
    fn links_show_their_target_once() {
        assert_eq!(
            plain("see [docs](https://docs.rs)", 60),
            vec!["see docs (https://docs.rs)"]
        );
        assert_eq!(plain("<https://docs.rs>", 60), vec!["https://docs.rs"]);
    }

    #[test]
    fn headings_are_bold() {
        let lines = render("# Title", 40, &MarkdownStyle::new(false));
        let span = &lines[0].spans[0];
        assert_eq!(span.content, "Title");
        assert!(span.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert!(plain("", 40).is_empty());
        assert!(plain("   \n\n", 40).is_empty());
    }
}
