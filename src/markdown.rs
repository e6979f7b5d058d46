//! Markdown to styled terminal text.
//!
//! Raw HTML in an entry is shown as literal text; nothing in the content is
//! ever interpreted beyond markdown formatting.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};

enum Block {
    Heading(HeadingLevel),
    Paragraph,
    Quote,
    CodeBlock,
    HtmlBlock,
    List(Option<u64>),
    Item,
    Emphasis,
    Strong,
    Strikethrough,
    Link(String),
    Other,
}

#[derive(Default)]
struct Renderer {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    stack: Vec<Block>,
    pending_prefix: Option<String>,
}

pub fn render(content: &str) -> Text<'static> {
    let mut renderer = Renderer::default();
    let parser = Parser::new_ext(content, Options::ENABLE_STRIKETHROUGH);

    for event in parser {
        match event {
            Event::Start(tag) => renderer.start(tag),
            Event::End(_) => renderer.end(),
            Event::Text(text) => {
                if renderer.in_code_block() {
                    renderer.code_block_text(&text);
                } else {
                    renderer.push(text.into_string());
                }
            }
            Event::Code(code) => {
                let style = renderer.style().fg(Color::Yellow);
                renderer.push_styled(code.into_string(), style);
            }
            Event::Html(html) => {
                let style = renderer.style().add_modifier(Modifier::DIM);
                for line in html.lines() {
                    renderer.push_styled(line.to_string(), style);
                    renderer.flush();
                }
            }
            Event::InlineHtml(html) => {
                let style = renderer.style().add_modifier(Modifier::DIM);
                renderer.push_styled(html.into_string(), style);
            }
            Event::SoftBreak => renderer.push(" ".to_string()),
            Event::HardBreak => renderer.flush(),
            Event::Rule => {
                renderer.blank_line();
                renderer.push_styled("─".repeat(24), Style::default().fg(Color::DarkGray));
                renderer.flush();
            }
            _ => {}
        }
    }
    renderer.flush();

    Text::from(renderer.lines)
}

impl Renderer {
    fn start(&mut self, tag: Tag<'_>) {
        let block = match tag {
            Tag::Heading { level, .. } => {
                self.blank_line();
                Block::Heading(level)
            }
            Tag::Paragraph => {
                if !self.in_item() {
                    self.blank_line();
                }
                Block::Paragraph
            }
            Tag::BlockQuote(_) => {
                self.blank_line();
                Block::Quote
            }
            Tag::CodeBlock(kind) => {
                self.blank_line();
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.push_styled(
                            format!("```{lang}"),
                            Style::default().fg(Color::DarkGray),
                        );
                        self.flush();
                    }
                }
                Block::CodeBlock
            }
            Tag::HtmlBlock => {
                self.blank_line();
                Block::HtmlBlock
            }
            Tag::List(start) => {
                if !self.in_item() {
                    self.blank_line();
                } else {
                    self.flush();
                }
                Block::List(start)
            }
            Tag::Item => {
                self.flush();
                let depth = self
                    .stack
                    .iter()
                    .filter(|b| matches!(b, Block::List(_)))
                    .count();
                let indent = "  ".repeat(depth.saturating_sub(1));
                let marker = match self.stack.iter_mut().rev().find_map(|b| match b {
                    Block::List(start) => Some(start),
                    _ => None,
                }) {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.pending_prefix = Some(format!("{indent}{marker}"));
                Block::Item
            }
            Tag::Emphasis => Block::Emphasis,
            Tag::Strong => Block::Strong,
            Tag::Strikethrough => Block::Strikethrough,
            Tag::Link { dest_url, .. } => Block::Link(dest_url.into_string()),
            _ => Block::Other,
        };
        self.stack.push(block);
    }

    fn end(&mut self) {
        match self.stack.pop() {
            Some(
                Block::Heading(_)
                | Block::Paragraph
                | Block::CodeBlock
                | Block::HtmlBlock
                | Block::Item,
            ) => self.flush(),
            Some(Block::Link(url)) => {
                if !url.is_empty() {
                    self.push_styled(format!(" <{url}>"), Style::default().fg(Color::DarkGray));
                }
            }
            _ => {}
        }
    }

    fn style(&self) -> Style {
        self.stack
            .iter()
            .fold(Style::default(), |style, block| match block {
                Block::Heading(HeadingLevel::H1) => style
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                Block::Heading(_) => style.fg(Color::Cyan).add_modifier(Modifier::BOLD),
                Block::Quote => style.fg(Color::Gray).add_modifier(Modifier::ITALIC),
                Block::CodeBlock => style.fg(Color::Yellow),
                Block::Emphasis => style.add_modifier(Modifier::ITALIC),
                Block::Strong => style.add_modifier(Modifier::BOLD),
                Block::Strikethrough => style.add_modifier(Modifier::CROSSED_OUT),
                Block::Link(_) => style.fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
                _ => style,
            })
    }

    fn in_code_block(&self) -> bool {
        self.stack.iter().any(|b| matches!(b, Block::CodeBlock))
    }

    fn in_item(&self) -> bool {
        self.stack.iter().any(|b| matches!(b, Block::Item))
    }

    fn quote_depth(&self) -> usize {
        self.stack
            .iter()
            .filter(|b| matches!(b, Block::Quote))
            .count()
    }

    fn push(&mut self, text: String) {
        let style = self.style();
        self.push_styled(text, style);
    }

    fn push_styled(&mut self, text: String, style: Style) {
        if self.current.is_empty() {
            let quote = "│ ".repeat(self.quote_depth());
            if !quote.is_empty() {
                self.current
                    .push(Span::styled(quote, Style::default().fg(Color::DarkGray)));
            }
            if let Some(prefix) = self.pending_prefix.take() {
                self.current.push(Span::raw(prefix));
            }
        }
        self.current.push(Span::styled(text, style));
    }

    fn code_block_text(&mut self, text: &str) {
        let style = self.style();
        for line in text.lines() {
            self.push_styled(format!("  {line}"), style);
            self.flush();
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.lines.push(Line::from(std::mem::take(&mut self.current)));
        }
    }

    /// Separates blocks with one empty line, never at the top.
    fn blank_line(&mut self) {
        self.flush();
        if self.lines.last().is_some_and(|line| !line.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }
}
