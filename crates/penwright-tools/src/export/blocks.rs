//! Flattened Markdown document model shared by the PDF and DOCX renderers.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// A run of text with inline styling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, spans: Vec<Span> },
    Paragraph(Vec<Span>),
    /// `number` is set for ordered lists.
    ListItem { depth: usize, number: Option<u64>, spans: Vec<Span> },
    Quote(Vec<Span>),
    Code(String),
    Rule,
}

impl Block {
    pub fn plain_text(&self) -> String {
        match self {
            Block::Heading { spans, .. }
            | Block::Paragraph(spans)
            | Block::ListItem { spans, .. }
            | Block::Quote(spans) => spans.iter().map(|s| s.text.as_str()).collect(),
            Block::Code(code) => code.clone(),
            Block::Rule => String::new(),
        }
    }
}

/// Drop a leading `---` YAML front-matter block.
pub fn strip_front_matter(text: &str) -> &str {
    let trimmed = text.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed.strip_prefix("---") else {
        return text;
    };
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return text;
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end() == "---" {
            return rest[offset..].trim_start_matches(['\r', '\n']);
        }
    }
    text
}

enum Open {
    Heading(u8),
    Paragraph,
    Item { depth: usize, number: Option<u64> },
    Quote,
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    open: Option<Open>,
    spans: Vec<Span>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    bold: usize,
    italic: usize,
    code: Option<String>,
    link: Option<String>,
}

impl Builder {
    fn push_text(&mut self, text: &str, code: bool) {
        if let Some(buf) = self.code.as_mut() {
            buf.push_str(text);
            return;
        }
        if self.open.is_none() {
            self.open = Some(if self.quote_depth > 0 {
                Open::Quote
            } else {
                Open::Paragraph
            });
        }
        self.spans.push(Span {
            text: text.to_string(),
            bold: self.bold > 0,
            italic: self.italic > 0,
            code,
        });
    }

    fn flush(&mut self) {
        let spans = std::mem::take(&mut self.spans);
        let Some(open) = self.open.take() else {
            return;
        };
        if spans.iter().all(|s| s.text.trim().is_empty()) {
            return;
        }
        self.blocks.push(match open {
            Open::Heading(level) => Block::Heading { level, spans },
            Open::Paragraph => Block::Paragraph(spans),
            Open::Item { depth, number } => Block::ListItem { depth, number, spans },
            Open::Quote => Block::Quote(spans),
        });
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                self.open = Some(Open::Heading(level as u8));
            }
            Tag::Paragraph => {
                // paragraphs inside list items and quotes continue the open block
                if !matches!(self.open, Some(Open::Item { .. }) | Some(Open::Quote)) {
                    self.flush();
                    self.open = Some(if self.quote_depth > 0 {
                        Open::Quote
                    } else {
                        Open::Paragraph
                    });
                }
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().saturating_sub(1);
                let number = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let current = *n;
                        *n += 1;
                        Some(current)
                    }
                    _ => None,
                };
                self.open = Some(Open::Item { depth, number });
            }
            Tag::BlockQuote { .. } => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.code = Some(String::new());
            }
            Tag::Strong => self.bold += 1,
            Tag::Emphasis => self.italic += 1,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.to_string()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) | TagEnd::Item => self.flush(),
            TagEnd::Paragraph => {
                if matches!(self.open, Some(Open::Item { .. }) | Some(Open::Quote)) {
                    self.push_text(" ", false);
                } else {
                    self.flush();
                }
            }
            TagEnd::List { .. } => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::BlockQuote { .. } => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    self.blocks.push(Block::Code(code.trim_end().to_string()));
                }
            }
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Link => {
                if let Some(url) = self.link.take() {
                    let already_shown = self.spans.last().map(|s| s.text == url).unwrap_or(false);
                    if !already_shown && !url.is_empty() {
                        self.push_text(&format!(" ({url})"), false);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Parse Markdown into a flat list of blocks.
pub fn parse_markdown(text: &str) -> Vec<Block> {
    let mut builder = Builder::default();
    for event in Parser::new(text) {
        match event {
            Event::Start(tag) => builder.start(tag),
            Event::End(tag) => builder.end(tag),
            Event::Text(t) => builder.push_text(&t, false),
            Event::Code(t) => builder.push_text(&t, true),
            Event::SoftBreak => builder.push_text(" ", false),
            Event::HardBreak => builder.push_text("\n", false),
            Event::Rule => {
                builder.flush();
                builder.blocks.push(Block::Rule);
            }
            Event::Html(t) | Event::InlineHtml(t) => {
                let stripped = t.trim();
                if !stripped.starts_with('<') {
                    builder.push_text(stripped, false);
                }
            }
            _ => {}
        }
    }
    builder.flush();
    builder.blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_paragraphs_and_styles() {
        let blocks = parse_markdown("# Title\n\nSome **bold** and *soft* text.\n\n## Part\n");
        assert_eq!(blocks.len(), 3);
        assert!(matches!(&blocks[0], Block::Heading { level: 1, .. }));
        match &blocks[1] {
            Block::Paragraph(spans) => {
                assert!(spans.iter().any(|s| s.bold && s.text == "bold"));
                assert!(spans.iter().any(|s| s.italic && s.text == "soft"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(blocks[2].plain_text(), "Part");
    }

    #[test]
    fn ordered_and_nested_lists() {
        let blocks = parse_markdown("3. three\n4. four\n   - nested\n");
        let items: Vec<_> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::ListItem { depth, number, spans } => Some((
                    *depth,
                    *number,
                    spans.iter().map(|s| s.text.clone()).collect::<String>(),
                )),
                _ => None,
            })
            .collect();
        assert_eq!(items[0], (0, Some(3), "three".to_string()));
        assert_eq!(items[1].1, Some(4));
        assert_eq!(items[2].0, 1);
        assert_eq!(items[2].1, None);
    }

    #[test]
    fn code_blocks_and_rules() {
        let blocks = parse_markdown("```rust\nfn main() {}\n```\n\n---\n\ntext\n");
        assert_eq!(blocks[0], Block::Code("fn main() {}".into()));
        assert_eq!(blocks[1], Block::Rule);
        assert_eq!(blocks[2].plain_text(), "text");
    }

    #[test]
    fn links_keep_their_target() {
        let blocks = parse_markdown("See [docs](https://docs.rs).");
        assert_eq!(blocks[0].plain_text(), "See docs (https://docs.rs).");
    }

    #[test]
    fn quotes() {
        let blocks = parse_markdown("> quoted line\n");
        assert!(matches!(&blocks[0], Block::Quote(_)));
    }

    #[test]
    fn front_matter_is_stripped() {
        let text = "---\ntitle: \"A\"\ndate: 2026-01-01\n---\n\n# A\n";
        assert_eq!(strip_front_matter(text), "# A\n");
        assert_eq!(strip_front_matter("# No front matter"), "# No front matter");
        assert_eq!(strip_front_matter("---\nunterminated"), "---\nunterminated");
    }
}
