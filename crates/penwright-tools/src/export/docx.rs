use std::fs::File;
use std::path::Path;

use docx_rs::{Docx, Paragraph, Run, RunFonts};

use super::blocks::{parse_markdown, strip_front_matter, Block, Span};

// docx sizes are in half-points
fn heading_size(level: u8) -> usize {
    match level {
        1 => 40,
        2 => 32,
        3 => 26,
        _ => 24,
    }
}

fn styled_run(span: &Span, size: usize, force_bold: bool, force_italic: bool) -> Run {
    let mut run = Run::new().add_text(&span.text).size(size);
    if span.bold || force_bold {
        run = run.bold();
    }
    if span.italic || force_italic {
        run = run.italic();
    }
    if span.code {
        run = run.fonts(RunFonts::new().ascii("Courier New").hi_ansi("Courier New"));
    }
    run
}

fn paragraph(spans: &[Span], size: usize, bold: bool, italic: bool) -> Paragraph {
    spans.iter().fold(Paragraph::new(), |p, span| {
        p.add_run(styled_run(span, size, bold, italic))
    })
}

pub(crate) fn build(markdown: &str) -> Docx {
    let mut doc = Docx::new();

    for block in parse_markdown(strip_front_matter(markdown)) {
        doc = match block {
            Block::Heading { level, spans } => {
                doc.add_paragraph(paragraph(&spans, heading_size(level), true, false))
            }
            Block::Paragraph(spans) => doc.add_paragraph(paragraph(&spans, 22, false, false)),
            Block::ListItem {
                depth,
                number,
                spans,
            } => {
                let marker = match number {
                    Some(n) => format!("{}{n}. ", "    ".repeat(depth)),
                    None => format!("{}\u{2022} ", "    ".repeat(depth)),
                };
                let p = Paragraph::new().add_run(Run::new().add_text(marker).size(22));
                doc.add_paragraph(
                    spans
                        .iter()
                        .fold(p, |p, span| p.add_run(styled_run(span, 22, false, false))),
                )
            }
            Block::Quote(spans) => doc.add_paragraph(paragraph(&spans, 22, false, true)),
            Block::Code(code) => code.lines().fold(doc, |doc, line| {
                doc.add_paragraph(
                    Paragraph::new().add_run(
                        Run::new()
                            .add_text(line)
                            .size(18)
                            .fonts(RunFonts::new().ascii("Courier New").hi_ansi("Courier New")),
                    ),
                )
            }),
            Block::Rule => doc.add_paragraph(Paragraph::new()),
        };
    }
    doc
}

/// Render Markdown into a DOCX file at `path`.
pub(crate) fn render(markdown: &str, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    build(markdown)
        .build()
        .pack(file)
        .map_err(|e| e.to_string())
}
