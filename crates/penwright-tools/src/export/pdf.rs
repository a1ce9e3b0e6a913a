use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};

use super::blocks::{parse_markdown, strip_front_matter, Block};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const PT_TO_MM: f32 = 0.3528;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH: f32 = 0.5;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    mono: IndirectFontRef,
}

struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    fonts: Fonts,
    y: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, String> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let font = |f| doc.add_builtin_font(f).map_err(|e| e.to_string());
        let fonts = Fonts {
            regular: font(BuiltinFont::Helvetica)?,
            bold: font(BuiltinFont::HelveticaBold)?,
            italic: font(BuiltinFont::HelveticaOblique)?,
            mono: font(BuiltinFont::Courier)?,
        };
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            fonts,
            y: PAGE_HEIGHT - MARGIN,
        })
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    /// Write wrapped lines of one style, breaking pages as needed.
    fn text(&mut self, text: &str, size: f32, font: FontKind, indent: f32) {
        let line_height = size * PT_TO_MM * 1.4;
        let usable = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let max_chars = (usable / (size * PT_TO_MM * AVG_GLYPH)).max(10.0) as usize;

        for line in wrap(&to_win_ansi(text), max_chars) {
            self.ensure_room(line_height);
            self.y -= line_height;
            let font = match font {
                FontKind::Regular => &self.fonts.regular,
                FontKind::Bold => &self.fonts.bold,
                FontKind::Italic => &self.fonts.italic,
                FontKind::Mono => &self.fonts.mono,
            };
            self.layer.use_text(line, size, Mm(MARGIN + indent), Mm(self.y), font);
        }
    }

    fn save(self, path: &Path) -> Result<(), String> {
        let file = File::create(path).map_err(|e| e.to_string())?;
        self.doc
            .save(&mut BufWriter::new(file))
            .map_err(|e| e.to_string())
    }
}

#[derive(Clone, Copy)]
enum FontKind {
    Regular,
    Bold,
    Italic,
    Mono,
}

/// Greedy word wrap on character counts. Explicit newlines and leading
/// indentation are kept.
pub(crate) fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let mut line: String = raw.chars().take_while(|c| c.is_whitespace()).collect();
        let mut has_word = false;
        for word in raw.split_whitespace() {
            let mut word = word.to_string();
            // hard-split words longer than a line (URLs)
            while word.chars().count() > max_chars {
                if has_word {
                    lines.push(std::mem::take(&mut line));
                    has_word = false;
                }
                let head: String = word.chars().take(max_chars).collect();
                word = word.chars().skip(max_chars).collect();
                lines.push(head);
                line.clear();
            }
            if has_word && line.chars().count() + 1 + word.chars().count() > max_chars {
                lines.push(std::mem::take(&mut line));
                has_word = false;
            }
            if has_word {
                line.push(' ');
            }
            line.push_str(&word);
            has_word = true;
        }
        lines.push(line);
    }
    // drop trailing empties produced by a final newline
    while lines.len() > 1 && lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines
}

/// Builtin PDF fonts only cover WinAnsi; map common typography and drop the rest.
fn to_win_ansi(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2026}' => '.',
            '\u{2022}' => '-',
            c if (c as u32) < 0x100 => c,
            _ => '?',
        })
        .collect()
}

/// Render Markdown into an A4 PDF at `path`.
pub(crate) fn render(markdown: &str, title: &str, path: &Path) -> Result<(), String> {
    let mut pdf = PdfWriter::new(title)?;

    for block in parse_markdown(strip_front_matter(markdown)) {
        match &block {
            Block::Heading { level, .. } => {
                let size = match level {
                    1 => 20.0,
                    2 => 16.0,
                    3 => 13.0,
                    _ => 12.0,
                };
                pdf.gap(size * PT_TO_MM * 0.6);
                pdf.text(&block.plain_text(), size, FontKind::Bold, 0.0);
                pdf.gap(1.5);
            }
            Block::Paragraph(_) => {
                pdf.text(&block.plain_text(), 11.0, FontKind::Regular, 0.0);
                pdf.gap(2.5);
            }
            Block::ListItem { depth, number, .. } => {
                let marker = match number {
                    Some(n) => format!("{n}."),
                    None => "-".to_string(),
                };
                let indent = 5.0 * (*depth as f32 + 1.0);
                pdf.text(
                    &format!("{marker} {}", block.plain_text()),
                    11.0,
                    FontKind::Regular,
                    indent,
                );
                pdf.gap(1.0);
            }
            Block::Quote(_) => {
                pdf.text(&block.plain_text(), 11.0, FontKind::Italic, 8.0);
                pdf.gap(2.5);
            }
            Block::Code(code) => {
                pdf.text(code, 9.0, FontKind::Mono, 4.0);
                pdf.gap(2.5);
            }
            Block::Rule => pdf.gap(5.0),
        }
    }

    pdf.save(path)
}
