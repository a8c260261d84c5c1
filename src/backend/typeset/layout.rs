//! Page geometry, font metrics and block layout.
//!
//! Coordinates are PDF points with the origin at the bottom-left corner of
//! the page. Text positions are baselines.

use super::html;
use crate::config::Settings;
use crate::error::{Error, Result};
use std::mem;

/// Millimetres to points.
pub const MM_TO_PT: f32 = 72.0 / 25.4;

/// Line height as a multiple of the font size.
pub const LINE_SPACING: f32 = 1.25;

const CELL_PADDING: f32 = 3.0;
const LIST_INDENT: f32 = 18.0;
const MIN_CONTENT_WIDTH: f32 = 36.0;

/// Running header and footer size relative to the body font.
const RUNNING_SCALE: f32 = 0.8;

/// Placeholders expanded in running headers and footers.
const PAGE_NUMBER: &str = "{PAGENO}";
const PAGE_COUNT: &str = "{nbpg}";

/// Standard page formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFormat {
    A3,
    A4,
    A5,
    Letter,
    Legal,
}

impl PageFormat {
    /// Parse a format name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "a3" => Some(PageFormat::A3),
            "a4" => Some(PageFormat::A4),
            "a5" => Some(PageFormat::A5),
            "letter" => Some(PageFormat::Letter),
            "legal" => Some(PageFormat::Legal),
            _ => None,
        }
    }

    /// Portrait width and height in points.
    pub fn size(&self) -> (f32, f32) {
        match self {
            PageFormat::A3 => (841.89, 1190.55),
            PageFormat::A4 => (595.28, 841.89),
            PageFormat::A5 => (419.53, 595.28),
            PageFormat::Letter => (612.0, 792.0),
            PageFormat::Legal => (612.0, 1008.0),
        }
    }
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    /// Parse `P`/`portrait` or `L`/`landscape` (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "p" | "portrait" => Some(Orientation::Portrait),
            "l" | "landscape" => Some(Orientation::Landscape),
            _ => None,
        }
    }
}

/// Standard Type1 font families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum FontFamily {
    #[default]
    Helvetica,
    Times,
    Courier,
}

impl FontFamily {
    /// Map a family name to the closest standard family. Unknown names map
    /// to Helvetica.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        if name.contains("times") || (name.contains("serif") && !name.contains("sans")) {
            FontFamily::Times
        } else if name.contains("courier") || name.contains("mono") {
            FontFamily::Courier
        } else {
            FontFamily::Helvetica
        }
    }
}

/// A font: family plus weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Font {
    pub family: FontFamily,
    pub bold: bool,
}

impl Font {
    /// Regular weight of `family`.
    pub fn regular(family: FontFamily) -> Self {
        Self {
            family,
            bold: false,
        }
    }

    /// Bold weight of `family`.
    pub fn bold(family: FontFamily) -> Self {
        Self { family, bold: true }
    }

    /// PostScript name of the standard font.
    pub fn base_font(&self) -> &'static str {
        match (self.family, self.bold) {
            (FontFamily::Helvetica, false) => "Helvetica",
            (FontFamily::Helvetica, true) => "Helvetica-Bold",
            (FontFamily::Times, false) => "Times-Roman",
            (FontFamily::Times, true) => "Times-Bold",
            (FontFamily::Courier, false) => "Courier",
            (FontFamily::Courier, true) => "Courier-Bold",
        }
    }

    /// Advance width of `c` in thousandths of an em.
    pub fn char_width(&self, c: char) -> f32 {
        if self.family == FontFamily::Courier {
            return 600.0;
        }
        let base = match c as u32 {
            code @ 32..=126 => HELVETICA_WIDTHS[(code - 32) as usize] as f32,
            _ => 556.0,
        };
        let family = match self.family {
            FontFamily::Times => 0.92,
            _ => 1.0,
        };
        let weight = if self.bold { 1.06 } else { 1.0 };
        base * family * weight
    }
}

/// Helvetica advance widths for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // space../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722,
    667, 611, 722, 667, 944, 667, 667, 611, // A..Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333,
    500, 278, 556, 500, 722, 500, 500, 500, // a..z
    334, 260, 334, 584, // {..~
];

/// Width of `text` set in `font` at `size` points.
pub fn text_width(text: &str, font: Font, size: f32) -> f32 {
    text.chars().map(|c| font.char_width(c)).sum::<f32>() * size / 1000.0
}

/// Word-wrap `text` to `max_width`. Runs of whitespace collapse to one
/// space; words wider than a line are broken between characters. Always
/// returns at least one (possibly empty) line.
pub fn wrap(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let space = text_width(" ", font, size);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut width = 0.0;

    for word in text.split_whitespace() {
        let word_width = text_width(word, font, size);
        if !line.is_empty() && width + space + word_width <= max_width {
            line.push(' ');
            line.push_str(word);
            width += space + word_width;
            continue;
        }
        if !line.is_empty() {
            lines.push(mem::take(&mut line));
            width = 0.0;
        }
        if word_width <= max_width {
            line.push_str(word);
            width = word_width;
        } else {
            for c in word.chars() {
                let w = font.char_width(c) * size / 1000.0;
                if !line.is_empty() && width + w > max_width {
                    lines.push(mem::take(&mut line));
                    width = 0.0;
                }
                line.push(c);
                width += w;
            }
        }
    }

    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

/// Break `text` between characters only, keeping whitespace as is.
pub fn wrap_chars(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut width = 0.0;
    for c in text.chars() {
        let w = font.char_width(c) * size / 1000.0;
        if !line.is_empty() && width + w > max_width {
            lines.push(mem::take(&mut line));
            width = 0.0;
        }
        line.push(c);
        width += w;
    }
    lines.push(line);
    lines
}

/// Page margins in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Everything layout needs to know about the page and the document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    /// Page width in points.
    pub width: f32,
    /// Page height in points.
    pub height: f32,
    /// Margins in points.
    pub margins: Margins,
    /// Body font family.
    pub family: FontFamily,
    /// Body font size in points.
    pub font_size: f32,
    /// Document title.
    pub title: String,
    /// Document author.
    pub author: String,
    /// Document subject.
    pub subject: Option<String>,
    /// Document keywords.
    pub keywords: Option<String>,
    /// Text drawn in the top margin of every page.
    pub header: Option<String>,
    /// Text drawn in the bottom margin of every page.
    pub footer: Option<String>,
    /// Distance from the top edge to the header, in points.
    pub margin_header: f32,
    /// Distance from the bottom edge to the footer baseline, in points.
    pub margin_footer: f32,
}

impl Default for PageSetup {
    fn default() -> Self {
        let (width, height) = PageFormat::A4.size();
        Self {
            width,
            height,
            margins: Margins {
                left: 15.0 * MM_TO_PT,
                top: 20.0 * MM_TO_PT,
                right: 15.0 * MM_TO_PT,
                bottom: 20.0 * MM_TO_PT,
            },
            family: FontFamily::Helvetica,
            font_size: 12.0,
            title: "Generated PDF".to_string(),
            author: "topdf".to_string(),
            subject: None,
            keywords: None,
            header: None,
            footer: None,
            margin_header: 9.0 * MM_TO_PT,
            margin_footer: 9.0 * MM_TO_PT,
        }
    }
}

impl PageSetup {
    /// Resolve page setup from options layered over the backend section.
    ///
    /// Option keys: `format`, `orientation`, `font_family`, `font_size`,
    /// `margin_left`, `margin_top`, `margin_right`, `margin_bottom`,
    /// `margin_header`, `margin_footer` (mm), `header`, `footer`, `title`,
    /// `author`, `subject`, `keywords`. Headers and footers may be HTML;
    /// only their text is kept.
    pub fn from_settings(settings: &Settings<'_>) -> Result<Self> {
        let defaults = Self::default();

        let format = match settings.string("format", &["format"]) {
            Some(name) => PageFormat::from_name(&name).ok_or_else(|| {
                Error::conversion(Some("typeset"), format!("unknown page format '{name}'"))
            })?,
            None => PageFormat::A4,
        };
        let orientation = settings
            .string("orientation", &["orientation"])
            .and_then(|o| Orientation::from_name(&o))
            .unwrap_or_default();
        let (w, h) = format.size();
        let (width, height) = match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        };

        let margin = |key: &str, path: &str, default: f32| {
            settings
                .number(key, &["margins", path])
                .map(|mm| mm as f32 * MM_TO_PT)
                .filter(|pt| *pt >= 0.0)
                .unwrap_or(default)
        };
        let margins = Margins {
            left: margin("margin_left", "left", defaults.margins.left),
            top: margin("margin_top", "top", defaults.margins.top),
            right: margin("margin_right", "right", defaults.margins.right),
            bottom: margin("margin_bottom", "bottom", defaults.margins.bottom),
        };

        let running = |key: &str| {
            settings
                .string(key, &[key])
                .map(|raw| html::plain_text(&raw))
                .filter(|text| !text.is_empty())
        };

        let font_size = settings
            .number("font_size", &["font", "size"])
            .map(|s| (s as f32).clamp(4.0, 72.0))
            .unwrap_or(defaults.font_size);

        let setup = Self {
            width,
            height,
            margins,
            family: settings
                .string("font_family", &["font", "family"])
                .map(|f| FontFamily::from_name(&f))
                .unwrap_or_default(),
            font_size,
            title: settings.string("title", &["title"]).unwrap_or(defaults.title),
            author: settings.string("author", &["author"]).unwrap_or(defaults.author),
            subject: settings.string("subject", &["subject"]),
            keywords: settings.string("keywords", &["keywords"]),
            header: running("header"),
            footer: running("footer"),
            margin_header: margin("margin_header", "header", defaults.margin_header),
            margin_footer: margin("margin_footer", "footer", defaults.margin_footer),
        };

        if setup.content_width() < MIN_CONTENT_WIDTH
            || setup.top() - setup.bottom() < font_size * LINE_SPACING * 2.0
        {
            return Err(Error::conversion(
                Some("typeset"),
                "margins leave no room for content",
            ));
        }
        Ok(setup)
    }

    /// Width between the margins.
    pub fn content_width(&self) -> f32 {
        self.width - self.margins.left - self.margins.right
    }

    fn top(&self) -> f32 {
        self.height - self.margins.top
    }

    fn bottom(&self) -> f32 {
        self.margins.bottom
    }

    /// Draw the running header and footer on page `number` of `total`.
    fn decorate(&self, page: &mut Page, number: usize, total: usize) {
        let size = self.font_size * RUNNING_SCALE;
        let header_y = self.height - self.margin_header - size;
        if let Some(op) = self.running(self.header.as_deref(), header_y, number, total) {
            page.ops.insert(0, op);
        }
        if let Some(op) = self.running(self.footer.as_deref(), self.margin_footer, number, total) {
            page.ops.push(op);
        }
    }

    /// One centred line at baseline `y` with page placeholders expanded.
    fn running(
        &self,
        template: Option<&str>,
        y: f32,
        number: usize,
        total: usize,
    ) -> Option<DrawOp> {
        let font = Font::regular(self.family);
        let size = self.font_size * RUNNING_SCALE;
        let expanded = template?
            .replace(PAGE_NUMBER, &number.to_string())
            .replace(PAGE_COUNT, &total.to_string());
        let text = wrap(&expanded, font, size, self.content_width())
            .into_iter()
            .next()
            .filter(|line| !line.is_empty())?;
        let slack = (self.content_width() - text_width(&text, font, size)).max(0.0);
        Some(DrawOp::Text {
            x: self.margins.left + slack / 2.0,
            y,
            font,
            size,
            text,
        })
    }
}

/// Layout input.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Bold heading, level 1 to 6.
    Heading { level: u8, text: String },
    /// Wrapped paragraph followed by a small gap.
    Paragraph(String),
    /// Wrapped line with no gap after it.
    Line(String),
    /// List item drawn with `marker` (a bullet or a number) in the gutter.
    ListItem { marker: String, text: String },
    /// Monospaced text with line breaks kept.
    Preformatted(String),
    /// Bordered table; with `header` set the first row is bold and repeated
    /// on every page.
    Table { rows: Vec<Vec<String>>, header: bool },
    /// Vertical space of one line.
    Blank,
}

/// A drawing operation on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Text with its baseline at `y`.
    Text {
        x: f32,
        y: f32,
        font: Font,
        size: f32,
        text: String,
    },
    /// Stroked rectangle with its lower-left corner at (`x`, `y`).
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

/// One laid-out page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

#[cfg(test)]
impl Page {
    /// All text on the page, in drawing order.
    pub fn text(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                DrawOp::Rect { .. } => None,
            })
            .collect()
    }
}

/// Flows blocks top to bottom onto pages.
pub struct Layout<'a> {
    setup: &'a PageSetup,
    pages: Vec<Page>,
    ops: Vec<DrawOp>,
    y: f32,
}

impl<'a> Layout<'a> {
    /// Start an empty first page.
    pub fn new(setup: &'a PageSetup) -> Self {
        Self {
            setup,
            pages: Vec::new(),
            ops: Vec::new(),
            y: setup.top(),
        }
    }

    /// Lay out every block in order and return the pages.
    pub fn run(setup: &'a PageSetup, blocks: &[Block]) -> Vec<Page> {
        let mut layout = Self::new(setup);
        for block in blocks {
            layout.push(block);
        }
        layout.finish()
    }

    fn new_page(&mut self) {
        let ops = mem::take(&mut self.ops);
        self.pages.push(Page { ops });
        self.y = self.setup.top();
    }

    fn at_top(&self) -> bool {
        self.y >= self.setup.top()
    }

    /// Start a new page unless `height` still fits. An item taller than a
    /// whole page is placed at the top of a page and overflows.
    fn reserve(&mut self, height: f32) {
        if self.y - height < self.setup.bottom() && !self.at_top() {
            self.new_page();
        }
    }

    fn gap(&mut self, height: f32) {
        if !self.at_top() {
            self.y = (self.y - height).max(self.setup.bottom());
        }
    }

    fn line(&mut self, text: String, font: Font, size: f32, indent: f32) {
        let height = size * LINE_SPACING;
        self.reserve(height);
        let baseline = self.y - size;
        self.y -= height;
        if !text.is_empty() {
            self.ops.push(DrawOp::Text {
                x: self.setup.margins.left + indent,
                y: baseline,
                font,
                size,
                text,
            });
        }
    }

    /// Lay out one block.
    pub fn push(&mut self, block: &Block) {
        let size = self.setup.font_size;
        let family = self.setup.family;
        let width = self.setup.content_width();

        match block {
            Block::Heading { level, text } => {
                let scale = match level {
                    1 => 1.8,
                    2 => 1.5,
                    3 => 1.3,
                    4 => 1.15,
                    _ => 1.0,
                };
                let size = size * scale;
                let font = Font::bold(family);
                self.gap(size * 0.5);
                for line in wrap(text, font, size, width) {
                    self.line(line, font, size, 0.0);
                }
                self.gap(size * 0.25);
            }
            Block::Paragraph(text) => {
                let font = Font::regular(family);
                for line in wrap(text, font, size, width) {
                    self.line(line, font, size, 0.0);
                }
                self.gap(size * 0.4);
            }
            Block::Line(text) => {
                let font = Font::regular(family);
                for line in wrap(text, font, size, width) {
                    self.line(line, font, size, 0.0);
                }
            }
            Block::ListItem { marker, text } => {
                let font = Font::regular(family);
                let lines = wrap(text, font, size, width - LIST_INDENT);
                let height = size * LINE_SPACING;
                self.reserve(height);
                self.ops.push(DrawOp::Text {
                    x: self.setup.margins.left + LIST_INDENT / 4.0,
                    y: self.y - size,
                    font,
                    size,
                    text: marker.clone(),
                });
                for line in lines {
                    self.line(line, font, size, LIST_INDENT);
                }
            }
            Block::Preformatted(text) => {
                let font = Font::regular(FontFamily::Courier);
                let size = size * 0.9;
                for source in text.trim_end_matches('\n').lines() {
                    let expanded = source.replace('\t', "    ");
                    for line in wrap_chars(&expanded, font, size, width) {
                        self.line(line, font, size, 0.0);
                    }
                }
                self.gap(size * 0.4);
            }
            Block::Table { rows, header } => self.table(rows, *header),
            Block::Blank => self.gap(size * LINE_SPACING),
        }
    }

    fn table(&mut self, rows: &[Vec<String>], header: bool) {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        let col_width = self.setup.content_width() / columns as f32;

        let (head, body) = if header {
            (rows.first(), rows.get(1..).unwrap_or_default())
        } else {
            (None, rows)
        };

        if let Some(head) = head {
            let (cells, height) = self.measure_row(head, columns, col_width, true);
            self.reserve(height);
            self.place_row(&cells, height, col_width, true);
        }

        for row in body {
            let (cells, height) = self.measure_row(row, columns, col_width, false);
            if self.y - height < self.setup.bottom() && !self.at_top() {
                self.new_page();
                if let Some(head) = head {
                    let (head_cells, head_height) = self.measure_row(head, columns, col_width, true);
                    self.place_row(&head_cells, head_height, col_width, true);
                }
            }
            self.place_row(&cells, height, col_width, false);
        }

        self.gap(self.setup.font_size * 0.4);
    }

    fn measure_row(
        &self,
        row: &[String],
        columns: usize,
        col_width: f32,
        bold: bool,
    ) -> (Vec<Vec<String>>, f32) {
        let font = Font {
            family: self.setup.family,
            bold,
        };
        let size = self.setup.font_size;
        let inner = (col_width - 2.0 * CELL_PADDING).max(1.0);
        let cells: Vec<Vec<String>> = (0..columns)
            .map(|i| wrap(row.get(i).map(String::as_str).unwrap_or(""), font, size, inner))
            .collect();
        let lines = cells.iter().map(Vec::len).max().unwrap_or(1);
        let height = lines as f32 * size * LINE_SPACING + 2.0 * CELL_PADDING;
        (cells, height)
    }

    fn place_row(&mut self, cells: &[Vec<String>], height: f32, col_width: f32, bold: bool) {
        let font = Font {
            family: self.setup.family,
            bold,
        };
        let size = self.setup.font_size;
        let line_height = size * LINE_SPACING;

        for (i, lines) in cells.iter().enumerate() {
            let x = self.setup.margins.left + i as f32 * col_width;
            self.ops.push(DrawOp::Rect {
                x,
                y: self.y - height,
                width: col_width,
                height,
            });
            for (j, text) in lines.iter().enumerate() {
                if text.is_empty() {
                    continue;
                }
                self.ops.push(DrawOp::Text {
                    x: x + CELL_PADDING,
                    y: self.y - CELL_PADDING - j as f32 * line_height - size,
                    font,
                    size,
                    text: text.clone(),
                });
            }
        }
        self.y -= height;
    }

    /// Close the last page and add running headers and footers. There is
    /// always at least one page.
    pub fn finish(mut self) -> Vec<Page> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        let total = self.pages.len();
        for (i, page) in self.pages.iter_mut().enumerate() {
            self.setup.decorate(page, i + 1, total);
        }
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use serde_json::json;

    #[test]
    fn test_text_width() {
        let helvetica = Font::regular(FontFamily::Helvetica);
        assert!((text_width("i", helvetica, 10.0) - 2.22).abs() < 0.01);
        let courier = Font::regular(FontFamily::Courier);
        assert!((text_width("iiii", courier, 10.0) - 24.0).abs() < 0.01);
        assert!(text_width("W", Font::bold(FontFamily::Helvetica), 10.0) > text_width("W", helvetica, 10.0));
    }

    #[test]
    fn test_wrap() {
        let font = Font::regular(FontFamily::Courier);
        // 6pt per character at size 10.
        let lines = wrap("aaa bbb ccc", font, 10.0, 45.0);
        assert_eq!(lines, vec!["aaa bbb", "ccc"]);

        let lines = wrap("abcdefghij", font, 10.0, 24.0);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);

        assert_eq!(wrap("   ", font, 10.0, 24.0), vec![""]);
    }

    #[test]
    fn test_wrap_chars_keeps_spaces() {
        let font = Font::regular(FontFamily::Courier);
        assert_eq!(wrap_chars("a  b", font, 10.0, 100.0), vec!["a  b"]);
        assert_eq!(wrap_chars("abcdef", font, 10.0, 18.0), vec!["abc", "def"]);
    }

    #[test]
    fn test_page_setup_from_settings() {
        let section = json!({ "format": "A4", "orientation": "P", "font": { "size": 12 } });
        let options = Options::new()
            .with("format", "letter")
            .with("orientation", "L")
            .with("margin_left", 10);
        let setup = PageSetup::from_settings(&Settings::new(&options, &section)).unwrap();

        assert_eq!((setup.width, setup.height), (792.0, 612.0));
        assert!((setup.margins.left - 10.0 * MM_TO_PT).abs() < 0.01);
        assert_eq!(setup.font_size, 12.0);
        assert_eq!(setup.title, "Generated PDF");
    }

    #[test]
    fn test_page_setup_rejects_bad_values() {
        let section = json!({});
        let options = Options::new().with("format", "B7");
        assert!(PageSetup::from_settings(&Settings::new(&options, &section)).is_err());

        let options = Options::new().with("margin_left", 150).with("margin_right", 150);
        assert!(PageSetup::from_settings(&Settings::new(&options, &section)).is_err());
    }

    #[test]
    fn test_pagination() {
        let setup = PageSetup::default();
        let blocks: Vec<Block> = (0..200).map(|i| Block::Line(format!("line {i}"))).collect();
        let pages = Layout::run(&setup, &blocks);

        assert!(pages.len() > 1);
        let total: usize = pages.iter().map(|p| p.text().len()).sum();
        assert_eq!(total, 200);
        for page in &pages {
            for op in &page.ops {
                if let DrawOp::Text { y, .. } = op {
                    assert!(*y >= setup.margins.bottom - setup.font_size);
                    assert!(*y <= setup.height - setup.margins.top);
                }
            }
        }
    }

    #[test]
    fn test_header_and_footer_on_every_page() {
        let section = json!({ "margins": { "header": 5 } });
        let options = Options::new()
            .with("header", "<b>Quarterly</b> report")
            .with("footer", "Page {PAGENO} of {nbpg}");
        let setup = PageSetup::from_settings(&Settings::new(&options, &section)).unwrap();
        assert_eq!(setup.header.as_deref(), Some("Quarterly report"));
        assert!((setup.margin_header - 5.0 * MM_TO_PT).abs() < 0.01);

        let blocks: Vec<Block> = (0..150).map(|i| Block::Line(format!("line {i}"))).collect();
        let pages = Layout::run(&setup, &blocks);
        assert!(pages.len() > 1);

        let total = pages.len();
        for (i, page) in pages.iter().enumerate() {
            let text = page.text();
            assert_eq!(text.first(), Some(&"Quarterly report"));
            let footer = format!("Page {} of {total}", i + 1);
            assert_eq!(text.last(), Some(&footer.as_str()));

            let Some(DrawOp::Text { y, size, .. }) = page.ops.first() else {
                panic!("header missing");
            };
            assert!((*y - (setup.height - setup.margin_header - size)).abs() < 0.01);
            assert!(*y > setup.height - setup.margins.top);
            let Some(DrawOp::Text { y, .. }) = page.ops.last() else {
                panic!("footer missing");
            };
            assert!((*y - setup.margin_footer).abs() < 0.01);
        }
    }

    #[test]
    fn test_empty_input_has_one_page() {
        let pages = Layout::run(&PageSetup::default(), &[]);
        assert_eq!(pages.len(), 1);
        assert!(pages[0].ops.is_empty());
    }

    #[test]
    fn test_table_header_repeats() {
        let setup = PageSetup::default();
        let mut rows = vec![vec!["Name".to_string(), "Age".to_string()]];
        rows.extend((0..120).map(|i| vec![format!("person {i}"), i.to_string()]));
        let pages = Layout::run(&setup, &[Block::Table { rows, header: true }]);

        assert!(pages.len() > 1);
        for page in &pages {
            assert_eq!(page.text().first(), Some(&"Name"));
        }
    }
}
