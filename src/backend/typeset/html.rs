//! Flattening HTML into layout blocks.
//!
//! Styling is ignored. Block-level elements start new blocks, inline
//! elements contribute their text to the surrounding paragraph.

use super::layout::Block;
use scraper::{ElementRef, Html, Node};
use std::mem;

/// Marker drawn in front of unordered list items.
pub const BULLET: &str = "\u{2022}";

/// Elements nested deeper than this are flattened to their text.
const MAX_DEPTH: usize = 256;

/// Flatten an HTML document (or fragment) into blocks.
pub fn flatten(html: &str) -> Vec<Block> {
    let document = Html::parse_document(html);
    let mut flattener = Flattener::default();
    flattener.element(document.root_element(), 0);
    flattener.flush();
    flattener.blocks
}

/// The document's `<title>`, if it has a non-empty one.
pub fn title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "title")
        .map(|e| collapse(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Text of an HTML fragment with whitespace collapsed.
pub fn plain_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    collapse(&fragment.root_element().text().collect::<String>())
}

#[derive(Default)]
struct Flattener {
    blocks: Vec<Block>,
    inline: String,
}

impl Flattener {
    fn flush(&mut self) {
        let text = collapse(&mem::take(&mut self.inline));
        if !text.is_empty() {
            self.blocks.push(Block::Paragraph(text));
        }
    }

    fn children(&mut self, element: ElementRef<'_>, depth: usize) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.inline.push_str(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, element: ElementRef<'_>, depth: usize) {
        if depth > MAX_DEPTH {
            self.inline.push_str(&element.text().collect::<String>());
            return;
        }

        match element.value().name() {
            "head" | "script" | "style" | "noscript" | "template" | "title" => {}

            name @ ("h1" | "h2" | "h3" | "h4" | "h5" | "h6") => {
                self.flush();
                let level = name[1..].parse().unwrap_or(6);
                let text = collapse(&element.text().collect::<String>());
                if !text.is_empty() {
                    self.blocks.push(Block::Heading { level, text });
                }
            }

            "br" => self.flush(),

            "hr" => {
                self.flush();
                self.blocks.push(Block::Blank);
            }

            "pre" => {
                self.flush();
                let text: String = element.text().collect();
                if !text.trim().is_empty() {
                    self.blocks.push(Block::Preformatted(text));
                }
            }

            "ul" | "ol" => {
                self.flush();
                self.list(element, depth);
            }

            "table" => {
                self.flush();
                self.table(element);
            }

            "p" | "div" | "section" | "article" | "main" | "header" | "footer" | "nav"
            | "aside" | "blockquote" | "figure" | "figcaption" | "address" | "dl" | "dt"
            | "dd" | "li" | "body" | "html" => {
                self.flush();
                self.children(element, depth);
                self.flush();
            }

            _ => self.children(element, depth),
        }
    }

    fn list(&mut self, list: ElementRef<'_>, depth: usize) {
        let ordered = list.value().name() == "ol";
        let mut number = list
            .value()
            .attr("start")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(1);

        for item in list.children().filter_map(ElementRef::wrap) {
            if item.value().name() != "li" {
                self.element(item, depth + 1);
                continue;
            }

            // Nested lists inside the item follow it as their own items.
            let mut text = String::new();
            let mut nested = Vec::new();
            for child in item.children() {
                match child.value() {
                    Node::Text(t) => text.push_str(t),
                    Node::Element(e) if matches!(e.name(), "ul" | "ol") => nested.push(child),
                    Node::Element(_) => {
                        if let Some(e) = ElementRef::wrap(child) {
                            text.extend(e.text());
                        }
                    }
                    _ => {}
                }
            }

            let marker = if ordered {
                format!("{number}.")
            } else {
                BULLET.to_string()
            };
            number += 1;
            self.blocks.push(Block::ListItem {
                marker,
                text: collapse(&text),
            });

            for child in nested.into_iter().filter_map(ElementRef::wrap) {
                self.list(child, depth + 1);
            }
        }
    }

    fn table(&mut self, table: ElementRef<'_>) {
        let mut rows = Vec::new();
        let mut header = false;

        for (i, row) in table
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "tr")
            .enumerate()
        {
            let cells: Vec<ElementRef<'_>> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .collect();
            if i == 0 {
                header = !cells.is_empty() && cells.iter().all(|c| c.value().name() == "th");
            }
            rows.push(
                cells
                    .iter()
                    .map(|c| collapse(&c.text().collect::<String>()))
                    .collect::<Vec<_>>(),
            );
        }

        if rows.iter().any(|r| !r.is_empty()) {
            self.blocks.push(Block::Table { rows, header });
        }
    }
}

/// Collapse whitespace runs to single spaces and trim.
fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
