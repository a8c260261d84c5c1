//! Serialising laid-out pages with lopdf.

use super::layout::{DrawOp, Font, Page, PageSetup};
use chrono::{DateTime, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::io::Write;
use unicode_normalization::UnicodeNormalization;

/// Producer recorded in the document information dictionary.
pub const CREATOR: &str = concat!("topdf ", env!("CARGO_PKG_VERSION"));

const PDF_VERSION: &str = "1.5";
const STROKE_WIDTH: f32 = 0.5;

/// Document information dictionary contents.
#[derive(Debug, Clone)]
pub struct DocInfo {
    pub title: String,
    pub author: String,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub created: DateTime<Utc>,
}

impl DocInfo {
    /// Info for `setup`, stamped now.
    pub fn from_setup(setup: &PageSetup) -> Self {
        Self {
            title: setup.title.clone(),
            author: setup.author.clone(),
            subject: setup.subject.clone(),
            keywords: setup.keywords.clone(),
            created: Utc::now(),
        }
    }
}

/// Serialise `pages` into a complete PDF file.
///
/// Errors are returned as messages; the caller attaches the backend name.
pub fn write_pdf(
    pages: &[Page],
    setup: &PageSetup,
    info: &DocInfo,
) -> std::result::Result<Vec<u8>, String> {
    let mut doc = Document::with_version(PDF_VERSION);
    let pages_id = doc.new_object_id();

    let fonts = register_fonts(&mut doc, pages);
    let mut font_resources = Dictionary::new();
    for (font, (name, id)) in &fonts {
        log::trace!("Font {} as /{}", font.base_font(), name);
        font_resources.set(name.as_bytes().to_vec(), *id);
    }
    let resources_id = doc.add_object(dictionary! { "Font" => font_resources });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let content = page_content(page, &fonts);
        let encoded = content.encode().map_err(|e| e.to_string())?;
        let compressed = deflate(&encoded).map_err(|e| e.to_string())?;
        let content_id = doc.add_object(Stream::new(
            dictionary! { "Filter" => "FlateDecode" },
            compressed,
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let media_box: Vec<Object> = vec![0.into(), 0.into(), setup.width.into(), setup.height.into()];
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => media_box,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut info_dict = dictionary! {
        "Title" => text_string(&info.title),
        "Author" => text_string(&info.author),
        "Creator" => text_string(CREATOR),
        "Producer" => text_string(CREATOR),
        "CreationDate" => Object::string_literal(pdf_date(&info.created)),
    };
    if let Some(subject) = &info.subject {
        info_dict.set("Subject", text_string(subject));
    }
    if let Some(keywords) = &info.keywords {
        info_dict.set("Keywords", text_string(keywords));
    }
    let info_id = doc.add_object(info_dict);
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| e.to_string())?;
    Ok(out)
}

fn register_fonts(doc: &mut Document, pages: &[Page]) -> BTreeMap<Font, (String, ObjectId)> {
    let mut fonts = BTreeMap::new();
    for op in pages.iter().flat_map(|p| &p.ops) {
        if let DrawOp::Text { font, .. } = op {
            if !fonts.contains_key(font) {
                let name = format!("F{}", fonts.len() + 1);
                let id = doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => font.base_font(),
                    "Encoding" => "WinAnsiEncoding",
                });
                fonts.insert(*font, (name, id));
            }
        }
    }
    fonts
}

fn page_content(page: &Page, fonts: &BTreeMap<Font, (String, ObjectId)>) -> Content {
    let mut operations = vec![Operation::new("w", vec![STROKE_WIDTH.into()])];

    for op in &page.ops {
        match op {
            DrawOp::Text {
                x,
                y,
                font,
                size,
                text,
            } => {
                let Some((name, _)) = fonts.get(font) else {
                    continue;
                };
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![Object::Name(name.as_bytes().to_vec()), (*size).into()],
                ));
                operations.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::string_literal(encode_win_ansi(text))],
                ));
                operations.push(Operation::new("ET", vec![]));
            }
            DrawOp::Rect {
                x,
                y,
                width,
                height,
            } => {
                operations.push(Operation::new(
                    "re",
                    vec![(*x).into(), (*y).into(), (*width).into(), (*height).into()],
                ));
                operations.push(Operation::new("S", vec![]));
            }
        }
    }

    Content { operations }
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Encode text for a standard font with `WinAnsiEncoding`.
///
/// Text is NFC-normalised first. Characters outside the encoding become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.nfc().map(win_ansi_byte).collect()
}

fn win_ansi_byte(c: char) -> u8 {
    match c {
        ' '..='~' => c as u8,
        '\u{00A0}'..='\u{00FF}' => c as u32 as u8,
        '\t' => b' ',
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => b'?',
    }
}

/// A PDF text string: literal for ASCII, UTF-16BE with a byte order mark
/// otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::string_literal(text)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn pdf_date(at: &DateTime<Utc>) -> String {
    at.format("D:%Y%m%d%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::typeset::layout::{Block, Layout};

    fn shown_strings(doc: &Document, page: ObjectId) -> Vec<Vec<u8>> {
        let content = Content::decode(&doc.get_page_content(page).unwrap()).unwrap();
        content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| op.operands.first()?.as_str().ok().map(<[u8]>::to_vec))
            .collect()
    }

    fn render(blocks: &[Block]) -> Vec<u8> {
        let setup = PageSetup::default();
        let pages = Layout::run(&setup, blocks);
        write_pdf(&pages, &setup, &DocInfo::from_setup(&setup)).unwrap()
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Hi!"), b"Hi!");
        assert_eq!(encode_win_ansi("caf\u{e9}"), b"caf\xe9");
        // Decomposed e + combining acute is composed first.
        assert_eq!(encode_win_ansi("cafe\u{301}"), b"caf\xe9");
        assert_eq!(encode_win_ansi("\u{20AC}5 \u{2014} \u{2022}"), b"\x805 \x97 \x95");
        assert_eq!(encode_win_ansi("\u{4e2d}"), b"?");
    }

    #[test]
    fn test_pdf_date() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(pdf_date(&at), "D:20240305070809Z");
    }

    #[test]
    fn test_write_pdf_structure() {
        let bytes = render(&[
            Block::Heading {
                level: 1,
                text: "Report".into(),
            },
            Block::Paragraph("Hello, World!".into()),
        ]);
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let text = shown_strings(&doc, pages[&1]);
        assert_eq!(text, vec![b"Report".to_vec(), b"Hello, World!".to_vec()]);
    }

    #[test]
    fn test_write_pdf_multiple_pages() {
        let blocks: Vec<Block> = (0..150).map(|i| Block::Line(format!("row {i}"))).collect();
        let bytes = render(&blocks);
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() >= 3);
    }

    #[test]
    fn test_info_dictionary() {
        let setup = PageSetup {
            title: "Quarterly r\u{e9}sum\u{e9}".into(),
            ..PageSetup::default()
        };
        let pages = Layout::run(&setup, &[Block::Line("x".into())]);
        let bytes = write_pdf(&pages, &setup, &DocInfo::from_setup(&setup)).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();

        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_dictionary(info_id).unwrap();
        assert_eq!(info.get(b"Author").unwrap().as_str().unwrap(), b"topdf");
        let title = info.get(b"Title").unwrap().as_str().unwrap();
        assert_eq!(&title[..2], &[0xFE, 0xFF]);
        assert!(info.get(b"Subject").is_err());
        assert!(info.get(b"Keywords").is_err());
    }

    #[test]
    fn test_info_subject_and_keywords() {
        let setup = PageSetup {
            subject: Some("Sales".into()),
            keywords: Some("q1, revenue".into()),
            ..PageSetup::default()
        };
        let pages = Layout::run(&setup, &[Block::Line("x".into())]);
        let bytes = write_pdf(&pages, &setup, &DocInfo::from_setup(&setup)).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();

        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_dictionary(info_id).unwrap();
        assert_eq!(info.get(b"Subject").unwrap().as_str().unwrap(), b"Sales");
        assert_eq!(info.get(b"Keywords").unwrap().as_str().unwrap(), b"q1, revenue");
    }
}
